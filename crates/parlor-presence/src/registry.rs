//! The [`PresenceRegistry`] — chat-level presence operations over a
//! [`PresenceStore`].

use std::sync::Arc;

use crate::{PresenceStore, StoreError};

/// Set holding every connected display name.
const ACTIVE_USERS_KEY: &str = "active_users";

/// Set holding the name of every room that currently has members.
const ALL_ROOMS_KEY: &str = "all_rooms";

/// Key of the membership set for one room.
fn room_key(room: &str) -> String {
    format!("room:{room}")
}

/// Presence registry: who is connected, and who is in which room.
///
/// Thin vocabulary layer over a [`PresenceStore`]; it owns the key
/// schema (`active_users`, `room:{name}`, `all_rooms`) and the
/// empty-room cleanup rule, and nothing else. Clones share the same
/// underlying store.
///
/// Uniqueness of display names is check-then-act: [`is_active`] followed
/// by [`add_active`] can race across instances, and two connections can
/// briefly hold the same name. Accepted — the cost is a duplicated name,
/// not corrupted state.
///
/// [`is_active`]: Self::is_active
/// [`add_active`]: Self::add_active
#[derive(Debug)]
pub struct PresenceRegistry<S> {
    store: Arc<S>,
}

// Manual impl: `derive(Clone)` would require `S: Clone`, but clones
// share the Arc.
impl<S> Clone for PresenceRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: PresenceStore> PresenceRegistry<S> {
    /// Creates a registry over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    // -----------------------------------------------------------------
    // Active users
    // -----------------------------------------------------------------

    /// Returns whether a display name is currently connected.
    pub async fn is_active(&self, name: &str) -> Result<bool, StoreError> {
        self.store.contains(ACTIVE_USERS_KEY, name).await
    }

    /// Marks a display name as connected.
    pub async fn add_active(&self, name: &str) -> Result<(), StoreError> {
        self.store.add(ACTIVE_USERS_KEY, name).await
    }

    /// Marks a display name as no longer connected.
    pub async fn remove_active(&self, name: &str) -> Result<(), StoreError> {
        self.store.remove(ACTIVE_USERS_KEY, name).await
    }

    /// Returns all connected display names, sorted.
    pub async fn list_active(&self) -> Result<Vec<String>, StoreError> {
        let mut names = self.store.members(ACTIVE_USERS_KEY).await?;
        names.sort();
        Ok(names)
    }

    /// Drops the whole active-user set.
    ///
    /// Run at startup: names left behind by an unclean shutdown would
    /// otherwise lock their owners out forever.
    pub async fn clear_active(&self) -> Result<(), StoreError> {
        tracing::debug!("clearing active user set");
        self.store.delete(ACTIVE_USERS_KEY).await
    }

    // -----------------------------------------------------------------
    // Room membership
    // -----------------------------------------------------------------

    /// Adds a user to a room's membership set and records the room as
    /// known.
    pub async fn add_member(
        &self,
        room: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        self.store.add(&room_key(room), name).await?;
        self.store.add(ALL_ROOMS_KEY, room).await
    }

    /// Removes a user from a room's membership set.
    ///
    /// When the last member leaves, the room's set is deleted and the
    /// room disappears from the known-room list. Rooms have no identity
    /// beyond their members. Concurrent removals can both observe the
    /// set as empty and both run the cleanup; every step is a set no-op
    /// the second time, so the double delete is harmless.
    pub async fn remove_member(
        &self,
        room: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        let key = room_key(room);
        self.store.remove(&key, name).await?;

        if self.store.members(&key).await?.is_empty() {
            tracing::debug!(%room, "last member left, dropping room");
            self.store.remove(ALL_ROOMS_KEY, room).await?;
            self.store.delete(&key).await?;
        }
        Ok(())
    }

    /// Returns the members of a room, sorted. Empty for unknown rooms.
    pub async fn list_members(
        &self,
        room: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut names = self.store.members(&room_key(room)).await?;
        names.sort();
        Ok(names)
    }

    /// Returns all rooms that currently have members, sorted.
    pub async fn list_rooms(&self) -> Result<Vec<String>, StoreError> {
        let mut rooms = self.store.members(ALL_ROOMS_KEY).await?;
        rooms.sort();
        Ok(rooms)
    }
}
