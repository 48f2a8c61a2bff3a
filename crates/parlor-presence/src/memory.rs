//! In-memory [`PresenceStore`] implementation.

use std::collections::{HashMap, HashSet};

use tokio::sync::Mutex;

use crate::{PresenceStore, StoreError};

/// A [`PresenceStore`] backed by an in-process map of sets.
///
/// The default store for a single relay instance and for tests. It
/// never returns [`StoreError`] — the error path exists for networked
/// implementations.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sets: Mutex<HashMap<String, HashSet<String>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresenceStore for MemoryStore {
    async fn add(&self, set: &str, member: &str) -> Result<(), StoreError> {
        self.sets
            .lock()
            .await
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn remove(
        &self,
        set: &str,
        member: &str,
    ) -> Result<(), StoreError> {
        if let Some(members) = self.sets.lock().await.get_mut(set) {
            members.remove(member);
        }
        Ok(())
    }

    async fn contains(
        &self,
        set: &str,
        member: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .sets
            .lock()
            .await
            .get(set)
            .is_some_and(|members| members.contains(member)))
    }

    async fn members(&self, set: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .sets
            .lock()
            .await
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, set: &str) -> Result<(), StoreError> {
        self.sets.lock().await.remove(set);
        Ok(())
    }
}
