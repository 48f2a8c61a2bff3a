//! The [`PresenceStore`] trait — a minimal named-set interface.

use std::future::Future;

use crate::StoreError;

/// A store of named string sets.
///
/// This is deliberately shaped like the small slice of Redis the
/// presence layer needs (`SADD` / `SREM` / `SMEMBERS` / `SISMEMBER` /
/// `DEL`), so a Redis-backed implementation is a thin mapping and the
/// in-memory one stays honest about the same semantics.
///
/// All operations are idempotent the way set commands are: adding an
/// existing member, removing an absent one, or deleting a missing set
/// succeeds without effect.
///
/// The futures are required to be `Send` because the registry awaits
/// them inside spawned session tasks; implementations written as
/// `async fn` satisfy the bound automatically.
pub trait PresenceStore: Send + Sync + 'static {
    /// Adds a member to the named set, creating the set if needed.
    fn add(
        &self,
        set: &str,
        member: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes a member from the named set. No-op if absent.
    fn remove(
        &self,
        set: &str,
        member: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns whether the member is in the named set.
    fn contains(
        &self,
        set: &str,
        member: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Returns all members of the named set (empty if it doesn't exist).
    /// Order is unspecified.
    fn members(
        &self,
        set: &str,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Deletes the named set entirely. No-op if it doesn't exist.
    fn delete(
        &self,
        set: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
