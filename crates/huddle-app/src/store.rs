//! Key/set store contract.
//!
//! [`PresenceStore`] is the seam between the session logic and whatever keeps
//! presence and friend sets (Redis in production, [`crate::MemoryStore`] in
//! simulation and tests). Every method is a single atomic store command; the
//! session never retries a failed call.

use std::future::Future;

use thiserror::Error;

/// Server-side set operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOp {
    /// Members present in any input set.
    Union,
    /// Members present in every input set.
    Intersect,
    /// Members of the first set absent from all the others.
    Difference,
}

/// Store failures. All of them are fatal to the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Connection-level failure.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with something the contract does not allow.
    #[error("unexpected store reply: {0}")]
    Protocol(String),
}

/// Named sets of strings with server-side set algebra.
///
/// Implementations share their state internally, so a store handle can be
/// wrapped in an `Arc` and used by several components at once.
///
/// # Invariants
///
/// - `add_member` and `remove_member` are idempotent.
/// - `combine` never mutates its inputs.
/// - Missing keys behave as empty sets.
pub trait PresenceStore: Send + Sync + 'static {
    /// Add `member` to the set at `key`. Returns `true` if it was not present.
    fn add_member(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Remove `member` from the set at `key`. Returns `true` if it was present.
    fn remove_member(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Current members of the set at `key`, in no particular order.
    fn members(&self, key: &str) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Apply `op` across `keys` (left to right) and return the result.
    fn combine(
        &self,
        op: SetOp,
        keys: &[String],
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Apply `op` across `keys` and store the result at `destination`,
    /// replacing anything there. Returns the size of the stored set.
    fn combine_store(
        &self,
        op: SetOp,
        destination: &str,
        keys: &[String],
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Remove the set at `key`. Returns `true` if it existed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;
}
