//! Interface to the shared coordination store.
//!
//! The store is the only shared mutable resource: every instance of the tracker reads and
//! writes the same sets, sorted sets and locks. The primitives mirror what common key-value
//! services offer (e.g. Redis sets, sorted sets and `SET NX PX` style locks), so a networked
//! implementation is a thin adapter.
//!
//! Sorted-set ranges are inclusive on both ends. Removing the last member of a set or sorted set
//! removes the key.
//!
//! [Memory] is an in-process implementation driven by the runtime [commonware_runtime::Clock].

use crate::Error;
use bytes::Bytes;
use std::{future::Future, time::Duration};

mod memory;
pub use memory::Memory;

/// Unordered sets of members.
pub trait Sets: Clone + Send + Sync + 'static {
    /// Add `members` to the set at `key`, returning how many were not already present.
    fn add(&self, key: &str, members: &[Bytes]) -> impl Future<Output = Result<usize, Error>> + Send;

    /// Remove `members` from the set at `key`, returning how many were present.
    fn remove(
        &self,
        key: &str,
        members: &[Bytes],
    ) -> impl Future<Output = Result<usize, Error>> + Send;

    /// Returns true if `member` is in the set at `key`.
    fn contains(&self, key: &str, member: &[u8]) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Return every member of the set at `key`.
    fn members(&self, key: &str) -> impl Future<Output = Result<Vec<Bytes>, Error>> + Send;

    /// Return the number of members in the set at `key`.
    fn cardinality(&self, key: &str) -> impl Future<Output = Result<usize, Error>> + Send;

    /// Delete the set at `key`, returning true if it existed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, Error>> + Send;
}

/// Sets of members ordered by an `f64` score.
pub trait Sorted: Clone + Send + Sync + 'static {
    /// Add `member` with `score`, or update its score if already present.
    fn upsert(
        &self,
        key: &str,
        member: Bytes,
        score: f64,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Return the score of `member`, if present.
    fn score(&self, key: &str, member: &[u8])
        -> impl Future<Output = Result<Option<f64>, Error>> + Send;

    /// Remove `member`, returning true if it was present.
    fn unrank(&self, key: &str, member: &[u8]) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Return members with a score in `[min, max]`, ordered by score.
    fn range(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> impl Future<Output = Result<Vec<Bytes>, Error>> + Send;

    /// Return members and their scores with a score in `[min, max]`, ordered by score.
    fn range_with_scores(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> impl Future<Output = Result<Vec<(Bytes, f64)>, Error>> + Send;

    /// Remove members with a score in `[min, max]`, returning how many were removed.
    fn remove_range(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> impl Future<Output = Result<usize, Error>> + Send;

    /// Count members with a score in `[min, max]`.
    fn count(&self, key: &str, min: f64, max: f64)
        -> impl Future<Output = Result<usize, Error>> + Send;
}

/// Named locks held by an owner token until a lease expires.
///
/// These are the primitives behind [crate::lock::Lease], which adds blocking acquisition and
/// background renewal.
pub trait Locks: Clone + Send + Sync + 'static {
    /// Take `name` for `token` if it is free, expired, or already held by `token`.
    ///
    /// Returns true if `token` now holds the lock for `lease`.
    fn try_lock(
        &self,
        name: &str,
        token: u64,
        lease: Duration,
    ) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Extend the lease on `name` if it is still held by `token`.
    fn extend(
        &self,
        name: &str,
        token: u64,
        lease: Duration,
    ) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Release `name` if it is held by `token`.
    fn unlock(&self, name: &str, token: u64) -> impl Future<Output = Result<bool, Error>> + Send;
}

/// A coordination store offering [Sets], [Sorted] sets and [Locks].
pub trait Store: Sets + Sorted + Locks {}

impl<T: Sets + Sorted + Locks> Store for T {}
