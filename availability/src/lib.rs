//! Track which providers can serve content pieces and schedule availability refreshes.
//!
//! Objects (e.g. books) are split into content-addressed pieces. Independent providers announce
//! which pieces of which objects they can currently serve and keep themselves alive by
//! announcing (or heartbeating) periodically. This crate answers "who can serve piece X?" and
//! keeps each object's aggregate availability score fresh as providers come and go.
//!
//! # Overview
//!
//! All state lives in a shared [store::Store] so any number of instances can serve queries and
//! run the background sweepers against the same data:
//!
//! - [Registry] tracks live providers by heartbeat expiry.
//! - [Index] maps pieces to the providers offering them and providers to the objects they
//!   announced.
//! - [Cache] remembers which pieces make up an object.
//! - [Scheduler] decides when an object's availability is next recomputed.
//! - [sweeper] runs the two background loops that expire providers and execute due refreshes.
//! - [Tracker] ties the above together for callers.
//!
//! # Consistency
//!
//! The crate is eventually consistent. Mutations for a single provider are serialized with a
//! named [lock::Lease] held in the store, but nothing orders operations across providers. Stale
//! associations left behind by partial failures are pruned the next time they are read.
//!
//! # Status
//!
//! `commonware-availability` is **ALPHA** software and is not yet recommended for production use.
//! Developers should expect breaking changes and occasional instability.

use commonware_cryptography::sha256::Digest;
use std::future::Future;
use thiserror::Error;

mod cache;
pub use cache::Cache;
mod config;
pub use config::{Config, MAX_INTERVAL};
pub(crate) use config::Settings;
mod index;
pub use index::Index;
mod keys;
pub mod lock;
mod metrics;
mod object;
pub use object::{Kind, ObjectRef};
mod registry;
pub use registry::Registry;
mod scheduler;
pub use scheduler::{Refresh, Scheduler};
pub mod score;
pub mod store;
pub mod sweeper;
mod tracker;
pub use tracker::{Sweepers, Tracker};

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

/// Errors that can occur when tracking providers and pieces.
#[derive(Error, Debug)]
pub enum Error {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("availability service failed: {0}")]
    Availability(String),
    #[error("codec error: {0}")]
    Codec(#[from] commonware_codec::Error),
    #[error("unknown piece: {0}")]
    UnknownPiece(Digest),
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("closed")]
    Closed,
}

/// Interface to the service that owns object content and availability scores.
///
/// Implementations dispatch on [ObjectRef::kind].
pub trait Availability: Clone + Send + Sync + 'static {
    /// Enumerate the digests of every piece that makes up `object`.
    fn pieces(&self, object: ObjectRef)
        -> impl Future<Output = Result<Vec<Digest>, Error>> + Send;

    /// Recompute and persist the availability score of `object`.
    ///
    /// Returns `false` if the object no longer exists.
    fn update(&self, object: ObjectRef) -> impl Future<Output = Result<bool, Error>> + Send;
}
