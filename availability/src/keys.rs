//! Names of the keys and locks kept in the [crate::store::Store].

use crate::ObjectRef;
use bytes::Bytes;
use commonware_codec::Encode;
use commonware_cryptography::sha256::Digest;

/// Sorted set of live providers scored by heartbeat expiry (milliseconds since epoch).
pub const PROVIDERS: &str = "providers";

/// Sorted set of objects scored by their packed refresh [crate::score].
pub const SCHEDULE: &str = "schedule";

/// Set of objects announced by `provider`.
pub fn objects(provider: u64) -> String {
    format!("provider:{provider}:objects")
}

/// Set of providers offering `piece`.
pub fn providers(piece: &Digest) -> String {
    format!("piece:{piece}:providers")
}

/// Set of pieces that make up `object`.
pub fn pieces(object: &ObjectRef) -> String {
    format!("object:{object}:pieces")
}

/// Lock serializing mutations of `provider`'s associations.
pub fn provider_lock(provider: u64) -> String {
    format!("lock:provider:{provider}")
}

/// Lock held while sweeping with the sweeper named `name`.
pub fn sweep_lock(name: &str) -> String {
    format!("lock:sweep:{name}")
}

/// Encode a provider id as a store member.
pub fn provider(id: u64) -> Bytes {
    id.encode().freeze()
}

/// Encode a piece digest as a store member.
pub fn piece(digest: &Digest) -> Bytes {
    digest.encode().freeze()
}
