use crate::{keys, store::Store, Availability, Error, ObjectRef};
use bytes::Bytes;
use commonware_codec::DecodeExt;
use commonware_cryptography::sha256::Digest;
use tracing::debug;

/// Caches the pieces that make up each object.
///
/// Pieces are loaded from the [Availability] service the first time an object is referenced
/// (or whenever its cached set is empty) and kept in the store afterwards.
#[derive(Clone)]
pub struct Cache<S: Store, A: Availability> {
    store: S,
    availability: A,
}

impl<S: Store, A: Availability> Cache<S, A> {
    pub(crate) fn new(store: S, availability: A) -> Self {
        Self {
            store,
            availability,
        }
    }

    /// Returns the pieces of `object`, loading them if not cached.
    pub async fn pieces(&self, object: ObjectRef) -> Result<Vec<Digest>, Error> {
        let members = self.store.members(&keys::pieces(&object)).await?;
        if members.is_empty() {
            return self.load(object).await;
        }
        members
            .into_iter()
            .map(|member| Digest::decode(member).map_err(Error::from))
            .collect()
    }

    /// Returns true if every digest in `pieces` is a piece of `object`.
    ///
    /// Stops at the first miss.
    pub async fn contains_all(&self, object: ObjectRef, pieces: &[Digest]) -> Result<bool, Error> {
        let key = keys::pieces(&object);
        if self.store.cardinality(&key).await? == 0 {
            self.load(object).await?;
        }
        for piece in pieces {
            if !self.store.contains(&key, &keys::piece(piece)).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Forget the cached pieces of `object`.
    pub async fn clear(&self, object: ObjectRef) -> Result<(), Error> {
        self.store.delete(&keys::pieces(&object)).await?;
        Ok(())
    }

    async fn load(&self, object: ObjectRef) -> Result<Vec<Digest>, Error> {
        let pieces = self.availability.pieces(object).await?;
        let members: Vec<Bytes> = pieces.iter().map(keys::piece).collect();
        if !members.is_empty() {
            self.store.add(&keys::pieces(&object), &members).await?;
        }
        debug!(%object, pieces = pieces.len(), "loaded pieces");
        Ok(pieces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mocks, store::Memory};
    use commonware_cryptography::sha256;
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Runner};

    #[test_traced]
    fn test_loads_once() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let availability = mocks::Availability::default();
            let object = ObjectRef::book(1);
            let (h1, h2) = (sha256::hash(b"h1"), sha256::hash(b"h2"));
            availability.insert(object, vec![h1, h2]);
            let cache = Cache::new(Memory::new(context), availability.clone());

            let mut pieces = cache.pieces(object).await.unwrap();
            pieces.sort();
            let mut expected = vec![h1, h2];
            expected.sort();
            assert_eq!(pieces, expected);
            assert_eq!(availability.loads(object), 1);

            // Served from the store afterwards
            let mut pieces = cache.pieces(object).await.unwrap();
            pieces.sort();
            assert_eq!(pieces, expected);
            assert!(cache.contains_all(object, &[h1]).await.unwrap());
            assert_eq!(availability.loads(object), 1);

            // Clearing forces a reload
            cache.clear(object).await.unwrap();
            cache.pieces(object).await.unwrap();
            assert_eq!(availability.loads(object), 2);
        });
    }

    #[test_traced]
    fn test_contains_all() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let availability = mocks::Availability::default();
            let object = ObjectRef::book(1);
            let (h1, h2, h3) = (
                sha256::hash(b"h1"),
                sha256::hash(b"h2"),
                sha256::hash(b"h3"),
            );
            availability.insert(object, vec![h1, h2]);
            let cache = Cache::new(Memory::new(context), availability.clone());

            // Loads on first use
            assert!(cache.contains_all(object, &[h1, h2]).await.unwrap());
            assert_eq!(availability.loads(object), 1);
            assert!(!cache.contains_all(object, &[h1, h3]).await.unwrap());
            assert!(cache.contains_all(object, &[]).await.unwrap());

            // Unknown objects contain nothing
            let missing = ObjectRef::book(2);
            assert!(!cache.contains_all(missing, &[h1]).await.unwrap());
            assert!(cache.pieces(missing).await.unwrap().is_empty());
        });
    }
}
