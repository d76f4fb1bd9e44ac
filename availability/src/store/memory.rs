use super::{Locks, Sets, Sorted};
use crate::Error;
use bytes::Bytes;
use commonware_runtime::Clock;
use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};

/// A held lock.
struct Held {
    token: u64,
    expiry: SystemTime,
}

#[derive(Default)]
struct State {
    sets: HashMap<String, BTreeSet<Bytes>>,
    sorted: HashMap<String, HashMap<Bytes, f64>>,
    locks: HashMap<String, Held>,
}

impl State {
    /// Collect members of the sorted set at `key` with a score in `[min, max]`, ordered by
    /// score (ties broken by member).
    fn range(&self, key: &str, min: f64, max: f64) -> Vec<(Bytes, f64)> {
        let Some(entries) = self.sorted.get(key) else {
            return Vec::new();
        };
        let mut matched: Vec<(Bytes, f64)> = entries
            .iter()
            .filter(|(_, score)| **score >= min && **score <= max)
            .map(|(member, score)| (member.clone(), *score))
            .collect();
        matched.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        matched
    }
}

/// An in-process [super::Store].
///
/// Clones share the same state, so every component handed a clone observes the same data. Lock
/// leases are measured against the provided [Clock].
#[derive(Clone)]
pub struct Memory<E: Clock> {
    context: E,
    state: Arc<Mutex<State>>,
}

impl<E: Clock> Memory<E> {
    /// Create an empty store.
    pub fn new(context: E) -> Self {
        Self {
            context,
            state: Arc::new(Mutex::new(State::default())),
        }
    }
}

#[cfg(test)]
impl<E: Clock> Memory<E> {
    /// Forget the lock on `name` whoever holds it.
    pub(crate) fn evict(&self, name: &str) -> bool {
        self.state.lock().unwrap().locks.remove(name).is_some()
    }
}

impl<E: Clock> Sets for Memory<E> {
    async fn add(&self, key: &str, members: &[Bytes]) -> Result<usize, Error> {
        let mut state = self.state.lock().unwrap();
        let set = state.sets.entry(key.to_string()).or_default();
        let added = members
            .iter()
            .filter(|member| set.insert((*member).clone()))
            .count();
        if set.is_empty() {
            state.sets.remove(key);
        }
        Ok(added)
    }

    async fn remove(&self, key: &str, members: &[Bytes]) -> Result<usize, Error> {
        let mut state = self.state.lock().unwrap();
        let Some(set) = state.sets.get_mut(key) else {
            return Ok(0);
        };
        let removed = members.iter().filter(|member| set.remove(*member)).count();
        if set.is_empty() {
            state.sets.remove(key);
        }
        Ok(removed)
    }

    async fn contains(&self, key: &str, member: &[u8]) -> Result<bool, Error> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sets
            .get(key)
            .is_some_and(|set| set.contains(member)))
    }

    async fn members(&self, key: &str) -> Result<Vec<Bytes>, Error> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn cardinality(&self, key: &str) -> Result<usize, Error> {
        let state = self.state.lock().unwrap();
        Ok(state.sets.get(key).map_or(0, BTreeSet::len))
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        let mut state = self.state.lock().unwrap();
        Ok(state.sets.remove(key).is_some())
    }
}

impl<E: Clock> Sorted for Memory<E> {
    async fn upsert(&self, key: &str, member: Bytes, score: f64) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        state
            .sorted
            .entry(key.to_string())
            .or_default()
            .insert(member, score);
        Ok(())
    }

    async fn score(&self, key: &str, member: &[u8]) -> Result<Option<f64>, Error> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sorted
            .get(key)
            .and_then(|entries| entries.get(member).copied()))
    }

    async fn unrank(&self, key: &str, member: &[u8]) -> Result<bool, Error> {
        let mut state = self.state.lock().unwrap();
        let Some(entries) = state.sorted.get_mut(key) else {
            return Ok(false);
        };
        let removed = entries.remove(member).is_some();
        if entries.is_empty() {
            state.sorted.remove(key);
        }
        Ok(removed)
    }

    async fn range(&self, key: &str, min: f64, max: f64) -> Result<Vec<Bytes>, Error> {
        let state = self.state.lock().unwrap();
        Ok(state
            .range(key, min, max)
            .into_iter()
            .map(|(member, _)| member)
            .collect())
    }

    async fn range_with_scores(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<(Bytes, f64)>, Error> {
        let state = self.state.lock().unwrap();
        Ok(state.range(key, min, max))
    }

    async fn remove_range(&self, key: &str, min: f64, max: f64) -> Result<usize, Error> {
        let mut state = self.state.lock().unwrap();
        let Some(entries) = state.sorted.get_mut(key) else {
            return Ok(0);
        };
        let before = entries.len();
        entries.retain(|_, score| *score < min || *score > max);
        let removed = before - entries.len();
        if entries.is_empty() {
            state.sorted.remove(key);
        }
        Ok(removed)
    }

    async fn count(&self, key: &str, min: f64, max: f64) -> Result<usize, Error> {
        let state = self.state.lock().unwrap();
        Ok(state.sorted.get(key).map_or(0, |entries| {
            entries
                .values()
                .filter(|score| **score >= min && **score <= max)
                .count()
        }))
    }
}

impl<E: Clock> Locks for Memory<E> {
    async fn try_lock(&self, name: &str, token: u64, lease: Duration) -> Result<bool, Error> {
        let now = self.context.current();
        let mut state = self.state.lock().unwrap();
        if let Some(held) = state.locks.get(name) {
            if held.token != token && held.expiry > now {
                return Ok(false);
            }
        }
        state.locks.insert(
            name.to_string(),
            Held {
                token,
                expiry: now + lease,
            },
        );
        Ok(true)
    }

    async fn extend(&self, name: &str, token: u64, lease: Duration) -> Result<bool, Error> {
        let now = self.context.current();
        let mut state = self.state.lock().unwrap();
        match state.locks.get_mut(name) {
            Some(held) if held.token == token && held.expiry > now => {
                held.expiry = now + lease;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn unlock(&self, name: &str, token: u64) -> Result<bool, Error> {
        let now = self.context.current();
        let mut state = self.state.lock().unwrap();
        match state.locks.get(name) {
            Some(held) if held.token == token => {
                let live = held.expiry > now;
                state.locks.remove(name);
                Ok(live)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Runner};

    fn member(value: &'static [u8]) -> Bytes {
        Bytes::from_static(value)
    }

    #[test_traced]
    fn test_sets() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let store = Memory::new(context);
            assert_eq!(
                store.add("set", &[member(b"a"), member(b"b")]).await.unwrap(),
                2
            );
            assert_eq!(
                store.add("set", &[member(b"b"), member(b"c")]).await.unwrap(),
                1
            );
            assert_eq!(store.cardinality("set").await.unwrap(), 3);
            assert!(store.contains("set", b"a").await.unwrap());
            assert!(!store.contains("set", b"z").await.unwrap());
            assert!(!store.contains("missing", b"a").await.unwrap());

            assert_eq!(
                store.remove("set", &[member(b"a"), member(b"z")]).await.unwrap(),
                1
            );
            assert_eq!(
                store.members("set").await.unwrap(),
                vec![member(b"b"), member(b"c")]
            );

            // Removing the last members removes the key
            store
                .remove("set", &[member(b"b"), member(b"c")])
                .await
                .unwrap();
            assert!(!store.delete("set").await.unwrap());
            assert!(store.members("set").await.unwrap().is_empty());
        });
    }

    #[test_traced]
    fn test_sorted() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let store = Memory::new(context);
            store.upsert("zset", member(b"c"), 3.0).await.unwrap();
            store.upsert("zset", member(b"a"), 1.0).await.unwrap();
            store.upsert("zset", member(b"b"), 2.0).await.unwrap();
            assert_eq!(store.score("zset", b"b").await.unwrap(), Some(2.0));
            assert_eq!(store.score("zset", b"z").await.unwrap(), None);

            // Update moves the member
            store.upsert("zset", member(b"a"), 4.0).await.unwrap();
            assert_eq!(
                store
                    .range("zset", f64::NEG_INFINITY, f64::INFINITY)
                    .await
                    .unwrap(),
                vec![member(b"b"), member(b"c"), member(b"a")]
            );

            // Ranges are inclusive
            assert_eq!(
                store.range_with_scores("zset", 2.0, 3.0).await.unwrap(),
                vec![(member(b"b"), 2.0), (member(b"c"), 3.0)]
            );
            assert_eq!(store.count("zset", 3.0, 4.0).await.unwrap(), 2);

            assert_eq!(store.remove_range("zset", 0.0, 2.5).await.unwrap(), 1);
            assert!(store.unrank("zset", b"c").await.unwrap());
            assert!(!store.unrank("zset", b"c").await.unwrap());
            assert_eq!(
                store
                    .count("zset", f64::NEG_INFINITY, f64::INFINITY)
                    .await
                    .unwrap(),
                1
            );
        });
    }

    #[test_traced]
    fn test_locks() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let store = Memory::new(context.clone());
            let lease = Duration::from_secs(1);
            assert!(store.try_lock("lock", 1, lease).await.unwrap());
            assert!(!store.try_lock("lock", 2, lease).await.unwrap());

            // Reentrant for the same token
            assert!(store.try_lock("lock", 1, lease).await.unwrap());

            // Only the holder can extend or release
            assert!(!store.extend("lock", 2, lease).await.unwrap());
            assert!(!store.unlock("lock", 2).await.unwrap());
            assert!(store.extend("lock", 1, lease).await.unwrap());

            // An expired lease can be taken over
            context.sleep(Duration::from_secs(2)).await;
            assert!(!store.extend("lock", 1, lease).await.unwrap());
            assert!(store.try_lock("lock", 2, lease).await.unwrap());
            assert!(!store.unlock("lock", 1).await.unwrap());
            assert!(store.unlock("lock", 2).await.unwrap());
            assert!(store.try_lock("lock", 3, lease).await.unwrap());
        });
    }
}
