use crate::{keys, metrics, store::Store, Error, Settings};
use commonware_codec::DecodeExt;
use commonware_runtime::{Clock, Metrics};
use commonware_utils::SystemTimeExt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tracks which providers are alive.
///
/// Each provider is a member of the `providers` sorted set scored by the time (in milliseconds
/// since epoch) at which its heartbeat lapses. A provider is alive while that time is in the
/// future.
#[derive(Clone)]
pub struct Registry<E: Clock + Metrics, S: Store> {
    context: E,
    store: S,
    settings: Settings,
    metrics: Arc<metrics::Registry>,
}

impl<E: Clock + Metrics, S: Store> Registry<E, S> {
    pub(crate) fn new(context: E, store: S, settings: Settings) -> Self {
        let metrics = Arc::new(metrics::Registry::init(context.clone()));
        Self {
            context,
            store,
            settings,
            metrics,
        }
    }

    /// Returns true if `provider` has heartbeated within the inactivity window.
    pub async fn exists(&self, provider: u64) -> Result<bool, Error> {
        let now = self.context.current().epoch_millis();
        let expiry = self
            .store
            .score(keys::PROVIDERS, &keys::provider(provider))
            .await?;
        Ok(expiry.is_some_and(|expiry| expiry > now as f64))
    }

    /// Returns the number of live providers.
    pub async fn count(&self) -> Result<usize, Error> {
        // Expiries are whole milliseconds, so anything above `now` is at least `now + 1`
        let now = self.context.current().epoch_millis();
        let live = self
            .store
            .count(keys::PROVIDERS, (now + 1) as f64, f64::INFINITY)
            .await?;
        self.metrics.live.set(live as i64);
        Ok(live)
    }

    /// Keep `provider` alive for another inactivity window.
    pub async fn heartbeat(&self, provider: u64) -> Result<(), Error> {
        let window = self.settings.get().inactivity_window;
        let expiry = (self.context.current() + window).epoch_millis();
        self.store
            .upsert(keys::PROVIDERS, keys::provider(provider), expiry as f64)
            .await?;
        self.metrics.heartbeats.inc();
        Ok(())
    }

    /// Remove `provider` from the registry.
    ///
    /// The caller is responsible for removing the provider's associations first.
    pub async fn remove(&self, provider: u64) -> Result<bool, Error> {
        let removed = self
            .store
            .unrank(keys::PROVIDERS, &keys::provider(provider))
            .await?;
        if removed {
            self.metrics.removed.inc();
            debug!(provider, "removed provider");
        }
        Ok(removed)
    }

    /// Returns every provider whose heartbeat has lapsed.
    pub async fn expired(&self) -> Result<Vec<u64>, Error> {
        let now = self.context.current().epoch_millis();
        let members = self
            .store
            .range(keys::PROVIDERS, f64::NEG_INFINITY, now as f64)
            .await?;
        let mut expired = Vec::with_capacity(members.len());
        for member in members {
            match u64::decode(member.clone()) {
                Ok(provider) => expired.push(provider),
                Err(err) => {
                    warn!(?err, "dropping malformed provider");
                    self.store.unrank(keys::PROVIDERS, &member).await?;
                }
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::{Memory, Sorted},
        Config,
    };
    use bytes::Bytes;
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Runner};
    use std::time::Duration;

    const WINDOW: Duration = Duration::from_secs(10);

    fn setup<E: Clock + Metrics>(context: E) -> Registry<E, Memory<E>> {
        let store = Memory::new(context.clone());
        let settings = Settings::new(Config {
            inactivity_window: WINDOW,
            ..Config::default()
        });
        Registry::new(context.with_label("registry"), store, settings)
    }

    #[test_traced]
    fn test_heartbeat_and_expiry() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let registry = setup(context.clone());
            assert!(!registry.exists(1).await.unwrap());
            assert_eq!(registry.count().await.unwrap(), 0);

            registry.heartbeat(1).await.unwrap();
            registry.heartbeat(2).await.unwrap();
            assert!(registry.exists(1).await.unwrap());
            assert_eq!(registry.count().await.unwrap(), 2);
            assert!(registry.expired().await.unwrap().is_empty());

            // Heartbeating again extends the window (last write wins)
            context.sleep(WINDOW / 2).await;
            registry.heartbeat(1).await.unwrap();
            context.sleep(WINDOW / 2).await;
            assert!(registry.exists(1).await.unwrap());
            assert!(!registry.exists(2).await.unwrap());
            assert_eq!(registry.count().await.unwrap(), 1);
            assert_eq!(registry.expired().await.unwrap(), vec![2]);

            // Removal drops the provider entirely
            assert!(registry.remove(2).await.unwrap());
            assert!(!registry.remove(2).await.unwrap());
            assert!(registry.expired().await.unwrap().is_empty());
        });
    }

    #[test_traced]
    fn test_malformed_member_dropped() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let registry = setup(context.clone());
            registry
                .store
                .upsert(keys::PROVIDERS, Bytes::from_static(b"bad"), 0.0)
                .await
                .unwrap();
            registry.heartbeat(3).await.unwrap();
            context.sleep(WINDOW * 2).await;
            assert_eq!(registry.expired().await.unwrap(), vec![3]);
            assert_eq!(
                registry
                    .store
                    .count(keys::PROVIDERS, f64::NEG_INFINITY, f64::INFINITY)
                    .await
                    .unwrap(),
                1
            );
        });
    }
}
