//! Removes providers whose heartbeat lapsed.

use super::{Batch, Sweep};
use crate::{store::Store, Availability, Error, Index, Registry};
use commonware_runtime::{Clock, Metrics, Spawner};
use rand::Rng;
use tracing::{info, warn};

/// Expires providers that have not heartbeated within the inactivity window.
///
/// Each expired provider is removed with all of its associations. Failures are isolated per
/// provider, which stays registered (and so expired) until a later pass removes it.
#[derive(Clone)]
pub struct Providers<E: Spawner + Clock + Metrics + Rng, S: Store, A: Availability> {
    registry: Registry<E, S>,
    index: Index<E, S, A>,
}

impl<E: Spawner + Clock + Metrics + Rng, S: Store, A: Availability> Providers<E, S, A> {
    pub fn new(registry: Registry<E, S>, index: Index<E, S, A>) -> Self {
        Self { registry, index }
    }
}

impl<E: Spawner + Clock + Metrics + Rng, S: Store, A: Availability> Sweep for Providers<E, S, A> {
    const NAME: &'static str = "providers";

    async fn batch(&self) -> Result<Batch, Error> {
        let mut batch = Batch::default();
        for provider in self.registry.expired().await? {
            match self.index.remove_provider(provider).await {
                Ok(()) => {
                    batch.processed += 1;
                    info!(provider, "expired provider");
                }
                Err(err) => {
                    batch.failed += 1;
                    warn!(provider, ?err, "failed to expire provider");
                }
            }
        }
        Ok(batch)
    }
}
