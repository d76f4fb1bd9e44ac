use crate::{
    keys, lock::Lease, metrics, store::Store, Availability, Cache, Error, ObjectRef, Registry,
    Scheduler, Settings,
};
use bytes::Bytes;
use commonware_codec::DecodeExt;
use commonware_cryptography::sha256::Digest;
use commonware_runtime::{Clock, Metrics, Spawner};
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maps pieces to the providers that offer them.
///
/// Every mutation of a provider's associations holds the provider's named [Lease], so
/// concurrent announcements and removals for one provider never interleave. Reads take no lock
/// and prune entries left behind by providers that expired without being cleaned up.
#[derive(Clone)]
pub struct Index<E: Spawner + Clock + Metrics + Rng, S: Store, A: Availability> {
    context: E,
    store: S,
    registry: Registry<E, S>,
    cache: Cache<S, A>,
    scheduler: Scheduler<E, S, A>,
    settings: Settings,
    metrics: Arc<metrics::Index>,
}

impl<E: Spawner + Clock + Metrics + Rng, S: Store, A: Availability> Index<E, S, A> {
    pub(crate) fn new(
        context: E,
        store: S,
        registry: Registry<E, S>,
        cache: Cache<S, A>,
        scheduler: Scheduler<E, S, A>,
        settings: Settings,
    ) -> Self {
        let metrics = Arc::new(metrics::Index::init(context.clone()));
        Self {
            context,
            store,
            registry,
            cache,
            scheduler,
            settings,
            metrics,
        }
    }

    /// Record that `provider` can serve `pieces` of `object`.
    ///
    /// Heartbeats the provider and, if any pieces were announced, requests a refresh of the
    /// object.
    pub async fn announce(
        &self,
        provider: u64,
        object: ObjectRef,
        pieces: &[Digest],
    ) -> Result<(), Error> {
        let lease = self.lock(provider).await?;
        let result = self.announce_locked(provider, object, pieces).await;
        lease.release().await;
        result
    }

    async fn announce_locked(
        &self,
        provider: u64,
        object: ObjectRef,
        pieces: &[Digest],
    ) -> Result<(), Error> {
        self.registry.heartbeat(provider).await?;
        self.store
            .add(&keys::objects(provider), &[object.member()])
            .await?;
        let member = keys::provider(provider);
        for piece in pieces {
            self.store
                .add(&keys::providers(piece), std::slice::from_ref(&member))
                .await?;
        }
        if !pieces.is_empty() {
            self.scheduler.request(object).await?;
        }
        self.metrics.announced.inc();
        debug!(provider, %object, pieces = pieces.len(), "announced");
        Ok(())
    }

    /// Returns the live providers of `piece`, in ascending order.
    ///
    /// Providers that are no longer alive are removed from the piece as a side effect.
    pub async fn providers(&self, piece: &Digest) -> Result<Vec<u64>, Error> {
        let key = keys::providers(piece);
        let members = self.store.members(&key).await?;
        let mut live = Vec::with_capacity(members.len());
        let mut stale: Vec<Bytes> = Vec::new();
        for member in members {
            let Ok(provider) = u64::decode(member.clone()) else {
                stale.push(member);
                continue;
            };
            if self.registry.exists(provider).await? {
                live.push(provider);
            } else {
                stale.push(member);
            }
        }
        if !stale.is_empty() {
            let pruned = self.store.remove(&key, &stale).await?;
            self.metrics.pruned.inc_by(pruned as u64);
            debug!(%piece, pruned, "pruned stale providers");
        }
        live.sort_unstable();
        Ok(live)
    }

    /// Returns the number of providers recorded for `piece`, without checking liveness.
    pub async fn count(&self, piece: &Digest) -> Result<usize, Error> {
        self.store.cardinality(&keys::providers(piece)).await
    }

    /// Returns the objects announced by `provider`.
    pub async fn objects(&self, provider: u64) -> Result<Vec<ObjectRef>, Error> {
        let key = keys::objects(provider);
        let members = self.store.members(&key).await?;
        let mut objects = Vec::with_capacity(members.len());
        for member in members {
            match ObjectRef::decode(member.clone()) {
                Ok(object) => objects.push(object),
                Err(err) => {
                    warn!(provider, ?err, "dropping malformed object");
                    self.store.remove(&key, &[member]).await?;
                }
            }
        }
        Ok(objects)
    }

    /// Returns the fraction of `object`'s pieces recorded with at least one provider.
    ///
    /// Objects without pieces have no coverage.
    pub async fn coverage(&self, object: ObjectRef) -> Result<f64, Error> {
        let pieces = self.cache.pieces(object).await?;
        if pieces.is_empty() {
            return Ok(0.0);
        }
        let mut covered = 0;
        for piece in &pieces {
            if self.count(piece).await? > 0 {
                covered += 1;
            }
        }
        Ok(covered as f64 / pieces.len() as f64)
    }

    /// Withdraw `provider` from every piece of `object`.
    ///
    /// Requests a refresh of the object, unless it no longer has any pieces (it was deleted).
    pub async fn remove_object(&self, provider: u64, object: ObjectRef) -> Result<(), Error> {
        let lease = self.lock(provider).await?;
        let result = self.remove_object_locked(provider, object).await;
        lease.release().await;
        result
    }

    async fn remove_object_locked(&self, provider: u64, object: ObjectRef) -> Result<(), Error> {
        let member = keys::provider(provider);
        let pieces = self.cache.pieces(object).await?;
        for piece in &pieces {
            self.store
                .remove(&keys::providers(piece), std::slice::from_ref(&member))
                .await?;
        }
        self.store
            .remove(&keys::objects(provider), &[object.member()])
            .await?;

        // An object without pieces was deleted and must stay off the schedule
        if pieces.is_empty() {
            debug!(provider, %object, "object has no pieces, skipping refresh");
        } else {
            self.scheduler.request(object).await?;
        }
        self.metrics.removed.inc();
        debug!(provider, %object, "removed provider from object");
        Ok(())
    }

    /// Withdraw `provider` from every object it announced and remove it from the [Registry].
    ///
    /// A failure for one object does not stop the others, but leaves the provider registered
    /// so a later removal (or sweep) can finish the job.
    pub async fn remove_provider(&self, provider: u64) -> Result<(), Error> {
        let lease = self.lock(provider).await?;
        let result = self.remove_provider_locked(provider).await;
        lease.release().await;
        result
    }

    async fn remove_provider_locked(&self, provider: u64) -> Result<(), Error> {
        let mut failure = None;
        for object in self.objects(provider).await? {
            if let Err(err) = self.remove_object_locked(provider, object).await {
                warn!(provider, %object, ?err, "failed to remove provider from object");
                failure = Some(err);
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }
        self.registry.remove(provider).await?;
        Ok(())
    }

    /// Acquire the lock serializing mutations for `provider`.
    async fn lock(&self, provider: u64) -> Result<Lease<E, S>, Error> {
        let config = self.settings.get();
        Lease::acquire(
            self.context.clone(),
            self.store.clone(),
            keys::provider_lock(provider),
            config.lock_lease,
            config.lock_retry,
        )
        .await
    }
}
