use crate::{
    store::Store,
    sweeper::{self, objects::Objects, providers::Providers},
    Availability, Cache, Config, Error, Index, ObjectRef, Registry, Scheduler, Settings,
};
use commonware_cryptography::sha256::Digest;
use commonware_runtime::{Clock, Handle, Metrics, Spawner};
use rand::Rng;
use std::slice;
use tracing::{debug, info, warn};

/// Entry point for announcing providers and querying who can serve a piece.
///
/// Any number of trackers (in one process or many) may share a [Store]. Queries and mutations
/// can be issued from all of them while the background sweepers, started with
/// [Tracker::start], coordinate through locks in the store.
#[derive(Clone)]
pub struct Tracker<E: Spawner + Clock + Metrics + Rng, S: Store, A: Availability> {
    context: E,
    store: S,
    settings: Settings,

    registry: Registry<E, S>,
    cache: Cache<S, A>,
    scheduler: Scheduler<E, S, A>,
    index: Index<E, S, A>,
}

impl<E: Spawner + Clock + Metrics + Rng, S: Store, A: Availability> Tracker<E, S, A> {
    /// Create a new tracker backed by `store`.
    pub fn new(context: E, store: S, availability: A, config: Config) -> Result<Self, Error> {
        config.validate()?;
        let settings = Settings::new(config);
        let registry = Registry::new(
            context.with_label("registry"),
            store.clone(),
            settings.clone(),
        );
        let cache = Cache::new(store.clone(), availability.clone());
        let scheduler = Scheduler::new(
            context.with_label("scheduler"),
            store.clone(),
            availability,
            cache.clone(),
            settings.clone(),
        );
        let index = Index::new(
            context.with_label("index"),
            store.clone(),
            registry.clone(),
            cache.clone(),
            scheduler.clone(),
            settings.clone(),
        );
        Ok(Self {
            context,
            store,
            settings,
            registry,
            cache,
            scheduler,
            index,
        })
    }

    /// Record that `provider` can serve `pieces` of `object`.
    ///
    /// Fails with [Error::UnknownPiece] (recording nothing) if any piece does not belong to
    /// `object`. If the pieces of `object` cannot be enumerated, the announcement is recorded
    /// without being checked so the provider stays alive.
    pub async fn add_provider(
        &self,
        provider: u64,
        object: ObjectRef,
        pieces: &[Digest],
    ) -> Result<(), Error> {
        match self.cache.contains_all(object, pieces).await {
            Ok(true) => {}
            Ok(false) => {
                for piece in pieces {
                    if !self.cache.contains_all(object, slice::from_ref(piece)).await? {
                        return Err(Error::UnknownPiece(*piece));
                    }
                }
            }
            Err(Error::Availability(reason)) => {
                warn!(provider, %object, reason, "unable to check pieces, announcing anyway");
            }
            Err(err) => return Err(err),
        }
        self.index.announce(provider, object, pieces).await
    }

    /// Withdraw `provider` from `object`, or entirely if no object is given.
    ///
    /// Removing a provider entirely also forgets its registration.
    pub async fn remove_provider(
        &self,
        provider: u64,
        object: Option<ObjectRef>,
    ) -> Result<(), Error> {
        match object {
            Some(object) => self.index.remove_object(provider, object).await,
            None => self.index.remove_provider(provider).await,
        }
    }

    /// Returns the live providers of `piece`, in ascending order.
    pub async fn providers(&self, piece: &Digest) -> Result<Vec<u64>, Error> {
        self.index.providers(piece).await
    }

    /// Returns the number of live providers of `piece` or, if no piece is given, the number of
    /// live providers overall.
    ///
    /// Counting the providers of a piece prunes the ones that are no longer alive, like
    /// [Tracker::providers].
    pub async fn count_providers(&self, piece: Option<&Digest>) -> Result<usize, Error> {
        match piece {
            Some(piece) => Ok(self.index.providers(piece).await?.len()),
            None => self.registry.count().await,
        }
    }

    /// Returns whether `provider` is alive.
    pub async fn provider_exists(&self, provider: u64) -> Result<bool, Error> {
        self.registry.exists(provider).await
    }

    /// Keep `provider` alive without announcing anything.
    pub async fn heartbeat(&self, provider: u64) -> Result<(), Error> {
        self.registry.heartbeat(provider).await
    }

    /// Returns the active configuration.
    pub fn config(&self) -> Config {
        self.settings.get()
    }

    /// Replace the active configuration.
    ///
    /// Takes effect for every component (and running sweeper) of this tracker on its next use.
    pub fn apply(&self, config: Config) -> Result<(), Error> {
        config.validate()?;
        debug!(?config, "applying config");
        self.settings.set(config);
        Ok(())
    }

    pub fn registry(&self) -> &Registry<E, S> {
        &self.registry
    }

    pub fn index(&self) -> &Index<E, S, A> {
        &self.index
    }

    pub fn scheduler(&self) -> &Scheduler<E, S, A> {
        &self.scheduler
    }

    pub fn cache(&self) -> &Cache<S, A> {
        &self.cache
    }

    /// Start the provider and object sweepers in the background.
    ///
    /// Should be called at most once per tracker.
    pub fn start(&self) -> Sweepers {
        let (providers, providers_mailbox) = sweeper::Actor::new(
            self.context.with_label("providers_sweeper"),
            self.store.clone(),
            Providers::new(self.registry.clone(), self.index.clone()),
            self.settings.clone(),
        );
        let (objects, objects_mailbox) = sweeper::Actor::new(
            self.context.with_label("objects_sweeper"),
            self.store.clone(),
            Objects::new(self.scheduler.clone()),
            self.settings.clone(),
        );
        info!("started sweepers");
        Sweepers {
            providers: providers_mailbox,
            objects: objects_mailbox,
            handles: vec![providers.start(), objects.start()],
        }
    }
}

/// Handles to the sweepers of a [Tracker].
pub struct Sweepers {
    /// Mailbox of the sweeper that expires providers.
    pub providers: sweeper::Mailbox,
    /// Mailbox of the sweeper that refreshes objects.
    pub objects: sweeper::Mailbox,

    handles: Vec<Handle<()>>,
}

impl Sweepers {
    /// Stop both sweepers and wait for them to exit.
    pub async fn stop(mut self) {
        // A closed mailbox means the sweeper already exited
        let _ = self.providers.stop().await;
        let _ = self.objects.stop().await;
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("stopped sweepers");
    }
}
