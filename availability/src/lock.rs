//! Best-effort named mutual exclusion over a [Locks] store.
//!
//! A [Lease] is acquired by polling [Locks::try_lock] with a random owner token until the name
//! is free. While held, a background task extends the lease every half lease duration. If an
//! extension is refused (the lease expired or another process took the name over), the lease is
//! marked lost and a warning is logged: the holder keeps running, just without protection.
//!
//! [Lease::release] stops and joins the renewal task before releasing the name. Dropping a lease
//! without releasing it stops renewal and releases the name from a spawned task.

use crate::{store::Locks, Error};
use commonware_macros::select;
use commonware_runtime::{Clock, Handle, Metrics, Spawner};
use futures::channel::oneshot;
use rand::Rng;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, trace, warn};

/// A held lock on a name.
pub struct Lease<E: Spawner + Clock + Metrics, S: Locks> {
    context: E,
    store: S,
    name: String,
    token: u64,
    lost: Arc<AtomicBool>,

    /// Stops the renewal task and the handle used to join it.
    ///
    /// `None` once the lease has been released.
    renewal: Option<(oneshot::Sender<()>, Handle<()>)>,
}

impl<E: Spawner + Clock + Metrics + Rng, S: Locks> Lease<E, S> {
    /// Block until `name` is acquired, retrying every `retry`.
    ///
    /// The lease lasts `lease` and is renewed in the background until released.
    pub async fn acquire(
        mut context: E,
        store: S,
        name: impl Into<String>,
        lease: Duration,
        retry: Duration,
    ) -> Result<Self, Error> {
        let name = name.into();
        let token: u64 = context.gen();
        while !store.try_lock(&name, token, lease).await? {
            trace!(name, "lock held, retrying");
            context.sleep(retry).await;
        }
        debug!(name, token, "acquired lock");

        // Renew the lease in the background
        let lost = Arc::new(AtomicBool::new(false));
        let (stop, mut stopped) = oneshot::channel::<()>();
        let renewer = context.with_label("renewal").spawn({
            let store = store.clone();
            let name = name.clone();
            let lost = lost.clone();
            move |context| async move {
                let period = lease / 2;
                loop {
                    select! {
                        _ = &mut stopped => {
                            return;
                        },
                        _ = context.sleep(period) => {
                            match store.extend(&name, token, lease).await {
                                Ok(true) => trace!(name, "renewed lease"),
                                Ok(false) => {
                                    lost.store(true, Ordering::Release);
                                    warn!(name, "lease lost, continuing without protection");
                                    return;
                                }
                                Err(err) => warn!(name, ?err, "failed to renew lease"),
                            }
                        },
                    }
                }
            }
        });

        Ok(Self {
            context,
            store,
            name,
            token,
            lost,
            renewal: Some((stop, renewer)),
        })
    }
}

impl<E: Spawner + Clock + Metrics, S: Locks> Lease<E, S> {
    /// The name of the lock.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if a renewal was refused since the lease was acquired.
    pub fn lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Stop renewal and release the name.
    pub async fn release(mut self) {
        if let Some((stop, renewer)) = self.renewal.take() {
            let _ = stop.send(());
            let _ = renewer.await;
        }
        match self.store.unlock(&self.name, self.token).await {
            Ok(true) => debug!(name = self.name, "released lock"),
            Ok(false) => warn!(name = self.name, "lock was no longer held on release"),
            Err(err) => warn!(name = self.name, ?err, "failed to release lock"),
        }
    }
}

impl<E: Spawner + Clock + Metrics, S: Locks> Drop for Lease<E, S> {
    fn drop(&mut self) {
        let Some((stop, _renewer)) = self.renewal.take() else {
            return;
        };
        drop(stop);

        // Release without blocking the dropping task
        let store = self.store.clone();
        let name = std::mem::take(&mut self.name);
        let token = self.token;
        self.context.clone().spawn(move |_| async move {
            if let Err(err) = store.unlock(&name, token).await {
                warn!(name, ?err, "failed to release dropped lock");
            }
        });
    }
}
