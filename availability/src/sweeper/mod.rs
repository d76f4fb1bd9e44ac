//! Background loops that expire providers and execute due refreshes.
//!
//! # Overview
//!
//! A sweeper [Actor] repeatedly runs passes of some [Sweep] work. Each pass holds the lock
//! `lock:sweep:{name}` in the store so that, among all instances sharing a store, only one runs
//! a given sweep at a time. Within a pass the actor keeps asking for batches until one comes
//! back empty, so items that become due while a batch is processed are picked up before the
//! lock is released. The actor then sleeps for the sweep interval (or until woken through its
//! [Mailbox]) and starts over.
//!
//! # Fault Tolerance
//!
//! A failing item never aborts its batch: it is logged, counted, and left for the next pass
//! (which ends the current pass so the failing item is not retried in a tight loop). A failing
//! pass is logged and the actor keeps running after its normal sleep.
//!
//! Two sweeps are provided:
//! - [providers::Providers] removes providers whose heartbeat lapsed (with all of their
//!   associations).
//! - [objects::Objects] recomputes the availability of every due object concurrently.

use crate::{keys, lock::Lease, metrics, store::Store, Error, Settings};
use commonware_macros::select;
use commonware_runtime::{Clock, Handle, Metrics, Spawner};
use futures::{channel::mpsc, pin_mut, StreamExt};
use rand::Rng;
use std::future::Future;
use tracing::{debug, info, trace, warn};

mod ingress;
pub use ingress::Mailbox;
use ingress::Message;
pub mod objects;
pub mod providers;

/// Outcome of a single batch of sweep work.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    /// Items handled successfully.
    pub processed: usize,
    /// Items that failed and remain for a later pass.
    pub failed: usize,
}

/// Work performed by a sweeper [Actor].
pub trait Sweep: Send + Sync + 'static {
    /// Name of the sweep, used for its lock and in logs.
    const NAME: &'static str;

    /// Handle everything that is currently due.
    fn batch(&self) -> impl Future<Output = Result<Batch, Error>> + Send;
}

/// Runs passes of sweep work.
struct Sweeper<E: Spawner + Clock + Metrics + Rng, S: Store, W: Sweep> {
    context: E,
    store: S,
    work: W,
    settings: Settings,
    metrics: metrics::Sweeper,
}

impl<E: Spawner + Clock + Metrics + Rng, S: Store, W: Sweep> Sweeper<E, S, W> {
    /// Sweep under the lock until nothing is left, returning how many items were handled.
    async fn pass(&self) -> Result<usize, Error> {
        let config = self.settings.get();
        self.metrics.passes.inc();
        let lease = Lease::acquire(
            self.context.clone(),
            self.store.clone(),
            keys::sweep_lock(W::NAME),
            config.lock_lease,
            config.lock_retry,
        )
        .await?;

        let mut swept = 0;
        let mut warned = false;
        let result = loop {
            if !warned && lease.lost() {
                warned = true;
                self.metrics.lost.inc();
                warn!(sweep = W::NAME, "lease lost, sweeping without protection");
            }
            let batch = match self.work.batch().await {
                Ok(batch) => batch,
                Err(err) => break Err(err),
            };
            swept += batch.processed;
            self.metrics.swept.inc_by(batch.processed as u64);
            if batch.failed > 0 {
                self.metrics.failures.inc_by(batch.failed as u64);
                warn!(
                    sweep = W::NAME,
                    failed = batch.failed,
                    "items failed, deferring to next pass"
                );
                break Ok(swept);
            }
            if batch.processed == 0 {
                break Ok(swept);
            }
        };
        lease.release().await;
        result
    }
}

/// Drives a [Sweep] until stopped.
pub struct Actor<E: Spawner + Clock + Metrics + Rng, S: Store, W: Sweep> {
    sweeper: Sweeper<E, S, W>,
    mailbox: mpsc::Receiver<Message>,
}

impl<E: Spawner + Clock + Metrics + Rng, S: Store, W: Sweep> Actor<E, S, W> {
    pub(crate) fn new(context: E, store: S, work: W, settings: Settings) -> (Self, Mailbox) {
        let (sender, mailbox) = mpsc::channel(settings.get().mailbox_size);
        let metrics = metrics::Sweeper::init(context.clone());
        (
            Self {
                sweeper: Sweeper {
                    context,
                    store,
                    work,
                    settings,
                    metrics,
                },
                mailbox,
            },
            Mailbox::new(sender),
        )
    }

    /// Start the actor and run it in the background.
    pub fn start(self) -> Handle<()> {
        self.sweeper.context.clone().spawn(|_| self.run())
    }

    async fn run(mut self) {
        debug!(sweep = W::NAME, "started sweeper");
        loop {
            // Sweep while watching for a stop request
            let result = {
                let pass = self.sweeper.pass();
                pin_mut!(pass);
                loop {
                    select! {
                        message = self.mailbox.next() => {
                            match message {
                                Some(Message::Sweep) => {
                                    trace!(sweep = W::NAME, "pass already in progress");
                                }
                                Some(Message::Stop) | None => {
                                    debug!(sweep = W::NAME, "stopping sweeper");
                                    return;
                                }
                            }
                        },
                        result = &mut pass => {
                            break result;
                        },
                    }
                }
            };
            match result {
                Ok(0) => trace!(sweep = W::NAME, "nothing to sweep"),
                Ok(swept) => info!(sweep = W::NAME, swept, "completed pass"),
                Err(err) => {
                    self.sweeper.metrics.failures.inc();
                    warn!(sweep = W::NAME, ?err, "pass failed");
                }
            }

            // Wait for the next pass
            let interval = self.sweeper.settings.get().sweep_interval;
            select! {
                message = self.mailbox.next() => {
                    match message {
                        Some(Message::Sweep) => {
                            trace!(sweep = W::NAME, "pass requested");
                        }
                        Some(Message::Stop) | None => {
                            debug!(sweep = W::NAME, "stopping sweeper");
                            return;
                        }
                    }
                },
                _ = self.sweeper.context.sleep(interval) => {},
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::{Locks, Memory},
        Config,
    };
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Runner};
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    /// Handles one item per batch. Handling the first item takes the sweep lock over on behalf
    /// of another instance.
    struct Takeover {
        context: deterministic::Context,
        store: Memory<deterministic::Context>,
        remaining: Arc<Mutex<usize>>,
        total: usize,
    }

    impl Sweep for Takeover {
        const NAME: &'static str = "takeover";

        async fn batch(&self) -> Result<Batch, Error> {
            let first = {
                let mut remaining = self.remaining.lock().unwrap();
                if *remaining == 0 {
                    return Ok(Batch::default());
                }
                *remaining -= 1;
                *remaining + 1 == self.total
            };
            if first {
                let name = keys::sweep_lock(Self::NAME);
                assert!(self.store.evict(&name));
                assert!(self
                    .store
                    .try_lock(&name, u64::MAX, Duration::from_secs(3600))
                    .await
                    .unwrap());
                self.context.sleep(Duration::from_secs(1)).await;
            }
            Ok(Batch {
                processed: 1,
                failed: 0,
            })
        }
    }

    #[test_traced]
    fn test_lease_lost_mid_pass() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let store = Memory::new(context.clone());
            let remaining = Arc::new(Mutex::new(3));
            let work = Takeover {
                context: context.clone(),
                store: store.clone(),
                remaining: remaining.clone(),
                total: 3,
            };
            let settings = Settings::new(Config {
                lock_lease: Duration::from_secs(1),
                lock_retry: Duration::from_millis(10),
                sweep_interval: Duration::from_secs(3600),
                ..Config::default()
            });
            let (actor, mut mailbox) =
                Actor::new(context.with_label("sweeper"), store.clone(), work, settings);
            let lost = actor.sweeper.metrics.lost.clone();
            let swept = actor.sweeper.metrics.swept.clone();
            let passes = actor.sweeper.metrics.passes.clone();
            let handle = actor.start();

            // The renewal is refused halfway through the first item
            context.sleep(Duration::from_secs(5)).await;
            assert_eq!(lost.get(), 1);
            assert_eq!(passes.get(), 1);

            // Every item was still handled in the same pass
            assert_eq!(swept.get(), 3);
            assert_eq!(*remaining.lock().unwrap(), 0);

            // The other instance keeps the lock
            let name = keys::sweep_lock(Takeover::NAME);
            assert!(!store
                .try_lock(&name, 1, Duration::from_secs(1))
                .await
                .unwrap());

            mailbox.stop().await.unwrap();
            handle.await.unwrap();
        });
    }
}
