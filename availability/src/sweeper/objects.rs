//! Executes due availability refreshes.

use super::{Batch, Sweep};
use crate::{store::Store, Availability, Error, Refresh, Scheduler};
use commonware_runtime::{Clock, Metrics};
use futures::future::join_all;
use tracing::{debug, warn};

/// Recomputes the availability of every object whose refresh is due.
///
/// Due objects are refreshed concurrently. An object that failed to refresh keeps its entry and
/// is retried by a later pass.
#[derive(Clone)]
pub struct Objects<E: Clock + Metrics, S: Store, A: Availability> {
    scheduler: Scheduler<E, S, A>,
}

impl<E: Clock + Metrics, S: Store, A: Availability> Objects<E, S, A> {
    pub fn new(scheduler: Scheduler<E, S, A>) -> Self {
        Self { scheduler }
    }
}

impl<E: Clock + Metrics, S: Store, A: Availability> Sweep for Objects<E, S, A> {
    const NAME: &'static str = "objects";

    async fn batch(&self) -> Result<Batch, Error> {
        let due = self.scheduler.due().await?;
        let results = join_all(
            due.iter()
                .map(|(object, reschedules)| self.scheduler.refresh(*object, *reschedules)),
        )
        .await;

        let mut batch = Batch::default();
        for ((object, _), result) in due.iter().zip(results) {
            match result {
                Ok(Refresh::Deleted) => {
                    batch.processed += 1;
                    debug!(%object, "dropped deleted object");
                }
                Ok(Refresh::Scheduled { .. }) => batch.processed += 1,
                Err(err) => {
                    batch.failed += 1;
                    warn!(%object, ?err, "failed to refresh object");
                }
            }
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mocks, store::Memory, Config, ObjectRef, Tracker};
    use commonware_cryptography::sha256;
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Runner};
    use std::time::Duration;

    #[test_traced]
    fn test_refreshes_due_objects() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let store = Memory::new(context.clone());
            let availability = mocks::Availability::default();
            let tracker = Tracker::new(
                context.clone(),
                store,
                availability.clone(),
                Config::default(),
            )
            .unwrap();
            let sweep = Objects::new(tracker.scheduler().clone());

            let (b1, b2, b3) = (ObjectRef::book(1), ObjectRef::book(2), ObjectRef::book(3));
            let h = sha256::hash(b"h");
            for object in [b1, b2, b3] {
                availability.insert(object, vec![h]);
                tracker.add_provider(1, object, &[h]).await.unwrap();
            }

            // One object fails, one is deleted, one refreshes normally
            availability.fail(b1, true);
            availability.delete(b2);
            let batch = sweep.batch().await.unwrap();
            assert_eq!(
                batch,
                Batch {
                    processed: 2,
                    failed: 1
                }
            );
            assert!(tracker.scheduler().scheduled(b1).await.unwrap().is_some());
            assert!(tracker.scheduler().scheduled(b2).await.unwrap().is_none());
            let (at, reschedules) = tracker.scheduler().scheduled(b3).await.unwrap().unwrap();
            assert_eq!(reschedules, 1);
            assert!(at > context.current());

            // Only the failed object is still due
            let updates = availability.updates(b3);
            availability.fail(b1, false);
            let batch = sweep.batch().await.unwrap();
            assert_eq!(batch.processed, 1);
            assert_eq!(availability.updates(b3), updates);
            assert_eq!(sweep.batch().await.unwrap(), Batch::default());

            // Everything comes due again after its interval
            context.sleep(Duration::from_secs(5)).await;
            let batch = sweep.batch().await.unwrap();
            assert_eq!(batch.processed, 2);
            assert_eq!(availability.updates(b2), 1);
        });
    }
}
