use crate::{
    keys, metrics,
    score::{self, MAX_RESCHEDULES},
    store::Store,
    Availability, Cache, Config, Error, ObjectRef, Settings, MAX_INTERVAL,
};
use commonware_codec::DecodeExt;
use commonware_runtime::{Clock, Metrics};
use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};
use tracing::{debug, info, warn};

/// Outcome of recomputing an object's availability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Refresh {
    /// The object no longer exists and was dropped from the schedule.
    Deleted,

    /// The next natural refresh was scheduled.
    Scheduled {
        /// When the object is next due (truncated to milliseconds).
        at: SystemTime,
        /// Number of consecutive natural refreshes, including this one.
        reschedules: u8,
    },
}

/// Decides when each object's availability is recomputed.
///
/// Objects live in the `schedule` sorted set scored by a packed [score]. Every natural refresh
/// multiplies the interval until the next one, so quiet objects are refreshed less and less
/// often. Provider events pull a pending refresh forward (but never closer than the minimum
/// interval) and reset the backoff.
#[derive(Clone)]
pub struct Scheduler<E: Clock + Metrics, S: Store, A: Availability> {
    context: E,
    store: S,
    availability: A,
    cache: Cache<S, A>,
    settings: Settings,
    metrics: Arc<metrics::Scheduler>,
}

impl<E: Clock + Metrics, S: Store, A: Availability> Scheduler<E, S, A> {
    pub(crate) fn new(
        context: E,
        store: S,
        availability: A,
        cache: Cache<S, A>,
        settings: Settings,
    ) -> Self {
        let metrics = Arc::new(metrics::Scheduler::init(context.clone()));
        Self {
            context,
            store,
            availability,
            cache,
            settings,
            metrics,
        }
    }

    /// Ask for the availability of `object` to be recomputed.
    ///
    /// With [Config::immediate_refresh] set, the recomputation happens before returning (and is
    /// deferred like any other request if the [Availability] service fails). Otherwise an
    /// unscheduled object is scheduled now and a scheduled one is pulled forward to
    /// `now + min_refresh_interval` if that is sooner than its current deadline.
    pub async fn request(&self, object: ObjectRef) -> Result<(), Error> {
        let config = self.settings.get();
        self.metrics.requested.inc();
        if config.immediate_refresh {
            match self.recompute(object).await {
                Ok(_) => return Ok(()),
                Err(Error::Availability(reason)) => {
                    warn!(%object, reason, "immediate refresh failed, deferring");
                }
                Err(err) => return Err(err),
            }
        }

        let member = object.member();
        let now = self.context.current();
        let Some(current) = self.store.score(keys::SCHEDULE, &member).await? else {
            self.store
                .upsert(keys::SCHEDULE, member, score::encode(now, 0))
                .await?;
            debug!(%object, "scheduled refresh");
            return Ok(());
        };

        // Never refresh faster than the minimum interval and never delay a sooner refresh
        let (at, _) = score::decode(current);
        let candidate = score::truncate(now + config.min_refresh_interval);
        if candidate < at {
            self.store
                .upsert(keys::SCHEDULE, member, score::encode(candidate, 0))
                .await?;
            self.metrics.expedited.inc();
            debug!(%object, "expedited refresh");
        }
        Ok(())
    }

    /// Recompute the availability of `object` now and schedule its next refresh.
    pub async fn recompute(&self, object: ObjectRef) -> Result<Refresh, Error> {
        let reschedules = self
            .store
            .score(keys::SCHEDULE, &object.member())
            .await?
            .map_or(0, |current| score::decode(current).1);
        self.refresh(object, reschedules).await
    }

    /// Recompute the availability of `object`, which has been naturally refreshed
    /// `reschedules` times in a row.
    pub(crate) async fn refresh(&self, object: ObjectRef, reschedules: u8) -> Result<Refresh, Error> {
        self.metrics.refreshed.inc();
        if !self.availability.update(object).await? {
            self.store.unrank(keys::SCHEDULE, &object.member()).await?;
            self.cache.clear(object).await?;
            self.metrics.deleted.inc();
            info!(%object, "object no longer exists, dropped from schedule");
            return Ok(Refresh::Deleted);
        }

        let pending = self.pending().await?;
        self.metrics.pending.set(pending as i64);
        let interval = interval(&self.settings.get(), reschedules, pending);
        let at = score::truncate(self.context.current() + interval);
        let reschedules = reschedules.saturating_add(1);
        self.store
            .upsert(
                keys::SCHEDULE,
                object.member(),
                score::encode(at, reschedules as u32),
            )
            .await?;
        debug!(%object, ?interval, reschedules, "refreshed availability");
        Ok(Refresh::Scheduled { at, reschedules })
    }

    /// Returns every scheduled object that is due, with its reschedule count.
    pub async fn due(&self) -> Result<Vec<(ObjectRef, u8)>, Error> {
        let bound = score::encode(self.context.current(), MAX_RESCHEDULES as u32);
        let entries = self
            .store
            .range_with_scores(keys::SCHEDULE, f64::NEG_INFINITY, bound)
            .await?;
        let mut due = Vec::with_capacity(entries.len());
        for (member, current) in entries {
            match ObjectRef::decode(member.clone()) {
                Ok(object) => due.push((object, score::decode(current).1)),
                Err(err) => {
                    warn!(?err, "dropping malformed schedule entry");
                    self.store.unrank(keys::SCHEDULE, &member).await?;
                }
            }
        }
        Ok(due)
    }

    /// Returns the number of scheduled objects.
    pub async fn pending(&self) -> Result<usize, Error> {
        self.store
            .count(keys::SCHEDULE, f64::NEG_INFINITY, f64::INFINITY)
            .await
    }

    /// Returns when `object` is next due and its reschedule count, if scheduled.
    pub async fn scheduled(&self, object: ObjectRef) -> Result<Option<(SystemTime, u8)>, Error> {
        Ok(self
            .store
            .score(keys::SCHEDULE, &object.member())
            .await?
            .map(score::decode))
    }
}

/// Compute the interval until the next natural refresh of an object refreshed `reschedules`
/// times in a row, with `pending` objects scheduled.
///
/// Without a configured maximum, the ceiling is `pending / (min_secs * multiplier)` seconds
/// (never below the minimum interval), so a crowded schedule backs off further.
fn interval(config: &Config, reschedules: u8, pending: usize) -> Duration {
    let min = config.min_refresh_interval;
    let max = match config.max_refresh_interval {
        Some(max) => max,
        None => {
            let secs = pending as f64 / (min.as_secs_f64() * config.refresh_multiplier);
            Duration::try_from_secs_f64(secs).unwrap_or(MAX_INTERVAL)
        }
    }
    .clamp(min, MAX_INTERVAL.max(min));
    let backoff = min.as_secs_f64() * config.refresh_multiplier.powi(reschedules as i32 + 1);
    Duration::try_from_secs_f64(backoff).map_or(max, |backoff| backoff.clamp(min, max))
}
