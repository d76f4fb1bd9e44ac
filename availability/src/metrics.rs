use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};

/// Metrics for the [crate::Registry].
#[derive(Default)]
pub struct Registry {
    /// Number of heartbeats recorded.
    pub heartbeats: Counter,
    /// Number of providers removed from the registry.
    pub removed: Counter,
    /// Number of live providers at the last count.
    pub live: Gauge,
}

impl Registry {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Self::default();
        context.register(
            "heartbeats",
            "Number of heartbeats recorded",
            metrics.heartbeats.clone(),
        );
        context.register(
            "removed",
            "Number of providers removed from the registry",
            metrics.removed.clone(),
        );
        context.register(
            "live",
            "Number of live providers at the last count",
            metrics.live.clone(),
        );
        metrics
    }
}

/// Metrics for the [crate::Index].
#[derive(Default)]
pub struct Index {
    /// Number of announcements processed.
    pub announced: Counter,
    /// Number of provider/object associations removed.
    pub removed: Counter,
    /// Number of stale provider entries pruned from pieces.
    pub pruned: Counter,
}

impl Index {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Self::default();
        context.register(
            "announced",
            "Number of announcements processed",
            metrics.announced.clone(),
        );
        context.register(
            "removed",
            "Number of provider/object associations removed",
            metrics.removed.clone(),
        );
        context.register(
            "pruned",
            "Number of stale provider entries pruned from pieces",
            metrics.pruned.clone(),
        );
        metrics
    }
}

/// Metrics for the [crate::Scheduler].
#[derive(Default)]
pub struct Scheduler {
    /// Number of refreshes requested.
    pub requested: Counter,
    /// Number of scheduled refreshes pulled earlier by a request.
    pub expedited: Counter,
    /// Number of availability recomputations.
    pub refreshed: Counter,
    /// Number of objects dropped from the schedule because they no longer exist.
    pub deleted: Counter,
    /// Number of objects in the schedule at the last recomputation.
    pub pending: Gauge,
}

impl Scheduler {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Self::default();
        context.register(
            "requested",
            "Number of refreshes requested",
            metrics.requested.clone(),
        );
        context.register(
            "expedited",
            "Number of scheduled refreshes pulled earlier by a request",
            metrics.expedited.clone(),
        );
        context.register(
            "refreshed",
            "Number of availability recomputations",
            metrics.refreshed.clone(),
        );
        context.register(
            "deleted",
            "Number of objects dropped from the schedule because they no longer exist",
            metrics.deleted.clone(),
        );
        context.register(
            "pending",
            "Number of objects in the schedule at the last recomputation",
            metrics.pending.clone(),
        );
        metrics
    }
}

/// Metrics for a [crate::sweeper::Actor].
#[derive(Default)]
pub struct Sweeper {
    /// Number of sweep passes started.
    pub passes: Counter,
    /// Number of items handled successfully.
    pub swept: Counter,
    /// Number of items or passes that failed.
    pub failures: Counter,
    /// Number of passes that continued after losing their lease.
    pub lost: Counter,
}

impl Sweeper {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Self::default();
        context.register(
            "passes",
            "Number of sweep passes started",
            metrics.passes.clone(),
        );
        context.register(
            "swept",
            "Number of items handled successfully",
            metrics.swept.clone(),
        );
        context.register(
            "failures",
            "Number of items or passes that failed",
            metrics.failures.clone(),
        );
        context.register(
            "lost",
            "Number of passes that continued after losing their lease",
            metrics.lost.clone(),
        );
        metrics
    }
}
