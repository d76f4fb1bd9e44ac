use crate::Error;
use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

/// Longest offset from now accepted for a liveness or refresh deadline (about 34 years).
///
/// Keeps every deadline exactly representable in a [crate::score].
pub const MAX_INTERVAL: Duration = Duration::from_millis(1 << 40);

/// Configuration for the [crate::Tracker] and the components it wires together.
#[derive(Clone, Debug)]
pub struct Config {
    /// How long a provider stays alive after its last announce or heartbeat.
    pub inactivity_window: Duration,

    /// How long a sweeper sleeps after a pass that found nothing to do.
    pub sweep_interval: Duration,

    /// Duration of a lease on a named lock.
    ///
    /// Held leases are renewed every `lock_lease / 2`. This should be substantially longer than
    /// a single sweep pass.
    pub lock_lease: Duration,

    /// How long to wait before retrying to acquire a held lock.
    pub lock_retry: Duration,

    /// Minimum time between two refreshes of the same object.
    pub min_refresh_interval: Duration,

    /// Factor applied to the refresh interval after each natural refresh.
    pub refresh_multiplier: f64,

    /// Maximum time between two refreshes of the same object.
    ///
    /// If `None`, the maximum grows with the number of scheduled objects.
    pub max_refresh_interval: Option<Duration>,

    /// Recompute availability synchronously whenever a refresh is requested instead of
    /// scheduling it.
    pub immediate_refresh: bool,

    /// The maximum size of each sweeper's mailbox backlog.
    pub mailbox_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inactivity_window: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(1),
            lock_lease: Duration::from_secs(30),
            lock_retry: Duration::from_millis(100),
            min_refresh_interval: Duration::from_secs(1),
            refresh_multiplier: 2.0,
            max_refresh_interval: None,
            immediate_refresh: false,
            mailbox_size: 16,
        }
    }
}

impl Config {
    /// Check that the configuration can be used.
    pub fn validate(&self) -> Result<(), Error> {
        if self.inactivity_window.is_zero() {
            return Err(Error::InvalidConfig("inactivity_window must be positive"));
        }
        if self.inactivity_window > MAX_INTERVAL {
            return Err(Error::InvalidConfig("inactivity_window is too long"));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::InvalidConfig("sweep_interval must be positive"));
        }
        if self.lock_lease < Duration::from_millis(2) {
            return Err(Error::InvalidConfig("lock_lease must be at least 2ms"));
        }
        if self.lock_retry.is_zero() {
            return Err(Error::InvalidConfig("lock_retry must be positive"));
        }
        if self.min_refresh_interval.is_zero() {
            return Err(Error::InvalidConfig("min_refresh_interval must be positive"));
        }
        if self.min_refresh_interval > MAX_INTERVAL {
            return Err(Error::InvalidConfig("min_refresh_interval is too long"));
        }
        if !self.refresh_multiplier.is_finite() || self.refresh_multiplier < 1.0 {
            return Err(Error::InvalidConfig("refresh_multiplier must be at least 1"));
        }
        if let Some(max) = self.max_refresh_interval {
            if max < self.min_refresh_interval {
                return Err(Error::InvalidConfig(
                    "max_refresh_interval must not be below min_refresh_interval",
                ));
            }
            if max > MAX_INTERVAL {
                return Err(Error::InvalidConfig("max_refresh_interval is too long"));
            }
        }
        if self.mailbox_size == 0 {
            return Err(Error::InvalidConfig("mailbox_size must be positive"));
        }
        Ok(())
    }
}

/// Shared handle to the active [Config].
///
/// Every component reads the current value at the start of an operation, so a config applied
/// with [Settings::set] takes effect on the next operation or sweep pass.
#[derive(Clone, Debug)]
pub struct Settings(Arc<RwLock<Config>>);

impl Settings {
    pub fn new(config: Config) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    /// Snapshot the active config.
    pub fn get(&self) -> Config {
        self.0.read().unwrap().clone()
    }

    /// Replace the active config.
    pub fn set(&self, config: Config) {
        *self.0.write().unwrap() = config;
    }
}
