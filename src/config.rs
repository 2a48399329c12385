//! # Engine configuration.
//!
//! [`Config`] centralizes the settings of the worker pool, the scheduler tick
//! and the event bus. It is passed once to [`Engine::builder`](crate::Engine::builder).
//!
//! ## Sentinel values
//! - `workers = 0` → clamped to one worker
//! - `bus_capacity = 0` → clamped to 1
//! - `tick_interval = 0s` → clamped to 1ms

use std::time::Duration;

use crate::policies::RespawnBackoff;

/// How many deferred action subscriptions a scheduler tick resolves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DrainPolicy {
    /// Resolve at most one queued subscription per tick (FIFO).
    OnePerTick,
    /// Resolve every queued subscription whose action exists.
    #[default]
    All,
}

/// Global configuration for the engine.
///
/// ## Field semantics
/// - `workers`: fixed worker count used by rebuilds (ignored in one-per-component mode)
/// - `one_worker_per_component`: size the pool to the registry on every rebuild
/// - `stop_timeout`: bound on how long stopping a worker waits for its loop to exit
/// - `tick_interval`: period of the scheduler tick driven by [`Engine::run`](crate::Engine::run)
/// - `subscription_drain`: how the tick resolves deferred action subscriptions
/// - `respawn_backoff`: delay before a crashed worker's replacement starts
/// - `bus_capacity`: event bus ring buffer size
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of worker threads built by a rebuild.
    pub workers: usize,

    /// When `true`, every rebuild creates exactly one worker per registered component.
    pub one_worker_per_component: bool,

    /// Maximum wait for a worker loop to observe a stop request.
    ///
    /// After this bound the stop gives up (logged as `WorkerStopTimedOut`)
    /// instead of deadlocking on a component stuck in a blocking `step()`.
    pub stop_timeout: Duration,

    /// Period of the scheduler tick.
    pub tick_interval: Duration,

    /// Deferred subscription resolution per tick.
    pub subscription_drain: DrainPolicy,

    /// Delay policy for respawning crashed workers.
    pub respawn_backoff: RespawnBackoff,

    /// Capacity of the event bus broadcast channel.
    ///
    /// Subscribers lagging more than `bus_capacity` events skip the oldest ones.
    pub bus_capacity: usize,
}

impl Config {
    /// Worker count for a rebuild over `components` registered components.
    ///
    /// One-per-component mode follows the registry exactly, so an empty
    /// registry builds no workers. The fixed count is clamped to at least 1.
    #[inline]
    pub fn worker_count(&self, components: usize) -> usize {
        if self.one_worker_per_component {
            components
        } else {
            self.workers.max(1)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the tick interval clamped to a minimum of 1ms.
    #[inline]
    pub fn tick_interval_clamped(&self) -> Duration {
        self.tick_interval.max(Duration::from_millis(1))
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `workers = 5`
    /// - `one_worker_per_component = false`
    /// - `stop_timeout = 2s`
    /// - `tick_interval = 10ms`
    /// - `subscription_drain = DrainPolicy::All`
    /// - `respawn_backoff = RespawnBackoff::immediate()`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            workers: 5,
            one_worker_per_component: false,
            stop_timeout: Duration::from_secs(2),
            tick_interval: Duration::from_millis(10),
            subscription_drain: DrainPolicy::default(),
            respawn_backoff: RespawnBackoff::immediate(),
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_modes() {
        let mut cfg = Config::default();
        assert_eq!(cfg.worker_count(12), 5);

        cfg.workers = 0;
        assert_eq!(cfg.worker_count(12), 1);

        cfg.one_worker_per_component = true;
        assert_eq!(cfg.worker_count(12), 12);
        assert_eq!(cfg.worker_count(0), 0);
    }

    #[test]
    fn clamps() {
        let cfg = Config {
            bus_capacity: 0,
            tick_interval: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(cfg.tick_interval_clamped(), Duration::from_millis(1));
    }
}
