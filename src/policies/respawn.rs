//! # Respawn backoff for crashed workers.
//!
//! A worker whose component keeps failing is respawned every time; there is
//! no retry limit. [`RespawnBackoff`] only decides how long the failed
//! worker's slot waits before its replacement starts, so a permanently
//! crashing component does not turn into a hot spin.
//!
//! The delay for the `n`-th consecutive failure of a slot is
//! `first × factor^(n-1)`, clamped to `max`, then jittered. A slot's failure
//! count resets once its worker completes a full pass.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use stepvisor::{JitterPolicy, RespawnBackoff};
//!
//! let backoff = RespawnBackoff {
//!     first: Duration::from_millis(50),
//!     max: Duration::from_secs(2),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.delay(1), Duration::from_millis(50));
//! assert_eq!(backoff.delay(3), Duration::from_millis(200));
//! assert_eq!(backoff.delay(20), Duration::from_secs(2));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Delay policy applied between a worker crash and its replacement start.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RespawnBackoff {
    /// Delay after the first failure of a slot.
    pub first: Duration,
    /// Upper bound for the delay.
    pub max: Duration,
    /// Multiplicative growth per consecutive failure (`>= 1.0` recommended).
    pub factor: f64,
    /// Randomization applied after clamping.
    pub jitter: JitterPolicy,
}

impl Default for RespawnBackoff {
    /// Immediate respawn: `first = 0`, `max = 0`, `factor = 1.0`, no jitter.
    fn default() -> Self {
        Self::immediate()
    }
}

impl RespawnBackoff {
    /// Replacement workers start right away.
    pub const fn immediate() -> Self {
        Self {
            first: Duration::ZERO,
            max: Duration::ZERO,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Exponential growth from `first` up to `max`, doubling per failure.
    pub const fn exponential(first: Duration, max: Duration) -> Self {
        Self {
            first,
            max,
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        }
    }

    /// Delay before respawning after `failures` consecutive failures (1-based).
    ///
    /// `failures == 0` means the slot never failed and yields `Duration::ZERO`.
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 || self.max.is_zero() {
            return Duration::ZERO;
        }
        let exp = (failures - 1).min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(first_ms: u64, max_ms: u64, factor: f64) -> RespawnBackoff {
        RespawnBackoff {
            first: Duration::from_millis(first_ms),
            max: Duration::from_millis(max_ms),
            factor,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn immediate_never_waits() {
        let b = RespawnBackoff::immediate();
        for n in 0..50 {
            assert_eq!(b.delay(n), Duration::ZERO);
        }
    }

    #[test]
    fn grows_then_clamps() {
        let b = plain(100, 1_000, 2.0);
        assert_eq!(b.delay(0), Duration::ZERO);
        assert_eq!(b.delay(1), Duration::from_millis(100));
        assert_eq!(b.delay(2), Duration::from_millis(200));
        assert_eq!(b.delay(4), Duration::from_millis(800));
        assert_eq!(b.delay(5), Duration::from_millis(1_000));
        assert_eq!(b.delay(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn first_above_max_is_clamped() {
        let b = plain(5_000, 1_000, 1.0);
        assert_eq!(b.delay(1), Duration::from_millis(1_000));
    }

    #[test]
    fn equal_jitter_stays_within_half_and_base() {
        let b = RespawnBackoff::exponential(Duration::from_millis(100), Duration::from_secs(10));
        for n in 1..10 {
            let base = (100.0 * 2f64.powi(n as i32 - 1)).min(10_000.0) as u64;
            let d = b.delay(n);
            assert!(d >= Duration::from_millis(base / 2), "n={n} d={d:?}");
            assert!(d <= Duration::from_millis(base), "n={n} d={d:?}");
        }
    }
}
