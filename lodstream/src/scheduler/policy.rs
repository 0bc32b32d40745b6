//! Retry schedule and admission order for tile loads.
//!
//! [`RetryPolicy::retry_after`] decides, per failed load, whether the tile
//! goes back into the queue and how long it waits first. [`LoadPriority`]
//! orders the pending loads (greater = sooner).
//!
//! ```ignore
//! use lodstream::scheduler::{LoadPriority, RetryPolicy};
//!
//! let policy = RetryPolicy::new(3);
//! assert!(LoadPriority::new(10.0, 5.0) > LoadPriority::new(200.0, 5.0));
//! ```

use crate::loader::LoadError;
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

/// Attempts per tile, first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Wait before the first retry of a tile.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// No single wait grows past this.
pub const DEFAULT_RETRY_DELAY_CAP: Duration = Duration::from_secs(30);

/// When a failed tile load is tried again.
///
/// Only failures that [`LoadError::is_retryable`] accepts are retried
/// (transient network errors). Malformed payloads and cancelled loads fail
/// on the first attempt whatever the attempt budget. Waits double after each
/// failure unless the policy is [`constant`](Self::constant).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    first_delay: Duration,
    delay_cap: Duration,
    doubling: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// Doubling waits starting at [`DEFAULT_RETRY_DELAY`].
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            first_delay: DEFAULT_RETRY_DELAY,
            delay_cap: DEFAULT_RETRY_DELAY_CAP,
            doubling: true,
        }
    }

    /// The same wait before every retry.
    pub fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            first_delay: delay,
            delay_cap: delay,
            doubling: false,
        }
    }

    /// Every load gets exactly one attempt.
    pub fn single_attempt() -> Self {
        Self::new(1)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_delays(mut self, first: Duration, cap: Duration) -> Self {
        self.first_delay = first;
        self.delay_cap = cap.max(first);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// How long to wait before trying a tile again after `error` ended its
    /// `attempts`-th attempt, or `None` when the tile has failed for good.
    pub fn retry_after(&self, error: &LoadError, attempts: u32) -> Option<Duration> {
        if !error.is_retryable() || attempts >= self.max_attempts {
            return None;
        }
        if !self.doubling {
            return Some(self.first_delay);
        }
        let factor = 2u32.saturating_pow(attempts.saturating_sub(1));
        Some(self.first_delay.saturating_mul(factor).min(self.delay_cap))
    }
}

// =============================================================================
// Load Priority
// =============================================================================

/// Admission priority of a tile load.
///
/// Closer tiles are more urgent; at equal distance the tile with the smaller
/// geometric error (finer detail) wins. Compares with `f64::total_cmp`, so
/// the order is total even for degenerate inputs.
#[derive(Clone, Copy, Debug)]
pub struct LoadPriority {
    /// Distance from the camera to the tile's bounding volume, in metres.
    pub distance: f64,
    pub geometric_error: f64,
}

impl LoadPriority {
    pub fn new(distance: f64, geometric_error: f64) -> Self {
        Self {
            distance,
            geometric_error,
        }
    }
}

impl PartialEq for LoadPriority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LoadPriority {}

impl PartialOrd for LoadPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LoadPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        // Smaller values are more urgent, so compare reversed
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.geometric_error.total_cmp(&self.geometric_error))
    }
}

impl fmt::Display for LoadPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d={:.1}m ge={:.2}", self.distance, self.geometric_error)
    }
}
