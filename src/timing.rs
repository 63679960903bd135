//! Monotonic clock for frame timestamps.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic clock shared by everything that stamps frames in one session.
///
/// All timestamps derive from the single start instant so they are ordered
/// and comparable across the capture loop and direct pulls.
#[derive(Debug, Clone)]
pub struct CaptureClock {
    start: Arc<Instant>,
}

impl CaptureClock {
    /// Create a clock with the current instant as time zero.
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    /// Microseconds elapsed since the clock was created.
    #[inline]
    pub fn timestamp_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// The start instant, for sharing a timebase with other components.
    pub fn start_instant(&self) -> Instant {
        *self.start
    }
}

impl Default for CaptureClock {
    fn default() -> Self {
        Self::new()
    }
}
