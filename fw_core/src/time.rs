// ABOUTME: Timestamp formatting and per-cycle duration measurement.
// ABOUTME: Capture timestamps are wall-clock; cycle timings are monotonic.
use ::time::{format_description::well_known::Rfc3339, OffsetDateTime};
use std::time::{Duration, Instant, SystemTime};

/// Convert a capture timestamp to an RFC3339 string
///
/// # Examples
///
/// ```
/// use fw_core::to_rfc3339;
/// use std::time::{Duration, UNIX_EPOCH};
///
/// let time = UNIX_EPOCH + Duration::from_secs(1_609_459_200); // 2021-01-01
/// assert_eq!(to_rfc3339(time), "2021-01-01T00:00:00Z");
/// ```
pub fn to_rfc3339(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Measures how long one worker cycle takes
///
/// # Examples
///
/// ```
/// use fw_core::CycleTimer;
/// use std::thread;
/// use std::time::Duration;
///
/// let mut timer = CycleTimer::new();
/// thread::sleep(Duration::from_millis(1));
/// let lap = timer.lap();
/// assert!(lap >= Duration::from_millis(1));
/// ```
pub struct CycleTimer {
    start: Instant,
}

impl CycleTimer {
    /// Create a new timer starting now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Time since the timer was created or last lapped
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Return the elapsed time and restart the timer
    pub fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.duration_since(self.start);
        self.start = now;
        elapsed
    }
}

impl Default for CycleTimer {
    fn default() -> Self {
        Self::new()
    }
}
