//! Frame pacing and rate-limited logging helpers shared by the real-time loops.

use crate::ring_buffer::RingBuffer;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Fixed-period loop pacing.
///
/// Each tick sleeps whatever is left of the period after the work that
/// preceded it. Overrunning ticks start the next one immediately; there is no
/// catch-up.
#[derive(Debug)]
pub struct FrameClock {
    period: Duration,
    tick_start: Instant,
}

impl FrameClock {
    /// `rate` in ticks per second. Rates with no representable period fall
    /// back to one tick per second.
    pub fn from_rate(rate: f32) -> Self {
        let period = if rate.is_finite() && rate > 0.0 {
            Duration::try_from_secs_f32(1.0 / rate).unwrap_or(Duration::from_secs(1))
        } else {
            Duration::from_secs(1)
        };
        Self::new(period)
    }

    pub fn new(period: Duration) -> Self {
        Self {
            period,
            tick_start: Instant::now(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Mark the start of a unit of work.
    pub fn begin(&mut self) {
        self.tick_start = Instant::now();
    }

    /// Time spent since [`FrameClock::begin`].
    pub fn elapsed(&self) -> Duration {
        self.tick_start.elapsed()
    }

    /// Time left in the current period, zero when the work overran.
    pub fn remaining(&self) -> Duration {
        self.period.saturating_sub(self.elapsed())
    }
}

/// Rolling record of per-frame compute times, logged periodically at debug level.
pub struct FrameStats {
    label: String,
    samples: RingBuffer<Duration>,
    last_report: Instant,
    report_every: Duration,
}

impl FrameStats {
    pub fn new(label: impl Into<String>, capacity: usize) -> Self {
        Self {
            label: label.into(),
            samples: RingBuffer::new(capacity),
            last_report: Instant::now(),
            report_every: Duration::from_secs(10),
        }
    }

    pub fn record(&mut self, compute: Duration) {
        self.samples.push(compute);
        if self.last_report.elapsed() >= self.report_every {
            self.last_report = Instant::now();
            if let (Some(avg), Some(max)) = (self.average(), self.max()) {
                debug!(
                    "{}: avg frame {:.2} ms, max {:.2} ms over {} frames",
                    self.label,
                    avg.as_secs_f64() * 1000.0,
                    max.as_secs_f64() * 1000.0,
                    self.samples.len()
                );
            }
        }
    }

    pub fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }

    pub fn max(&self) -> Option<Duration> {
        self.samples.iter().max().copied()
    }
}

/// At most one log line per key per interval.
pub struct LogThrottle {
    interval: Duration,
    last: Mutex<HashMap<String, Instant>>,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true when a message for `key` may be logged now.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock();
        match last.get(key) {
            Some(previous) if now.duration_since(*previous) < self.interval => false,
            _ => {
                last.insert(key.to_string(), now);
                true
            }
        }
    }
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
