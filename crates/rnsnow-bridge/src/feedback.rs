//! Local visual feedback (the LED on a device).
//!
//! Blinks are fire-and-forget: the caller never waits for a pattern to finish
//! and nothing guarantees it completes before shutdown.

use std::time::Duration;

use tracing::trace;

/// `times` on/off cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkPattern {
    pub times: u8,
    pub on: Duration,
    pub off: Duration,
}

impl BlinkPattern {
    /// A frame went out over the radio.
    pub const SEND: Self = Self::new(1, 10, 0);
    /// Presence ping sent or received.
    pub const PING: Self = Self::new(3, 50, 50);

    pub const fn new(times: u8, on_ms: u64, off_ms: u64) -> Self {
        Self {
            times,
            on: Duration::from_millis(on_ms),
            off: Duration::from_millis(off_ms),
        }
    }

    pub fn duration(&self) -> Duration {
        (self.on + self.off) * u32::from(self.times)
    }
}

pub trait Feedback: Send + Sync {
    fn blink(&self, pattern: BlinkPattern);
}

/// Discards every blink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFeedback;

impl Feedback for NoFeedback {
    fn blink(&self, _pattern: BlinkPattern) {}
}

/// Plays patterns as trace events on a detached task.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFeedback;

impl Feedback for LogFeedback {
    fn blink(&self, pattern: BlinkPattern) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            trace!(times = pattern.times, "blink (no runtime)");
            return;
        };
        trace!(target: "rnsnow::led", times = pattern.times, total = ?pattern.duration(), "blink");
        runtime.spawn(async move {
            for n in 1..=pattern.times {
                trace!(target: "rnsnow::led", n, "on");
                tokio::time::sleep(pattern.on).await;
                trace!(target: "rnsnow::led", n, "off");
                tokio::time::sleep(pattern.off).await;
            }
        });
    }
}
