use chrono::{DateTime, Local};
use std::thread;
use std::time::{Duration, Instant};

/// Time as seen by the device link
pub trait Clock {
    /// Wall-clock time, used to stamp frames
    fn now(&self) -> DateTime<Local>;
    /// Monotonic time since the clock was created, used for timeouts
    fn elapsed(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}
