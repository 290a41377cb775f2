//! Fixed-interval spacing between inference calls.
//!
//! The governor hands out one token per interval. A token is released when
//! a call finishes (`release`) and the next call waits for it (`acquire`),
//! so the interval is measured from the end of one call to the start of the
//! next. The wait is paid by the following call rather than after each
//! category, so a run's final category is never followed by a sleep.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::clock::Clock;

pub struct RateGovernor {
    interval: Duration,
    clock: Arc<dyn Clock>,
    next_release: Option<Instant>,
}

impl RateGovernor {
    pub fn new(interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            interval,
            clock,
            next_release: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Mark the end of a call; the next `acquire` waits a full interval
    pub fn release(&mut self) {
        self.next_release = Some(self.clock.now() + self.interval);
    }

    /// Wait until the next call may start. Returns the time spent waiting.
    pub async fn acquire(&mut self) -> Duration {
        let Some(at) = self.next_release.take() else {
            return Duration::ZERO;
        };

        let now = self.clock.now();
        if at <= now {
            return Duration::ZERO;
        }

        let wait = at - now;
        debug!(wait_ms = wait.as_millis() as u64, "Rate governor holding next call");
        self.clock.sleep(wait).await;
        wait
    }
}
