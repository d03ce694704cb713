// Fixed-frequency loop timing for velocity publishing

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

use super::driver::MotionError;

/// Keeps a loop running at a fixed frequency
///
/// The first `sleep` returns one period after construction, so a loop that
/// publishes and then sleeps spaces its messages evenly from the start.
pub struct Rate {
    period: Duration,
    tick: Interval,
}

impl Rate {
    /// Fails unless `hz` gives a finite, nonzero period
    pub fn new(hz: f64) -> Result<Self, MotionError> {
        if !(hz > 0.0) {
            return Err(MotionError::InvalidRate(hz));
        }
        let period = Duration::try_from_secs_f64(1.0 / hz)
            .ok()
            .filter(|period| !period.is_zero())
            .ok_or(MotionError::InvalidRate(hz))?;

        let mut tick = interval_at(Instant::now() + period, period);
        // A late tick pushes the schedule back instead of bursting to catch up
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ok(Self { period, tick })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sleep until the next period boundary
    pub async fn sleep(&mut self) {
        self.tick.tick().await;
    }
}
