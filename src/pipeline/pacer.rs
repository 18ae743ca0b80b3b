// src/pipeline/pacer.rs
use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};

/// Fixed-interval rate limiter: successive `tick`s complete at least `period` apart.
/// The first tick completes immediately. A zero period disables pacing.
pub struct Pacer {
    interval: Option<Interval>,
}

impl Pacer {
    pub fn new(period: Duration) -> Self {
        let interval = (!period.is_zero()).then(|| {
            let mut interval = tokio::time::interval(period);
            // A slow entity shouldn't be followed by a burst of catch-up ticks.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        Self { interval }
    }

    pub async fn tick(&mut self) {
        if let Some(interval) = self.interval.as_mut() {
            interval.tick().await;
        }
    }
}
