use crate::config::ReconnectConfig;
use rand::Rng;
use std::time::Duration;

/// Exponential reconnect delay, reset after every successful connection
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Backoff {
        Backoff { config, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay for the current attempt without jitter, bounded by `max_delay`
    pub fn base_delay(&self) -> Duration {
        let factor = self.config.multiplier.powi(self.attempt.min(64) as i32);
        let delay = self.config.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.config.max_delay.as_secs_f64()))
    }

    /// Returns the delay to wait before the next attempt, and moves on to the following one
    pub fn next_delay(&mut self) -> Duration {
        let base = self.base_delay();
        self.attempt = self.attempt.saturating_add(1);

        if self.config.jitter == 0.0 {
            return base;
        }
        let spread = rand::thread_rng().gen_range(-self.config.jitter..=self.config.jitter);
        let delay = base.as_secs_f64() * (1.0 + spread);
        Duration::from_secs_f64(delay.min(self.config.max_delay.as_secs_f64()))
    }
}
