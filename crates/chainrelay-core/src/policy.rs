//! Backoff schedule for transient transport failures.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    /// Upper bound on any single wait.
    pub max_backoff: Duration,
    /// Growth factor between waits; values below 1 are treated as 1.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// The first failure is final.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Fresh schedule for one request: one wait per permitted retry.
    pub fn delays(&self) -> Backoff {
        Backoff {
            next: self.config.initial_backoff,
            remaining: self.config.max_retries,
            cap: self.config.max_backoff,
            multiplier: self.config.multiplier.max(1.0),
        }
    }
}

/// Iterator over successive retry waits.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    remaining: u32,
    cap: Duration,
    multiplier: f64,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let wait = self.next.min(self.cap);
        self.next = wait.mul_f64(self.multiplier).min(self.cap);
        Some(wait)
    }
}
