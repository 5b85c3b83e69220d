//! Bounded exponential backoff for environment probes

use std::time::Duration;
use tokio::time::Instant;

pub const INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const MAX_DELAY: Duration = Duration::from_secs(128);

/// Gate for repeated probe attempts
///
/// The first attempt is always allowed. Each allowed attempt pushes the
/// next one out by the current delay, which then doubles up to the cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    delay: Duration,
    next_attempt: Option<Instant>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_DELAY, MAX_DELAY)
    }
}

impl Backoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            delay: initial,
            next_attempt: None,
        }
    }

    /// Returns true if an attempt may be made now, and books it
    pub fn attempt(&mut self) -> bool {
        let now = Instant::now();
        if self.next_attempt.is_some_and(|at| now < at) {
            return false;
        }
        self.next_attempt = Some(now + self.delay);
        self.delay = (self.delay * 2).min(self.max);
        true
    }

    /// Delay that will follow the next allowed attempt
    #[must_use]
    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    pub fn reset(&mut self) {
        self.delay = self.initial;
        self.next_attempt = None;
    }
}
