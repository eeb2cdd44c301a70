use std::time::{Duration, Instant};

/// Exponential back-off bounded by an overall budget.
///
/// Each `next_wait` doubles the previous wait up to `max_wait`; once the
/// budget is spent it returns `None`. Waits are clamped to the budget left.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    init_wait: Duration,
    max_wait: Duration,
    budget: Duration,
    next: Duration,
    start: Instant,
    attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(init_wait: Duration, max_wait: Duration, budget: Duration) -> Self {
        Self {
            init_wait,
            max_wait,
            budget,
            next: init_wait,
            start: Instant::now(),
            attempts: 0,
        }
    }

    pub fn next_wait(&mut self) -> Option<Duration> {
        let remaining = self.remaining()?;
        let wait = self.next.min(remaining);
        self.next = (self.next * 2).min(self.max_wait);
        self.attempts += 1;
        Some(wait)
    }

    /// Budget left, or `None` once it is spent.
    pub fn remaining(&self) -> Option<Duration> {
        let elapsed = self.start.elapsed();
        if elapsed >= self.budget {
            None
        } else {
            Some(self.budget - elapsed)
        }
    }

    pub fn reset_wait(&mut self) {
        self.next = self.init_wait;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining().is_none()
    }
}
