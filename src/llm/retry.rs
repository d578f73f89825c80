//! Attempt budget and exponential backoff for model invocations.
//!
//! The invocation loop is a small state machine:
//! `Attempting -> Success | Retrying -> Attempting ... -> Exhausted`.
//! [`RetryState`] owns the attempt counter and the backoff schedule; the
//! client decides what counts as a failure.

use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;

/// Default: 3 total attempts, base 1s, max 30s.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_intervals(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_interval = initial;
        self.max_interval = max;
        self
    }

    /// Start a fresh attempt sequence.
    pub fn start(&self) -> RetryState {
        RetryState {
            max_attempts: self.max_attempts,
            attempt: 0,
            backoff: ExponentialBackoff {
                initial_interval: self.initial_interval,
                max_interval: self.max_interval,
                max_elapsed_time: None,
                ..Default::default()
            },
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Wait this long, then attempt again.
    Retry(Duration),
    /// The budget is spent; the failed attempt was the last one.
    Exhausted,
}

/// Retry counter for one logical invocation.
///
/// Transport failures, empty completions, and unrepairable output all
/// draw from the same budget.
#[derive(Debug)]
pub struct RetryState {
    max_attempts: u32,
    attempt: u32,
    backoff: ExponentialBackoff,
}

impl RetryState {
    /// Enter `Attempting`. Returns the 1-based attempt number, or `None`
    /// once the budget is spent.
    pub fn begin(&mut self) -> Option<u32> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some(self.attempt)
    }

    /// Record a failed attempt and move to `Retrying` or `Exhausted`.
    pub fn fail(&mut self) -> Next {
        if self.is_last_attempt() {
            return Next::Exhausted;
        }
        Next::Retry(self.backoff.next_backoff().unwrap_or(self.backoff.max_interval))
    }

    /// Number of attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}
