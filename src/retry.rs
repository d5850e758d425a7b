//! Reconnect backoff and supervision
//!
//! [`ReconnectPolicy`] computes exponential delays; [`Supervisor`] applies it
//! to the worker's connection attempts. Stopping the worker is signalled
//! separately, through the client's shutdown flag.

use std::time::{Duration, Instant};

/// Backoff configuration for reconnect attempts
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (typically 2.0)
    pub backoff_multiplier: f64,
    /// Give up after this many consecutive failures; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
        max_attempts: Option<u32>,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier,
            max_attempts,
        }
    }

    /// The same delays every time
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Calculate the delay after failure number `attempt` (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.initial_delay.is_zero() {
            return Err("reconnect initial_delay must be greater than 0");
        }
        if self.max_delay < self.initial_delay {
            return Err("reconnect max_delay must not be below initial_delay");
        }
        if self.max_delay > Duration::from_secs(300) {
            return Err("reconnect max_delay exceeds reasonable limit (5 minutes)");
        }
        if !(self.backoff_multiplier >= 1.0 && self.backoff_multiplier.is_finite()) {
            return Err("reconnect backoff_multiplier must be at least 1.0");
        }
        if self.max_attempts == Some(0) {
            return Err("reconnect max_attempts must be greater than 0");
        }
        Ok(())
    }
}

/// What the supervisor allows the worker to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Make a connection attempt now
    Attempt,
    /// Wait this long before asking again
    Wait(Duration),
    /// No further attempts will be made
    GiveUp,
}

/// Schedules connection attempts according to a [`ReconnectPolicy`]
#[derive(Debug)]
pub struct Supervisor {
    policy: ReconnectPolicy,
    failures: u32,
    next_attempt: Option<Instant>,
}

impl Supervisor {
    /// The first attempt is allowed immediately
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            next_attempt: None,
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Consecutive failures since the last successful connection
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn next_attempt(&self) -> Option<Instant> {
        self.next_attempt
    }

    pub fn decide(&self, now: Instant) -> Decision {
        if self.is_exhausted() {
            return Decision::GiveUp;
        }
        match self.next_attempt {
            Some(at) if at > now => Decision::Wait(at - now),
            _ => Decision::Attempt,
        }
    }

    /// Record a failed attempt or a dropped connection and schedule the next try
    ///
    /// Returns the delay until the next attempt, or `None` once retries are
    /// exhausted.
    pub fn record_failure(&mut self, now: Instant) -> Option<Duration> {
        let delay = self.policy.delay_for_attempt(self.failures);
        self.failures = self.failures.saturating_add(1);
        if self.is_exhausted() {
            self.next_attempt = None;
            return None;
        }
        self.next_attempt = Some(now + delay);
        Some(delay)
    }

    /// A connection reached `Connected`
    pub fn record_success(&mut self) {
        self.failures = 0;
        self.next_attempt = None;
    }

    pub fn is_exhausted(&self) -> bool {
        self.policy
            .max_attempts
            .map_or(false, |max| self.failures >= max)
    }
}
