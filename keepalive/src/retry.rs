//! Bounded polling with multiplicative backoff

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::errors::Result;

/// Whether a poll sleeps before each attempt or only between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOrder {
    BeforeAttempt,
    BetweenAttempts,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub order: SleepOrder,
}

/// Result of a poll that did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Reached(T),
    Exhausted { attempts: u32, last: Option<T> },
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, initial_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier,
            max_delay,
            order: SleepOrder::BetweenAttempts,
        }
    }

    pub const fn sleep_first(mut self) -> Self {
        self.order = SleepOrder::BeforeAttempt;
        self
    }

    /// The delay that follows `delay` under this policy.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let millis = (delay.as_millis() as f64 * self.multiplier).round() as u64;
        Duration::from_millis(millis).min(self.max_delay)
    }

    /// Every delay this policy may sleep, in order.
    pub fn delays(&self) -> Vec<Duration> {
        let sleeps = match self.order {
            SleepOrder::BeforeAttempt => self.max_attempts,
            SleepOrder::BetweenAttempts => self.max_attempts.saturating_sub(1),
        };
        let mut delay = self.initial_delay;
        let mut out = Vec::with_capacity(sleeps as usize);
        for _ in 0..sleeps {
            out.push(delay);
            delay = self.next_delay(delay);
        }
        out
    }

    /// Call `attempt` until `done` accepts its value or attempts run out.
    ///
    /// An `Err` from `attempt` ends the poll immediately.
    pub async fn poll<T, F, Fut, P>(&self, what: &str, mut attempt: F, done: P) -> Result<PollOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&T) -> bool,
        T: std::fmt::Debug,
    {
        let delays = self.delays();
        let mut last = None;

        for n in 1..=self.max_attempts {
            let delay = delays.get((n - 1) as usize).copied();
            if self.order == SleepOrder::BeforeAttempt {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
            }

            let value = attempt().await?;
            debug!(what, attempt = n, value = ?value, "poll attempt");
            if done(&value) {
                return Ok(PollOutcome::Reached(value));
            }
            last = Some(value);

            if self.order == SleepOrder::BetweenAttempts {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Ok(PollOutcome::Exhausted {
            attempts: self.max_attempts,
            last,
        })
    }
}
