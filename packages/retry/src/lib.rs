#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bounded retry with exponential backoff for loading external data.
//!
//! Boundary files, incident exports and station tables can all fail
//! transiently (network mounts, a database file locked by a writer). Every
//! loader runs its fetch through [`run`] so that transient failures are
//! retried a bounded number of times and then surfaced as a single fatal
//! [`Exhausted`] value carrying the attempt count and the last cause.
//!
//! # Usage
//!
//! ```ignore
//! let rows = crime_districts_retry::run(&policy, "incidents", |_attempt| provider.fetch())
//!     .map_err(|e| DatasetError::LoadFailure { attempts: e.attempts, source: e.last })?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors that know whether retrying could help.
pub trait Transient {
    /// Returns `true` if the failure is likely transient and worth retrying.
    fn is_transient(&self) -> bool;
}

impl Transient for std::io::Error {
    fn is_transient(&self) -> bool {
        use std::io::ErrorKind;

        matches!(
            self.kind(),
            ErrorKind::Interrupted
                | ErrorKind::TimedOut
                | ErrorKind::WouldBlock
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::ConnectionRefused
                | ErrorKind::NotConnected
                | ErrorKind::BrokenPipe
                | ErrorKind::ResourceBusy
        )
    }
}

/// How many times to attempt a load and how long to wait between tries.
///
/// The wait before attempt `n` (1-based, `n > 1`) is
/// `base_delay_ms * 2^(n - 2)`, capped at `max_delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `0` is treated as `1`.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// A policy with `max_attempts` tries and no waiting in between.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Effective attempt budget.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            1
        } else {
            self.max_attempts
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let millis = self
            .base_delay_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

/// A load that kept failing until the attempt budget ran out, or failed
/// permanently.
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Number of attempts made.
    pub attempts: u32,
    /// The error from the final attempt.
    pub last: E,
}

/// Runs `op` until it succeeds, fails permanently, or the policy's attempt
/// budget is spent.
///
/// `op` receives the 1-based attempt number. Errors for which
/// [`Transient::is_transient`] returns `false` are not retried.
///
/// # Errors
///
/// Returns [`Exhausted`] with the last error once no further attempt is
/// allowed.
pub fn run<T, E, F>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, Exhausted<E>>
where
    E: Transient + std::fmt::Display,
    F: FnMut(u32) -> Result<T, E>,
{
    let budget = policy.attempts();
    let mut attempt = 1;

    loop {
        match op(attempt) {
            Ok(value) => {
                if attempt > 1 {
                    log::info!("{label}: succeeded on attempt {attempt}/{budget}");
                }
                return Ok(value);
            }
            Err(e) => {
                if !e.is_transient() {
                    log::error!("{label}: permanent error on attempt {attempt}: {e}");
                    return Err(Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                if attempt >= budget {
                    log::error!("{label}: giving up after {attempt} attempt(s): {e}");
                    return Err(Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }

                let delay = policy.delay_after(attempt);
                log::warn!(
                    "{label}: transient error ({e}), retry {attempt}/{} in {delay:?}...",
                    budget - 1
                );
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
        }
    }
}
