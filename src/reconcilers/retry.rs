// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Conflict retry with exponential backoff for Kubernetes API calls.
//!
//! [`retry_on_conflict`] retries HTTP 409 only, for read-modify-write
//! sequences (status writes, the Console operator CR) where each attempt
//! re-reads the object before writing.
//!
//! Reconcile tasks themselves never retry in-process; the control loop
//! requeues them.

use anyhow::Result;
use std::time::Duration;
use tracing::debug;

/// Backoff multiplier (exponential growth factor)
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// Conflict retry initial interval (10ms)
const CONFLICT_INITIAL_INTERVAL_MILLIS: u64 = 10;

/// Conflict retry maximum interval (1 second)
const CONFLICT_MAX_INTERVAL_MILLIS: u64 = 1000;

/// Conflict retry maximum number of attempts
pub const CONFLICT_MAX_ATTEMPTS: u32 = 5;

/// Simple exponential backoff with jitter.
pub struct ExponentialBackoff {
    /// Current interval duration
    pub current_interval: Duration,
    /// Initial interval duration
    pub initial_interval: Duration,
    /// Maximum interval duration
    pub max_interval: Duration,
    /// Backoff multiplier (typically 2.0 for doubling)
    pub multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    pub randomization_factor: f64,
}

impl ExponentialBackoff {
    fn new(
        initial_interval: Duration,
        max_interval: Duration,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            current_interval: initial_interval,
            initial_interval,
            max_interval,
            multiplier,
            randomization_factor,
        }
    }

    /// Get the next jittered interval and grow the current one.
    pub fn next_backoff(&mut self) -> Duration {
        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        jittered
    }

    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        // random::<f64>() is uniform in [0, 1)
        let jittered = secs - delta + rand::random::<f64>() * 2.0 * delta;

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Backoff for optimistic-concurrency conflicts: 10ms doubling to 1s.
#[must_use]
pub fn conflict_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(CONFLICT_INITIAL_INTERVAL_MILLIS),
        Duration::from_millis(CONFLICT_MAX_INTERVAL_MILLIS),
        BACKOFF_MULTIPLIER,
        RANDOMIZATION_FACTOR,
    )
}

/// Retry a read-modify-write sequence while it fails with HTTP 409.
///
/// `operation` must re-read the object on every attempt. Any other error is
/// returned immediately.
///
/// # Errors
///
/// Returns the first non-conflict error, or the conflict error after
/// [`CONFLICT_MAX_ATTEMPTS`] attempts.
pub async fn retry_on_conflict<T, F, Fut>(mut operation: F, operation_name: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, kube::Error>>,
{
    let mut backoff = conflict_backoff();

    for attempt in 1..=CONFLICT_MAX_ATTEMPTS {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if is_conflict_error(&e) && attempt < CONFLICT_MAX_ATTEMPTS => {
                let duration = backoff.next_backoff();
                debug!(
                    operation = operation_name,
                    attempt = attempt,
                    retry_after = ?duration,
                    "Conflict, retrying"
                );
                tokio::time::sleep(duration).await;
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("{operation_name} failed after {attempt} attempts")));
            }
        }
    }

    Err(anyhow::anyhow!("{operation_name}: no attempts made"))
}

fn is_conflict_error(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(status) if status.code == 409)
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
