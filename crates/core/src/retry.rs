//! Retry utilities for remote and network operations
//!
//! This module provides the single retry primitive used by command execution,
//! readiness polling, and deployment assertions. Delays are a fixed interval:
//! the operations here run against freshly provisioned machines where the
//! failure mode is "not ready yet", and a predictable cadence keeps total
//! wait times easy to reason about in harness timeouts.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt. A policy with
    /// `retries = n` performs at most `n + 1` attempts.
    pub retries: u32,
    /// Fixed delay between consecutive attempts
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            interval: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Create a new RetryPolicy with specified parameters
    pub fn new(retries: u32, interval: Duration) -> Self {
        Self { retries, interval }
    }

    /// A policy that performs exactly one attempt
    pub fn none() -> Self {
        Self {
            retries: 0,
            interval: Duration::ZERO,
        }
    }

    /// Total number of attempts the policy allows
    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }
}

/// Error classification result for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation
    Retry,
    /// Do not retry (terminal error)
    Stop,
}

/// Error classifier function type
pub type ErrorClassifier<E> = fn(&E) -> RetryDecision;

/// Default error classifier that retries on all errors
pub fn default_classifier<E>(_error: &E) -> RetryDecision {
    RetryDecision::Retry
}

/// Retry an async operation with a fixed interval between attempts
///
/// The operation receives the 1-based attempt number, which callers use for
/// logging and for last-attempt semantics. Sleeps happen only between
/// attempts: there is no delay before the first attempt and none after the
/// final failure.
///
/// Only attempt counts are logged here. Error payloads can carry captured
/// command output, so logging the detail is the caller's job: only the
/// caller knows whether it must be redacted or withheld entirely.
#[instrument(level = "debug", skip(operation, classify_error))]
pub async fn retry_fixed<T, E, Fut, Op>(
    policy: &RetryPolicy,
    operation: Op,
    classify_error: ErrorClassifier<E>,
) -> std::result::Result<T, E>
where
    Op: Fn(u32) -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, E>>,
{
    let max_attempts = policy.max_attempts();
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        debug!("Attempt {} of {}", attempt, max_attempts);

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("Operation succeeded on attempt {}", attempt);
                }
                return Ok(result);
            }
            Err(error) => {
                debug!("Operation failed on attempt {}", attempt);

                if classify_error(&error) == RetryDecision::Stop {
                    debug!("Error classifier indicated stop, not retrying");
                    return Err(error);
                }

                last_error = Some(error);

                // Don't sleep after the last attempt
                if attempt < max_attempts {
                    debug!("Sleeping for {:?} before next attempt", policy.interval);
                    tokio::time::sleep(policy.interval).await;
                }
            }
        }
    }

    let final_error = last_error.expect("Should have at least one error");
    warn!("All {} attempts exhausted", max_attempts);
    Err(final_error)
}
