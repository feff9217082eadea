// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error classification and retry policy

use crate::error::BackendError;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    NonRetryable,
}

/// Classifies backend errors as retryable or not.
///
/// Retryable: explicit rate limits, HTTP 429/5xx, transient network
/// failures, and anything whose message smells like a quota problem.
#[derive(Debug, Default, Clone)]
pub struct ErrorClassifier;

const RETRYABLE_PHRASES: &[&str] = &["rate limit", "too many requests", "quota exceeded"];

impl ErrorClassifier {
    pub fn classify(&self, error: &BackendError) -> ErrorClass {
        match error {
            BackendError::RateLimited { .. } => ErrorClass::Retryable,
            BackendError::Http { status, .. } => {
                if *status == 429 || (500..=599).contains(status) {
                    ErrorClass::Retryable
                } else {
                    ErrorClass::NonRetryable
                }
            }
            BackendError::Network(_) => ErrorClass::Retryable,
            BackendError::Protocol(_) | BackendError::Cancelled => ErrorClass::NonRetryable,
            BackendError::Other(message) => {
                let lower = message.to_lowercase();
                if RETRYABLE_PHRASES.iter().any(|p| lower.contains(p)) {
                    ErrorClass::Retryable
                } else {
                    ErrorClass::NonRetryable
                }
            }
        }
    }

    pub fn is_retryable(&self, error: &BackendError) -> bool {
        self.classify(error) == ErrorClass::Retryable
    }
}

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Jitter fraction in [0, 1]; the delay is scaled by a random
    /// factor in [1 - jitter, 1 + jitter].
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 1_000, max_delay_ms: 60_000, jitter: 0.25 }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32, error: &BackendError) -> bool {
        attempt < self.max_attempts && ErrorClassifier.is_retryable(error)
    }

    /// Delay before attempt `attempt` (1-based). A retry-after hint
    /// from the error overrides the computed backoff.
    pub fn delay_for(&self, attempt: u32, error: &BackendError) -> Duration {
        if let BackendError::RateLimited { retry_after_ms: Some(ms) } = error {
            return Duration::from_millis(*ms);
        }

        let exp = attempt.saturating_sub(1).min(16);
        let raw = self.base_delay_ms.saturating_mul(1u64 << exp).min(self.max_delay_ms);
        let jittered = if self.jitter > 0.0 {
            let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
            (raw as f64 * factor) as u64
        } else {
            raw
        };
        Duration::from_millis(jittered.min(self.max_delay_ms))
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
