// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-local rate-limit coordination
//!
//! Caps global concurrency with a semaphore and keeps per-endpoint
//! backoff windows so one 429 pauses every caller of that endpoint
//! instead of letting retries amplify.

use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
pub struct RateLimitCoordinator {
    semaphore: Arc<Semaphore>,
    /// endpoint → epoch_ms until which calls should hold off.
    windows: Mutex<HashMap<String, u64>>,
    default_backoff_ms: u64,
}

impl RateLimitCoordinator {
    pub fn new(max_concurrency: usize, default_backoff_ms: u64) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            windows: Mutex::new(HashMap::new()),
            default_backoff_ms,
        }
    }

    /// Wait out any backoff window for `endpoint`, then take a
    /// concurrency slot. The permit releases on drop.
    pub async fn acquire(&self, endpoint: &str, now_ms: u64) -> OwnedSemaphorePermit {
        let wait_ms = self.remaining_backoff(endpoint, now_ms);
        if wait_ms > 0 {
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }

        // Semaphore is never closed, so acquire cannot fail.
        match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => unreachable!("rate limit semaphore closed"),
        }
    }

    /// Record a rate-limit response for an endpoint. The next acquire
    /// waits until the window passes; a small jitter spreads wakeups.
    pub fn report_rate_limit(&self, endpoint: &str, retry_after_ms: Option<u64>, now_ms: u64) {
        let base = retry_after_ms.unwrap_or(self.default_backoff_ms);
        let jitter = rand::thread_rng().gen_range(0..=base / 10 + 1);
        let until = now_ms + base + jitter;

        let mut windows = self.windows.lock();
        let entry = windows.entry(endpoint.to_string()).or_insert(0);
        if until > *entry {
            *entry = until;
        }
    }

    /// Milliseconds left in the endpoint's backoff window.
    pub fn remaining_backoff(&self, endpoint: &str, now_ms: u64) -> u64 {
        let windows = self.windows.lock();
        windows.get(endpoint).map(|until| until.saturating_sub(now_ms)).unwrap_or(0)
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for RateLimitCoordinator {
    fn default() -> Self {
        Self::new(10, 60_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_bound_concurrency() {
        let coordinator = RateLimitCoordinator::new(2, 1_000);
        let a = coordinator.acquire("api", 0).await;
        let _b = coordinator.acquire("api", 0).await;
        assert_eq!(coordinator.available_permits(), 0);

        drop(a);
        assert_eq!(coordinator.available_permits(), 1);
    }

    #[test]
    fn report_opens_backoff_window() {
        let coordinator = RateLimitCoordinator::new(2, 1_000);
        assert_eq!(coordinator.remaining_backoff("api", 0), 0);

        coordinator.report_rate_limit("api", Some(5_000), 1_000);
        let remaining = coordinator.remaining_backoff("api", 1_000);
        assert!(remaining >= 5_000, "window too short: {remaining}");

        // Window drains with time.
        assert!(coordinator.remaining_backoff("api", 7_000) < remaining);
    }

    #[test]
    fn windows_are_per_endpoint() {
        let coordinator = RateLimitCoordinator::new(2, 1_000);
        coordinator.report_rate_limit("api-a", Some(5_000), 0);
        assert!(coordinator.remaining_backoff("api-a", 0) > 0);
        assert_eq!(coordinator.remaining_backoff("api-b", 0), 0);
    }

    #[test]
    fn later_window_never_shrinks() {
        let coordinator = RateLimitCoordinator::new(2, 1_000);
        coordinator.report_rate_limit("api", Some(10_000), 0);
        let first = coordinator.remaining_backoff("api", 0);
        coordinator.report_rate_limit("api", Some(1_000), 0);
        assert!(coordinator.remaining_backoff("api", 0) >= first.min(10_000));
    }
}
