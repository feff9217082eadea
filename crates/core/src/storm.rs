// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame-storm detection
//!
//! An execution whose plan and state stop changing but keeps producing
//! frames is looping. Before each commit the loop feeds the guard a
//! `(plan_hash, state_hash)` signature; a repeated signature or a
//! breached frame-rate ceiling is fatal to the execution.

use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameStormError {
    #[error(
        "identical plan+state signature repeated {count} times (plan {plan_hash}, state {state_hash})"
    )]
    SignatureLoop { plan_hash: String, state_hash: String, count: usize },

    #[error("frame rate ceiling breached: {reason}")]
    RateCeiling { reason: String },
}

/// Detects render loops and runaway frame rates.
#[derive(Debug)]
pub struct FrameStormGuard {
    max_frames_per_second: usize,
    max_frames_per_minute: usize,
    max_frames_per_run: u64,
    signature_threshold: usize,
    signatures: VecDeque<(String, String)>,
    signature_history_size: usize,
    frame_times_ms: VecDeque<u64>,
    total_frames: u64,
}

impl Default for FrameStormGuard {
    fn default() -> Self {
        Self::new(10, 200, 1_000)
    }
}

impl FrameStormGuard {
    pub fn new(
        max_frames_per_second: usize,
        max_frames_per_minute: usize,
        max_frames_per_run: u64,
    ) -> Self {
        Self {
            max_frames_per_second,
            max_frames_per_minute,
            max_frames_per_run,
            signature_threshold: 3,
            signatures: VecDeque::new(),
            signature_history_size: 10,
            frame_times_ms: VecDeque::new(),
            total_frames: 0,
        }
    }

    /// Check a frame about to commit; record it if it passes.
    pub fn check_frame(
        &mut self,
        plan_hash: &str,
        state_hash: &str,
        now_ms: u64,
    ) -> Result<(), FrameStormError> {
        let signature = (plan_hash.to_string(), state_hash.to_string());
        let seen = self.signatures.iter().filter(|s| **s == signature).count();
        if seen + 1 >= self.signature_threshold {
            return Err(FrameStormError::SignatureLoop {
                plan_hash: plan_hash.to_string(),
                state_hash: state_hash.to_string(),
                count: seen + 1,
            });
        }

        if let Some(reason) = self.rate_breach(now_ms) {
            return Err(FrameStormError::RateCeiling { reason });
        }

        self.signatures.push_back(signature);
        if self.signatures.len() > self.signature_history_size {
            self.signatures.pop_front();
        }

        self.total_frames += 1;
        self.frame_times_ms.push_back(now_ms);
        let cutoff = now_ms.saturating_sub(60_000);
        while self.frame_times_ms.front().is_some_and(|t| *t < cutoff) {
            self.frame_times_ms.pop_front();
        }

        Ok(())
    }

    /// Recent signatures, oldest first. Included in failure diagnostics.
    pub fn recent_signatures(&self) -> Vec<(String, String)> {
        self.signatures.iter().cloned().collect()
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    fn rate_breach(&self, now_ms: u64) -> Option<String> {
        if self.total_frames >= self.max_frames_per_run {
            return Some(format!("max frames per run exceeded ({})", self.total_frames));
        }

        if self.frame_times_ms.len() >= self.max_frames_per_minute {
            return Some(format!(
                "max frames per minute exceeded ({})",
                self.frame_times_ms.len()
            ));
        }

        let one_second_ago = now_ms.saturating_sub(1_000);
        let recent = self.frame_times_ms.iter().filter(|t| **t > one_second_ago).count();
        if recent >= self.max_frames_per_second {
            return Some(format!("max frames per second exceeded ({recent})"));
        }

        None
    }

    pub fn reset(&mut self) {
        self.signatures.clear();
        self.frame_times_ms.clear();
        self.total_frames = 0;
    }
}

#[cfg(test)]
#[path = "storm_tests.rs"]
mod tests;
