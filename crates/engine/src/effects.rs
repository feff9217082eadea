// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effect registry and loop detection
//!
//! Effects run in the post-commit phase when their canonicalized deps
//! changed (or always, for deps-less effects). The prior cleanup runs
//! before the new setup. A small ring buffer of (effect, deps) pairs
//! catches effects that keep re-running with identical deps.

use serde_json::Value;
use sm_core::{canonical_json, EffectCleanup, NodeId};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EffectLoopError {
    #[error("effect {effect_id} ran {count} times with identical deps")]
    IdenticalDeps { effect_id: NodeId, count: usize },

    #[error("effect {effect_id} exceeded {limit} runs in one frame")]
    FrameRunCap { effect_id: NodeId, limit: u32 },
}

struct EffectInfo {
    previous_deps: Option<String>,
    cleanup: Option<EffectCleanup>,
    run_count: u64,
}

/// Canonical form of a deps list. `None` (no deps declared) never
/// compares equal, so the effect runs every frame.
fn canonical_deps(deps: &Option<Vec<Value>>) -> Option<String> {
    deps.as_ref().map(|d| canonical_json(&Value::Array(d.clone())))
}

/// Tracks effect dependencies, cleanups, and per-frame run counts.
pub struct EffectRegistry {
    effects: HashMap<NodeId, EffectInfo>,
    pending_cleanups: Vec<EffectCleanup>,
    runs_this_frame: HashMap<NodeId, u32>,
    max_runs_per_frame: u32,
    strict: bool,
}

impl EffectRegistry {
    pub fn new(max_runs_per_frame: u32, strict: bool) -> Self {
        Self {
            effects: HashMap::new(),
            pending_cleanups: Vec::new(),
            runs_this_frame: HashMap::new(),
            max_runs_per_frame,
            strict,
        }
    }

    /// Whether strict mode (setup → cleanup → setup on first record) is
    /// on.
    pub fn strict(&self) -> bool {
        self.strict
    }

    /// True when the effect should run this frame: first sight, no
    /// declared deps, or deps changed since the last run.
    pub fn should_run(&self, effect_id: &NodeId, deps: &Option<Vec<Value>>) -> bool {
        let Some(info) = self.effects.get(effect_id) else {
            return true;
        };
        let current = canonical_deps(deps);
        match (&info.previous_deps, &current) {
            (Some(previous), Some(current)) => previous != current,
            // No deps on either side: always re-run.
            _ => true,
        }
    }

    /// Enforce the per-frame run cap for one effect.
    pub fn check_run_limit(&self, effect_id: &NodeId) -> Result<(), EffectLoopError> {
        let count = self.runs_this_frame.get(effect_id).copied().unwrap_or(0);
        if count >= self.max_runs_per_frame {
            return Err(EffectLoopError::FrameRunCap {
                effect_id: effect_id.clone(),
                limit: self.max_runs_per_frame,
            });
        }
        Ok(())
    }

    /// Remove and return the stored cleanup so it can run before the
    /// new setup.
    pub fn take_prior_cleanup(&mut self, effect_id: &NodeId) -> Option<EffectCleanup> {
        self.effects.get_mut(effect_id).and_then(|info| info.cleanup.take())
    }

    /// Record a run: store deps and the new cleanup, bump counters. Any
    /// cleanup still stored moves to the pending list.
    pub fn record_run(
        &mut self,
        effect_id: &NodeId,
        deps: &Option<Vec<Value>>,
        cleanup: Option<EffectCleanup>,
    ) {
        let info = self.effects.entry(effect_id.clone()).or_insert(EffectInfo {
            previous_deps: None,
            cleanup: None,
            run_count: 0,
        });

        if let Some(old) = info.cleanup.take() {
            self.pending_cleanups.push(old);
        }

        info.previous_deps = canonical_deps(deps);
        info.cleanup = cleanup;
        info.run_count += 1;
        *self.runs_this_frame.entry(effect_id.clone()).or_insert(0) += 1;
    }

    pub fn run_count(&self, effect_id: &NodeId) -> u64 {
        self.effects.get(effect_id).map(|i| i.run_count).unwrap_or(0)
    }

    /// Invoke and clear all scheduled cleanups. Panics inside a cleanup
    /// cannot happen (cleanups are plain closures); errors are the
    /// closure's own business.
    pub fn run_pending_cleanups(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending_cleanups);
        let count = pending.len();
        for cleanup in pending {
            cleanup();
        }
        count
    }

    /// Run cleanup for effects whose nodes are gone and forget them.
    pub fn cleanup_unmounted(&mut self, unmounted: &[NodeId]) -> usize {
        let mut count = 0;
        for effect_id in unmounted {
            if let Some(info) = self.effects.remove(effect_id) {
                if let Some(cleanup) = info.cleanup {
                    cleanup();
                    count += 1;
                }
            }
        }
        count
    }

    /// Reset per-frame counters. Call at the start of each frame.
    pub fn reset_frame_counts(&mut self) {
        self.runs_this_frame.clear();
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::new(10, false)
    }
}

/// Ring-buffer detector for identical-deps loops.
///
/// Different effect ids with the same deps do not combine; deps-less
/// effects are exempt (they are declared always-run, and the
/// frame-storm guard catches a genuinely stuck plan).
pub struct EffectLoopDetector {
    history: VecDeque<(NodeId, String)>,
    threshold: usize,
    history_size: usize,
}

impl EffectLoopDetector {
    pub fn new(threshold: usize, history_size: usize) -> Self {
        Self { history: VecDeque::new(), threshold, history_size }
    }

    pub fn check(
        &mut self,
        effect_id: &NodeId,
        deps: &Option<Vec<Value>>,
    ) -> Result<(), EffectLoopError> {
        let Some(deps_json) = canonical_deps(deps) else {
            return Ok(());
        };

        let signature = (effect_id.clone(), deps_json);
        let count = self.history.iter().filter(|s| **s == signature).count();

        self.history.push_back(signature);
        if self.history.len() > self.history_size {
            self.history.pop_front();
        }

        if count >= self.threshold {
            return Err(EffectLoopError::IdenticalDeps {
                effect_id: effect_id.clone(),
                count: count + 1,
            });
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}

impl Default for EffectLoopDetector {
    fn default() -> Self {
        Self::new(3, 10)
    }
}

#[cfg(test)]
#[path = "effects_tests.rs"]
mod tests;
