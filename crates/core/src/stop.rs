// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global stop conditions
//!
//! Evaluated after each frame boundary and before each task start.
//! First matching condition wins; its reason is recorded on the
//! execution and the loop drains toward quiescence.

use std::collections::HashMap;
use std::sync::Arc;

/// Custom predicate; returns a stop reason when it fires.
pub type StopCheck = Arc<dyn Fn(&ExecutionStats) -> Option<String> + Send + Sync>;

/// Global limits for an execution.
#[derive(Clone, Default)]
pub struct StopConditions {
    pub max_wall_clock_ms: Option<u64>,
    pub max_total_tokens: Option<u64>,
    pub max_tool_calls: Option<u64>,
    pub max_retries_per_task: u32,
    pub max_cost_usd: Option<f64>,
    pub max_frames: Option<u64>,
    pub max_iterations: Option<u64>,
    /// Toggled by the stop tool or a mounted stop node.
    pub stop_requested: bool,
    pub stop_reason: Option<String>,
    pub custom_checks: Vec<StopCheck>,
}

impl std::fmt::Debug for StopConditions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopConditions")
            .field("max_wall_clock_ms", &self.max_wall_clock_ms)
            .field("max_total_tokens", &self.max_total_tokens)
            .field("max_tool_calls", &self.max_tool_calls)
            .field("max_retries_per_task", &self.max_retries_per_task)
            .field("max_cost_usd", &self.max_cost_usd)
            .field("max_frames", &self.max_frames)
            .field("max_iterations", &self.max_iterations)
            .field("stop_requested", &self.stop_requested)
            .field("custom_checks", &self.custom_checks.len())
            .finish()
    }
}

impl StopConditions {
    pub fn new() -> Self {
        Self { max_retries_per_task: 3, ..Self::default() }
    }

    pub fn request_stop(&mut self, reason: Option<String>) {
        self.stop_requested = true;
        self.stop_reason = reason;
    }
}

/// Running counters checked against [`StopConditions`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    pub started_at_ms: u64,
    pub total_tokens: u64,
    pub total_tool_calls: u64,
    pub total_cost_usd: f64,
    pub frame_count: u64,
    pub iteration_count: u64,
    pub retry_counts: HashMap<String, u32>,
}

impl ExecutionStats {
    pub fn wall_clock_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.started_at_ms)
    }

    pub fn max_retry_count(&self) -> u32 {
        self.retry_counts.values().copied().max().unwrap_or(0)
    }
}

/// Outcome of a stop-condition check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopResult {
    pub should_stop: bool,
    pub reason: Option<String>,
    pub condition_type: Option<&'static str>,
}

impl StopResult {
    fn stop(reason: String, condition_type: &'static str) -> Self {
        Self { should_stop: true, reason: Some(reason), condition_type: Some(condition_type) }
    }

    fn r#continue() -> Self {
        Self { should_stop: false, reason: None, condition_type: None }
    }
}

/// Evaluate stop conditions in priority order.
///
/// user stop > wall clock > tokens > tool calls > cost > frames >
/// iterations > retry limit > custom predicates.
pub fn check_stop_conditions(
    conditions: &StopConditions,
    stats: &ExecutionStats,
    now_ms: u64,
) -> StopResult {
    if conditions.stop_requested {
        let reason = conditions
            .stop_reason
            .clone()
            .unwrap_or_else(|| "stop requested by user".to_string());
        return StopResult::stop(reason, "stop_requested");
    }

    if let Some(max) = conditions.max_wall_clock_ms {
        let elapsed = stats.wall_clock_ms(now_ms);
        if elapsed >= max {
            return StopResult::stop(
                format!("wall clock limit reached ({elapsed}ms >= {max}ms)"),
                "wall_clock_limit",
            );
        }
    }

    if let Some(max) = conditions.max_total_tokens {
        if stats.total_tokens >= max {
            return StopResult::stop(
                format!("token limit reached ({} >= {max})", stats.total_tokens),
                "token_limit",
            );
        }
    }

    if let Some(max) = conditions.max_tool_calls {
        if stats.total_tool_calls >= max {
            return StopResult::stop(
                format!("tool call limit reached ({} >= {max})", stats.total_tool_calls),
                "tool_call_limit",
            );
        }
    }

    if let Some(max) = conditions.max_cost_usd {
        if stats.total_cost_usd >= max {
            return StopResult::stop(
                format!("cost limit reached (${:.4} >= ${max:.4})", stats.total_cost_usd),
                "cost_limit",
            );
        }
    }

    if let Some(max) = conditions.max_frames {
        if stats.frame_count >= max {
            return StopResult::stop(
                format!("frame limit reached ({} >= {max})", stats.frame_count),
                "frame_limit",
            );
        }
    }

    if let Some(max) = conditions.max_iterations {
        if stats.iteration_count >= max {
            return StopResult::stop(
                format!("iteration limit reached ({} >= {max})", stats.iteration_count),
                "iteration_limit",
            );
        }
    }

    if stats.max_retry_count() >= conditions.max_retries_per_task
        && conditions.max_retries_per_task > 0
    {
        return StopResult::stop(
            format!(
                "max retries exceeded ({} >= {})",
                stats.max_retry_count(),
                conditions.max_retries_per_task
            ),
            "retry_limit",
        );
    }

    for check in &conditions.custom_checks {
        if let Some(reason) = check(stats) {
            return StopResult::stop(reason, "custom");
        }
    }

    StopResult::r#continue()
}

#[cfg(test)]
#[path = "stop_tests.rs"]
mod tests;
