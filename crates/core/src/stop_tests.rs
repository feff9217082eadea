// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn stats() -> ExecutionStats {
    ExecutionStats { started_at_ms: 1_000, ..ExecutionStats::default() }
}

#[test]
fn no_limits_means_continue() {
    let result = check_stop_conditions(&StopConditions::new(), &stats(), 2_000);
    assert!(!result.should_stop);
    assert_eq!(result.condition_type, None);
}

#[test]
fn user_stop_has_highest_priority() {
    let mut conditions = StopConditions::new();
    conditions.max_wall_clock_ms = Some(0);
    conditions.request_stop(Some("operator hit stop".to_string()));

    let result = check_stop_conditions(&conditions, &stats(), 10_000);
    assert_eq!(result.condition_type, Some("stop_requested"));
    assert_eq!(result.reason.as_deref(), Some("operator hit stop"));
}

#[test]
fn wall_clock_limit_fires() {
    let mut conditions = StopConditions::new();
    conditions.max_wall_clock_ms = Some(5_000);

    let result = check_stop_conditions(&conditions, &stats(), 6_500);
    assert_eq!(result.condition_type, Some("wall_clock_limit"));

    let result = check_stop_conditions(&conditions, &stats(), 3_000);
    assert!(!result.should_stop);
}

#[test]
fn token_limit_fires() {
    let mut conditions = StopConditions::new();
    conditions.max_total_tokens = Some(100);
    let mut stats = stats();
    stats.total_tokens = 100;

    let result = check_stop_conditions(&conditions, &stats, 1_000);
    assert_eq!(result.condition_type, Some("token_limit"));
}

#[test]
fn tool_call_limit_fires() {
    let mut conditions = StopConditions::new();
    conditions.max_tool_calls = Some(10);
    let mut stats = stats();
    stats.total_tool_calls = 11;

    let result = check_stop_conditions(&conditions, &stats, 1_000);
    assert_eq!(result.condition_type, Some("tool_call_limit"));
}

#[test]
fn cost_limit_fires() {
    let mut conditions = StopConditions::new();
    conditions.max_cost_usd = Some(1.0);
    let mut stats = stats();
    stats.total_cost_usd = 1.25;

    let result = check_stop_conditions(&conditions, &stats, 1_000);
    assert_eq!(result.condition_type, Some("cost_limit"));
}

#[test]
fn frame_and_iteration_limits_fire() {
    let mut conditions = StopConditions::new();
    conditions.max_frames = Some(3);
    let mut s = stats();
    s.frame_count = 3;
    assert_eq!(check_stop_conditions(&conditions, &s, 1_000).condition_type, Some("frame_limit"));

    let mut conditions = StopConditions::new();
    conditions.max_iterations = Some(2);
    let mut s = stats();
    s.iteration_count = 5;
    assert_eq!(
        check_stop_conditions(&conditions, &s, 1_000).condition_type,
        Some("iteration_limit")
    );
}

#[test]
fn retry_limit_fires() {
    let conditions = StopConditions::new();
    let mut stats = stats();
    stats.retry_counts.insert("task-a".to_string(), 3);

    let result = check_stop_conditions(&conditions, &stats, 1_000);
    assert_eq!(result.condition_type, Some("retry_limit"));
}

#[test]
fn custom_check_fires_last() {
    let mut conditions = StopConditions::new();
    conditions.max_frames = Some(100);
    conditions.custom_checks.push(Arc::new(|stats: &ExecutionStats| {
        (stats.frame_count > 1).then(|| "custom budget blown".to_string())
    }));

    let mut stats = stats();
    stats.frame_count = 2;
    let result = check_stop_conditions(&conditions, &stats, 1_000);
    assert_eq!(result.condition_type, Some("custom"));
    assert_eq!(result.reason.as_deref(), Some("custom budget blown"));
}

#[test]
fn priority_orders_wall_clock_before_tokens() {
    let mut conditions = StopConditions::new();
    conditions.max_wall_clock_ms = Some(1);
    conditions.max_total_tokens = Some(1);
    let mut stats = stats();
    stats.total_tokens = 5;

    let result = check_stop_conditions(&conditions, &stats, 10_000);
    assert_eq!(result.condition_type, Some("wall_clock_limit"));
}
