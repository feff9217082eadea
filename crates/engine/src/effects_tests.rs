// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

fn id(s: &str) -> NodeId {
    NodeId::new(s)
}

fn counter_cleanup(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> EffectCleanup {
    let log = Arc::clone(log);
    Arc::new(move || log.lock().push(tag))
}

#[test]
fn first_sight_should_run() {
    let registry = EffectRegistry::default();
    assert!(registry.should_run(&id("e1"), &Some(vec![json!(1)])));
}

#[test]
fn unchanged_deps_do_not_rerun() {
    let mut registry = EffectRegistry::default();
    let deps = Some(vec![json!(1), json!("a")]);
    registry.record_run(&id("e1"), &deps, None);
    assert!(!registry.should_run(&id("e1"), &deps));
}

#[test]
fn changed_deps_rerun() {
    let mut registry = EffectRegistry::default();
    registry.record_run(&id("e1"), &Some(vec![json!(1)]), None);
    assert!(registry.should_run(&id("e1"), &Some(vec![json!(2)])));
}

#[test]
fn deps_canonicalization_ignores_object_key_order() {
    let mut registry = EffectRegistry::default();
    registry.record_run(&id("e1"), &Some(vec![json!({"a": 1, "b": 2})]), None);
    assert!(!registry.should_run(&id("e1"), &Some(vec![json!({"b": 2, "a": 1})])));
}

#[test]
fn no_deps_always_reruns() {
    let mut registry = EffectRegistry::default();
    registry.record_run(&id("e1"), &None, None);
    assert!(registry.should_run(&id("e1"), &None));
}

#[test]
fn empty_deps_runs_once() {
    let mut registry = EffectRegistry::default();
    registry.record_run(&id("e1"), &Some(vec![]), None);
    assert!(!registry.should_run(&id("e1"), &Some(vec![])));
}

#[test]
fn prior_cleanup_taken_before_new_setup() {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let mut registry = EffectRegistry::default();

    registry.record_run(&id("e1"), &Some(vec![json!(1)]), Some(counter_cleanup(&log, "cleanup-1")));

    // Deps changed: prior cleanup runs, then the new setup records.
    if let Some(cleanup) = registry.take_prior_cleanup(&id("e1")) {
        cleanup();
    }
    log.lock().push("setup-2");
    registry.record_run(&id("e1"), &Some(vec![json!(2)]), Some(counter_cleanup(&log, "cleanup-2")));

    assert_eq!(*log.lock(), vec!["cleanup-1", "setup-2"]);
}

#[test]
fn record_run_schedules_untaken_cleanup() {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let mut registry = EffectRegistry::default();

    registry.record_run(&id("e1"), &Some(vec![json!(1)]), Some(counter_cleanup(&log, "old")));
    registry.record_run(&id("e1"), &Some(vec![json!(2)]), Some(counter_cleanup(&log, "new")));

    assert_eq!(registry.run_pending_cleanups(), 1);
    assert_eq!(*log.lock(), vec!["old"]);
}

#[test]
fn cleanup_unmounted_runs_and_forgets() {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let mut registry = EffectRegistry::default();
    registry.record_run(&id("e1"), &Some(vec![]), Some(counter_cleanup(&log, "bye")));

    assert_eq!(registry.cleanup_unmounted(&[id("e1")]), 1);
    assert_eq!(*log.lock(), vec!["bye"]);
    // Forgotten: next sight runs again.
    assert!(registry.should_run(&id("e1"), &Some(vec![])));
}

#[test]
fn frame_run_cap_trips() {
    let mut registry = EffectRegistry::new(2, false);
    registry.record_run(&id("e1"), &None, None);
    registry.record_run(&id("e1"), &None, None);
    assert_eq!(
        registry.check_run_limit(&id("e1")),
        Err(EffectLoopError::FrameRunCap { effect_id: id("e1"), limit: 2 })
    );

    registry.reset_frame_counts();
    assert!(registry.check_run_limit(&id("e1")).is_ok());
}

#[test]
fn detector_trips_on_identical_deps() {
    let mut detector = EffectLoopDetector::default();
    let deps = Some(vec![json!("same")]);
    detector.check(&id("e1"), &deps).unwrap();
    detector.check(&id("e1"), &deps).unwrap();
    detector.check(&id("e1"), &deps).unwrap();
    let err = detector.check(&id("e1"), &deps).unwrap_err();
    assert!(matches!(err, EffectLoopError::IdenticalDeps { count: 4, .. }));
}

#[test]
fn detector_does_not_combine_distinct_effect_ids() {
    let mut detector = EffectLoopDetector::default();
    let deps = Some(vec![json!("same")]);
    for effect in ["e1", "e2", "e3", "e4", "e5", "e6"] {
        detector.check(&id(effect), &deps).unwrap();
    }
}

#[test]
fn detector_exempts_deps_less_effects() {
    let mut detector = EffectLoopDetector::default();
    for _ in 0..10 {
        detector.check(&id("e1"), &None).unwrap();
    }
}

#[test]
fn detector_reset_clears_history() {
    let mut detector = EffectLoopDetector::new(1, 10);
    let deps = Some(vec![json!(1)]);
    detector.check(&id("e1"), &deps).unwrap();
    assert!(detector.check(&id("e1"), &deps).is_err());
    detector.reset();
    assert!(detector.check(&id("e1"), &deps).is_ok());
}
