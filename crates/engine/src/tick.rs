// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The tick loop
//!
//! One frame: snapshot → render (pure) → reconcile → commit → execute →
//! post-commit effects → flush. Frames run only when there is work
//! (completions, modified state, an external re-render poke, or the
//! first frame); between frames the loop waits on its channels. The
//! loop halts at quiescence, on a stop condition, or on a fatal error.

use crate::context::{Component, Context, CtxWrite};
use crate::control::EngineCommand;
use crate::effects::{EffectLoopDetector, EffectRegistry};
use crate::error::EngineError;
use crate::events::EventSystem;
use crate::lease::{
    recover_orphans, CancellationHandler, LeaseConfig, LeaseManager, OrphanPolicy,
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use sm_backend::{
    AgentExecutor, ApprovalBroker, BackendError, ExecEvent, ExecRequest, RateLimitCoordinator,
    RetryPolicy,
};
use sm_core::{
    canonical_json, check_stop_conditions, ActionKind, ActionQueue, AgentResult, ApprovalGate,
    Clock, EngineEvent, ExecutionId, ExecutionStats, ExecutionStatus, FramePhase, FrameStormGuard,
    HandlerCtx, Node, NodeId, NodeIdentityTracker, PhaseGuard, PlanLinter, ProgressHandler,
    StopConditions, StoreTier, TaskStatus,
};
use sm_store::{
    agents, events, executions, frames, tasks, Database, DurableStore, VolatileStore, WriteOp,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Engine configuration gathered by the caller.
#[derive(Clone)]
pub struct EngineConfig {
    pub min_frame_interval: Duration,
    /// Grace period with no work before quiescence. Zero disables the
    /// grace (useful under fake clocks).
    pub idle_timeout: Duration,
    pub lease: LeaseConfig,
    pub orphan_policy: OrphanPolicy,
    pub max_retries: u32,
    pub stop: StopConditions,
    pub retry_policy: RetryPolicy,
    pub effect_max_runs_per_frame: u32,
    pub strict_effects: bool,
    /// Concurrency cap on in-flight agent calls.
    pub max_concurrent_tasks: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_frame_interval: Duration::from_millis(250),
            idle_timeout: Duration::from_millis(500),
            lease: LeaseConfig::default(),
            orphan_policy: OrphanPolicy::Retry,
            max_retries: 3,
            stop: StopConditions::new(),
            retry_policy: RetryPolicy::default(),
            effect_max_runs_per_frame: 10,
            strict_effects: false,
            max_concurrent_tasks: 10,
        }
    }
}

/// Result of driving the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub frames_run: u64,
    pub quiescent: bool,
    /// Stop-condition reason, when one fired.
    pub stop_reason: Option<String>,
    /// Latest committed frame sequence, if any frame committed.
    pub latest_sequence: Option<u64>,
}

pub struct TickLoop<C: Clock + 'static> {
    db: Arc<Database>,
    execution_id: ExecutionId,
    component: Component,
    executor: Arc<dyn AgentExecutor>,
    clock: C,
    config: EngineConfig,

    volatile: VolatileStore,
    durable: DurableStore,

    /// Loop iteration counter; stamps contexts and actions.
    loop_frame: u64,
    last_frame_ms: u64,
    last_plan: Option<String>,

    tracker: NodeIdentityTracker,
    linter: PlanLinter,
    emitted_lints: HashSet<(NodeId, &'static str)>,
    event_system: EventSystem,
    effects: EffectRegistry,
    detector: EffectLoopDetector,
    lease: Arc<LeaseManager<C>>,
    cancels: Arc<CancellationHandler>,
    approvals: Arc<ApprovalBroker<C>>,
    limiter: Arc<RateLimitCoordinator>,
    storm: FrameStormGuard,

    stats: ExecutionStats,
    actions: ActionQueue,

    completions_tx: mpsc::UnboundedSender<(NodeId, AgentResult)>,
    completions_rx: mpsc::UnboundedReceiver<(NodeId, AgentResult)>,
    pending_completions: Vec<(NodeId, AgentResult)>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    running: HashMap<NodeId, tokio::task::JoinHandle<()>>,

    state_modified: bool,
    rerender_requested: bool,
    end_requested: bool,
    paused: bool,
    last_activity_ms: u64,
    stop_reason: Option<String>,
}

impl<C: Clock + 'static> TickLoop<C> {
    /// Build a loop for an existing execution row. Resumes frame
    /// numbering from the last committed frame.
    pub fn new(
        db: Arc<Database>,
        execution_id: ExecutionId,
        component: Component,
        executor: Arc<dyn AgentExecutor>,
        clock: C,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<EngineEvent>), EngineError> {
        if executions::get(&db, execution_id.as_str())?.is_none() {
            return Err(EngineError::ExecutionNotFound(execution_id.to_string()));
        }

        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let durable = DurableStore::new(Arc::clone(&db), execution_id.as_str());
        let lease = Arc::new(LeaseManager::new(
            Arc::clone(&db),
            execution_id.as_str(),
            config.lease.clone(),
            clock.clone(),
        ));
        let approvals = Arc::new(ApprovalBroker::new(
            Arc::clone(&db),
            clock.clone(),
            events_tx.clone(),
        ));
        let limiter =
            Arc::new(RateLimitCoordinator::new(config.max_concurrent_tasks, 60_000));
        let loop_frame = frames::latest_sequence(&db, execution_id.as_str())?
            .map(|s| s + 1)
            .unwrap_or(0);
        let now_ms = clock.epoch_ms();

        let effects = EffectRegistry::new(config.effect_max_runs_per_frame, config.strict_effects);

        Ok((
            Self {
                db,
                execution_id,
                component,
                executor,
                clock,
                volatile: VolatileStore::new(),
                durable,
                loop_frame,
                last_frame_ms: 0,
                last_plan: None,
                tracker: NodeIdentityTracker::new(),
                linter: PlanLinter,
                emitted_lints: HashSet::new(),
                event_system: EventSystem::new(),
                effects,
                detector: EffectLoopDetector::default(),
                lease,
                cancels: Arc::new(CancellationHandler::new()),
                approvals,
                limiter,
                storm: FrameStormGuard::default(),
                stats: ExecutionStats { started_at_ms: now_ms, ..ExecutionStats::default() },
                actions: ActionQueue::new(),
                completions_tx,
                completions_rx,
                pending_completions: Vec::new(),
                events_tx,
                running: HashMap::new(),
                state_modified: false,
                rerender_requested: false,
                end_requested: false,
                paused: false,
                last_activity_ms: now_ms,
                stop_reason: None,
                config,
            },
            events_rx,
        ))
    }

    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    pub fn durable(&mut self) -> &mut DurableStore {
        &mut self.durable
    }

    /// The approval broker this loop's tasks block on. Embedders share
    /// it with their executor for mid-run gates; responders resolve
    /// requests through it (or through the approvals table).
    pub fn approvals(&self) -> Arc<ApprovalBroker<C>> {
        Arc::clone(&self.approvals)
    }

    /// Ask for a re-render on the next drive cycle (file watcher,
    /// external state change).
    pub fn request_rerender(&mut self) {
        self.rerender_requested = true;
    }

    /// Run to quiescence or stop, then mark the execution terminal.
    pub async fn run(&mut self) -> Result<ExecutionStatus, EngineError> {
        self.startup()?;

        let result = self.run_until_idle().await;
        match result {
            Ok(outcome) => {
                let status = if outcome.stop_reason.is_some() {
                    ExecutionStatus::Cancelled
                } else {
                    ExecutionStatus::Completed
                };
                self.finish(status, outcome.stop_reason.as_deref())?;
                Ok(status)
            }
            Err(error) => {
                tracing::error!(execution_id = %self.execution_id, "tick loop failed: {error}");
                self.shutdown_tasks().await;
                self.finish(ExecutionStatus::Failed, Some(&error.to_string()))?;
                Err(error)
            }
        }
    }

    /// Recover orphans, mark the execution running.
    pub fn startup(&mut self) -> Result<(), EngineError> {
        let recovered = recover_orphans(
            &self.db,
            self.config.orphan_policy,
            self.config.max_retries,
            &self.clock,
        )?;
        if !recovered.is_empty() {
            tracing::warn!(
                count = recovered.len(),
                "recovered orphaned tasks from a previous run"
            );
        }
        for task in tasks::list_for_execution(&self.db, self.execution_id.as_str())? {
            self.stats.retry_counts.insert(task.id, task.retry_count);
        }

        executions::mark_started(&self.db, self.execution_id.as_str(), self.clock.epoch_ms())?;
        self.emit(EngineEvent::ExecutionStatus {
            execution_id: self.execution_id.clone(),
            status: ExecutionStatus::Running,
            stop_reason: None,
        });
        self.stats.started_at_ms = self.clock.epoch_ms();
        tracing::info!(execution_id = %self.execution_id, "tick loop starting");
        Ok(())
    }

    fn finish(
        &mut self,
        status: ExecutionStatus,
        stop_reason: Option<&str>,
    ) -> Result<(), EngineError> {
        executions::mark_finished(
            &self.db,
            self.execution_id.as_str(),
            status,
            stop_reason,
            self.clock.epoch_ms(),
        )?;
        self.emit(EngineEvent::ExecutionStatus {
            execution_id: self.execution_id.clone(),
            status,
            stop_reason: stop_reason.map(str::to_string),
        });
        tracing::info!(execution_id = %self.execution_id, status = status.as_str(), "tick loop finished");
        Ok(())
    }

    /// Drive frames until quiescence or a stop condition.
    ///
    /// A frame runs only when there is a reason to render: pending
    /// completions, modified state, or an external re-render request.
    /// The idle grace period waits without rendering, so a settled plan
    /// never feeds identical signatures to the storm guard.
    pub async fn run_until_idle(&mut self) -> Result<TickOutcome, EngineError> {
        let mut frames_run = 0u64;
        loop {
            self.throttle().await;
            self.collect_completions();
            self.run_single_frame()?;
            frames_run += 1;

            let now_ms = self.clock.epoch_ms();
            let stop = check_stop_conditions(&self.config.stop, &self.stats, now_ms);
            if stop.should_stop {
                let reason = stop.reason.clone().unwrap_or_else(|| "stopped".to_string());
                tracing::info!(reason = %reason, "stop condition fired");
                self.stop_reason = Some(reason.clone());
                self.shutdown_tasks().await;
                return Ok(self.outcome(frames_run, true)?);
            }

            // Wait until another frame is warranted, or quiesce. Stop
            // conditions keep being evaluated while waiting so a wall
            // clock limit can interrupt a long-running task.
            loop {
                let stop =
                    check_stop_conditions(&self.config.stop, &self.stats, self.clock.epoch_ms());
                if stop.should_stop {
                    let reason = stop.reason.clone().unwrap_or_else(|| "stopped".to_string());
                    tracing::info!(reason = %reason, "stop condition fired");
                    self.stop_reason = Some(reason);
                    self.shutdown_tasks().await;
                    return Ok(self.outcome(frames_run, true)?);
                }

                self.collect_completions();
                if !self.pending_completions.is_empty() {
                    break;
                }
                if self.state_modified {
                    self.state_modified = false;
                    break;
                }
                if self.rerender_requested {
                    self.rerender_requested = false;
                    break;
                }

                let drained = self.running.is_empty()
                    && !self.volatile.has_pending()
                    && !self.durable.has_pending()
                    && !self.actions.has_pending();
                if drained {
                    if self.grace_elapsed() {
                        return Ok(self.outcome(frames_run, true)?);
                    }
                    self.sleep_or_wake(self.grace_remaining()).await;
                    continue;
                }

                // Tasks are running: wait for a completion to arrive.
                let wait = self.config.idle_timeout.max(Duration::from_millis(50));
                self.sleep_or_wake(wait).await;
            }
        }
    }

    /// Sleep up to `duration`, waking early on a task completion.
    async fn sleep_or_wake(&mut self, duration: Duration) {
        tokio::select! {
            item = self.completions_rx.recv() => {
                if let Some(completion) = item {
                    self.pending_completions.push(completion);
                }
            }
            _ = tokio::time::sleep(duration) => {}
        }
    }

    fn grace_elapsed(&self) -> bool {
        if self.config.idle_timeout.is_zero() || self.end_requested {
            return true;
        }
        let idle_ms = self.config.idle_timeout.as_millis() as u64;
        self.clock.epoch_ms().saturating_sub(self.last_activity_ms) >= idle_ms
    }

    fn grace_remaining(&self) -> Duration {
        let idle_ms = self.config.idle_timeout.as_millis() as u64;
        let elapsed = self.clock.epoch_ms().saturating_sub(self.last_activity_ms);
        Duration::from_millis(idle_ms.saturating_sub(elapsed).max(1))
    }

    /// Run exactly one frame (manual drive).
    pub fn tick_once(&mut self) -> Result<TickOutcome, EngineError> {
        self.collect_completions();
        self.run_single_frame()?;
        let quiescent = self.check_quiescent();
        self.outcome(1, quiescent)
    }

    fn outcome(&self, frames_run: u64, quiescent: bool) -> Result<TickOutcome, EngineError> {
        Ok(TickOutcome {
            frames_run,
            quiescent,
            stop_reason: self.stop_reason.clone(),
            latest_sequence: frames::latest_sequence(&self.db, self.execution_id.as_str())?,
        })
    }

    async fn throttle(&mut self) {
        let elapsed = self.clock.epoch_ms().saturating_sub(self.last_frame_ms);
        let min = self.config.min_frame_interval.as_millis() as u64;
        if self.last_frame_ms > 0 && elapsed < min {
            tokio::time::sleep(Duration::from_millis(min - elapsed)).await;
        }
    }

    fn collect_completions(&mut self) {
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.pending_completions.push(completion);
        }
    }

    fn check_quiescent(&mut self) -> bool {
        // Modified state means one more frame is needed to reflect it.
        if self.state_modified {
            self.state_modified = false;
            return false;
        }
        if self.rerender_requested {
            self.rerender_requested = false;
            return false;
        }
        if !self.running.is_empty() || !self.pending_completions.is_empty() {
            return false;
        }
        if self.volatile.has_pending() || self.durable.has_pending() || self.actions.has_pending()
        {
            return false;
        }
        if !self.config.idle_timeout.is_zero() && !self.end_requested {
            let idle_ms = self.config.idle_timeout.as_millis() as u64;
            if self.clock.epoch_ms().saturating_sub(self.last_activity_ms) < idle_ms {
                return false;
            }
        }
        true
    }

    /// One pass through the seven phases.
    pub fn run_single_frame(&mut self) -> Result<(), EngineError> {
        let frame = self.loop_frame;
        // This frame satisfies any outstanding re-render request.
        self.rerender_requested = false;
        tracing::debug!(frame, "frame starting");

        // PHASE 1: snapshot. Freeze both stores and the frame clock.
        let now_ms = self.clock.epoch_ms();
        let (ctx, state_snapshot, volatile_snapshot) = {
            let _guard = PhaseGuard::enter(FramePhase::Snapshot);
            let state_snapshot = self.durable.snapshot()?;
            let volatile_snapshot = self.volatile.snapshot();
            let ctx = Context::new(state_snapshot.clone(), volatile_snapshot.clone(), frame, now_ms)
                .with_db(crate::context::DbView::new(
                    Arc::clone(&self.db),
                    self.execution_id.as_str(),
                ));
            (ctx, state_snapshot, volatile_snapshot)
        };
        self.actions.set_frame_id(frame);
        self.effects.reset_frame_counts();

        // PHASE 2: render. Pure; any write attempt is fatal to the frame.
        let tree = {
            let _guard = PhaseGuard::enter(FramePhase::Render);
            (self.component)(&ctx)
        };
        if let Some(violation) = ctx.violations().into_iter().next() {
            return Err(EngineError::RenderPhase(violation));
        }

        // PHASE 3: reconcile by stable identity.
        let changes = {
            let _guard = PhaseGuard::enter(FramePhase::Reconcile);
            let changes = self.tracker.update_for_frame(&tree);

            for warning in self.linter.lint(self.tracker.mounted()) {
                if self.emitted_lints.insert((warning.node_id.clone(), warning.rule)) {
                    self.emit(EngineEvent::PlanWarning {
                        execution_id: self.execution_id.clone(),
                        rule: warning.rule.to_string(),
                        message: warning.message.clone(),
                        node_id: warning.node_id.clone(),
                    });
                }
            }

            for node_id in &changes.unmounted {
                if self.running.contains_key(node_id) {
                    self.cancels.request_cancel(node_id);
                    tasks::set_status(
                        &self.db,
                        self.execution_id.as_str(),
                        node_id.as_str(),
                        TaskStatus::Cancelling,
                        now_ms,
                    )?;
                }
            }

            let mounted_nodes = self
                .tracker
                .mounted()
                .iter()
                .map(|(id, m)| (id.clone(), m.node.clone()))
                .collect();
            self.event_system.update_mounted(mounted_nodes);

            for mounted in self.tracker.mounted().values() {
                match &mounted.node {
                    Node::Stop(stop) => {
                        self.config.stop.request_stop(Some(
                            stop.reason.clone().unwrap_or_else(|| "stop node mounted".to_string()),
                        ));
                    }
                    Node::End => self.end_requested = true,
                    _ => {}
                }
            }

            changes
        };

        // PHASE 4: commit. Storm signature first, then frame coalescing.
        {
            let _guard = PhaseGuard::enter(FramePhase::Commit);
            let statuses = self.runnable_statuses()?;
            let plan_text = sm_core::serialize_plan_annotated(&tree, &statuses);
            let plan_hash = short_hash(&plan_text);
            let state_hash = short_hash(&state_signature(&state_snapshot, &volatile_snapshot));
            self.storm.check_frame(&plan_hash, &state_hash, now_ms)?;

            if self.last_plan.as_deref() != Some(plan_text.as_str()) {
                let sequence = frames::latest_sequence(&self.db, self.execution_id.as_str())?
                    .map(|s| s + 1)
                    .unwrap_or(0);
                let (phase_marker, step_marker) = find_markers(&tree);
                let mounted_ids: Vec<String> =
                    self.tracker.mounted_ids().iter().map(|id| id.to_string()).collect();
                frames::insert(
                    &self.db,
                    self.execution_id.as_str(),
                    sequence,
                    &plan_text,
                    &plan_hash,
                    phase_marker.as_deref(),
                    step_marker.as_deref(),
                    &mounted_ids,
                    now_ms,
                )?;
                events::record(
                    &self.db,
                    self.execution_id.as_str(),
                    "engine",
                    None,
                    "frame.created",
                    &serde_json::json!({ "sequence": sequence, "plan_hash": plan_hash }),
                    now_ms,
                )?;
                self.emit(EngineEvent::FrameCreated {
                    execution_id: self.execution_id.clone(),
                    sequence,
                    plan_hash,
                });
                self.last_plan = Some(plan_text);
                tracing::debug!(frame, sequence, "frame committed");
            } else {
                tracing::debug!(frame, "identical plan, frame coalesced");
            }
        }

        // PHASE 5: execute. Completed tasks first, then new mounts.
        {
            let _guard = PhaseGuard::enter(FramePhase::Execute);
            let completed = std::mem::take(&mut self.pending_completions);
            for (node_id, result) in completed {
                self.apply_completion(&node_id, result, &state_snapshot, &volatile_snapshot, now_ms)?;
            }

            for node_id in &changes.newly_mounted {
                let Some(node) = self.tracker.get_node(node_id).map(|m| m.node.clone()) else {
                    continue;
                };
                if !node.is_runnable() {
                    continue;
                }

                let stop = check_stop_conditions(
                    &self.config.stop,
                    &self.stats,
                    self.clock.epoch_ms(),
                );
                if stop.should_stop {
                    tracing::info!(node_id = %node_id, "not starting task, stop condition holds");
                    break;
                }

                self.start_task(node_id, &node, now_ms)?;
            }
        }

        // PHASE 6: post-commit effects.
        {
            let _guard = PhaseGuard::enter(FramePhase::Effects);
            self.effects.run_pending_cleanups();
            self.effects.cleanup_unmounted(&changes.unmounted);
            self.run_effects(&state_snapshot, &volatile_snapshot, frame, now_ms)?;
        }

        // PHASE 7: flush actions to both stores, durable first.
        {
            let _guard = PhaseGuard::enter(FramePhase::Flush);
            self.queue_ctx_writes(&ctx);
            self.flush_actions(frame, now_ms)?;
        }

        self.loop_frame = frame + 1;
        self.last_frame_ms = now_ms;
        self.stats.frame_count += 1;
        executions::update_counters(
            &self.db,
            self.execution_id.as_str(),
            self.stats.iteration_count,
            self.stats.total_tokens,
            self.stats.total_tool_calls,
        )?;
        tracing::debug!(frame, "frame completed");
        Ok(())
    }

    /// Task statuses for mounted runnable nodes, for plan annotation.
    fn runnable_statuses(
        &self,
    ) -> Result<std::collections::BTreeMap<NodeId, String>, EngineError> {
        let rows = tasks::list_for_execution(&self.db, self.execution_id.as_str())?;
        let by_id: HashMap<&str, &sm_store::TaskRow> =
            rows.iter().map(|row| (row.id.as_str(), row)).collect();

        let mut statuses = std::collections::BTreeMap::new();
        for (node_id, mounted) in self.tracker.mounted() {
            if !mounted.node.is_runnable() {
                continue;
            }
            let status = by_id
                .get(node_id.as_str())
                .map(|row| row.status.as_str())
                .unwrap_or("pending");
            statuses.insert(node_id.clone(), status.to_string());
        }
        Ok(statuses)
    }

    fn apply_completion(
        &mut self,
        node_id: &NodeId,
        result: AgentResult,
        state_snapshot: &HashMap<String, serde_json::Value>,
        volatile_snapshot: &HashMap<String, serde_json::Value>,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        let still_mounted = self.tracker.mark_completed(node_id);
        // A task that completed before honoring a cancel request keeps
        // its own terminal status; handlers are suppressed either way.
        let cancel_requested = self.cancels.is_cancelled(node_id);
        let was_cancelled = result.status == TaskStatus::Cancelled;

        // Audit: the result row is recorded even when stale or cancelled.
        agents::record_result(&self.db, self.execution_id.as_str(), &result)?;

        let final_status = result.status;
        tasks::set_status(
            &self.db,
            self.execution_id.as_str(),
            node_id.as_str(),
            final_status,
            now_ms,
        )?;
        self.lease.release(node_id)?;
        self.cancels.clear(node_id);
        if let Some(handle) = self.running.remove(node_id) {
            handle.abort();
        }

        self.stats.total_tokens += result.usage.total_tokens;
        self.stats.total_tool_calls += result.tool_call_count();
        self.stats.iteration_count += 1;

        let retry_count = tasks::get(&self.db, self.execution_id.as_str(), node_id.as_str())?
            .map(|t| t.retry_count)
            .unwrap_or(0);
        self.stats.retry_counts.insert(node_id.to_string(), retry_count);

        if still_mounted && !was_cancelled && !cancel_requested {
            let outcomes = self.event_system.handle_completion(
                node_id,
                &result,
                state_snapshot,
                volatile_snapshot,
                self.loop_frame,
                now_ms,
                &mut self.actions,
            );
            for outcome in outcomes {
                events::record(
                    &self.db,
                    self.execution_id.as_str(),
                    "event_handler",
                    Some(node_id.as_str()),
                    &format!("handler_{}", outcome.handler_name),
                    &outcome.audit_payload(),
                    now_ms,
                )?;
                for artifact in &outcome.artifacts {
                    sm_store::artifacts::write(
                        &self.db,
                        self.execution_id.as_str(),
                        artifact,
                        Some(node_id.as_str()),
                        Some(self.loop_frame),
                        now_ms,
                    )?;
                }
                for approval in &outcome.approvals {
                    self.create_approval(node_id, approval, now_ms)?;
                }
            }
        } else if !still_mounted {
            tracing::debug!(node_id = %node_id, "stale result, handlers skipped");
        }

        self.emit(EngineEvent::TaskUpdated {
            execution_id: self.execution_id.clone(),
            task_id: node_id.clone(),
            status: final_status,
            retry_count,
        });
        self.emit(EngineEvent::NodeUpdated {
            execution_id: self.execution_id.clone(),
            node_id: node_id.clone(),
            status: final_status,
        });
        Ok(())
    }

    fn create_approval(
        &self,
        node_id: &NodeId,
        spec: &sm_core::ApprovalSpec,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        let id = sm_core::ApprovalId::new();
        sm_store::approvals::create(
            &self.db,
            id.as_str(),
            self.execution_id.as_str(),
            node_id.as_str(),
            &spec.kind,
            &spec.payload,
            &spec.prompt,
            &spec.options,
            now_ms,
        )?;
        self.emit(EngineEvent::ApprovalRequested {
            execution_id: self.execution_id.clone(),
            approval_id: id,
            node_id: node_id.clone(),
            prompt: spec.prompt.clone(),
        });
        Ok(())
    }

    fn start_task(
        &mut self,
        node_id: &NodeId,
        node: &Node,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        let (name, request, on_progress) = match node {
            Node::Claude(claude) => {
                let request = ExecRequest::new(
                    node_id.clone(),
                    self.execution_id.clone(),
                    claude.prompt.clone(),
                    claude.model.clone(),
                    claude.max_turns.unwrap_or(sm_core::DEFAULT_MAX_TURNS),
                );
                (
                    format!("claude:{}", claude.model),
                    request,
                    claude.handlers.on_progress.clone(),
                )
            }
            Node::Smithers(nested) => {
                let mut request = ExecRequest::new(
                    node_id.clone(),
                    self.execution_id.clone(),
                    nested.name.clone(),
                    "smithers".to_string(),
                    sm_core::DEFAULT_MAX_TURNS,
                );
                request.options = serde_json::json!({
                    "source": nested.source_ref,
                    "config": nested.config,
                });
                (format!("smithers:{}", nested.name), request, nested.handlers.on_progress.clone())
            }
            _ => return Ok(()),
        };

        tasks::register(&self.db, self.execution_id.as_str(), node_id.as_str(), &name, now_ms)?;

        if !self.lease.acquire(node_id)? {
            tracing::warn!(node_id = %node_id, "lease held by another process, not starting");
            return Ok(());
        }
        self.lease.start_heartbeat(node_id.clone());
        self.tracker.mark_running(node_id);

        let token = self.cancels.token(node_id);
        let handle = tokio::spawn(run_task(
            Arc::clone(&self.executor),
            request,
            node.approval_gate().cloned(),
            token,
            self.config.retry_policy.clone(),
            on_progress,
            Arc::clone(&self.approvals),
            Arc::clone(&self.limiter),
            self.clock.clone(),
            self.events_tx.clone(),
            self.completions_tx.clone(),
        ));
        self.running.insert(node_id.clone(), handle);

        self.emit(EngineEvent::TaskUpdated {
            execution_id: self.execution_id.clone(),
            task_id: node_id.clone(),
            status: TaskStatus::Running,
            retry_count: 0,
        });
        tracing::info!(node_id = %node_id, task = name, "task started");
        Ok(())
    }

    fn run_effects(
        &mut self,
        state_snapshot: &HashMap<String, serde_json::Value>,
        volatile_snapshot: &HashMap<String, serde_json::Value>,
        frame: u64,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        let effect_nodes: Vec<(NodeId, sm_core::EffectNode)> = self
            .tracker
            .mounted()
            .iter()
            .filter_map(|(id, m)| match &m.node {
                Node::Effect(effect) => Some((id.clone(), effect.clone())),
                _ => None,
            })
            .collect();

        for (effect_id, effect) in effect_nodes {
            if !self.effects.should_run(&effect_id, &effect.deps) {
                continue;
            }
            self.effects.check_run_limit(&effect_id)?;
            self.detector.check(&effect_id, &effect.deps)?;

            // Prior cleanup always runs before the new setup.
            if let Some(cleanup) = self.effects.take_prior_cleanup(&effect_id) {
                cleanup();
            }

            let mut ctx = HandlerCtx::new(
                state_snapshot.clone(),
                volatile_snapshot.clone(),
                frame,
                effect_id.clone(),
                format!("effect:{effect_id}"),
                now_ms,
            );
            let mut cleanup = (effect.setup)(&mut ctx);

            if self.effects.strict() && self.effects.run_count(&effect_id) == 0 {
                // Strict mode: setup → cleanup → setup surfaces
                // non-idempotent effects on first record.
                if let Some(first_cleanup) = cleanup.take() {
                    first_cleanup();
                }
                ctx = HandlerCtx::new(
                    state_snapshot.clone(),
                    volatile_snapshot.clone(),
                    frame,
                    effect_id.clone(),
                    format!("effect:{effect_id}"),
                    now_ms,
                );
                cleanup = (effect.setup)(&mut ctx);
            }

            let (writes, artifacts, approvals) = ctx.into_parts();
            crate::transaction::run_effect_transaction(writes, &effect_id, &mut self.actions);
            for artifact in &artifacts {
                sm_store::artifacts::write(
                    &self.db,
                    self.execution_id.as_str(),
                    artifact,
                    Some(effect_id.as_str()),
                    Some(frame),
                    now_ms,
                )?;
            }
            for approval in &approvals {
                self.create_approval(&effect_id, approval, now_ms)?;
            }

            self.effects.record_run(&effect_id, &effect.deps, cleanup);
        }
        Ok(())
    }

    fn queue_ctx_writes(&mut self, ctx: &Context) {
        for write in ctx.state.take_writes() {
            self.enqueue_ctx_write(write, StoreTier::Durable);
        }
        for write in ctx.v.take_writes() {
            self.enqueue_ctx_write(write, StoreTier::Volatile);
        }
    }

    fn enqueue_ctx_write(&mut self, write: CtxWrite, tier: StoreTier) {
        let kind = match write.value {
            Some(value) => ActionKind::Set(value),
            None => ActionKind::Delete,
        };
        self.actions.enqueue(write.key, kind, tier, Some(write.trigger), None, None);
    }

    fn flush_actions(&mut self, frame: u64, now_ms: u64) -> Result<(), EngineError> {
        let drained = self.actions.drain_sorted();
        if drained.is_empty() {
            return Ok(());
        }

        let (durable_actions, volatile_actions): (Vec<_>, Vec<_>) =
            drained.into_iter().partition(|a| a.tier == StoreTier::Durable);

        // Durable first; a failed durable commit retains the queue and
        // fails the frame with pre-frame state intact.
        for (key, group) in sm_core::group_by_key(durable_actions) {
            let current = self.durable.get(&key)?;
            if let Some(resolved) = sm_core::resolve_conflicts(&group, current) {
                self.durable.enqueue([WriteOp {
                    key: resolved.key,
                    value: resolved.value,
                    trigger: resolved.trigger,
                    node_id: resolved.node_id.map(|n| n.to_string()),
                    frame_id: Some(frame),
                }]);
            }
        }
        self.durable.commit(now_ms)?;

        for (key, group) in sm_core::group_by_key(volatile_actions) {
            let current = self.volatile.get(&key).cloned();
            if let Some(resolved) = sm_core::resolve_conflicts(&group, current) {
                match resolved.value {
                    Some(value) => self.volatile.set(key, value, resolved.trigger),
                    None => self.volatile.delete(key, resolved.trigger),
                }
            }
        }
        self.volatile.commit();

        self.state_modified = true;
        self.last_activity_ms = now_ms;
        Ok(())
    }

    /// Cancel all running tasks and drain their terminal results.
    pub async fn shutdown_tasks(&mut self) {
        if self.running.is_empty() {
            return;
        }
        let ids: Vec<NodeId> = self.running.keys().cloned().collect();
        for node_id in &ids {
            self.cancels.request_cancel(node_id);
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !self.running.is_empty() {
            let next = tokio::time::timeout_at(deadline, self.completions_rx.recv()).await;
            match next {
                Ok(Some((node_id, result))) => {
                    let now_ms = self.clock.epoch_ms();
                    if let Err(e) = agents::record_result(
                        &self.db,
                        self.execution_id.as_str(),
                        &result,
                    ) {
                        tracing::warn!(node_id = %node_id, "failed to record result: {e}");
                    }
                    let _ = tasks::set_status(
                        &self.db,
                        self.execution_id.as_str(),
                        node_id.as_str(),
                        TaskStatus::Cancelled,
                        now_ms,
                    );
                    let _ = self.lease.release(&node_id);
                    self.cancels.clear(&node_id);
                    if let Some(handle) = self.running.remove(&node_id) {
                        handle.abort();
                    }
                }
                _ => break,
            }
        }

        // Anything still running gets aborted outright.
        for (node_id, handle) in self.running.drain() {
            handle.abort();
            let _ = tasks::set_status(
                &self.db,
                self.execution_id.as_str(),
                node_id.as_str(),
                TaskStatus::Cancelled,
                self.clock.epoch_ms(),
            );
            let _ = self.lease.release(&node_id);
        }
    }

    /// Process control commands until the channel closes (serve mode).
    pub async fn serve(mut self, mut commands: mpsc::UnboundedReceiver<EngineCommand>) {
        if let Err(e) = self.startup() {
            tracing::error!("engine startup failed: {e}");
            return;
        }

        while let Some(command) = commands.recv().await {
            match command {
                EngineCommand::Tick { reply } => {
                    if self.paused {
                        let _ = reply.send(Err("execution is paused".to_string()));
                        continue;
                    }
                    let result = self.tick_once().map_err(|e| e.to_string());
                    let _ = reply.send(result);
                }
                EngineCommand::RunUntilIdle { reply } => {
                    if self.paused {
                        let _ = reply.send(Err("execution is paused".to_string()));
                        continue;
                    }
                    let result = self.run_until_idle().await.map_err(|e| e.to_string());
                    let _ = reply.send(result);
                }
                EngineCommand::Pause => {
                    self.paused = true;
                }
                EngineCommand::Resume => {
                    self.paused = false;
                }
                EngineCommand::Stop { reason } => {
                    self.config.stop.request_stop(reason);
                    let reason = self.config.stop.stop_reason.clone();
                    self.shutdown_tasks().await;
                    self.stop_reason =
                        Some(reason.unwrap_or_else(|| "stop requested by user".to_string()));
                    break;
                }
                EngineCommand::SetState { key, value, tier } => {
                    match tier {
                        StoreTier::Durable => {
                            match value {
                                Some(v) => {
                                    self.durable.set(key, v, Some("tool:set_state".to_string()))
                                }
                                None => {
                                    self.durable.delete(key, Some("tool:set_state".to_string()))
                                }
                            }
                            if let Err(e) = self.durable.commit(self.clock.epoch_ms()) {
                                tracing::error!("set_state commit failed: {e}");
                            }
                        }
                        StoreTier::Volatile => {
                            match value {
                                Some(v) => {
                                    self.volatile.set(key, v, Some("tool:set_state".to_string()))
                                }
                                None => {
                                    self.volatile.delete(key, Some("tool:set_state".to_string()))
                                }
                            }
                            self.volatile.commit();
                        }
                    }
                    self.rerender_requested = true;
                }
                EngineCommand::CancelNode { node_id } => {
                    self.cancels.request_cancel(&node_id);
                }
                EngineCommand::RetryNode { node_id } => {
                    self.tracker.forget(&node_id);
                    self.rerender_requested = true;
                }
                EngineCommand::RestartFromFrame { sequence, reply } => {
                    let result = self.restart_from_frame(sequence).map_err(|e| e.to_string());
                    let _ = reply.send(result);
                }
            }
        }

        let status = if self.stop_reason.is_some() {
            ExecutionStatus::Cancelled
        } else {
            ExecutionStatus::Completed
        };
        let reason = self.stop_reason.clone();
        if let Err(e) = self.finish(status, reason.as_deref()) {
            tracing::error!("failed to finish execution: {e}");
        }
    }

    fn restart_from_frame(&mut self, sequence: u64) -> Result<(), EngineError> {
        frames::truncate_after(&self.db, self.execution_id.as_str(), sequence)?;
        self.tracker = NodeIdentityTracker::new();
        self.last_plan = None;
        self.loop_frame = sequence + 1;
        self.rerender_requested = true;
        tracing::info!(sequence, "restarting from frame");
        Ok(())
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events_tx.send(event);
    }
}

/// SHA-256 truncated to 16 hex chars.
fn short_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// Canonical text of the combined state snapshots for the storm guard.
fn state_signature(
    state: &HashMap<String, serde_json::Value>,
    volatile: &HashMap<String, serde_json::Value>,
) -> String {
    let mut combined = serde_json::Map::new();
    combined.insert(
        "state".to_string(),
        serde_json::Value::Object(state.clone().into_iter().collect()),
    );
    combined.insert(
        "v".to_string(),
        serde_json::Value::Object(volatile.clone().into_iter().collect()),
    );
    canonical_json(&serde_json::Value::Object(combined))
}

/// First phase and step names in tree order.
fn find_markers(tree: &Node) -> (Option<String>, Option<String>) {
    fn walk(node: &Node, phase: &mut Option<String>, step: &mut Option<String>) {
        match node {
            Node::Phase(p) if phase.is_none() => *phase = Some(p.name.clone()),
            Node::Step(s) if step.is_none() => *step = Some(s.name.clone()),
            _ => {}
        }
        for child in node.active_children() {
            walk(child, phase, step);
        }
    }
    let mut phase = None;
    let mut step = None;
    walk(tree, &mut phase, &mut step);
    (phase, step)
}

/// Run one task to its terminal result, observing cancellation at every
/// suspension point and retrying per policy.
///
/// An approval gate blocks here, before the first backend call; the
/// rate-limit coordinator bounds concurrency and spaces retries after
/// 429s across all tasks sharing an endpoint.
#[allow(clippy::too_many_arguments)]
async fn run_task<C: Clock + 'static>(
    executor: Arc<dyn AgentExecutor>,
    request: ExecRequest,
    gate: Option<ApprovalGate>,
    token: tokio_util::sync::CancellationToken,
    retry_policy: RetryPolicy,
    on_progress: Option<ProgressHandler>,
    approvals: Arc<ApprovalBroker<C>>,
    limiter: Arc<RateLimitCoordinator>,
    clock: C,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    completions_tx: mpsc::UnboundedSender<(NodeId, AgentResult)>,
) {
    use futures_util::StreamExt;

    let node_id = request.node_id.clone();
    let started = Utc::now();

    if let Some(gate) = &gate {
        let outcome = tokio::select! {
            _ = token.cancelled() => {
                let _ = completions_tx.send((node_id.clone(), cancelled_result(&request, started)));
                return;
            }
            outcome = approvals.request(
                &request.execution_id,
                &node_id,
                &gate.kind,
                &gate.payload,
                &gate.prompt,
                &gate.options,
                Duration::from_millis(gate.timeout_ms),
            ) => outcome,
        };
        match outcome {
            Ok(outcome) if outcome.approved => {
                tracing::info!(node_id = %node_id, "approval granted, task proceeding");
            }
            Ok(outcome) => {
                let result = AgentResult::failed(
                    node_id.clone(),
                    request.model.clone(),
                    started,
                    format!("approval {}", outcome.status.as_str()),
                    false,
                );
                let _ = completions_tx.send((node_id, result));
                return;
            }
            Err(error) => {
                let result = AgentResult::failed(
                    node_id.clone(),
                    request.model.clone(),
                    started,
                    format!("approval request failed: {error}"),
                    false,
                );
                let _ = completions_tx.send((node_id, result));
                return;
            }
        }
    }

    let mut attempt = 0u32;
    let result = loop {
        attempt += 1;
        if token.is_cancelled() {
            break cancelled_result(&request, started);
        }

        // Wait out any endpoint backoff window, then take a slot.
        let permit = tokio::select! {
            _ = token.cancelled() => break cancelled_result(&request, started),
            permit = limiter.acquire(&request.model, clock.epoch_ms()) => permit,
        };

        let stream = match executor.execute(request.clone()).await {
            Ok(stream) => stream,
            Err(error) => {
                drop(permit);
                match &error {
                    BackendError::RateLimited { retry_after_ms } => {
                        limiter.report_rate_limit(&request.model, *retry_after_ms, clock.epoch_ms());
                    }
                    BackendError::Http { status: 429, .. } => {
                        limiter.report_rate_limit(&request.model, None, clock.epoch_ms());
                    }
                    _ => {}
                }
                if retry_policy.should_retry(attempt, &error) {
                    let delay = retry_policy.delay_for(attempt, &error);
                    tracing::info!(node_id = %node_id, attempt, "retrying after backend error: {error}");
                    tokio::select! {
                        _ = token.cancelled() => break cancelled_result(&request, started),
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
                break AgentResult::failed(
                    node_id.clone(),
                    request.model.clone(),
                    started,
                    error.message(),
                    false,
                );
            }
        };
        let mut stream = stream;

        let mut terminal: Option<AgentResult> = None;
        let mut protocol_violation = false;
        let mut cancelled = false;
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    cancelled = true;
                    break;
                }
                item = stream.next() => match item {
                    None => break,
                    Some(ExecEvent::Progress(event)) => {
                        if let Some(handler) = &on_progress {
                            handler(&event);
                        }
                        let _ = events_tx.send(EngineEvent::AgentStream {
                            execution_id: request.execution_id.clone(),
                            node_id: node_id.clone(),
                            kind: event.kind.clone(),
                            payload: event.payload.clone(),
                        });
                    }
                    Some(ExecEvent::Done(result)) => {
                        if terminal.is_some() {
                            protocol_violation = true;
                            break;
                        }
                        terminal = Some(result);
                    }
                }
            }
        }
        // Free the slot before any retry backoff.
        drop(permit);

        if cancelled {
            break cancelled_result(&request, started);
        }
        if protocol_violation {
            break AgentResult::failed(
                node_id.clone(),
                request.model.clone(),
                started,
                "protocol error: multiple terminal results in one stream",
                false,
            );
        }

        match terminal {
            Some(result)
                if result.status == TaskStatus::Failed
                    && result.retryable
                    && attempt < retry_policy.max_attempts =>
            {
                let error = sm_backend::BackendError::Other(
                    result.error_message.clone().unwrap_or_default(),
                );
                let delay = retry_policy.delay_for(attempt, &error);
                tracing::info!(node_id = %node_id, attempt, "retrying failed task");
                tokio::select! {
                    _ = token.cancelled() => break cancelled_result(&request, started),
                    _ = tokio::time::sleep(delay) => continue,
                }
            }
            Some(result) => break result,
            None => {
                break AgentResult::failed(
                    node_id.clone(),
                    request.model.clone(),
                    started,
                    "protocol error: stream ended without a terminal result",
                    false,
                );
            }
        }
    };

    let _ = completions_tx.send((node_id, result));
}

fn cancelled_result(request: &ExecRequest, started: chrono::DateTime<Utc>) -> AgentResult {
    AgentResult {
        run_id: sm_core::RunId::new(),
        node_id: request.node_id.clone(),
        status: TaskStatus::Cancelled,
        model: request.model.clone(),
        started_at: started,
        ended_at: Some(Utc::now()),
        turns_used: 0,
        usage: sm_core::TokenUsage::default(),
        output_text: None,
        output_structured: None,
        tool_calls: Vec::new(),
        error_message: None,
        retryable: false,
    }
}

#[cfg(test)]
#[path = "tick_tests.rs"]
mod tests;
