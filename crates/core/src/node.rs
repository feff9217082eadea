// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan-tree node model
//!
//! One variant per node type. Structural nodes (text, if, phase, step,
//! loops, fragment, stop, end) carry no handler storage at all, so
//! attaching a handler to them is unrepresentable. Runnable nodes
//! (claude, smithers) carry a typed [`HandlerBundle`] plus an open map
//! for author-defined `on<Name>` handlers.

use crate::agent::{AgentResult, StreamEvent};
use crate::handler::{HandlerCtx, HandlerError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Handler fired on a terminal task status.
pub type CompletionHandler =
    Arc<dyn Fn(&AgentResult, &mut HandlerCtx) -> Result<(), HandlerError> + Send + Sync>;

/// Handler fired per streamed progress event.
pub type ProgressHandler = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Effect setup; returns an optional cleanup to run before the next
/// setup or at unmount.
pub type EffectSetup = Arc<dyn Fn(&mut HandlerCtx) -> Option<EffectCleanup> + Send + Sync>;

/// Effect cleanup callable.
pub type EffectCleanup = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    /// Named handlers must look like event props: `on` + capitalized name.
    #[error("invalid handler name {name:?}: expected the on<Name> shape")]
    InvalidHandlerName { name: String },
}

/// Typed handler bundle for runnable nodes.
#[derive(Clone, Default)]
pub struct HandlerBundle {
    pub on_finished: Option<CompletionHandler>,
    pub on_error: Option<CompletionHandler>,
    pub on_progress: Option<ProgressHandler>,
    named: BTreeMap<String, CompletionHandler>,
}

impl HandlerBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.on_finished.is_none()
            && self.on_error.is_none()
            && self.on_progress.is_none()
            && self.named.is_empty()
    }

    /// Attach an author-defined handler. The name must match the
    /// event-prop shape (`onReview`, `onMerge`, ...).
    pub fn set_named(
        &mut self,
        name: impl Into<String>,
        handler: CompletionHandler,
    ) -> Result<(), NodeError> {
        let name = name.into();
        if !is_event_prop_name(&name) {
            return Err(NodeError::InvalidHandlerName { name });
        }
        self.named.insert(name, handler);
        Ok(())
    }

    pub fn named(&self) -> &BTreeMap<String, CompletionHandler> {
        &self.named
    }

    /// Handler names present, in deterministic order.
    pub fn names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        if self.on_finished.is_some() {
            names.push("onFinished");
        }
        if self.on_error.is_some() {
            names.push("onError");
        }
        if self.on_progress.is_some() {
            names.push("onProgress");
        }
        names.extend(self.named.keys().map(String::as_str));
        names
    }
}

impl std::fmt::Debug for HandlerBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerBundle").field("names", &self.names()).finish()
    }
}

/// True for `on` followed by a capitalized name (`onFinished`).
pub(crate) fn is_event_prop_name(name: &str) -> bool {
    let rest = match name.strip_prefix("on") {
        Some(rest) => rest,
        None => return false,
    };
    rest.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Literal text content.
#[derive(Debug, Clone)]
pub struct TextNode {
    pub text: String,
}

/// Conditional subtree; children mount only while the condition holds.
#[derive(Debug, Clone)]
pub struct IfNode {
    pub id: Option<String>,
    pub key: Option<String>,
    pub condition: bool,
    pub children: Vec<Node>,
}

/// Named grouping marker for coarse progress.
#[derive(Debug, Clone)]
pub struct PhaseNode {
    pub id: Option<String>,
    pub key: Option<String>,
    pub name: String,
    pub children: Vec<Node>,
}

/// Named grouping marker nested inside a phase.
#[derive(Debug, Clone)]
pub struct StepNode {
    pub id: Option<String>,
    pub key: Option<String>,
    pub name: String,
    pub children: Vec<Node>,
}

/// Fixed-point iteration marker ("run until done").
#[derive(Debug, Clone)]
pub struct RalphNode {
    pub id: Option<String>,
    pub key: Option<String>,
    pub max_iterations: Option<u32>,
    pub children: Vec<Node>,
}

/// Conditional loop marker.
#[derive(Debug, Clone)]
pub struct WhileNode {
    pub id: Option<String>,
    pub key: Option<String>,
    pub condition: bool,
    pub max_iterations: Option<u32>,
    pub children: Vec<Node>,
}

/// Per-item expansion marker; the component supplies keyed children.
#[derive(Debug, Clone)]
pub struct EachNode {
    pub id: Option<String>,
    pub key: Option<String>,
    pub children: Vec<Node>,
}

/// Grouping without a wrapper element of its own.
#[derive(Debug, Clone)]
pub struct FragmentNode {
    pub children: Vec<Node>,
}

/// Human-or-external gate on a runnable node. The task blocks on a
/// pending approval before its agent run starts; denial or expiry
/// fails the task without invoking the backend.
#[derive(Debug, Clone)]
pub struct ApprovalGate {
    pub kind: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub payload: Value,
    pub timeout_ms: u64,
}

impl ApprovalGate {
    pub fn new(kind: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            prompt: prompt.into(),
            options: Vec::new(),
            payload: Value::Null,
            timeout_ms: 10 * 60 * 1_000,
        }
    }

    pub fn options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Agent invocation. Mounting starts a task on the backend.
#[derive(Debug, Clone)]
pub struct ClaudeNode {
    pub id: Option<String>,
    pub key: Option<String>,
    pub prompt: String,
    pub model: String,
    pub max_turns: Option<u32>,
    pub approval: Option<ApprovalGate>,
    pub handlers: HandlerBundle,
}

/// Default model when the author does not pick one.
pub const DEFAULT_MODEL: &str = "sonnet";

/// Default turn budget when the author does not configure one. The plan
/// linter flags agents relying on this.
pub const DEFAULT_MAX_TURNS: u32 = 50;

impl ClaudeNode {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: None,
            key: None,
            prompt: prompt.into(),
            model: DEFAULT_MODEL.to_string(),
            max_turns: None,
            approval: None,
            handlers: HandlerBundle::new(),
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn max_turns(mut self, turns: u32) -> Self {
        self.max_turns = Some(turns);
        self
    }

    /// Gate the task behind an approval before the agent run starts.
    pub fn require_approval(mut self, gate: ApprovalGate) -> Self {
        self.approval = Some(gate);
        self
    }

    pub fn on_finished(mut self, handler: CompletionHandler) -> Self {
        self.handlers.on_finished = Some(handler);
        self
    }

    pub fn on_error(mut self, handler: CompletionHandler) -> Self {
        self.handlers.on_error = Some(handler);
        self
    }

    pub fn on_progress(mut self, handler: ProgressHandler) -> Self {
        self.handlers.on_progress = Some(handler);
        self
    }
}

/// Nested orchestration. Mounting starts a child execution as a task.
#[derive(Debug, Clone)]
pub struct SmithersNode {
    pub id: Option<String>,
    pub key: Option<String>,
    pub name: String,
    pub source_ref: Option<String>,
    pub config: Value,
    pub approval: Option<ApprovalGate>,
    pub handlers: HandlerBundle,
}

impl SmithersNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            key: None,
            name: name.into(),
            source_ref: None,
            config: Value::Null,
            approval: None,
            handlers: HandlerBundle::new(),
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Gate the task behind an approval before the child run starts.
    pub fn require_approval(mut self, gate: ApprovalGate) -> Self {
        self.approval = Some(gate);
        self
    }

    pub fn on_finished(mut self, handler: CompletionHandler) -> Self {
        self.handlers.on_finished = Some(handler);
        self
    }
}

/// Declarative side effect keyed by a dependency array.
///
/// `deps: None` re-runs the setup every frame; `Some(deps)` re-runs
/// only when the canonicalized deps change (so `Some(vec![])` runs
/// exactly once).
#[derive(Clone)]
pub struct EffectNode {
    pub id: Option<String>,
    pub key: Option<String>,
    pub deps: Option<Vec<Value>>,
    pub setup: EffectSetup,
}

impl EffectNode {
    pub fn new(deps: Option<Vec<Value>>, setup: EffectSetup) -> Self {
        Self { id: None, key: None, deps, setup }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

impl std::fmt::Debug for EffectNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectNode")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("deps", &self.deps)
            .finish()
    }
}

/// Requests a graceful stop of the whole execution when mounted.
#[derive(Debug, Clone, Default)]
pub struct StopNode {
    pub reason: Option<String>,
}

/// A node in the plan tree.
#[derive(Debug, Clone)]
pub enum Node {
    Text(TextNode),
    If(IfNode),
    Phase(PhaseNode),
    Step(StepNode),
    Ralph(RalphNode),
    While(WhileNode),
    Each(EachNode),
    Fragment(FragmentNode),
    Claude(ClaudeNode),
    Smithers(SmithersNode),
    Effect(EffectNode),
    Stop(StopNode),
    /// Marks the plan as finished; the loop may quiesce.
    End,
}

impl Node {
    pub fn text(text: impl Into<String>) -> Node {
        Node::Text(TextNode { text: text.into() })
    }

    pub fn when(condition: bool, children: Vec<Node>) -> Node {
        Node::If(IfNode { id: None, key: None, condition, children })
    }

    pub fn phase(name: impl Into<String>, children: Vec<Node>) -> Node {
        Node::Phase(PhaseNode { id: None, key: None, name: name.into(), children })
    }

    pub fn step(name: impl Into<String>, children: Vec<Node>) -> Node {
        Node::Step(StepNode { id: None, key: None, name: name.into(), children })
    }

    pub fn fragment(children: Vec<Node>) -> Node {
        Node::Fragment(FragmentNode { children })
    }

    pub fn stop(reason: impl Into<String>) -> Node {
        Node::Stop(StopNode { reason: Some(reason.into()) })
    }

    /// The wire/type tag used in serialization and identity paths.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Node::Text(_) => "text",
            Node::If(_) => "if",
            Node::Phase(_) => "phase",
            Node::Step(_) => "step",
            Node::Ralph(_) => "ralph",
            Node::While(_) => "while",
            Node::Each(_) => "each",
            Node::Fragment(_) => "fragment",
            Node::Claude(_) => "claude",
            Node::Smithers(_) => "smithers",
            Node::Effect(_) => "effect",
            Node::Stop(_) => "stop",
            Node::End => "end",
        }
    }

    /// Author-supplied explicit id, if any. Overrides path derivation.
    pub fn explicit_id(&self) -> Option<&str> {
        match self {
            Node::If(n) => n.id.as_deref(),
            Node::Phase(n) => n.id.as_deref(),
            Node::Step(n) => n.id.as_deref(),
            Node::Ralph(n) => n.id.as_deref(),
            Node::While(n) => n.id.as_deref(),
            Node::Each(n) => n.id.as_deref(),
            Node::Claude(n) => n.id.as_deref(),
            Node::Smithers(n) => n.id.as_deref(),
            Node::Effect(n) => n.id.as_deref(),
            Node::Text(_) | Node::Fragment(_) | Node::Stop(_) | Node::End => None,
        }
    }

    /// Author-supplied list-identity key, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Node::If(n) => n.key.as_deref(),
            Node::Phase(n) => n.key.as_deref(),
            Node::Step(n) => n.key.as_deref(),
            Node::Ralph(n) => n.key.as_deref(),
            Node::While(n) => n.key.as_deref(),
            Node::Each(n) => n.key.as_deref(),
            Node::Claude(n) => n.key.as_deref(),
            Node::Smithers(n) => n.key.as_deref(),
            Node::Effect(n) => n.key.as_deref(),
            Node::Text(_) | Node::Fragment(_) | Node::Stop(_) | Node::End => None,
        }
    }

    /// Children that are live this frame. A false `if`/`while` hides its
    /// subtree, so those children neither mount nor serialize.
    pub fn active_children(&self) -> &[Node] {
        match self {
            Node::If(n) if !n.condition => &[],
            Node::While(n) if !n.condition => &[],
            Node::If(n) => &n.children,
            Node::While(n) => &n.children,
            Node::Phase(n) => &n.children,
            Node::Step(n) => &n.children,
            Node::Ralph(n) => &n.children,
            Node::Each(n) => &n.children,
            Node::Fragment(n) => &n.children,
            Node::Text(_)
            | Node::Claude(_)
            | Node::Smithers(_)
            | Node::Effect(_)
            | Node::Stop(_)
            | Node::End => &[],
        }
    }

    /// Whether mounting this node starts a task.
    pub fn is_runnable(&self) -> bool {
        matches!(self, Node::Claude(_) | Node::Smithers(_))
    }

    /// Handler bundle for runnable nodes; `None` for structural nodes.
    pub fn handlers(&self) -> Option<&HandlerBundle> {
        match self {
            Node::Claude(n) => Some(&n.handlers),
            Node::Smithers(n) => Some(&n.handlers),
            _ => None,
        }
    }

    /// Approval gate for runnable nodes; `None` for structural nodes.
    pub fn approval_gate(&self) -> Option<&ApprovalGate> {
        match self {
            Node::Claude(n) => n.approval.as_ref(),
            Node::Smithers(n) => n.approval.as_ref(),
            _ => None,
        }
    }

    /// Serialized attributes in source order. The serializer sorts them.
    pub fn attrs(&self) -> Vec<(&'static str, String)> {
        let mut attrs: Vec<(&'static str, String)> = Vec::new();
        if let Some(id) = self.explicit_id() {
            attrs.push(("id", id.to_string()));
        }
        if let Some(key) = self.key() {
            attrs.push(("key", key.to_string()));
        }
        match self {
            Node::If(n) => attrs.push(("condition", n.condition.to_string())),
            Node::While(n) => {
                attrs.push(("condition", n.condition.to_string()));
                if let Some(max) = n.max_iterations {
                    attrs.push(("max_iterations", max.to_string()));
                }
            }
            Node::Ralph(n) => {
                if let Some(max) = n.max_iterations {
                    attrs.push(("max_iterations", max.to_string()));
                }
            }
            Node::Phase(n) => attrs.push(("name", n.name.clone())),
            Node::Step(n) => attrs.push(("name", n.name.clone())),
            Node::Claude(n) => {
                if let Some(gate) = &n.approval {
                    attrs.push(("approval", gate.kind.clone()));
                }
                attrs.push(("model", n.model.clone()));
                if let Some(turns) = n.max_turns {
                    attrs.push(("max_turns", turns.to_string()));
                }
                attrs.push(("prompt", n.prompt.clone()));
            }
            Node::Smithers(n) => {
                if let Some(gate) = &n.approval {
                    attrs.push(("approval", gate.kind.clone()));
                }
                attrs.push(("name", n.name.clone()));
                if let Some(src) = &n.source_ref {
                    attrs.push(("source", src.clone()));
                }
                if !n.config.is_null() {
                    attrs.push(("config", canonical_json(&n.config)));
                }
            }
            Node::Effect(n) => {
                if let Some(deps) = &n.deps {
                    let deps = Value::Array(deps.clone());
                    attrs.push(("deps", canonical_json(&deps)));
                }
            }
            Node::Stop(n) => {
                if let Some(reason) = &n.reason {
                    attrs.push(("reason", reason.clone()));
                }
            }
            Node::Text(_) | Node::Each(_) | Node::Fragment(_) | Node::End => {}
        }
        attrs
    }
}

/// Canonical JSON string: object keys sorted, no insignificant whitespace.
///
/// Used for dependency comparison, plan/state hashes, and stored values,
/// so equal structures always compare and hash equal.
pub fn canonical_json(value: &Value) -> String {
    fn write(value: &Value, out: &mut String) {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                for (i, k) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    // String keys serialize infallibly.
                    out.push_str(&Value::String((*k).clone()).to_string());
                    out.push(':');
                    if let Some(v) = map.get(*k) {
                        write(v, out);
                    }
                }
                out.push('}');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }

    let mut out = String::new();
    write(value, &mut out);
    out
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
