// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic plan-tree serialization
//!
//! Frames persist the rendered tree in an XML-style element encoding.
//! The same tree always serializes to the same string: attributes are
//! emitted sorted by name, text is escaped, indentation is fixed. Frame
//! coalescing and the frame-storm signature both depend on this.
//!
//! [`parse_plan`] recovers the structural tree for inspection tools; the
//! encoding itself is not a public interchange format.

use crate::id::NodeId;
use crate::identity::compute_node_id;
use crate::node::Node;
use std::collections::BTreeMap;
use thiserror::Error;

/// Serialize a plan tree to its canonical persistent form.
pub fn serialize_plan(root: &Node) -> String {
    serialize_plan_annotated(root, &BTreeMap::new())
}

/// Serialize with per-node status annotations (keyed by the same ids
/// the identity walk assigns). Runnable nodes gain a `status`
/// attribute, so a frame commits when a task's status changes even
/// though the authored tree did not.
pub fn serialize_plan_annotated(root: &Node, statuses: &BTreeMap<NodeId, String>) -> String {
    let mut out = String::new();
    write_node(root, None, 0, 0, statuses, &mut out);
    out
}

fn write_node(
    node: &Node,
    parent_id: Option<&NodeId>,
    child_index: usize,
    depth: usize,
    statuses: &BTreeMap<NodeId, String>,
    out: &mut String,
) {
    let indent = "  ".repeat(depth);

    if let Node::Text(text) = node {
        out.push_str(&indent);
        out.push_str("<text>");
        out.push_str(&escape(&text.text));
        out.push_str("</text>\n");
        return;
    }

    let index_str;
    let key_or_index = match node.key() {
        Some(key) => key,
        None => {
            index_str = child_index.to_string();
            &index_str
        }
    };
    let node_id = compute_node_id(parent_id, key_or_index, node.type_tag(), node.explicit_id());

    let tag = node.type_tag();
    let mut attrs = node.attrs();
    if let Some(status) = statuses.get(&node_id) {
        attrs.push(("status", status.clone()));
    }
    attrs.sort_by(|a, b| a.0.cmp(b.0));

    out.push_str(&indent);
    out.push('<');
    out.push_str(tag);
    for (name, value) in &attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape(value));
        out.push('"');
    }

    let children = node.active_children();
    if children.is_empty() {
        out.push_str("/>\n");
        return;
    }

    out.push_str(">\n");
    for (i, child) in children.iter().enumerate() {
        write_node(child, Some(&node_id), i, depth + 1, statuses, out);
    }
    out.push_str(&indent);
    out.push_str("</");
    out.push_str(tag);
    out.push_str(">\n");
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    s.replace("&#10;", "\n")
        .replace("&quot;", "\"")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}

/// Structural element recovered from a serialized plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanElement {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<PlanElement>,
    pub text: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanParseError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("malformed element at line {line}")]
    Malformed { line: usize },
    #[error("mismatched closing tag {found:?} at line {line}, expected {expected:?}")]
    MismatchedClose { expected: String, found: String, line: usize },
}

/// Recover the structural tree from a serialized plan.
pub fn parse_plan(input: &str) -> Result<PlanElement, PlanParseError> {
    let mut lines = input.lines().enumerate().peekable();
    let root = parse_element(&mut lines)?;
    Ok(root)
}

type Lines<'a> = std::iter::Peekable<std::iter::Enumerate<std::str::Lines<'a>>>;

fn parse_element(lines: &mut Lines<'_>) -> Result<PlanElement, PlanParseError> {
    let (idx, raw) = lines.next().ok_or(PlanParseError::UnexpectedEnd)?;
    let line = idx + 1;
    let trimmed = raw.trim_start();

    if !trimmed.starts_with('<') || trimmed.starts_with("</") {
        return Err(PlanParseError::Malformed { line });
    }

    // Text element: <text>...</text> on one line.
    if let Some(rest) = trimmed.strip_prefix("<text>") {
        let body = rest.strip_suffix("</text>").ok_or(PlanParseError::Malformed { line })?;
        return Ok(PlanElement {
            tag: "text".to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
            text: Some(unescape(body)),
        });
    }

    let self_closing = trimmed.ends_with("/>");
    let closer = if self_closing { "/>" } else { ">" };
    let inner = trimmed
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix(closer))
        .ok_or(PlanParseError::Malformed { line })?;

    let (tag, attrs) = parse_tag(inner, line)?;

    if self_closing {
        return Ok(PlanElement { tag, attrs, children: Vec::new(), text: None });
    }

    let mut children = Vec::new();
    loop {
        let (next_idx, next_raw) = *lines.peek().ok_or(PlanParseError::UnexpectedEnd)?;
        let next = next_raw.trim_start();
        if let Some(close) = next.strip_prefix("</") {
            let found = close.strip_suffix('>').ok_or(PlanParseError::Malformed {
                line: next_idx + 1,
            })?;
            if found != tag {
                return Err(PlanParseError::MismatchedClose {
                    expected: tag,
                    found: found.to_string(),
                    line: next_idx + 1,
                });
            }
            lines.next();
            break;
        }
        children.push(parse_element(lines)?);
    }

    Ok(PlanElement { tag, attrs, children, text: None })
}

fn parse_tag(inner: &str, line: usize) -> Result<(String, Vec<(String, String)>), PlanParseError> {
    let mut chars = inner.char_indices();
    let tag_end = chars
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, _)| i)
        .unwrap_or(inner.len());
    let tag = inner[..tag_end].to_string();
    if tag.is_empty() {
        return Err(PlanParseError::Malformed { line });
    }

    let mut attrs = Vec::new();
    let mut rest = inner[tag_end..].trim_start();
    while !rest.is_empty() {
        let eq = rest.find("=\"").ok_or(PlanParseError::Malformed { line })?;
        let name = rest[..eq].to_string();
        let after = &rest[eq + 2..];
        let end = after.find('"').ok_or(PlanParseError::Malformed { line })?;
        attrs.push((name, unescape(&after[..end])));
        rest = after[end + 1..].trim_start();
    }

    Ok((tag, attrs))
}

#[cfg(test)]
#[path = "serialize_tests.rs"]
mod tests;
