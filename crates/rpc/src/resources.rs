// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource URIs and pagination
//!
//! Read-only resources are addressed with a fixed `smithers://` scheme.
//! List resources paginate with an opaque cursor plus has_next/has_prev
//! flags.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const URI_SCHEME: &str = "smithers";

/// A parsed resource reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    Executions,
    Execution { id: String },
    Frames { execution_id: String },
    Frame { execution_id: String, sequence: u64 },
    Events { execution_id: String },
    Node { execution_id: String, node_id: String },
    NodeRuns { execution_id: String, node_id: String },
    Artifacts { execution_id: String },
    PendingApprovals { execution_id: String },
    Scripts,
    Health,
}

/// Parse a `smithers://` URI against the pattern table.
pub fn parse_uri(uri: &str) -> Option<ResourceRef> {
    let rest = uri.strip_prefix("smithers://")?;
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        ["executions"] => Some(ResourceRef::Executions),
        ["executions", id] => Some(ResourceRef::Execution { id: (*id).to_string() }),
        ["executions", id, "frames"] => {
            Some(ResourceRef::Frames { execution_id: (*id).to_string() })
        }
        ["executions", id, "frames", seq] => seq.parse().ok().map(|sequence| {
            ResourceRef::Frame { execution_id: (*id).to_string(), sequence }
        }),
        ["executions", id, "events"] => {
            Some(ResourceRef::Events { execution_id: (*id).to_string() })
        }
        ["executions", id, "nodes", node_id] => Some(ResourceRef::Node {
            execution_id: (*id).to_string(),
            node_id: (*node_id).to_string(),
        }),
        ["executions", id, "nodes", node_id, "runs"] => Some(ResourceRef::NodeRuns {
            execution_id: (*id).to_string(),
            node_id: (*node_id).to_string(),
        }),
        ["executions", id, "artifacts"] => {
            Some(ResourceRef::Artifacts { execution_id: (*id).to_string() })
        }
        ["executions", id, "approvals", "pending"] => {
            Some(ResourceRef::PendingApprovals { execution_id: (*id).to_string() })
        }
        ["scripts"] => Some(ResourceRef::Scripts),
        ["health"] => Some(ResourceRef::Health),
        _ => None,
    }
}

/// Pagination parameters supplied by the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl PageParams {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 500;

    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).min(Self::MAX_LIMIT)
    }

    /// Cursors are plain offsets encoded as strings.
    pub fn offset(&self) -> u64 {
        self.cursor.as_deref().and_then(|c| c.parse().ok()).unwrap_or(0)
    }
}

/// One page of a list resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Page {
    /// Slice a full item list into a page at `params`.
    pub fn slice(all: Vec<Value>, params: &PageParams) -> Self {
        let offset = params.offset() as usize;
        let limit = params.effective_limit() as usize;
        let total = all.len();

        let items: Vec<Value> = all.into_iter().skip(offset).take(limit).collect();
        let has_next = offset + items.len() < total;
        let next_cursor = has_next.then(|| (offset + items.len()).to_string());

        Self { items, next_cursor, has_next, has_prev: offset > 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use yare::parameterized;

    #[parameterized(
        executions = { "smithers://executions", true },
        execution = { "smithers://executions/abc", true },
        frames = { "smithers://executions/abc/frames", true },
        frame = { "smithers://executions/abc/frames/3", true },
        events = { "smithers://executions/abc/events", true },
        node = { "smithers://executions/abc/nodes/n1", true },
        runs = { "smithers://executions/abc/nodes/n1/runs", true },
        artifacts = { "smithers://executions/abc/artifacts", true },
        approvals = { "smithers://executions/abc/approvals/pending", true },
        scripts = { "smithers://scripts", true },
        health = { "smithers://health", true },
        wrong_scheme = { "http://executions", false },
        unknown_path = { "smithers://bogus", false },
        bad_sequence = { "smithers://executions/abc/frames/notanumber", false },
    )]
    fn uri_table(uri: &str, ok: bool) {
        assert_eq!(parse_uri(uri).is_some(), ok, "{uri}");
    }

    #[test]
    fn parsed_fields() {
        assert_eq!(
            parse_uri("smithers://executions/abc/frames/7"),
            Some(ResourceRef::Frame { execution_id: "abc".to_string(), sequence: 7 })
        );
        assert_eq!(
            parse_uri("smithers://executions/abc/nodes/n1/runs"),
            Some(ResourceRef::NodeRuns {
                execution_id: "abc".to_string(),
                node_id: "n1".to_string()
            })
        );
    }

    #[test]
    fn page_slice_first_page() {
        let all: Vec<Value> = (0..10).map(|i| json!(i)).collect();
        let page = Page::slice(all, &PageParams { cursor: None, limit: Some(4) });
        assert_eq!(page.items.len(), 4);
        assert!(page.has_next);
        assert!(!page.has_prev);
        assert_eq!(page.next_cursor.as_deref(), Some("4"));
    }

    #[test]
    fn page_slice_middle_and_last() {
        let all: Vec<Value> = (0..10).map(|i| json!(i)).collect();
        let middle = Page::slice(
            all.clone(),
            &PageParams { cursor: Some("4".to_string()), limit: Some(4) },
        );
        assert_eq!(middle.items, vec![json!(4), json!(5), json!(6), json!(7)]);
        assert!(middle.has_next);
        assert!(middle.has_prev);

        let last = Page::slice(all, &PageParams { cursor: Some("8".to_string()), limit: Some(4) });
        assert_eq!(last.items.len(), 2);
        assert!(!last.has_next);
        assert!(last.next_cursor.is_none());
    }

    #[test]
    fn limit_is_capped() {
        let params = PageParams { cursor: None, limit: Some(10_000) };
        assert_eq!(params.effective_limit(), PageParams::MAX_LIMIT);
    }
}
