// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in demo components
//!
//! Library embedders register their own components; the CLI ships two
//! small demos so `run hello` works out of the box.

use serde_json::json;
use sm_core::{ClaudeNode, Node};
use sm_server::ComponentRegistry;
use std::sync::Arc;

pub fn built_in_registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();

    registry.register(
        "hello",
        Arc::new(|_ctx| {
            Node::Claude(ClaudeNode::new("Say hi.").id("greeter").max_turns(1).on_finished(
                Arc::new(|result, ctx| {
                    let text = result.output_text.clone().unwrap_or_default();
                    ctx.state_set("greeting", json!(text));
                    Ok(())
                }),
            ))
        }),
    );

    registry.register(
        "multi_phase",
        Arc::new(|ctx| {
            let researched = ctx.state.get("research").is_some();
            Node::fragment(vec![
                Node::phase(
                    "research",
                    vec![Node::when(
                        !researched,
                        vec![Node::Claude(
                            ClaudeNode::new("Research the topic and summarize findings.")
                                .id("researcher")
                                .max_turns(5)
                                .on_finished(Arc::new(|result, ctx| {
                                    let text = result.output_text.clone().unwrap_or_default();
                                    ctx.state_set("research", json!(text));
                                    Ok(())
                                })),
                        )],
                    )],
                ),
                Node::phase(
                    "write",
                    vec![Node::when(
                        researched,
                        vec![Node::Claude(
                            ClaudeNode::new("Write the report from the research notes.")
                                .id("writer")
                                .max_turns(5)
                                .on_finished(Arc::new(|result, ctx| {
                                    let text = result.output_text.clone().unwrap_or_default();
                                    ctx.state_set("report", json!(text));
                                    ctx.markdown("report", &text);
                                    Ok(())
                                })),
                        )],
                    )],
                ),
            ])
        }),
    );

    registry
}
