// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use maestro_model::{ToolCall, ToolSchema};

use crate::tool::{Tool, ToolContext, ToolResult};

/// The uniform execution surface over every capability of a request.
///
/// Registration happens at startup (built-ins, MCP discovery) and is
/// read-mostly afterwards; the interior lock makes the collection shareable
/// behind an `Arc` across the orchestrator and its agents.
#[derive(Default)]
pub struct ToolCollection {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    /// Optional per-tool persona labels shown as `digitalEmployee` on events.
    personas: RwLock<HashMap<String, String>>,
}

impl ToolCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.  A duplicate name replaces the previous entry.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let mut tools = self.tools.write().unwrap();
        if tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "replacing previously registered tool");
        } else {
            debug!(tool = %name, "registered tool");
        }
    }

    pub fn set_persona(&self, tool_name: impl Into<String>, label: impl Into<String>) {
        self.personas
            .write()
            .unwrap()
            .insert(tool_name.into(), label.into());
    }

    pub fn persona(&self, tool_name: &str) -> Option<String> {
        self.personas.read().unwrap().get(tool_name).cloned()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().unwrap().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().unwrap().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Schemas for all registered tools, name-sorted for a stable wire order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.schemas_except(&[])
    }

    /// Schemas minus the named tools (e.g. the react executor excludes
    /// `planning`).
    pub fn schemas_except(&self, excluded: &[&str]) -> Vec<ToolSchema> {
        let tools = self.tools.read().unwrap();
        let mut schemas: Vec<ToolSchema> = tools
            .values()
            .filter(|t| !excluded.contains(&t.name()))
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// A per-request copy sharing the registered tool instances.
    ///
    /// Requests mutate their own collection (plan mode registers a planning
    /// tool bound to the request's plan), so the boot-time collection is used
    /// as a prototype rather than handed out directly.
    pub fn request_view(&self) -> ToolCollection {
        ToolCollection {
            tools: RwLock::new(self.tools.read().unwrap().clone()),
            personas: RwLock::new(self.personas.read().unwrap().clone()),
        }
    }

    pub async fn execute_one(&self, ctx: &ToolContext, call: &ToolCall) -> ToolResult {
        match self.get(&call.name) {
            Some(tool) => {
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => ToolResult::err(&call.id, "cancelled"),
                    out = tool.execute(ctx, call) => out,
                }
            }
            None => ToolResult::err(&call.id, format!("unknown tool: {}", call.name)),
        }
    }

    /// Execute every call of one assistant turn concurrently.
    ///
    /// One task per call; all tasks are joined before returning, and the
    /// result order equals the order the model produced the calls, regardless
    /// of completion timing.  A failing or panicking task becomes an error
    /// entry; siblings always run to completion.  Each task observes the
    /// request cancellation token and reports `cancelled` once it fires.
    pub async fn execute_many(&self, ctx: &ToolContext, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut handles = Vec::with_capacity(calls.len());
        for call in calls {
            let tool = self.get(&call.name);
            let ctx = ctx.clone();
            let call = call.clone();
            handles.push(tokio::spawn(async move {
                match tool {
                    None => ToolResult::err(&call.id, format!("unknown tool: {}", call.name)),
                    Some(tool) => {
                        tokio::select! {
                            biased;
                            _ = ctx.cancel.cancelled() => ToolResult::err(&call.id, "cancelled"),
                            out = tool.execute(&ctx, &call) => out,
                        }
                    }
                }
            }));
        }

        let mut results = Vec::with_capacity(calls.len());
        for (i, handle) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(r) => r,
                Err(e) => ToolResult::err(&calls[i].id, format!("tool execution panicked: {e}")),
            };
            results.push(result);
        }
        results
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
