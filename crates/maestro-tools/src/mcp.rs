// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tools backed by remote MCP servers.
//!
//! At startup every configured server is asked for its tool list
//! (`POST /v1/tool/list`) and one [`McpTool`] proxy is materialized per
//! entry.  Execution forwards `{toolName, arguments}` to
//! `POST /v1/tool/call` and returns the server's response verbatim.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use maestro_model::ToolCall;

use crate::tool::{parse_arguments, Tool, ToolContext, ToolResult};

pub struct McpTool {
    server_url: String,
    tool_name: String,
    description: String,
    parameters: Value,
}

impl McpTool {
    pub fn new(
        server_url: impl Into<String>,
        tool_name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            tool_name: tool_name.into(),
            description: description.into(),
            parameters,
        }
    }

    fn call_url(&self) -> String {
        format!("{}/v1/tool/call", self.server_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolResult {
        let body = json!({
            "toolName": self.tool_name,
            "arguments": parse_arguments(call),
        });
        debug!(tool = %self.tool_name, server = %self.server_url, "mcp call");
        let resp = match ctx.http.post(self.call_url()).json(&body).send().await {
            Ok(r) => r,
            Err(e) => return ToolResult::err(&call.id, format!("mcp call failed: {e}")),
        };
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return ToolResult::err(&call.id, format!("mcp server returned {status}: {text}"));
        }
        ToolResult::ok(&call.id, text)
    }
}

/// Query every configured MCP server and materialize its tools.
///
/// A server that fails to answer is logged and skipped; startup proceeds
/// with whatever the reachable servers expose.
pub async fn discover_mcp_tools(
    http: &reqwest::Client,
    servers: &[String],
) -> Vec<Arc<McpTool>> {
    let mut tools: Vec<Arc<McpTool>> = Vec::new();
    for server in servers {
        let url = format!("{}/v1/tool/list", server.trim_end_matches('/'));
        let resp = match http.post(&url).json(&json!({})).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(server = %server, status = %r.status(), "mcp list failed; skipping server");
                continue;
            }
            Err(e) => {
                warn!(server = %server, error = %e, "mcp server unreachable; skipping");
                continue;
            }
        };
        let body: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(server = %server, error = %e, "malformed mcp tool list; skipping");
                continue;
            }
        };
        let Some(entries) = body["tools"].as_array() else {
            warn!(server = %server, "mcp tool list has no 'tools' array; skipping");
            continue;
        };
        for entry in entries {
            let Some(name) = entry["name"].as_str() else {
                continue;
            };
            let description = entry["description"].as_str().unwrap_or("").to_string();
            let parameters = entry
                .get("parameters")
                .cloned()
                .unwrap_or_else(|| json!({ "type": "object" }));
            debug!(server = %server, tool = %name, "discovered mcp tool");
            tools.push(Arc::new(McpTool::new(server.clone(), name, description, parameters)));
        }
    }
    tools
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
