// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use maestro_model::ToolCall;
use maestro_sse::{FileHandle, MessageType, SseEvent};

use crate::builtin::{post_service, service_url, ServiceStream};
use crate::tool::{parse_arguments, Tool, ToolContext, ToolResult};

const DEFAULT_MAX_LOOP: u64 = 3;

/// Multi-hop web research through the deep-search service.
///
/// The service streams chunks shaped
/// `{"messageType": "extend"|"search"|"report", "searchResult": {...},
///   "answer"?: "...", "fileInfo"?: [...], "isFinal": bool}`.
/// Each chunk is forwarded as a `deep_search` event; the final chunk also
/// produces a `task_summary` event with the consolidated answer.
pub struct DeepSearchTool;

impl DeepSearchTool {
    pub const NAME: &'static str = "deep_search";
}

#[async_trait]
impl Tool for DeepSearchTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Research a question on the web with iterative query expansion. \
         Returns a cited answer built from ranked documents. Use for \
         anything requiring current or external information."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The research question"
                },
                "max_loop": {
                    "type": "integer",
                    "description": "Maximum search iterations (default 3)"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolResult {
        let args = parse_arguments(call);
        let Some(query) = args.get("query").and_then(|v| v.as_str()) else {
            return ToolResult::err(&call.id, "missing 'query'");
        };
        let max_loop = args
            .get("max_loop")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_LOOP);
        debug!(query, max_loop, "deep search tool");

        let url = service_url(&ctx.endpoints.deep_search.url, "v1/tool/deepsearch");
        let body = json!({
            "query": query,
            "requestId": ctx.request_id,
            "maxLoop": max_loop,
        });
        let resp = match post_service(ctx, &url, &body).await {
            Ok(r) => r,
            Err(e) => return ToolResult::err(&call.id, format!("deep search: {e}")),
        };

        let read_timeout = Duration::from_secs(ctx.endpoints.deep_search.read_timeout_secs);
        let mut stream = ServiceStream::new(resp, read_timeout);
        let message_id = Uuid::new_v4().to_string();
        let mut answer = String::new();
        let mut files: Vec<FileHandle> = Vec::new();

        loop {
            let chunk = match stream.next_chunk().await {
                Ok(Some(v)) => v,
                Ok(None) => break,
                Err(e) => return ToolResult::err(&call.id, format!("deep search: {e}")),
            };
            let phase = chunk["messageType"].as_str().unwrap_or("search");
            let is_final = chunk["isFinal"].as_bool().unwrap_or(false);

            let mut ev = SseEvent::new(
                MessageType::DeepSearch,
                json!({
                    "messageType": phase,
                    "searchResult": chunk.get("searchResult").cloned().unwrap_or(json!({})),
                }),
            )
            .with_message_id(message_id.clone());
            if is_final {
                ev = ev.finalized();
            }
            ctx.printer.send(ev).await;

            if let Some(a) = chunk["answer"].as_str() {
                answer = a.to_string();
            }
            if let Some(info) = chunk["fileInfo"].as_array() {
                for f in info {
                    if let Ok(handle) = serde_json::from_value::<FileHandle>(f.clone()) {
                        files.push(handle);
                    }
                }
            }
            if is_final {
                break;
            }
        }

        ctx.record_files(&files);
        ctx.printer
            .send(SseEvent::task_summary(answer.clone(), &files).finalized())
            .await;

        if answer.is_empty() {
            answer = "deep search completed without a consolidated answer".to_string();
        }
        ToolResult::ok(&call.id, answer).with_files(files)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_requires_query() {
        let schema = DeepSearchTool.parameters_schema();
        assert_eq!(schema["required"][0], "query");
    }

    #[test]
    fn name_is_stable() {
        assert_eq!(DeepSearchTool.name(), "deep_search");
    }
}
