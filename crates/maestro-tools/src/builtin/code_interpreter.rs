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

use crate::builtin::file::upload_file;
use crate::builtin::{post_service, service_url, ServiceStream};
use crate::tool::{parse_arguments, Tool, ToolContext, ToolResult};

/// Runs a coding task against the code-interpreter service.
///
/// The service streams chunks of the form
/// `{"data": "...", "fileName"?: "...", "fileContent"?: "...", "isFinal": bool}`.
/// Incremental chunks are forwarded as `code` events; when the final chunk
/// names an artifact it is persisted through the file service and the last
/// `code` event carries the resulting handle.
pub struct CodeInterpreterTool;

impl CodeInterpreterTool {
    pub const NAME: &'static str = "code_interpreter";
}

#[async_trait]
impl Tool for CodeInterpreterTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Execute a programming task in a sandboxed interpreter: data analysis, \
         calculations, file generation, format conversion. Provide a complete \
         task description; reference previously produced files by name."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "What the interpreter should accomplish"
                },
                "file_names": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Input files available to the task"
                }
            },
            "required": ["task"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolResult {
        let args = parse_arguments(call);
        let Some(task) = args.get("task").and_then(|v| v.as_str()) else {
            return ToolResult::err(&call.id, "missing 'task'");
        };
        let file_names: Vec<&str> = args
            .get("file_names")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        debug!(task, "code interpreter tool");

        let url = service_url(&ctx.endpoints.code_interpreter.url, "v1/tool/code_interpreter");
        let body = json!({
            "task": task,
            "fileNames": file_names,
            "requestId": ctx.request_id,
            "streamMode": ctx.stream_mode,
        });
        let resp = match post_service(ctx, &url, &body).await {
            Ok(r) => r,
            Err(e) => return ToolResult::err(&call.id, format!("code interpreter: {e}")),
        };

        let read_timeout = Duration::from_secs(ctx.endpoints.code_interpreter.read_timeout_secs);
        let mut stream = ServiceStream::new(resp, read_timeout);
        // All chunks of this execution share one message id so the client
        // renders them as a single growing code block.
        let message_id = Uuid::new_v4().to_string();
        let mut output = String::new();
        let mut files: Vec<FileHandle> = Vec::new();

        loop {
            let chunk = match stream.next_chunk().await {
                Ok(Some(v)) => v,
                Ok(None) => break,
                Err(e) => return ToolResult::err(&call.id, format!("code interpreter: {e}")),
            };
            let data = chunk["data"].as_str().unwrap_or("");
            let is_final = chunk["isFinal"].as_bool().unwrap_or(false);
            if !data.is_empty() {
                output.push_str(data);
            }

            if is_final {
                // Persist the generated artifact before announcing it.
                if let (Some(name), Some(content)) = (
                    chunk["fileName"].as_str(),
                    chunk["fileContent"].as_str(),
                ) {
                    match upload_file(ctx, name, content, Some("code interpreter output")).await {
                        Ok(handle) => files.push(handle),
                        Err(e) => {
                            return ToolResult::err(&call.id, format!("artifact upload: {e}"))
                        }
                    }
                }
                ctx.record_files(&files);
                ctx.printer
                    .send(
                        SseEvent::new(
                            MessageType::Code,
                            json!({ "data": data, "fileInfo": files }),
                        )
                        .with_message_id(message_id.clone())
                        .finalized(),
                    )
                    .await;
                break;
            }

            ctx.printer
                .send(
                    SseEvent::new(MessageType::Code, json!({ "data": data }))
                        .with_message_id(message_id.clone()),
                )
                .await;
        }

        if output.is_empty() {
            output = "code interpreter produced no output".to_string();
        }
        ToolResult::ok(&call.id, output).with_files(files)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
