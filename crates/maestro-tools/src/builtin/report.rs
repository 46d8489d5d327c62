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

/// Generates a report artifact (html, markdown, or ppt) from files produced
/// earlier in the request.  Incremental chunks are forwarded under the
/// format's own message type; the final chunk carries the artifact handle.
pub struct ReportTool;

impl ReportTool {
    pub const NAME: &'static str = "report";
}

fn message_type_for(format: &str) -> Option<MessageType> {
    match format {
        "html" => Some(MessageType::Html),
        "markdown" => Some(MessageType::Markdown),
        "ppt" => Some(MessageType::Ppt),
        _ => None,
    }
}

#[async_trait]
impl Tool for ReportTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Assemble the request's files into a final deliverable. \
         Supported formats: html, markdown, ppt. Pass the names of the files \
         to include and an optional title."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "format": {
                    "type": "string",
                    "enum": ["html", "markdown", "ppt"]
                },
                "file_names": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Files to include in the report"
                },
                "title": { "type": "string" }
            },
            "required": ["format"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolResult {
        let args = parse_arguments(call);
        let Some(format) = args.get("format").and_then(|v| v.as_str()) else {
            return ToolResult::err(&call.id, "missing 'format'");
        };
        let Some(message_type) = message_type_for(format) else {
            return ToolResult::err(&call.id, format!("unsupported format: {format}"));
        };
        let file_names: Vec<&str> = args
            .get("file_names")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        debug!(format, files = file_names.len(), "report tool");

        let url = service_url(&ctx.endpoints.report.url, "v1/tool/report");
        let body = json!({
            "requestId": ctx.request_id,
            "format": format,
            "fileNames": file_names,
            "title": args.get("title").and_then(|v| v.as_str()),
            "streamMode": ctx.stream_mode,
        });
        let resp = match post_service(ctx, &url, &body).await {
            Ok(r) => r,
            Err(e) => return ToolResult::err(&call.id, format!("report: {e}")),
        };

        let read_timeout = Duration::from_secs(ctx.endpoints.report.read_timeout_secs);
        let mut stream = ServiceStream::new(resp, read_timeout);
        let message_id = Uuid::new_v4().to_string();
        let mut files: Vec<FileHandle> = Vec::new();

        loop {
            let chunk = match stream.next_chunk().await {
                Ok(Some(v)) => v,
                Ok(None) => break,
                Err(e) => return ToolResult::err(&call.id, format!("report: {e}")),
            };
            let data = chunk["data"].as_str().unwrap_or("");
            let is_final = chunk["isFinal"].as_bool().unwrap_or(false);

            if let Some(info) = chunk["fileInfo"].as_array() {
                for f in info {
                    if let Ok(handle) = serde_json::from_value::<FileHandle>(f.clone()) {
                        files.push(handle);
                    }
                }
            }

            let mut map = json!({ "data": data });
            if is_final && !files.is_empty() {
                map["fileInfo"] = json!(files);
            }
            let mut ev = SseEvent::new(message_type, map).with_message_id(message_id.clone());
            if is_final {
                ev = ev.finalized();
            }
            ctx.printer.send(ev).await;
            if is_final {
                break;
            }
        }

        ctx.record_files(&files);
        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        let content = if names.is_empty() {
            format!("{format} report generated")
        } else {
            format!("{format} report generated: {}", names.join(", "))
        };
        ToolResult::ok(&call.id, content).with_files(files)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_maps_to_message_type() {
        assert_eq!(message_type_for("html"), Some(MessageType::Html));
        assert_eq!(message_type_for("markdown"), Some(MessageType::Markdown));
        assert_eq!(message_type_for("ppt"), Some(MessageType::Ppt));
        assert_eq!(message_type_for("pdf"), None);
    }

    #[test]
    fn schema_requires_format() {
        let schema = ReportTool.parameters_schema();
        assert_eq!(schema["required"][0], "format");
    }
}
