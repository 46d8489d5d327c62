// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use maestro_model::ToolCall;
use maestro_sse::{FileHandle, MessageType, SseEvent};

use crate::builtin::service_url;
use crate::tool::{parse_arguments, Tool, ToolContext, ToolResult};

/// Store a document in the external file service and return its handle.
///
/// Shared with the streaming tools, which persist their generated artifacts
/// through the same endpoint.
pub(crate) async fn upload_file(
    ctx: &ToolContext,
    file_name: &str,
    content: &str,
    description: Option<&str>,
) -> anyhow::Result<FileHandle> {
    let url = service_url(&ctx.endpoints.file.url, "v1/file_tool/upload_file_data");
    let body = json!({
        "requestId": ctx.request_id,
        "fileName": file_name,
        "data": content,
        "description": description,
    });
    let resp = ctx
        .http
        .post(&url)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("POST {url}"))?;
    let status = resp.status();
    if !status.is_success() {
        anyhow::bail!("file upload returned {status}");
    }
    let v: Value = resp.json().await.context("file upload response body")?;
    Ok(FileHandle {
        file_name: v["fileName"].as_str().unwrap_or(file_name).to_string(),
        file_size: v["fileSize"].as_u64().unwrap_or(content.len() as u64),
        domain_url: v["domainUrl"].as_str().unwrap_or_default().to_string(),
        oss_url: v["ossUrl"].as_str().unwrap_or_default().to_string(),
        description: description.map(str::to_string),
    })
}

/// Upload, fetch, and list files through the external file service.
pub struct FileTool;

impl FileTool {
    pub const NAME: &'static str = "file";
}

#[async_trait]
impl Tool for FileTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Work with the request's files. \
         operation=upload stores content under file_name, \
         operation=get fetches a stored file's content, \
         operation=list shows every file produced so far in this request."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["upload", "get", "list"]
                },
                "file_name": { "type": "string" },
                "content": {
                    "type": "string",
                    "description": "File content (upload only)"
                },
                "description": {
                    "type": "string",
                    "description": "Short description shown to the user (upload only)"
                }
            },
            "required": ["operation"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolResult {
        let args = parse_arguments(call);
        let Some(operation) = args.get("operation").and_then(|v| v.as_str()) else {
            return ToolResult::err(&call.id, "missing 'operation'");
        };
        debug!(operation, "file tool");

        match operation {
            "upload" => {
                let (Some(file_name), Some(content)) = (
                    args.get("file_name").and_then(|v| v.as_str()),
                    args.get("content").and_then(|v| v.as_str()),
                ) else {
                    return ToolResult::err(&call.id, "upload needs 'file_name' and 'content'");
                };
                let description = args.get("description").and_then(|v| v.as_str());
                match upload_file(ctx, file_name, content, description).await {
                    Ok(handle) => {
                        ctx.record_files(std::slice::from_ref(&handle));
                        ctx.printer
                            .send(
                                SseEvent::new(
                                    MessageType::File,
                                    json!({ "fileInfo": [handle], "command": "upload" }),
                                )
                                .finalized(),
                            )
                            .await;
                        ToolResult::ok(&call.id, format!("uploaded {file_name}"))
                            .with_files(vec![handle])
                    }
                    Err(e) => ToolResult::err(&call.id, format!("upload failed: {e}")),
                }
            }
            "get" => {
                let Some(file_name) = args.get("file_name").and_then(|v| v.as_str()) else {
                    return ToolResult::err(&call.id, "get needs 'file_name'");
                };
                let url = service_url(
                    &ctx.endpoints.file.url,
                    &format!("v1/file_tool/get_file/{file_name}"),
                );
                let resp = match ctx.http.get(&url).send().await {
                    Ok(r) if r.status().is_success() => r,
                    Ok(r) => {
                        return ToolResult::err(&call.id, format!("get returned {}", r.status()))
                    }
                    Err(e) => return ToolResult::err(&call.id, format!("get failed: {e}")),
                };
                match resp.text().await {
                    Ok(content) => ToolResult::ok(&call.id, content),
                    Err(e) => ToolResult::err(&call.id, format!("reading file body: {e}")),
                }
            }
            "list" => {
                let files = ctx.collected_files();
                if files.is_empty() {
                    return ToolResult::ok(&call.id, "no files produced yet");
                }
                let listing = files
                    .iter()
                    .map(|f| format!("{} ({} bytes) {}", f.file_name, f.file_size, f.domain_url))
                    .collect::<Vec<_>>()
                    .join("\n");
                ToolResult::ok(&call.id, listing).with_files(files)
            }
            other => ToolResult::err(&call.id, format!("unknown operation: {other}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use maestro_config::ToolsConfig;
    use maestro_sse::{Printer, PrinterOptions};

    use super::*;

    fn test_ctx() -> ToolContext {
        let (out_tx, _out_rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();
        ToolContext {
            request_id: "req".into(),
            session_id: "sess".into(),
            stream_mode: false,
            printer: Printer::spawn(out_tx, PrinterOptions::default(), cancel.clone()),
            cancel,
            http: reqwest::Client::new(),
            endpoints: ToolsConfig::default(),
            files: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn file_call(args: Value) -> ToolCall {
        ToolCall {
            id: "call_file".into(),
            name: FileTool::NAME.into(),
            arguments: args.to_string(),
        }
    }

    #[tokio::test]
    async fn missing_operation_is_an_error() {
        let out = FileTool.execute(&test_ctx(), &file_call(json!({}))).await;
        assert!(out.is_error());
    }

    #[tokio::test]
    async fn unknown_operation_is_an_error() {
        let out = FileTool
            .execute(&test_ctx(), &file_call(json!({"operation": "delete"})))
            .await;
        assert!(out.is_error());
        assert!(out.content.contains("unknown operation"));
    }

    #[tokio::test]
    async fn upload_without_content_is_an_error() {
        let out = FileTool
            .execute(
                &test_ctx(),
                &file_call(json!({"operation": "upload", "file_name": "a.txt"})),
            )
            .await;
        assert!(out.is_error());
    }

    #[tokio::test]
    async fn list_reads_request_ledger() {
        let ctx = test_ctx();
        ctx.record_files(&[FileHandle {
            file_name: "out.py".into(),
            file_size: 5,
            domain_url: "https://files/out.py".into(),
            oss_url: "oss://b/out.py".into(),
            description: None,
        }]);
        let out = FileTool
            .execute(&ctx, &file_call(json!({"operation": "list"})))
            .await;
        assert!(!out.is_error());
        assert!(out.content.contains("out.py"));
        assert_eq!(out.files.len(), 1);
    }

    #[tokio::test]
    async fn list_with_no_files_reports_empty() {
        let out = FileTool
            .execute(&test_ctx(), &file_call(json!({"operation": "list"})))
            .await;
        assert!(!out.is_error());
        assert!(out.content.contains("no files"));
    }
}
