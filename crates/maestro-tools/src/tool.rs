// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use maestro_config::ToolsConfig;
use maestro_model::ToolCall;
use maestro_sse::{FileHandle, Printer};

/// Request-scoped state handed to every tool execution.
///
/// Tools receive the context by reference when invoked and store no
/// back-pointers; the owning agent context outlives every tool task of the
/// request.
#[derive(Clone)]
pub struct ToolContext {
    pub request_id: String,
    pub session_id: String,
    pub stream_mode: bool,
    pub printer: Arc<Printer>,
    pub cancel: CancellationToken,
    /// Process-wide pooled HTTP client.
    pub http: reqwest::Client,
    pub endpoints: ToolsConfig,
    /// Files produced during this request, in production order.  Feeds the
    /// final `result` event's fileList and the file tool's `list` operation.
    pub files: Arc<Mutex<Vec<FileHandle>>>,
}

impl ToolContext {
    pub fn record_files(&self, files: &[FileHandle]) {
        if !files.is_empty() {
            self.files.lock().unwrap().extend_from_slice(files);
        }
    }

    pub fn collected_files(&self) -> Vec<FileHandle> {
        self.files.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Ok,
    Error,
}

/// The outcome of one tool execution.  Failures are folded into a value;
/// `execute` never aborts sibling calls in the same turn.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub call_id: String,
    pub status: ToolStatus,
    pub content: String,
    pub files: Vec<FileHandle>,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            status: ToolStatus::Ok,
            content: content.into(),
            files: Vec::new(),
        }
    }

    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            status: ToolStatus::Error,
            content: msg.into(),
            files: Vec::new(),
        }
    }

    pub fn with_files(mut self, files: Vec<FileHandle>) -> Self {
        self.files = files;
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }
}

/// Parse a call's raw JSON argument string.  The model client already
/// normalizes malformed argument text to `{}`, so this cannot fail on the
/// production path; an empty object is returned for anything else.
pub fn parse_arguments(call: &ToolCall) -> Value {
    serde_json::from_str(&call.arguments).unwrap_or_else(|_| Value::Object(Default::default()))
}

/// Trait every built-in and dynamically registered tool implements.
///
/// A tool may emit intermediate events through `ctx.printer` while running
/// (with `is_final = false`); the returned result carries the consolidated
/// content the agent records into memory.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;
    /// Execute the tool.  Errors are wrapped in [`ToolResult::err`].
    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolResult;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_result_is_not_error() {
        let r = ToolResult::ok("c1", "fine");
        assert!(!r.is_error());
        assert_eq!(r.call_id, "c1");
        assert!(r.files.is_empty());
    }

    #[test]
    fn err_result_is_error() {
        assert!(ToolResult::err("c1", "boom").is_error());
    }

    #[test]
    fn with_files_attaches_handles() {
        let f = FileHandle {
            file_name: "a.txt".into(),
            file_size: 1,
            domain_url: "https://x/a.txt".into(),
            oss_url: "oss://x/a.txt".into(),
            description: None,
        };
        let r = ToolResult::ok("c", "done").with_files(vec![f]);
        assert_eq!(r.files.len(), 1);
    }

    #[test]
    fn parse_arguments_valid_json() {
        let call = ToolCall {
            id: "c".into(),
            name: "t".into(),
            arguments: r#"{"x": 1}"#.into(),
        };
        assert_eq!(parse_arguments(&call)["x"], 1);
    }

    #[test]
    fn parse_arguments_falls_back_to_empty_object() {
        let call = ToolCall {
            id: "c".into(),
            name: "t".into(),
            arguments: "not json".into(),
        };
        assert!(parse_arguments(&call).is_object());
    }
}
