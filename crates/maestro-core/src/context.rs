// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use maestro_config::Config;
use maestro_sse::{FileHandle, Printer};
use maestro_tools::{ToolCollection, ToolContext};

/// Rendering style requested for the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputStyle {
    Html,
    Docs,
    Table,
    #[default]
    Default,
}

impl OutputStyle {
    pub fn from_option(raw: Option<&str>) -> Self {
        match raw {
            Some("html") => Self::Html,
            Some("docs") => Self::Docs,
            Some("table") => Self::Table,
            _ => Self::Default,
        }
    }

    /// Key into the configured output-style prompt map; `None` for default.
    pub fn prompt_key(self) -> Option<&'static str> {
        match self {
            Self::Html => Some("html"),
            Self::Docs => Some("docs"),
            Self::Table => Some("table"),
            Self::Default => None,
        }
    }
}

/// Per-request singleton carrying everything a run needs.
///
/// Created when the request is accepted, dropped after the final event;
/// never shared across requests.  The context owns the Printer and the tool
/// collection; tools get a [`ToolContext`] view when invoked and keep no
/// back-pointer.
pub struct AgentContext {
    pub request_id: String,
    pub session_id: String,
    pub query: String,
    pub output_style: OutputStyle,
    pub stream_mode: bool,
    pub printer: Arc<Printer>,
    pub tools: Arc<ToolCollection>,
    pub cancel: CancellationToken,
    pub config: Arc<Config>,
    http: reqwest::Client,
    /// Stage results accumulated for the summary agent.
    task_summary: Mutex<String>,
    /// Files produced during the request, in production order.
    files: Arc<Mutex<Vec<FileHandle>>>,
}

impl AgentContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request_id: impl Into<String>,
        session_id: impl Into<String>,
        query: impl Into<String>,
        output_style: OutputStyle,
        stream_mode: bool,
        printer: Arc<Printer>,
        tools: Arc<ToolCollection>,
        config: Arc<Config>,
        http: reqwest::Client,
    ) -> Self {
        let cancel = printer.cancellation();
        Self {
            request_id: request_id.into(),
            session_id: session_id.into(),
            query: query.into(),
            output_style,
            stream_mode,
            printer,
            tools,
            cancel,
            config,
            http,
            task_summary: Mutex::new(String::new()),
            files: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The view handed to tool executions.
    pub fn tool_context(&self) -> ToolContext {
        ToolContext {
            request_id: self.request_id.clone(),
            session_id: self.session_id.clone(),
            stream_mode: self.stream_mode,
            printer: Arc::clone(&self.printer),
            cancel: self.cancel.clone(),
            http: self.http.clone(),
            endpoints: self.config.tools.clone(),
            files: Arc::clone(&self.files),
        }
    }

    pub fn append_summary(&self, stage: &str, result: &str) {
        let mut summary = self.task_summary.lock().unwrap();
        if !summary.is_empty() {
            summary.push_str("\n\n");
        }
        summary.push_str(&format!("## {stage}\n{result}"));
    }

    pub fn task_summary(&self) -> String {
        self.task_summary.lock().unwrap().clone()
    }

    pub fn collected_files(&self) -> Vec<FileHandle> {
        self.files.lock().unwrap().clone()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
