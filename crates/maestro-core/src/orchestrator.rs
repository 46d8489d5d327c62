// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tracing::{info, warn};

use maestro_model::ChatModel;
use maestro_sse::{CloseReason, FileHandle, ResultStatus, SseEvent};
use maestro_tools::builtin::PlanningTool;
use maestro_tools::Plan;

use crate::agent::{Agent, AgentCore};
use crate::context::AgentContext;
use crate::executor::ExecutorAgent;
use crate::planning::PlanningAgent;
use crate::prompts;
use crate::summary::SummaryAgent;

/// Top-level agent selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Plan,
    React,
}

/// The ingress request body for `POST /agent/run`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub request_id: String,
    pub session_id: String,
    pub query: String,
    pub mode: Mode,
    #[serde(default)]
    pub output_style: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

impl RunRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.request_id.trim().is_empty() {
            return Err("requestId must not be empty".into());
        }
        if self.query.trim().is_empty() {
            return Err("query must not be empty".into());
        }
        Ok(())
    }
}

/// Selects and drives the top-level agent, then turns whatever happened into
/// exactly one final `result` event and a closed stream.
pub struct Orchestrator {
    llm: Arc<dyn ChatModel>,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    /// Run one request to completion.  Never returns an error: every failure
    /// becomes a `result` event with `status=error` at this boundary.
    pub async fn run(&self, ctx: &AgentContext, mode: Mode) {
        info!(
            request_id = %ctx.request_id,
            session_id = %ctx.session_id,
            ?mode,
            "request started"
        );
        match self.run_inner(ctx, mode).await {
            Ok((text, files)) => {
                ctx.printer
                    .send(SseEvent::result(ResultStatus::Success, text, &files))
                    .await;
                ctx.printer.close(CloseReason::Done).await;
                info!(request_id = %ctx.request_id, "request finished");
            }
            Err(e) => {
                if ctx.cancel.is_cancelled() {
                    // Deadline or client hang-up: the printer watchdog already
                    // produced the right terminal behavior; just make sure the
                    // stream is closed.
                    warn!(request_id = %ctx.request_id, "request cancelled");
                    ctx.printer.close(CloseReason::Done).await;
                    return;
                }
                warn!(request_id = %ctx.request_id, error = ?e, "request failed");
                // User-visible message carries the top-level context only.
                ctx.printer
                    .send(SseEvent::result(ResultStatus::Error, e.to_string(), &[]))
                    .await;
                ctx.printer.close(CloseReason::Done).await;
            }
        }
    }

    async fn run_inner(
        &self,
        ctx: &AgentContext,
        mode: Mode,
    ) -> anyhow::Result<(String, Vec<FileHandle>)> {
        match mode {
            Mode::React => {
                let core = AgentCore::new(
                    "executor",
                    prompts::executor(&ctx.config, ctx.output_style),
                    &ctx.config.agent,
                );
                let mut agent = ExecutorAgent::new(Arc::clone(&self.llm), core);
                let text = agent.run(ctx, &ctx.query).await?;
                Ok((text, ctx.collected_files()))
            }
            Mode::Plan => {
                // The plan is shared between the planning tool (mutations)
                // and the planning agent (iteration).
                let plan = Arc::new(Mutex::new(Plan::default()));
                ctx.tools.register(Arc::new(PlanningTool::new(Arc::clone(&plan))));

                let core = AgentCore::new(
                    "planner",
                    prompts::planning(&ctx.config),
                    &ctx.config.agent,
                );
                let mut agent = PlanningAgent::new(Arc::clone(&self.llm), core, plan);
                agent.run(ctx, &ctx.query).await?;

                SummaryAgent::new(Arc::clone(&self.llm)).run(ctx).await
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
