// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use anyhow::Context;

use maestro_model::{ChatModel, ChatRequest, Message};
use maestro_sse::FileHandle;

use crate::context::AgentContext;
use crate::prompts;

/// Single-shot agent: one model call over the accumulated stage results
/// produces the user-facing final text.
pub struct SummaryAgent {
    llm: Arc<dyn ChatModel>,
}

impl SummaryAgent {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    pub async fn run(&self, ctx: &AgentContext) -> anyhow::Result<(String, Vec<FileHandle>)> {
        let stage_results = ctx.task_summary();
        let prompt = if stage_results.is_empty() {
            format!("Original request:\n{}", ctx.query)
        } else {
            format!(
                "Original request:\n{}\n\nStage results:\n{stage_results}",
                ctx.query
            )
        };
        let req = ChatRequest {
            messages: vec![Message::user(prompt)],
            system: vec![prompts::summary(&ctx.config, ctx.output_style)],
            cancel: Some(ctx.cancel.clone()),
            ..ChatRequest::default()
        };
        let text = self
            .llm
            .ask(req)
            .await
            .context("summary model call failed")?;
        Ok((text, ctx.collected_files()))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use maestro_config::Config;
    use maestro_model::mock::{MockModel, ScriptedMockModel};
    use maestro_sse::{Printer, PrinterOptions};
    use maestro_tools::ToolCollection;

    use super::*;
    use crate::context::{AgentContext, OutputStyle};

    fn ctx(style: OutputStyle) -> AgentContext {
        let (out_tx, _out_rx) = mpsc::channel(64);
        let printer = Printer::spawn(out_tx, PrinterOptions::default(), CancellationToken::new());
        AgentContext::new(
            "req",
            "sess",
            "compare A and B",
            style,
            false,
            printer,
            Arc::new(ToolCollection::new()),
            Arc::new(Config::default()),
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn summary_includes_query_and_stage_results() {
        let context = ctx(OutputStyle::Default);
        context.append_summary("Research", "A is faster");
        let llm = Arc::new(MockModel);
        let (text, files) = SummaryAgent::new(llm).run(&context).await.unwrap();
        // MockModel echoes the prompt it received.
        assert!(text.contains("compare A and B"));
        assert!(text.contains("A is faster"));
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn summary_system_prompt_carries_output_style() {
        let context = ctx(OutputStyle::Table);
        let llm = Arc::new(ScriptedMockModel::always_text("| a | b |"));
        SummaryAgent::new(llm.clone()).run(&context).await.unwrap();
        let seen = llm.last_request.lock().unwrap();
        let system = &seen.as_ref().unwrap().system;
        assert!(system[0].contains("tables"));
    }

    #[tokio::test]
    async fn summary_returns_collected_files() {
        let context = ctx(OutputStyle::Default);
        context.tool_context().record_files(&[FileHandle {
            file_name: "report.html".into(),
            file_size: 9,
            domain_url: String::new(),
            oss_url: String::new(),
            description: None,
        }]);
        let llm = Arc::new(ScriptedMockModel::always_text("done"));
        let (_, files) = SummaryAgent::new(llm).run(&context).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name, "report.html");
    }
}
