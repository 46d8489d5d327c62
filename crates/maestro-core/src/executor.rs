// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_trait::async_trait;

use maestro_model::ChatModel;
use maestro_sse::MessageType;
use maestro_tools::builtin::PlanningTool;

use crate::agent::{Agent, AgentCore, AgentState};
use crate::context::AgentContext;
use crate::react;

/// ReAct worker: reasons with the full tool set and executes what the model
/// requests.  A plain text reply (no tool calls) is the answer and ends the
/// run.  The planning tool is never advertised to an executor; plan
/// mutations belong to the planning agent above it.
pub struct ExecutorAgent {
    core: AgentCore,
    llm: Arc<dyn ChatModel>,
}

impl ExecutorAgent {
    pub fn new(llm: Arc<dyn ChatModel>, core: AgentCore) -> Self {
        Self { core, llm }
    }
}

#[async_trait]
impl Agent for ExecutorAgent {
    fn core(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn step(&mut self, ctx: &AgentContext) -> anyhow::Result<String> {
        let tools = ctx.tools.schemas_except(&[PlanningTool::NAME]);
        let has_tool_calls = react::think(
            &mut self.core,
            ctx,
            self.llm.as_ref(),
            tools,
            None,
            MessageType::ToolThought,
        )
        .await?;

        if has_tool_calls {
            return react::act(&mut self.core, ctx).await;
        }

        // A text-only turn is the stage answer.
        self.core.state = AgentState::Finished;
        Ok(self.core.memory.last_assistant_text())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
