// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use maestro_model::{ChatModel, ToolChoice};
use maestro_sse::{MessageType, SseEvent};
use maestro_tools::builtin::PlanningTool;
use maestro_tools::{Plan, StepStatus};

use crate::agent::{Agent, AgentCore, AgentState};
use crate::context::AgentContext;
use crate::executor::ExecutorAgent;
use crate::prompts;
use crate::react;

/// Drives the top-level plan: the first step makes the model lay the plan
/// out through the planning tool, each following step delegates one stage to
/// a fresh executor sub-run and advances the plan with the outcome.
pub struct PlanningAgent {
    core: AgentCore,
    llm: Arc<dyn ChatModel>,
    plan: Arc<Mutex<Plan>>,
}

impl PlanningAgent {
    pub fn new(llm: Arc<dyn ChatModel>, core: AgentCore, plan: Arc<Mutex<Plan>>) -> Self {
        Self { core, llm, plan }
    }

    async fn publish_plan(&self, ctx: &AgentContext) {
        let map = self.plan.lock().unwrap().result_map();
        ctx.printer.send(SseEvent::new(MessageType::Plan, map)).await;
    }

    /// First iteration: the model must call the planning tool with
    /// action=create.
    async fn create_plan(&mut self, ctx: &AgentContext) -> anyhow::Result<String> {
        let tools = ctx.tools.schemas();
        let has_tool_calls = react::think(
            &mut self.core,
            ctx,
            self.llm.as_ref(),
            tools,
            Some(ToolChoice::Function(PlanningTool::NAME.into())),
            MessageType::PlanThought,
        )
        .await?;
        if !has_tool_calls {
            bail!("planner returned no tool call while a plan was required");
        }
        let out = react::act(&mut self.core, ctx).await?;
        if self.plan.lock().unwrap().is_empty() {
            bail!("plan creation failed: {out}");
        }
        Ok(out)
    }

    /// Delegate one stage to an executor sub-run.
    async fn run_stage(&mut self, ctx: &AgentContext, index: usize) -> anyhow::Result<String> {
        let (stage, detail) = {
            let mut plan = self.plan.lock().unwrap();
            plan.mark_step(Some(index), StepStatus::InProgress)
                .context("starting stage")?;
            let (stage, detail) = plan.stage(index).unwrap_or_default();
            (stage.to_string(), detail.to_string())
        };
        self.publish_plan(ctx).await;
        ctx.printer
            .send(
                SseEvent::new(MessageType::Task, json!({ "task": stage.clone() }))
                    .with_task_id(index.to_string()),
            )
            .await;
        debug!(stage = %stage, index, "delegating stage to executor");

        let instruction = if detail.is_empty() {
            stage.clone()
        } else {
            format!("{stage}\n\n{detail}")
        };
        let executor_core = AgentCore::new(
            format!("executor[{index}]"),
            prompts::stage_executor(&ctx.config),
            &ctx.config.agent,
        );
        let mut executor = ExecutorAgent::new(Arc::clone(&self.llm), executor_core);
        let outcome = executor.run(ctx, &instruction).await;

        match outcome {
            Ok(result) => {
                {
                    let mut plan = self.plan.lock().unwrap();
                    plan.mark_step(Some(index), StepStatus::Completed)
                        .context("completing stage")?;
                }
                self.publish_plan(ctx).await;
                ctx.append_summary(&stage, &result);

                // The plan is the durable state; drop the per-stage tool
                // traffic and keep a one-line recap so the planner's memory
                // stays bounded.
                self.core.memory.clear_tool_context();
                self.core
                    .memory
                    .append(maestro_model::Message::assistant(format!(
                        "stage {} completed: {result}",
                        index + 1
                    )));

                if self.plan.lock().unwrap().is_complete() {
                    self.core.state = AgentState::Finished;
                }
                Ok(result)
            }
            Err(e) => {
                warn!(stage = %stage, error = %e, "stage failed; blocking plan");
                if let Err(mark_err) = self
                    .plan
                    .lock()
                    .unwrap()
                    .mark_step(Some(index), StepStatus::Blocked)
                {
                    warn!(error = %mark_err, "could not mark stage blocked");
                }
                self.publish_plan(ctx).await;
                Err(e.context(format!("stage '{stage}' failed")))
            }
        }
    }
}

#[async_trait]
impl Agent for PlanningAgent {
    fn core(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn step(&mut self, ctx: &AgentContext) -> anyhow::Result<String> {
        if self.plan.lock().unwrap().is_empty() {
            return self.create_plan(ctx).await;
        }

        let next = self.plan.lock().unwrap().next_not_started();
        match next {
            Some(index) => self.run_stage(ctx, index).await,
            None => {
                // Nothing left to start: every stage is completed (or was
                // completed out of band).
                self.core.state = AgentState::Finished;
                Ok(self.plan.lock().unwrap().render())
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
