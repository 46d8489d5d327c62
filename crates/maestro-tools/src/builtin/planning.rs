// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use maestro_model::ToolCall;
use maestro_sse::{MessageType, SseEvent};

use crate::plan::{Plan, StepStatus};
use crate::tool::{parse_arguments, Tool, ToolContext, ToolResult};

/// Mutates the request's shared [`Plan`] and publishes a `plan` event after
/// every successful mutation.  The planning agent holds the same `Arc` and
/// reads the plan between iterations.
pub struct PlanningTool {
    plan: Arc<Mutex<Plan>>,
}

impl PlanningTool {
    pub const NAME: &'static str = "planning";

    pub fn new(plan: Arc<Mutex<Plan>>) -> Self {
        Self { plan }
    }
}

fn string_list(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_status(raw: &str) -> Option<StepStatus> {
    match raw {
        "not_started" => Some(StepStatus::NotStarted),
        "in_progress" => Some(StepStatus::InProgress),
        "completed" => Some(StepStatus::Completed),
        "blocked" => Some(StepStatus::Blocked),
        _ => None,
    }
}

#[async_trait]
impl Tool for PlanningTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Create and maintain the execution plan for the current task. \
         Use action=create once with the ordered stage list, \
         action=update to revise remaining stages, \
         action=mark_step to change one stage's status, and \
         action=finish when the whole plan is done."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["create", "update", "mark_step", "finish"],
                    "description": "The plan mutation to perform"
                },
                "stages": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Ordered stage descriptions (create/update)"
                },
                "steps": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Optional per-stage instructions, parallel to stages"
                },
                "step_index": {
                    "type": "integer",
                    "description": "Stage to mark (mark_step); defaults to the current stage"
                },
                "step_status": {
                    "type": "string",
                    "enum": ["not_started", "in_progress", "completed", "blocked"],
                    "description": "New status for the stage (mark_step)"
                }
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolResult {
        let args = parse_arguments(call);
        let Some(action) = args.get("action").and_then(|v| v.as_str()) else {
            return ToolResult::err(&call.id, "missing 'action'");
        };
        debug!(action, "planning tool");

        let outcome = {
            let mut plan = self.plan.lock().unwrap();
            match action {
                "create" => Plan::create(string_list(&args, "stages"), string_list(&args, "steps"))
                    .map(|p| *plan = p),
                "update" => plan.update(string_list(&args, "stages"), string_list(&args, "steps")),
                "mark_step" => {
                    let index = args
                        .get("step_index")
                        .and_then(|v| v.as_u64())
                        .map(|v| v as usize);
                    let status = args
                        .get("step_status")
                        .and_then(|v| v.as_str())
                        .and_then(parse_status);
                    match status {
                        Some(status) => plan.mark_step(index, status),
                        None => Err(anyhow::anyhow!("mark_step needs a valid 'step_status'")),
                    }
                }
                "finish" => {
                    plan.finish();
                    Ok(())
                }
                other => Err(anyhow::anyhow!("unknown action: {other}")),
            }
            .map(|()| (plan.result_map(), plan.render()))
        };

        match outcome {
            Ok((map, rendered)) => {
                ctx.printer
                    .send(SseEvent::new(MessageType::Plan, map))
                    .await;
                ToolResult::ok(&call.id, rendered)
            }
            Err(e) => ToolResult::err(&call.id, format!("plan {action} failed: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use maestro_config::ToolsConfig;
    use maestro_sse::{Printer, PrinterOptions};

    use super::*;

    fn ctx_with_frames() -> (ToolContext, mpsc::Receiver<String>) {
        let (out_tx, out_rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();
        let ctx = ToolContext {
            request_id: "req".into(),
            session_id: "sess".into(),
            stream_mode: true,
            printer: Printer::spawn(out_tx, PrinterOptions::default(), cancel.clone()),
            cancel,
            http: reqwest::Client::new(),
            endpoints: ToolsConfig::default(),
            files: Arc::new(Mutex::new(Vec::new())),
        };
        (ctx, out_rx)
    }

    fn planning_call(args: Value) -> ToolCall {
        ToolCall {
            id: "call_plan".into(),
            name: PlanningTool::NAME.into(),
            arguments: args.to_string(),
        }
    }

    #[tokio::test]
    async fn create_populates_plan_and_emits_event() {
        let plan = Arc::new(Mutex::new(Plan::default()));
        let tool = PlanningTool::new(plan.clone());
        let (ctx, mut rx) = ctx_with_frames();

        let out = tool
            .execute(
                &ctx,
                &planning_call(json!({
                    "action": "create",
                    "stages": ["Research X", "Summarize"],
                    "steps": ["use deep search"]
                })),
            )
            .await;
        assert!(!out.is_error());
        assert_eq!(plan.lock().unwrap().len(), 2);

        let frame = rx.recv().await.unwrap();
        let v: Value = serde_json::from_str(frame.strip_prefix("data: ").unwrap().trim()).unwrap();
        assert_eq!(v["messageType"], "plan");
        assert_eq!(v["resultMap"]["currentIndex"], 0);
        assert_eq!(v["resultMap"]["stepStatus"][0], "not_started");
    }

    #[tokio::test]
    async fn mark_step_transitions_stage() {
        let plan = Arc::new(Mutex::new(
            Plan::create(vec!["a".into(), "b".into()], vec![]).unwrap(),
        ));
        let tool = PlanningTool::new(plan.clone());
        let (ctx, _rx) = ctx_with_frames();

        let out = tool
            .execute(
                &ctx,
                &planning_call(json!({
                    "action": "mark_step",
                    "step_index": 0,
                    "step_status": "in_progress"
                })),
            )
            .await;
        assert!(!out.is_error());
        assert_eq!(plan.lock().unwrap().status(0), Some(StepStatus::InProgress));
    }

    #[tokio::test]
    async fn invalid_transition_is_a_tool_error() {
        let plan = Arc::new(Mutex::new(
            Plan::create(vec!["a".into()], vec![]).unwrap(),
        ));
        let tool = PlanningTool::new(plan);
        let (ctx, _rx) = ctx_with_frames();

        let out = tool
            .execute(
                &ctx,
                &planning_call(json!({
                    "action": "mark_step",
                    "step_index": 5,
                    "step_status": "completed"
                })),
            )
            .await;
        assert!(out.is_error());
    }

    #[tokio::test]
    async fn missing_action_is_an_error() {
        let plan = Arc::new(Mutex::new(Plan::default()));
        let tool = PlanningTool::new(plan);
        let (ctx, _rx) = ctx_with_frames();
        let out = tool.execute(&ctx, &planning_call(json!({}))).await;
        assert!(out.is_error());
        assert!(out.content.contains("action"));
    }

    #[tokio::test]
    async fn finish_ends_the_plan() {
        let plan = Arc::new(Mutex::new(
            Plan::create(vec!["only".into()], vec![]).unwrap(),
        ));
        let tool = PlanningTool::new(plan.clone());
        let (ctx, _rx) = ctx_with_frames();
        tool.execute(&ctx, &planning_call(json!({"action": "finish"})))
            .await;
        assert!(plan.lock().unwrap().is_complete());
    }
}
