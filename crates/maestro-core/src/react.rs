// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The think/act halves shared by the reasoning agents.
//!
//! `think` asks the model for the next move (optionally streaming its
//! reasoning to the client) and records the assistant turn; `act` executes
//! the requested tool calls in parallel and records the ordered replies.
//! Each agent's `step` composes the two.

use anyhow::Context;
use serde_json::Value;

use maestro_model::{
    ChatModel, ChatRequest, Message, ThoughtSink, ToolChoice, ToolSchema,
};
use maestro_sse::MessageType;

use crate::agent::AgentCore;
use crate::context::AgentContext;

/// Output of `step` when a thought produced no tool calls.
pub const THOUGHT_COMPLETE: &str = "thought complete";

/// One reasoning turn.  Returns `true` when the assistant requested tools.
pub async fn think(
    core: &mut AgentCore,
    ctx: &AgentContext,
    llm: &dyn ChatModel,
    tools: Vec<ToolSchema>,
    tool_choice: Option<ToolChoice>,
    thought_type: MessageType,
) -> anyhow::Result<bool> {
    let mut system = vec![core.system_prompt.clone()];
    if let Some(next) = &core.next_step_prompt {
        system.push(next.clone());
    }
    let req = ChatRequest {
        messages: core.memory.snapshot(),
        system,
        tools,
        tool_choice,
        temperature: None,
        stream: ctx.stream_mode,
        cancel: Some(ctx.cancel.clone()),
    };
    let thought = if ctx.stream_mode {
        Some(ThoughtSink::new(&ctx.printer, thought_type))
    } else {
        None
    };
    let completion = llm
        .ask_tool(req, thought)
        .await
        .with_context(|| format!("model call failed in {}", core.name))?;

    let has_tool_calls = !completion.tool_calls.is_empty();
    core.memory.append(Message::assistant_with_tool_calls(
        completion.text,
        completion.tool_calls,
    ));
    Ok(has_tool_calls)
}

/// Execute the tool calls of the latest assistant turn.
///
/// Results come back in the model's call order; each reply is appended to
/// memory with its matching call id and announced as a `tool_result` event.
/// The return value is the readable concatenation the run loop records.
pub async fn act(core: &mut AgentCore, ctx: &AgentContext) -> anyhow::Result<String> {
    let calls = core.memory.last_tool_calls();
    if calls.is_empty() {
        return Ok(THOUGHT_COMPLETE.to_string());
    }

    let tool_ctx = ctx.tool_context();
    let results = ctx.tools.execute_many(&tool_ctx, &calls).await;

    let mut rendered = Vec::with_capacity(results.len());
    for (call, result) in calls.iter().zip(&results) {
        core.memory
            .append(Message::tool_result(&result.call_id, &result.content));

        let command: Value =
            serde_json::from_str(&call.arguments).unwrap_or(Value::Object(Default::default()));
        let mut ev = maestro_sse::SseEvent::tool_result(&call.name, command, &result.content)
            .finalized();
        if let Some(persona) = ctx.tools.persona(&call.name) {
            ev = ev.with_digital_employee(persona);
        }
        ctx.printer.send(ev).await;

        if result.is_error() {
            rendered.push(format!("{} failed: {}", call.name, result.content));
        } else {
            rendered.push(format!("{}: {}", call.name, result.content));
        }
    }
    Ok(rendered.join("\n"))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use maestro_config::Config;
    use maestro_model::mock::ScriptedMockModel;
    use maestro_model::ToolCall;
    use maestro_sse::{Printer, PrinterOptions};
    use maestro_tools::{Tool, ToolCollection, ToolContext, ToolResult};

    use super::*;
    use crate::context::OutputStyle;

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "uppercases the input"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, _ctx: &ToolContext, call: &ToolCall) -> ToolResult {
            ToolResult::ok(&call.id, call.arguments.to_uppercase())
        }
    }

    fn ctx_with_tools() -> (AgentContext, mpsc::Receiver<String>) {
        let (out_tx, out_rx) = mpsc::channel(256);
        let printer = Printer::spawn(out_tx, PrinterOptions::default(), CancellationToken::new());
        let tools = ToolCollection::new();
        tools.register(Arc::new(UpperTool));
        let ctx = AgentContext::new(
            "req",
            "sess",
            "q",
            OutputStyle::Default,
            false,
            printer,
            Arc::new(tools),
            Arc::new(Config::default()),
            reqwest::Client::new(),
        );
        (ctx, out_rx)
    }

    #[tokio::test]
    async fn think_records_assistant_turn_and_reports_tool_calls() {
        let (ctx, _rx) = ctx_with_tools();
        let llm = ScriptedMockModel::tool_then_text("c1", "upper", r#"{"x":"y"}"#, "done");
        let mut core = AgentCore::new("t", "sys", &Config::default().agent);
        let has = think(&mut core, &ctx, &llm, vec![], None, MessageType::ToolThought)
            .await
            .unwrap();
        assert!(has);
        assert_eq!(core.memory.last_tool_calls().len(), 1);
    }

    #[tokio::test]
    async fn think_without_tool_calls_returns_false() {
        let (ctx, _rx) = ctx_with_tools();
        let llm = ScriptedMockModel::always_text("plain answer");
        let mut core = AgentCore::new("t", "sys", &Config::default().agent);
        let has = think(&mut core, &ctx, &llm, vec![], None, MessageType::ToolThought)
            .await
            .unwrap();
        assert!(!has);
        assert_eq!(core.memory.last_assistant_text(), "plain answer");
    }

    #[tokio::test]
    async fn act_appends_paired_tool_replies_in_order() {
        let (ctx, _rx) = ctx_with_tools();
        let mut core = AgentCore::new("t", "sys", &Config::default().agent);
        core.memory.append(Message::assistant_with_tool_calls(
            "",
            vec![
                ToolCall { id: "c1".into(), name: "upper".into(), arguments: "\"a\"".into() },
                ToolCall { id: "c2".into(), name: "upper".into(), arguments: "\"b\"".into() },
            ],
        ));
        let out = act(&mut core, &ctx).await.unwrap();
        assert!(out.contains("upper:"));
        assert!(core.memory.tool_replies_paired());
        let snap = core.memory.snapshot();
        assert_eq!(snap[snap.len() - 2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(snap[snap.len() - 1].tool_call_id.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn act_without_calls_is_thought_complete() {
        let (ctx, _rx) = ctx_with_tools();
        let mut core = AgentCore::new("t", "sys", &Config::default().agent);
        core.memory.append(Message::assistant("no tools"));
        assert_eq!(act(&mut core, &ctx).await.unwrap(), THOUGHT_COMPLETE);
    }

    #[tokio::test]
    async fn act_emits_tool_result_events() {
        let (ctx, mut rx) = ctx_with_tools();
        let mut core = AgentCore::new("t", "sys", &Config::default().agent);
        core.memory.append(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall { id: "c1".into(), name: "upper".into(), arguments: "{}".into() }],
        ));
        act(&mut core, &ctx).await.unwrap();
        ctx.printer.close(maestro_sse::CloseReason::Done).await;

        let mut saw_tool_result = false;
        while let Some(frame) = rx.recv().await {
            let v: Value =
                serde_json::from_str(frame.strip_prefix("data: ").unwrap().trim()).unwrap();
            if v["messageType"] == "tool_result" {
                assert_eq!(v["resultMap"]["toolName"], "upper");
                saw_tool_result = true;
            }
        }
        assert!(saw_tool_result);
    }

    #[tokio::test]
    async fn unknown_tool_failure_is_recorded_not_thrown() {
        let (ctx, _rx) = ctx_with_tools();
        let mut core = AgentCore::new("t", "sys", &Config::default().agent);
        core.memory.append(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall { id: "c9".into(), name: "nope".into(), arguments: "{}".into() }],
        ));
        let out = act(&mut core, &ctx).await.unwrap();
        assert!(out.contains("nope failed"));
        assert!(core.memory.tool_replies_paired());
    }
}
