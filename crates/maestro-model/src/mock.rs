// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Deterministic models for tests.  No network access; agents and the
//! orchestrator are exercised end-to-end against scripted turns.
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::types::{ChatModel, ChatRequest, Completion, Role, StopReason, ThoughtSink, ToolCall};

/// Echoes the last user message back as the assistant response.
#[derive(Default)]
pub struct MockModel;

#[async_trait]
impl ChatModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn ask_tool(
        &self,
        req: ChatRequest,
        _thought: Option<ThoughtSink<'_>>,
    ) -> Result<Completion, LlmError> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_else(|| "[no input]".to_string());
        Ok(Completion {
            text: format!("MOCK: {reply}"),
            tool_calls: Vec::new(),
            stop_reason: StopReason::Stop,
        })
    }
}

/// One pre-scripted assistant turn.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTurn {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// Simulated model latency, observed before the turn is returned.  The
    /// request's cancellation token interrupts the wait (deadline tests).
    pub delay: Option<Duration>,
    /// When set, the call fails with a transport error instead of answering.
    pub fail: Option<String>,
}

impl ScriptedTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// A turn that errors out (exhausted-retries transport failure).
    pub fn fail(msg: impl Into<String>) -> Self {
        Self {
            fail: Some(msg.into()),
            ..Self::default()
        }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            tool_calls: vec![ToolCall {
                id: id.into(),
                name: name.into(),
                arguments: arguments.into(),
            }],
            ..Self::default()
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Pops one scripted turn per `ask_tool` call; records the last request so
/// tests can assert on what was sent.  When the script runs dry it keeps
/// returning the same plain text, which trips the duplicate-stall rule.
pub struct ScriptedMockModel {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    pub last_request: Mutex<Option<ChatRequest>>,
}

impl ScriptedMockModel {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            last_request: Mutex::new(None),
        }
    }

    /// Convenience: model that always returns the same text reply.
    pub fn always_text(text: impl Into<String>) -> Self {
        Self::new(vec![ScriptedTurn::text(text)])
    }

    /// Convenience: one tool call, then a text reply.
    pub fn tool_then_text(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            ScriptedTurn::tool_call(id, name, arguments),
            ScriptedTurn::text(final_text),
        ])
    }
}

#[async_trait]
impl ChatModel for ScriptedMockModel {
    fn name(&self) -> &str {
        "scripted-mock"
    }

    async fn ask_tool(
        &self,
        req: ChatRequest,
        thought: Option<ThoughtSink<'_>>,
    ) -> Result<Completion, LlmError> {
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ScriptedTurn::text("[no more scripts]"));
        *self.last_request.lock().unwrap() = Some(req.clone());

        if let Some(delay) = turn.delay {
            let cancel = req.cancel.clone().unwrap_or_default();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if let Some(msg) = turn.fail {
            return Err(LlmError::Transport(msg));
        }

        if let Some(sink) = thought {
            if req.stream && !turn.text.is_empty() {
                sink.complete(&turn.text).await;
            }
        }

        let stop_reason = if turn.tool_calls.is_empty() {
            StopReason::Stop
        } else {
            StopReason::ToolCalls
        };
        Ok(Completion {
            text: turn.text,
            tool_calls: turn.tool_calls,
            stop_reason,
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::types::Message;

    #[tokio::test]
    async fn mock_echoes_last_user_message() {
        let m = MockModel;
        let req = ChatRequest {
            messages: vec![Message::user("first"), Message::user("second")],
            ..ChatRequest::default()
        };
        let c = m.ask_tool(req, None).await.unwrap();
        assert_eq!(c.text, "MOCK: second");
    }

    #[tokio::test]
    async fn scripted_turns_pop_in_order() {
        let m = ScriptedMockModel::new(vec![ScriptedTurn::text("one"), ScriptedTurn::text("two")]);
        assert_eq!(m.ask_tool(ChatRequest::default(), None).await.unwrap().text, "one");
        assert_eq!(m.ask_tool(ChatRequest::default(), None).await.unwrap().text, "two");
    }

    #[tokio::test]
    async fn exhausted_script_repeats_fallback() {
        let m = ScriptedMockModel::new(vec![]);
        let a = m.ask_tool(ChatRequest::default(), None).await.unwrap();
        let b = m.ask_tool(ChatRequest::default(), None).await.unwrap();
        assert_eq!(a.text, b.text);
    }

    #[tokio::test]
    async fn tool_turn_sets_stop_reason() {
        let m = ScriptedMockModel::tool_then_text("c1", "file", "{}", "done");
        let c = m.ask_tool(ChatRequest::default(), None).await.unwrap();
        assert_eq!(c.stop_reason, StopReason::ToolCalls);
        assert_eq!(c.tool_calls[0].name, "file");
    }

    #[tokio::test]
    async fn last_request_recorded() {
        let m = ScriptedMockModel::always_text("hi");
        let req = ChatRequest {
            messages: vec![Message::user("observe me")],
            ..ChatRequest::default()
        };
        m.ask_tool(req, None).await.unwrap();
        let seen = m.last_request.lock().unwrap();
        assert_eq!(seen.as_ref().unwrap().messages[0].content, "observe me");
    }

    #[tokio::test]
    async fn delayed_turn_respects_cancellation() {
        let m = ScriptedMockModel::new(vec![
            ScriptedTurn::text("slow").with_delay(Duration::from_secs(10))
        ]);
        let cancel = CancellationToken::new();
        let req = ChatRequest {
            cancel: Some(cancel.clone()),
            ..ChatRequest::default()
        };
        cancel.cancel();
        let err = m.ask_tool(req, None).await.unwrap_err();
        assert!(matches!(err, LlmError::Cancelled));
    }
}
