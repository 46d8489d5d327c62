// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use maestro_sse::{MessageType, Printer, SseEvent};

use crate::error::LlmError;

/// Token estimate divisor: ~4 chars per token averaged over English chat
/// traffic.  Profiles serving CJK-heavy deployments override this via
/// `chars_per_token` in the model config.
pub const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
///
/// `arguments` is the raw JSON-encoded argument object, forwarded verbatim;
/// parsing is the executing tool's job so a malformed call fails one tool,
/// not the whole turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// One entry in an agent's conversation memory.
///
/// A `tool` message always carries the `tool_call_id` of a prior assistant
/// tool call; `user` and `system` messages never carry tool fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Optional image reference (URL or data URL) attached to a user turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, text)
    }

    fn plain(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: text.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
            image_url: None,
        }
    }

    /// An assistant turn that requests tool invocations.
    pub fn assistant_with_tool_calls(text: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            tool_call_id: None,
            tool_calls: calls,
            image_url: None,
        }
    }

    /// The reply fed back for one tool call.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(call_id.into()),
            tool_calls: Vec::new(),
            image_url: None,
        }
    }

    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            image_url: Some(image_url.into()),
            ..Self::plain(Role::User, text)
        }
    }

    /// Approximate token cost of this message under the given divisor.
    pub fn approx_tokens(&self, chars_per_token: usize) -> usize {
        let mut chars = self.content.len();
        for tc in &self.tool_calls {
            chars += tc.name.len() + tc.arguments.len();
        }
        if self.image_url.is_some() {
            // Conservative flat estimate for one image attachment.
            chars += 765 * chars_per_token;
        }
        (chars / chars_per_token.max(1)).max(1)
    }
}

/// A tool schema advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    /// Force one specific tool by name.
    Function(String),
}

impl ToolChoice {
    /// Wire form for the `tool_choice` request field.
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Auto => Value::String("auto".into()),
            Self::None => Value::String("none".into()),
            Self::Required => Value::String("required".into()),
            Self::Function(name) => serde_json::json!({
                "type": "function",
                "function": { "name": name },
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    Stop,
    ToolCalls,
    Length,
    Other,
}

impl StopReason {
    pub fn from_wire(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") | None => Self::Stop,
            Some("tool_calls") => Self::ToolCalls,
            Some("length") => Self::Length,
            Some(_) => Self::Other,
        }
    }
}

/// The assembled assistant turn returned by a completion call.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
}

/// One completion request.  `system` prompts are prepended as leading system
/// messages; `cancel` is the request token observed while reading the stream.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub system: Vec<String>,
    pub tools: Vec<ToolSchema>,
    pub tool_choice: Option<ToolChoice>,
    pub temperature: Option<f32>,
    pub stream: bool,
    pub cancel: Option<CancellationToken>,
}

impl ChatRequest {
    /// All messages in wire order: configured system prompts first, then the
    /// conversation.
    pub fn assembled_messages(&self) -> Vec<Message> {
        let mut out: Vec<Message> = self.system.iter().map(Message::system).collect();
        out.extend(self.messages.iter().cloned());
        out
    }
}

/// Where streamed reasoning deltas go while a turn is being assembled.
///
/// The executor streams under `tool_thought`, the planner under
/// `plan_thought`; chunks share one message id and the last chunk is final.
pub struct ThoughtSink<'a> {
    printer: &'a Printer,
    message_type: MessageType,
    message_id: String,
}

impl<'a> ThoughtSink<'a> {
    pub fn new(printer: &'a Printer, message_type: MessageType) -> Self {
        Self {
            printer,
            message_type,
            message_id: Uuid::new_v4().to_string(),
        }
    }

    fn event(&self, text: &str, is_final: bool) -> SseEvent {
        let key = match self.message_type {
            MessageType::PlanThought => "planThought",
            _ => "toolThought",
        };
        let mut ev = SseEvent::new(self.message_type, serde_json::json!({ key: text }))
            .with_message_id(self.message_id.clone());
        if is_final {
            ev = ev.finalized();
        }
        ev
    }

    pub async fn delta(&self, text: &str) {
        if !text.is_empty() {
            self.printer.send(self.event(text, false)).await;
        }
    }

    pub async fn complete(&self, full_text: &str) {
        self.printer.send(self.event(full_text, true)).await;
    }
}

/// The seam between agents and any chat-completion backend.
///
/// Production uses [`crate::OpenAiChatModel`]; tests drive the agents with
/// the scripted mocks in [`crate::mock`].
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Identifier for logs and status output.
    fn name(&self) -> &str;

    /// Tokenizer approximation used for budget enforcement.
    fn count_tokens(&self, text: &str) -> usize {
        (text.len() / CHARS_PER_TOKEN).max(1)
    }

    /// Blocking completion without tools; returns the assistant text.
    async fn ask(&self, req: ChatRequest) -> Result<String, LlmError> {
        let mut req = req;
        req.tools.clear();
        req.tool_choice = None;
        let completion = self.ask_tool(req, None).await?;
        Ok(completion.text)
    }

    /// Completion advertising tools.  In stream mode, incremental reasoning
    /// deltas are forwarded through `thought` while the turn is assembled.
    async fn ask_tool(
        &self,
        req: ChatRequest,
        thought: Option<ThoughtSink<'_>>,
    ) -> Result<Completion, LlmError>;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
