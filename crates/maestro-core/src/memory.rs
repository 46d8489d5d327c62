// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use maestro_model::{Message, Role};

/// Append-only ordered message log scoped to one agent run.
///
/// Head truncation under the model's input budget happens in the model
/// client at request time; memory itself keeps the full run history.
#[derive(Debug, Clone, Default)]
pub struct Memory {
    messages: Vec<Message>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Tool calls requested by the most recent assistant message.
    pub fn last_tool_calls(&self) -> Vec<maestro_model::ToolCall> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.tool_calls.clone())
            .unwrap_or_default()
    }

    /// Text of the most recent assistant message.
    pub fn last_assistant_text(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    /// Remove all assistant-with-tool-calls and tool messages, keeping plain
    /// system/user/assistant text.  The planning agent calls this between
    /// iterations so its memory does not grow with every delegated stage;
    /// the plan itself is the durable state.
    pub fn clear_tool_context(&mut self) {
        self.messages
            .retain(|m| m.role != Role::Tool && m.tool_calls.is_empty());
    }

    /// True when every tool message references a tool call issued by an
    /// earlier assistant message.
    pub fn tool_replies_paired(&self) -> bool {
        let mut seen_ids: Vec<&str> = Vec::new();
        for m in &self.messages {
            for tc in &m.tool_calls {
                seen_ids.push(&tc.id);
            }
            if m.role == Role::Tool {
                match m.tool_call_id.as_deref() {
                    Some(id) if seen_ids.contains(&id) => {}
                    _ => return false,
                }
            }
        }
        true
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
