// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod client;
mod error;
pub mod mock;
mod prune;
mod types;

pub use client::OpenAiChatModel;
pub use error::LlmError;
pub use prune::prune_messages;
pub use types::{
    ChatModel, ChatRequest, Completion, Message, Role, StopReason, ThoughtSink, ToolCall,
    ToolChoice, ToolSchema, CHARS_PER_TOKEN,
};
