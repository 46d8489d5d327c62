// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! OpenAI-compatible `/chat/completions` client.
//!
//! One struct covers both the blocking and the streaming path.  Streaming
//! responses arrive as SSE `data:` lines that may be split across TCP
//! packets; a persistent line buffer (see `maestro_sse::codec`) reassembles
//! them before parsing, and parallel tool-call deltas are merged by their
//! `index` field until the `[DONE]` sentinel.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use maestro_config::LlmProfile;
use maestro_sse::codec;

use crate::error::LlmError;
use crate::prune::prune_messages;
use crate::types::{
    ChatModel, ChatRequest, Completion, Message, Role, StopReason, ThoughtSink, ToolCall,
    CHARS_PER_TOKEN,
};

/// Backoff schedule for transient transport failures.
const RETRY_BASE: Duration = Duration::from_millis(500);
const RETRY_CAP: Duration = Duration::from_secs(8);

pub struct OpenAiChatModel {
    profile: LlmProfile,
    api_key: Option<String>,
    chat_url: String,
    http: reqwest::Client,
}

impl OpenAiChatModel {
    /// `http` is the process-wide pooled client; per-model state is only the
    /// resolved endpoint and key.
    pub fn new(profile: LlmProfile, http: reqwest::Client) -> Self {
        let api_key = profile.resolve_api_key();
        let base = profile.base_url.trim_end_matches('/');
        let chat_url = format!("{base}/chat/completions");
        Self {
            profile,
            api_key,
            chat_url,
            http,
        }
    }

    fn chars_per_token(&self) -> usize {
        self.profile.chars_per_token.unwrap_or(CHARS_PER_TOKEN)
    }

    fn build_body(&self, messages: &[Message], req: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.profile.model,
            "messages": build_wire_messages(messages),
            "temperature": req.temperature.unwrap_or(self.profile.temperature),
            "stream": req.stream,
            "max_tokens": self.profile.max_output_tokens,
        });
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
            if let Some(choice) = &req.tool_choice {
                body["tool_choice"] = choice.to_wire();
            }
        }
        body
    }

    /// One POST attempt.  The boolean is whether a retry may help: connect
    /// errors, timeouts, and 5xx are transient; 4xx is deterministic.
    async fn send_once(&self, body: &Value) -> Result<reqwest::Response, (LlmError, bool)> {
        let mut http_req = self.http.post(&self.chat_url).json(body);
        if let Some(key) = &self.api_key {
            http_req = http_req.bearer_auth(key);
        }
        let resp = http_req
            .send()
            .await
            .map_err(|e| (LlmError::Transport(format!("{}: {e}", self.profile.model)), true))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let retryable = status.is_server_error();
        let text = resp.text().await.unwrap_or_default();
        Err((
            LlmError::Transport(format!("{} error {status}: {text}", self.profile.model)),
            retryable,
        ))
    }

    /// POST with retry.  Retries happen strictly before any byte of the
    /// response has been consumed, so nothing retried was ever forwarded
    /// downstream.
    async fn send_with_retry(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let mut attempt: u32 = 0;
        loop {
            match self.send_once(body).await {
                Ok(resp) => return Ok(resp),
                Err((err, retryable)) => {
                    if !retryable || attempt >= self.profile.max_retries {
                        return Err(err);
                    }
                    let backoff = RETRY_CAP.min(RETRY_BASE * 2u32.saturating_pow(attempt));
                    warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient completion failure; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    fn parse_blocking_response(&self, v: &Value) -> Result<Completion, LlmError> {
        let choice = v
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| LlmError::Parse("response has no choices".into()))?;
        let msg = &choice["message"];
        let text = msg["content"].as_str().unwrap_or("").to_string();
        let mut tool_calls = Vec::new();
        if let Some(calls) = msg["tool_calls"].as_array() {
            for (i, tc) in calls.iter().enumerate() {
                let name = tc["function"]["name"].as_str().unwrap_or("").to_string();
                if name.is_empty() {
                    warn!("dropping tool call with empty name from model");
                    continue;
                }
                let id = match tc["id"].as_str() {
                    Some(s) if !s.is_empty() => s.to_string(),
                    _ => format!("tc_synthetic_{i}"),
                };
                let arguments = normalize_arguments(
                    tc["function"]["arguments"].as_str().unwrap_or(""),
                    &name,
                    &id,
                );
                tool_calls.push(ToolCall { id, name, arguments });
            }
        }
        let mut stop_reason = StopReason::from_wire(choice["finish_reason"].as_str());
        if !tool_calls.is_empty() && stop_reason == StopReason::Stop {
            stop_reason = StopReason::ToolCalls;
        }
        Ok(Completion {
            text,
            tool_calls,
            stop_reason,
        })
    }

    async fn read_stream(
        &self,
        resp: reqwest::Response,
        req: &ChatRequest,
        thought: Option<&ThoughtSink<'_>>,
    ) -> Result<Completion, LlmError> {
        let cancel = req.cancel.clone().unwrap_or_default();
        let mut stream = resp.bytes_stream();
        let mut buf = String::new();
        let mut text = String::new();
        // Keyed by the parallel-tool-call index; chunks for different calls
        // interleave, other endpoints always use index 0.  BTreeMap keeps the
        // flush ordered by index.
        let mut pending: BTreeMap<u32, PendingToolCall> = BTreeMap::new();
        let mut stop_reason = StopReason::Stop;

        'outer: loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let bytes =
                chunk.map_err(|e| LlmError::Transport(format!("stream read failed: {e}")))?;
            for payload in codec::feed(&mut buf, &bytes) {
                if payload == codec::DONE_SENTINEL {
                    break 'outer;
                }
                let v: Value = match serde_json::from_str(&payload) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "skipping unparseable stream chunk");
                        continue;
                    }
                };
                match parse_stream_chunk(&v) {
                    StreamDelta::Text(delta) => {
                        if let Some(sink) = thought {
                            sink.delta(&delta).await;
                        }
                        text.push_str(&delta);
                    }
                    StreamDelta::ToolCall {
                        index,
                        id,
                        name,
                        arguments,
                    } => {
                        let entry = pending.entry(index).or_default();
                        if !id.is_empty() {
                            entry.id = id;
                        }
                        if !name.is_empty() {
                            entry.name = name;
                        }
                        entry.arguments.push_str(&arguments);
                    }
                    StreamDelta::Finish(reason) => stop_reason = reason,
                    StreamDelta::Noop => {}
                }
            }
        }

        if let Some(sink) = thought {
            if !text.is_empty() {
                sink.complete(&text).await;
            }
        }

        let mut tool_calls = Vec::new();
        for (i, (_, ptc)) in pending.into_iter().enumerate() {
            match ptc.finish(i) {
                Some(tc) => tool_calls.push(tc),
                None => warn!("dropping streamed tool call with empty name"),
            }
        }
        if !tool_calls.is_empty() && stop_reason == StopReason::Stop {
            stop_reason = StopReason::ToolCalls;
        }
        Ok(Completion {
            text,
            tool_calls,
            stop_reason,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn name(&self) -> &str {
        &self.profile.model
    }

    fn count_tokens(&self, text: &str) -> usize {
        (text.len() / self.chars_per_token()).max(1)
    }

    async fn ask_tool(
        &self,
        req: ChatRequest,
        thought: Option<ThoughtSink<'_>>,
    ) -> Result<Completion, LlmError> {
        let cpt = self.chars_per_token();
        let budget = self
            .profile
            .max_input_tokens
            .saturating_sub(self.profile.max_output_tokens);
        let mut messages = req.assembled_messages();
        let remaining = prune_messages(&mut messages, budget, cpt);
        if remaining > budget {
            return Err(LlmError::Budget(format!(
                "input is {remaining} tokens after pruning; budget is {budget}"
            )));
        }

        let body = self.build_body(&messages, &req);
        debug!(
            model = %self.profile.model,
            message_count = messages.len(),
            tool_count = req.tools.len(),
            stream = req.stream,
            "sending completion request"
        );
        let resp = self.send_with_retry(&body).await?;

        if req.stream {
            self.read_stream(resp, &req, thought.as_ref()).await
        } else {
            let v: Value = resp
                .json()
                .await
                .map_err(|e| LlmError::Parse(format!("response body: {e}")))?;
            self.parse_blocking_response(&v)
        }
    }
}

/// A tool call being assembled from streamed deltas.
#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl PendingToolCall {
    /// Returns `None` when the name never arrived (undeliverable call).
    /// An absent id gets a synthetic one so the turn can still complete.
    fn finish(self, ordinal: usize) -> Option<ToolCall> {
        if self.name.is_empty() {
            return None;
        }
        let id = if self.id.is_empty() {
            warn!(tool_name = %self.name, "tool call arrived without id; synthesizing");
            format!("tc_synthetic_{ordinal}")
        } else {
            self.id
        };
        let arguments = normalize_arguments(&self.arguments, &self.name, &id);
        Some(ToolCall {
            id,
            name: self.name,
            arguments,
        })
    }
}

/// The model must hand tools a JSON object.  Empty or invalid argument text
/// becomes `{}` so one malformed call degrades to a tool-side error instead
/// of corrupting the conversation history.
fn normalize_arguments(raw: &str, tool_name: &str, call_id: &str) -> String {
    if raw.is_empty() {
        return "{}".to_string();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(_) => raw.to_string(),
        Err(e) => {
            warn!(
                tool_name,
                call_id,
                error = %e,
                "tool call arguments are not valid JSON; substituting {{}}"
            );
            "{}".to_string()
        }
    }
}

enum StreamDelta {
    Text(String),
    ToolCall {
        index: u32,
        id: String,
        name: String,
        arguments: String,
    },
    Finish(StopReason),
    Noop,
}

fn parse_stream_chunk(v: &Value) -> StreamDelta {
    let choice = &v["choices"][0];

    if let Some(reason) = choice["finish_reason"].as_str() {
        return StreamDelta::Finish(StopReason::from_wire(Some(reason)));
    }

    let delta = &choice["delta"];
    if let Some(tc) = delta["tool_calls"].get(0) {
        return StreamDelta::ToolCall {
            index: tc["index"].as_u64().unwrap_or(0) as u32,
            id: tc["id"].as_str().unwrap_or("").to_string(),
            name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
            arguments: tc["function"]["arguments"].as_str().unwrap_or("").to_string(),
        };
    }
    if let Some(text) = delta["content"].as_str() {
        if !text.is_empty() {
            return StreamDelta::Text(text.to_string());
        }
    }
    StreamDelta::Noop
}

/// Serialize messages into the `/chat/completions` wire format.
///
/// Free function so the mapping is unit-testable without HTTP.
fn build_wire_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| match m.role {
            Role::System => json!({ "role": "system", "content": m.content }),
            Role::User => {
                if let Some(url) = &m.image_url {
                    json!({
                        "role": "user",
                        "content": [
                            { "type": "text", "text": m.content },
                            { "type": "image_url", "image_url": { "url": url } },
                        ]
                    })
                } else {
                    json!({ "role": "user", "content": m.content })
                }
            }
            Role::Assistant => {
                if m.tool_calls.is_empty() {
                    json!({ "role": "assistant", "content": m.content })
                } else {
                    let calls: Vec<Value> = m
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": { "name": tc.name, "arguments": tc.arguments },
                            })
                        })
                        .collect();
                    let mut obj = json!({ "role": "assistant", "tool_calls": calls });
                    if !m.content.is_empty() {
                        obj["content"] = json!(m.content);
                    }
                    obj
                }
            }
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": m.tool_call_id.clone().unwrap_or_default(),
                "content": m.content,
            }),
        })
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
