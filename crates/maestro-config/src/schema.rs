// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub sse: SseConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// Named model profiles plus the profile used when a request does not select
/// one explicitly.
///
/// ```yaml
/// llm:
///   default: main
///   profiles:
///     main:
///       base_url: https://api.openai.com/v1
///       api_key_env: OPENAI_API_KEY
///       model: gpt-4o
///     local:
///       base_url: http://localhost:8080/v1
///       model: qwen2.5
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_profile_name")]
    pub default: String,
    #[serde(default)]
    pub profiles: HashMap<String, LlmProfile>,
}

fn default_profile_name() -> String {
    "default".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(default_profile_name(), LlmProfile::default());
        Self {
            default: default_profile_name(),
            profiles,
        }
    }
}

impl LlmConfig {
    /// Resolve a profile by name, falling back to the default profile.
    pub fn profile(&self, name: Option<&str>) -> Option<&LlmProfile> {
        let key = name.unwrap_or(self.default.as_str());
        self.profiles.get(key).or_else(|| self.profiles.get(&self.default))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProfile {
    /// API base ending before `/chat/completions`, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Explicit API key; prefer api_key_env in version-controlled files.
    pub api_key: Option<String>,
    /// Environment variable holding the API key (read at runtime).
    pub api_key_env: Option<String>,
    /// Model name forwarded to the provider API.
    pub model: String,
    /// Input window budget enforced by pruning before every call.
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,
    /// Maximum tokens requested for a single completion; also reserved out of
    /// the input budget so the model always has room to answer.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,
    /// Sampling temperature (0.0–2.0).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Token estimate divisor override.  Most chat models average ~4 chars
    /// per token; CJK-heavy deployments may set 2.
    pub chars_per_token: Option<usize>,
    /// Transient-transport retry attempts before surfacing the error.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

fn default_max_input_tokens() -> usize {
    128_000
}

fn default_max_output_tokens() -> usize {
    8_192
}

fn default_temperature() -> f32 {
    0.2
}

fn default_retries() -> u32 {
    3
}

impl Default for LlmProfile {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".to_string(),
            api_key: None,
            api_key_env: None,
            model: "gpt-4o".to_string(),
            max_input_tokens: default_max_input_tokens(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
            chars_per_token: None,
            max_retries: default_retries(),
        }
    }
}

impl LlmProfile {
    /// Resolve the API key: explicit value wins, then the named env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(k) = &self.api_key {
            return Some(k.clone());
        }
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
    }
}

/// HTTP endpoints of the sub-services behind the built-in tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_code_interpreter")]
    pub code_interpreter: EndpointConfig,
    #[serde(default = "default_deep_search")]
    pub deep_search: EndpointConfig,
    #[serde(default = "default_report")]
    pub report: EndpointConfig,
    #[serde(default = "default_file")]
    pub file: EndpointConfig,
}

fn default_code_interpreter() -> EndpointConfig {
    EndpointConfig::new("http://localhost:8100")
}

fn default_deep_search() -> EndpointConfig {
    EndpointConfig::new("http://localhost:8101")
}

fn default_report() -> EndpointConfig {
    EndpointConfig::new("http://localhost:8102")
}

fn default_file() -> EndpointConfig {
    EndpointConfig::new("http://localhost:8103")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            code_interpreter: default_code_interpreter(),
            deep_search: default_deep_search(),
            report: default_report(),
            file: default_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    /// Per-read timeout when consuming this service's response.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

fn default_read_timeout() -> u64 {
    60
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

/// Remote MCP servers whose tools are materialized into the registry at boot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseConfig {
    #[serde(default = "default_heartbeat")]
    pub heartbeat_seconds: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// End-to-end deadline per request; on expiry the stream ends with a
    /// final `result` event carrying status `timeout`.
    #[serde(default = "default_request_deadline")]
    pub request_deadline_secs: u64,
}

fn default_heartbeat() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    60
}

fn default_request_deadline() -> u64 {
    3_600
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            heartbeat_seconds: default_heartbeat(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            request_deadline_secs: default_request_deadline(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Consecutive identical step outputs that count as a stall.
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: u32,
}

fn default_max_steps() -> u32 {
    10
}

fn default_duplicate_threshold() -> u32 {
    2
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            duplicate_threshold: default_duplicate_threshold(),
        }
    }
}

/// System prompt texts for the three agent roles, plus per-output-style
/// suffixes selected by the request's `outputStyle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "default_planning_prompt")]
    pub planning: String,
    #[serde(default = "default_executor_prompt")]
    pub executor: String,
    #[serde(default = "default_summary_prompt")]
    pub summary: String,
    #[serde(default = "default_output_style_map")]
    pub output_style_map: HashMap<String, String>,
}

fn default_planning_prompt() -> String {
    "You are the planning lead of a team of autonomous agents. \
     Break the user's task into an ordered list of concrete stages using the \
     `planning` tool (action=create). Each stage must be independently \
     executable and verifiable. Keep the plan short: prefer 2-5 stages. \
     After every stage result, decide whether the remaining plan still holds \
     and update it with the `planning` tool if not."
        .to_string()
}

fn default_executor_prompt() -> String {
    "You are an execution agent working on exactly one stage of a larger \
     task. Use the available tools to complete the stage. When the stage is \
     done, reply with a plain text answer summarizing the outcome and any \
     artifacts produced; do not call further tools once the stage goal is met."
        .to_string()
}

fn default_summary_prompt() -> String {
    "You are writing the final answer for the user. You receive the original \
     request and the results of every completed stage. Produce one coherent, \
     user-facing response. Mention generated files by name. Do not describe \
     the internal agents or tools."
        .to_string()
}

fn default_output_style_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    m.insert(
        "html".to_string(),
        "Format the final answer as a self-contained HTML document.".to_string(),
    );
    m.insert(
        "docs".to_string(),
        "Format the final answer as a structured document with headings.".to_string(),
    );
    m.insert(
        "table".to_string(),
        "Prefer tables for any enumerable data in the final answer.".to_string(),
    );
    m
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            planning: default_planning_prompt(),
            executor: default_executor_prompt(),
            summary: default_summary_prompt(),
            output_style_map: default_output_style_map(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
