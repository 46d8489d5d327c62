// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! System prompt assembly from the configured prompt texts.

use maestro_config::Config;

use crate::context::OutputStyle;

fn with_style(base: &str, config: &Config, style: OutputStyle) -> String {
    match style
        .prompt_key()
        .and_then(|key| config.prompts.output_style_map.get(key))
    {
        Some(suffix) => format!("{base}\n\n{suffix}"),
        None => base.to_string(),
    }
}

pub fn planning(config: &Config) -> String {
    config.prompts.planning.clone()
}

/// Executor prompt.  The output style is appended only when the executor's
/// answer is the user-facing result (react mode); stage executors inside a
/// plan leave formatting to the summary agent.
pub fn executor(config: &Config, style: OutputStyle) -> String {
    with_style(&config.prompts.executor, config, style)
}

pub fn stage_executor(config: &Config) -> String {
    config.prompts.executor.clone()
}

pub fn summary(config: &Config, style: OutputStyle) -> String {
    with_style(&config.prompts.summary, config, style)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
