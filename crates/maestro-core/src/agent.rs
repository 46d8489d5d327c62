// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use tracing::{debug, warn};

use maestro_config::AgentConfig;
use maestro_model::Message;

use crate::context::AgentContext;
use crate::memory::Memory;

/// Run-loop state.  `Finished` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentState {
    #[default]
    Idle,
    Running,
    Finished,
    Error,
}

/// State shared by every agent: identity, prompts, memory, and the step
/// accounting the run loop enforces.
#[derive(Debug, Default)]
pub struct AgentCore {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub next_step_prompt: Option<String>,
    pub memory: Memory,
    pub state: AgentState,
    pub current_step: u32,
    pub max_steps: u32,
    pub duplicate_threshold: u32,
}

impl AgentCore {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>, cfg: &AgentConfig) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            system_prompt: system_prompt.into(),
            next_step_prompt: None,
            memory: Memory::new(),
            state: AgentState::Idle,
            current_step: 0,
            max_steps: cfg.max_steps,
            duplicate_threshold: cfg.duplicate_threshold,
        }
    }
}

/// An agent is anything with a step function; the run loop lives in the
/// trait's provided `run` so planning, executor, and test agents all share
/// the same budget, stall, and error semantics.
#[async_trait]
pub trait Agent: Send {
    fn core(&mut self) -> &mut AgentCore;

    /// One iteration.  Implementations update memory and may flip
    /// `core().state` to `Finished` to stop the loop.
    async fn step(&mut self, ctx: &AgentContext) -> anyhow::Result<String>;

    /// Drive the agent to a terminal state and return the last step output.
    ///
    /// Loop rules: `current_step` never exceeds `max_steps`; two (by default)
    /// consecutive identical step outputs are a stall and finish the run; a
    /// step error records the message into memory and terminates with
    /// `Error` state.
    async fn run(&mut self, ctx: &AgentContext, query: &str) -> anyhow::Result<String> {
        {
            let core = self.core();
            debug!(agent = %core.name, "run started");
            core.memory.append(Message::user(query));
            core.state = AgentState::Running;
            core.current_step = 0;
        }

        let mut recent: Vec<String> = Vec::new();
        let mut last = String::new();
        loop {
            {
                let core = self.core();
                if core.state != AgentState::Running || core.current_step >= core.max_steps {
                    break;
                }
                core.current_step += 1;
            }

            let output = match self.step(ctx).await {
                Ok(o) => o,
                Err(e) => {
                    let core = self.core();
                    warn!(agent = %core.name, step = core.current_step, error = %e, "step failed");
                    core.memory.append(Message::assistant(format!("step failed: {e}")));
                    core.state = AgentState::Error;
                    return Err(e);
                }
            };

            last = output.clone();
            recent.push(output);

            let core = self.core();
            let threshold = core.duplicate_threshold.max(2) as usize;
            if recent.len() >= threshold {
                let tail = &recent[recent.len() - threshold..];
                if !tail[0].is_empty() && tail.windows(2).all(|w| w[0] == w[1]) {
                    debug!(agent = %core.name, "identical step outputs; stalling run");
                    core.state = AgentState::Finished;
                }
            }
        }

        let core = self.core();
        if core.state == AgentState::Running {
            debug!(agent = %core.name, "step budget exhausted");
            core.state = AgentState::Finished;
        }
        debug!(agent = %core.name, steps = core.current_step, "run finished");
        Ok(last)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use maestro_config::Config;
    use maestro_sse::{Printer, PrinterOptions};
    use maestro_tools::ToolCollection;

    use super::*;
    use crate::context::OutputStyle;

    fn test_ctx() -> AgentContext {
        let (out_tx, _out_rx) = mpsc::channel(64);
        let printer = Printer::spawn(out_tx, PrinterOptions::default(), CancellationToken::new());
        AgentContext::new(
            "req",
            "sess",
            "q",
            OutputStyle::Default,
            false,
            printer,
            Arc::new(ToolCollection::new()),
            Arc::new(Config::default()),
            reqwest::Client::new(),
        )
    }

    /// Emits scripted outputs, one per step.
    struct ScriptAgent {
        core: AgentCore,
        outputs: Vec<anyhow::Result<String>>,
        finish_after: Option<usize>,
    }

    impl ScriptAgent {
        fn new(outputs: Vec<anyhow::Result<String>>) -> Self {
            Self {
                core: AgentCore::new("script", "", &Config::default().agent),
                outputs,
                finish_after: None,
            }
        }
    }

    #[async_trait]
    impl Agent for ScriptAgent {
        fn core(&mut self) -> &mut AgentCore {
            &mut self.core
        }

        async fn step(&mut self, _ctx: &AgentContext) -> anyhow::Result<String> {
            let idx = (self.core.current_step - 1) as usize;
            if let Some(n) = self.finish_after {
                if idx + 1 >= n {
                    self.core.state = AgentState::Finished;
                }
            }
            if idx < self.outputs.len() {
                self.outputs[idx]
                    .as_ref()
                    .map(|s| s.clone())
                    .map_err(|e| anyhow::anyhow!("{e}"))
            } else {
                Ok("same".to_string())
            }
        }
    }

    #[tokio::test]
    async fn run_appends_query_and_finishes() {
        let mut agent = ScriptAgent::new(vec![Ok("answer".into())]);
        agent.finish_after = Some(1);
        let out = agent.run(&test_ctx(), "the question").await.unwrap();
        assert_eq!(out, "answer");
        assert_eq!(agent.core.state, AgentState::Finished);
        assert_eq!(agent.core.memory.snapshot()[0].content, "the question");
    }

    #[tokio::test]
    async fn duplicate_outputs_stall_the_run() {
        let mut agent = ScriptAgent::new(vec![
            Ok("working".into()),
            Ok("same text".into()),
            Ok("same text".into()),
            Ok("never reached".into()),
        ]);
        let out = agent.run(&test_ctx(), "q").await.unwrap();
        assert_eq!(out, "same text");
        assert_eq!(agent.core.state, AgentState::Finished);
        assert_eq!(agent.core.current_step, 3);
    }

    #[tokio::test]
    async fn step_budget_caps_the_run() {
        let mut agent = ScriptAgent::new(
            (0..20).map(|i| Ok(format!("out {i}"))).collect(),
        );
        agent.core.max_steps = 4;
        agent.run(&test_ctx(), "q").await.unwrap();
        assert_eq!(agent.core.current_step, 4);
        assert_eq!(agent.core.state, AgentState::Finished);
    }

    #[tokio::test]
    async fn step_error_terminates_with_error_state() {
        let mut agent = ScriptAgent::new(vec![
            Ok("fine".into()),
            Err(anyhow::anyhow!("backend down")),
        ]);
        let err = agent.run(&test_ctx(), "q").await.unwrap_err();
        assert!(err.to_string().contains("backend down"));
        assert_eq!(agent.core.state, AgentState::Error);
        // The failure was recorded into memory.
        let snap = agent.core.memory.snapshot();
        assert!(snap.last().unwrap().content.contains("backend down"));
    }

    #[tokio::test]
    async fn current_step_never_exceeds_max_steps() {
        let mut agent = ScriptAgent::new(
            (0..50).map(|i| Ok(format!("{i}"))).collect(),
        );
        agent.core.max_steps = 10;
        agent.run(&test_ctx(), "q").await.unwrap();
        assert!(agent.core.current_step <= agent.core.max_steps);
    }

    #[tokio::test]
    async fn terminal_state_on_return() {
        let mut agent = ScriptAgent::new(vec![Ok("a".into()), Ok("a".into())]);
        agent.run(&test_ctx(), "q").await.unwrap();
        assert!(matches!(
            agent.core.state,
            AgentState::Finished | AgentState::Error
        ));
    }
}
