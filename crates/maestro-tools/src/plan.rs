// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use anyhow::bail;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Per-stage execution state.  Stages only ever move forward:
/// not_started → in_progress → completed (or → blocked on error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotStarted,
    InProgress,
    Completed,
    Blocked,
}

impl StepStatus {
    fn rank(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::InProgress => 1,
            Self::Completed => 2,
            Self::Blocked => 2,
        }
    }
}

/// The durable state of one planning-agent run: an ordered list of stages,
/// a parallel list of per-stage detail strings, and a parallel status list.
/// The three lists always have equal length.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    stages: Vec<String>,
    steps: Vec<String>,
    step_status: Vec<StepStatus>,
    current_index: usize,
}

impl Plan {
    pub fn create(stages: Vec<String>, steps: Vec<String>) -> anyhow::Result<Self> {
        if stages.is_empty() {
            bail!("a plan needs at least one stage");
        }
        if stages.iter().any(|s| s.trim().is_empty()) {
            bail!("stage descriptions must be non-empty");
        }
        let mut steps = steps;
        steps.resize(stages.len(), String::new());
        let step_status = vec![StepStatus::NotStarted; stages.len()];
        Ok(Self {
            stages,
            steps,
            step_status,
            current_index: 0,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn stage(&self, index: usize) -> Option<(&str, &str)> {
        Some((self.stages.get(index)?.as_str(), self.steps.get(index)?.as_str()))
    }

    pub fn status(&self, index: usize) -> Option<StepStatus> {
        self.step_status.get(index).copied()
    }

    /// The first stage that has not started yet.
    pub fn next_not_started(&self) -> Option<usize> {
        self.step_status
            .iter()
            .position(|s| *s == StepStatus::NotStarted)
    }

    /// All stages completed.
    pub fn is_complete(&self) -> bool {
        !self.is_empty() && self.current_index >= self.stages.len()
    }

    pub fn is_blocked(&self) -> bool {
        self.step_status.contains(&StepStatus::Blocked)
    }

    /// Replace the stage list while a run is underway.  Statuses of stages
    /// that still exist at the same index are preserved; added stages start
    /// as not_started.
    pub fn update(&mut self, stages: Vec<String>, steps: Vec<String>) -> anyhow::Result<()> {
        if stages.is_empty() {
            bail!("an updated plan needs at least one stage");
        }
        let mut steps = steps;
        steps.resize(stages.len(), String::new());
        let mut step_status = vec![StepStatus::NotStarted; stages.len()];
        for (i, slot) in step_status.iter_mut().enumerate() {
            if let Some(old) = self.step_status.get(i) {
                *slot = *old;
            }
        }
        self.stages = stages;
        self.steps = steps;
        self.step_status = step_status;
        self.current_index = self.current_index.min(self.stages.len());
        Ok(())
    }

    /// Transition one stage.  `index` defaults to the current stage.
    ///
    /// Rejects backward transitions and a second concurrent in_progress
    /// stage.  Marking the current stage completed advances `current_index`.
    pub fn mark_step(&mut self, index: Option<usize>, status: StepStatus) -> anyhow::Result<()> {
        let idx = index.unwrap_or(self.current_index);
        let Some(current) = self.step_status.get(idx).copied() else {
            bail!("stage index {idx} out of range ({} stages)", self.stages.len());
        };
        if status.rank() < current.rank() {
            bail!("stage {idx} cannot move backwards from {current:?} to {status:?}");
        }
        if current == StepStatus::Completed && status != StepStatus::Completed {
            bail!("stage {idx} is already completed");
        }
        if status == StepStatus::InProgress
            && self
                .step_status
                .iter()
                .enumerate()
                .any(|(i, s)| i != idx && *s == StepStatus::InProgress)
        {
            bail!("another stage is already in progress");
        }
        self.step_status[idx] = status;
        if status == StepStatus::Completed && idx == self.current_index {
            self.current_index += 1;
            // Skip over stages completed out of band.
            while self
                .step_status
                .get(self.current_index)
                .is_some_and(|s| *s == StepStatus::Completed)
            {
                self.current_index += 1;
            }
        }
        Ok(())
    }

    /// Conclude the plan: the in-progress stage (if any) is completed and the
    /// cursor moves past the last stage.
    pub fn finish(&mut self) {
        for s in &mut self.step_status {
            if *s == StepStatus::InProgress {
                *s = StepStatus::Completed;
            }
        }
        self.current_index = self.stages.len();
    }

    /// Wire payload for `plan` events.
    pub fn result_map(&self) -> Value {
        json!({
            "stages": self.stages,
            "steps": self.steps,
            "stepStatus": self.step_status,
            "currentIndex": self.current_index,
        })
    }

    /// Human-readable rendering recorded into agent memory.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, stage) in self.stages.iter().enumerate() {
            let marker = match self.step_status[i] {
                StepStatus::NotStarted => "[ ]",
                StepStatus::InProgress => "[~]",
                StepStatus::Completed => "[x]",
                StepStatus::Blocked => "[!]",
            };
            out.push_str(&format!("{marker} {}. {stage}", i + 1));
            if !self.steps[i].is_empty() {
                out.push_str(&format!(": {}", self.steps[i]));
            }
            out.push('\n');
        }
        out
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn two_stage_plan() -> Plan {
        Plan::create(
            vec!["Research X".into(), "Summarize".into()],
            vec!["use deep search".into(), String::new()],
        )
        .unwrap()
    }

    #[test]
    fn create_pads_steps_and_initializes_status() {
        let p = Plan::create(vec!["a".into(), "b".into()], vec![]).unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.status(0), Some(StepStatus::NotStarted));
        assert_eq!(p.status(1), Some(StepStatus::NotStarted));
        assert_eq!(p.current_index(), 0);
    }

    #[test]
    fn create_rejects_empty_plan() {
        assert!(Plan::create(vec![], vec![]).is_err());
        assert!(Plan::create(vec!["  ".into()], vec![]).is_err());
    }

    #[test]
    fn parallel_lists_stay_equal_length() {
        let mut p = two_stage_plan();
        assert_eq!(p.len(), 2);
        p.update(vec!["a".into(), "b".into(), "c".into()], vec!["s".into()])
            .unwrap();
        let map = p.result_map();
        assert_eq!(map["stages"].as_array().unwrap().len(), 3);
        assert_eq!(map["steps"].as_array().unwrap().len(), 3);
        assert_eq!(map["stepStatus"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn normal_lifecycle_advances_cursor() {
        let mut p = two_stage_plan();
        p.mark_step(Some(0), StepStatus::InProgress).unwrap();
        assert_eq!(p.current_index(), 0);
        p.mark_step(Some(0), StepStatus::Completed).unwrap();
        assert_eq!(p.current_index(), 1);
        p.mark_step(Some(1), StepStatus::InProgress).unwrap();
        p.mark_step(Some(1), StepStatus::Completed).unwrap();
        assert!(p.is_complete());
    }

    #[test]
    fn completed_stage_never_regresses() {
        let mut p = two_stage_plan();
        p.mark_step(Some(0), StepStatus::InProgress).unwrap();
        p.mark_step(Some(0), StepStatus::Completed).unwrap();
        assert!(p.mark_step(Some(0), StepStatus::InProgress).is_err());
        assert!(p.mark_step(Some(0), StepStatus::NotStarted).is_err());
        assert_eq!(p.status(0), Some(StepStatus::Completed));
    }

    #[test]
    fn only_one_stage_in_progress_at_a_time() {
        let mut p = two_stage_plan();
        p.mark_step(Some(0), StepStatus::InProgress).unwrap();
        assert!(p.mark_step(Some(1), StepStatus::InProgress).is_err());
    }

    #[test]
    fn blocked_stage_detected() {
        let mut p = two_stage_plan();
        p.mark_step(Some(0), StepStatus::InProgress).unwrap();
        p.mark_step(Some(0), StepStatus::Blocked).unwrap();
        assert!(p.is_blocked());
        assert!(!p.is_complete());
    }

    #[test]
    fn out_of_range_index_is_error() {
        let mut p = two_stage_plan();
        assert!(p.mark_step(Some(9), StepStatus::InProgress).is_err());
    }

    #[test]
    fn mark_step_defaults_to_current_stage() {
        let mut p = two_stage_plan();
        p.mark_step(None, StepStatus::InProgress).unwrap();
        assert_eq!(p.status(0), Some(StepStatus::InProgress));
    }

    #[test]
    fn update_preserves_existing_statuses() {
        let mut p = two_stage_plan();
        p.mark_step(Some(0), StepStatus::InProgress).unwrap();
        p.mark_step(Some(0), StepStatus::Completed).unwrap();
        p.update(vec!["Research X".into(), "Summarize".into(), "Publish".into()], vec![])
            .unwrap();
        assert_eq!(p.status(0), Some(StepStatus::Completed));
        assert_eq!(p.status(2), Some(StepStatus::NotStarted));
        assert_eq!(p.current_index(), 1);
    }

    #[test]
    fn finish_completes_in_progress_and_ends_plan() {
        let mut p = two_stage_plan();
        p.mark_step(Some(0), StepStatus::InProgress).unwrap();
        p.finish();
        assert_eq!(p.status(0), Some(StepStatus::Completed));
        assert!(p.is_complete());
    }

    #[test]
    fn next_not_started_skips_started_stages() {
        let mut p = two_stage_plan();
        assert_eq!(p.next_not_started(), Some(0));
        p.mark_step(Some(0), StepStatus::InProgress).unwrap();
        assert_eq!(p.next_not_started(), Some(1));
    }

    #[test]
    fn result_map_wire_shape() {
        let p = two_stage_plan();
        let map = p.result_map();
        assert_eq!(map["currentIndex"], 0);
        assert_eq!(map["stepStatus"][0], "not_started");
        assert_eq!(map["stages"][1], "Summarize");
    }

    #[test]
    fn render_marks_statuses() {
        let mut p = two_stage_plan();
        p.mark_step(Some(0), StepStatus::InProgress).unwrap();
        let text = p.render();
        assert!(text.contains("[~] 1. Research X"));
        assert!(text.contains("[ ] 2. Summarize"));
    }
}
