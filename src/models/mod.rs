// Quiz data model
// Immutable quiz content supplied at session start, plus the snapshot and
// summary shapes the session exchanges with its collaborators.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Difficulty label, display-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// One selectable answer option. `value` is the canonical answer token,
/// `label` the display marker (e.g. "A").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    pub value: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub difficulty: Difficulty,
    pub options: Vec<QuestionOption>,
    pub image_url: Option<String>,
}

/// Immutable quiz content and policy flags, supplied once per attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizDefinition {
    pub quiz_id: String,
    pub time_limit_minutes: u32,
    pub questions: Vec<Question>,
    pub ai_hints_enabled: bool,
    pub auto_save_enabled: bool,
}

impl QuizDefinition {
    pub fn time_limit_seconds(&self) -> u32 {
        self.time_limit_minutes * 60
    }
}

/// Saved attempt snapshot. The same shape is read back at hydration and
/// written out on every autosave; answer keys are question indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(default)]
    pub answers: BTreeMap<usize, String>,
    #[serde(default)]
    pub current_question: usize,
    #[serde(default)]
    pub flagged_questions: BTreeSet<usize>,
    #[serde(default)]
    pub time_remaining: Option<u32>,
}

/// AI hint payload. The explanation is an optional learning tip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hint {
    pub hint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Countdown display phase. Carries no state-machine consequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Normal,
    Warning,
    Danger,
}

/// Data for the submit-confirmation dialog. Produced by a pure read; the
/// session does not change state until the submission is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitSummary {
    pub answered: usize,
    pub unanswered: usize,
    pub elapsed_seconds: u64,
}

impl SubmitSummary {
    /// Elapsed attempt time formatted as `m:ss`.
    pub fn time_used_display(&self) -> String {
        crate::utils::format_time(self.elapsed_seconds)
    }
}

/// Session timing knobs. Defaults match the production quiz interface.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Countdown tick period in milliseconds.
    pub tick_interval_ms: u64,
    /// Period of the background autosave task, in seconds.
    pub autosave_interval_secs: u64,
    /// Minimum gap since the last successful save; closer attempts are skipped.
    pub autosave_min_gap_secs: i64,
    /// Remaining seconds at which the timer enters the warning phase.
    pub warning_threshold_secs: u32,
    /// Remaining seconds at which the timer enters the danger phase.
    pub danger_threshold_secs: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            autosave_interval_secs: 30,
            autosave_min_gap_secs: 5,
            warning_threshold_secs: 600,
            danger_threshold_secs: 300,
        }
    }
}
