//! Quiz session state machine
//! Single owner of one quiz attempt: question navigation, answer and flag
//! bookkeeping, the countdown timer with pause, throttled autosave to the
//! progress store, AI hints and the two-step submission flow.

use chrono::Duration as ChronoDuration;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::{
    Hint, ProgressSnapshot, QuizDefinition, SessionConfig, SubmitSummary, TimerPhase,
};
use crate::services::backend::{
    BackendError, HintRequest, QuizBackend, SaveProgressRequest, SubmitRequest, SubmitResponse,
};
use crate::services::clock::Clock;

/// Study tip served when the hint service is unreachable. Hints are
/// best-effort enrichment and never block the attempt.
pub const FALLBACK_HINT: &str =
    "Try breaking down the question into smaller parts. Look for key terms \
     and think about what concepts they relate to.";
pub const FALLBACK_HINT_TIP: &str =
    "If you're unsure, eliminate options that seem clearly incorrect first.";

/// Caller-facing failures. Transient store and hint errors never surface
/// through this type; they are logged and absorbed.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid quiz definition: {0}")]
    InvalidDefinition(&'static str),
    #[error("your session has expired, please log in again")]
    SessionExpired,
    #[error("AI hints are not available for this quiz")]
    HintsDisabled,
    #[error("the quiz has already been submitted")]
    AlreadySubmitted,
    #[error("failed to submit quiz: {0}")]
    SubmitFailed(#[source] BackendError),
}

/// Result of one autosave attempt, for the caller's save indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Snapshot accepted by the progress store.
    Saved,
    /// Skipped, a successful save landed less than the minimum gap ago.
    Throttled,
    /// Autosave is turned off for this quiz.
    Disabled,
    /// Nothing to persist: terminal attempt or invalid input.
    Skipped,
    /// Transient store failure. The throttle window does not advance, so the
    /// next eligible trigger retries.
    Failed,
    /// The store rejected the credentials; re-authentication is required.
    AuthExpired,
}

/// Mutable attempt state. Owned exclusively by the session and only ever
/// touched under its lock.
#[derive(Debug)]
struct SessionState {
    current_question: usize,
    answers: BTreeMap<usize, String>,
    flagged_questions: BTreeSet<usize>,
    time_remaining: u32,
    is_paused: bool,
    is_submitted: bool,
    time_up_fired: bool,
    auth_expired: bool,
    started_at: chrono::DateTime<chrono::Utc>,
    /// Throttle baseline. Starts at construction; advances only on a
    /// successful save.
    last_save_at: chrono::DateTime<chrono::Utc>,
}

/// One quiz attempt. Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct QuizSession {
    definition: Arc<QuizDefinition>,
    student_id: String,
    attempt_id: Uuid,
    config: SessionConfig,
    state: Arc<Mutex<SessionState>>,
    backend: Arc<dyn QuizBackend>,
    clock: Arc<dyn Clock>,
    timer_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl QuizSession {
    /// Creates a fresh attempt: question 0, no answers or flags, full time.
    pub fn new(
        definition: QuizDefinition,
        student_id: impl Into<String>,
        backend: Arc<dyn QuizBackend>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        if definition.questions.is_empty() {
            return Err(SessionError::InvalidDefinition("quiz has no questions"));
        }
        if definition.time_limit_minutes == 0 {
            return Err(SessionError::InvalidDefinition(
                "time limit must be at least one minute",
            ));
        }

        let now = clock.now();
        let state = SessionState {
            current_question: 0,
            answers: BTreeMap::new(),
            flagged_questions: BTreeSet::new(),
            time_remaining: definition.time_limit_seconds(),
            is_paused: false,
            is_submitted: false,
            time_up_fired: false,
            auth_expired: false,
            started_at: now,
            last_save_at: now,
        };

        Ok(Self {
            definition: Arc::new(definition),
            student_id: student_id.into(),
            attempt_id: Uuid::new_v4(),
            config,
            state: Arc::new(Mutex::new(state)),
            backend,
            clock,
            timer_tasks: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Creates an attempt and tries to resume it from a previously saved
    /// snapshot. A missing or malformed snapshot is not fatal; the session
    /// falls back to fresh state.
    pub async fn start(
        definition: QuizDefinition,
        student_id: impl Into<String>,
        backend: Arc<dyn QuizBackend>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let session = Self::new(definition, student_id, backend, clock, config)?;

        match session
            .backend
            .load_progress(&session.definition.quiz_id, &session.student_id)
            .await
        {
            Ok(snapshot) => session.apply_snapshot(snapshot).await,
            Err(BackendError::NotFound) => {
                debug!(
                    "no saved progress for quiz {}, starting fresh",
                    session.definition.quiz_id
                );
            }
            Err(BackendError::Unauthorized) => {
                // Fresh-state fallback still applies; the host sees the
                // expiry flag and runs its renewal flow.
                warn!("progress load rejected, session expired");
                session.state.lock().await.auth_expired = true;
            }
            Err(err) => {
                warn!("failed to load saved progress, starting fresh: {err}");
            }
        }

        Ok(session)
    }

    /// Seeds state from a saved snapshot. A snapshot pointing at a question
    /// that does not exist is discarded wholesale.
    async fn apply_snapshot(&self, snapshot: ProgressSnapshot) {
        let total = self.definition.questions.len();
        if snapshot.current_question >= total {
            warn!(
                "discarding saved progress: question index {} out of range",
                snapshot.current_question
            );
            return;
        }

        let mut state = self.state.lock().await;
        state.current_question = snapshot.current_question;
        state.answers = snapshot
            .answers
            .into_iter()
            .filter(|(index, _)| *index < total)
            .collect();
        state.flagged_questions = snapshot
            .flagged_questions
            .into_iter()
            .filter(|index| *index < total)
            .collect();
        if let Some(time_remaining) = snapshot.time_remaining {
            state.time_remaining = time_remaining;
        }

        info!(
            "resumed quiz {} at question {} with {} answers",
            self.definition.quiz_id,
            state.current_question,
            state.answers.len()
        );
    }

    // ==================== Navigation ====================

    /// Jumps to a question. Out-of-range indices are silently ignored.
    pub async fn go_to(&self, index: usize) {
        let mut state = self.state.lock().await;
        if state.is_submitted {
            return;
        }
        if index < self.definition.questions.len() {
            state.current_question = index;
        }
    }

    /// Advances one question. On the last question this returns the
    /// confirmation summary instead, letting the caller run the submit
    /// dialog; nothing is submitted here.
    pub async fn next(&self) -> Option<SubmitSummary> {
        {
            let mut state = self.state.lock().await;
            if state.is_submitted {
                return None;
            }
            if state.current_question + 1 < self.definition.questions.len() {
                state.current_question += 1;
                return None;
            }
        }
        Some(self.submit_summary().await)
    }

    /// Goes back one question; a no-op on the first.
    pub async fn previous(&self) {
        let mut state = self.state.lock().await;
        if state.is_submitted {
            return;
        }
        if state.current_question > 0 {
            state.current_question -= 1;
        }
    }

    // ==================== Answers and flags ====================

    /// Records an answer for the current question, overwriting any prior
    /// value, then runs a throttled autosave.
    pub async fn select_answer(&self, value: impl Into<String>) -> SaveOutcome {
        {
            let mut state = self.state.lock().await;
            if state.is_submitted {
                return SaveOutcome::Skipped;
            }
            let index = state.current_question;
            state.answers.insert(index, value.into());
        }
        self.auto_save().await
    }

    /// Answers the current question by option position, the keyboard
    /// shortcut path. Positions past the option list are ignored.
    pub async fn select_option(&self, position: usize) -> SaveOutcome {
        let value = {
            let state = self.state.lock().await;
            if state.is_submitted {
                return SaveOutcome::Skipped;
            }
            let question = &self.definition.questions[state.current_question];
            match question.options.get(position) {
                Some(option) => option.value.clone(),
                None => return SaveOutcome::Skipped,
            }
        };
        self.select_answer(value).await
    }

    /// Removes the current question's answer, if any. Counts as a state
    /// change for autosave purposes.
    pub async fn clear_answer(&self) -> SaveOutcome {
        {
            let mut state = self.state.lock().await;
            if state.is_submitted {
                return SaveOutcome::Skipped;
            }
            let index = state.current_question;
            state.answers.remove(&index);
        }
        self.auto_save().await
    }

    /// Flags or unflags the current question for review. Returns the new
    /// flag state. Flags gate nothing; they ride along in save and submit
    /// payloads for review purposes.
    pub async fn toggle_flag(&self) -> bool {
        let mut state = self.state.lock().await;
        let index = state.current_question;
        if state.is_submitted {
            return state.flagged_questions.contains(&index);
        }
        if state.flagged_questions.remove(&index) {
            false
        } else {
            state.flagged_questions.insert(index);
            true
        }
    }

    // ==================== Timer ====================

    /// Advances the countdown by one second. Paused and terminal attempts
    /// ignore ticks. Reaching zero fires the time-up path exactly once.
    pub async fn tick(&self) {
        let fire_time_up = {
            let mut state = self.state.lock().await;
            if state.is_paused || state.is_submitted {
                return;
            }
            if state.time_remaining > 0 {
                state.time_remaining -= 1;
            }
            if state.time_remaining == 0 && !state.time_up_fired {
                state.time_up_fired = true;
                true
            } else {
                false
            }
        };

        if fire_time_up {
            self.time_up().await;
        }
    }

    /// Flips the pause state and returns it. Pause stops time consumption
    /// only; navigation, answering and autosave keep working.
    pub async fn toggle_pause(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.is_submitted {
            return false;
        }
        state.is_paused = !state.is_paused;
        state.is_paused
    }

    /// Display phase for the countdown. Presentational only.
    pub async fn timer_phase(&self) -> TimerPhase {
        let state = self.state.lock().await;
        if state.time_remaining <= self.config.danger_threshold_secs {
            TimerPhase::Danger
        } else if state.time_remaining <= self.config.warning_threshold_secs {
            TimerPhase::Warning
        } else {
            TimerPhase::Normal
        }
    }

    /// Forced terminal transition when the countdown hits zero. The
    /// submission is attempted once and the attempt stays terminal even if
    /// the call fails, so an expired quiz is never retried.
    async fn time_up(&self) {
        info!("time is up for quiz {}", self.definition.quiz_id);

        let request = {
            let mut state = self.state.lock().await;
            state.is_submitted = true;
            self.submit_request_locked(&state)
        };

        match self.backend.submit(&request).await {
            Ok(receipt) => {
                info!(
                    "quiz {} auto-submitted as {}",
                    self.definition.quiz_id, receipt.submission_id
                );
            }
            Err(BackendError::Unauthorized) => {
                warn!("time-up submission rejected, session expired; attempt stays terminal");
                self.state.lock().await.auth_expired = true;
            }
            Err(err) => {
                warn!("time-up submission failed, attempt stays terminal: {err}");
            }
        }

        self.cancel_timers().await;
    }

    // ==================== Hints ====================

    /// Asks the AI hint service about the current question. Transport
    /// failures degrade to a generic study tip; a rejected credential runs
    /// the session-expiry path instead.
    pub async fn request_hint(&self) -> Result<Hint, SessionError> {
        if !self.definition.ai_hints_enabled {
            return Err(SessionError::HintsDisabled);
        }

        let request = {
            let state = self.state.lock().await;
            HintRequest {
                quiz_id: self.definition.quiz_id.clone(),
                question_id: state.current_question,
                question_text: self.definition.questions[state.current_question]
                    .text
                    .clone(),
                student_id: self.student_id.clone(),
            }
        };

        match self.backend.fetch_hint(&request).await {
            Ok(hint) => Ok(hint),
            Err(BackendError::Unauthorized) => Err(self.expire_session().await),
            Err(err) => {
                warn!("hint service degraded, serving study tip: {err}");
                Ok(Hint {
                    hint: FALLBACK_HINT.to_string(),
                    explanation: Some(FALLBACK_HINT_TIP.to_string()),
                })
            }
        }
    }

    // ==================== Autosave ====================

    /// Persists the current snapshot to the progress store. Both the
    /// periodic task and answer mutations funnel through here; attempts
    /// landing inside the minimum gap since the last successful save are
    /// skipped.
    pub async fn auto_save(&self) -> SaveOutcome {
        self.save_progress(false).await
    }

    /// Throttle-bypassing save for page exit and the expiry handoff.
    pub async fn final_save(&self) -> SaveOutcome {
        self.save_progress(true).await
    }

    async fn save_progress(&self, bypass_throttle: bool) -> SaveOutcome {
        if !self.definition.auto_save_enabled {
            return SaveOutcome::Disabled;
        }

        let request = {
            let state = self.state.lock().await;
            if state.is_submitted {
                return SaveOutcome::Skipped;
            }
            if !bypass_throttle {
                let elapsed = self.clock.now() - state.last_save_at;
                if elapsed < ChronoDuration::seconds(self.config.autosave_min_gap_secs) {
                    return SaveOutcome::Throttled;
                }
            }
            self.save_request_locked(&state)
        };

        match self.backend.save_progress(&request).await {
            Ok(()) => {
                let mut state = self.state.lock().await;
                state.last_save_at = self.clock.now();
                debug!(
                    "saved progress for quiz {} ({} answers)",
                    self.definition.quiz_id,
                    request.answers.len()
                );
                SaveOutcome::Saved
            }
            Err(BackendError::Unauthorized) => {
                self.state.lock().await.auth_expired = true;
                warn!("progress save rejected, session expired");
                SaveOutcome::AuthExpired
            }
            Err(err) => {
                warn!("auto-save failed: {err}");
                SaveOutcome::Failed
            }
        }
    }

    // ==================== Submission ====================

    /// Confirmation summary for the submit dialog. Pure read.
    pub async fn submit_summary(&self) -> SubmitSummary {
        let state = self.state.lock().await;
        let answered = state.answers.len();
        SubmitSummary {
            answered,
            unanswered: self.definition.questions.len() - answered,
            elapsed_seconds: self.elapsed_seconds_locked(&state),
        }
    }

    /// Commits the attempt. On transport failure the terminal flag is rolled
    /// back so the user may retry; the tick and autosave tasks stay
    /// cancelled and are only re-armed by the caller via `spawn_timers`.
    pub async fn confirm_submit(&self) -> Result<SubmitResponse, SessionError> {
        let request = {
            let mut state = self.state.lock().await;
            if state.is_submitted {
                return Err(SessionError::AlreadySubmitted);
            }
            state.is_submitted = true;
            self.submit_request_locked(&state)
        };

        self.cancel_timers().await;

        match self.backend.submit(&request).await {
            Ok(receipt) => {
                info!(
                    "quiz {} submitted as {} after {}s",
                    self.definition.quiz_id, receipt.submission_id, request.time_taken
                );
                Ok(receipt)
            }
            Err(BackendError::Unauthorized) => {
                self.state.lock().await.is_submitted = false;
                Err(self.expire_session().await)
            }
            Err(err) => {
                self.state.lock().await.is_submitted = false;
                Err(SessionError::SubmitFailed(err))
            }
        }
    }

    /// Best-effort save, then mark the attempt as needing re-authentication.
    /// The renewal flow itself belongs to the host application.
    async fn expire_session(&self) -> SessionError {
        let outcome = self.final_save().await;
        debug!("final save before auth handoff: {outcome:?}");
        self.state.lock().await.auth_expired = true;
        SessionError::SessionExpired
    }

    // ==================== Timer tasks ====================

    /// Arms the one-second countdown tick and the periodic autosave.
    /// Idempotent while the tasks are alive; both are aborted when the
    /// attempt becomes terminal.
    pub async fn spawn_timers(&self) {
        let mut tasks = self.timer_tasks.lock().await;
        if !tasks.is_empty() {
            return;
        }

        let tick_session = self.clone();
        let tick_period = Duration::from_millis(self.config.tick_interval_ms);
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_period);
            interval.tick().await; // the first tick completes immediately
            loop {
                interval.tick().await;
                tick_session.tick().await;
            }
        }));

        let save_session = self.clone();
        let save_period = Duration::from_secs(self.config.autosave_interval_secs);
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(save_period);
            interval.tick().await;
            loop {
                interval.tick().await;
                save_session.auto_save().await;
            }
        }));
    }

    /// Aborts the tick and autosave tasks.
    pub async fn cancel_timers(&self) {
        let mut tasks = self.timer_tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    // ==================== Read accessors ====================

    pub fn definition(&self) -> &QuizDefinition {
        &self.definition
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub async fn current_question(&self) -> usize {
        self.state.lock().await.current_question
    }

    /// Selected value for the current question, if any.
    pub async fn current_answer(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.answers.get(&state.current_question).cloned()
    }

    pub async fn answers(&self) -> BTreeMap<usize, String> {
        self.state.lock().await.answers.clone()
    }

    pub async fn answered_count(&self) -> usize {
        self.state.lock().await.answers.len()
    }

    pub async fn is_answered(&self, index: usize) -> bool {
        self.state.lock().await.answers.contains_key(&index)
    }

    pub async fn flagged_questions(&self) -> BTreeSet<usize> {
        self.state.lock().await.flagged_questions.clone()
    }

    pub async fn is_flagged(&self, index: usize) -> bool {
        self.state.lock().await.flagged_questions.contains(&index)
    }

    pub async fn time_remaining(&self) -> u32 {
        self.state.lock().await.time_remaining
    }

    pub async fn is_paused(&self) -> bool {
        self.state.lock().await.is_paused
    }

    pub async fn is_submitted(&self) -> bool {
        self.state.lock().await.is_submitted
    }

    pub async fn auth_expired(&self) -> bool {
        self.state.lock().await.auth_expired
    }

    pub async fn last_save_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.state.lock().await.last_save_at
    }

    // ==================== Helpers ====================

    fn elapsed_seconds_locked(&self, state: &SessionState) -> u64 {
        // Wall-clock elapsed, paused time included.
        (self.clock.now() - state.started_at).num_seconds().max(0) as u64
    }

    fn save_request_locked(&self, state: &SessionState) -> SaveProgressRequest {
        SaveProgressRequest {
            quiz_id: self.definition.quiz_id.clone(),
            student_id: self.student_id.clone(),
            answers: state.answers.clone(),
            current_question: state.current_question,
            flagged_questions: state.flagged_questions.clone(),
            time_remaining: state.time_remaining,
        }
    }

    fn submit_request_locked(&self, state: &SessionState) -> SubmitRequest {
        SubmitRequest {
            quiz_id: self.definition.quiz_id.clone(),
            student_id: self.student_id.clone(),
            answers: state.answers.clone(),
            flagged_questions: state.flagged_questions.clone(),
            time_taken: self.elapsed_seconds_locked(state),
        }
    }
}
