//! EduGenie quiz-taking core.
//!
//! Owns the state of one timed quiz attempt: question navigation, answer and
//! flag bookkeeping, a pausable countdown, throttled autosave to a progress
//! store, best-effort AI hints and the two-step submission flow. Rendering,
//! routing and persistence belong to the host application; it drives the
//! session through explicit method calls and injects the backend and clock.

pub mod models;
pub mod services;
pub mod utils;

pub use models::{
    Difficulty, Hint, ProgressSnapshot, Question, QuestionOption, QuizDefinition, SessionConfig,
    SubmitSummary, TimerPhase,
};

pub use services::{
    BackendError, Clock, HttpQuizBackend, QuizBackend, QuizSession, SaveOutcome, SessionError,
    SystemClock,
};
