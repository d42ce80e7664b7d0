// Service modules
// The quiz session state machine and its injected collaborators.

pub mod backend;
pub mod clock;
pub mod session;

pub use backend::{
    BackendError,
    HintRequest,
    HttpQuizBackend,
    QuizBackend,
    SaveProgressRequest,
    SubmitRequest,
    SubmitResponse,
};

pub use clock::{
    Clock,
    ManualClock,
    SystemClock,
};

pub use session::{
    QuizSession,
    SaveOutcome,
    SessionError,
    FALLBACK_HINT,
    FALLBACK_HINT_TIP,
};
