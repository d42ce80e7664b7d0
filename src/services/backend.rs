//! Quiz backend adapters
//! Abstract request/response interface to the progress store, the AI hint
//! service and the submission service, plus the JSON-over-HTTP implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::models::{Hint, ProgressSnapshot};

/// Wire-level failure classification. Everything that is not an auth or
/// not-found response is treated as transient by the session.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("authentication expired")]
    Unauthorized,
    #[error("resource not found")]
    NotFound,
    #[error("backend returned status {status}: {detail}")]
    Api { status: u16, detail: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Autosave payload sent to the progress store.
#[derive(Debug, Clone, Serialize)]
pub struct SaveProgressRequest {
    pub quiz_id: String,
    pub student_id: String,
    pub answers: BTreeMap<usize, String>,
    pub current_question: usize,
    pub flagged_questions: BTreeSet<usize>,
    pub time_remaining: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct HintRequest {
    pub quiz_id: String,
    pub question_id: usize,
    pub question_text: String,
    pub student_id: String,
}

/// Final grading payload. `time_taken` is wall-clock seconds since the
/// attempt started, paused time included.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub quiz_id: String,
    pub student_id: String,
    pub answers: BTreeMap<usize, String>,
    pub flagged_questions: BTreeSet<usize>,
    pub time_taken: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubmitResponse {
    pub submission_id: String,
}

/// External collaborators of a quiz attempt. The session is written against
/// this trait so tests and alternative transports can stand in for HTTP.
#[async_trait]
pub trait QuizBackend: Send + Sync {
    /// Fetches the saved snapshot for one attempt. `NotFound` means no
    /// attempt was saved, which callers treat as a fresh start.
    async fn load_progress(
        &self,
        quiz_id: &str,
        student_id: &str,
    ) -> Result<ProgressSnapshot, BackendError>;

    async fn save_progress(&self, request: &SaveProgressRequest) -> Result<(), BackendError>;

    async fn fetch_hint(&self, request: &HintRequest) -> Result<Hint, BackendError>;

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, BackendError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// JSON-over-HTTP backend speaking the `/quiz/*` API.
#[derive(Clone)]
pub struct HttpQuizBackend {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpQuizBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Maps non-2xx statuses onto the error taxonomy, pulling the `detail`
    /// message out of the body when the backend provides one.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status.as_u16() {
            401 => Err(BackendError::Unauthorized),
            404 => Err(BackendError::NotFound),
            code => {
                let detail = response
                    .json::<ErrorBody>()
                    .await
                    .map(|body| body.detail)
                    .unwrap_or_else(|_| "An unknown error occurred.".to_string());
                Err(BackendError::Api {
                    status: code,
                    detail,
                })
            }
        }
    }
}

#[async_trait]
impl QuizBackend for HttpQuizBackend {
    async fn load_progress(
        &self,
        quiz_id: &str,
        student_id: &str,
    ) -> Result<ProgressSnapshot, BackendError> {
        let url = format!("{}/quiz/progress/{}/{}", self.base_url, quiz_id, student_id);

        let response = self.http_client.get(&url).send().await?;
        let response = Self::check_status(response).await?;

        response
            .json::<ProgressSnapshot>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn save_progress(&self, request: &SaveProgressRequest) -> Result<(), BackendError> {
        let url = format!("{}/quiz/save-progress", self.base_url);

        let response = self.http_client.post(&url).json(request).send().await?;
        Self::check_status(response).await?;

        Ok(())
    }

    async fn fetch_hint(&self, request: &HintRequest) -> Result<Hint, BackendError> {
        let url = format!("{}/quiz/hints", self.base_url);

        let response = self.http_client.post(&url).json(request).send().await?;
        let response = Self::check_status(response).await?;

        response
            .json::<Hint>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, BackendError> {
        let url = format!("{}/quiz/submit", self.base_url);

        let response = self.http_client.post(&url).json(request).send().await?;
        let response = Self::check_status(response).await?;

        response
            .json::<SubmitResponse>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}
