//! Error types for configuration, answer validation, grading and the HTTP API.
//!
//! `GradeError` and `AnswerError` carry a localized, user-facing message
//! (`user_message`) separate from their `Display` text, which is meant for logs.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use thiserror::Error;

/// Fatal startup conditions.
#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("environment variable {0} is not set")]
  MissingEnv(&'static str),

  #[error("environment variable {name} has invalid value '{value}'")]
  InvalidEnv { name: &'static str, value: String },

  #[error("question bank is empty")]
  EmptyQuestionBank,

  #[error("failed to build HTTP client: {0}")]
  HttpClient(String),
}

/// Local answer validation failures. No network call is made for these.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerError {
  #[error("answer is blank")]
  Blank,

  #[error("answer exceeds {limit} characters ({len})")]
  TooLong { len: usize, limit: usize },
}

impl AnswerError {
  pub fn user_message(&self) -> &'static str {
    match self {
      AnswerError::Blank => "回答を入力してください。",
      AnswerError::TooLong { .. } => "回答は100文字以内で入力してください。",
    }
  }
}

/// Classified failure of a grading call. Terminal for the current attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GradeError {
  /// Transport failure or non-success response from the provider.
  #[error("AI request failed: {0}")]
  Request(String),

  /// Provider signalled rate limiting or quota exhaustion.
  #[error("AI service rate limited: {0}")]
  RateLimited(String),

  /// Response body missing, not JSON, or structurally incomplete.
  #[error("invalid response structure: {0}")]
  InvalidResponse(String),
}

impl GradeError {
  pub fn user_message(&self) -> &'static str {
    match self {
      GradeError::Request(_) => {
        "AIからの有効な応答を取得できませんでした。時間をおいて再度お試しください。"
      }
      GradeError::RateLimited(_) => {
        "現在AIサービスが混み合っています。しばらく待ってから再度お試しください。"
      }
      GradeError::InvalidResponse(_) => {
        "AIから不正な形式の応答が返されました。もう一度お試しください。"
      }
    }
  }

  /// Short label used in logs and snapshots.
  pub fn kind(&self) -> &'static str {
    match self {
      GradeError::Request(_) => "request_failed",
      GradeError::RateLimited(_) => "rate_limited",
      GradeError::InvalidResponse(_) => "invalid_response",
    }
  }
}

/// Controller refusals for events that are not available in the current phase.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
  #[error("answer cannot be edited while submitting or after grading")]
  AnswerLocked,

  #[error("next question is only available after grading finished")]
  NotFinished,
}

/// Errors surfaced by HTTP handlers.
#[derive(Error, Debug)]
pub enum ApiError {
  #[error("unknown session: {0}")]
  SessionNotFound(String),

  #[error("unknown question: {0}")]
  QuestionNotFound(u32),

  #[error(transparent)]
  Session(#[from] SessionError),

  #[error(transparent)]
  Answer(#[from] AnswerError),

  #[error(transparent)]
  Grade(#[from] GradeError),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::SessionNotFound(_) | ApiError::QuestionNotFound(_) => {
        (StatusCode::NOT_FOUND, self.to_string())
      }
      ApiError::Session(_) => (StatusCode::CONFLICT, self.to_string()),
      ApiError::Answer(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.user_message().to_string()),
      ApiError::Grade(e @ GradeError::RateLimited(_)) => {
        (StatusCode::TOO_MANY_REQUESTS, e.user_message().to_string())
      }
      ApiError::Grade(e) => (StatusCode::BAD_GATEWAY, e.user_message().to_string()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
