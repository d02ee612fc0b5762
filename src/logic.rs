//! Core behaviors behind the HTTP handlers.
//!
//! This includes:
//!   - Draft updates, submits and "next question" for a practice session
//!   - Stateless one-shot grading of an answer for a question id
//!
//! The session lock is never held across the grading call: a submit moves the
//! session to `Submitting`, releases the lock, and hands the grader call plus the
//! write-back to a spawned task. The handler only awaits that task, so a dropped
//! request cannot leave the session stuck in `Submitting`. A concurrent submit
//! sees `Submitting` and does nothing.

use tracing::{debug, error, info, instrument, warn};

use crate::domain::GradingResult;
use crate::error::{ApiError, GradeError};
use crate::session::{validate_answer, Session, SubmitOutcome};
use crate::state::AppState;

#[instrument(level = "info", skip(state, text), fields(%session_id, answer_len = text.len()))]
pub async fn update_answer(state: &AppState, session_id: &str, text: String) -> Result<Session, ApiError> {
  let mut sessions = state.sessions.write().await;
  let session = sessions
    .get_mut(session_id)
    .ok_or_else(|| ApiError::SessionNotFound(session_id.to_string()))?;
  session.touch();
  session.update_answer(text)?;
  Ok(session.clone())
}

/// Submit the session's answer for grading. Passing `answer` replaces the draft first.
#[instrument(level = "info", skip(state, answer), fields(%session_id))]
pub async fn submit_answer(
  state: &AppState,
  session_id: &str,
  answer: Option<String>,
) -> Result<Session, ApiError> {
  let (question, answer) = {
    let mut sessions = state.sessions.write().await;
    let session = sessions
      .get_mut(session_id)
      .ok_or_else(|| ApiError::SessionNotFound(session_id.to_string()))?;
    session.touch();

    if let Some(text) = answer {
      if session.update_answer(text).is_err() {
        debug!(target: "session", %session_id, phase = session.phase.label(), "Submit ignored: answer locked");
        return Ok(session.clone());
      }
    }

    let question = state
      .questions
      .get(session.question_index)
      .cloned()
      .ok_or(ApiError::QuestionNotFound(session.question_index as u32))?;

    match session.begin_submit() {
      SubmitOutcome::Started { answer, .. } => (question, answer),
      SubmitOutcome::Rejected(e) => {
        info!(target: "session", %session_id, reason = %e, "Submit rejected by validation");
        return Ok(session.clone());
      }
      SubmitOutcome::Ignored => {
        debug!(target: "session", %session_id, phase = session.phase.label(), "Submit ignored");
        return Ok(session.clone());
      }
    }
  };

  let question_id = question.id;
  let task = {
    let state = state.clone();
    let id = session_id.to_string();
    tokio::spawn(async move {
      let outcome = state.grader.grade_answer(&question, &answer).await;
      store_outcome(&state, &id, question_id, outcome).await
    })
  };

  match task.await {
    Ok(stored) => stored,
    Err(e) => {
      error!(target: "grading", %session_id, error = %e, "Grading task failed");
      let outcome = Err(GradeError::Request(format!("grading task failed: {e}")));
      store_outcome(state, session_id, question_id, outcome).await
    }
  }
}

async fn store_outcome(
  state: &AppState,
  session_id: &str,
  question_id: u32,
  outcome: Result<GradingResult, GradeError>,
) -> Result<Session, ApiError> {
  let mut sessions = state.sessions.write().await;
  let session = sessions
    .get_mut(session_id)
    .ok_or_else(|| ApiError::SessionNotFound(session_id.to_string()))?;
  session.touch();
  if !session.finish_submit(outcome) {
    warn!(target: "session", %session_id, phase = session.phase.label(), "Grading outcome arrived outside Submitting; dropped");
  }
  info!(target: "session", %session_id, question_id, phase = session.phase.label(), "Submit finished");
  Ok(session.clone())
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn next_question(state: &AppState, session_id: &str) -> Result<Session, ApiError> {
  let mut sessions = state.sessions.write().await;
  let session = sessions
    .get_mut(session_id)
    .ok_or_else(|| ApiError::SessionNotFound(session_id.to_string()))?;
  session.touch();
  session.advance(state.questions.len())?;
  info!(target: "session", %session_id, question_index = session.question_index, "Advanced to next question");
  Ok(session.clone())
}

/// Validate and grade one answer without touching any session.
#[instrument(level = "info", skip(state, answer), fields(%question_id, answer_len = answer.len()))]
pub async fn grade_once(state: &AppState, question_id: u32, answer: &str) -> Result<GradingResult, ApiError> {
  let question = state
    .questions
    .find(question_id)
    .cloned()
    .ok_or(ApiError::QuestionNotFound(question_id))?;
  validate_answer(answer)?;
  Ok(state.grader.grade_answer(&question, answer).await?)
}
