//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{extract::{Path, State}, http::StatusCode, Json, response::IntoResponse};
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::logic::*;
use crate::protocol::*;
use crate::session::Phase;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_list_questions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let questions = state.questions.all().iter().map(QuestionOut::hidden).collect();
  Json(QuestionsOut { questions })
}

#[instrument(level = "info", skip(state))]
pub async fn http_create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let session = state.create_session().await;
  info!(target: "session", id = %session.id, "HTTP session created");
  (StatusCode::CREATED, Json(session_out(&session, &state.questions)))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionOut>, ApiError> {
  let session = state.get_session(&id).await.ok_or_else(|| ApiError::SessionNotFound(id.clone()))?;
  Ok(Json(session_out(&session, &state.questions)))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
  if !state.remove_session(&id).await {
    return Err(ApiError::SessionNotFound(id));
  }
  info!(target: "session", %id, "HTTP session deleted");
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state, body), fields(%id, answer_len = body.answer.len()))]
pub async fn http_put_answer(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<AnswerIn>,
) -> Result<Json<SessionOut>, ApiError> {
  let session = update_answer(&state, &id, body.answer).await?;
  Ok(Json(session_out(&session, &state.questions)))
}

/// Validation rejections answer 422 with the session snapshot so the inline message can be shown.
#[instrument(level = "info", skip(state, body), fields(%id))]
pub async fn http_post_submit(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  body: Option<Json<SubmitIn>>,
) -> Result<impl IntoResponse, ApiError> {
  let answer = body.and_then(|Json(b)| b.answer);
  let session = submit_answer(&state, &id, answer).await?;
  let status = match session.phase {
    Phase::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
    _ => StatusCode::OK,
  };
  info!(target: "session", %id, phase = session.phase.label(), "HTTP submit handled");
  Ok((status, Json(session_out(&session, &state.questions))))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_post_next(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionOut>, ApiError> {
  let session = next_question(&state, &id).await?;
  Ok(Json(session_out(&session, &state.questions)))
}

#[instrument(level = "info", skip(state, body), fields(question_id = body.question_id, answer_len = body.answer.len()))]
pub async fn http_post_grade(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GradeIn>,
) -> Result<impl IntoResponse, ApiError> {
  let result = grade_once(&state, body.question_id, &body.answer).await?;
  info!(target: "grading", question_id = body.question_id, overall = result.overall_score, "HTTP grade served");
  Ok(Json(result))
}
