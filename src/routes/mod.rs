//! Router assembly: HTTP endpoints, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - JSON API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/questions", get(http::http_list_questions))
        .route("/api/v1/grade", post(http::http_post_grade))
        .route("/api/v1/sessions", post(http::http_create_session))
        .route(
            "/api/v1/sessions/:id",
            get(http::http_get_session).delete(http::http_delete_session),
        )
        .route("/api/v1/sessions/:id/answer", put(http::http_put_answer))
        .route("/api/v1/sessions/:id/submit", post(http::http_post_submit))
        .route("/api/v1/sessions/:id/next", post(http::http_post_next))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{
        body::{to_bytes, Body},
        http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::error::GradeError;
    use crate::logic::tests::{sample_result, FakeGrader};
    use crate::questions::QuestionStore;

    fn test_app(grader: FakeGrader) -> (Router, Arc<FakeGrader>) {
        let grader = Arc::new(grader);
        let state = Arc::new(AppState::new(QuestionStore::builtin(), grader.clone()));
        (build_router(state), grader)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(v) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), 1 << 20).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    #[tokio::test]
    async fn health_and_question_list() {
        let (app, _) = test_app(FakeGrader::returning(Ok(sample_result())));
        let (status, body) = call(&app, Method::GET, "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));

        let (_, body) = call(&app, Method::GET, "/api/v1/questions", None).await;
        let questions = body["questions"].as_array().unwrap();
        assert_eq!(questions.len(), QuestionStore::builtin().len());
        assert!(questions[0].get("modelAnswer").is_none());
    }

    #[tokio::test]
    async fn full_practice_cycle() {
        let (app, grader) = test_app(FakeGrader::returning(Ok(sample_result())));

        let (status, created) = call(&app, Method::POST, "/api/v1/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["phase"], "idle");
        assert_eq!(created["questionNumber"], 1);
        assert_eq!(created["canSubmit"], false);
        let id = created["sessionId"].as_str().unwrap().to_string();

        let (status, drafted) =
            call(&app, Method::PUT, &format!("/api/v1/sessions/{id}/answer"), Some(json!({ "answer": "布教の禁止" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(drafted["charCount"], 5);
        assert_eq!(drafted["canSubmit"], true);

        let (status, graded) = call(&app, Method::POST, &format!("/api/v1/sessions/{id}/submit"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(graded["phase"], "graded");
        assert_eq!(graded["result"]["overallScore"], 80);
        assert!(graded["question"]["modelAnswer"].is_string());
        assert_eq!(grader.calls(), 1);

        let (status, next) = call(&app, Method::POST, &format!("/api/v1/sessions/{id}/next"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(next["phase"], "idle");
        assert_eq!(next["questionNumber"], 2);
        assert_eq!(next["answer"], "");
        assert!(next["result"].is_null());
    }

    #[tokio::test]
    async fn blank_submit_is_unprocessable() {
        let (app, grader) = test_app(FakeGrader::returning(Ok(sample_result())));
        let (_, created) = call(&app, Method::POST, "/api/v1/sessions", None).await;
        let id = created["sessionId"].as_str().unwrap();

        let (status, body) =
            call(&app, Method::POST, &format!("/api/v1/sessions/{id}/submit"), Some(json!({ "answer": " " }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["phase"], "rejected");
        assert_eq!(body["error"], "回答を入力してください。");
        assert_eq!(body["errorKind"], "validation");
        assert_eq!(grader.calls(), 0);
    }

    #[tokio::test]
    async fn conflicts_and_missing_sessions() {
        let (app, _) = test_app(FakeGrader::returning(Ok(sample_result())));
        let (status, _) = call(&app, Method::GET, "/api/v1/sessions/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, created) = call(&app, Method::POST, "/api/v1/sessions", None).await;
        let id = created["sessionId"].as_str().unwrap();
        let (status, body) = call(&app, Method::POST, &format!("/api/v1/sessions/{id}/next"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn deleted_session_is_gone() {
        let (app, _) = test_app(FakeGrader::returning(Ok(sample_result())));
        let (_, created) = call(&app, Method::POST, "/api/v1/sessions", None).await;
        let uri = format!("/api/v1/sessions/{}", created["sessionId"].as_str().unwrap());

        let (status, body) = call(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_null());

        let (status, _) = call(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failed_submit_reports_message_and_allows_next() {
        let (app, _) = test_app(FakeGrader::returning(Err(GradeError::RateLimited("429".into()))));
        let (_, created) = call(&app, Method::POST, "/api/v1/sessions", None).await;
        let id = created["sessionId"].as_str().unwrap();

        let (status, failed) =
            call(&app, Method::POST, &format!("/api/v1/sessions/{id}/submit"), Some(json!({ "answer": "答え" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(failed["phase"], "failed");
        assert_eq!(failed["errorKind"], "rate_limited");
        assert!(failed["result"].is_null());

        let (status, next) = call(&app, Method::POST, &format!("/api/v1/sessions/{id}/next"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(next["questionNumber"], 2);
    }

    #[tokio::test]
    async fn stateless_grade_endpoint() {
        let (app, _) = test_app(FakeGrader::returning(Ok(sample_result())));
        let (status, body) =
            call(&app, Method::POST, "/api/v1/grade", Some(json!({ "questionId": 1, "answer": "答え" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rubricScores"].as_array().unwrap().len(), 3);

        let (status, body) =
            call(&app, Method::POST, "/api/v1/grade", Some(json!({ "questionId": 1, "answer": "x".repeat(101) }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "回答は100文字以内で入力してください。");

        let (app, _) = test_app(FakeGrader::returning(Err(GradeError::RateLimited("429".into()))));
        let (status, _) =
            call(&app, Method::POST, "/api/v1/grade", Some(json!({ "questionId": 1, "answer": "答え" }))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }
}
