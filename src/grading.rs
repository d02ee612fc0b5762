//! Grading client: the single boundary between the practice controller and the LLM provider.
//!
//! Everything provider-specific lives here: prompt text, response schema,
//! sampling temperature, HTTP shaping and error classification. Callers only
//! see `Grader::grade_answer` returning a `GradingResult` or a `GradeError`.
//!
//! The provider is reached through an OpenAI-compatible `chat/completions`
//! endpoint with a strict `json_schema` response format.
//!
//! NOTE: We never log the API key or answer contents, only lengths and previews of error bodies.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use crate::config::{Prompts, Settings};
use crate::domain::{GradingResult, Question, RubricItem, CRITERION_MAX_SCORE, RUBRIC_CRITERIA};
use crate::error::{ConfigError, GradeError};
use crate::util::{extract_json_object, fill_template, trunc_for_log};

/// Low temperature keeps scores consistent between attempts.
pub const GRADING_TEMPERATURE: f32 = 0.3;

const SCHEMA_NAME: &str = "grading_result";

/// Anything that can grade one answer against one question.
#[async_trait]
pub trait Grader: Send + Sync {
  async fn grade_answer(&self, question: &Question, answer: &str) -> Result<GradingResult, GradeError>;
}

#[derive(Clone)]
pub struct GradingClient {
  client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub model: String,
  prompts: Prompts,
}

impl GradingClient {
  pub fn new(settings: &Settings, prompts: Prompts) -> Result<Self, ConfigError> {
    let client = reqwest::Client::builder()
      .timeout(settings.timeout)
      .build()
      .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

    Ok(Self {
      client,
      api_key: settings.api_key.clone(),
      base_url: settings.base_url.clone(),
      model: settings.model.clone(),
      prompts,
    })
  }

  /// Render the user prompt for one grading request. Deterministic for a given input.
  pub fn build_prompt(&self, question: &Question, answer: &str) -> String {
    let criteria = render_criteria();
    let max_score = CRITERION_MAX_SCORE.to_string();
    fill_template(
      &self.prompts.grading_user_template,
      &[
        ("criteria", criteria.as_str()),
        ("max_score", max_score.as_str()),
        ("subject", question.subject.as_str()),
        ("question", question.text.as_str()),
        ("model_answer", question.model_answer.as_str()),
        ("answer", answer),
      ],
    )
  }

  /// Schema-constrained chat completion. Returns the raw message content.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model, prompt_len = user.len()))]
  async fn chat_schema(&self, system: &str, user: &str) -> Result<String, GradeError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature: GRADING_TEMPERATURE,
      response_format: ResponseFormat {
        r#type: "json_schema".into(),
        json_schema: JsonSchemaFormat {
          name: SCHEMA_NAME.into(),
          strict: true,
          schema: grading_schema(),
        },
      },
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "saiten-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await
      .map_err(|e| GradeError::Request(e.to_string()))?;

    let status = res.status();
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      return Err(classify_failure(status, &body));
    }

    let body: ChatCompletionResponse = res
      .json()
      .await
      .map_err(|e| GradeError::InvalidResponse(format!("unreadable completion envelope: {e}")))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "LLM usage");
    }

    body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .map(|t| t.trim().to_string())
      .filter(|t| !t.is_empty())
      .ok_or_else(|| GradeError::InvalidResponse("completion has no content".into()))
  }
}

#[async_trait]
impl Grader for GradingClient {
  #[instrument(level = "info", skip(self, question, answer), fields(question_id = question.id, answer_len = answer.len()))]
  async fn grade_answer(&self, question: &Question, answer: &str) -> Result<GradingResult, GradeError> {
    let user = self.build_prompt(question, answer);
    let start = Instant::now();
    let outcome = match self.chat_schema(&self.prompts.grading_system, &user).await {
      Ok(text) => parse_grading_payload(&text),
      Err(e) => Err(e),
    };
    let elapsed = start.elapsed();

    match &outcome {
      Ok(r) => info!(target: "grading", ?elapsed, overall = r.overall_score, similarity = r.similarity_score, criteria = r.rubric_scores.len(), "Answer graded"),
      Err(e) => error!(target: "grading", ?elapsed, kind = e.kind(), error = %e, "Grading call failed"),
    }
    outcome
  }
}

/// Numbered criteria lines embedded into the prompt.
pub fn render_criteria() -> String {
  RUBRIC_CRITERIA
    .iter()
    .map(|(name, desc)| format!("   * {}: {}", name, desc))
    .collect::<Vec<_>>()
    .join("\n")
}

/// JSON schema the provider must follow. All fields are required.
pub fn grading_schema() -> Value {
  json!({
    "type": "object",
    "properties": {
      "rubricScores": {
        "type": "array",
        "description": "An array of rubric items with scores and feedback.",
        "items": {
          "type": "object",
          "properties": {
            "criterion": { "type": "string", "description": "The evaluation criterion (e.g. '正確性', '網羅性', '論理構成')." },
            "score": { "type": "integer", "description": "Score for this criterion." },
            "maxScore": { "type": "integer", "description": "Maximum possible score for this criterion." },
            "feedback": { "type": "string", "description": "Specific feedback for this criterion." }
          },
          "required": ["criterion", "score", "maxScore", "feedback"],
          "additionalProperties": false
        }
      },
      "similarityScore": {
        "type": "integer",
        "description": "0-100 semantic similarity between the user's answer and the model answer."
      },
      "overallScore": {
        "type": "integer",
        "description": "Final overall score as a percentage (0-100)."
      },
      "overallFeedback": {
        "type": "string",
        "description": "Constructive, encouraging overall feedback naming strengths and improvements."
      }
    },
    "required": ["rubricScores", "similarityScore", "overallScore", "overallFeedback"],
    "additionalProperties": false
  })
}

/// Parse model output into a `GradingResult`, checking the fields the UI cannot do without.
pub fn parse_grading_payload(text: &str) -> Result<GradingResult, GradeError> {
  #[derive(Deserialize)]
  #[serde(rename_all = "camelCase")]
  struct RawGrading {
    #[serde(default)] rubric_scores: Option<Vec<RubricItem>>,
    #[serde(default)] similarity_score: Option<u32>,
    #[serde(default)] overall_score: Option<u32>,
    #[serde(default)] overall_feedback: Option<String>,
  }

  let trimmed = text.trim();
  let json_text = extract_json_object(trimmed)
    .ok_or_else(|| GradeError::InvalidResponse(format!("no JSON object in: {}", trunc_for_log(trimmed, 80))))?;
  let raw: RawGrading = serde_json::from_str(json_text)
    .map_err(|e| GradeError::InvalidResponse(format!("JSON parse error: {e}")))?;

  let rubric_scores = match raw.rubric_scores {
    Some(items) if !items.is_empty() => items,
    _ => return Err(GradeError::InvalidResponse("rubricScores missing or empty".into())),
  };
  let overall_feedback = match raw.overall_feedback {
    Some(f) if !f.trim().is_empty() => f,
    _ => return Err(GradeError::InvalidResponse("overallFeedback missing".into())),
  };
  let similarity_score = raw
    .similarity_score
    .ok_or_else(|| GradeError::InvalidResponse("similarityScore missing".into()))?;
  let overall_score = raw
    .overall_score
    .ok_or_else(|| GradeError::InvalidResponse("overallScore missing".into()))?;

  let result = GradingResult { rubric_scores, similarity_score, overall_score, overall_feedback };
  let out_of_range = result.out_of_range_fields();
  if !out_of_range.is_empty() {
    warn!(target: "grading", fields = ?out_of_range, "Provider returned scores outside their ranges");
  }
  Ok(result)
}

/// Map a non-success provider response to a `GradeError`.
fn classify_failure(status: StatusCode, body: &str) -> GradeError {
  let detail = extract_provider_error(body).unwrap_or_else(|| trunc_for_log(body, 200));
  let detail = format!("HTTP {}: {}", status.as_u16(), detail);
  if status == StatusCode::TOO_MANY_REQUESTS || is_rate_limit_body(body) {
    GradeError::RateLimited(detail)
  } else {
    GradeError::Request(detail)
  }
}

/// Provider error payloads come as `{"error": {...}}` or as a one-element array of those.
fn provider_error_object(body: &str) -> Option<Value> {
  let v: Value = serde_json::from_str(body).ok()?;
  let wrapper = match v {
    Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
    other => other,
  };
  wrapper.get("error").cloned()
}

fn extract_provider_error(body: &str) -> Option<String> {
  provider_error_object(body)?
    .get("message")
    .and_then(Value::as_str)
    .map(str::to_string)
}

fn is_rate_limit_body(body: &str) -> bool {
  const SIGNALS: [&str; 3] = ["rate_limit_exceeded", "RESOURCE_EXHAUSTED", "insufficient_quota"];
  let Some(err) = provider_error_object(body) else { return false };
  ["code", "status", "type"].iter().any(|key| {
    err.get(*key)
      .and_then(Value::as_str)
      .map_or(false, |v| SIGNALS.contains(&v))
  })
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  response_format: ResponseFormat,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat {
  #[serde(rename = "type")] r#type: String,
  json_schema: JsonSchemaFormat,
}
#[derive(Serialize)]
struct JsonSchemaFormat { name: String, strict: bool, schema: Value }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{Arc, Mutex};
  use std::time::Duration;

  use axum::{routing::post, Json, Router};

  fn question() -> Question {
    Question {
      id: 7,
      subject: "日本史".into(),
      text: "鎖国の目的は何か。".into(),
      model_answer: "キリスト教の禁止と貿易の統制。".into(),
    }
  }

  fn payload() -> Value {
    json!({
      "rubricScores": [
        { "criterion": "正確性", "score": 8, "maxScore": 10, "feedback": "概ね正確です。" },
        { "criterion": "網羅性", "score": 6, "maxScore": 10, "feedback": "貿易統制に触れていません。" },
        { "criterion": "論理構成", "score": 9, "maxScore": 10, "feedback": "簡潔です。" }
      ],
      "similarityScore": 72,
      "overallScore": 74,
      "overallFeedback": "よくできています。貿易面も補足しましょう。"
    })
  }

  fn settings(base_url: String) -> Settings {
    Settings {
      api_key: "test-key".into(),
      base_url,
      model: "test-model".into(),
      timeout: Duration::from_secs(5),
      port: 0,
      session_ttl: Duration::from_secs(60),
      max_sessions: 10,
    }
  }

  /// Serve `status`/`body` for every chat completion and record the request bodies.
  async fn spawn_provider(status: u16, body: Value) -> (String, Arc<Mutex<Vec<Value>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let status = axum::http::StatusCode::from_u16(status).unwrap();
    let app = Router::new().route(
      "/chat/completions",
      post(move |Json(req): Json<Value>| {
        let recorder = recorder.clone();
        let body = body.clone();
        async move {
          recorder.lock().unwrap().push(req);
          (status, Json(body))
        }
      }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (format!("http://{addr}"), seen)
  }

  fn completion(content: &str) -> Value {
    json!({
      "choices": [{ "message": { "role": "assistant", "content": content } }],
      "usage": { "prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30 }
    })
  }

  #[test]
  fn prompt_embeds_question_answer_and_criteria() {
    let client = GradingClient::new(&settings("http://unused".into()), Prompts::default()).unwrap();
    let prompt = client.build_prompt(&question(), "布教を防ぐため。");
    for needle in ["日本史", "鎖国の目的は何か。", "キリスト教の禁止と貿易の統制。", "布教を防ぐため。", "正確性", "網羅性", "論理構成", "10点満点"] {
      assert!(prompt.contains(needle), "missing {needle}");
    }
    assert_eq!(prompt, client.build_prompt(&question(), "布教を防ぐため。"));
  }

  #[test]
  fn schema_requires_every_field() {
    let schema = grading_schema();
    assert_eq!(
      schema["required"],
      json!(["rubricScores", "similarityScore", "overallScore", "overallFeedback"])
    );
    assert_eq!(
      schema["properties"]["rubricScores"]["items"]["required"],
      json!(["criterion", "score", "maxScore", "feedback"])
    );
  }

  #[test]
  fn payload_keeps_rubric_order_and_values() {
    let result = parse_grading_payload(&payload().to_string()).unwrap();
    let criteria: Vec<_> = result.rubric_scores.iter().map(|r| r.criterion.as_str()).collect();
    assert_eq!(criteria, ["正確性", "網羅性", "論理構成"]);
    assert_eq!(result.rubric_scores[1].score, 6);
    assert_eq!(result.similarity_score, 72);
    assert_eq!(result.overall_score, 74);
    assert_eq!(serde_json::to_value(&result).unwrap(), payload());
  }

  #[test]
  fn fenced_payload_is_accepted() {
    let text = format!("```json\n{}\n```", payload());
    assert!(parse_grading_payload(&text).is_ok());
  }

  #[test]
  fn missing_overall_feedback_is_invalid() {
    let mut p = payload();
    p.as_object_mut().unwrap().remove("overallFeedback");
    let err = parse_grading_payload(&p.to_string()).unwrap_err();
    assert!(matches!(err, GradeError::InvalidResponse(_)));
  }

  #[test]
  fn empty_rubric_and_garbage_are_invalid() {
    let mut p = payload();
    p["rubricScores"] = json!([]);
    assert!(matches!(parse_grading_payload(&p.to_string()), Err(GradeError::InvalidResponse(_))));
    assert!(matches!(parse_grading_payload("overloaded"), Err(GradeError::InvalidResponse(_))));
    assert!(matches!(parse_grading_payload("{\"overallScore\": \"high\"}"), Err(GradeError::InvalidResponse(_))));
  }

  #[test]
  fn failures_are_classified() {
    assert!(matches!(classify_failure(StatusCode::TOO_MANY_REQUESTS, ""), GradeError::RateLimited(_)));
    let gemini_quota = r#"[{"error":{"code":429,"message":"quota","status":"RESOURCE_EXHAUSTED"}}]"#;
    assert!(matches!(classify_failure(StatusCode::BAD_REQUEST, gemini_quota), GradeError::RateLimited(_)));
    let openai_500 = r#"{"error":{"message":"boom","type":"server_error"}}"#;
    match classify_failure(StatusCode::INTERNAL_SERVER_ERROR, openai_500) {
      GradeError::Request(detail) => assert_eq!(detail, "HTTP 500: boom"),
      other => panic!("unexpected {other:?}"),
    }
  }

  #[tokio::test]
  async fn grades_through_provider_with_schema_and_temperature() {
    let (base_url, seen) = spawn_provider(200, completion(&payload().to_string())).await;
    let client = GradingClient::new(&settings(base_url), Prompts::default()).unwrap();

    let result = client.grade_answer(&question(), "布教を防ぐため。").await.unwrap();
    assert_eq!(result.overall_score, 74);

    let requests = seen.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req["model"], "test-model");
    assert!((req["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    assert_eq!(req["response_format"]["type"], "json_schema");
    assert_eq!(req["response_format"]["json_schema"]["schema"], grading_schema());
    assert_eq!(req["messages"][1]["role"], "user");
  }

  #[tokio::test]
  async fn provider_rate_limit_yields_busy_error() {
    let (base_url, _) = spawn_provider(429, json!({ "error": { "message": "slow down", "code": "rate_limit_exceeded" } })).await;
    let client = GradingClient::new(&settings(base_url), Prompts::default()).unwrap();

    let err = client.grade_answer(&question(), "回答").await.unwrap_err();
    assert!(matches!(err, GradeError::RateLimited(_)));
    assert_eq!(err.user_message(), GradeError::RateLimited(String::new()).user_message());
  }

  #[tokio::test]
  async fn provider_error_and_bad_content_are_classified() {
    let (base_url, _) = spawn_provider(503, json!({ "error": { "message": "unavailable" } })).await;
    let client = GradingClient::new(&settings(base_url), Prompts::default()).unwrap();
    assert!(matches!(client.grade_answer(&question(), "回答").await, Err(GradeError::Request(_))));

    let (base_url, _) = spawn_provider(200, completion("{\"rubricScores\": []}")).await;
    let client = GradingClient::new(&settings(base_url), Prompts::default()).unwrap();
    assert!(matches!(client.grade_answer(&question(), "回答").await, Err(GradeError::InvalidResponse(_))));
  }

  #[tokio::test]
  async fn unreachable_provider_is_a_request_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client = GradingClient::new(&settings(format!("http://{addr}")), Prompts::default()).unwrap();
    assert!(matches!(client.grade_answer(&question(), "回答").await, Err(GradeError::Request(_))));
  }
}
