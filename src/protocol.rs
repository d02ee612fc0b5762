//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{GradingResult, Question, ANSWER_CHAR_LIMIT};
use crate::questions::QuestionStore;
use crate::session::Session;
use crate::util::char_count;

/// Question as shown before grading. The model answer is only revealed alongside a result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOut {
    pub id: u32,
    pub subject: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_answer: Option<String>,
}

impl QuestionOut {
    pub fn hidden(q: &Question) -> Self {
        Self { id: q.id, subject: q.subject.clone(), text: q.text.clone(), model_answer: None }
    }

    pub fn revealed(q: &Question) -> Self {
        Self { model_answer: Some(q.model_answer.clone()), ..Self::hidden(q) }
    }
}

/// Snapshot of one practice session, enough for the front end to render everything.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
    pub session_id: String,
    pub phase: &'static str,
    /// 1-based position of the current question.
    pub question_number: usize,
    pub total_questions: usize,
    pub question: Option<QuestionOut>,
    pub answer: String,
    pub char_count: usize,
    pub char_limit: usize,
    pub can_submit: bool,
    pub error: Option<String>,
    pub error_kind: Option<&'static str>,
    pub result: Option<GradingResult>,
}

/// Convert the internal session to the public DTO.
pub fn session_out(s: &Session, questions: &QuestionStore) -> SessionOut {
    let result = s.result().cloned();
    let question = questions.get(s.question_index).map(|q| {
        if result.is_some() {
            QuestionOut::revealed(q)
        } else {
            QuestionOut::hidden(q)
        }
    });
    let error_kind = match &s.phase {
        crate::session::Phase::Rejected(_) => Some("validation"),
        crate::session::Phase::Failed(e) => Some(e.kind()),
        _ => None,
    };

    SessionOut {
        session_id: s.id.clone(),
        phase: s.phase.label(),
        question_number: s.question_index + 1,
        total_questions: questions.len(),
        question,
        answer: s.answer.clone(),
        char_count: char_count(&s.answer),
        char_limit: ANSWER_CHAR_LIMIT,
        can_submit: s.can_submit(),
        error: s.error_message().map(str::to_string),
        error_kind,
        result,
    }
}

//
// HTTP request/response DTOs
//

#[derive(Deserialize)]
pub struct AnswerIn {
    pub answer: String,
}

#[derive(Deserialize, Default)]
pub struct SubmitIn {
    #[serde(default)]
    pub answer: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeIn {
    pub question_id: u32,
    pub answer: String,
}

#[derive(Serialize)]
pub struct QuestionsOut {
    pub questions: Vec<QuestionOut>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
