//! Domain models: questions, rubric items and grading results.
//!
//! Field names are camelCase on the wire so the front end and the LLM schema
//! share one vocabulary.

use serde::{Deserialize, Serialize};

/// Maximum number of characters accepted for an answer.
pub const ANSWER_CHAR_LIMIT: usize = 100;

/// Points available for each rubric criterion.
pub const CRITERION_MAX_SCORE: u32 = 10;

/// Fixed rubric criteria, in the order they are presented to the model:
/// accuracy, completeness, logical structure.
pub const RUBRIC_CRITERIA: [(&str, &str); 3] = [
  ("正確性", "回答に含まれる情報が事実として正しいか。"),
  ("網羅性", "問題の要求に対して、必要な要素が網羅されているか。"),
  ("論理構成", "回答の構造が論理的で分かりやすいか。"),
];

/// A static exam question with its reference answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub id: u32,
  pub subject: String,
  pub text: String,
  pub model_answer: String,
}

/// Score and feedback for one rubric criterion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricItem {
  pub criterion: String,
  pub score: u32,
  pub max_score: u32,
  pub feedback: String,
}

/// Structured result of one grading call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResult {
  pub rubric_scores: Vec<RubricItem>,
  pub similarity_score: u32,
  pub overall_score: u32,
  pub overall_feedback: String,
}

impl GradingResult {
  /// Names of the fields whose values fall outside their declared ranges.
  /// Empty when every score is within bounds.
  pub fn out_of_range_fields(&self) -> Vec<String> {
    let mut out = Vec::new();
    if self.similarity_score > 100 {
      out.push("similarityScore".to_string());
    }
    if self.overall_score > 100 {
      out.push("overallScore".to_string());
    }
    for item in &self.rubric_scores {
      if item.score > item.max_score {
        out.push(format!("rubricScores[{}].score", item.criterion));
      }
    }
    out
  }
}
