//! Practice session state machine.
//!
//! One session tracks one learner: the current question, the draft answer,
//! and a closed `Phase` describing where the submit cycle stands. Transitions
//! are synchronous; the async grading call happens between `begin_submit`
//! and `finish_submit`.

use std::time::Instant;

use crate::domain::{GradingResult, ANSWER_CHAR_LIMIT};
use crate::error::{AnswerError, GradeError, SessionError};
use crate::util::char_count;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
  /// Waiting for a submit.
  Idle,
  /// Last submit failed local validation; no request was sent.
  Rejected(AnswerError),
  /// A grading request is in flight.
  Submitting,
  Graded(GradingResult),
  Failed(GradeError),
}

impl Phase {
  pub fn label(&self) -> &'static str {
    match self {
      Phase::Idle => "idle",
      Phase::Rejected(_) => "rejected",
      Phase::Submitting => "submitting",
      Phase::Graded(_) => "graded",
      Phase::Failed(_) => "failed",
    }
  }
}

/// Outcome of a submit event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
  /// Guard passed; the caller must grade this answer and report back.
  Started { question_index: usize, answer: String },
  /// Answer failed validation; phase is now `Rejected`.
  Rejected(AnswerError),
  /// Submitting or already graded; nothing changed.
  Ignored,
}

/// Validate an answer before any grading request is made.
/// Blank means empty after trimming; the limit applies to the untrimmed text,
/// counted in UTF-16 code units like the browser's `maxlength` counter.
pub fn validate_answer(answer: &str) -> Result<(), AnswerError> {
  if answer.trim().is_empty() {
    return Err(AnswerError::Blank);
  }
  let len = char_count(answer);
  if len > ANSWER_CHAR_LIMIT {
    return Err(AnswerError::TooLong { len, limit: ANSWER_CHAR_LIMIT });
  }
  Ok(())
}

#[derive(Clone, Debug)]
pub struct Session {
  pub id: String,
  pub question_index: usize,
  pub answer: String,
  pub phase: Phase,
  /// Last time the learner acted on this session. Idle sessions are swept after a TTL.
  pub touched: Instant,
}

impl Session {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      question_index: 0,
      answer: String::new(),
      phase: Phase::Idle,
      touched: Instant::now(),
    }
  }

  pub fn touch(&mut self) {
    self.touched = Instant::now();
  }

  fn answer_locked(&self) -> bool {
    matches!(self.phase, Phase::Submitting | Phase::Graded(_))
  }

  /// Whether a submit right now would start a grading request.
  pub fn can_submit(&self) -> bool {
    !self.answer_locked() && validate_answer(&self.answer).is_ok()
  }

  /// Replace the draft answer. Clears an inline validation error.
  pub fn update_answer(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
    if self.answer_locked() {
      return Err(SessionError::AnswerLocked);
    }
    self.answer = text.into();
    if matches!(self.phase, Phase::Rejected(_)) {
      self.phase = Phase::Idle;
    }
    Ok(())
  }

  pub fn begin_submit(&mut self) -> SubmitOutcome {
    if self.answer_locked() {
      return SubmitOutcome::Ignored;
    }
    match validate_answer(&self.answer) {
      Err(e) => {
        self.phase = Phase::Rejected(e);
        SubmitOutcome::Rejected(e)
      }
      Ok(()) => {
        self.phase = Phase::Submitting;
        SubmitOutcome::Started { question_index: self.question_index, answer: self.answer.clone() }
      }
    }
  }

  /// Store the grading outcome. Only meaningful while `Submitting`; returns false otherwise.
  pub fn finish_submit(&mut self, outcome: Result<GradingResult, GradeError>) -> bool {
    if self.phase != Phase::Submitting {
      return false;
    }
    self.phase = match outcome {
      Ok(result) => Phase::Graded(result),
      Err(e) => Phase::Failed(e),
    };
    true
  }

  /// Move to the next question after a finished attempt, wrapping around.
  pub fn advance(&mut self, question_count: usize) -> Result<(), SessionError> {
    if !matches!(self.phase, Phase::Graded(_) | Phase::Failed(_)) {
      return Err(SessionError::NotFinished);
    }
    self.answer.clear();
    self.phase = Phase::Idle;
    self.question_index = (self.question_index + 1) % question_count;
    Ok(())
  }

  /// User-facing message for the current phase, if any.
  pub fn error_message(&self) -> Option<&'static str> {
    match &self.phase {
      Phase::Rejected(e) => Some(e.user_message()),
      Phase::Failed(e) => Some(e.user_message()),
      _ => None,
    }
  }

  pub fn result(&self) -> Option<&GradingResult> {
    match &self.phase {
      Phase::Graded(r) => Some(r),
      _ => None,
    }
  }
}
