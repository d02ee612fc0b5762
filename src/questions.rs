//! Question store: a fixed, ordered list of exam questions.
//!
//! The list comes from the TOML bank when one is configured, otherwise from
//! the built-in questions below. It never changes after startup; navigation
//! wraps by index (see `Session::advance`).

use crate::config::QuestionCfg;
use crate::domain::Question;
use crate::error::ConfigError;

#[derive(Clone, Debug)]
pub struct QuestionStore {
  questions: Vec<Question>,
}

impl QuestionStore {
  pub fn new(questions: Vec<Question>) -> Result<Self, ConfigError> {
    if questions.is_empty() {
      return Err(ConfigError::EmptyQuestionBank);
    }
    Ok(Self { questions })
  }

  /// Build from TOML bank entries. Entries without an id are numbered by position (1-based).
  pub fn from_config(entries: &[QuestionCfg]) -> Result<Self, ConfigError> {
    let questions = entries
      .iter()
      .enumerate()
      .map(|(i, q)| Question {
        id: q.id.unwrap_or(i as u32 + 1),
        subject: q.subject.clone(),
        text: q.text.clone(),
        model_answer: q.model_answer.clone(),
      })
      .collect();
    Self::new(questions)
  }

  pub fn builtin() -> Self {
    Self { questions: builtin_questions() }
  }

  pub fn get(&self, index: usize) -> Option<&Question> {
    self.questions.get(index)
  }

  pub fn find(&self, id: u32) -> Option<&Question> {
    self.questions.iter().find(|q| q.id == id)
  }

  pub fn len(&self) -> usize {
    self.questions.len()
  }

  pub fn all(&self) -> &[Question] {
    &self.questions
  }
}

/// Built-in questions so the app is usable without a question bank.
pub fn builtin_questions() -> Vec<Question> {
  vec![
    Question {
      id: 1,
      subject: "日本史".into(),
      text: "江戸幕府が鎖国政策をとった主な目的を簡潔に説明しなさい。".into(),
      model_answer: "キリスト教の布教を防ぎ、貿易を幕府の統制下に置くことで、幕府の支配体制を安定させるため。".into(),
    },
    Question {
      id: 2,
      subject: "理科".into(),
      text: "光合成とはどのような働きか、簡潔に説明しなさい。".into(),
      model_answer: "植物が光エネルギーを使い、二酸化炭素と水からデンプンなどの養分をつくり、酸素を放出する働き。".into(),
    },
    Question {
      id: 3,
      subject: "公民".into(),
      text: "日本国憲法の三つの基本原理を挙げなさい。".into(),
      model_answer: "国民主権、基本的人権の尊重、平和主義の三つ。".into(),
    },
    Question {
      id: 4,
      subject: "情報".into(),
      text: "二段階認証がパスワードだけの認証より安全な理由を説明しなさい。".into(),
      model_answer: "パスワードが漏えいしても、スマートフォンなど別の要素がなければ本人として認証されないため。".into(),
    },
  ]
}
