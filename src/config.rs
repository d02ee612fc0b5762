//! Runtime settings (environment) and the optional grader config file (TOML).
//!
//! The TOML file at `GRADER_CONFIG_PATH` may override prompts and supply a
//! question bank:
//!
//! ```toml
//! [prompts]
//! grading_system = "..."
//!
//! [[questions]]
//! subject = "日本史"
//! text = "..."
//! model_answer = "..."
//! ```

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;
const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Settings read from the process environment.
#[derive(Clone, Debug)]
pub struct Settings {
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub timeout: Duration,
  pub port: u16,
  /// Sessions untouched for this long are dropped by the sweeper.
  pub session_ttl: Duration,
  /// Upper bound on live sessions; creating one more evicts the least recently touched.
  pub max_sessions: usize,
}

fn parse_env<T: std::str::FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
  match raw {
    Some(v) => v.parse::<T>().map_err(|_| ConfigError::InvalidEnv { name, value: v.clone() }),
    None => Ok(default),
  }
}

impl Settings {
  /// Read settings from the environment. A missing `API_KEY` is fatal.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|name| std::env::var(name).ok())
  }

  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let api_key = lookup("API_KEY")
      .filter(|k| !k.trim().is_empty())
      .ok_or(ConfigError::MissingEnv("API_KEY"))?;
    let base_url = lookup("LLM_BASE_URL")
      .map(|u| u.trim_end_matches('/').to_string())
      .unwrap_or_else(|| DEFAULT_BASE_URL.into());
    let model = lookup("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into());

    let timeout_secs = parse_env("LLM_TIMEOUT_SECS", lookup("LLM_TIMEOUT_SECS"), DEFAULT_TIMEOUT_SECS)?;
    let port = parse_env("PORT", lookup("PORT"), DEFAULT_PORT)?;
    let ttl_secs = parse_env("SESSION_TTL_SECS", lookup("SESSION_TTL_SECS"), DEFAULT_SESSION_TTL_SECS)?;
    let max_sessions = parse_env("MAX_SESSIONS", lookup("MAX_SESSIONS"), DEFAULT_MAX_SESSIONS)?;
    if max_sessions == 0 {
      return Err(ConfigError::InvalidEnv { name: "MAX_SESSIONS", value: "0".into() });
    }

    Ok(Self {
      api_key,
      base_url,
      model,
      timeout: Duration::from_secs(timeout_secs),
      port,
      session_ttl: Duration::from_secs(ttl_secs),
      max_sessions,
    })
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct GraderConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub questions: Vec<QuestionCfg>,
}

/// Question entry accepted in TOML configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct QuestionCfg {
  #[serde(default)]
  pub id: Option<u32>,
  pub subject: String,
  pub text: String,
  pub model_answer: String,
}

/// Prompts used by the grading client.
/// `grading_user_template` accepts `{subject}`, `{question}`, `{model_answer}`,
/// `{answer}`, `{criteria}` and `{max_score}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub grading_system: String,
  pub grading_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      grading_system: "あなたは経験豊富な教育者であり、試験の採点者です。受験者の回答を厳格かつ公正に採点してください。".into(),
      grading_user_template: "\
# 指示
1. ルーブリック評価: 以下の評価基準それぞれについて{max_score}点満点で採点し、具体的なフィードバックを記述してください。
{criteria}
2. 意味的類似度: 模範解答と受験者の回答の意味的な類似度を0から100のスコアで評価してください。
3. 総合評価: ルーブリック評価と類似度を考慮して、総合スコアを100点満点で算出してください。
4. 総評: 励ましを含む建設的なフィードバックを生成し、良かった点と改善点を具体的に指摘してください。
5. 出力形式: 結果は必ず指定されたJSON形式で出力してください。

# 問題
## 科目
{subject}

## 問題文
{question}

# 模範解答
{model_answer}

# 受験者の回答
{answer}

# 採点結果 (JSON形式で出力)
".into(),
    }
  }
}

/// Attempt to load `GraderConfig` from GRADER_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_grader_config_from_env() -> Option<GraderConfig> {
  let path = std::env::var("GRADER_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<GraderConfig>(&s) {
      Ok(cfg) => {
        info!(target: "saiten_backend", %path, questions = cfg.questions.len(), "Loaded grader config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "saiten_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "saiten_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
