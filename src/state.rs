//! Application state: question store, live practice sessions, and the grader.
//!
//! Sessions are kept in memory only and keyed by a random UUID. They are bounded
//! two ways: a background sweeper drops sessions idle longer than the TTL, and
//! creating a session past the cap evicts the least recently touched one.
//! Sessions waiting on the grader are never swept.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::{load_grader_config_from_env, Settings};
use crate::error::ConfigError;
use crate::grading::{Grader, GradingClient};
use crate::questions::QuestionStore;
use crate::session::{Phase, Session};

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);
const DEFAULT_MAX_SESSIONS: usize = 10_000;
const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(1);

/// Bounds on the in-memory session map.
#[derive(Clone, Copy, Debug)]
pub struct SessionLimits {
    pub ttl: Duration,
    pub max_sessions: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self { ttl: DEFAULT_SESSION_TTL, max_sessions: DEFAULT_MAX_SESSIONS }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub questions: Arc<QuestionStore>,
    pub sessions: Arc<RwLock<HashMap<String, Session>>>,
    pub grader: Arc<dyn Grader>,
    pub limits: SessionLimits,
}

impl AppState {
    /// Build state from settings and the optional TOML config.
    #[instrument(level = "info", skip_all)]
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let cfg = load_grader_config_from_env().unwrap_or_default();

        let questions = if cfg.questions.is_empty() {
            info!(target: "saiten_backend", "No question bank configured; using built-in questions");
            QuestionStore::builtin()
        } else {
            QuestionStore::from_config(&cfg.questions)?
        };
        info!(target: "saiten_backend", count = questions.len(), "Question store ready");

        let client = GradingClient::new(settings, cfg.prompts)?;
        info!(target: "saiten_backend", base_url = %client.base_url, model = %client.model, "Grading client ready");

        let limits = SessionLimits { ttl: settings.session_ttl, max_sessions: settings.max_sessions };
        info!(target: "session", ttl_secs = limits.ttl.as_secs(), max = limits.max_sessions, "Session limits");

        Ok(Self::new(questions, Arc::new(client)).with_limits(limits))
    }

    pub fn new(questions: QuestionStore, grader: Arc<dyn Grader>) -> Self {
        Self {
            questions: Arc::new(questions),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            grader,
            limits: SessionLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: SessionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Insert a fresh session at the first question and return a copy of it.
    /// At the cap, the least recently touched session makes room, preferring
    /// ones that are not waiting on the grader.
    #[instrument(level = "debug", skip(self))]
    pub async fn create_session(&self) -> Session {
        let session = Session::new(Uuid::new_v4().to_string());
        let mut sessions = self.sessions.write().await;
        while sessions.len() >= self.limits.max_sessions.max(1) {
            let Some(victim) = oldest_session(&sessions) else { break };
            sessions.remove(&victim);
            info!(target: "session", id = %victim, "Session cap reached; evicted least recently used");
        }
        sessions.insert(session.id.clone(), session.clone());
        session
    }

    /// Read-only copy of a session by id.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn get_session(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Drop a session. Returns false when the id is unknown.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn remove_session(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Remove sessions idle for at least the TTL as of `now`. Returns how many were removed.
    pub async fn evict_idle(&self, now: Instant) -> usize {
        let ttl = self.limits.ttl;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.phase == Phase::Submitting || now.saturating_duration_since(s.touched) < ttl);
        before - sessions.len()
    }

    /// Periodically sweep idle sessions for the lifetime of the process.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let state = Arc::clone(self);
        let period = (state.limits.ttl / 4).max(MIN_SWEEP_PERIOD);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let evicted = state.evict_idle(Instant::now()).await;
                if evicted > 0 {
                    info!(target: "session", evicted, "Swept idle sessions");
                } else {
                    debug!(target: "session", "Session sweep: nothing idle");
                }
            }
        })
    }
}

fn oldest_session(sessions: &HashMap<String, Session>) -> Option<String> {
    sessions
        .values()
        .filter(|s| s.phase != Phase::Submitting)
        .min_by_key(|s| s.touched)
        .or_else(|| sessions.values().min_by_key(|s| s.touched))
        .map(|s| s.id.clone())
}
