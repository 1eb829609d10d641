//! Session store - per-user questionnaire answers and generated workouts

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use teloxide::types::UserId;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::workout::{Goal, Level, Stats, WorkoutType};

/// Default cap on stored workouts per user
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Completed questionnaire plus generated workouts
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub goal: Goal,
    pub level: Level,
    pub workout_type: WorkoutType,
    pub height_cm: u32,
    pub weight_kg: u32,
    /// Oldest first
    pub history: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(goal: Goal, level: Level, workout_type: WorkoutType, stats: Stats) -> Self {
        Self {
            goal,
            level,
            workout_type,
            height_cm: stats.height_cm,
            weight_kg: stats.weight_kg,
            history: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Most recent `n` workouts, oldest of them first
    pub fn recent(&self, n: usize) -> &[String] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    pub fn last(&self) -> Option<&str> {
        self.history.last().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no session for user {0}")]
    Missing(UserId),
}

/// Storage seam for sessions, injected into the conversation
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, user: UserId) -> Option<Session>;
    async fn put(&self, user: UserId, session: Session);
    async fn append_history(&self, user: UserId, text: String) -> Result<(), SessionError>;
    async fn delete(&self, user: UserId);
}

/// Process-lifetime store; nothing survives a restart
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<UserId, Session>>,
    history_limit: usize,
    ttl: Option<Duration>,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT, None)
    }
}

impl InMemorySessionStore {
    /// `history_limit` of 0 means unbounded; `ttl` of `None` means sessions never expire
    pub fn new(history_limit: usize, ttl: Option<Duration>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history_limit,
            ttl,
        }
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        self.ttl.is_some_and(|ttl| now - session.updated_at > ttl)
    }

    /// Drop every session whose TTL has passed
    fn sweep_expired(&self, sessions: &mut HashMap<UserId, Session>) {
        if self.ttl.is_none() {
            return;
        }
        let now = Utc::now();
        let before = sessions.len();
        sessions.retain(|_, s| !self.is_expired(s, now));
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "expired sessions swept");
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user: UserId) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        self.sweep_expired(&mut sessions);
        sessions.get(&user).cloned()
    }

    async fn put(&self, user: UserId, session: Session) {
        let mut sessions = self.sessions.lock().await;
        self.sweep_expired(&mut sessions);
        sessions.insert(user, session);
    }

    async fn append_history(&self, user: UserId, text: String) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().await;
        self.sweep_expired(&mut sessions);
        let session = sessions.get_mut(&user).ok_or(SessionError::Missing(user))?;

        session.history.push(text);
        if self.history_limit > 0 && session.history.len() > self.history_limit {
            let overflow = session.history.len() - self.history_limit;
            session.history.drain(..overflow);
        }
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, user: UserId) {
        self.sessions.lock().await.remove(&user);
    }
}
