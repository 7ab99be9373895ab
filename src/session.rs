//! Interview sessions
//!
//! A session owns the active topic and the ordered transcript. Sessions are
//! keyed by id in a [`SessionRegistry`]; each one sits behind its own mutex,
//! so turns within a session run one at a time while separate sessions
//! proceed independently.
//!
//! The registry is bounded: sessions idle longer than the TTL are swept when
//! a new one is created, and at capacity the least recently active idle
//! session is evicted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

/// Sessions idle this long are swept
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

/// Upper bound on live sessions
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

/// Who spoke a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    /// Transcript prefix
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "AI",
        }
    }
}

/// One utterance in the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    #[must_use]
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Topic and transcript for one interview
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    topic: String,
    transcript: Vec<Turn>,
    last_active: Instant,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            transcript: Vec::new(),
            last_active: Instant::now(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Active practice topic
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Replace the active topic; the next reply uses it
    pub fn set_topic(&mut self, topic: impl Into<String>) {
        self.topic = topic.into();
        self.touch();
        tracing::info!(session = %self.id, topic = %self.topic, "topic changed");
    }

    /// Append a turn; blank text is ignored
    ///
    /// Returns whether the turn was recorded
    pub fn append_turn(&mut self, speaker: Speaker, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.transcript.push(Turn::new(speaker, text));
        self.touch();
        true
    }

    /// Mark the session as used now
    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// When the session was last created, changed or touched
    #[must_use]
    pub const fn last_active(&self) -> Instant {
        self.last_active
    }

    /// Full transcript in order
    #[must_use]
    pub fn history(&self) -> &[Turn] {
        &self.transcript
    }

    /// The last `n` turns
    #[must_use]
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.transcript.len().saturating_sub(n);
        &self.transcript[start..]
    }
}

/// Shared handle to one session
pub type SessionHandle = Arc<Mutex<Session>>;

/// Sessions keyed by id
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    default_topic: String,
    idle_ttl: Duration,
    max_sessions: usize,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(default_topic: impl Into<String>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            default_topic: default_topic.into(),
            idle_ttl: DEFAULT_IDLE_TTL,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    /// Set the idle TTL and the session cap
    #[must_use]
    pub fn with_limits(mut self, idle_ttl: Duration, max_sessions: usize) -> Self {
        self.idle_ttl = idle_ttl;
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Topic new sessions start with
    #[must_use]
    pub fn default_topic(&self) -> &str {
        &self.default_topic
    }

    /// Look up a session, creating it with the default topic if needed
    ///
    /// Creating a session first sweeps idle ones and, at capacity, evicts the
    /// least recently active session not in use.
    pub async fn get_or_create(&self, id: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(id) {
            return Arc::clone(handle);
        }

        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(id) {
            return Arc::clone(handle);
        }

        self.evict(&mut sessions);

        let handle = Arc::new(Mutex::new(Session::new(id, self.default_topic.clone())));
        sessions.insert(id.to_string(), Arc::clone(&handle));
        tracing::debug!(session = id, live = sessions.len(), "session created");
        handle
    }

    /// Remove idle sessions, then the oldest idle one while at capacity
    ///
    /// Sessions whose lock is held are mid-turn and never evicted.
    fn evict(&self, sessions: &mut HashMap<String, SessionHandle>) {
        let now = Instant::now();
        let mut idle: Vec<(String, Instant)> = sessions
            .iter()
            .filter_map(|(id, handle)| {
                let session = handle.try_lock().ok()?;
                Some((id.clone(), session.last_active()))
            })
            .collect();

        idle.retain(|(id, last_active)| {
            let expired = now.saturating_duration_since(*last_active) >= self.idle_ttl;
            if expired {
                sessions.remove(id);
                tracing::debug!(session = %id, "idle session expired");
            }
            !expired
        });

        idle.sort_by_key(|(_, last_active)| *last_active);
        let mut oldest = idle.into_iter();
        while sessions.len() >= self.max_sessions {
            let Some((id, _)) = oldest.next() else {
                tracing::warn!(live = sessions.len(), "session cap reached with every session busy");
                break;
            };
            sessions.remove(&id);
            tracing::info!(session = %id, "session evicted at capacity");
        }
    }

    /// Look up an existing session
    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Remove a session, returning it for a final report
    pub async fn end(&self, id: &str) -> Option<SessionHandle> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            tracing::debug!(session = id, "session ended");
        }
        removed
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
