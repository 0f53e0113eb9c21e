//! # Stream Session Registry
//!
//! Tracks the open audio streams, one per WebSocket connection, and enforces the
//! concurrent session limit.
//!
//! ## Session Lifecycle:
//! 1. **Registered**: The upgrade request was accepted and an id assigned
//! 2. **Streaming**: Frames are counted as the connection's actor analyzes them
//! 3. **Removed**: The actor stopped (client closed, heartbeat timeout, protocol error)
//!
//! ## Thread Safety:
//! The registry map sits behind an `RwLock`; per-session counters are atomics so the
//! actor can bump them without taking the registry lock.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// One connected audio stream.
pub struct StreamSession {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    frames_received: AtomicU64,
    frames_analyzed: AtomicU64,
    feedback_emitted: AtomicU64,
}

impl StreamSession {
    fn new(session_id: String) -> Self {
        Self {
            session_id,
            created_at: Utc::now(),
            frames_received: AtomicU64::new(0),
            frames_analyzed: AtomicU64::new(0),
            feedback_emitted: AtomicU64::new(0),
        }
    }

    pub fn record_frame(&self, analyzed: bool, emitted_feedback: bool) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        if analyzed {
            self.frames_analyzed.fetch_add(1, Ordering::Relaxed);
        }
        if emitted_feedback {
            self.feedback_emitted.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Seconds since the session was registered.
    pub fn duration_seconds(&self) -> f64 {
        Utc::now().signed_duration_since(self.created_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            created_at: self.created_at.to_rfc3339(),
            duration_seconds: self.duration_seconds(),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_analyzed: self.frames_analyzed.load(Ordering::Relaxed),
            feedback_emitted: self.feedback_emitted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a session, for logs and the metrics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: String,
    pub duration_seconds: f64,
    pub frames_received: u64,
    pub frames_analyzed: u64,
    pub feedback_emitted: u64,
}

/// Registry of open sessions.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<StreamSession>>>,
    max_concurrent_sessions: usize,
}

impl SessionManager {
    pub fn new(max_concurrent_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_concurrent_sessions,
        }
    }

    /// Register a new session with a fresh UUID.
    ///
    /// ## Returns:
    /// - **Ok(session)**: Registered
    /// - **Err(message)**: The concurrent session limit is reached
    pub fn create_session(&self) -> Result<Arc<StreamSession>, String> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());

        if sessions.len() >= self.max_concurrent_sessions {
            return Err(format!(
                "Maximum concurrent sessions ({}) reached",
                self.max_concurrent_sessions
            ));
        }

        let session = Arc::new(StreamSession::new(Uuid::new_v4().to_string()));
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    pub fn remove_session(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id).is_some()
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn max_concurrent_sessions(&self) -> usize {
        self.max_concurrent_sessions
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.values().map(|s| s.summary()).collect()
    }
}
