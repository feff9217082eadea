// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session management
//!
//! Each connection gets a random session id from `initialize`. Sessions
//! track last-seen event id and subscription set; idle sessions expire.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_ms: u64,
    pub last_seen_ms: u64,
    pub last_event_id: u64,
    pub subscriptions: HashSet<String>,
}

pub struct SessionManager {
    sessions: Mutex<HashMap<String, Session>>,
    max_idle: Duration,
}

impl SessionManager {
    pub fn new(max_idle: Duration) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), max_idle }
    }

    /// Create a session and return its id.
    pub fn create(&self, now_ms: u64) -> String {
        let id = nanoid::nanoid!(21);
        let session = Session {
            id: id.clone(),
            created_ms: now_ms,
            last_seen_ms: now_ms,
            last_event_id: 0,
            subscriptions: HashSet::new(),
        };
        self.sessions.lock().insert(id.clone(), session);
        id
    }

    /// Mark activity on a session. False when the session is unknown or
    /// has expired.
    pub fn touch(&self, id: &str, now_ms: u64) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(id) {
            Some(session) => {
                let idle_ms = now_ms.saturating_sub(session.last_seen_ms);
                if idle_ms > self.max_idle.as_millis() as u64 {
                    sessions.remove(id);
                    return false;
                }
                session.last_seen_ms = now_ms;
                true
            }
            None => false,
        }
    }

    pub fn set_last_event_id(&self, id: &str, event_id: u64) {
        if let Some(session) = self.sessions.lock().get_mut(id) {
            session.last_event_id = event_id;
        }
    }

    pub fn subscribe(&self, id: &str, method: impl Into<String>) {
        if let Some(session) = self.sessions.lock().get_mut(id) {
            session.subscriptions.insert(method.into());
        }
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.lock().get(id).cloned()
    }

    /// Drop every session idle past the limit. Returns how many.
    pub fn expire_idle(&self, now_ms: u64) -> usize {
        let max_idle_ms = self.max_idle.as_millis() as u64;
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| now_ms.saturating_sub(s.last_seen_ms) <= max_idle_ms);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(30 * 60))
    }
}
