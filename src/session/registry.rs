//! Session registry: the only owner of [`Session`]s.
//!
//! The key → session map sits behind a short-lived lock that is never held
//! across interpreter I/O. Work for different keys therefore never queues on
//! the map, while work for the same key queues on that session's own lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, Instrument};

use super::game::{Session, SessionSettings};
use crate::config::GlobalConfig;
use crate::models::key::SessionKey;
use crate::Result;

/// Point-in-time view of one session for listings.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionSummary {
    /// Session key.
    pub key: SessionKey,
    /// Selected story name.
    pub story: Option<String>,
    /// Whether an interpreter process is running; `None` while the session
    /// is busy and its process cannot be polled.
    pub alive: Option<bool>,
    /// Whether a command is in flight.
    pub busy: bool,
    /// Seconds since the last command.
    pub idle_seconds: u64,
}

/// Outcome of one maintenance sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions removed for inactivity.
    pub evicted: Vec<SessionKey>,
    /// Sessions whose interpreter was found to have exited.
    pub exited: Vec<SessionKey>,
}

/// Map of live sessions keyed by [`SessionKey`].
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionKey, Arc<Session>>>,
    settings: Arc<SessionSettings>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            settings: Arc::new(settings),
        }
    }

    /// Create an empty registry from the global configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the session settings are invalid.
    pub fn from_config(config: &GlobalConfig) -> Result<Self> {
        Ok(Self::new(SessionSettings::from_config(config)?))
    }

    /// Settings shared by every session.
    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Return the session for `key`, creating an empty one if absent.
    ///
    /// A new session has no story and no process.
    pub async fn get_or_create(&self, key: &SessionKey) -> Arc<Session> {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(key) {
            return Arc::clone(existing);
        }

        let session = Arc::new(Session::new(key.clone(), Arc::clone(&self.settings)));
        sessions.insert(key.clone(), Arc::clone(&session));
        debug!(session_key = %key, total = sessions.len(), "session created");
        session
    }

    /// Return the session for `key` without creating one.
    pub async fn get(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(key).cloned()
    }

    /// Remove the session for `key` and kill its interpreter.
    ///
    /// Returns `false` if no session existed. A command already in flight on
    /// the session finishes before the interpreter is killed.
    pub async fn remove(&self, key: &SessionKey) -> bool {
        let removed = self.sessions.lock().await.remove(key);
        let Some(session) = removed else {
            return false;
        };

        session
            .close()
            .instrument(info_span!("remove_session", session_key = %key))
            .await;
        info!(session_key = %key, "session removed");
        true
    }

    /// Number of sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether the registry holds no sessions.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Summaries of all sessions, ordered by key.
    ///
    /// Busy sessions are reported without waiting for their command.
    pub async fn snapshot(&self) -> Vec<SessionSummary> {
        let sessions: Vec<Arc<Session>> = self.sessions.lock().await.values().cloned().collect();

        let mut summaries: Vec<SessionSummary> = sessions
            .iter()
            .map(|session| {
                let idle_seconds = session.idle_for().as_secs();
                let alive = session.try_lock().map(|mut guard| guard.is_alive());
                SessionSummary {
                    key: session.key().clone(),
                    story: session.story_name(),
                    busy: alive.is_none(),
                    alive,
                    idle_seconds,
                }
            })
            .collect();

        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        summaries
    }

    /// Remove and kill every session idle for at least `max_idle` that is
    /// not busy. Returns the evicted keys.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<SessionKey> {
        self.sweep(Some(max_idle)).await.evicted
    }

    /// Remove and kill every idle session unused for at least `max_idle`,
    /// and note sessions whose interpreter exited on its own.
    ///
    /// Busy sessions are skipped. Checking liveness releases the process
    /// slot of an interpreter that exited unnoticed.
    pub async fn sweep(&self, max_idle: Option<Duration>) -> SweepReport {
        let mut report = SweepReport::default();
        let mut to_evict = Vec::new();

        {
            let mut sessions = self.sessions.lock().await;
            let candidates: Vec<(SessionKey, Arc<Session>)> = sessions
                .iter()
                .map(|(key, session)| (key.clone(), Arc::clone(session)))
                .collect();

            for (key, session) in candidates {
                let Some(mut guard) = session.try_lock() else {
                    continue;
                };

                if guard.poll_exit() {
                    report.exited.push(key.clone());
                }
                drop(guard);

                if max_idle.is_some_and(|limit| session.idle_for() >= limit) {
                    sessions.remove(&key);
                    to_evict.push((key, session));
                }
            }
        }

        for (key, session) in to_evict {
            session.close().await;
            info!(session_key = %key, "idle session evicted");
            report.evicted.push(key);
        }

        report
    }

    /// Kill every interpreter and empty the registry.
    pub async fn shutdown(&self) {
        let drained: Vec<(SessionKey, Arc<Session>)> =
            self.sessions.lock().await.drain().collect();
        let count = drained.len();

        for (key, session) in drained {
            session
                .close()
                .instrument(info_span!("shutdown_session", session_key = %key))
                .await;
        }

        info!(sessions = count, "session registry shut down");
    }
}
