//! One player's game: a story, its interpreter, and its save directory.
//!
//! All interpreter traffic for a session goes through a FIFO
//! [`tokio::sync::Mutex`], so commands from the same player are observed by
//! the interpreter one at a time, in arrival order. Multi-step dialogs
//! (save/restore) hold the lock across every step via [`SessionGuard`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::GlobalConfig;
use crate::interpreter::{InterpreterProcess, LaunchConfig, TranscriptReader};
use crate::models::key::SessionKey;
use crate::models::reply::{CompletionReason, Reply};
use crate::models::story::Story;
use crate::{AppError, Result};

/// Settings shared by every session of a registry.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Interpreter launch parameters and process slots.
    pub launch: LaunchConfig,
    /// Output silence that completes a reply.
    pub idle_window: Duration,
    /// Upper bound on one reply.
    pub reply_timeout: Duration,
    /// Bytes retained per reply.
    pub max_reply_bytes: usize,
    /// Absolute root of the per-key save directories.
    pub save_root: PathBuf,
}

impl SessionSettings {
    /// Derive settings from the global configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `sessions.save_root` cannot be made absolute.
    pub fn from_config(config: &GlobalConfig) -> Result<Self> {
        let save_root = std::path::absolute(&config.sessions.save_root)
            .map_err(|err| AppError::Config(format!("save_root invalid: {err}")))?;
        Ok(Self {
            launch: LaunchConfig::from_config(
                &config.interpreter,
                config.sessions.max_concurrent_sessions,
            ),
            idle_window: config.interpreter.idle_window(),
            reply_timeout: config.interpreter.reply_timeout(),
            max_reply_bytes: config.interpreter.max_reply_bytes,
            save_root,
        })
    }
}

/// Interpreter process paired with its transcript reader.
#[derive(Debug)]
struct Running {
    process: InterpreterProcess,
    transcript: TranscriptReader,
    dead: bool,
}

impl Running {
    /// Returns `true` only on the call that first observes the exit.
    fn poll_exit(&mut self) -> bool {
        let alive = self.process.is_alive();
        if self.dead {
            return false;
        }
        self.dead = !alive;
        self.dead
    }

    fn is_alive(&mut self) -> bool {
        // Polled even when already dead so the process slot is released.
        if !self.process.is_alive() {
            self.dead = true;
        }
        !self.dead
    }
}

#[derive(Debug, Default)]
struct SessionState {
    story: Option<Arc<Story>>,
    running: Option<Running>,
    closed: bool,
}

/// A player's session. Created and destroyed only by the
/// [`SessionRegistry`](super::registry::SessionRegistry).
#[derive(Debug)]
pub struct Session {
    key: SessionKey,
    save_dir: PathBuf,
    settings: Arc<SessionSettings>,
    state: Mutex<SessionState>,
    story_name: RwLock<Option<String>>,
    in_flight: AtomicBool,
    last_activity_ms: AtomicI64,
}

impl Session {
    pub(crate) fn new(key: SessionKey, settings: Arc<SessionSettings>) -> Self {
        let save_dir = settings.save_root.join(key.dir_name());
        Self {
            key,
            save_dir,
            settings,
            state: Mutex::new(SessionState::default()),
            story_name: RwLock::new(None),
            in_flight: AtomicBool::new(false),
            last_activity_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    /// Session key.
    #[must_use]
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Directory holding this session's save files. May not exist yet.
    #[must_use]
    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// Acquire exclusive use of the session, waiting behind earlier callers.
    pub async fn lock(&self) -> SessionGuard<'_> {
        let state = self.state.lock().await;
        self.in_flight.store(true, Ordering::SeqCst);
        SessionGuard {
            session: self,
            state,
        }
    }

    /// Acquire exclusive use only if no one else holds it.
    #[must_use]
    pub fn try_lock(&self) -> Option<SessionGuard<'_>> {
        let state = self.state.try_lock().ok()?;
        self.in_flight.store(true, Ordering::SeqCst);
        Some(SessionGuard {
            session: self,
            state,
        })
    }

    /// Send one line to the interpreter and wait for its reply.
    ///
    /// Concurrent calls are serialized in arrival order.
    ///
    /// # Errors
    ///
    /// See [`SessionGuard::send`].
    pub async fn send(&self, command: &str) -> Result<Reply> {
        self.lock().await.send(command).await
    }

    /// Whether a story has been selected.
    pub async fn has_story(&self) -> bool {
        self.lock().await.has_story()
    }

    /// Currently selected story, if any.
    pub async fn story(&self) -> Option<Arc<Story>> {
        self.lock().await.story()
    }

    /// Select a story and start a fresh interpreter for it.
    ///
    /// # Errors
    ///
    /// See [`SessionGuard::select_story`].
    pub async fn select_story(&self, story: Arc<Story>) -> Result<Reply> {
        self.lock().await.select_story(story).await
    }

    /// Whether an interpreter is currently running for this session.
    pub async fn is_alive(&self) -> bool {
        self.lock().await.is_alive()
    }

    /// OS process id of the interpreter, if one was started.
    pub async fn process_id(&self) -> Option<u32> {
        self.lock().await.process_id()
    }

    /// Kill the interpreter and forget the story.
    pub async fn terminate(&self) {
        self.lock().await.terminate().await;
    }

    /// Kill the interpreter and refuse all further sends and selections.
    ///
    /// Called by the registry when the session leaves its map, so a caller
    /// still holding the session can never start an untracked interpreter.
    pub(crate) async fn close(&self) {
        self.lock().await.close().await;
    }

    /// Whether the registry has dropped this session.
    pub async fn is_closed(&self) -> bool {
        self.lock().await.is_closed()
    }

    /// Name of the selected story, readable without waiting for the lock.
    #[must_use]
    pub fn story_name(&self) -> Option<String> {
        self.story_name.read().ok().and_then(|name| name.clone())
    }

    fn set_story_name(&self, name: Option<String>) {
        if let Ok(mut slot) = self.story_name.write() {
            *slot = name;
        }
    }

    /// Whether a caller currently holds the session.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Time since the last command was sent or answered.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        let last = self.last_activity_ms.load(Ordering::SeqCst);
        let elapsed = Utc::now().timestamp_millis().saturating_sub(last);
        Duration::from_millis(u64::try_from(elapsed).unwrap_or(0))
    }

    fn touch(&self) {
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::SeqCst);
    }
}

/// Exclusive access to a session for one or more interpreter exchanges.
#[derive(Debug)]
pub struct SessionGuard<'a> {
    session: &'a Session,
    state: MutexGuard<'a, SessionState>,
}

impl SessionGuard<'_> {
    /// The guarded session.
    #[must_use]
    pub fn session(&self) -> &Session {
        self.session
    }

    /// Whether a story has been selected.
    #[must_use]
    pub fn has_story(&self) -> bool {
        self.state.story.is_some()
    }

    /// Whether the session has been removed from its registry.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed
    }

    /// Currently selected story, if any.
    #[must_use]
    pub fn story(&self) -> Option<Arc<Story>> {
        self.state.story.clone()
    }

    /// Whether an interpreter is currently running.
    pub fn is_alive(&mut self) -> bool {
        self.state.running.as_mut().is_some_and(Running::is_alive)
    }

    /// OS process id of the interpreter, if one was started.
    #[must_use]
    pub fn process_id(&self) -> Option<u32> {
        self.state.running.as_ref().and_then(|r| r.process.pid())
    }

    /// Whether this call is the first to notice the interpreter has exited.
    pub fn poll_exit(&mut self) -> bool {
        self.state.running.as_mut().is_some_and(Running::poll_exit)
    }

    /// Drop interpreter output left over from an earlier timed-out reply.
    pub fn drain_output(&mut self) -> usize {
        self.state
            .running
            .as_mut()
            .map_or(0, |running| running.transcript.drain())
    }

    /// Send one line and read the reply.
    ///
    /// Line breaks inside `command` are flattened to spaces so that one call
    /// is always exactly one interpreter input line. A reply that observed
    /// the interpreter exiting is returned normally with
    /// [`CompletionReason::ProcessExited`]; later calls fail.
    ///
    /// # Errors
    ///
    /// - `AppError::NoStory` — no story selected.
    /// - `AppError::SessionDead` — the interpreter has exited, or the
    ///   session was removed from its registry; it is never restarted
    ///   implicitly.
    /// - `AppError::Io` — the write failed while the process is still alive.
    pub async fn send(&mut self, command: &str) -> Result<Reply> {
        let key = self.session.key.clone();
        if self.state.closed {
            return Err(closed(&key));
        }
        let Some(story) = self.state.story.clone() else {
            return Err(AppError::NoStory(format!("session {key} has no story selected")));
        };
        let Some(running) = self.state.running.as_mut() else {
            return Err(dead(&story));
        };
        if !running.is_alive() {
            return Err(dead(&story));
        }

        let mut line: Vec<u8> = command
            .bytes()
            .map(|b| if b == b'\n' || b == b'\r' { b' ' } else { b })
            .collect();
        line.push(b'\n');

        self.session.touch();
        if let Err(err) = running.process.write(&line).await {
            if running.is_alive() {
                return Err(err);
            }
            warn!(session_key = %key, %err, "interpreter gone before write completed");
            return Err(dead(&story));
        }

        let reply = running
            .transcript
            .read_reply(self.session.settings.reply_timeout)
            .await;
        self.session.touch();

        match reply.reason {
            CompletionReason::Complete => {
                debug!(session_key = %key, bytes = reply.text.len(), "reply complete");
            }
            CompletionReason::TimedOut => {
                warn!(
                    session_key = %key,
                    timeout = ?self.session.settings.reply_timeout,
                    "reply timed out; interpreter left running"
                );
            }
            CompletionReason::ProcessExited => {
                running.dead = true;
                warn!(session_key = %key, story = story.name(), "interpreter exited during reply");
            }
        }

        Ok(reply)
    }

    /// Select `story`, kill any previous interpreter, and start a new one.
    ///
    /// Returns the interpreter's opening text. Reselecting the running story
    /// restarts it; selecting a story on a dead session is always allowed.
    ///
    /// # Errors
    ///
    /// - `AppError::AlreadyPlaying` — a different story is still running;
    ///   the caller must clear the session first.
    /// - `AppError::Spawn` / `AppError::Capacity` — the interpreter could not
    ///   be started. The session is left with no story selected.
    /// - `AppError::SessionDead` — the session was removed from its registry.
    pub async fn select_story(&mut self, story: Arc<Story>) -> Result<Reply> {
        let key = self.session.key.clone();
        if self.state.closed {
            return Err(closed(&key));
        }

        if let (Some(current), Some(running)) =
            (self.state.story.clone(), self.state.running.as_mut())
        {
            if current.abbrev() != story.abbrev() && running.is_alive() {
                return Err(AppError::AlreadyPlaying(format!(
                    "'{}' is still running",
                    current.name()
                )));
            }
        }

        self.stop_process().await;
        self.state.story = None;
        self.session.set_story_name(None);

        let settings = &self.session.settings;
        let (process, chunks) =
            InterpreterProcess::spawn(&settings.launch, &key, story.path()).await?;
        let mut running = Running {
            process,
            transcript: TranscriptReader::new(
                chunks,
                settings.idle_window,
                settings.max_reply_bytes,
            ),
            dead: false,
        };

        let intro = running.transcript.read_reply(settings.reply_timeout).await;
        if intro.process_exited() {
            running.dead = true;
            warn!(session_key = %key, story = story.name(), "interpreter exited during startup");
        }

        info!(session_key = %key, story = story.name(), "story selected");
        self.session.set_story_name(Some(story.name().to_owned()));
        self.state.story = Some(story);
        self.state.running = Some(running);
        self.session.touch();

        Ok(intro)
    }

    /// Kill the interpreter and forget the story.
    pub async fn terminate(&mut self) {
        self.stop_process().await;
        self.session.set_story_name(None);
        if self.state.story.take().is_some() {
            info!(session_key = %self.session.key, "session terminated");
        }
    }

    /// Terminate and mark the session closed.
    pub(crate) async fn close(&mut self) {
        self.state.closed = true;
        self.terminate().await;
    }

    async fn stop_process(&mut self) {
        if let Some(mut running) = self.state.running.take() {
            running.process.kill().await;
        }
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.session.in_flight.store(false, Ordering::SeqCst);
    }
}

fn closed(key: &SessionKey) -> AppError {
    AppError::SessionDead(format!("session {key} was cleared"))
}

fn dead(story: &Story) -> AppError {
    AppError::SessionDead(format!(
        "the interpreter for '{}' is no longer running",
        story.name()
    ))
}
