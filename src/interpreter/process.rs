//! Interpreter process handle.
//!
//! Spawns one interpreter per session with:
//! - `kill_on_drop(true)` so a dropped handle never leaks a process.
//! - `env_clear()` + a small allowlist so server-side variables never reach
//!   the interpreter's environment.
//! - stdout and stderr both pumped into one chunk channel, consumed by the
//!   [`TranscriptReader`](super::transcript::TranscriptReader).
//! - one permit from the shared process-slot semaphore, held until the
//!   process is killed or observed to have exited.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::transcript::{spawn_output_pump, OutputChunks, OUTPUT_CHANNEL_CAPACITY};
use crate::config::InterpreterConfig;
use crate::models::key::SessionKey;
use crate::{AppError, Result};

// ── Environment allowlist ────────────────────────────────────────────────────

/// Environment variables inherited by the interpreter process.
///
/// Every other variable is stripped via `env_clear()` before launch.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "TERM",
    "LANG",
    "LC_ALL",
    "TMPDIR",
    // Windows-specific variables.
    "SystemRoot",
    "TEMP",
    "TMP",
];

/// Time allowed between `SIGTERM` (or stdin close) and a forced kill.
const KILL_GRACE: Duration = Duration::from_millis(500);

// ── Configuration ────────────────────────────────────────────────────────────

/// Everything needed to launch an interpreter for any story.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Interpreter binary.
    pub binary: String,
    /// Arguments placed before the story path.
    pub args: Vec<String>,
    /// Shared live-process slots.
    pub slots: Arc<Semaphore>,
    /// Total slot count, for error reporting.
    pub max_processes: u32,
}

impl LaunchConfig {
    /// Build a launch configuration with a fresh slot pool of `max_processes`.
    #[must_use]
    pub fn new(binary: impl Into<String>, args: Vec<String>, max_processes: u32) -> Self {
        let permits = usize::try_from(max_processes).unwrap_or(usize::MAX);
        Self {
            binary: binary.into(),
            args,
            slots: Arc::new(Semaphore::new(permits)),
            max_processes,
        }
    }

    /// Build from the `[interpreter]` config section.
    #[must_use]
    pub fn from_config(config: &InterpreterConfig, max_processes: u32) -> Self {
        Self::new(config.binary.clone(), config.args.clone(), max_processes)
    }

    /// Slots not currently held by a live interpreter.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

// ── Process handle ───────────────────────────────────────────────────────────

/// A running interpreter child process.
///
/// Output is not read here; [`InterpreterProcess::spawn`] hands back the
/// output chunk channel for the caller's transcript reader.
#[derive(Debug)]
pub struct InterpreterProcess {
    session_key: SessionKey,
    child: Child,
    stdin: Option<ChildStdin>,
    pid: Option<u32>,
    exit_status: Option<ExitStatus>,
    cancel: CancellationToken,
    pumps: Vec<JoinHandle<()>>,
    slot: Option<OwnedSemaphorePermit>,
}

impl InterpreterProcess {
    /// Launch the interpreter against `story_path`.
    ///
    /// # Errors
    ///
    /// - `AppError::Spawn` — the story file is missing or unreadable, the
    ///   binary cannot be executed, or a stdio pipe cannot be captured.
    /// - `AppError::Capacity` — every process slot is in use.
    pub async fn spawn(
        config: &LaunchConfig,
        session_key: &SessionKey,
        story_path: &Path,
    ) -> Result<(Self, OutputChunks)> {
        let span = info_span!("spawn_interpreter", session_key = %session_key);
        async move {
            check_story_readable(story_path).await?;

            let slot = Arc::clone(&config.slots).try_acquire_owned().map_err(|_| {
                AppError::Capacity(format!(
                    "all {} interpreter slots are in use",
                    config.max_processes
                ))
            })?;

            let mut cmd = Command::new(&config.binary);
            cmd.args(&config.args).arg(story_path);

            cmd.env_clear();
            for &key in ALLOWED_ENV_VARS {
                if let Ok(val) = std::env::var(key) {
                    cmd.env(key, val);
                }
            }

            cmd.stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let mut child = cmd.spawn().map_err(|err| {
                AppError::Spawn(format!("failed to launch '{}': {err}", config.binary))
            })?;

            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| AppError::Spawn("failed to capture interpreter stdin".into()))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| AppError::Spawn("failed to capture interpreter stdout".into()))?;
            let stderr = child
                .stderr
                .take()
                .ok_or_else(|| AppError::Spawn("failed to capture interpreter stderr".into()))?;

            let pid = child.id();
            let cancel = CancellationToken::new();
            let (tx, rx) = tokio::sync::mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
            let pumps = vec![
                spawn_output_pump(session_key.clone(), "stdout", stdout, tx.clone(), cancel.clone()),
                spawn_output_pump(session_key.clone(), "stderr", stderr, tx, cancel.clone()),
            ];

            info!(
                pid = pid.unwrap_or(0),
                binary = %config.binary,
                story = %story_path.display(),
                "interpreter spawned"
            );

            Ok((
                Self {
                    session_key: session_key.clone(),
                    child,
                    stdin: Some(stdin),
                    pid,
                    exit_status: None,
                    cancel,
                    pumps,
                    slot: Some(slot),
                },
                rx,
            ))
        }
        .instrument(span)
        .await
    }

    /// OS process id, if the process was started.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status once the process has been observed to exit.
    #[must_use]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Non-blocking liveness check.
    ///
    /// The first time an exit is observed the process slot is released.
    pub fn is_alive(&mut self) -> bool {
        if self.exit_status.is_some() {
            return false;
        }

        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                info!(
                    session_key = %self.session_key,
                    pid = self.pid.unwrap_or(0),
                    status = %describe_exit(status),
                    "interpreter exited"
                );
                self.mark_exited(status);
                false
            }
            Err(err) => {
                warn!(session_key = %self.session_key, %err, "failed to poll interpreter status");
                false
            }
        }
    }

    /// Write raw bytes to the interpreter's stdin and flush.
    ///
    /// No line terminator is added.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the process has exited or the write fails.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.is_alive() {
            return Err(AppError::Io("interpreter has exited".into()));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AppError::Io("interpreter stdin is closed".into()))?;

        stdin.write_all(bytes).await.map_err(|err| {
            warn!(session_key = %self.session_key, %err, "write to interpreter stdin failed");
            AppError::Io(format!("write failed: {err}"))
        })?;
        stdin
            .flush()
            .await
            .map_err(|err| AppError::Io(format!("flush failed: {err}")))?;

        Ok(())
    }

    /// Terminate the interpreter and release its pipes and slot. Idempotent.
    ///
    /// Closes stdin, sends `SIGTERM` on unix, waits briefly, then forces a
    /// kill if the process is still running.
    pub async fn kill(&mut self) {
        self.stdin.take();

        if self.is_alive() {
            #[cfg(unix)]
            self.signal_terminate();

            match tokio::time::timeout(KILL_GRACE, self.child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(session_key = %self.session_key, status = %describe_exit(status), "interpreter stopped");
                    self.mark_exited(status);
                }
                Ok(Err(err)) => {
                    warn!(session_key = %self.session_key, %err, "error waiting for interpreter");
                }
                Err(_) => {
                    warn!(
                        session_key = %self.session_key,
                        "interpreter did not exit within grace period, forcing kill"
                    );
                    if let Err(err) = self.child.kill().await {
                        warn!(session_key = %self.session_key, %err, "failed to force-kill interpreter");
                    }
                    if let Ok(Some(status)) = self.child.try_wait() {
                        self.mark_exited(status);
                    }
                }
            }
        }

        self.cancel.cancel();
        for pump in self.pumps.drain(..) {
            pump.abort();
        }
        self.slot.take();
    }

    #[cfg(unix)]
    fn signal_terminate(&self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return;
        };
        if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
            debug!(session_key = %self.session_key, %err, "SIGTERM delivery failed");
        }
    }

    fn mark_exited(&mut self, status: ExitStatus) {
        self.exit_status = Some(status);
        self.stdin.take();
        self.slot.take();
    }
}

impl Drop for InterpreterProcess {
    fn drop(&mut self) {
        // `kill_on_drop` reaps the child; the pumps stop here.
        self.cancel.cancel();
    }
}

/// Human-readable exit description.
#[must_use]
pub fn describe_exit(status: ExitStatus) -> String {
    if status.success() {
        "exited normally (code 0)".to_owned()
    } else {
        status.code().map_or_else(
            || "terminated by signal".to_owned(),
            |code| format!("exited with code {code}"),
        )
    }
}

async fn check_story_readable(story_path: &Path) -> Result<()> {
    let metadata = tokio::fs::metadata(story_path).await.map_err(|err| {
        AppError::Spawn(format!("story file {} unavailable: {err}", story_path.display()))
    })?;
    if !metadata.is_file() {
        return Err(AppError::Spawn(format!(
            "story path {} is not a file",
            story_path.display()
        )));
    }
    tokio::fs::File::open(story_path).await.map_err(|err| {
        AppError::Spawn(format!("story file {} unreadable: {err}", story_path.display()))
    })?;
    Ok(())
}
