//! Script runner: one script at a time against a shared session.
//!
//! Progress is published on a `watch` channel so any number of observers
//! can follow along; it resets to `(0, 0)` when a run finishes for any
//! reason. [`ScriptRunner::stop`] cancels the current run, cutting a
//! pending DELAY short.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use serlink_core::codec::{DataFormat, LineEnding};
use serlink_script::{ExecutionSummary, Executor, ScriptError, parse};

use crate::session::TransportSession;
use crate::sink::SessionSink;

/// Position within the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    /// 1-based index of the command being executed; 0 when idle.
    pub current: usize,
    /// Commands in the sequence; 0 when idle.
    pub total: usize,
}

/// Runs scripts against a [`TransportSession`].
pub struct ScriptRunner {
    session: Arc<TransportSession>,
    line_ending: LineEnding,
    max_steps: u64,
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
    progress: watch::Sender<Progress>,
}

/// Clears the running flag and progress when a run ends.
struct RunGuard<'a> {
    runner: &'a ScriptRunner,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.runner.progress.send_replace(Progress::default());
        self.runner.running.store(false, Ordering::SeqCst);
    }
}

impl ScriptRunner {
    pub fn new(session: Arc<TransportSession>) -> Self {
        let (progress, _) = watch::channel(Progress::default());
        ScriptRunner {
            session,
            line_ending: LineEnding::None,
            max_steps: serlink_script::DEFAULT_MAX_STEPS,
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            progress,
        }
    }

    /// Line ending appended to text SEND payloads (default: none). Hex
    /// payloads are sent as written.
    pub fn line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    /// Step budget per run.
    pub fn max_steps(mut self, steps: u64) -> Self {
        self.max_steps = steps;
        self
    }

    pub fn session(&self) -> &Arc<TransportSession> {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Watch progress updates.
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    fn lock_cancel(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ask the current run to stop before its next step. No-op when idle.
    pub fn stop(&self) {
        let cancel = self.lock_cancel();
        if self.is_running() {
            debug!("script stop requested");
            cancel.cancel();
        }
    }

    /// Parse and execute `script`, encoding payloads per `format`.
    ///
    /// # Errors
    ///
    /// [`ScriptError::AlreadyRunning`] if another run is in progress;
    /// otherwise any parse or execution error.
    pub async fn run(&self, script: &str, format: DataFormat) -> Result<ExecutionSummary, ScriptError> {
        // The run's token is in place before it becomes visible as running.
        let token = {
            let mut cancel = self.lock_cancel();
            if self.is_running() {
                return Err(ScriptError::AlreadyRunning);
            }
            let token = CancellationToken::new();
            *cancel = token.clone();
            self.running.store(true, Ordering::SeqCst);
            token
        };
        let _guard = RunGuard { runner: self };

        let sequence = parse(script)?;

        info!(commands = sequence.len(), format = ?format, "running script");
        let sink = SessionSink::new(&self.session, format).line_ending(self.line_ending);
        let progress = &self.progress;
        let result = Executor::new()
            .on_progress(|current, total| {
                progress.send_replace(Progress { current, total });
            })
            .cancel_token(token)
            .max_steps(self.max_steps)
            .run(&sequence, &sink)
            .await;

        match &result {
            Ok(summary) => info!(sends = summary.sends, steps = summary.steps, "script finished"),
            Err(e) if e.is_cancelled() => info!("script stopped"),
            Err(e) => info!(error = %e, "script failed"),
        }
        result
    }
}
