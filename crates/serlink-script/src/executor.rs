//! Script executor.
//!
//! Walks a [`CommandSequence`] with a program counter and a stack of loop
//! frames. SEND steps are handed to a [`PayloadSink`] and awaited before
//! the next step starts; DELAY steps sleep on the tokio timer.
//!
//! Before every step the executor checks for a stop request and enforces a
//! global step budget, then reports progress as `(index + 1, total)`.
//! Stop requests come from an optional polled predicate and from a
//! [`CancellationToken`]; the token also cuts a running DELAY short.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::ScriptError;
use crate::parser::{CommandSequence, ScriptCommand};

/// Default step budget for one run.
pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;

/// Destination for SEND payloads.
///
/// The executor does not decide how payload text becomes bytes; the sink
/// does (text vs. hex, line endings). Implemented by the transport session's
/// sink in `serlink-session` and by test spies.
#[async_trait]
pub trait PayloadSink: Send + Sync {
    /// Deliver one payload. Must not return until the write has completed.
    async fn send_payload(&self, payload: &str) -> serlink_core::Result<()>;
}

/// Bookkeeping for one open loop.
#[derive(Debug)]
struct ExecutionFrame {
    /// Index of the `LoopStart` that opened this frame.
    start: usize,
    target: u32,
    completed: u32,
}

/// Counters from a completed run.
///
/// A SEND whose payload is empty is stepped over without touching the sink
/// and is not counted in `sends`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionSummary {
    /// Steps executed, counting loop bookkeeping.
    pub steps: u64,
    /// SEND payloads delivered.
    pub sends: u64,
}

type ProgressFn<'a> = Box<dyn FnMut(usize, usize) + Send + Sync + 'a>;
type StopFn<'a> = Box<dyn Fn() -> bool + Send + Sync + 'a>;

/// Configurable script executor.
///
/// ```
/// use serlink_script::{parse, Executor, PayloadSink};
/// # struct Discard;
/// # #[async_trait::async_trait]
/// # impl PayloadSink for Discard {
/// #     async fn send_payload(&self, _: &str) -> serlink_core::Result<()> { Ok(()) }
/// # }
///
/// # async fn example() -> Result<(), serlink_script::ScriptError> {
/// let script = parse("LOOP 3\nSEND ping\nEND")?;
/// let summary = Executor::new()
///     .on_progress(|current, total| println!("{current}/{total}"))
///     .run(&script, &Discard)
///     .await?;
/// assert_eq!(summary.sends, 3);
/// # Ok(())
/// # }
/// ```
pub struct Executor<'a> {
    progress: Option<ProgressFn<'a>>,
    should_stop: Option<StopFn<'a>>,
    cancel: CancellationToken,
    max_steps: u64,
}

impl<'a> Executor<'a> {
    pub fn new() -> Self {
        Executor {
            progress: None,
            should_stop: None,
            cancel: CancellationToken::new(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Called once per step, before the step runs, with a 1-based position.
    pub fn on_progress(mut self, f: impl FnMut(usize, usize) + Send + Sync + 'a) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    /// Polled at every step boundary; returning `true` stops the run.
    pub fn stop_when(mut self, f: impl Fn() -> bool + Send + Sync + 'a) -> Self {
        self.should_stop = Some(Box::new(f));
        self
    }

    /// Cancelling `token` stops the run at the next step boundary and
    /// interrupts any DELAY in progress.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Override the step budget (default [`DEFAULT_MAX_STEPS`]).
    pub fn max_steps(mut self, steps: u64) -> Self {
        self.max_steps = steps;
        self
    }

    fn stop_requested(&self) -> bool {
        self.cancel.is_cancelled() || self.should_stop.as_ref().is_some_and(|f| f())
    }

    /// Execute `script`, sending every SEND payload through `sink`.
    ///
    /// # Errors
    ///
    /// Stops at the first failing step. Bytes already sent are not undone.
    pub async fn run(
        &mut self,
        script: &CommandSequence,
        sink: &dyn PayloadSink,
    ) -> Result<ExecutionSummary, ScriptError> {
        let commands = script.commands();
        let total = commands.len();
        if total == 0 {
            return Err(ScriptError::NoCommands);
        }

        debug!(commands = total, "script execution started");

        let mut frames: Vec<ExecutionFrame> = Vec::new();
        let mut index = 0usize;
        let mut summary = ExecutionSummary::default();

        while index < total {
            if self.stop_requested() {
                debug!(index, total, "script execution cancelled");
                return Err(ScriptError::Cancelled { index, total });
            }

            summary.steps += 1;
            if summary.steps > self.max_steps {
                tracing::warn!(index, steps = self.max_steps, "script step budget exhausted");
                return Err(ScriptError::RunawayExecution {
                    index,
                    steps: self.max_steps,
                });
            }

            if let Some(progress) = self.progress.as_mut() {
                progress(index + 1, total);
            }

            match &commands[index] {
                ScriptCommand::Send(payload) if payload.is_empty() => {
                    trace!(index, "SEND with empty payload skipped");
                    index += 1;
                }
                ScriptCommand::Send(payload) => {
                    trace!(index, payload = %payload, "SEND");
                    sink.send_payload(payload)
                        .await
                        .map_err(|source| ScriptError::SendFailed {
                            index,
                            total,
                            source,
                        })?;
                    summary.sends += 1;
                    index += 1;
                }
                ScriptCommand::Delay(duration) => {
                    trace!(index, ms = duration.as_millis() as u64, "DELAY");
                    delay(*duration, &self.cancel).await;
                    index += 1;
                }
                ScriptCommand::LoopStart { count, .. } => {
                    frames.push(ExecutionFrame {
                        start: index,
                        target: *count,
                        completed: 0,
                    });
                    index += 1;
                }
                ScriptCommand::LoopEnd { .. } => {
                    let Some(frame) = frames.last_mut() else {
                        return Err(ScriptError::UnbalancedLoop { index });
                    };
                    frame.completed += 1;
                    if frame.completed < frame.target {
                        index = frame.start + 1;
                    } else {
                        frames.pop();
                        index += 1;
                    }
                }
            }
        }

        if !frames.is_empty() {
            return Err(ScriptError::UnterminatedLoop { open: frames.len() });
        }

        debug!(steps = summary.steps, sends = summary.sends, "script execution finished");
        Ok(summary)
    }
}

impl Default for Executor<'_> {
    fn default() -> Self {
        Self::new()
    }
}

async fn delay(duration: Duration, cancel: &CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = cancel.cancelled() => {
            trace!("delay interrupted by cancellation");
        }
    }
}

/// Execute `script` with default settings: no progress callback, no stop
/// request, default step budget.
pub async fn execute(
    script: &CommandSequence,
    sink: &dyn PayloadSink,
) -> Result<ExecutionSummary, ScriptError> {
    Executor::new().run(script, sink).await
}
