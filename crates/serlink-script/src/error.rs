//! Error type for script parsing and execution.
//!
//! Parse-time errors carry the 1-based source line. Execution errors carry
//! the 0-based index of the command that failed; their `Display` output
//! renders it 1-based so messages read as "step N of M".

/// The error type for parsing, validating, and executing scripts.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The script text is empty or whitespace only.
    #[error("script is empty")]
    Empty,

    /// A line could not be understood.
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// A numeric argument is outside its allowed range.
    #[error("line {line}: {message}")]
    Validation { line: usize, message: String },

    /// Execution was requested for a sequence with no commands.
    #[error("no commands to execute")]
    NoCommands,

    /// The payload sink rejected a SEND.
    #[error("step {} of {}: send failed: {source}", .index + 1, .total)]
    SendFailed {
        index: usize,
        total: usize,
        #[source]
        source: serlink_core::Error,
    },

    /// A stop was requested and honoured before the command at `index`.
    #[error("cancelled before step {} of {}", .index + 1, .total)]
    Cancelled { index: usize, total: usize },

    /// The step budget was exhausted.
    #[error("execution exceeded {steps} steps at command {} (possible infinite loop)", .index + 1)]
    RunawayExecution { index: usize, steps: u64 },

    /// An END was reached with no open loop frame.
    #[error("END at command {} has no matching LOOP", .index + 1)]
    UnbalancedLoop { index: usize },

    /// Execution reached the end of the sequence with loop frames still open.
    #[error("execution finished with {open} unclosed loop(s)")]
    UnterminatedLoop { open: usize },

    /// A runner was asked to start while a script was already running.
    #[error("a script is already running")]
    AlreadyRunning,
}

impl ScriptError {
    /// Source line for parse-time errors.
    pub fn line(&self) -> Option<usize> {
        match self {
            ScriptError::Syntax { line, .. } | ScriptError::Validation { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// Command index for execution errors.
    pub fn index(&self) -> Option<usize> {
        match self {
            ScriptError::SendFailed { index, .. }
            | ScriptError::Cancelled { index, .. }
            | ScriptError::RunawayExecution { index, .. }
            | ScriptError::UnbalancedLoop { index } => Some(*index),
            _ => None,
        }
    }

    /// `true` for [`ScriptError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScriptError::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_display_has_line() {
        let e = ScriptError::Syntax {
            line: 4,
            message: "unknown command: FOO".into(),
        };
        assert_eq!(e.to_string(), "line 4: unknown command: FOO");
        assert_eq!(e.line(), Some(4));
        assert_eq!(e.index(), None);
    }

    #[test]
    fn send_failed_display_is_one_based() {
        let e = ScriptError::SendFailed {
            index: 2,
            total: 7,
            source: serlink_core::Error::NotConnected,
        };
        assert_eq!(e.to_string(), "step 3 of 7: send failed: not connected");
        assert_eq!(e.index(), Some(2));
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn cancelled_display() {
        let e = ScriptError::Cancelled { index: 0, total: 3 };
        assert_eq!(e.to_string(), "cancelled before step 1 of 3");
        assert!(e.is_cancelled());
    }

    #[test]
    fn runaway_display() {
        let e = ScriptError::RunawayExecution {
            index: 5,
            steps: 1_000_000,
        };
        assert!(e.to_string().contains("1000000 steps"));
        assert_eq!(e.index(), Some(5));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<ScriptError>();
        assert_sync::<ScriptError>();
    }
}
