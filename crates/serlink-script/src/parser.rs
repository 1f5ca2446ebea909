//! Script parser and validator.
//!
//! [`parse`] turns script text into a flat [`CommandSequence`]. Loop
//! structure is resolved at parse time: every [`ScriptCommand::LoopStart`]
//! records the index of its matching [`ScriptCommand::LoopEnd`] and vice
//! versa, so the executor never has to rediscover nesting.
//!
//! Parsing is all-or-nothing. Either every line is valid and a sequence is
//! returned, or the first offending line is reported.

use std::fmt;
use std::num::IntErrorKind;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ScriptError;

/// Largest accepted `DELAY` argument, in milliseconds.
pub const MAX_DELAY_MS: u64 = 60_000;

/// Largest accepted `LOOP` count.
pub const MAX_LOOP_COUNT: u32 = 10_000;

/// One parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCommand {
    /// Send the payload text. Surrounding quotes have been removed; escape
    /// sequences are not interpreted. May be empty (`SEND ""`).
    Send(String),
    /// Pause for the given duration.
    Delay(Duration),
    /// Start of a loop body that runs `count` times.
    LoopStart {
        count: u32,
        /// Index of the matching [`ScriptCommand::LoopEnd`].
        end: usize,
    },
    /// End of a loop body.
    LoopEnd {
        /// Index of the matching [`ScriptCommand::LoopStart`].
        start: usize,
    },
}

impl fmt::Display for ScriptCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptCommand::Send(payload) => write!(f, "SEND \"{payload}\""),
            ScriptCommand::Delay(d) => write!(f, "DELAY {}", d.as_millis()),
            ScriptCommand::LoopStart { count, .. } => write!(f, "LOOP {count}"),
            ScriptCommand::LoopEnd { .. } => write!(f, "END"),
        }
    }
}

/// A validated, flat command list.
///
/// Every `LoopStart` has exactly one matching `LoopEnd` at a greater index,
/// and pairs never overlap. The sequence cannot be modified after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSequence {
    commands: Vec<ScriptCommand>,
}

impl CommandSequence {
    /// Build a sequence without checking loop pairing. Used to exercise the
    /// executor's own guards.
    #[cfg(test)]
    pub(crate) fn from_commands_unchecked(commands: Vec<ScriptCommand>) -> Self {
        Self { commands }
    }

    pub fn commands(&self) -> &[ScriptCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScriptCommand> {
        self.commands.iter()
    }

    /// Number of SEND operations a full run performs, with every SEND
    /// multiplied by the counts of its enclosing loops. Empty payloads are
    /// not sent and are not counted.
    pub fn total_sends(&self) -> u64 {
        let mut multiplier: Vec<u64> = vec![1];
        let mut total = 0u64;
        for command in &self.commands {
            let current = multiplier.last().copied().unwrap_or(1);
            match command {
                ScriptCommand::Send(payload) if !payload.is_empty() => {
                    total = total.saturating_add(current)
                }
                ScriptCommand::LoopStart { count, .. } => {
                    multiplier.push(current.saturating_mul(u64::from(*count)));
                }
                ScriptCommand::LoopEnd { .. } => {
                    if multiplier.len() > 1 {
                        multiplier.pop();
                    }
                }
                ScriptCommand::Send(_) | ScriptCommand::Delay(_) => {}
            }
        }
        total
    }
}

impl<'a> IntoIterator for &'a CommandSequence {
    type Item = &'a ScriptCommand;
    type IntoIter = std::slice::Iter<'a, ScriptCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

impl FromStr for CommandSequence {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Outcome of [`validate`].
#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub error: Option<ScriptError>,
}

/// Parse script text into a [`CommandSequence`].
///
/// # Errors
///
/// - [`ScriptError::Empty`] for blank input
/// - [`ScriptError::Syntax`] for unknown commands, missing or non-numeric
///   arguments, an END without a LOOP, or LOOPs left open at the end
/// - [`ScriptError::Validation`] for numbers outside their range
///
/// ```
/// use serlink_script::{parse, ScriptCommand};
///
/// let seq = parse("LOOP 2\nSEND \"ping\"\nEND").unwrap();
/// assert_eq!(seq.len(), 3);
/// assert_eq!(seq.commands()[1], ScriptCommand::Send("ping".into()));
/// assert_eq!(seq.total_sends(), 2);
/// ```
pub fn parse(script: &str) -> Result<CommandSequence, ScriptError> {
    if script.trim().is_empty() {
        return Err(ScriptError::Empty);
    }

    let mut commands = Vec::new();
    // (command index, source line) of each LOOP still waiting for its END.
    let mut open_loops: Vec<(usize, usize)> = Vec::new();

    for (i, raw) in script.split('\n').enumerate() {
        let line = i + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        // Keywords are separated from their argument by a space, not a tab.
        let (keyword, arg) = match text.split_once(' ') {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (text, ""),
        };

        let command = match keyword {
            "SEND" => ScriptCommand::Send(parse_send(arg, line)?),
            "DELAY" => ScriptCommand::Delay(parse_delay(arg, line)?),
            "LOOP" => {
                let count = parse_loop_count(arg, line)?;
                open_loops.push((commands.len(), line));
                // Patched once the matching END is seen.
                ScriptCommand::LoopStart { count, end: 0 }
            }
            "END" => {
                if !arg.is_empty() {
                    return Err(syntax(line, format!("END takes no arguments: {text}")));
                }
                let Some((start, _)) = open_loops.pop() else {
                    return Err(syntax(line, "unmatched END (no open LOOP)"));
                };
                let end_index = commands.len();
                if let Some(ScriptCommand::LoopStart { end, .. }) = commands.get_mut(start) {
                    *end = end_index;
                }
                ScriptCommand::LoopEnd { start }
            }
            _ => return Err(syntax(line, format!("unknown command: {text}"))),
        };
        commands.push(command);
    }

    if let Some(&(_, line)) = open_loops.first() {
        return Err(syntax(line, format!("missing {} END", open_loops.len())));
    }

    tracing::debug!(commands = commands.len(), "script parsed");
    Ok(CommandSequence { commands })
}

/// Check a script without keeping the result.
///
/// Never fails: parse errors are returned inside the [`ValidationResult`]
/// so an editor can show live feedback.
pub fn validate(script: &str) -> ValidationResult {
    match parse(script) {
        Ok(_) => ValidationResult {
            valid: true,
            error: None,
        },
        Err(e) => ValidationResult {
            valid: false,
            error: Some(e),
        },
    }
}

fn syntax(line: usize, message: impl Into<String>) -> ScriptError {
    ScriptError::Syntax {
        line,
        message: message.into(),
    }
}

fn out_of_range(line: usize, message: String) -> ScriptError {
    ScriptError::Validation { line, message }
}

fn is_quote(c: char) -> bool {
    c == '"' || c == '\''
}

fn parse_send(arg: &str, line: usize) -> Result<String, ScriptError> {
    if arg.is_empty() {
        return Err(syntax(line, "SEND is missing data"));
    }
    // One quote character is stripped from each end independently.
    let payload = arg.strip_prefix(is_quote).unwrap_or(arg);
    let payload = payload.strip_suffix(is_quote).unwrap_or(payload);
    Ok(payload.to_string())
}

fn parse_number(arg: &str) -> Result<i64, IntErrorKind> {
    arg.parse::<i64>().map_err(|e| e.kind().clone())
}

fn parse_delay(arg: &str, line: usize) -> Result<Duration, ScriptError> {
    let ms = match parse_number(arg) {
        Ok(ms) => ms,
        Err(IntErrorKind::PosOverflow) => {
            return Err(out_of_range(
                line,
                format!("delay too large: {arg}ms (max {MAX_DELAY_MS}ms)"),
            ));
        }
        Err(IntErrorKind::NegOverflow) => {
            return Err(out_of_range(line, format!("delay must not be negative: {arg}")));
        }
        Err(_) => return Err(syntax(line, format!("invalid delay value: {arg:?}"))),
    };
    if ms < 0 {
        return Err(out_of_range(line, format!("delay must not be negative: {ms}")));
    }
    let ms = ms as u64;
    if ms > MAX_DELAY_MS {
        return Err(out_of_range(
            line,
            format!("delay too large: {ms}ms (max {MAX_DELAY_MS}ms)"),
        ));
    }
    Ok(Duration::from_millis(ms))
}

fn parse_loop_count(arg: &str, line: usize) -> Result<u32, ScriptError> {
    let count = match parse_number(arg) {
        Ok(count) => count,
        Err(IntErrorKind::PosOverflow) => {
            return Err(out_of_range(
                line,
                format!("loop count too large: {arg} (max {MAX_LOOP_COUNT})"),
            ));
        }
        Err(IntErrorKind::NegOverflow) => {
            return Err(out_of_range(line, format!("loop count must be at least 1: {arg}")));
        }
        Err(_) => return Err(syntax(line, format!("invalid loop count: {arg:?}"))),
    };
    if count < 1 {
        return Err(out_of_range(line, format!("loop count must be at least 1: {count}")));
    }
    if count > i64::from(MAX_LOOP_COUNT) {
        return Err(out_of_range(
            line,
            format!("loop count too large: {count} (max {MAX_LOOP_COUNT})"),
        ));
    }
    Ok(count as u32)
}
