//! serlink-script: the SEND/DELAY/LOOP scripting language.
//!
//! Scripts are plain text, one command per line:
//!
//! ```text
//! # reset, then poll three times
//! SEND "ATZ"
//! DELAY 500
//! LOOP 3
//!     SEND "AT+CSQ"
//!     DELAY 1000
//! END
//! ```
//!
//! Keywords are case-sensitive. Blank lines and lines starting with `#` are
//! ignored. `DELAY` takes milliseconds (at most 60000) and `LOOP` takes an
//! iteration count between 1 and 10000. Loops nest.
//!
//! # Architecture
//!
//! - [`parser`] -- turns script text into a validated [`CommandSequence`]
//! - [`executor`] -- walks a sequence against a [`PayloadSink`], with
//!   progress reporting, cooperative cancellation and a runaway guard
//! - [`error`] -- [`ScriptError`], tagged with a line or a command index

pub mod error;
pub mod executor;
pub mod parser;

pub use error::ScriptError;
pub use executor::{DEFAULT_MAX_STEPS, ExecutionSummary, Executor, PayloadSink, execute};
pub use parser::{
    CommandSequence, MAX_DELAY_MS, MAX_LOOP_COUNT, ScriptCommand, ValidationResult, parse,
    validate,
};
