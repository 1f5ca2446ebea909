//! # serlink -- scripted serial links
//!
//! `serlink` is an asynchronous toolkit for talking to devices over a serial
//! line: send text or hex, watch what comes back, and replay short scripts
//! of SEND / DELAY / LOOP commands against the device.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use serlink::{DataFormat, SerialConfig, TransportSession};
//! use serlink::serial::SerialPortProvider;
//!
//! #[tokio::main]
//! async fn main() -> serlink::Result<()> {
//!     let session = TransportSession::new(Arc::new(SerialPortProvider::with_port("/dev/ttyUSB0")));
//!     session.connect(SerialConfig::default()).await?;
//!     session.send(b"AT\r\n").await?;
//!
//!     println!("{}", session.log().export(DataFormat::Text));
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                  | Purpose                                             |
//! |------------------------|-----------------------------------------------------|
//! | `serlink-core`         | Transport traits, config, codecs, log ring, errors  |
//! | `serlink-script`       | Script parser, validator, and executor              |
//! | `serlink-session`      | Transport session, IO task, script runner           |
//! | `serlink-transport`    | Serial port transport and device provider           |
//! | **`serlink`**          | This facade crate -- re-exports everything          |
//!
//! ## Feature Flags
//!
//! | Feature  | Enables                                    | Default |
//! |----------|--------------------------------------------|---------|
//! | `serial` | [`serial`] module (tokio-serial transport) | yes     |
//!
//! ## Running a Script
//!
//! ```no_run
//! use std::sync::Arc;
//! use serlink::{DataFormat, ScriptRunner, TransportSession};
//! # async fn example(session: Arc<TransportSession>) -> Result<(), serlink::ScriptError> {
//! let runner = ScriptRunner::new(session);
//! let summary = runner
//!     .run("LOOP 3\nSEND ping\nDELAY 500\nEND", DataFormat::Text)
//!     .await?;
//! println!("{} payloads sent", summary.sends);
//! # Ok(())
//! # }
//! ```

pub use serlink_core::*;

pub use serlink_script::{
    CommandSequence, ExecutionSummary, Executor, PayloadSink, ScriptCommand, ScriptError,
    ValidationResult,
};
pub use serlink_session::{
    ConnectionState, Progress, ScriptRunner, SessionBuilder, SessionSink, TransportSession,
};

/// Script language: parsing, validation, and execution.
pub mod script {
    pub use serlink_script::*;
}

/// Transport session and script runner.
pub mod session {
    pub use serlink_session::*;
}

/// Serial port transport.
///
/// Provides [`SerialTransport`](serial::SerialTransport) and
/// [`SerialPortProvider`](serial::SerialPortProvider) on top of
/// `tokio-serial`.
#[cfg(feature = "serial")]
pub mod serial {
    pub use serlink_transport::*;
}
