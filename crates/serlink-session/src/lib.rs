//! serlink-session: owns one open device at a time.
//!
//! A [`TransportSession`] opens a device through a
//! [`DeviceProvider`](serlink_core::DeviceProvider), hands the transport to a
//! single IO task, and records every chunk of traffic in a shared
//! [`LogRing`](serlink_core::LogRing).
//!
//! # Architecture
//!
//! - [`io`] -- the link IO task: one tokio task owns the transport, serves
//!   write requests, and reads inbound data while idle
//! - [`session`] -- connection state machine and the public send/disconnect API
//! - [`builder`] -- fluent construction with IO tuning knobs
//! - [`sink`] -- adapts a session into a script [`PayloadSink`](serlink_script::PayloadSink)
//! - [`runner`] -- one-at-a-time script runs with progress and stop

pub mod builder;
pub mod io;
pub mod runner;
pub mod session;
pub mod sink;

pub use builder::SessionBuilder;
pub use io::IoConfig;
pub use runner::{Progress, ScriptRunner};
pub use session::{ConnectionState, TransportSession};
pub use sink::SessionSink;
