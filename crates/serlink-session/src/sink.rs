//! Script payload sink backed by a session.

use async_trait::async_trait;

use serlink_core::codec::{DataFormat, LineEnding};
use serlink_core::error::Result;
use serlink_script::PayloadSink;

use crate::session::TransportSession;

/// Sends script payloads through a [`TransportSession`].
///
/// Each payload is encoded with the sink's [`DataFormat`] and
/// [`LineEnding`]; a payload that is not valid hex in hex mode fails the
/// SEND with a format error.
#[derive(Debug, Clone, Copy)]
pub struct SessionSink<'a> {
    session: &'a TransportSession,
    format: DataFormat,
    line_ending: LineEnding,
}

impl<'a> SessionSink<'a> {
    pub fn new(session: &'a TransportSession, format: DataFormat) -> Self {
        SessionSink {
            session,
            format,
            line_ending: LineEnding::None,
        }
    }

    pub fn line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }
}

#[async_trait]
impl PayloadSink for SessionSink<'_> {
    async fn send_payload(&self, payload: &str) -> Result<()> {
        self.session
            .send_formatted(payload, self.format, self.line_ending)
            .await
            .map(|_| ())
    }
}
