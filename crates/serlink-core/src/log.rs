//! Bounded traffic log.
//!
//! Every byte chunk written to or read from the device is recorded as a
//! [`LogEntry`] in a [`LogRing`]. The ring keeps the most recent
//! [`DEFAULT_LOG_CAPACITY`] entries; older ones are evicted. Entries are
//! never modified after they are appended.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use chrono::{DateTime, Local};

use crate::codec::{self, DataFormat};

/// Number of entries retained by [`LogRing::new`].
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Which way a chunk of bytes travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Written to the device.
    Sent,
    /// Read from the device.
    Received,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Sent => write!(f, "sent"),
            Direction::Received => write!(f, "received"),
        }
    }
}

/// One recorded chunk of traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Monotonic id, unique within the ring that created it.
    pub id: u64,
    /// Wall-clock time the producing operation completed.
    pub timestamp: DateTime<Local>,
    pub direction: Direction,
    /// Raw bytes exactly as written or read.
    pub data: Bytes,
    /// Best-effort decoded text (see [`codec::bytes_to_text`]).
    pub display_text: String,
}

impl LogEntry {
    /// Render as `[HH:MM:SS.mmm] direction: data`.
    pub fn render(&self, format: DataFormat) -> String {
        let data = match format {
            DataFormat::Text => self.display_text.clone(),
            DataFormat::Hex => codec::bytes_to_hex(&self.data),
        };
        format!(
            "[{}] {}: {}",
            codec::format_timestamp(&self.timestamp),
            self.direction,
            data
        )
    }
}

#[derive(Debug)]
struct Inner {
    entries: VecDeque<LogEntry>,
    next_id: u64,
}

/// Bounded, append-only ring of [`LogEntry`] values.
///
/// `append` is the only mutation of existing contents; it is safe to call
/// from the read loop and from send completion concurrently.
#[derive(Debug)]
pub struct LogRing {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl LogRing {
    /// Create a ring holding at most [`DEFAULT_LOG_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// Create a ring holding at most `capacity` entries (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity),
                next_id: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Entries are only ever pushed and popped whole, so a poisoned
        // guard still holds a consistent ring.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a new entry, evicting the oldest when full. Returns a copy of
    /// the stored entry.
    pub fn append(&self, direction: Direction, data: Bytes) -> LogEntry {
        let display_text = codec::bytes_to_text(&data);
        let mut inner = self.lock();
        let entry = LogEntry {
            id: inner.next_id,
            timestamp: Local::now(),
            direction,
            data,
            display_text,
        };
        inner.next_id += 1;
        if inner.entries.len() == self.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(entry.clone());
        entry
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry. Ids keep increasing afterwards.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Render every entry with [`LogEntry::render`], one per line.
    pub fn export(&self, format: DataFormat) -> String {
        self.lock()
            .entries
            .iter()
            .map(|entry| entry.render(format))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_increasing_ids() {
        let ring = LogRing::new();
        let a = ring.append(Direction::Sent, Bytes::from_static(b"A"));
        let b = ring.append(Direction::Received, Bytes::from_static(b"B"));
        assert_eq!(a.id, 0);
        assert_eq!(b.id, 1);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn append_decodes_display_text() {
        let ring = LogRing::new();
        let entry = ring.append(Direction::Received, Bytes::from_static(&[0x01, 0x02]));
        assert_eq!(entry.display_text, "01 02");

        let entry = ring.append(Direction::Received, Bytes::from_static(b"OK"));
        assert_eq!(entry.display_text, "OK");
    }

    #[test]
    fn ring_never_exceeds_capacity() {
        let ring = LogRing::new();
        for i in 0..1001u32 {
            ring.append(Direction::Received, Bytes::from(i.to_be_bytes().to_vec()));
        }
        assert_eq!(ring.len(), DEFAULT_LOG_CAPACITY);

        let entries = ring.snapshot();
        // Entry 0 was evicted; entry 1000 is the newest.
        assert_eq!(entries.first().unwrap().id, 1);
        assert_eq!(entries.last().unwrap().id, 1000);
        assert!(entries.iter().all(|e| e.id != 0));
    }

    #[test]
    fn small_capacity_evicts_oldest() {
        let ring = LogRing::with_capacity(2);
        ring.append(Direction::Sent, Bytes::from_static(b"1"));
        ring.append(Direction::Sent, Bytes::from_static(b"2"));
        ring.append(Direction::Sent, Bytes::from_static(b"3"));
        let texts: Vec<_> = ring.snapshot().into_iter().map(|e| e.display_text).collect();
        assert_eq!(texts, vec!["2", "3"]);
    }

    #[test]
    fn clear_keeps_id_sequence() {
        let ring = LogRing::new();
        ring.append(Direction::Sent, Bytes::from_static(b"x"));
        ring.clear();
        assert!(ring.is_empty());
        let entry = ring.append(Direction::Sent, Bytes::from_static(b"y"));
        assert_eq!(entry.id, 1);
    }

    #[test]
    fn render_line_format() {
        let ring = LogRing::new();
        let entry = ring.append(Direction::Sent, Bytes::from_static(b"AT"));
        let line = entry.render(DataFormat::Text);
        assert!(line.starts_with('['));
        assert!(line.ends_with("] sent: AT"), "got {line}");

        let line = entry.render(DataFormat::Hex);
        assert!(line.ends_with("] sent: 41 54"), "got {line}");
    }

    #[test]
    fn export_joins_lines_in_order() {
        let ring = LogRing::new();
        ring.append(Direction::Sent, Bytes::from_static(b"AT"));
        ring.append(Direction::Received, Bytes::from_static(b"OK"));
        let exported = ring.export(DataFormat::Text);
        let lines: Vec<_> = exported.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("sent: AT"));
        assert!(lines[1].ends_with("received: OK"));
    }

    #[test]
    fn capacity_has_floor_of_one() {
        assert_eq!(LogRing::with_capacity(0).capacity(), 1);
    }
}
