//! Observer seam for link traffic and session state.
//!
//! The session reports everything observable through an [`EventSink`]:
//! classified inbound bytes, decoded records, written bytes, and state
//! transitions. The core never assumes who is listening; a UI, a tracing
//! bridge, and the recording sink used by tests all fit the same interface.
//! All methods default to no-ops so implementors override only what they
//! watch.

use crate::{record::Record, session::LinkState};

/// A session state transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusChange {
    pub from: LinkState,
    pub to: LinkState,
}

/// Receiver of link-layer events.
pub trait EventSink: Send {
    /// Inbound bytes, as classified by the framer.
    fn on_raw(&mut self, _bytes: &[u8]) {}

    /// A record decoded from a completed message.
    fn on_decoded(&mut self, _record: &Record) {}

    /// Bytes handed to the write side of the transport.
    fn on_sent(&mut self, _bytes: &[u8]) {}

    /// The session moved between `Idle`, `Receiving`, and `Sending`.
    fn on_status(&mut self, _change: StatusChange) {}
}

/// Sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {}

/// Sink that records everything, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub raw: Vec<Vec<u8>>,
    pub decoded: Vec<Record>,
    pub sent: Vec<Vec<u8>>,
    pub status: Vec<StatusChange>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self { Self::default() }
}

impl EventSink for RecordingSink {
    fn on_raw(&mut self, bytes: &[u8]) { self.raw.push(bytes.to_vec()); }

    fn on_decoded(&mut self, record: &Record) { self.decoded.push(record.clone()); }

    fn on_sent(&mut self, bytes: &[u8]) { self.sent.push(bytes.to_vec()); }

    fn on_status(&mut self, change: StatusChange) { self.status.push(change); }
}
