//! Error types for the link layer.
//!
//! The taxonomy separates wire-level framing faults, which are recoverable by
//! replying `NAK` and restarting the affected frame, from session-level
//! failures (transport loss, protocol timeouts), which tear the session down
//! to `Idle` and surface to the caller for a reconnect.

use std::io;

use thiserror::Error;

use crate::store::StoreError;

/// Wire-level faults detected while classifying inbound bytes or unpacking a
/// frame envelope.
///
/// Framing errors never terminate the session. The receive side answers
/// `NAK`, drops the offending bytes, and waits for a retransmission.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The classification buffer grew past the permitted maximum without a
    /// frame boundary appearing.
    #[error("frame buffer overflow: {len} bytes without a boundary (max {max})")]
    Overflow {
        /// Bytes accumulated when the limit was hit.
        len: usize,
        /// Configured buffer ceiling.
        max: usize,
    },

    /// A `LF` arrived without the preceding `CR` that closes a frame.
    #[error("bare LF without preceding CR")]
    BareLineFeed,

    /// The frame envelope is structurally incomplete: missing `STX` prefix,
    /// `ETX`-checksum block, or `CR LF` suffix.
    #[error("truncated frame envelope: {reason}")]
    Truncated {
        /// Which part of the envelope was missing.
        reason: &'static str,
    },

    /// The frame-number position did not hold an ASCII digit.
    #[error("invalid frame number byte {byte:#04x}")]
    BadFrameNumber {
        /// Offending byte.
        byte: u8,
    },

    /// The recomputed checksum does not match the trailing hex pair.
    #[error("frame checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        /// Checksum carried by the frame.
        expected: u8,
        /// Checksum recomputed over the received bytes.
        actual: u8,
    },
}

impl From<FramingError> for io::Error {
    fn from(err: FramingError) -> Self { io::Error::new(io::ErrorKind::InvalidData, err) }
}

/// Top-level error for a running session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LinkError {
    /// The transport reached end-of-stream or failed; the caller may open a
    /// fresh transport and start a new session.
    #[error("transport closed")]
    TransportClosed,

    /// An I/O fault other than a clean close.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No protocol progress within the allotted window.
    #[error("protocol timeout while {phase}")]
    Timeout {
        /// Human-readable phase description (`"receiving"`, `"awaiting ACK"`).
        phase: &'static str,
    },

    /// The persistence collaborator rejected an operation.
    ///
    /// Reading inserts are best-effort: the session logs those and keeps
    /// running, so this variant only surfaces from order fetches.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result alias used throughout the session layer.
pub type Result<T> = std::result::Result<T, LinkError>;
