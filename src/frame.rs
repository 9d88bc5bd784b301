//! Frame envelope encoding and decoding.
//!
//! A frame wraps one record payload for transmission:
//! `STX` `n` *payload* `ETX` *cc* `CR` `LF`, where `n` is a single ASCII
//! frame-number digit and *cc* two uppercase hex checksum digits. The
//! payload carries its own terminating `CR`, so records concatenate into a
//! `CR`-separated message body as frames are unpacked.
//!
//! The checksum is the low eight bits of the sum of every byte after `STX`
//! up to and including `ETX`, excluding the checksum digits themselves.
//! Strict E1394 sums a slightly different range; the deployed instrument
//! population expects this one, so wire compatibility wins.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    error::FramingError,
    token::{CR, ETX, LF, STX},
};

/// Envelope overhead around a payload: `STX` + number digit before, `ETX` +
/// two checksum digits + `CR` + `LF` after.
pub const ENVELOPE_OVERHEAD: usize = 7;

/// Smallest structurally valid frame: overhead around an empty payload.
const MIN_FRAME_LEN: usize = ENVELOPE_OVERHEAD;

/// Modulo-256 sum over `bytes`.
///
/// Callers pass the span from the byte after `STX` through `ETX` inclusive.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Cyclic frame-number generator: `1, 2, …, 7, 1, …`.
///
/// Numbers are single ASCII digits on the wire. The wrap at seven is strict
/// in both dialects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameNumber(u8);

impl FrameNumber {
    /// Start a fresh sequence at `1`.
    #[must_use]
    pub fn new() -> Self { Self(1) }

    /// Return the number to stamp on the next frame and advance the cycle.
    pub fn next(&mut self) -> u8 {
        let current = self.0;
        self.0 = if current == 7 { 1 } else { current + 1 };
        current
    }
}

impl Default for FrameNumber {
    fn default() -> Self { Self::new() }
}

/// A frame unpacked from its envelope with the checksum verified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedFrame {
    /// Frame number digit, `1`..=`7` as a numeric value.
    pub number: u8,
    /// Record payload including its terminating `CR`.
    pub payload: Bytes,
}

/// Wrap `payload` in a frame envelope stamped with `number`.
///
/// `payload` must already end with its record-terminating `CR`; the builder
/// adds only the envelope.
#[must_use]
pub fn build(number: u8, payload: &[u8]) -> Bytes {
    debug_assert!((1..=7).contains(&number), "frame number out of range");

    let mut frame = BytesMut::with_capacity(payload.len() + ENVELOPE_OVERHEAD);
    frame.put_u8(STX);
    frame.put_u8(b'0' + number);
    frame.put_slice(payload);
    frame.put_u8(ETX);
    // Checksum covers everything after STX through ETX inclusive.
    let sum = checksum(&frame[1..]);
    frame.put_slice(format!("{sum:02X}").as_bytes());
    frame.put_u8(CR);
    frame.put_u8(LF);
    frame.freeze()
}

/// Unpack a frame envelope, verifying structure and checksum.
///
/// # Errors
///
/// Returns [`FramingError::Truncated`] when the envelope is structurally
/// incomplete, [`FramingError::BadFrameNumber`] when the number position is
/// not a digit, and [`FramingError::ChecksumMismatch`] when the trailing hex
/// pair disagrees with the recomputed sum.
pub fn parse(frame: &[u8]) -> Result<ParsedFrame, FramingError> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(FramingError::Truncated {
            reason: "shorter than minimum envelope",
        });
    }
    if frame[0] != STX {
        return Err(FramingError::Truncated {
            reason: "missing STX prefix",
        });
    }
    if frame[frame.len() - 2] != CR || frame[frame.len() - 1] != LF {
        return Err(FramingError::Truncated {
            reason: "missing CR LF suffix",
        });
    }
    let etx_at = frame.len() - 5;
    if frame[etx_at] != ETX {
        return Err(FramingError::Truncated {
            reason: "missing ETX-checksum block",
        });
    }

    let number_byte = frame[1];
    if !number_byte.is_ascii_digit() {
        return Err(FramingError::BadFrameNumber { byte: number_byte });
    }

    let carried =
        parse_hex_pair(&frame[etx_at + 1..etx_at + 3]).ok_or(FramingError::Truncated {
            reason: "checksum digits not hex",
        })?;
    let computed = checksum(&frame[1..=etx_at]);
    if carried != computed {
        return Err(FramingError::ChecksumMismatch {
            expected: carried,
            actual: computed,
        });
    }

    Ok(ParsedFrame {
        number: number_byte - b'0',
        payload: Bytes::copy_from_slice(&frame[2..etx_at]),
    })
}

fn parse_hex_pair(digits: &[u8]) -> Option<u8> {
    let hi = (digits[0] as char).to_digit(16)?;
    let lo = (digits[1] as char).to_digit(16)?;
    Some(((hi << 4) | lo) as u8)
}
