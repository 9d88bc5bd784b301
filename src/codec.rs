//! Byte framer: classifies the inbound stream into link-layer tokens.
//!
//! [`LinkCodec`] implements [`Decoder`] and [`Encoder`] so a transport can be
//! driven through `tokio_util`'s `Framed` machinery. The transport preserves
//! no message boundaries, so classification works purely on the accumulated
//! buffer:
//!
//! - a leading `ENQ`/`ACK`/`NAK`/`EOT` byte is a control token on its own;
//! - a leading `ETX` is a standalone [`Token::Etx`] (an `ETX` inside a frame
//!   envelope is always mid-buffer, never at a token boundary);
//! - a leading `STX` opens a frame envelope that closes at the first `CR LF`
//!   pair, unless the following byte is not a frame-number digit, in which
//!   case the `STX` stood alone (the network-ack dialect sends it
//!   out-of-band around data frames);
//! - anything else accumulates until a boundary appears or the buffer
//!   ceiling trips.
//!
//! Stray `ACK` bytes observed inside an open frame envelope are dropped:
//! they arise when the peer acknowledges our own transmissions while our
//! receive buffer is open. Tokens are emitted in strict byte-arrival order.
//!
//! Framing faults surface as `io::Error`s of kind `InvalidData` wrapping a
//! [`FramingError`]; the session answers them with `NAK`. Any other error
//! kind is a genuine transport failure.

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    error::FramingError,
    token::{ACK, CR, ETX, LF, STX, Token},
};

/// Ceiling on the classification buffer. A buffer that grows past this
/// without a frame boundary is discarded and reported as an error.
pub const MAX_BUFFER: usize = 64 * 1024;

/// Tokenizing codec for the link layer.
#[derive(Clone, Debug)]
pub struct LinkCodec {
    max_buffer: usize,
}

impl LinkCodec {
    /// Codec with the default buffer ceiling.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_buffer: MAX_BUFFER,
        }
    }

    /// Codec with a custom ceiling, clamped to at least one envelope.
    #[must_use]
    pub fn with_max_buffer(max_buffer: usize) -> Self {
        Self {
            max_buffer: max_buffer.max(crate::frame::ENVELOPE_OVERHEAD),
        }
    }

    fn overflow_check(&self, src: &mut BytesMut) -> io::Result<()> {
        if src.len() > self.max_buffer {
            let len = src.len();
            src.clear();
            return Err(FramingError::Overflow {
                len,
                max: self.max_buffer,
            }
            .into());
        }
        Ok(())
    }
}

impl Default for LinkCodec {
    fn default() -> Self { Self::new() }
}

impl Decoder for LinkCodec {
    type Item = Token;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Token>, io::Error> {
        let Some(&first) = src.first() else {
            return Ok(None);
        };

        if let Some(token) = Token::from_control(first) {
            src.advance(1);
            return Ok(Some(token));
        }
        if first == ETX {
            src.advance(1);
            return Ok(Some(Token::Etx));
        }

        if first == STX {
            // Purge stray ACKs from the open envelope before looking at
            // boundaries; they can land anywhere, including right after STX.
            // Bytes past the closing LF belong to the next token and are
            // left untouched.
            let bound = src
                .iter()
                .position(|&b| b == LF)
                .map_or(src.len(), |i| i + 1);
            if src[1..bound].contains(&ACK) {
                let kept: BytesMut = std::iter::once(STX)
                    .chain(src[1..bound].iter().copied().filter(|&b| b != ACK))
                    .chain(src[bound..].iter().copied())
                    .collect();
                *src = kept;
            }

            let Some(&second) = src.get(1) else {
                return Ok(None);
            };
            if !second.is_ascii_digit() {
                // STX stood alone; the next byte starts something else.
                src.advance(1);
                return Ok(Some(Token::Stx));
            }

            let Some(lf_at) = src.iter().position(|&b| b == LF) else {
                self.overflow_check(src)?;
                return Ok(None);
            };
            if lf_at == 0 || src[lf_at - 1] != CR {
                src.advance(lf_at + 1);
                return Err(FramingError::BareLineFeed.into());
            }
            let frame: Bytes = src.split_to(lf_at + 1).freeze();
            return Ok(Some(Token::Data(frame)));
        }

        // Unrecognised leading byte: keep accumulating. It never forms a
        // token, so the ceiling is the only way out.
        self.overflow_check(src)?;
        Ok(None)
    }

    /// Partial bytes left at end-of-stream are dropped without error; the
    /// session reports the close itself.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Token>, io::Error> {
        match self.decode(src)? {
            Some(token) => Ok(Some(token)),
            None => {
                src.clear();
                Ok(None)
            }
        }
    }
}

impl Encoder<Token> for LinkCodec {
    type Error = io::Error;

    fn encode(&mut self, token: Token, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.extend_from_slice(&token.as_wire_bytes());
        Ok(())
    }
}
