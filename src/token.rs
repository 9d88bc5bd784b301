//! Link-layer control bytes and the token vocabulary.
//!
//! The framer reduces the inbound byte stream to a sequence of [`Token`]s.
//! Control tokens carry no payload; a [`Token::Data`] holds one complete
//! frame envelope, `STX` through `LF`, exactly as it arrived.

use bytes::Bytes;

/// Enquiry: the peer requests the line to start a transfer.
pub const ENQ: u8 = 0x05;
/// Positive acknowledgement.
pub const ACK: u8 = 0x06;
/// Negative acknowledgement.
pub const NAK: u8 = 0x15;
/// Start of a frame envelope.
pub const STX: u8 = 0x02;
/// End of frame text, precedes the checksum digits.
pub const ETX: u8 = 0x03;
/// End of transmission: closes a message in either direction.
pub const EOT: u8 = 0x04;
/// Record terminator inside a message body.
pub const CR: u8 = 0x0d;
/// Final byte of a frame envelope.
pub const LF: u8 = 0x0a;

/// One unit of link-layer traffic as classified by the framer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Enq,
    Ack,
    Nak,
    Eot,
    /// Standalone `STX` control byte, seen out-of-band around data frames in
    /// the network-ack dialect.
    Stx,
    /// Standalone `ETX` control byte, same dialect.
    Etx,
    /// A complete frame envelope, `STX` first byte through `LF` last byte.
    Data(Bytes),
}

impl Token {
    /// Classify a single-byte control character.
    ///
    /// `STX` and `ETX` are excluded: a lone `STX` opens a frame envelope and
    /// the framer decides its meaning from the following byte, while `ETX`
    /// only stands alone at a token boundary.
    #[must_use]
    pub fn from_control(byte: u8) -> Option<Self> {
        match byte {
            ENQ => Some(Self::Enq),
            ACK => Some(Self::Ack),
            NAK => Some(Self::Nak),
            EOT => Some(Self::Eot),
            _ => None,
        }
    }

    /// The bytes this token occupies on the wire.
    #[must_use]
    pub fn as_wire_bytes(&self) -> Bytes {
        match self {
            Self::Enq => Bytes::from_static(&[ENQ]),
            Self::Ack => Bytes::from_static(&[ACK]),
            Self::Nak => Bytes::from_static(&[NAK]),
            Self::Eot => Bytes::from_static(&[EOT]),
            Self::Stx => Bytes::from_static(&[STX]),
            Self::Etx => Bytes::from_static(&[ETX]),
            Self::Data(frame) => frame.clone(),
        }
    }
}
