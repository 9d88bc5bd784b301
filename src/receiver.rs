//! Receive-side state machine.
//!
//! The receiver is sans-IO: it consumes classified tokens and returns the
//! actions the session must perform (reply with a control token, deliver a
//! completed body, abort the transfer). Routing decisions that depend on the
//! whole session, such as whether an `ENQ` may open a transfer at all, stay with
//! the session controller; the receiver only tracks the inbound transfer
//! itself.

use log::{debug, warn};

use crate::{error::FramingError, frame, token::Token};

/// Consecutive checksum mismatches tolerated before the transfer is
/// abandoned. Other framing faults are answered `NAK` indefinitely.
const MAX_CHECKSUM_FAILURES: u8 = 3;

/// Action requested of the session controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReceiveAction {
    /// Write this token to the peer.
    Reply(Token),
    /// Hand a completed message body to the record parser.
    Deliver(Vec<u8>),
    /// Abandon the transfer: the session sends `EOT` and returns to idle.
    Abort,
}

/// Inbound transfer tracker.
///
/// Created idle; [`Receiver::accept_enq`] opens a transfer once the session
/// has established that the line is free.
#[derive(Debug)]
pub struct Receiver {
    receiving: bool,
    body: Vec<u8>,
    checksum_streak: u8,
    network_ack: bool,
}

impl Receiver {
    #[must_use]
    pub fn new(network_ack: bool) -> Self {
        Self {
            receiving: false,
            body: Vec::new(),
            checksum_streak: 0,
            network_ack,
        }
    }

    /// `true` while an inbound transfer is open.
    #[must_use]
    pub fn is_receiving(&self) -> bool { self.receiving }

    /// Open a transfer for an `ENQ` the session has accepted.
    pub fn accept_enq(&mut self) -> Vec<ReceiveAction> {
        self.receiving = true;
        self.body.clear();
        self.checksum_streak = 0;
        vec![ReceiveAction::Reply(Token::Ack)]
    }

    /// Process a token while receiving.
    pub fn on_token(&mut self, token: Token) -> Vec<ReceiveAction> {
        debug_assert!(self.receiving, "token routed to an idle receiver");
        match token {
            // Re-enquiry inside an open transfer is acknowledged again.
            Token::Enq => vec![ReceiveAction::Reply(Token::Ack)],
            Token::Stx | Token::Etx => {
                if self.network_ack {
                    vec![ReceiveAction::Reply(Token::Ack)]
                } else {
                    Vec::new()
                }
            }
            // Stray acknowledgements carry no meaning on the receive side.
            Token::Ack | Token::Nak => Vec::new(),
            Token::Data(bytes) => self.on_frame(&bytes),
            Token::Eot => self.on_eot(),
        }
    }

    /// Answer a framing fault reported by the byte classifier.
    ///
    /// The reply is a plain `NAK`; the transfer stays open and nothing
    /// escalates. Only checksum mismatches on otherwise well-formed frames
    /// count toward abandoning the transfer.
    pub fn on_bad_frame(&mut self) -> Vec<ReceiveAction> {
        vec![ReceiveAction::Reply(Token::Nak)]
    }

    /// Drop all transfer state.
    pub fn reset(&mut self) {
        self.receiving = false;
        self.body.clear();
        self.checksum_streak = 0;
    }

    fn on_frame(&mut self, bytes: &[u8]) -> Vec<ReceiveAction> {
        match frame::parse(bytes) {
            Ok(parsed) => {
                self.checksum_streak = 0;
                self.body.extend_from_slice(&parsed.payload);
                vec![ReceiveAction::Reply(Token::Ack)]
            }
            Err(err @ FramingError::ChecksumMismatch { .. }) => {
                debug!("rejecting frame: {err}");
                self.checksum_streak += 1;
                if self.checksum_streak >= MAX_CHECKSUM_FAILURES {
                    warn!(
                        "abandoning inbound transfer after {} consecutive checksum mismatches",
                        self.checksum_streak
                    );
                    self.reset();
                    return vec![ReceiveAction::Reply(Token::Nak), ReceiveAction::Abort];
                }
                vec![ReceiveAction::Reply(Token::Nak)]
            }
            Err(err) => {
                debug!("rejecting frame: {err}");
                self.on_bad_frame()
            }
        }
    }

    fn on_eot(&mut self) -> Vec<ReceiveAction> {
        let body = std::mem::take(&mut self.body);
        self.receiving = false;
        self.checksum_streak = 0;
        if body.is_empty() {
            vec![ReceiveAction::Reply(Token::Ack)]
        } else {
            vec![ReceiveAction::Reply(Token::Ack), ReceiveAction::Deliver(body)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame;

    fn data(number: u8, payload: &[u8]) -> Token { Token::Data(frame::build(number, payload)) }

    #[test]
    fn enq_opens_a_transfer_and_is_acked() {
        let mut receiver = Receiver::new(false);
        assert_eq!(receiver.accept_enq(), vec![ReceiveAction::Reply(Token::Ack)]);
        assert!(receiver.is_receiving());
    }

    #[test]
    fn frames_accumulate_and_eot_delivers_the_body() {
        let mut receiver = Receiver::new(false);
        receiver.accept_enq();
        assert_eq!(
            receiver.on_token(data(1, b"O|1|LAB99||^^^GLU|R\r")),
            vec![ReceiveAction::Reply(Token::Ack)]
        );
        assert_eq!(
            receiver.on_token(data(2, b"R|1|^^^GLU|5.3\r")),
            vec![ReceiveAction::Reply(Token::Ack)]
        );
        assert_eq!(receiver.on_token(Token::Eot), vec![
            ReceiveAction::Reply(Token::Ack),
            ReceiveAction::Deliver(b"O|1|LAB99||^^^GLU|R\rR|1|^^^GLU|5.3\r".to_vec()),
        ]);
        assert!(!receiver.is_receiving());
    }

    #[test]
    fn eot_with_empty_body_acks_without_delivery() {
        let mut receiver = Receiver::new(false);
        receiver.accept_enq();
        assert_eq!(receiver.on_token(Token::Eot), vec![ReceiveAction::Reply(
            Token::Ack
        )]);
    }

    #[test]
    fn corrupt_frame_is_nakked_and_a_retransmission_is_accepted() {
        let mut receiver = Receiver::new(false);
        receiver.accept_enq();

        let mut corrupted = frame::build(1, b"P|1\r").to_vec();
        let len = corrupted.len();
        corrupted[len - 4] = b'0';
        corrupted[len - 3] = b'0';
        assert_eq!(
            receiver.on_token(Token::Data(corrupted.into())),
            vec![ReceiveAction::Reply(Token::Nak)]
        );

        assert_eq!(
            receiver.on_token(data(1, b"P|1\r")),
            vec![ReceiveAction::Reply(Token::Ack)]
        );
        assert_eq!(receiver.on_token(Token::Eot), vec![
            ReceiveAction::Reply(Token::Ack),
            ReceiveAction::Deliver(b"P|1\r".to_vec()),
        ]);
    }

    #[test]
    fn third_consecutive_checksum_mismatch_aborts_the_transfer() {
        let mut receiver = Receiver::new(false);
        receiver.accept_enq();
        let mut corrupted = frame::build(1, b"P|1\r").to_vec();
        let len = corrupted.len();
        corrupted[len - 4] = b'0';
        corrupted[len - 3] = b'0';

        for _ in 0..2 {
            assert_eq!(
                receiver.on_token(Token::Data(corrupted.clone().into())),
                vec![ReceiveAction::Reply(Token::Nak)]
            );
        }
        assert_eq!(receiver.on_token(Token::Data(corrupted.into())), vec![
            ReceiveAction::Reply(Token::Nak),
            ReceiveAction::Abort,
        ]);
        assert!(!receiver.is_receiving());
    }

    #[test]
    fn structural_faults_are_nakked_without_ever_aborting() {
        let mut receiver = Receiver::new(false);
        receiver.accept_enq();

        // Missing ETX-checksum block: rejected as truncated, not mismatched.
        let truncated = b"\x021P|1\r\r\n".to_vec();
        for _ in 0..4 {
            assert_eq!(
                receiver.on_token(Token::Data(truncated.clone().into())),
                vec![ReceiveAction::Reply(Token::Nak)]
            );
        }
        assert!(receiver.is_receiving());

        // Classifier-level faults behave the same way.
        for _ in 0..4 {
            assert_eq!(receiver.on_bad_frame(), vec![ReceiveAction::Reply(
                Token::Nak
            )]);
        }
        assert!(receiver.is_receiving());

        // The transfer still completes once a good frame arrives.
        assert_eq!(
            receiver.on_token(data(1, b"P|1\r")),
            vec![ReceiveAction::Reply(Token::Ack)]
        );
        assert_eq!(receiver.on_token(Token::Eot), vec![
            ReceiveAction::Reply(Token::Ack),
            ReceiveAction::Deliver(b"P|1\r".to_vec()),
        ]);
    }

    #[test]
    fn structural_faults_do_not_feed_the_checksum_streak() {
        let mut receiver = Receiver::new(false);
        receiver.accept_enq();
        let mut corrupted = frame::build(1, b"P|1\r").to_vec();
        let len = corrupted.len();
        corrupted[len - 4] = b'0';
        corrupted[len - 3] = b'0';
        let truncated = b"\x021P|1\r\r\n".to_vec();

        receiver.on_token(Token::Data(corrupted.clone().into()));
        receiver.on_token(Token::Data(corrupted.clone().into()));
        receiver.on_token(Token::Data(truncated.into()));
        assert!(receiver.is_receiving(), "truncation must not abort");
        // The truncation neither cleared nor advanced the mismatch count;
        // the third mismatch spends the budget.
        assert_eq!(
            receiver.on_token(Token::Data(corrupted.into())),
            vec![ReceiveAction::Reply(Token::Nak), ReceiveAction::Abort]
        );
    }

    #[test]
    fn good_frame_resets_the_checksum_streak() {
        let mut receiver = Receiver::new(false);
        receiver.accept_enq();
        let mut corrupted = frame::build(1, b"P|1\r").to_vec();
        let len = corrupted.len();
        corrupted[len - 4] = b'0';
        corrupted[len - 3] = b'0';

        receiver.on_token(Token::Data(corrupted.clone().into()));
        receiver.on_token(Token::Data(corrupted.clone().into()));
        receiver.on_token(data(1, b"P|1\r"));
        // Streak cleared: two more failures stay below the budget.
        assert_eq!(
            receiver.on_token(Token::Data(corrupted.clone().into())),
            vec![ReceiveAction::Reply(Token::Nak)]
        );
        assert_eq!(
            receiver.on_token(Token::Data(corrupted.into())),
            vec![ReceiveAction::Reply(Token::Nak)]
        );
        assert!(receiver.is_receiving());
    }

    #[test]
    fn standalone_stx_etx_are_acked_only_in_the_network_dialect() {
        let mut serial = Receiver::new(false);
        serial.accept_enq();
        assert!(serial.on_token(Token::Stx).is_empty());
        assert!(serial.on_token(Token::Etx).is_empty());

        let mut network = Receiver::new(true);
        network.accept_enq();
        assert_eq!(network.on_token(Token::Stx), vec![ReceiveAction::Reply(
            Token::Ack
        )]);
        assert_eq!(network.on_token(Token::Etx), vec![ReceiveAction::Reply(
            Token::Ack
        )]);
    }

    #[test]
    fn renewed_enq_inside_a_transfer_is_acked_and_preserves_the_body() {
        let mut receiver = Receiver::new(false);
        receiver.accept_enq();
        receiver.on_token(data(1, b"P|1\r"));
        assert_eq!(receiver.on_token(Token::Enq), vec![ReceiveAction::Reply(
            Token::Ack
        )]);
        assert_eq!(receiver.on_token(Token::Eot), vec![
            ReceiveAction::Reply(Token::Ack),
            ReceiveAction::Deliver(b"P|1\r".to_vec()),
        ]);
    }
}
