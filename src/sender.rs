//! Send-side state machine.
//!
//! Transmission is strictly acknowledgement-gated: `ENQ`, each data frame,
//! and (in the network-ack dialect) the standalone `STX`/`ETX` controls all
//! wait for a discrete `ACK` before the next unit goes out. Any other token
//! in a wait state aborts the transfer with a single `EOT`.
//!
//! Like the receiver, the sender is sans-IO: it returns [`SendAction`]s and
//! the session performs the writes and owns the acknowledgement timer.

use log::{debug, warn};

use crate::{
    frame::{self, FrameNumber},
    token::Token,
};

/// Action requested of the session controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendAction {
    /// Nothing to do (token ignored).
    Continue,
    /// Write this token and keep waiting for acknowledgements.
    Write(Token),
    /// Transfer complete: write `EOT` and return to idle.
    Finish,
    /// Transfer failed: write `EOT`, discard the message, return to idle.
    Abort,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    WaitEnqAck,
    WaitStxAck,
    WaitFrameAck,
    WaitEtxAck,
}

/// Outbound transfer driver.
#[derive(Debug)]
pub struct Sender {
    phase: Phase,
    /// Frame payloads in transmission order, each carrying its record's
    /// terminating `CR`.
    payloads: Vec<Vec<u8>>,
    next_index: usize,
    number: FrameNumber,
    network_ack: bool,
}

impl Sender {
    #[must_use]
    pub fn new(network_ack: bool) -> Self {
        Self {
            phase: Phase::Idle,
            payloads: Vec::new(),
            next_index: 0,
            number: FrameNumber::new(),
            network_ack,
        }
    }

    /// `true` while an outbound transfer is in progress.
    #[must_use]
    pub fn is_sending(&self) -> bool { self.phase != Phase::Idle }

    /// Begin transmitting `payloads`; the returned action writes `ENQ`.
    pub fn start(&mut self, payloads: Vec<Vec<u8>>) -> SendAction {
        debug_assert!(!self.is_sending(), "start while a transfer is active");
        self.payloads = payloads;
        self.next_index = 0;
        self.number = FrameNumber::new();
        self.phase = Phase::WaitEnqAck;
        SendAction::Write(Token::Enq)
    }

    /// Process a token while a transfer is active.
    pub fn on_token(&mut self, token: &Token) -> SendAction {
        if self.phase == Phase::Idle {
            return SendAction::Continue;
        }
        if *token != Token::Ack {
            warn!("peer answered {token:?} in {:?}; aborting send", self.phase);
            return self.abort();
        }
        match self.phase {
            Phase::Idle => SendAction::Continue,
            Phase::WaitEnqAck => {
                if self.network_ack {
                    self.phase = Phase::WaitStxAck;
                    SendAction::Write(Token::Stx)
                } else {
                    self.advance()
                }
            }
            Phase::WaitStxAck => self.advance(),
            Phase::WaitFrameAck => {
                if self.next_index < self.payloads.len() {
                    self.advance()
                } else if self.network_ack {
                    self.phase = Phase::WaitEtxAck;
                    SendAction::Write(Token::Etx)
                } else {
                    self.finish()
                }
            }
            Phase::WaitEtxAck => self.finish(),
        }
    }

    /// The session's acknowledgement timer fired.
    pub fn on_timeout(&mut self) -> SendAction {
        if self.phase == Phase::Idle {
            return SendAction::Continue;
        }
        warn!("no acknowledgement in {:?}; aborting send", self.phase);
        self.abort()
    }

    /// Drop all transfer state without emitting anything.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.payloads.clear();
        self.next_index = 0;
    }

    fn advance(&mut self) -> SendAction {
        let Some(payload) = self.payloads.get(self.next_index) else {
            // Nothing to transmit: an empty message closes immediately.
            return self.finish();
        };
        let built = frame::build(self.number.next(), payload);
        self.next_index += 1;
        self.phase = Phase::WaitFrameAck;
        debug!("sending frame {}/{}", self.next_index, self.payloads.len());
        SendAction::Write(Token::Data(built))
    }

    fn finish(&mut self) -> SendAction {
        self.reset();
        SendAction::Finish
    }

    fn abort(&mut self) -> SendAction {
        self.reset();
        SendAction::Abort
    }
}
