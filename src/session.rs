//! Session controller: owns the transport and arbitrates the two transfer
//! directions.
//!
//! A session runs one reader task and one writer task over the shared
//! transport, both cooperating with the controller loop through bounded
//! channels. The controller routes classified tokens to the receive or send
//! machine according to the session state, owns the protocol timers, and
//! performs the query turn-around: a `Q` record inside a completed inbound
//! message is answered, once the line returns to idle, with an order message
//! fetched from the store.
//!
//! Only one direction transfers at a time. An `ENQ` is accepted only while
//! idle; while sending, the peer's `ENQ` is answered `NAK` without touching
//! the send progress.
//!
//! Cancellation is observed at every suspension point. Cancelling clears all
//! transfer state, drops the transport tasks, and is idempotent; a message
//! whose persistence batch had not started when the token fired persists
//! nothing.

use std::{io, sync::Arc};

use bytes::BytesMut;
use futures::SinkExt;
use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncReadExt, ReadHalf, WriteHalf},
    sync::mpsc,
    time::{Instant, sleep_until},
};
use tokio_util::{
    codec::{Decoder, FramedWrite},
    sync::CancellationToken,
    task::TaskTracker,
};

use crate::{
    codec::LinkCodec,
    config::LinkConfig,
    error::{LinkError, Result},
    message::OrderMessage,
    receiver::{ReceiveAction, Receiver},
    record::{self, QueryRequest},
    sender::{SendAction, Sender},
    sink::{EventSink, StatusChange},
    store::LisStore,
    token::Token,
    transport::Link,
};

/// Depth of the reader-to-controller and controller-to-writer channels.
const CHANNEL_DEPTH: usize = 32;

/// Direction currently holding the line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkState {
    #[default]
    Idle,
    Receiving,
    Sending,
}

/// What the reader task hands to the controller.
#[derive(Debug)]
enum SessionEvent {
    Token(Token),
    /// The classifier rejected bytes; carries the wrapped framing fault.
    BadFrame(io::Error),
    /// End of stream, clean (`None`) or failed.
    Closed(Option<io::Error>),
}

/// One transport-attached protocol session.
pub struct Session<S, K> {
    config: LinkConfig,
    store: Arc<S>,
    sink: K,
    cancel: CancellationToken,
    state: LinkState,
    receiver: Receiver,
    sender: Sender,
    pending_query: Option<QueryRequest>,
    outbox: Option<mpsc::Sender<Token>>,
    deadline: Option<Instant>,
}

impl<S, K> Session<S, K>
where
    S: LisStore + 'static,
    K: EventSink,
{
    #[must_use]
    pub fn new(config: LinkConfig, store: Arc<S>, sink: K, cancel: CancellationToken) -> Self {
        let network_ack = config.network_ack;
        Self {
            config,
            store,
            sink,
            cancel,
            state: LinkState::Idle,
            receiver: Receiver::new(network_ack),
            sender: Sender::new(network_ack),
            pending_query: None,
            outbox: None,
            deadline: None,
        }
    }

    /// Current direction holding the line.
    #[must_use]
    pub fn state(&self) -> LinkState { self.state }

    /// Drive the session over `link` until the transport closes or the
    /// cancellation token fires.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::TransportClosed`] when the peer closes the
    /// stream or a transport I/O fault ends the session; the caller decides
    /// whether to reconnect. Cancellation resolves to `Ok(())`.
    pub async fn run(mut self, link: Box<dyn Link>) -> Result<()> {
        let (read_half, write_half) = tokio::io::split(link);
        let (event_tx, mut events) = mpsc::channel(CHANNEL_DEPTH);
        let (outbox_tx, outbox_rx) = mpsc::channel(CHANNEL_DEPTH);
        self.outbox = Some(outbox_tx);

        let shutdown = self.cancel.child_token();
        let tracker = TaskTracker::new();
        tracker.spawn(read_loop(read_half, event_tx, shutdown.clone()));
        tracker.spawn(write_loop(
            FramedWrite::new(write_half, LinkCodec::new()),
            outbox_rx,
            shutdown.clone(),
        ));
        tracker.close();

        let result = self.drive(&mut events).await;

        shutdown.cancel();
        self.outbox = None;
        tracker.wait().await;
        self.cleanup();
        result
    }

    async fn drive(&mut self, events: &mut mpsc::Receiver<SessionEvent>) -> Result<()> {
        let cancel = self.cancel.clone();
        loop {
            let deadline = self.deadline;
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    info!("session cancelled");
                    return Ok(());
                }

                () = sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    self.on_timer().await?;
                }

                event = events.recv() => match event {
                    Some(SessionEvent::Token(token)) => self.on_token(token).await?,
                    Some(SessionEvent::BadFrame(err)) => self.on_bad_frame(&err).await?,
                    Some(SessionEvent::Closed(Some(err))) => {
                        warn!("transport failed: {err}");
                        return Err(LinkError::TransportClosed);
                    }
                    Some(SessionEvent::Closed(None)) | None => {
                        info!("transport closed by peer");
                        return Err(LinkError::TransportClosed);
                    }
                },
            }
        }
    }

    async fn on_token(&mut self, token: Token) -> Result<()> {
        self.sink.on_raw(&token.as_wire_bytes());
        match self.state {
            LinkState::Idle => match token {
                Token::Enq => {
                    let actions = self.receiver.accept_enq();
                    self.set_state(LinkState::Receiving);
                    self.touch_receive_deadline();
                    self.apply_receive(actions).await
                }
                other => {
                    debug!("ignoring {other:?} while idle");
                    Ok(())
                }
            },
            LinkState::Receiving => {
                // Any inbound token counts as progress.
                self.touch_receive_deadline();
                let actions = self.receiver.on_token(token);
                self.apply_receive(actions).await
            }
            LinkState::Sending => {
                if token == Token::Enq {
                    // The line is ours; refuse without disturbing the send.
                    return self.write(Token::Nak).await;
                }
                let action = self.sender.on_token(&token);
                self.apply_send(action).await
            }
        }
    }

    async fn on_bad_frame(&mut self, err: &io::Error) -> Result<()> {
        warn!("framing error: {err}");
        if self.state == LinkState::Receiving {
            self.touch_receive_deadline();
            let actions = self.receiver.on_bad_frame();
            return self.apply_receive(actions).await;
        }
        // Outside a receive the reply still goes out, but nothing else
        // changes; the send side recovers through its own timer.
        self.write(Token::Nak).await
    }

    async fn on_timer(&mut self) -> Result<()> {
        match self.state {
            LinkState::Receiving => {
                warn!(
                    "no inbound progress within {:?}; abandoning transfer",
                    LinkConfig::RECEIVE_TIMEOUT
                );
                self.receiver.reset();
                self.set_state(LinkState::Idle);
                Ok(())
            }
            LinkState::Sending => {
                let action = self.sender.on_timeout();
                self.apply_send(action).await
            }
            LinkState::Idle => {
                self.deadline = None;
                Ok(())
            }
        }
    }

    async fn apply_receive(&mut self, actions: Vec<ReceiveAction>) -> Result<()> {
        for action in actions {
            match action {
                ReceiveAction::Reply(token) => self.write(token).await?,
                ReceiveAction::Deliver(body) => self.complete_message(body).await?,
                ReceiveAction::Abort => {
                    self.write(Token::Eot).await?;
                    self.receiver.reset();
                    self.set_state(LinkState::Idle);
                }
            }
        }
        // An empty-body EOT closes the transfer without a delivery.
        if self.state == LinkState::Receiving && !self.receiver.is_receiving() {
            self.set_state(LinkState::Idle);
        }
        Ok(())
    }

    async fn apply_send(&mut self, action: SendAction) -> Result<()> {
        match action {
            SendAction::Continue => Ok(()),
            SendAction::Write(token) => {
                self.write(token).await?;
                self.deadline = Some(Instant::now() + LinkConfig::ACK_TIMEOUT);
                Ok(())
            }
            SendAction::Finish => {
                self.write(Token::Eot).await?;
                info!("outbound message delivered");
                self.set_state(LinkState::Idle);
                Ok(())
            }
            SendAction::Abort => {
                self.write(Token::Eot).await?;
                warn!("outbound message abandoned");
                self.set_state(LinkState::Idle);
                Ok(())
            }
        }
    }

    /// A complete inbound message body: publish records, persist readings,
    /// then answer a pending query once the line is free.
    async fn complete_message(&mut self, body: Vec<u8>) -> Result<()> {
        let content = record::parse_body(&body, &self.config.machine_name);
        for rec in &content.records {
            self.sink.on_decoded(rec);
        }
        self.pending_query = content.queries.into_iter().next();

        if !content.readings.is_empty() {
            let store = Arc::clone(&self.store);
            let cancel = self.cancel.clone();
            let readings = content.readings;
            let count = readings.len();
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                res = store.insert_readings(readings) => match res {
                    Ok(()) => info!("persisted {count} readings"),
                    // Best-effort: the message is already acknowledged and
                    // the protocol has no retransmit request.
                    Err(e) => error!("failed to persist readings: {e}"),
                },
            }
        }

        // The receive side is closed either way; the reply, if any, starts
        // from idle.
        self.set_state(LinkState::Idle);
        if let Some(query) = self.pending_query.take() {
            self.begin_reply(query).await?;
        }
        Ok(())
    }

    /// Turn a received query into an outbound order message.
    async fn begin_reply(&mut self, query: QueryRequest) -> Result<()> {
        let store = Arc::clone(&self.store);
        let cancel = self.cancel.clone();
        let orders = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            res = store.fetch_orders(&query.lab_number) => match res {
                Ok(orders) => orders,
                Err(e) => {
                    error!("order fetch failed for {}: {e}", query.lab_number);
                    self.set_state(LinkState::Idle);
                    return Ok(());
                }
            },
        };

        info!(
            "answering query for {} with {} orders",
            query.lab_number,
            orders.len()
        );
        let message = OrderMessage::build(
            &self.config.machine_name,
            &query.lab_number,
            &orders,
            chrono::Local::now().date_naive(),
        );
        self.set_state(LinkState::Sending);
        let action = self.sender.start(message.frames());
        self.apply_send(action).await
    }

    async fn write(&mut self, token: Token) -> Result<()> {
        self.sink.on_sent(&token.as_wire_bytes());
        let Some(outbox) = &self.outbox else {
            return Err(LinkError::TransportClosed);
        };
        outbox
            .send(token)
            .await
            .map_err(|_| LinkError::TransportClosed)
    }

    fn touch_receive_deadline(&mut self) {
        self.deadline = Some(Instant::now() + LinkConfig::RECEIVE_TIMEOUT);
    }

    fn set_state(&mut self, to: LinkState) {
        if self.state != to {
            let change = StatusChange {
                from: self.state,
                to,
            };
            self.state = to;
            debug!("session state: {:?} -> {:?}", change.from, change.to);
            self.sink.on_status(change);
        }
        if to == LinkState::Idle {
            self.deadline = None;
        }
    }

    fn cleanup(&mut self) {
        self.receiver.reset();
        self.sender.reset();
        self.pending_query = None;
        self.set_state(LinkState::Idle);
    }
}

/// Reader task: drives the classifier by hand so a framing fault (an
/// `InvalidData` decode error) stays recoverable instead of terminating the
/// stream.
async fn read_loop(
    mut read_half: ReadHalf<Box<dyn Link>>,
    events: mpsc::Sender<SessionEvent>,
    shutdown: CancellationToken,
) {
    let mut codec = LinkCodec::new();
    let mut buffer = BytesMut::with_capacity(4096);
    loop {
        // Drain every token the buffer already holds before reading again.
        loop {
            let event = match codec.decode(&mut buffer) {
                Ok(Some(token)) => SessionEvent::Token(token),
                Ok(None) => break,
                Err(e) if e.kind() == io::ErrorKind::InvalidData => SessionEvent::BadFrame(e),
                Err(e) => {
                    let _ = events.send(SessionEvent::Closed(Some(e))).await;
                    return;
                }
            };
            if events.send(event).await.is_err() {
                return;
            }
        }

        tokio::select! {
            biased;
            () = shutdown.cancelled() => return,
            read = read_half.read_buf(&mut buffer) => match read {
                Ok(0) => {
                    let _ = events.send(SessionEvent::Closed(None)).await;
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    let _ = events.send(SessionEvent::Closed(Some(e))).await;
                    return;
                }
            },
        }
    }
}

async fn write_loop(
    mut framed: FramedWrite<WriteHalf<Box<dyn Link>>, LinkCodec>,
    mut outbox: mpsc::Receiver<Token>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => return,
            token = outbox.recv() => {
                let Some(token) = token else { return };
                if let Err(e) = framed.send(token).await {
                    warn!("transport write failed: {e}");
                    return;
                }
            }
        }
    }
}
