//! Shared harness for session integration tests.
//!
//! The analyzer end of the link is an in-memory duplex stream the test
//! drives byte-by-byte, exactly as an instrument would.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use lislink::{
    EventSink, LinkConfig, MemoryStore, Record, RecordingSink, Session, StatusChange, frame,
    token,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, DuplexStream},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

/// Recording sink that stays inspectable after the session takes ownership.
#[derive(Clone, Default)]
pub struct SharedSink(pub Arc<Mutex<RecordingSink>>);

impl EventSink for SharedSink {
    fn on_raw(&mut self, bytes: &[u8]) {
        self.0.lock().expect("sink lock").raw.push(bytes.to_vec());
    }

    fn on_decoded(&mut self, record: &Record) {
        self.0
            .lock()
            .expect("sink lock")
            .decoded
            .push(record.clone());
    }

    fn on_sent(&mut self, bytes: &[u8]) {
        self.0.lock().expect("sink lock").sent.push(bytes.to_vec());
    }

    fn on_status(&mut self, change: StatusChange) {
        self.0.lock().expect("sink lock").status.push(change);
    }
}

/// A session under test plus the analyzer's end of the wire.
pub struct Harness {
    pub peer: DuplexStream,
    pub store: Arc<MemoryStore>,
    pub sink: SharedSink,
    pub cancel: CancellationToken,
    pub session: JoinHandle<lislink::Result<()>>,
}

/// Spawn a session over an in-memory link.
pub fn spawn_session(config: LinkConfig) -> Harness {
    spawn_session_with_store(config, Arc::new(MemoryStore::new()))
}

/// Spawn a session over an in-memory link with a pre-staged store.
pub fn spawn_session_with_store(config: LinkConfig, store: Arc<MemoryStore>) -> Harness {
    let (host_end, peer_end) = tokio::io::duplex(4096);
    let sink = SharedSink::default();
    let cancel = CancellationToken::new();
    let session = Session::new(config, Arc::clone(&store), sink.clone(), cancel.clone());
    let handle = tokio::spawn(session.run(Box::new(host_end)));
    Harness {
        peer: peer_end,
        store,
        sink,
        cancel,
        session: handle,
    }
}

/// Read exactly one byte and assert its value.
pub async fn expect_byte(peer: &mut DuplexStream, expected: u8) {
    let mut buf = [0u8; 1];
    peer.read_exact(&mut buf).await.expect("peer read");
    assert_eq!(
        buf[0], expected,
        "expected {expected:#04x}, got {:#04x}",
        buf[0]
    );
}

/// Read one complete frame envelope (through its terminating `LF`).
pub async fn read_frame(peer: &mut DuplexStream) -> Vec<u8> {
    let mut frame = Vec::new();
    let mut buf = [0u8; 1];
    loop {
        peer.read_exact(&mut buf).await.expect("peer read");
        frame.push(buf[0]);
        if buf[0] == token::LF {
            return frame;
        }
    }
}

/// Read a frame, verify its envelope, and return `(number, payload)`.
pub async fn read_parsed_frame(peer: &mut DuplexStream) -> (u8, Vec<u8>) {
    let bytes = read_frame(peer).await;
    let parsed = frame::parse(&bytes).expect("outbound frame must carry a valid checksum");
    (parsed.number, parsed.payload.to_vec())
}

/// Write a record as a framed payload with a valid checksum.
pub async fn send_record(peer: &mut DuplexStream, number: u8, record: &str) {
    let mut payload = record.as_bytes().to_vec();
    payload.push(token::CR);
    let bytes = frame::build(number, &payload);
    peer.write_all(&bytes).await.expect("peer write");
}

/// Write a single control byte.
pub async fn send_byte(peer: &mut DuplexStream, byte: u8) {
    peer.write_all(&[byte]).await.expect("peer write");
}
