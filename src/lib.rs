//! Bidirectional gateway between a clinical analyzer and a laboratory
//! information system.
//!
//! Analyzers speak the ASTM E1394 / LIS2-A2 frame protocol over a serial
//! line or a TCP stream. This crate implements the link layer: inbound
//! bytes are classified into control tokens and data frames, assembled into
//! messages, and parsed into readings for persistence; a query from the
//! analyzer is answered with an order message driven through the
//! acknowledgement-gated send handshake.
//!
//! The pipeline is `codec` → `receiver` → `record` on the inbound path and
//! `message` → `sender` → `codec` on the outbound path, with [`Session`]
//! owning the transport and arbitrating the two directions. Persistence and
//! observation are seams: implement [`LisStore`] for your database and
//! [`EventSink`] for whatever wants to watch the wire.

pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod message;
pub mod receiver;
pub mod record;
pub mod sender;
pub mod session;
pub mod sink;
pub mod store;
pub mod token;
pub mod transport;

pub use config::{LinkConfig, Mode, Role};
pub use error::{FramingError, LinkError, Result};
pub use message::OrderMessage;
pub use record::{MessageContent, QueryRequest, Reading, Record};
pub use session::{LinkState, Session};
pub use sink::{EventSink, NullSink, RecordingSink, StatusChange};
pub use store::{LisStore, MemoryStore, Order, StoreError};
pub use token::Token;
