//! Persistence contract between the link layer and the laboratory store.
//!
//! The session only ever needs two operations: persist the readings of a
//! completed message and fetch the outstanding orders for a lab number. The
//! database adapter lives outside this crate; tests and the demo binary use
//! [`MemoryStore`].

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::record::Reading;

/// An ordered test fetched for a queried lab number.
///
/// Only the assay code reaches the wire; the demographic fields ride along
/// for adapters that want to log them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Order {
    pub assay_code: String,
    pub patient_name: String,
    pub age: String,
    pub gender: String,
}

/// Failure reported by the backing store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The backend rejected the operation.
    #[error("store backend rejected the operation: {0}")]
    Backend(String),

    /// The backend is unreachable.
    #[error("store backend unavailable")]
    Unavailable,
}

/// Two-operation persistence seam consumed by the session controller.
///
/// `insert_readings` is best-effort per call; the session logs a failure and
/// carries on, because the protocol has no way to ask the analyzer to resend
/// an already-acknowledged message. `fetch_orders` failures abort only the
/// outbound reply, never the session.
#[async_trait]
pub trait LisStore: Send + Sync {
    /// Persist the readings extracted from one received message.
    async fn insert_readings(&self, readings: Vec<Reading>) -> Result<(), StoreError>;

    /// Orders outstanding for `lab_number`; row order defines the outbound
    /// `O|i` sequence numbering. May be empty.
    async fn fetch_orders(&self, lab_number: &str) -> Result<Vec<Order>, StoreError>;
}

/// In-memory store used by tests and the demo binary.
#[derive(Debug, Default)]
pub struct MemoryStore {
    readings: Mutex<Vec<Reading>>,
    orders: Mutex<HashMap<String, Vec<Order>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Stage orders to be served for `lab_number`.
    pub fn put_orders(&self, lab_number: &str, orders: Vec<Order>) {
        self.orders
            .lock()
            .expect("orders lock")
            .insert(lab_number.to_owned(), orders);
    }

    /// Snapshot of everything inserted so far.
    #[must_use]
    pub fn readings(&self) -> Vec<Reading> {
        self.readings.lock().expect("readings lock").clone()
    }
}

#[async_trait]
impl LisStore for MemoryStore {
    async fn insert_readings(&self, readings: Vec<Reading>) -> Result<(), StoreError> {
        self.readings
            .lock()
            .expect("readings lock")
            .extend(readings);
        Ok(())
    }

    async fn fetch_orders(&self, lab_number: &str) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .orders
            .lock()
            .expect("orders lock")
            .get(lab_number)
            .cloned()
            .unwrap_or_default())
    }
}
