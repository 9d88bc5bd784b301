//! Outbound order-message construction.
//!
//! When the analyzer queries for work, the session answers with a message
//! built from the orders the store returns: a header, a single patient
//! record, one order record per fetched row, and a terminator. The builder
//! produces the record strings; the send side wraps each in a frame
//! envelope.

use chrono::NaiveDate;

use crate::store::Order;

/// A fully built outbound message.
///
/// Records are held without their terminating `CR`; [`OrderMessage::frames`]
/// restores it, since every frame payload carries its record's `CR`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderMessage {
    records: Vec<String>,
}

impl OrderMessage {
    /// Build the reply for `lab_number` from the fetched `orders`.
    ///
    /// Row order defines the `O|i` sequence numbering, starting at 1. An
    /// empty fetch still produces a valid message of header, patient, and
    /// terminator records.
    #[must_use]
    pub fn build(machine_name: &str, lab_number: &str, orders: &[Order], date: NaiveDate) -> Self {
        let stamp = date.format("%Y%m%d");
        let mut records = Vec::with_capacity(orders.len() + 3);
        records.push(format!(
            "H|\\^&||PSWD|{machine_name} User|||||Lis||P|E1394-97{stamp}"
        ));
        records.push("P|1".to_owned());
        for (i, order) in orders.iter().enumerate() {
            records.push(format!(
                "O|{seq}|{lab_number}||^^^{assay}|R",
                seq = i + 1,
                assay = order.assay_code,
            ));
        }
        records.push("L|1|N".to_owned());
        Self { records }
    }

    /// Record strings in transmission order, without `CR` terminators.
    #[must_use]
    pub fn records(&self) -> &[String] { &self.records }

    /// Frame payloads in transmission order: each record with its `CR`
    /// terminator restored.
    #[must_use]
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.records
            .iter()
            .map(|r| {
                let mut payload = r.clone().into_bytes();
                payload.push(crate::token::CR);
                payload
            })
            .collect()
    }
}
