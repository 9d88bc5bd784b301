//! Record parsing for complete message bodies.
//!
//! A message body is the concatenation of frame payloads received between
//! `ENQ` and `EOT`: `CR`-separated ASCII records, each subdivided by the
//! field delimiter `|` and the component delimiter `^`. The first character
//! of a record names its type.
//!
//! Parsing extracts two things the session acts on: [`Reading`]s from `R`
//! records (correlated to the lab number of the preceding `O` record) and
//! [`QueryRequest`]s from `Q` records. Everything else is published to the
//! event sink as-is.

use log::debug;

/// Parameter names at or above this length are treated as noise and the
/// reading is discarded.
const MAX_PARAM_LEN: usize = 15;

/// Placeholder the instrument reports for a suppressed measurement.
const EMPTY_VALUE_SENTINEL: &str = "----";

/// A typed view of one message record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record {
    /// Message header: delimiter definitions, sender id, timestamp.
    Header { raw: String },
    /// Patient record carrying a sequence number.
    Patient { sequence: String },
    /// Order: the specimen (lab number) plus the universal test id.
    Order { lab_number: String, raw: String },
    /// Result: parameter name, measured value, units.
    Result {
        param: String,
        value: String,
        raw: String,
    },
    /// Query: the peer asks which orders exist for a lab number.
    Query { lab_number: String },
    /// Terminator with a termination code.
    Terminator { code: String },
    /// Anything else survives for the sink but drives no behaviour.
    Unknown { raw: String },
}

/// A result measurement ready for persistence.
///
/// `qualified_param` is the machine id and the parameter name joined by an
/// underscore, so readings from different analyzers never collide in the
/// store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reading {
    pub lab_number: String,
    pub machine_id: String,
    pub qualified_param: String,
    pub value: String,
}

/// A request for orders extracted from a `Q` record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryRequest {
    pub lab_number: String,
}

/// Everything extracted from one complete message body.
#[derive(Clone, Debug, Default)]
pub struct MessageContent {
    pub records: Vec<Record>,
    pub readings: Vec<Reading>,
    pub queries: Vec<QueryRequest>,
}

/// Parse a complete message body.
///
/// Bytes are decoded as 7-bit ASCII with high-bit bytes passed through
/// unchanged. Records are split on `CR`; empty records are skipped, records
/// that fail extraction are skipped with a debug log and parsing continues.
#[must_use]
pub fn parse_body(body: &[u8], machine_id: &str) -> MessageContent {
    let text: String = body.iter().map(|&b| b as char).collect();
    let mut content = MessageContent::default();
    // Lab number of the most recent O record; results that arrive without
    // one are persisted with an empty lab number.
    let mut current_lab = String::new();

    for line in text.split('\r') {
        let line = line.trim_matches(|c| c == '\n');
        if line.is_empty() {
            continue;
        }
        let record = parse_record(line);
        match &record {
            Record::Order { lab_number, .. } => {
                current_lab = lab_number.clone();
            }
            Record::Result { param, value, .. } => {
                if accepts_reading(param, value) {
                    content.readings.push(Reading {
                        lab_number: current_lab.clone(),
                        machine_id: machine_id.to_owned(),
                        qualified_param: format!("{machine_id}_{param}"),
                        value: value.clone(),
                    });
                } else {
                    debug!("discarded reading: param={param}, value={value}");
                }
            }
            Record::Query { lab_number } => {
                content.queries.push(QueryRequest {
                    lab_number: lab_number.clone(),
                });
            }
            _ => {}
        }
        content.records.push(record);
    }
    content
}

/// Reading filter: non-empty value, no suppression sentinel, sane parameter
/// name length.
fn accepts_reading(param: &str, value: &str) -> bool {
    param.len() < MAX_PARAM_LEN && !value.is_empty() && value != EMPTY_VALUE_SENTINEL
}

fn parse_record(line: &str) -> Record {
    let Some(first) = line.chars().next() else {
        return Record::Unknown { raw: String::new() };
    };

    // A leading digit means a frame number survived deframing (seen when an
    // instrument omits the CR before ETX). Strip it, drop a trailing
    // ETX-checksum window if one also survived, and dispatch again.
    if first.is_ascii_digit() {
        let stripped = strip_frame_remnants(&line[1..]);
        if stripped.is_empty() {
            return Record::Unknown {
                raw: line.to_owned(),
            };
        }
        return parse_record(stripped);
    }

    let fields: Vec<&str> = line.split('|').collect();
    match first {
        'H' => Record::Header {
            raw: line.to_owned(),
        },
        'P' => Record::Patient {
            sequence: field(&fields, 1).to_owned(),
        },
        'O' => Record::Order {
            // Field 2 holds the specimen id; its first component is the
            // lab number.
            lab_number: component(field(&fields, 2), 0).to_owned(),
            raw: line.to_owned(),
        },
        'R' => {
            let test_id = field(&fields, 2);
            // The universal test id carries the parameter name in its
            // fourth component; single-component ids name it directly.
            let param = if test_id.contains('^') {
                component(test_id, 3)
            } else {
                test_id
            };
            Record::Result {
                param: param.to_owned(),
                value: component(field(&fields, 3), 0).to_owned(),
                raw: line.to_owned(),
            }
        }
        'Q' => {
            let range = field(&fields, 2);
            // Starting-range id: lab number in the second component, or the
            // first when the instrument omits the leading component.
            let lab = if range.contains('^') {
                component(range, 1)
            } else {
                range
            };
            Record::Query {
                lab_number: lab.to_owned(),
            }
        }
        'L' => Record::Terminator {
            code: field(&fields, 2).to_owned(),
        },
        _ => Record::Unknown {
            raw: line.to_owned(),
        },
    }
}

/// Drop a trailing `ETX` + two checksum digits if the deframer left one
/// behind.
fn strip_frame_remnants(line: &str) -> &str {
    if let Some(idx) = line.rfind('\x03') {
        if line[idx..].chars().count() == 3 {
            return &line[..idx];
        }
    }
    line
}

/// Zero-based `|`-field access; missing fields read as empty.
fn field<'a>(fields: &[&'a str], index: usize) -> &'a str {
    fields.get(index).copied().unwrap_or("")
}

/// Zero-based `^`-component access; missing components read as empty.
fn component(value: &str, index: usize) -> &str {
    value.split('^').nth(index).unwrap_or("")
}
