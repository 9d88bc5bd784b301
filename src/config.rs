//! Link configuration surface.
//!
//! [`LinkConfig`] enumerates everything a deployment chooses: the transport
//! flavour, the network role, the acknowledgement dialect, the serial line
//! parameters, and the machine name stamped on outbound headers and
//! persisted readings. Loading (files, environment) is the embedding
//! application's concern; this module only defines and validates the shape.

use std::time::Duration;

use serde::Deserialize;

/// Transport flavour.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// RS-232 serial line.
    Serial,
    /// TCP byte stream.
    #[default]
    Network,
}

/// Which end opens the TCP connection. Ignored in serial mode.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Listen and accept the analyzer's connection.
    #[default]
    Server,
    /// Connect out to the analyzer.
    Client,
}

/// Serial parity setting.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

/// Complete configuration for one analyzer link.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub mode: Mode,
    pub role: Role,
    /// Enables the dialect in which the peer acknowledges standalone `STX`
    /// and `ETX` control characters.
    pub network_ack: bool,
    /// Listen or connect address, network mode.
    pub address: String,
    /// TCP port, network mode.
    pub port: u16,
    /// Device path, serial mode (for example `/dev/ttyUSB0`).
    pub serial_device: String,
    pub baud: u32,
    pub parity: Parity,
    pub data_bits: u8,
    pub stop_bits: u8,
    /// Identifier used in outbound headers and as the machine id on
    /// persisted readings.
    pub machine_name: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Network,
            role: Role::Server,
            network_ack: false,
            address: "0.0.0.0".to_owned(),
            port: 3000,
            serial_device: "/dev/ttyUSB0".to_owned(),
            baud: 9600,
            parity: Parity::None,
            data_bits: 8,
            stop_bits: 1,
            machine_name: "EM".to_owned(),
        }
    }
}

impl LinkConfig {
    /// Window without inbound progress after which an open receive is
    /// abandoned.
    pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);
    /// Window the send side waits for each acknowledgement.
    pub const ACK_TIMEOUT: Duration = Duration::from_secs(15);

    /// Reject configurations the transport layer cannot honour.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.machine_name.is_empty() {
            return Err("machine_name must not be empty".to_owned());
        }
        match self.mode {
            Mode::Network => {
                if self.address.is_empty() {
                    return Err("address must not be empty in network mode".to_owned());
                }
                if self.port == 0 {
                    return Err("port must be non-zero in network mode".to_owned());
                }
            }
            Mode::Serial => {
                if self.serial_device.is_empty() {
                    return Err("serial_device must not be empty in serial mode".to_owned());
                }
                if self.baud == 0 {
                    return Err("baud must be non-zero".to_owned());
                }
                if !(5..=8).contains(&self.data_bits) {
                    return Err(format!("data_bits must be 5..=8, got {}", self.data_bits));
                }
                if !(1..=2).contains(&self.stop_bits) {
                    return Err(format!("stop_bits must be 1 or 2, got {}", self.stop_bits));
                }
            }
        }
        Ok(())
    }
}
