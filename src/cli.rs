//! Command line interface for the `lislink` binary.
//!
//! Kept free of crate-internal imports: the build script includes this file
//! on its own to generate the manual page.

use clap::{Parser, ValueEnum};

/// Command line arguments for the `lislink` binary.
#[derive(Debug, Parser)]
#[command(name = "lislink", version, about = "ASTM E1394 analyzer gateway")]
pub struct Cli {
    /// Transport flavour.
    #[arg(long, value_enum, default_value = "network")]
    pub mode: CliMode,

    /// Which end opens the TCP connection (network mode).
    #[arg(long, value_enum, default_value = "server")]
    pub role: CliRole,

    /// Peer acknowledges standalone STX/ETX control characters.
    #[arg(long)]
    pub network_ack: bool,

    /// Listen or connect address (network mode).
    #[arg(long, default_value = "0.0.0.0")]
    pub address: String,

    /// TCP port (network mode).
    #[arg(long, default_value_t = 3000)]
    pub port: u16,

    /// Serial device path (serial mode).
    #[arg(long, default_value = "/dev/ttyUSB0")]
    pub serial_device: String,

    /// Serial baud rate.
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,

    /// Serial parity.
    #[arg(long, value_enum, default_value = "none")]
    pub parity: CliParity,

    /// Serial data bits (5..=8).
    #[arg(long, default_value_t = 8)]
    pub data_bits: u8,

    /// Serial stop bits (1 or 2).
    #[arg(long, default_value_t = 1)]
    pub stop_bits: u8,

    /// Machine name stamped on outbound headers and persisted readings.
    #[arg(long, default_value = "EM")]
    pub machine_name: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CliMode {
    Serial,
    Network,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CliRole {
    Server,
    Client,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CliParity {
    None,
    Even,
    Odd,
}
