//! Transport openers: TCP in either role, or a serial line.
//!
//! The session is transport-agnostic; everything it needs is a reliable,
//! ordered, bidirectional byte stream. [`open`] turns a [`LinkConfig`] into
//! one, boxed behind the [`Link`] trait so the session type does not carry
//! the flavour around.

use std::io;

use log::info;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, StopBits};

use crate::config::{LinkConfig, Mode, Role};

/// Byte stream contract required by the session.
pub trait Link: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Link for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Open the transport described by `config`.
///
/// In the server role this binds, accepts exactly one connection, and
/// returns it; the analyzer link is exclusive, so there is no accept loop
/// here. Reconnection policy belongs to the caller.
///
/// # Errors
///
/// Returns any `io::Error` raised while binding, connecting, or opening the
/// serial device.
pub async fn open(config: &LinkConfig) -> io::Result<Box<dyn Link>> {
    match config.mode {
        Mode::Network => open_network(config).await,
        Mode::Serial => open_serial(config),
    }
}

async fn open_network(config: &LinkConfig) -> io::Result<Box<dyn Link>> {
    let endpoint = format!("{}:{}", config.address, config.port);
    match config.role {
        Role::Server => {
            let listener = TcpListener::bind(&endpoint).await?;
            info!("listening on {endpoint}");
            let (stream, peer) = listener.accept().await?;
            info!("analyzer connected from {peer}");
            Ok(Box::new(stream))
        }
        Role::Client => {
            let stream = TcpStream::connect(&endpoint).await?;
            info!("connected to analyzer at {endpoint}");
            Ok(Box::new(stream))
        }
    }
}

fn open_serial(config: &LinkConfig) -> io::Result<Box<dyn Link>> {
    let data_bits = match config.data_bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    };
    let stop_bits = match config.stop_bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    };
    let parity = match config.parity {
        crate::config::Parity::Even => Parity::Even,
        crate::config::Parity::Odd => Parity::Odd,
        crate::config::Parity::None => Parity::None,
    };

    let stream = tokio_serial::new(&config.serial_device, config.baud)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .open_native_async()
        .map_err(|e| io::Error::other(e.to_string()))?;
    info!(
        "opened {} at {} baud",
        config.serial_device, config.baud
    );
    Ok(Box::new(stream))
}
