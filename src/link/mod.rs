//! Link layer: framed request/response exchange over the radio link
//!
//! The radio exposes two logical channels per device: a length channel that
//! carries 4-byte frame-size announcements in both directions, and a data
//! channel that carries the raw payload bytes. `Framer` implements the
//! exchange on top of the [`LinkChannels`] seam; `ble` provides the real
//! GATT-backed channels.

pub mod ble;
pub mod framer;
pub mod traits;

pub use framer::Framer;
pub use traits::{LinkChannels, LinkConnector};

use thiserror::Error;

/// Errors raised by the link layer. All of them are local to one device and
/// non-fatal: the scheduler reacts by marking the device disconnected.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid device address: {0}")]
    BadAddress(String),

    #[error("device unreachable: {0}")]
    Unreachable(String),

    #[error("required characteristic not found: {0}")]
    MissingCharacteristic(&'static str),

    #[error("link closed by peer")]
    Closed,

    #[error("link i/o failed: {0}")]
    Io(String),
}
