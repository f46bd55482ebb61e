//! Trait seam between the framer and the radio backend

use super::LinkError;
use async_trait::async_trait;

/// Raw access to one connected device's two link channels.
///
/// Implementations own whatever per-connection state the backend needs (for
/// the GATT backend, the three resolved characteristic handles). All calls
/// are blocking from the scheduler's point of view; there is no timeout.
#[async_trait]
pub trait LinkChannels: Send {
    /// Write a 4-byte frame-length announcement to the length channel.
    async fn write_length(&mut self, frame: [u8; 4]) -> Result<(), LinkError>;

    /// Read the peer's 4-byte response-length announcement.
    async fn read_length(&mut self) -> Result<[u8; 4], LinkError>;

    /// Write raw payload bytes to the data channel.
    async fn write_payload(&mut self, payload: &[u8]) -> Result<(), LinkError>;

    /// Read the next fragment from the data channel into `chunk`, returning
    /// the number of bytes delivered.
    async fn read_payload(&mut self, chunk: &mut [u8]) -> Result<usize, LinkError>;
}

/// Factory for per-device link channels.
#[async_trait]
pub trait LinkConnector: Send + Sync {
    /// Connect to the device at `address` and resolve its channels.
    async fn connect(&self, address: &str) -> Result<Box<dyn LinkChannels>, LinkError>;

    /// Human-readable backend name.
    fn name(&self) -> &'static str;
}
