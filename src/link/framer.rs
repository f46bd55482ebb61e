//! Length-prefixed request/response framing
//!
//! Every exchange is one frame out, one frame back:
//! ```text
//! -> [ 4 bytes: payload length ] (length channel)
//! -> [ N bytes: payload ]        (data channel)
//! <- [ 4 bytes: response length ] (length channel)
//! <- [ M bytes: response, fragmented ] (data channel)
//! ```
//! Lengths travel as the 4 bytes of the host-native u32, reversed — on the
//! usual little-endian hosts that is big-endian on the wire.

use super::traits::LinkChannels;
use super::LinkError;

/// Host u32 to wire order: exact byte reversal, `b0b1b2b3 -> b3b2b1b0`.
pub fn to_wire(len: u32) -> [u8; 4] {
    let mut bytes = len.to_ne_bytes();
    bytes.reverse();
    bytes
}

/// Wire order back to host u32, inverse of [`to_wire`].
pub fn from_wire(frame: [u8; 4]) -> u32 {
    let mut bytes = frame;
    bytes.reverse();
    u32::from_ne_bytes(bytes)
}

/// Framed exchange on top of a connected device's channels.
pub struct Framer {
    channels: Box<dyn LinkChannels>,
}

impl Framer {
    pub fn new(channels: Box<dyn LinkChannels>) -> Self {
        Self { channels }
    }

    /// Send one request frame and return the peer's announced response
    /// length in bytes.
    pub async fn send(&mut self, payload: &[u8]) -> Result<usize, LinkError> {
        self.channels.write_length(to_wire(payload.len() as u32)).await?;
        self.channels.write_payload(payload).await?;
        let announced = self.channels.read_length().await?;
        Ok(from_wire(announced) as usize)
    }

    /// Read the response into `buffer`, returning the byte count.
    ///
    /// Fragmented transport reads on this link under-report by one byte per
    /// fragment, so a cumulative count within one byte of `expected` is
    /// treated as a complete response. Stops early when `buffer` is full; a
    /// return value equal to the buffer size means the response was
    /// truncated and must not be parsed.
    pub async fn receive(
        &mut self,
        buffer: &mut [u8],
        expected: usize,
    ) -> Result<usize, LinkError> {
        let capacity = buffer.len();
        let mut read = 0;
        while read + 1 < expected && read < capacity {
            read += self.channels.read_payload(&mut buffer[read..]).await?;
        }
        Ok(read)
    }
}
