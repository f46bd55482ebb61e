//! GATT backend for the link channels
//!
//! Each peripheral exposes one RPC service with three characteristics: a
//! write-only length/command channel (`tx_ctl`), a read/write data channel,
//! and a read/notify response-length channel (`rx_ctl`). The UUIDs are fixed
//! constants shared by the whole peripheral family.

use super::traits::{LinkChannels, LinkConnector};
use super::LinkError;
use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, Address, Uuid};
use tracing::debug;

/// RPC service shared by all devices of this family.
pub const RPC_SERVICE_UUID: Uuid = Uuid::from_u128(0x5f6d4f53_5f52_5043_5f53_56435f49445f);

/// Write-only: outbound frame-length announcements.
pub const TX_CTL_UUID: Uuid = Uuid::from_u128(0x5f6d4f53_5f52_5043_5f74_785f63746c5f);

/// Read/notify: inbound response-length announcements.
pub const RX_CTL_UUID: Uuid = Uuid::from_u128(0x5f6d4f53_5f52_5043_5f72_785f63746c5f);

/// Read/write: raw frame payload bytes.
pub const DATA_UUID: Uuid = Uuid::from_u128(0x5f6d4f53_5f52_5043_5f64_6174615f5f5f);

fn io_err(err: bluer::Error) -> LinkError {
    LinkError::Io(err.to_string())
}

/// The three resolved characteristic handles for one connected device.
struct BleChannels {
    tx_ctl: Characteristic,
    rx_ctl: Characteristic,
    data: Characteristic,
}

#[async_trait]
impl LinkChannels for BleChannels {
    async fn write_length(&mut self, frame: [u8; 4]) -> Result<(), LinkError> {
        self.tx_ctl.write(&frame).await.map_err(io_err)
    }

    async fn read_length(&mut self) -> Result<[u8; 4], LinkError> {
        let raw = self.rx_ctl.read().await.map_err(io_err)?;
        raw.try_into()
            .map_err(|_| LinkError::Io("short length announcement".into()))
    }

    async fn write_payload(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        self.data.write(payload).await.map_err(io_err)
    }

    async fn read_payload(&mut self, chunk: &mut [u8]) -> Result<usize, LinkError> {
        // One GATT read delivers up to one MTU worth of response bytes.
        let fragment = self.data.read().await.map_err(io_err)?;
        if fragment.is_empty() {
            return Err(LinkError::Closed);
        }
        let n = fragment.len().min(chunk.len());
        chunk[..n].copy_from_slice(&fragment[..n]);
        Ok(n)
    }
}

/// Connector backed by the system Bluetooth adapter.
pub struct BleConnector;

impl BleConnector {
    pub fn new() -> Self {
        Self
    }

    async fn adapter() -> Result<Adapter, LinkError> {
        let session = bluer::Session::new().await.map_err(io_err)?;
        let adapter = session.default_adapter().await.map_err(io_err)?;
        adapter.set_powered(true).await.map_err(io_err)?;
        Ok(adapter)
    }

    /// Walk the device's GATT database and pick out the three RPC
    /// characteristics.
    async fn resolve(device: &bluer::Device) -> Result<BleChannels, LinkError> {
        let mut tx_ctl = None;
        let mut rx_ctl = None;
        let mut data = None;

        for service in device.services().await.map_err(io_err)? {
            if service.uuid().await.map_err(io_err)? != RPC_SERVICE_UUID {
                continue;
            }
            for characteristic in service.characteristics().await.map_err(io_err)? {
                match characteristic.uuid().await.map_err(io_err)? {
                    u if u == TX_CTL_UUID => tx_ctl = Some(characteristic),
                    u if u == RX_CTL_UUID => rx_ctl = Some(characteristic),
                    u if u == DATA_UUID => data = Some(characteristic),
                    _ => {}
                }
            }
        }

        Ok(BleChannels {
            tx_ctl: tx_ctl.ok_or(LinkError::MissingCharacteristic("tx_ctl"))?,
            rx_ctl: rx_ctl.ok_or(LinkError::MissingCharacteristic("rx_ctl"))?,
            data: data.ok_or(LinkError::MissingCharacteristic("data"))?,
        })
    }
}

impl Default for BleConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkConnector for BleConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn LinkChannels>, LinkError> {
        let target: Address = address
            .parse()
            .map_err(|_| LinkError::BadAddress(address.to_string()))?;

        let adapter = Self::adapter().await?;
        let device = adapter.device(target).map_err(io_err)?;

        if !device.is_connected().await.map_err(io_err)? {
            debug!(%target, "connecting");
            device
                .connect()
                .await
                .map_err(|e| LinkError::Unreachable(format!("{target}: {e}")))?;
        }

        let channels = Self::resolve(&device).await?;
        debug!(%target, "rpc characteristics resolved");
        Ok(Box::new(channels))
    }

    fn name(&self) -> &'static str {
        "ble"
    }
}
