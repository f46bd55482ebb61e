//! Fleet configuration

use std::time::Duration;

/// Static per-device configuration, fixed at startup.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Bluetooth address of the peripheral.
    pub address: String,
    /// Label used in notifications and status lines.
    pub name: String,
}

/// Configuration for the whole fleet.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Managed devices; session index follows this order.
    pub devices: Vec<DeviceConfig>,
    /// Global pacing gate: minimum time between scheduler ticks.
    pub poll_period: Duration,
    /// Listen address for the line-oriented control surface.
    pub control_listen: String,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            devices: vec![
                DeviceConfig {
                    address: "A4:CF:12:4D:80:01".into(),
                    name: "plug-lab".into(),
                },
                DeviceConfig {
                    address: "A4:CF:12:4D:80:02".into(),
                    name: "plug-hall".into(),
                },
            ],
            poll_period: Duration::from_millis(500),
            control_listen: "127.0.0.1:7600".into(),
        }
    }
}
