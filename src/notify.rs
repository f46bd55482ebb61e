//! External-change detection and event publishing
//!
//! Any switch flip observed while no local command was pending must have
//! been caused physically at the device (local commands reset the
//! comparison baseline to Unknown before the next poll), so it is published
//! as a WallSwitch event.

use crate::protocol::SwitchState;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A switch-state change attributed to external actuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchEvent {
    pub device: String,
    pub state: SwitchState,
}

impl fmt::Display for SwitchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} WallSwitch {}", self.device, self.state)
    }
}

/// True when a freshly polled state should be reported: the baseline must be
/// a real observation and must differ from the new state.
pub fn external_change(previous: SwitchState, current: SwitchState) -> bool {
    previous != SwitchState::Unknown && previous != current
}

/// Compares polled states and publishes events to the external sink.
pub struct ChangeNotifier {
    events: mpsc::Sender<SwitchEvent>,
}

impl ChangeNotifier {
    pub fn new(events: mpsc::Sender<SwitchEvent>) -> Self {
        Self { events }
    }

    /// Feed one poll observation through the change check.
    pub async fn observe(&self, previous: SwitchState, current: SwitchState, device: &str) {
        if !external_change(previous, current) {
            return;
        }
        let event = SwitchEvent {
            device: device.to_string(),
            state: current,
        };
        info!("{event}");
        if self.events.send(event).await.is_err() {
            warn!("event sink closed, WallSwitch event dropped");
        }
    }
}
