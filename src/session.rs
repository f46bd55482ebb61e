//! Per-device session records and the fleet container
//!
//! Sessions are built once at startup and live for the process lifetime.
//! The scheduler owns all radio I/O and state transitions; the only field
//! ever written from another task is the command mailbox (plus the atomics
//! the dispatcher reads), so everything shared is either immutable, atomic,
//! or behind the telemetry lock.

use crate::config::FleetConfig;
use crate::protocol::{self, SwitchState};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Operation staged on a device, doubling as the state machine's non-Idle
/// states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SwitchCommand {
    Idle = 0,
    TurnOn = 1,
    TurnOff = 2,
    ReadInfo = 3,
}

impl SwitchCommand {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SwitchCommand::TurnOn,
            2 => SwitchCommand::TurnOff,
            3 => SwitchCommand::ReadInfo,
            _ => SwitchCommand::Idle,
        }
    }
}

/// Single-slot, last-write-wins command mailbox.
///
/// The dispatcher posts from its own task; the scheduler drains with
/// [`take`](Self::take). A second post before the scheduler's next visit
/// silently replaces the pending operation.
#[derive(Debug)]
pub struct CommandMailbox(AtomicU8);

impl CommandMailbox {
    pub fn new() -> Self {
        Self(AtomicU8::new(SwitchCommand::Idle as u8))
    }

    pub fn post(&self, command: SwitchCommand) {
        self.0.store(command as u8, Ordering::SeqCst);
    }

    /// Atomically read and reset to Idle.
    pub fn take(&self) -> SwitchCommand {
        SwitchCommand::from_u8(self.0.swap(SwitchCommand::Idle as u8, Ordering::SeqCst))
    }

    pub fn peek(&self) -> SwitchCommand {
        SwitchCommand::from_u8(self.0.load(Ordering::SeqCst))
    }
}

impl Default for CommandMailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Last polled electrical readings, as raw response text. `None` means the
/// field has not been parsed successfully yet (shown as `Unknown`).
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    pub voltage: Option<String>,
    pub current: Option<String>,
    pub power: Option<String>,
}

impl Telemetry {
    /// Parse all fields from a status response. Fields are independent: a
    /// missing key leaves only that field Unknown.
    pub fn from_response(response: &str) -> Self {
        fn non_empty(value: String) -> Option<String> {
            (!value.is_empty()).then_some(value)
        }
        Self {
            voltage: non_empty(protocol::voltage(response)),
            current: non_empty(protocol::current(response)),
            power: non_empty(protocol::power(response)),
        }
    }
}

/// One managed peripheral.
pub struct DeviceSession {
    address: String,
    name: String,
    connected: AtomicBool,
    mailbox: CommandMailbox,
    /// Last parsed switch state, read by the dispatcher's query op.
    switch: AtomicU8,
    /// Comparison baseline for external-change detection; only the
    /// scheduler touches it.
    previous_switch: AtomicU8,
    telemetry: RwLock<Telemetry>,
}

impl DeviceSession {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            connected: AtomicBool::new(false),
            mailbox: CommandMailbox::new(),
            switch: AtomicU8::new(SwitchState::Unknown as u8),
            previous_switch: AtomicU8::new(SwitchState::Unknown as u8),
            telemetry: RwLock::new(Telemetry::default()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn mailbox(&self) -> &CommandMailbox {
        &self.mailbox
    }

    pub fn switch_state(&self) -> SwitchState {
        SwitchState::from_u8(self.switch.load(Ordering::SeqCst))
    }

    pub fn set_switch_state(&self, state: SwitchState) {
        self.switch.store(state as u8, Ordering::SeqCst);
    }

    pub fn previous_switch(&self) -> SwitchState {
        SwitchState::from_u8(self.previous_switch.load(Ordering::SeqCst))
    }

    pub fn set_previous_switch(&self, state: SwitchState) {
        self.previous_switch.store(state as u8, Ordering::SeqCst);
    }

    pub async fn telemetry(&self) -> Telemetry {
        self.telemetry.read().await.clone()
    }

    /// Overwrite all telemetry fields at once.
    pub async fn store_telemetry(&self, telemetry: Telemetry) {
        *self.telemetry.write().await = telemetry;
    }
}

/// Read-only status snapshot of one device.
#[derive(Debug, Clone)]
pub struct DeviceStatus {
    pub name: String,
    pub address: String,
    pub connected: bool,
    pub switch: SwitchState,
    pub voltage: String,
    pub current: String,
    pub power: String,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) {} switch={} voltage={} current={} power={}",
            self.name,
            self.address,
            if self.connected { "Connected" } else { "Disconnected" },
            self.switch,
            self.voltage,
            self.current,
            self.power,
        )
    }
}

/// Fixed set of device sessions, index `0..N-1`, built once from config.
pub struct SwitchFleet {
    sessions: Vec<Arc<DeviceSession>>,
}

impl SwitchFleet {
    pub fn from_config(config: &FleetConfig) -> Self {
        let sessions = config
            .devices
            .iter()
            .map(|d| Arc::new(DeviceSession::new(d.address.clone(), d.name.clone())))
            .collect();
        Self { sessions }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<DeviceSession>> {
        self.sessions.get(index)
    }

    pub fn sessions(&self) -> &[Arc<DeviceSession>] {
        &self.sessions
    }

    /// Snapshot the status surface for every device.
    pub async fn statuses(&self) -> Vec<DeviceStatus> {
        let mut statuses = Vec::with_capacity(self.sessions.len());
        for session in &self.sessions {
            let telemetry = session.telemetry().await;
            let text = |field: Option<String>| field.unwrap_or_else(|| "Unknown".to_string());
            statuses.push(DeviceStatus {
                name: session.name().to_string(),
                address: session.address().to_string(),
                connected: session.is_connected(),
                switch: session.switch_state(),
                voltage: text(telemetry.voltage),
                current: text(telemetry.current),
                power: text(telemetry.power),
            });
        }
        statuses
    }
}
