//! Round-robin polling scheduler
//!
//! One cooperative loop drives all radio I/O: each tick services exactly one
//! device, strict round-robin with wraparound, paced by a global interval.
//! A disconnected device spends its tick on a reconnection attempt instead
//! of running the state machine; failures never stall another device since
//! the cursor advances regardless.
//!
//! Per-device state machine (Idle is the only resting state):
//! - Idle: poll switch status, run change detection, refresh telemetry.
//! - TurnOn / TurnOff: one-shot switch write staged by the dispatcher,
//!   then back to Idle with the change baseline forgotten.
//! - ReadInfo: one-shot diagnostic reads, nothing parsed into telemetry.

use crate::link::{Framer, LinkConnector, LinkError};
use crate::notify::ChangeNotifier;
use crate::protocol::{self, SwitchState};
use crate::session::{DeviceSession, SwitchCommand, SwitchFleet, Telemetry};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Reusable response buffer size. A response that fills the whole buffer is
/// treated as truncated and discarded.
pub const RESPONSE_CAPACITY: usize = 1024;

pub struct PollScheduler {
    fleet: Arc<SwitchFleet>,
    connector: Box<dyn LinkConnector>,
    notifier: ChangeNotifier,
    /// Framed links, index-aligned with the fleet; `None` while disconnected.
    links: Vec<Option<Framer>>,
    cursor: usize,
    poll_period: Duration,
    /// One buffer reused across all devices, valid for a single poll cycle.
    response_buf: Vec<u8>,
}

impl PollScheduler {
    pub fn new(
        fleet: Arc<SwitchFleet>,
        connector: Box<dyn LinkConnector>,
        notifier: ChangeNotifier,
        poll_period: Duration,
    ) -> Self {
        let links = (0..fleet.len()).map(|_| None).collect();
        Self {
            fleet,
            connector,
            notifier,
            links,
            cursor: 0,
            poll_period,
            response_buf: vec![0u8; RESPONSE_CAPACITY],
        }
    }

    /// Drive the scheduler forever, one device per poll period.
    pub async fn run(mut self) {
        info!(
            backend = self.connector.name(),
            devices = self.fleet.len(),
            period_ms = self.poll_period.as_millis() as u64,
            "scheduler started"
        );
        let mut ticker = interval(self.poll_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.service_next().await;
        }
    }

    /// Service the next device in round-robin order. The cursor advances
    /// even when the service attempt fails.
    pub async fn service_next(&mut self) {
        if self.fleet.is_empty() {
            return;
        }
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.fleet.len();

        let session = self.fleet.sessions()[index].clone();
        if self.links[index].is_none() || !session.is_connected() {
            self.try_connect(index, &session).await;
            return;
        }

        match session.mailbox().take() {
            SwitchCommand::Idle => self.poll_status(index, &session).await,
            SwitchCommand::TurnOn => self.execute_switch(index, &session, SwitchState::On).await,
            SwitchCommand::TurnOff => self.execute_switch(index, &session, SwitchState::Off).await,
            SwitchCommand::ReadInfo => self.read_info(index, &session).await,
        }
    }

    /// Reconnection attempt; retried on every visit, no backoff. The
    /// mailbox is left untouched so a staged command survives the outage.
    async fn try_connect(&mut self, index: usize, session: &DeviceSession) {
        match self.connector.connect(session.address()).await {
            Ok(channels) => {
                self.links[index] = Some(Framer::new(channels));
                session.set_connected(true);
                info!(device = session.name(), "link established");
            }
            Err(err) => {
                session.set_connected(false);
                debug!(device = session.name(), error = %err, "connect failed");
            }
        }
    }

    async fn poll_status(&mut self, index: usize, session: &DeviceSession) {
        let response = match self.exchange(index, protocol::REQ_SWITCH_STATUS).await {
            Ok(Some(response)) => response,
            // Truncated response: keep stale-but-valid telemetry.
            Ok(None) => return,
            Err(err) => {
                self.drop_link(index, session, &err);
                return;
            }
        };

        let current = protocol::switch_state(&response);
        let previous = session.previous_switch();
        self.notifier.observe(previous, current, session.name()).await;
        session.set_switch_state(current);
        session.set_previous_switch(current);
        session.store_telemetry(Telemetry::from_response(&response)).await;
    }

    /// One-shot TurnOn/TurnOff execution. Resetting the baseline to Unknown
    /// keeps the next Idle poll from reporting our own write as an external
    /// change.
    async fn execute_switch(&mut self, index: usize, session: &DeviceSession, target: SwitchState) {
        info!(device = session.name(), "Switch {target}");
        let request = match target {
            SwitchState::On => protocol::REQ_SWITCH_ON,
            _ => protocol::REQ_SWITCH_OFF,
        };
        match self.exchange(index, request).await {
            Ok(_) => session.set_previous_switch(SwitchState::Unknown),
            Err(err) => self.drop_link(index, session, &err),
        }
    }

    async fn read_info(&mut self, index: usize, session: &DeviceSession) {
        for request in [protocol::REQ_DEVICE_INFO, protocol::REQ_WIFI_STATUS] {
            match self.exchange(index, request).await {
                Ok(Some(response)) => {
                    info!(device = session.name(), response = %response, "diagnostic read");
                }
                Ok(None) => {}
                Err(err) => {
                    self.drop_link(index, session, &err);
                    return;
                }
            }
        }
    }

    /// One framed request/response exchange. `Ok(None)` means the response
    /// filled the whole buffer and must not be parsed.
    async fn exchange(&mut self, index: usize, request: &str) -> Result<Option<String>, LinkError> {
        let framer = self.links[index].as_mut().ok_or(LinkError::Closed)?;
        let expected = framer.send(request.as_bytes()).await?;
        let read = framer.receive(&mut self.response_buf, expected).await?;
        if read >= self.response_buf.len() {
            warn!(bytes = read, "response truncated, discarding");
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&self.response_buf[..read]).into_owned()))
    }

    fn drop_link(&mut self, index: usize, session: &DeviceSession, err: &LinkError) {
        warn!(device = session.name(), error = %err, "link lost");
        self.links[index] = None;
        session.set_connected(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceConfig, FleetConfig};
    use crate::link::testing::ScriptedConnector;
    use crate::notify::SwitchEvent;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;

    const ADDR0: &str = "AA:BB:CC:DD:EE:00";
    const ADDR1: &str = "AA:BB:CC:DD:EE:01";

    fn status_response(output: bool) -> String {
        format!(
            r#"{{"id":0,"source":"poll","output":{output},"apower":8.9,"voltage":231.7,"current":0.041,"temperature":{{"tC":23.5}}}}"#
        )
    }

    struct Harness {
        fleet: Arc<SwitchFleet>,
        connector: Arc<ScriptedConnector>,
        scheduler: PollScheduler,
        events: mpsc::Receiver<SwitchEvent>,
    }

    fn harness(addresses: &[&str]) -> Harness {
        let config = FleetConfig {
            devices: addresses
                .iter()
                .enumerate()
                .map(|(i, addr)| DeviceConfig {
                    address: (*addr).to_string(),
                    name: format!("plug-{i}"),
                })
                .collect(),
            ..Default::default()
        };
        let fleet = Arc::new(SwitchFleet::from_config(&config));
        let connector = Arc::new(ScriptedConnector::new(64));
        let (tx, events) = mpsc::channel(16);
        let scheduler = PollScheduler::new(
            fleet.clone(),
            Box::new(ConnectorHandle(connector.clone())),
            ChangeNotifier::new(tx),
            Duration::from_millis(1),
        );
        Harness {
            fleet,
            connector,
            scheduler,
            events,
        }
    }

    /// Lets the test keep a handle on the connector after the scheduler
    /// takes ownership of its boxed clone.
    struct ConnectorHandle(Arc<ScriptedConnector>);

    #[async_trait::async_trait]
    impl crate::link::LinkConnector for ConnectorHandle {
        async fn connect(
            &self,
            address: &str,
        ) -> Result<Box<dyn crate::link::LinkChannels>, LinkError> {
            self.0.connect(address).await
        }

        fn name(&self) -> &'static str {
            self.0.name()
        }
    }

    #[tokio::test]
    async fn first_tick_connects_then_polls() {
        let mut h = harness(&[ADDR0]);
        h.connector.push_response(ADDR0, &status_response(true));

        h.scheduler.service_next().await;
        assert!(h.fleet.get(0).unwrap().is_connected());
        assert!(h.connector.requests(ADDR0).is_empty());

        h.scheduler.service_next().await;
        let requests = h.connector.requests(ADDR0);
        assert_eq!(requests, vec![protocol::REQ_SWITCH_STATUS.to_string()]);
        assert_eq!(h.fleet.get(0).unwrap().switch_state(), SwitchState::On);
        let telemetry = h.fleet.get(0).unwrap().telemetry().await;
        assert_eq!(telemetry.voltage.as_deref(), Some("231.7"));
    }

    #[tokio::test]
    async fn round_robin_services_each_device_once_in_order() {
        let mut h = harness(&[ADDR0, ADDR1]);
        // Connect both first.
        h.scheduler.service_next().await;
        h.scheduler.service_next().await;

        for _ in 0..2 {
            h.connector.push_response(ADDR0, &status_response(false));
            h.connector.push_response(ADDR1, &status_response(false));
        }
        for _ in 0..4 {
            h.scheduler.service_next().await;
        }
        assert_eq!(h.connector.requests(ADDR0).len(), 2);
        assert_eq!(h.connector.requests(ADDR1).len(), 2);
    }

    #[tokio::test]
    async fn staged_turn_on_issues_one_request_and_returns_to_idle() {
        let mut h = harness(&[ADDR0]);
        h.scheduler.service_next().await; // connect
        let session = h.fleet.get(0).unwrap().clone();
        session.set_previous_switch(SwitchState::Off);
        session.mailbox().post(SwitchCommand::TurnOn);
        h.connector.push_response(ADDR0, r#"{"was_on":false,"x":0}"#);

        h.scheduler.service_next().await;
        assert_eq!(h.connector.requests(ADDR0), vec![protocol::REQ_SWITCH_ON.to_string()]);
        assert_eq!(session.mailbox().peek(), SwitchCommand::Idle);
        assert_eq!(session.previous_switch(), SwitchState::Unknown);
    }

    #[tokio::test]
    async fn local_command_suppresses_next_change_notification() {
        let mut h = harness(&[ADDR0]);
        h.scheduler.service_next().await; // connect
        let session = h.fleet.get(0).unwrap().clone();

        // Poll observes OFF; baseline Unknown, so no event.
        h.connector.push_response(ADDR0, &status_response(false));
        h.scheduler.service_next().await;
        assert!(h.events.try_recv().is_err());

        // Local TurnOn, then the next poll sees ON: suppressed.
        session.mailbox().post(SwitchCommand::TurnOn);
        h.connector.push_response(ADDR0, r#"{"was_on":false,"x":0}"#);
        h.scheduler.service_next().await;
        h.connector.push_response(ADDR0, &status_response(true));
        h.scheduler.service_next().await;
        assert!(h.events.try_recv().is_err());

        // External flip ON -> OFF while Idle: exactly one event.
        h.connector.push_response(ADDR0, &status_response(false));
        h.scheduler.service_next().await;
        let event = h.events.try_recv().unwrap();
        assert_eq!(event.to_string(), "plug-0 WallSwitch OFF");
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn two_device_scenario_notifies_only_the_flipped_device() {
        let mut h = harness(&[ADDR0, ADDR1]);
        h.scheduler.service_next().await;
        h.scheduler.service_next().await;

        // First polls: device 0 ON, device 1 ON. No events (baseline Unknown).
        h.connector.push_response(ADDR0, &status_response(true));
        h.connector.push_response(ADDR1, &status_response(true));
        h.scheduler.service_next().await;
        h.scheduler.service_next().await;
        assert!(h.events.try_recv().is_err());

        // Second polls: device 0 flips OFF, device 1 unchanged.
        h.connector.push_response(ADDR0, &status_response(false));
        h.connector.push_response(ADDR1, &status_response(true));
        h.scheduler.service_next().await;
        h.scheduler.service_next().await;
        let event = h.events.try_recv().unwrap();
        assert_eq!(event.device, "plug-0");
        assert_eq!(event.state, SwitchState::Off);
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn truncated_response_keeps_stale_telemetry() {
        let mut h = harness(&[ADDR0]);
        h.scheduler.service_next().await; // connect
        let session = h.fleet.get(0).unwrap().clone();

        h.connector.push_response(ADDR0, &status_response(true));
        h.scheduler.service_next().await;
        assert_eq!(session.telemetry().await.voltage.as_deref(), Some("231.7"));

        // Oversized response fills the buffer and is discarded.
        let oversized = "x".repeat(RESPONSE_CAPACITY + 100);
        h.connector.push_response(ADDR0, &oversized);
        h.scheduler.service_next().await;
        assert_eq!(session.telemetry().await.voltage.as_deref(), Some("231.7"));
        assert_eq!(session.switch_state(), SwitchState::On);
    }

    #[tokio::test]
    async fn failed_connect_marks_disconnected_and_keeps_mailbox() {
        let mut h = harness(&[ADDR0]);
        h.connector.refuse.store(true, Ordering::SeqCst);
        let session = h.fleet.get(0).unwrap().clone();
        session.mailbox().post(SwitchCommand::TurnOff);

        h.scheduler.service_next().await;
        assert!(!session.is_connected());
        assert_eq!(session.mailbox().peek(), SwitchCommand::TurnOff);

        // Retry succeeds on a later visit, then the staged command runs.
        h.connector.refuse.store(false, Ordering::SeqCst);
        h.scheduler.service_next().await;
        assert!(session.is_connected());
        h.connector.push_response(ADDR0, r#"{"was_on":true,"x":0}"#);
        h.scheduler.service_next().await;
        assert_eq!(h.connector.requests(ADDR0), vec![protocol::REQ_SWITCH_OFF.to_string()]);
    }

    #[tokio::test]
    async fn exchange_failure_drops_link_without_stalling_others() {
        let mut h = harness(&[ADDR0, ADDR1]);
        h.scheduler.service_next().await;
        h.scheduler.service_next().await;

        // No scripted response for device 0: the read fails mid-exchange.
        h.scheduler.service_next().await;
        assert!(!h.fleet.get(0).unwrap().is_connected());

        // Device 1 is still serviced normally on its tick.
        h.connector.push_response(ADDR1, &status_response(true));
        h.scheduler.service_next().await;
        assert_eq!(h.fleet.get(1).unwrap().switch_state(), SwitchState::On);
    }

    #[tokio::test]
    async fn read_info_sends_diagnostics_without_touching_telemetry() {
        let mut h = harness(&[ADDR0]);
        h.scheduler.service_next().await; // connect
        let session = h.fleet.get(0).unwrap().clone();
        session.mailbox().post(SwitchCommand::ReadInfo);
        h.connector.push_response(ADDR0, r#"{"name":"plug","gen":2,"x":0}"#);
        h.connector.push_response(ADDR0, r#"{"sta_ip":"10.0.0.9","x":0}"#);

        h.scheduler.service_next().await;
        assert_eq!(
            h.connector.requests(ADDR0),
            vec![
                protocol::REQ_DEVICE_INFO.to_string(),
                protocol::REQ_WIFI_STATUS.to_string(),
            ]
        );
        assert_eq!(session.telemetry().await.voltage, None);
        assert_eq!(session.mailbox().peek(), SwitchCommand::Idle);
    }
}
