mod config;
mod control;
mod dispatch;
mod link;
mod notify;
mod protocol;
mod scheduler;
mod session;

use config::FleetConfig;
use control::ControlServer;
use dispatch::CommandDispatcher;
use link::ble::BleConnector;
use notify::ChangeNotifier;
use scheduler::PollScheduler;
use session::SwitchFleet;
use std::sync::Arc;
use tokio::sync::mpsc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = FleetConfig::default();
    info!(devices = config.devices.len(), "switchfleet starting");
    for device in &config.devices {
        info!("  {} @ {}", device.name, device.address);
    }

    let fleet = Arc::new(SwitchFleet::from_config(&config));
    let dispatcher = Arc::new(CommandDispatcher::new(fleet.clone()));

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let scheduler = PollScheduler::new(
        fleet.clone(),
        Box::new(BleConnector::new()),
        ChangeNotifier::new(event_tx),
        config.poll_period,
    );
    tokio::spawn(scheduler.run());

    let control = ControlServer::new(config.control_listen.clone(), dispatcher, fleet);
    tokio::spawn(async move {
        if let Err(err) = control.run().await {
            error!(error = %err, "control surface failed");
        }
    });

    // External publish point for WallSwitch events.
    while let Some(event) = event_rx.recv().await {
        info!(published = %event, "switch changed externally");
    }

    error!("event channel closed, shutting down");
    Ok(())
}
