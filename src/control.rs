//! Line-oriented TCP control surface
//!
//! One line in, one answer out. A line of `status` returns one status line
//! per device; anything else is treated as a control command and answered
//! with the dispatcher's integer result code. Each client runs on its own
//! task, so commands reach the dispatcher from outside the scheduler's
//! context — exactly the boundary the mailbox exists for.

use crate::dispatch::CommandDispatcher;
use crate::session::SwitchFleet;
use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

pub struct ControlServer {
    listen: String,
    dispatcher: Arc<CommandDispatcher>,
    fleet: Arc<SwitchFleet>,
}

impl ControlServer {
    pub fn new(
        listen: String,
        dispatcher: Arc<CommandDispatcher>,
        fleet: Arc<SwitchFleet>,
    ) -> Self {
        Self {
            listen,
            dispatcher,
            fleet,
        }
    }

    /// Accept clients forever.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.listen).await?;
        info!(listen = %self.listen, "control surface listening");

        loop {
            let (stream, peer) = listener.accept().await?;
            debug!(%peer, "control client connected");
            let dispatcher = self.dispatcher.clone();
            let fleet = self.fleet.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_client(stream, dispatcher, fleet).await {
                    debug!(%peer, error = %err, "control client closed");
                }
            });
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    dispatcher: Arc<CommandDispatcher>,
    fleet: Arc<SwitchFleet>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("status") {
            for status in fleet.statuses().await {
                writer.write_all(format!("{status}\n").as_bytes()).await?;
            }
        } else {
            let result = dispatcher.dispatch(line);
            writer.write_all(format!("{result}\n").as_bytes()).await?;
        }
    }
    Ok(())
}
