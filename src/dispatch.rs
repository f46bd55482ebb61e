//! Control-command dispatcher
//!
//! Validates a textual `"<index>,<op>"` command and stages the matching
//! operation on the target session's mailbox. Runs on whatever task the
//! control surface uses; the radio exchange itself is deferred to the
//! scheduler's next visit of that device, so no I/O ever happens here.

use crate::protocol::SwitchState;
use crate::session::{SwitchCommand, SwitchFleet};
use std::sync::Arc;
use tracing::debug;

/// Command accepted: switch will be turned on (or query found it on).
pub const RESULT_ON: i32 = 1;
/// Command accepted: switch will be turned off (or query found it off).
pub const RESULT_OFF: i32 = 0;
/// Malformed command, bad index, unknown op, or disconnected device.
pub const RESULT_INVALID: i32 = -1;

pub struct CommandDispatcher {
    fleet: Arc<SwitchFleet>,
}

impl CommandDispatcher {
    pub fn new(fleet: Arc<SwitchFleet>) -> Self {
        Self { fleet }
    }

    /// Dispatch one control command, returning the integer result code.
    ///
    /// The query op compares against the ON value the response parser
    /// actually produces. (The original firmware compared against a literal
    /// the parser never emitted, making the query result constant; see
    /// DESIGN.md.)
    pub fn dispatch(&self, raw: &str) -> i32 {
        let normalized: String = raw
            .to_lowercase()
            .chars()
            .filter(|c| *c != ' ' && *c != '.')
            .collect();

        let mut parts = normalized.split(',');
        let (index, op) = match (parts.next(), parts.next(), parts.next()) {
            (Some(index), Some(op), None) => (index, op),
            _ => {
                debug!(command = raw, "rejected: need exactly one separator");
                return RESULT_INVALID;
            }
        };

        let Ok(index) = index.parse::<usize>() else {
            debug!(command = raw, "rejected: non-numeric index");
            return RESULT_INVALID;
        };
        let Some(session) = self.fleet.get(index) else {
            debug!(command = raw, index, "rejected: index out of range");
            return RESULT_INVALID;
        };
        if !session.is_connected() {
            debug!(device = session.name(), "rejected: device disconnected");
            return RESULT_INVALID;
        }

        match op {
            "1" => {
                session.mailbox().post(SwitchCommand::TurnOn);
                RESULT_ON
            }
            "0" => {
                session.mailbox().post(SwitchCommand::TurnOff);
                RESULT_OFF
            }
            "?" => {
                if session.switch_state() == SwitchState::On {
                    RESULT_ON
                } else {
                    RESULT_OFF
                }
            }
            _ => {
                debug!(command = raw, "rejected: unknown operation");
                RESULT_INVALID
            }
        }
    }
}
