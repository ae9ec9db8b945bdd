use chrono::{DateTime, Local};
use common::logger::TraceId;
use corelib::models::RawConfig;
use serde::{Deserialize, Serialize};

/// Commands accepted by the trigger source, tagged by `action`.
///
/// ```json
/// {"action": "schedule", "config": {"targetDate": "2025-07-14", "executionTime": "09:00"}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum TriggerMessage {
    /// Save the settings and start searching right away.
    RunNow { config: RawConfig },
    /// Save the settings and arm the daily alarm.
    Schedule { config: RawConfig },
    /// Cancel any pending alarm and stop the active run.
    Stop,
}

/// What handling a message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerReply {
    Started { run_id: TraceId },
    Scheduled { at: DateTime<Local> },
    Stopped { was_running: bool },
}
