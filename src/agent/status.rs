//! Status normalization: the single conversion point from the agent's
//! free-form status strings to [`SessionStatus`].

use serde::{Deserialize, Serialize};
use tracing::warn;

const COMPLETED_STATUSES: &[&str] = &["completed", "success", "done", "finished", "blocked"];
const FAILED_STATUSES: &[&str] = &["failed", "error", "cancelled", "canceled"];
const RUNNING_STATUSES: &[&str] = &[
    "running",
    "pending",
    "in_progress",
    "processing",
    "claimed",
    "working",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Look a raw status word up in the known sets. `None` for unknown words.
///
/// `blocked` counts as completed: the agent stopped short of its goal but
/// its output so far is still worth extracting.
pub fn classify(raw: &str) -> Option<SessionStatus> {
    let lowered = raw.trim().to_lowercase();
    let word = lowered.as_str();
    if COMPLETED_STATUSES.contains(&word) {
        Some(SessionStatus::Completed)
    } else if FAILED_STATUSES.contains(&word) {
        Some(SessionStatus::Failed)
    } else if RUNNING_STATUSES.contains(&word) {
        Some(SessionStatus::Running)
    } else {
        None
    }
}

/// The raw status word of a payload: `status`, then `status_enum`, then
/// `"unknown"`. Non-string and empty values count as absent.
pub fn raw_status(payload: &serde_json::Value) -> &str {
    ["status", "status_enum"]
        .iter()
        .filter_map(|key| payload.get(*key).and_then(|v| v.as_str()))
        .find(|s| !s.trim().is_empty())
        .unwrap_or("unknown")
}

/// Map a session payload to a [`SessionStatus`]. Total: unknown status words
/// are logged and treated as still running.
pub fn normalize(payload: &serde_json::Value) -> SessionStatus {
    let raw = raw_status(payload);
    match classify(raw) {
        Some(status) => status,
        None => {
            warn!(status = raw, "Unrecognized agent session status, treating as running");
            SessionStatus::Running
        }
    }
}
