//! Session state observed by the owning application

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::session::outcome::ExitOutcome;

/// Lifecycle state of a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl SessionState {
    /// Whether a supervisor loop owns (or is about to own) a process
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Starting | SessionState::Running | SessionState::Stopping
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot of a supervisor for display
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Launch attempts since the last `start`
    pub attempt: u32,
    /// Pid of the live media process
    pub pid: Option<u32>,
    pub last_outcome: Option<ExitOutcome>,
    pub last_error: Option<String>,
    /// When `state` was entered
    pub since: DateTime<Utc>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            attempt: 0,
            pid: None,
            last_outcome: None,
            last_error: None,
            since: Utc::now(),
        }
    }
}

/// Notifications published by a supervisor
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(SessionState),
    Launched { attempt: u32, pid: Option<u32> },
    Exited(ExitOutcome),
    /// The executable is missing; the loop has given up
    LaunchFailed(String),
    /// Internal error, the attempt will be retried
    AttemptFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_states() {
        assert!(SessionState::Starting.is_active());
        assert!(SessionState::Running.is_active());
        assert!(SessionState::Stopping.is_active());
        assert!(!SessionState::Idle.is_active());
        assert!(!SessionState::Stopped.is_active());
        assert!(!SessionState::Failed.is_active());
    }

    #[test]
    fn test_status_serializes() {
        let status = SessionStatus::default();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "idle");
        assert_eq!(json["attempt"], 0);
    }
}
