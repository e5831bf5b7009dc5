use crate::session::clock::Millis;
use crate::session::state::{ActivityState, PomodoroState, Session, SessionSettings};
use serde::{Deserialize, Serialize};

/// Public view of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionBody {
    pub settings: SessionSettings,
    pub activity_state: ActivityState,
    pub pomodoro_state: PomodoroState,
    /// Start of the current phase (ms since epoch), 0 before the session starts
    pub pomodoro_time: Millis,
}

impl From<&Session> for SessionBody {
    fn from(session: &Session) -> Self {
        Self {
            settings: *session.settings(),
            activity_state: session.activity_state(),
            pomodoro_state: session.pomodoro_state(),
            pomodoro_time: session.pomodoro_time(),
        }
    }
}

/// Plain text response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub value: String,
}

impl Message {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// Error payload returned by every failing route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub name: String,
    pub message: String,
}
