use super::clock::Millis;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Session ID: the owner's user id
pub type SessionId = String;

/// Owners and participants are considered gone after 5 minutes without a ping
pub const INACTIVITY_THRESHOLD_MS: Millis = 5 * 60 * 1000;

/// Errors raised by session operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Session already exists: {0}")]
    AlreadyExists(SessionId),

    #[error("Session already started")]
    AlreadyStarted,

    #[error("Session already paused")]
    AlreadyPaused,

    #[error("Session already in progress")]
    AlreadyInProgress,

    #[error("Session already stopped")]
    AlreadyStopped,

    #[error("Session has not been started")]
    NotStarted,

    #[error("Participant already in session: {0}")]
    AlreadyJoined(String),

    #[error("Participant not in session: {0}")]
    NotAParticipant(String),

    #[error("Invalid session settings: {0}")]
    InvalidSettings(String),

    #[error("Session owner is no longer active: {0}")]
    SessionAbandoned(SessionId),
}

/// Overall run state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityState {
    NotStarted,
    InProgress,
    Paused,
    Stopped,
}

/// Current pomodoro phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PomodoroState {
    Focus,
    Break,
    LongBreak,
}

impl PomodoroState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::Break => "break",
            Self::LongBreak => "long_break",
        }
    }
}

/// Timing parameters chosen by the owner. All durations are in milliseconds.
///
/// Missing fields deserialize as zero so that they are rejected by [`SessionSettings::validate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub focus_duration: Millis,
    pub break_duration: Millis,
    pub long_break_duration: Millis,
    pub num_focus_per_long_break: u32,
}

impl SessionSettings {
    pub fn validate(&self) -> Result<(), SessionError> {
        let zero_field = [
            ("focus_duration", self.focus_duration == 0),
            ("break_duration", self.break_duration == 0),
            ("long_break_duration", self.long_break_duration == 0),
            (
                "num_focus_per_long_break",
                self.num_focus_per_long_break == 0,
            ),
        ]
        .into_iter()
        .find(|(_, is_zero)| *is_zero);

        match zero_field {
            Some((name, _)) => Err(SessionError::InvalidSettings(format!(
                "{} cannot be 0",
                name
            ))),
            None => Ok(()),
        }
    }
}

/// A shared focus session
#[derive(Debug, Clone)]
pub struct Session {
    settings: SessionSettings,
    owner: SessionId,
    counter: u64,
    last_ping: Millis,
    participants: HashMap<String, Millis>,
    activity_state: ActivityState,
    pomodoro_state: PomodoroState,
    /// Start of the current phase; `None` until the session is started
    pomodoro_time: Option<Millis>,
    pause_delta: Millis,
}

impl Session {
    /// Create a session owned by `owner`. The owner counts as pinged at `now`.
    pub fn new(
        settings: SessionSettings,
        owner: impl Into<SessionId>,
        now: Millis,
    ) -> Result<Self, SessionError> {
        settings.validate()?;

        Ok(Self {
            settings,
            owner: owner.into(),
            counter: 0,
            last_ping: now,
            participants: HashMap::new(),
            activity_state: ActivityState::NotStarted,
            pomodoro_state: PomodoroState::Focus,
            pomodoro_time: None,
            pause_delta: 0,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Number of completed focus phases
    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn last_ping(&self) -> Millis {
        self.last_ping
    }

    pub fn activity_state(&self) -> ActivityState {
        self.activity_state
    }

    pub fn pomodoro_state(&self) -> PomodoroState {
        self.pomodoro_state
    }

    /// Start of the current phase, or 0 if the session was never started
    pub fn pomodoro_time(&self) -> Millis {
        self.pomodoro_time.unwrap_or(0)
    }

    pub fn pause_delta(&self) -> Millis {
        self.pause_delta
    }

    pub fn has_started(&self) -> bool {
        self.pomodoro_time.is_some()
    }

    pub fn participants(&self) -> &HashMap<String, Millis> {
        &self.participants
    }

    pub fn is_participant(&self, participant: &str) -> bool {
        self.participants.contains_key(participant)
    }

    // ---------------------------------------------------------------------
    // Activity transitions
    // ---------------------------------------------------------------------

    pub fn start(&mut self, now: Millis) -> Result<(), SessionError> {
        if self.pomodoro_time.is_some() {
            return Err(SessionError::AlreadyStarted);
        }

        self.activity_state = ActivityState::InProgress;
        self.pomodoro_state = PomodoroState::Focus;
        self.pomodoro_time = Some(now);
        Ok(())
    }

    /// Freeze the current phase, remembering how far into it we are
    pub fn pause(&mut self, now: Millis) -> Result<(), SessionError> {
        if self.activity_state == ActivityState::Paused {
            return Err(SessionError::AlreadyPaused);
        }
        let phase_start = self.pomodoro_time.ok_or(SessionError::NotStarted)?;

        self.activity_state = ActivityState::Paused;
        self.pause_delta = now.saturating_sub(phase_start);
        Ok(())
    }

    /// Re-anchor the phase start so the paused interval is not counted
    pub fn resume(&mut self, now: Millis) -> Result<(), SessionError> {
        if self.activity_state == ActivityState::InProgress {
            return Err(SessionError::AlreadyInProgress);
        }
        if self.pomodoro_time.is_none() {
            return Err(SessionError::NotStarted);
        }

        self.activity_state = ActivityState::InProgress;
        self.pomodoro_time = Some(now.saturating_sub(self.pause_delta));
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), SessionError> {
        if self.activity_state == ActivityState::Stopped {
            return Err(SessionError::AlreadyStopped);
        }

        self.activity_state = ActivityState::Stopped;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Pomodoro phases
    // ---------------------------------------------------------------------

    fn phase_duration(&self) -> Millis {
        match self.pomodoro_state {
            PomodoroState::Focus => self.settings.focus_duration,
            PomodoroState::Break => self.settings.break_duration,
            PomodoroState::LongBreak => self.settings.long_break_duration,
        }
    }

    /// When the current phase elapses. Only meaningful while in progress.
    pub fn phase_ends_at(&self) -> Option<Millis> {
        self.pomodoro_time
            .map(|start| start.saturating_add(self.phase_duration()))
    }

    fn advance_phase(&mut self, phase_start: Millis) -> PomodoroState {
        self.pomodoro_state = match self.pomodoro_state {
            PomodoroState::Focus => {
                self.counter += 1;
                if self.counter % u64::from(self.settings.num_focus_per_long_break) == 0 {
                    PomodoroState::LongBreak
                } else {
                    PomodoroState::Break
                }
            }
            PomodoroState::Break | PomodoroState::LongBreak => PomodoroState::Focus,
        };
        self.pomodoro_time = Some(phase_start);
        self.pomodoro_state
    }

    /// Move to the next phase if the current one has elapsed.
    ///
    /// Advances at most one phase per call and anchors the new phase at `now`.
    /// Sessions that are not in progress never advance. Returns the phase entered.
    pub fn update_phase(&mut self, now: Millis) -> Option<PomodoroState> {
        if self.activity_state != ActivityState::InProgress {
            return None;
        }
        let ends_at = self.phase_ends_at()?;
        if now < ends_at {
            return None;
        }

        Some(self.advance_phase(now))
    }

    /// Advance through every phase boundary reached by `now`.
    ///
    /// Each new phase starts exactly where the previous one ended, so time spent
    /// unobserved is not lost. Returns the phases entered, in order.
    pub fn catch_up(&mut self, now: Millis) -> Vec<PomodoroState> {
        let mut entered = Vec::new();
        if self.activity_state != ActivityState::InProgress {
            return entered;
        }

        while let Some(ends_at) = self.phase_ends_at()
            && now >= ends_at
        {
            entered.push(self.advance_phase(ends_at));
        }
        entered
    }

    // ---------------------------------------------------------------------
    // Owner liveness
    // ---------------------------------------------------------------------

    pub fn ping_owner(&mut self, now: Millis) {
        self.last_ping = now;
    }

    pub fn check_owner_inactive(&self, now: Millis) -> bool {
        now >= self.last_ping.saturating_add(INACTIVITY_THRESHOLD_MS)
    }

    // ---------------------------------------------------------------------
    // Participants
    // ---------------------------------------------------------------------

    /// Add a participant. The owner is already part of the session and cannot join.
    pub fn join(&mut self, participant: &str, now: Millis) -> Result<(), SessionError> {
        if participant == self.owner || self.participants.contains_key(participant) {
            return Err(SessionError::AlreadyJoined(participant.to_string()));
        }

        self.participants.insert(participant.to_string(), now);
        Ok(())
    }

    pub fn ping_participant(
        &mut self,
        participant: &str,
        now: Millis,
    ) -> Result<(), SessionError> {
        let last_ping = self
            .participants
            .get_mut(participant)
            .ok_or_else(|| SessionError::NotAParticipant(participant.to_string()))?;

        *last_ping = now;
        Ok(())
    }

    pub fn leave(&mut self, participant: &str) -> Result<(), SessionError> {
        self.participants
            .remove(participant)
            .map(|_| ())
            .ok_or_else(|| SessionError::NotAParticipant(participant.to_string()))
    }

    pub fn check_participant_inactive(
        &self,
        participant: &str,
        now: Millis,
    ) -> Result<bool, SessionError> {
        let last_ping = self
            .participants
            .get(participant)
            .ok_or_else(|| SessionError::NotAParticipant(participant.to_string()))?;

        Ok(now >= last_ping.saturating_add(INACTIVITY_THRESHOLD_MS))
    }

    /// Remove the participant if it has been inactive. Returns whether it was removed.
    pub fn expire_participant(
        &mut self,
        participant: &str,
        now: Millis,
    ) -> Result<bool, SessionError> {
        if !self.check_participant_inactive(participant, now)? {
            return Ok(false);
        }

        self.leave(participant)?;
        Ok(true)
    }

    /// Participants whose inactivity threshold has passed
    pub fn inactive_participants(&self, now: Millis) -> Vec<String> {
        self.participants
            .iter()
            .filter(|(_, last_ping)| now >= last_ping.saturating_add(INACTIVITY_THRESHOLD_MS))
            .map(|(id, _)| id.clone())
            .collect()
    }
}
