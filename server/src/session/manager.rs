use crate::config::SessionConfig;
use crate::session::clock::{Clock, Millis, SystemClock};
use crate::session::state::{Session, SessionError, SessionSettings};
use crate::session::store::{MemorySessionStore, SessionStore, SharedSession};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Session manager: runs state-machine operations against stored sessions
///
/// Every operation resolves the session, takes its lock, reads the clock once and
/// returns a snapshot of the session as it was left.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self::with_parts(
            Arc::new(MemorySessionStore::new()),
            Arc::new(SystemClock),
            config,
        )
    }

    pub fn with_parts(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Create a session owned by `owner`
    pub async fn create_session(
        &self,
        owner: &str,
        settings: SessionSettings,
    ) -> Result<Session, SessionError> {
        let session = Session::new(settings, owner, self.clock.now_millis())?;

        let shared = if self.config.allow_overwrite {
            self.store.create(session).await?
        } else {
            self.store.try_create(session).await?
        };

        counter!("focus_sessions_created_total").increment(1);
        info!(
            "Created session {} (focus={}ms, break={}ms, long_break={}ms, every={})",
            owner,
            settings.focus_duration,
            settings.break_duration,
            settings.long_break_duration,
            settings.num_focus_per_long_break
        );

        let snapshot = shared.lock().await.clone();
        Ok(snapshot)
    }

    /// Get session snapshot
    pub async fn get_session(&self, id: &str) -> Result<Session, SessionError> {
        let shared = self.store.get(id).await?;
        let snapshot = shared.lock().await.clone();
        Ok(snapshot)
    }

    pub async fn delete_session(&self, id: &str) -> Result<(), SessionError> {
        self.store.delete(id).await?;
        counter!("focus_sessions_deleted_total").increment(1);
        info!("Deleted session {}", id);
        Ok(())
    }

    pub async fn session_count(&self) -> usize {
        self.store.count().await
    }

    /// Run a state-machine operation under the session lock
    async fn transition<F>(&self, id: &str, op: &'static str, f: F) -> Result<Session, SessionError>
    where
        F: FnOnce(&mut Session, Millis) -> Result<(), SessionError>,
    {
        let shared: SharedSession = self.store.get(id).await?;
        let mut session = shared.lock().await;
        let now = self.clock.now_millis();

        if let Err(e) = f(&mut *session, now) {
            debug!("Session {} rejected {}: {}", id, op, e);
            return Err(e);
        }

        counter!("focus_session_transitions_total", "op" => op).increment(1);
        debug!("Session {} applied {} at {}", id, op, now);
        Ok(session.clone())
    }

    pub async fn start(&self, id: &str) -> Result<Session, SessionError> {
        self.transition(id, "start", |s, now| s.start(now)).await
    }

    pub async fn pause(&self, id: &str) -> Result<Session, SessionError> {
        self.transition(id, "pause", |s, now| s.pause(now)).await
    }

    pub async fn resume(&self, id: &str) -> Result<Session, SessionError> {
        self.transition(id, "resume", |s, now| s.resume(now)).await
    }

    pub async fn stop(&self, id: &str) -> Result<Session, SessionError> {
        self.transition(id, "stop", |s, _| s.stop()).await
    }

    pub async fn join(&self, id: &str, participant: &str) -> Result<Session, SessionError> {
        let session = self
            .transition(id, "join", |s, now| s.join(participant, now))
            .await?;
        info!("Participant {} joined session {}", participant, id);
        Ok(session)
    }

    pub async fn leave(&self, id: &str, participant: &str) -> Result<Session, SessionError> {
        let session = self
            .transition(id, "leave", |s, _| s.leave(participant))
            .await?;
        info!("Participant {} left session {}", participant, id);
        Ok(session)
    }

    /// Liveness signal from `user`, followed by a phase check.
    ///
    /// The owner refreshes the session's last ping; anyone else must have joined.
    /// A session whose owner went quiet is deleted when a participant pings it.
    /// Participants past the inactivity threshold are dropped from the roster.
    pub async fn ping(&self, id: &str, user: &str) -> Result<Session, SessionError> {
        let shared = self.store.get(id).await?;
        let mut session = shared.lock().await;
        let now = self.clock.now_millis();

        if session.owner() == user {
            session.ping_owner(now);
        } else {
            if !session.is_participant(user) {
                return Err(SessionError::NotAParticipant(user.to_string()));
            }
            if session.check_owner_inactive(now) {
                // Only the entry we locked; a re-created session under this id stays
                if self.store.delete_if_same(id, &shared).await {
                    counter!("focus_sessions_abandoned_total").increment(1);
                    warn!(
                        "Session {} abandoned: owner last seen at {}, now {}",
                        id,
                        session.last_ping(),
                        now
                    );
                }
                return Err(SessionError::SessionAbandoned(id.to_string()));
            }
            session.ping_participant(user, now)?;
        }

        let entered = if self.config.phase_catch_up {
            session.catch_up(now)
        } else {
            session.update_phase(now).into_iter().collect()
        };
        for phase in &entered {
            counter!("focus_phase_changes_total", "phase" => phase.as_str()).increment(1);
        }
        if let Some(phase) = entered.last() {
            info!(
                "Session {} entered {:?} (completed focus phases: {})",
                id,
                phase,
                session.counter()
            );
        }

        for participant in session.inactive_participants(now) {
            if session.expire_participant(&participant, now)? {
                counter!("focus_participants_expired_total").increment(1);
                info!(
                    "Participant {} expired from session {} after inactivity",
                    participant, id
                );
            }
        }

        Ok(session.clone())
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::clock::ManualClock;
    use crate::session::state::{ActivityState, INACTIVITY_THRESHOLD_MS, PomodoroState};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store that re-creates the session right after handing out the old entry,
    /// as an owner re-creating it between a lookup and a delete would.
    struct RecreatingStore {
        inner: MemorySessionStore,
        clock: Arc<ManualClock>,
        armed: AtomicBool,
    }

    #[async_trait]
    impl SessionStore for RecreatingStore {
        async fn create(&self, session: Session) -> Result<SharedSession, SessionError> {
            self.inner.create(session).await
        }

        async fn try_create(&self, session: Session) -> Result<SharedSession, SessionError> {
            self.inner.try_create(session).await
        }

        async fn get(&self, id: &str) -> Result<SharedSession, SessionError> {
            let shared = self.inner.get(id).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                let fresh = Session::new(test_settings(), id, self.clock.now_millis())?;
                self.inner.create(fresh).await?;
            }
            Ok(shared)
        }

        async fn delete(&self, id: &str) -> Result<(), SessionError> {
            self.inner.delete(id).await
        }

        async fn delete_if_same(&self, id: &str, expected: &SharedSession) -> bool {
            self.inner.delete_if_same(id, expected).await
        }

        async fn count(&self) -> usize {
            self.inner.count().await
        }
    }

    fn test_settings() -> SessionSettings {
        SessionSettings {
            focus_duration: 1000,
            break_duration: 500,
            long_break_duration: 2000,
            num_focus_per_long_break: 3,
        }
    }

    fn manager_at(start: Millis, config: SessionConfig) -> (SessionManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        let manager = SessionManager::with_parts(
            Arc::new(MemorySessionStore::new()),
            clock.clone(),
            config,
        );
        (manager, clock)
    }

    #[tokio::test]
    async fn test_create_session() {
        let (manager, _) = manager_at(5_000, SessionConfig::default());

        let session = manager.create_session("u1", test_settings()).await.unwrap();
        assert_eq!(session.owner(), "u1");
        assert_eq!(session.last_ping(), 5_000);
        assert_eq!(session.activity_state(), ActivityState::NotStarted);
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_session_rejects_zero_settings() {
        let manager = SessionManager::new();
        let settings = SessionSettings {
            focus_duration: 0,
            ..test_settings()
        };

        let result = manager.create_session("u1", settings).await;
        assert!(matches!(result, Err(SessionError::InvalidSettings(_))));
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_session_without_overwrite() {
        let config = SessionConfig {
            allow_overwrite: false,
            ..SessionConfig::default()
        };
        let (manager, _) = manager_at(0, config);

        manager.create_session("u1", test_settings()).await.unwrap();
        let result = manager.create_session("u1", test_settings()).await;
        assert!(matches!(result, Err(SessionError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_operations_on_missing_session() {
        let manager = SessionManager::new();

        assert!(matches!(
            manager.start("nope").await,
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            manager.ping("nope", "nope").await,
            Err(SessionError::NotFound(_))
        ));
        assert!(manager.delete_session("nope").await.is_ok());
    }

    #[tokio::test]
    async fn test_pause_resume_through_manager() {
        let (manager, clock) = manager_at(0, SessionConfig::default());
        manager.create_session("u1", test_settings()).await.unwrap();

        clock.set(10_000);
        manager.start("u1").await.unwrap();

        clock.set(10_400);
        let paused = manager.pause("u1").await.unwrap();
        assert_eq!(paused.activity_state(), ActivityState::Paused);

        // Pings during the pause must not advance the phase
        clock.set(12_000);
        let pinged = manager.ping("u1", "u1").await.unwrap();
        assert_eq!(pinged.pomodoro_state(), PomodoroState::Focus);

        clock.set(12_500);
        let resumed = manager.resume("u1").await.unwrap();
        assert_eq!(resumed.pomodoro_time(), 12_100);

        clock.set(13_099);
        let session = manager.ping("u1", "u1").await.unwrap();
        assert_eq!(session.pomodoro_state(), PomodoroState::Focus);

        clock.set(13_100);
        let session = manager.ping("u1", "u1").await.unwrap();
        assert_eq!(session.pomodoro_state(), PomodoroState::Break);
        assert_eq!(session.counter(), 1);
    }

    #[tokio::test]
    async fn test_failed_transition_leaves_session_unchanged() {
        let (manager, clock) = manager_at(100, SessionConfig::default());
        manager.create_session("u1", test_settings()).await.unwrap();
        manager.start("u1").await.unwrap();

        clock.set(900);
        assert_eq!(
            manager.start("u1").await.unwrap_err(),
            SessionError::AlreadyStarted
        );
        assert_eq!(manager.get_session("u1").await.unwrap().pomodoro_time(), 100);
    }

    #[tokio::test]
    async fn test_participant_ping_requires_join() {
        let (manager, _) = manager_at(0, SessionConfig::default());
        manager.create_session("u1", test_settings()).await.unwrap();

        let result = manager.ping("u1", "p1").await;
        assert_eq!(
            result.unwrap_err(),
            SessionError::NotAParticipant("p1".to_string())
        );

        manager.join("u1", "p1").await.unwrap();
        assert!(manager.ping("u1", "p1").await.is_ok());

        let session = manager.leave("u1", "p1").await.unwrap();
        assert!(!session.is_participant("p1"));
    }

    #[tokio::test]
    async fn test_ping_expires_quiet_participants() {
        let (manager, clock) = manager_at(0, SessionConfig::default());
        manager.create_session("u1", test_settings()).await.unwrap();
        manager.join("u1", "quiet").await.unwrap();

        clock.set(200_000);
        manager.join("u1", "chatty").await.unwrap();

        clock.set(INACTIVITY_THRESHOLD_MS);
        let session = manager.ping("u1", "u1").await.unwrap();
        assert!(!session.is_participant("quiet"));
        assert!(session.is_participant("chatty"));
    }

    #[tokio::test]
    async fn test_participant_ping_deletes_abandoned_session() {
        let (manager, clock) = manager_at(0, SessionConfig::default());
        manager.create_session("u1", test_settings()).await.unwrap();
        manager.join("u1", "p1").await.unwrap();

        clock.set(INACTIVITY_THRESHOLD_MS - 1);
        manager.ping("u1", "p1").await.unwrap();

        clock.set(INACTIVITY_THRESHOLD_MS);
        let result = manager.ping("u1", "p1").await;
        assert_eq!(
            result.unwrap_err(),
            SessionError::SessionAbandoned("u1".to_string())
        );
        assert!(matches!(
            manager.get_session("u1").await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_abandonment_spares_recreated_session() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(RecreatingStore {
            inner: MemorySessionStore::new(),
            clock: clock.clone(),
            armed: AtomicBool::new(false),
        });
        let manager = SessionManager::with_parts(
            store.clone(),
            clock.clone(),
            SessionConfig::default(),
        );
        manager.create_session("u1", test_settings()).await.unwrap();
        manager.join("u1", "p1").await.unwrap();

        clock.set(400_000);
        store.armed.store(true, Ordering::SeqCst);
        let result = manager.ping("u1", "p1").await;
        assert_eq!(
            result.unwrap_err(),
            SessionError::SessionAbandoned("u1".to_string())
        );

        // The owner's new session survives the stale abandonment
        let session = manager.get_session("u1").await.unwrap();
        assert_eq!(session.last_ping(), 400_000);
        assert!(!session.is_participant("p1"));
    }

    #[tokio::test]
    async fn test_stranger_ping_does_not_delete_abandoned_session() {
        let (manager, clock) = manager_at(0, SessionConfig::default());
        manager.create_session("u1", test_settings()).await.unwrap();

        clock.set(INACTIVITY_THRESHOLD_MS);
        let result = manager.ping("u1", "stranger").await;
        assert_eq!(
            result.unwrap_err(),
            SessionError::NotAParticipant("stranger".to_string())
        );
        assert!(manager.get_session("u1").await.is_ok());
    }

    #[tokio::test]
    async fn test_ping_with_catch_up() {
        let config = SessionConfig {
            phase_catch_up: true,
            ..SessionConfig::default()
        };
        let (manager, clock) = manager_at(0, config);
        manager.create_session("u1", test_settings()).await.unwrap();
        manager.start("u1").await.unwrap();

        clock.set(4_200);
        let session = manager.ping("u1", "u1").await.unwrap();
        assert_eq!(session.pomodoro_state(), PomodoroState::LongBreak);
        assert_eq!(session.counter(), 3);
        assert_eq!(session.pomodoro_time(), 4_000);
    }

    #[tokio::test]
    async fn test_concurrent_pings_on_same_session() {
        let (manager, clock) = manager_at(0, SessionConfig::default());
        let manager = Arc::new(manager);
        manager.create_session("u1", test_settings()).await.unwrap();
        manager.start("u1").await.unwrap();
        clock.set(1_000);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.ping("u1", "u1").await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Exactly one of the pings crosses the boundary
        let session = manager.get_session("u1").await.unwrap();
        assert_eq!(session.counter(), 1);
        assert_eq!(session.pomodoro_state(), PomodoroState::Break);
    }
}
