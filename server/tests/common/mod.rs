//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use focus_together::config::{IdentityConfig, SessionConfig};
use focus_together::server::{AppState, session_routes};
use focus_together::session::{
    Clock, ManualClock, MemorySessionStore, SessionManager, SessionSettings,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::util::ServiceExt;

/// Test context holding the router and the clock driving it
pub struct TestContext {
    pub app_state: AppState,
    pub router: Router,
    pub clock: Arc<ManualClock>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let session_manager = SessionManager::with_parts(
            Arc::new(MemorySessionStore::new()),
            clock.clone() as Arc<dyn Clock>,
            config,
        );
        let app_state = AppState::new()
            .with_session_manager(Arc::new(session_manager))
            .with_identity(IdentityConfig {
                cookie_name: "user".to_string(),
                cookie_secure: false,
            });

        let router = Router::new().nest("/api", session_routes(app_state.clone()));

        Self {
            app_state,
            router,
            clock,
        }
    }

    /// Make an HTTP request to the test router
    pub async fn request(&self, request: Request<Body>) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request")
    }

    /// Send a request as `user` and parse the JSON response
    pub async fn send_as<T: DeserializeOwned>(
        &self,
        user: &str,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, Option<T>) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, format!("user={}", user));

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json).expect("Failed to serialize body"),
                )),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self.request(request).await;
        let status = response.status();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");

        let json: Option<T> = serde_json::from_slice(&body).ok();
        (status, json)
    }

    pub async fn get_as<T: DeserializeOwned>(
        &self,
        user: &str,
        uri: &str,
    ) -> (StatusCode, Option<T>) {
        self.send_as(user, "GET", uri, None).await
    }

    pub async fn post_as<T: DeserializeOwned>(
        &self,
        user: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, Option<T>) {
        self.send_as(user, "POST", uri, body).await
    }

    /// Create a session owned by `owner` through the API
    pub async fn create_session(&self, owner: &str, settings: SessionSettings) {
        let (status, _) = self
            .post_as::<serde_json::Value>(
                owner,
                "/api/createSession",
                Some(serde_json::to_value(settings).expect("Failed to serialize settings")),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "Session creation should succeed");
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Short timings that make phase changes easy to reach
pub fn test_settings() -> SessionSettings {
    SessionSettings {
        focus_duration: 1000,
        break_duration: 500,
        long_break_duration: 2000,
        num_focus_per_long_break: 3,
    }
}

/// Initialize test logging for detailed output
#[allow(dead_code)]
pub fn init_test_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "focus_together=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
