//! HTTP route handlers for the session API

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use std::sync::Arc;
use thiserror::Error;

use super::identity::{UserId, identify_user, only_session_owner};
use crate::config::IdentityConfig;
use crate::protocol::{ErrorResponse, Message, SessionBody};
use crate::session::manager::SessionManager;
use crate::session::state::{SessionError, SessionSettings};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session_manager: Arc<SessionManager>,
    pub identity: Arc<IdentityConfig>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            session_manager: Arc::new(SessionManager::new()),
            identity: Arc::new(IdentityConfig::default()),
        }
    }

    pub fn with_session_manager(mut self, session_manager: Arc<SessionManager>) -> Self {
        self.session_manager = session_manager;
        self
    }

    pub fn with_identity(mut self, identity: IdentityConfig) -> Self {
        self.identity = Arc::new(identity);
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors surfaced by the session API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Unable to identify user")]
    MissingUserId,

    #[error("You are {user} but are trying to edit {session}")]
    NotOwner { user: String, session: String },

    #[error("Unable to decode request body, make sure it is valid JSON: {0}")]
    InvalidJson(String),
}

impl ApiError {
    pub fn name(&self) -> &'static str {
        match self {
            ApiError::Session(e) => match e {
                SessionError::NotFound(_) => "SessionNotFound",
                SessionError::AlreadyExists(_) => "SessionAlreadyExists",
                SessionError::AlreadyStarted => "AlreadyStarted",
                SessionError::AlreadyPaused => "AlreadyPaused",
                SessionError::AlreadyInProgress => "AlreadyInProgress",
                SessionError::AlreadyStopped => "AlreadyStopped",
                SessionError::NotStarted => "NotStarted",
                SessionError::AlreadyJoined(_) => "AlreadyJoined",
                SessionError::NotAParticipant(_) => "NotAParticipant",
                SessionError::InvalidSettings(_) => "InvalidSettings",
                SessionError::SessionAbandoned(_) => "SessionAbandoned",
            },
            ApiError::MissingUserId => "MissingUserID",
            ApiError::NotOwner { .. } => "UnauthorizedUser",
            ApiError::InvalidJson(_) => "JSONDecoding",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Session(SessionError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Session(SessionError::InvalidSettings(_)) => StatusCode::BAD_REQUEST,
            ApiError::Session(SessionError::SessionAbandoned(_)) => StatusCode::GONE,
            ApiError::Session(_) => StatusCode::CONFLICT,
            ApiError::MissingUserId => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotOwner { .. } => StatusCode::FORBIDDEN,
            ApiError::InvalidJson(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = ErrorResponse {
            name: self.name().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// GET /api - Who am I
pub async fn root(user: UserId) -> Json<Message> {
    Json(Message::new(user.0))
}

/// POST /api/createSession - Create a session owned by the caller
pub async fn create_session(
    State(state): State<AppState>,
    user: UserId,
    body: Result<Json<SessionSettings>, JsonRejection>,
) -> Result<Json<Message>, ApiError> {
    let Json(settings) = body.map_err(|e| {
        tracing::warn!("Failed to decode create session body: {}", e);
        ApiError::InvalidJson(e.body_text())
    })?;

    state
        .session_manager
        .create_session(user.as_str(), settings)
        .await?;

    Ok(Json(Message::new(format!(
        "created session for {}",
        user.as_str()
    ))))
}

/// GET /api/get - The caller's own session
pub async fn get_own_session(
    State(state): State<AppState>,
    user: UserId,
) -> Result<Json<SessionBody>, ApiError> {
    let session = state.session_manager.get_session(user.as_str()).await?;
    Ok(Json(SessionBody::from(&session)))
}

/// GET /api/get/:id - Any session by id
pub async fn get_session_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionBody>, ApiError> {
    let session = state.session_manager.get_session(&id).await?;
    Ok(Json(SessionBody::from(&session)))
}

/// GET /api/ping/:sessionID - Liveness signal and phase check
pub async fn ping_session(
    State(state): State<AppState>,
    user: UserId,
    Path(session_id): Path<String>,
) -> Result<Json<SessionBody>, ApiError> {
    let session = state
        .session_manager
        .ping(&session_id, user.as_str())
        .await?;
    Ok(Json(SessionBody::from(&session)))
}

/// POST /api/join/:sessionID - Join a session as a participant
pub async fn join_session(
    State(state): State<AppState>,
    user: UserId,
    Path(session_id): Path<String>,
) -> Result<Json<SessionBody>, ApiError> {
    let session = state
        .session_manager
        .join(&session_id, user.as_str())
        .await?;
    Ok(Json(SessionBody::from(&session)))
}

/// POST /api/leave/:sessionID - Leave a session
pub async fn leave_session(
    State(state): State<AppState>,
    user: UserId,
    Path(session_id): Path<String>,
) -> Result<Json<Message>, ApiError> {
    state
        .session_manager
        .leave(&session_id, user.as_str())
        .await?;
    Ok(Json(Message::new(format!("left session {}", session_id))))
}

/// GET /api/edit/start/:sessionID
pub async fn start_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionBody>, ApiError> {
    let session = state.session_manager.start(&session_id).await?;
    Ok(Json(SessionBody::from(&session)))
}

/// GET /api/edit/pause/:sessionID
pub async fn pause_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionBody>, ApiError> {
    let session = state.session_manager.pause(&session_id).await?;
    Ok(Json(SessionBody::from(&session)))
}

/// GET /api/edit/resume/:sessionID
pub async fn resume_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionBody>, ApiError> {
    let session = state.session_manager.resume(&session_id).await?;
    Ok(Json(SessionBody::from(&session)))
}

/// GET /api/edit/stop/:sessionID
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionBody>, ApiError> {
    let session = state.session_manager.stop(&session_id).await?;
    Ok(Json(SessionBody::from(&session)))
}

/// DELETE /api/edit/delete/:sessionID
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Message>, ApiError> {
    state.session_manager.delete_session(&session_id).await?;
    Ok(Json(Message::new("success")))
}

/// Create the session API router, to be nested under `/api`
pub fn session_routes(state: AppState) -> Router {
    let edit = Router::new()
        .route("/start/:sessionID", get(start_session))
        .route("/pause/:sessionID", get(pause_session))
        .route("/resume/:sessionID", get(resume_session))
        .route("/stop/:sessionID", get(stop_session))
        .route("/delete/:sessionID", delete(delete_session))
        .route_layer(middleware::from_fn(only_session_owner));

    Router::new()
        .route("/", get(root))
        .route("/createSession", post(create_session))
        .route("/get", get(get_own_session))
        .route("/get/:id", get(get_session_by_id))
        .route("/ping/:sessionID", get(ping_session))
        .route("/join/:sessionID", post(join_session))
        .route("/leave/:sessionID", post(leave_session))
        .nest("/edit", edit)
        .layer(middleware::from_fn_with_state(state.clone(), identify_user))
        .with_state(state)
}
