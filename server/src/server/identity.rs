//! User identity
//!
//! Every user is identified by an opaque id carried in a cookie. Requests without
//! one are issued a fresh UUID. Ids are not signed: anything that verifies them
//! belongs in front of this service.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Request, State},
    http::{
        HeaderMap, HeaderValue,
        header::{COOKIE, SET_COOKIE},
        request::Parts,
    },
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::routes::{ApiError, AppState};

/// Id of the user making the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserId>()
            .cloned()
            .ok_or(ApiError::MissingUserId)
    }
}

/// Read a cookie value from the request headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Middleware: resolve the caller's id, issuing a new one when missing
pub async fn identify_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let cookie_name = &state.identity.cookie_name;

    let (user_id, issued) = match cookie_value(request.headers(), cookie_name) {
        Some(id) => (id, false),
        None => (Uuid::new_v4().to_string(), true),
    };
    request.extensions_mut().insert(UserId(user_id.clone()));

    let mut response = next.run(request).await;

    if issued {
        let cookie = format!(
            "{}={}; Path=/; HttpOnly{}",
            cookie_name,
            user_id,
            if state.identity.cookie_secure {
                "; Secure"
            } else {
                ""
            }
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
                debug!("Issued user id {}", user_id);
            }
            Err(e) => warn!("Failed to build identity cookie: {}", e),
        }
    }

    response
}

/// Middleware: only the owner of `:sessionID` may pass
pub async fn only_session_owner(
    user: UserId,
    Path(session_id): Path<String>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if user.as_str() != session_id {
        return Err(ApiError::NotOwner {
            user: user.0,
            session: session_id,
        });
    }

    Ok(next.run(request).await)
}
