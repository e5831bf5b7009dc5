pub mod identity;
pub mod routes;

pub use identity::{UserId, identify_user, only_session_owner};
pub use routes::{ApiError, AppState, session_routes};
