//! Focus Together Server Library
//!
//! This module exports the server components for use in integration tests
//! and external tooling.

pub mod config;
pub mod protocol;
pub mod server;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use protocol::{ErrorResponse, Message, SessionBody};
pub use server::{AppState, session_routes};
pub use session::manager::SessionManager;
