//! Server configuration
//!
//! Configuration is loaded from environment variables.

use std::env;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,

    /// Identity cookie configuration
    pub identity: IdentityConfig,

    /// Session configuration
    pub session: SessionConfig,
}

/// How users are identified between requests
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Name of the cookie holding the user id
    pub cookie_name: String,
    /// Mark the cookie `Secure` (HTTPS only)
    pub cookie_secure: bool,
}

/// Session-related configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Creating a session for an owner who already has one replaces it
    pub allow_overwrite: bool,
    /// Advance through every elapsed phase on ping instead of one per ping
    pub phase_catch_up: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            identity: IdentityConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            cookie_name: "user".to_string(),
            cookie_secure: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            allow_overwrite: true,
            phase_catch_up: false,
        }
    }
}

fn parse_flag(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        // Server config
        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }

        // Identity config
        if let Some(name) = lookup("USER_COOKIE_NAME")
            && !name.is_empty()
        {
            config.identity.cookie_name = name;
        }
        if let Some(val) = lookup("COOKIE_SECURE") {
            config.identity.cookie_secure = parse_flag(&val);
        }

        // Session config
        if let Some(val) = lookup("SESSION_ALLOW_OVERWRITE") {
            config.session.allow_overwrite = parse_flag(&val);
        }
        if let Some(val) = lookup("PHASE_CATCH_UP") {
            config.session.phase_catch_up = parse_flag(&val);
        }

        config
    }
}
