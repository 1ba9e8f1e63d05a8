//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Explicit SQLite database file path.  When unset, the store picks the
    /// platform data directory.
    /// Env: `DATABASE_PATH`
    pub database_path: Option<PathBuf>,

    /// Root of the upload area; avatars live in `<upload_dir>/avatars`.
    /// Env: `UPLOAD_DIR`
    /// Default: `./data/uploads`
    pub upload_dir: PathBuf,

    /// Email domain (including the `@`) that signed-in editors must belong
    /// to.
    /// Env: `ALLOWED_EMAIL_DOMAIN`
    /// Default: `@example.com`
    pub allowed_email_domain: String,

    /// Request header carrying the authenticated email, set by the fronting
    /// identity-aware proxy.
    /// Env: `AUTH_EMAIL_HEADER`
    /// Default: `x-auth-request-email`
    pub auth_email_header: String,

    /// How long a staged (fetched but unclaimed) avatar may sit on disk
    /// before the sweep removes it.
    /// Env: `TEMP_AVATAR_TTL_SECS`
    /// Default: `3600`
    pub temp_avatar_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: None,
            upload_dir: PathBuf::from("./data/uploads"),
            allowed_email_domain: "@example.com".to_string(),
            auth_email_header: "x-auth-request-email".to_string(),
            temp_avatar_ttl_secs: 3600,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(
                    value = %addr,
                    "Invalid HTTP_ADDR, using default"
                );
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(path) = std::env::var("UPLOAD_DIR") {
            if !path.is_empty() {
                config.upload_dir = PathBuf::from(path);
            }
        }

        if let Ok(domain) = std::env::var("ALLOWED_EMAIL_DOMAIN") {
            if domain.starts_with('@') {
                config.allowed_email_domain = domain;
            } else {
                tracing::warn!(
                    value = %domain,
                    "ALLOWED_EMAIL_DOMAIN must start with '@', using default"
                );
            }
        }

        if let Ok(header) = std::env::var("AUTH_EMAIL_HEADER") {
            if !header.is_empty() {
                config.auth_email_header = header.to_lowercase();
            }
        }

        if let Ok(val) = std::env::var("TEMP_AVATAR_TTL_SECS") {
            match val.parse::<u64>() {
                // The sweep interval requires a non-zero period.
                Ok(secs) if secs > 0 => config.temp_avatar_ttl_secs = secs,
                _ => tracing::warn!(
                    value = %val,
                    "Invalid TEMP_AVATAR_TTL_SECS, using default"
                ),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// The directory avatar files are stored in.
    pub fn avatars_dir(&self) -> PathBuf {
        self.upload_dir.join("avatars")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.allowed_email_domain, "@example.com");
        assert_eq!(config.avatars_dir(), PathBuf::from("./data/uploads/avatars"));
    }
}
