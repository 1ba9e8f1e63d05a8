//! Identity gate.
//!
//! Authentication itself is delegated to a fronting identity-aware proxy
//! that verifies the session and forwards the signed-in email in a request
//! header.  The gate here only checks that the header is present and that
//! the email belongs to the allowed corporate domain, and turns it into an
//! explicit [`Principal`] value that handlers pass along.

use axum::http::HeaderMap;

use crate::config::ServerConfig;
use crate::error::ApiError;

/// The authenticated editor on whose behalf an operation runs.
#[derive(Debug, Clone)]
pub struct Principal {
    pub email: String,
}

/// Resolve the authenticated editor from the forwarded-identity header.
///
/// Fails with [`ApiError::Unauthorized`] when the header is missing, empty,
/// or carries an email outside the allowed domain.
pub fn require_editor(headers: &HeaderMap, config: &ServerConfig) -> Result<Principal, ApiError> {
    let email = headers
        .get(config.auth_email_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or("");

    if email.is_empty() {
        return Err(ApiError::Unauthorized);
    }

    if !email
        .to_lowercase()
        .ends_with(&config.allowed_email_domain.to_lowercase())
    {
        tracing::warn!(email = %email, "sign-in attempt from outside the allowed domain");
        return Err(ApiError::Unauthorized);
    }

    Ok(Principal {
        email: email.to_string(),
    })
}
