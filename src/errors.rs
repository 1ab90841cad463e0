//! Error taxonomy for the session core.
//!
//! Every failure surfaced by the auth client, the credential store or the
//! impersonation rules is one of these variants. Guard outcomes are not errors;
//! see [`crate::guard::GuardDecision`].

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Classified failure of an auth operation.
///
/// `Clone` so a single in-flight bootstrap can hand the same outcome to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The authority could not be reached, timed out, or sent an unreadable body.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The authority rejected the credential or the action (401/403).
    #[error("unauthorized ({status}): {}", message.as_deref().unwrap_or("no detail"))]
    Unauthorized { status: u16, message: Option<String> },

    /// The authority refused the request itself (other 4xx).
    #[error("rejected ({status}): {}", message.as_deref().unwrap_or("no detail"))]
    Rejected { status: u16, message: Option<String> },

    /// The authority failed while handling the request (5xx).
    #[error("server error ({status}): {}", message.as_deref().unwrap_or("no detail"))]
    Server { status: u16, message: Option<String> },

    /// Local role or tenant mismatch; no remote call was made.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Malformed local input.
    #[error("validation failure: {0}")]
    Validation(String),

    /// Impersonation requested while an impersonation layer is already active.
    #[error("an impersonation is already active")]
    ImpersonationActive,

    /// The authority answered with a payload we cannot use.
    #[error("invalid response from authority: {0}")]
    InvalidResponse(String),

    /// The credential store failed to read or write.
    #[error("credential store error: {0}")]
    Store(String),

    /// A detached operation task died before reporting.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Classifies a non-success HTTP status and its (possibly empty) body.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = extract_detail(body);
        let status = status.as_u16();
        match status {
            401 | 403 => AuthError::Unauthorized { status, message },
            400..=499 => AuthError::Rejected { status, message },
            _ => AuthError::Server { status, message },
        }
    }

    /// The message a user should see: the authority's own wording when it sent one,
    /// otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            AuthError::Unauthorized { message, .. }
            | AuthError::Rejected { message, .. }
            | AuthError::Server { message, .. } => {
                message.clone().unwrap_or_else(|| fallback.to_string())
            }
            AuthError::Forbidden(msg) | AuthError::Validation(msg) => msg.clone(),
            _ => fallback.to_string(),
        }
    }

    /// True when the authority itself refused the credential.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AuthError::Unauthorized { .. })
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AuthError::Transport(format!("request timed out: {}", e))
        } else if e.is_decode() {
            AuthError::InvalidResponse(e.to_string())
        } else {
            AuthError::Transport(e.to_string())
        }
    }
}

/// Pulls a human readable message out of an error body.
///
/// The authority answers with `{"detail": "..."}` or, for password policy
/// failures, `{"detail": {"message": "...", ...}}`.
fn extract_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let err = AuthError::from_status(StatusCode::UNAUTHORIZED, r#"{"detail": "bad creds"}"#);
        assert_eq!(
            err,
            AuthError::Unauthorized {
                status: 401,
                message: Some("bad creds".to_string())
            }
        );
        assert!(matches!(
            AuthError::from_status(StatusCode::FORBIDDEN, ""),
            AuthError::Unauthorized { status: 403, message: None }
        ));
        assert!(matches!(
            AuthError::from_status(StatusCode::NOT_FOUND, "{}"),
            AuthError::Rejected { status: 404, .. }
        ));
        assert!(matches!(
            AuthError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "oops"),
            AuthError::Server { status: 500, message: None }
        ));
    }

    #[test]
    fn test_nested_detail_message() {
        let body = r#"{"detail": {"message": "too weak", "errors": ["length"]}}"#;
        let err = AuthError::from_status(StatusCode::BAD_REQUEST, body);
        assert_eq!(err.user_message("fallback"), "too weak");
    }

    #[test]
    fn test_user_message_fallback() {
        let err = AuthError::Transport("connection refused".to_string());
        assert_eq!(err.user_message("Login failed"), "Login failed");
        let err = AuthError::from_status(StatusCode::UNAUTHORIZED, "not json");
        assert_eq!(err.user_message("Login failed"), "Login failed");
    }
}
