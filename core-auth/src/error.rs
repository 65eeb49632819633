use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// The auth service answered with a non-2xx status.
    #[error("{operation} rejected by auth service (HTTP {status})")]
    AuthRejected {
        operation: &'static str,
        status: u16,
        /// Raw response body, kept for display
        body: String,
    },

    #[error("{operation} could not reach auth service: {reason}")]
    TransportFailure {
        operation: &'static str,
        reason: String,
    },

    #[error("Access token could not be decoded: {0}")]
    MalformedToken(String),

    #[error("Claim not found: {0}")]
    ClaimNotFound(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Token storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Unexpected response from auth service: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),
}

impl AuthError {
    /// Parses the body of an [`AuthError::AuthRejected`] as JSON.
    ///
    /// Returns `None` for other variants or when the body is not JSON.
    pub fn rejection_payload(&self) -> Option<serde_json::Value> {
        match self {
            AuthError::AuthRejected { body, .. } => serde_json::from_str(body).ok(),
            _ => None,
        }
    }

    /// HTTP status of a rejection
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::AuthRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the session can survive this error (retrying may help).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuthError::TransportFailure { .. } | AuthError::StorageUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_payload_parses_json_body() {
        let err = AuthError::AuthRejected {
            operation: "login",
            status: 401,
            body: r#"{"message":"Invalid credentials"}"#.to_string(),
        };

        let payload = err.rejection_payload().unwrap();
        assert_eq!(payload["message"], "Invalid credentials");
        assert_eq!(err.status(), Some(401));
        assert!(err.to_string().contains("HTTP 401"));
    }

    #[test]
    fn test_rejection_payload_absent_for_plain_text() {
        let err = AuthError::AuthRejected {
            operation: "refresh",
            status: 502,
            body: "Bad Gateway".to_string(),
        };
        assert!(err.rejection_payload().is_none());

        assert!(AuthError::NotAuthenticated.rejection_payload().is_none());
    }

    #[test]
    fn test_recoverability() {
        let offline = AuthError::TransportFailure {
            operation: "refresh",
            reason: "connection refused".to_string(),
        };
        assert!(offline.is_recoverable());
        assert!(!AuthError::MalformedToken("bad".into()).is_recoverable());
    }
}
