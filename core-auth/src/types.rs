use bridge_traits::Claims;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Authentication status of a session manager.
///
/// # Examples
///
/// ```
/// use core_auth::AuthStatus;
///
/// assert!(!AuthStatus::default().is_authenticated());
/// assert!(AuthStatus::Authenticated.is_authenticated());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    #[default]
    Unauthenticated,
    Authenticated,
}

impl AuthStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthStatus::Authenticated)
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthStatus::Unauthenticated => write!(f, "Unauthenticated"),
            AuthStatus::Authenticated => write!(f, "Authenticated"),
        }
    }
}

/// Token pair issued by the auth service.
///
/// Deserializes the service's `{refresh_token, jwt_token}` payload; the access
/// token is also accepted under `access_token`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    /// Long-lived token persisted across restarts
    pub refresh_token: String,
    /// Short-lived bearer token held in memory only
    #[serde(rename = "jwt_token", alias = "access_token")]
    pub access_token: String,
}

impl SessionTokens {
    pub fn new(refresh_token: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
            access_token: access_token.into(),
        }
    }
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokens")
            .field("refresh_token", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Point-in-time view of the volatile session state.
#[derive(Clone, Default)]
pub struct SessionSnapshot {
    pub status: AuthStatus,
    pub access_token: Option<String>,
    /// Decoded application claims; empty when unauthenticated
    pub claims: Claims,
    /// When the access token was last obtained
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("status", &self.status)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("claims", &self.claims.keys().collect::<Vec<_>>())
            .field("last_refreshed_at", &self.last_refreshed_at)
            .finish()
    }
}

/// Handle returned by `on_auth_state_changed`, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}
