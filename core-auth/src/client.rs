//! # Remote Auth Client
//!
//! Stateless wrapper around the auth service's HTTP API. Every operation is a
//! single credentialed `POST` with a JSON body; the client never touches
//! local state.
//!
//! | Operation | Path |
//! |---|---|
//! | login | `/auth/local/login` |
//! | register | `/auth/local/register` |
//! | refresh | `/auth/refresh-token` |
//! | logout / logout-all | `/auth/logout`, `/auth/logout-all` |
//! | activate account | `/auth/local/activate-account` |
//! | set new password | `/auth/local/new-password` |

use crate::error::{AuthError, Result};
use crate::types::SessionTokens;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_runtime::config::AuthConfig;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const LOGIN_PATH: &str = "/auth/local/login";
const REGISTER_PATH: &str = "/auth/local/register";
const REFRESH_PATH: &str = "/auth/refresh-token";
const LOGOUT_PATH: &str = "/auth/logout";
const LOGOUT_ALL_PATH: &str = "/auth/logout-all";
const ACTIVATE_PATH: &str = "/auth/local/activate-account";
const NEW_PASSWORD_PATH: &str = "/auth/local/new-password";

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    #[serde(rename = "appId", skip_serializing_if = "Option::is_none")]
    app_id: Option<&'a str>,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    username: &'a str,
    password: &'a str,
    register_data: &'a Value,
}

#[derive(Serialize)]
struct RefreshTokenRequest<'a> {
    refresh_token: Option<&'a str>,
}

#[derive(Serialize)]
struct SecretTokenRequest<'a> {
    secret_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
}

/// Client for the remote auth service.
#[derive(Clone)]
pub struct RemoteAuthClient {
    http_client: Arc<dyn HttpClient>,
    endpoint: String,
    app_id: Option<String>,
    timeout: Option<Duration>,
}

impl RemoteAuthClient {
    /// Create a client for `endpoint` (base URL without trailing slash).
    pub fn new(http_client: Arc<dyn HttpClient>, endpoint: impl Into<String>) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
            app_id: None,
            timeout: None,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            http_client: Arc::clone(&config.http_client),
            endpoint: config.endpoint.clone(),
            app_id: config.app_id.clone(),
            timeout: config.request_timeout,
        }
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Exchange credentials for a token pair.
    #[instrument(skip(self, password), fields(username = %username))]
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionTokens> {
        let body = LoginRequest {
            username,
            password,
            app_id: self.app_id.as_deref(),
        };
        let response = self.post("login", LOGIN_PATH, &body).await?;
        Self::session_tokens("login", &response)
    }

    /// Create an account. Returns the service's JSON payload untouched.
    #[instrument(skip(self, email, password, register_data), fields(username = %username))]
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
        register_data: &Value,
    ) -> Result<Value> {
        let body = RegisterRequest {
            email,
            username,
            password,
            register_data,
        };
        let response = self.post("register", REGISTER_PATH, &body).await?;
        Self::json_payload("register", &response)
    }

    /// Redeem a refresh token for a new token pair.
    ///
    /// Returns `Ok(None)` without any request when `refresh_token` is `None`.
    #[instrument(skip_all, fields(has_token = refresh_token.is_some()))]
    pub async fn refresh_session(
        &self,
        refresh_token: Option<&str>,
    ) -> Result<Option<SessionTokens>> {
        let Some(refresh_token) = refresh_token else {
            debug!("No refresh token to redeem");
            return Ok(None);
        };

        let body = RefreshTokenRequest {
            refresh_token: Some(refresh_token),
        };
        let response = self.post("refresh", REFRESH_PATH, &body).await?;
        Self::session_tokens("refresh", &response).map(Some)
    }

    /// Revoke the session server-side (`all` revokes every session of the user).
    ///
    /// A non-2xx answer still counts as success; only transport failures are
    /// reported.
    #[instrument(skip_all, fields(all = all))]
    pub async fn logout(&self, refresh_token: Option<&str>, all: bool) -> Result<()> {
        let (operation, path) = if all {
            ("logout-all", LOGOUT_ALL_PATH)
        } else {
            ("logout", LOGOUT_PATH)
        };
        let body = RefreshTokenRequest { refresh_token };

        match self.post(operation, path, &body).await {
            Ok(_) => Ok(()),
            Err(AuthError::AuthRejected { status, .. }) => {
                debug!(status, "Auth service refused logout; treating as signed out");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Confirm an account with the emailed secret token.
    #[instrument(skip_all)]
    pub async fn activate_account(&self, secret_token: &str) -> Result<Value> {
        let body = SecretTokenRequest {
            secret_token,
            password: None,
        };
        let response = self.post("activate-account", ACTIVATE_PATH, &body).await?;
        Self::json_payload("activate-account", &response)
    }

    /// Set a new password using a reset secret token.
    #[instrument(skip_all)]
    pub async fn set_new_password(&self, secret_token: &str, password: &str) -> Result<Value> {
        let body = SecretTokenRequest {
            secret_token,
            password: Some(password),
        };
        let response = self.post("new-password", NEW_PASSWORD_PATH, &body).await?;
        Self::json_payload("new-password", &response)
    }

    async fn post<B: Serialize>(
        &self,
        operation: &'static str,
        path: &str,
        body: &B,
    ) -> Result<HttpResponse> {
        let url = format!("{}{}", self.endpoint, path);
        let mut request = HttpRequest::new(HttpMethod::Post, url)
            .header("Accept", "application/json")
            .json(body)
            .map_err(|e| AuthError::InvalidResponse(format!("Failed to encode request: {}", e)))?
            .with_credentials();
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = self.http_client.execute(request).await.map_err(|e| {
            warn!(operation, error = %e, "Auth request failed in transport");
            AuthError::TransportFailure {
                operation,
                reason: e.to_string(),
            }
        })?;

        if !response.is_success() {
            warn!(operation, status = response.status, "Auth service rejected request");
            return Err(AuthError::AuthRejected {
                operation,
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        debug!(operation, status = response.status, "Auth request succeeded");
        Ok(response)
    }

    fn session_tokens(operation: &'static str, response: &HttpResponse) -> Result<SessionTokens> {
        response.json::<SessionTokens>().map_err(|e| {
            warn!(operation, error = %e, "Auth service returned malformed session payload");
            AuthError::InvalidResponse(format!("{} payload: {}", operation, e))
        })
    }

    fn json_payload(operation: &'static str, response: &HttpResponse) -> Result<Value> {
        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        response.json::<Value>().map_err(|e| {
            warn!(operation, error = %e, "Auth service returned non-JSON payload");
            AuthError::InvalidResponse(format!("{} payload: {}", operation, e))
        })
    }
}
