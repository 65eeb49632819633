//! # Auth Configuration Module
//!
//! Builder-based configuration for the session core.
//!
//! ## Overview
//!
//! [`AuthConfig`] is immutable once built. It carries the remote endpoint,
//! timing parameters, and every host capability the session manager talks
//! to. The builder validates eagerly so a misconfigured host fails at
//! startup, not at the first login.
//!
//! ## Required
//!
//! - `endpoint` - Base URL of the auth service (`https://auth.example.com`)
//! - `KeyValueStore` - Durable storage for the refresh token
//! - `HttpClient` - Transport for auth requests
//!
//! With the `desktop-shims` feature, the last two default to a SQLite store in
//! the platform data directory and a reqwest client.
//!
//! ## Optional (with defaults)
//!
//! - `PlatformAdapter` - [`HeadlessPlatform`]: no redirect import, no cross-tab sync
//! - `Clock` - [`SystemClock`]
//! - `TokenDecoder` - unset; the session manager falls back to its JWT decoder
//! - `refresh_interval` - 5 minutes
//! - `claims_namespace` - `https://hasura.io/jwt/claims`
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::AuthConfig;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = AuthConfig::builder()
//!     .endpoint("https://auth.example.com")
//!     .app_id("dashboard")
//!     .refresh_interval(Duration::from_secs(120))
//!     .storage(Arc::new(MyStore))
//!     .http_client(Arc::new(MyHttpClient))
//!     .build()?;
//! ```
//!
//! Missing capabilities produce [`Error::CapabilityMissing`] naming what to
//! inject:
//!
//! ```should_panic
//! use core_runtime::config::AuthConfig;
//!
//! let config = AuthConfig::builder()
//!     .build()
//!     .expect("Should fail - endpoint is required");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{
    Clock, HeadlessPlatform, HttpClient, KeyValueStore, PlatformAdapter, SystemClock,
    TokenDecoder,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Default interval between background refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// JWT payload key holding the application claims by default.
pub const DEFAULT_CLAIMS_NAMESPACE: &str = "https://hasura.io/jwt/claims";

/// Configuration for a session manager instance.
#[derive(Clone)]
pub struct AuthConfig {
    /// Base URL of the auth service, without trailing slash
    pub endpoint: String,

    /// Application identifier sent with login requests as `appId`
    pub app_id: Option<String>,

    /// Period of the background refresh cycle
    pub refresh_interval: Duration,

    /// Per-request timeout forwarded to the transport
    pub request_timeout: Option<Duration>,

    /// JWT payload key whose object holds the application claims
    pub claims_namespace: String,

    /// Capacity of the lifecycle event bus
    pub event_buffer_size: usize,

    /// Durable refresh-token storage
    pub storage: Arc<dyn KeyValueStore>,

    pub http_client: Arc<dyn HttpClient>,

    /// Location access and cross-context signals
    pub platform: Arc<dyn PlatformAdapter>,

    pub clock: Arc<dyn Clock>,

    /// Custom claim extraction; `None` selects the built-in JWT decoder
    pub token_decoder: Option<Arc<dyn TokenDecoder>>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("endpoint", &self.endpoint)
            .field("app_id", &self.app_id)
            .field("refresh_interval", &self.refresh_interval)
            .field("request_timeout", &self.request_timeout)
            .field("claims_namespace", &self.claims_namespace)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("storage", &"KeyValueStore { ... }")
            .field("http_client", &"HttpClient { ... }")
            .field("platform", &"PlatformAdapter { ... }")
            .field(
                "token_decoder",
                &self.token_decoder.as_ref().map(|_| "TokenDecoder { ... }"),
            )
            .finish()
    }
}

impl AuthConfig {
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Checks value constraints; capabilities are enforced by the builder.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval.is_zero() {
            return Err(Error::Config(
                "Refresh interval must be greater than zero".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        if self.claims_namespace.trim().is_empty() {
            return Err(Error::Config(
                "Claims namespace cannot be empty".to_string(),
            ));
        }

        if matches!(self.request_timeout, Some(timeout) if timeout.is_zero()) {
            return Err(Error::Config(
                "Request timeout must be greater than zero when set".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalize_endpoint(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed).map_err(|e| {
        Error::Config(format!(
            "Endpoint '{}' is not a valid absolute URL: {}",
            raw, e
        ))
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "Endpoint must use http or https, got '{}'",
            parsed.scheme()
        )));
    }

    if parsed.host_str().is_none() {
        return Err(Error::Config(format!("Endpoint '{}' has no host", raw)));
    }

    Ok(trimmed.to_string())
}

#[cfg(not(feature = "desktop-shims"))]
fn storage_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "KeyValueStore".to_string(),
        message: "KeyValueStore implementation is required to persist the refresh token. \
                 Desktop: enable the 'desktop-shims' feature to use the default SQLite store. \
                 Mobile: inject AsyncStorage/SharedPreferences-backed storage. \
                 Web: inject localStorage-backed storage."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to reach the auth service. \
                 Desktop: enable the 'desktop-shims' feature to use the default reqwest client. \
                 Other hosts: inject a client that attaches cookies when asked to."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_storage(database_path: Option<PathBuf>) -> Result<Arc<dyn KeyValueStore>> {
    use bridge_desktop::{default_data_dir, DeferredSqliteStore, DEFAULT_DB_FILE};

    let path = match database_path {
        Some(path) => path,
        None => default_data_dir()
            .map(|dir| dir.join(DEFAULT_DB_FILE))
            .ok_or_else(|| {
                Error::Config(
                    "No platform data directory found for the default store. \
                     Use .database_path() or .storage() to set one."
                        .to_string(),
                )
            })?,
    };

    let store: Arc<dyn KeyValueStore> = Arc::new(DeferredSqliteStore::new(path));
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_storage(_database_path: Option<PathBuf>) -> Result<Arc<dyn KeyValueStore>> {
    Err(storage_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Option<Duration>) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = match timeout {
        Some(timeout) => ReqwestHttpClient::with_timeout(timeout),
        None => ReqwestHttpClient::new(),
    }
    .map_err(|e| Error::Internal(format!("Failed to initialize default HttpClient: {}", e)))?;

    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Option<Duration>) -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

/// Builder for [`AuthConfig`].
#[derive(Default)]
pub struct AuthConfigBuilder {
    endpoint: Option<String>,
    app_id: Option<String>,
    refresh_interval: Option<Duration>,
    request_timeout: Option<Duration>,
    claims_namespace: Option<String>,
    event_buffer_size: Option<usize>,
    database_path: Option<PathBuf>,
    storage: Option<Arc<dyn KeyValueStore>>,
    http_client: Option<Arc<dyn HttpClient>>,
    platform: Option<Arc<dyn PlatformAdapter>>,
    clock: Option<Arc<dyn Clock>>,
    token_decoder: Option<Arc<dyn TokenDecoder>>,
}

impl AuthConfigBuilder {
    /// Sets the auth service base URL.
    ///
    /// ```
    /// use core_runtime::config::AuthConfig;
    ///
    /// let builder = AuthConfig::builder().endpoint("https://auth.example.com/");
    /// ```
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Sets the background refresh period (default 5 minutes).
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the JWT payload key holding the application claims.
    pub fn claims_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.claims_namespace = Some(namespace.into());
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Database file for the default desktop store.
    ///
    /// Ignored when a store is injected with [`storage`](Self::storage).
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn platform(mut self, platform: Arc<dyn PlatformAdapter>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn token_decoder(mut self, decoder: Arc<dyn TokenDecoder>) -> Self {
        self.token_decoder = Some(decoder);
        self
    }

    /// Builds the final `AuthConfig`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when the endpoint is missing or malformed, or a
    ///   value is out of range
    /// - [`Error::CapabilityMissing`] when storage or transport is neither
    ///   injected nor provided by `desktop-shims`
    pub fn build(self) -> Result<AuthConfig> {
        let endpoint = self.endpoint.ok_or_else(|| {
            Error::Config("Endpoint is required. Use .endpoint() to set it.".to_string())
        })?;
        let endpoint = normalize_endpoint(&endpoint)?;

        let storage = match self.storage {
            Some(storage) => storage,
            None => provide_default_storage(self.database_path)?,
        };

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(self.request_timeout)?,
        };

        let config = AuthConfig {
            endpoint,
            app_id: self.app_id,
            refresh_interval: self.refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL),
            request_timeout: self.request_timeout,
            claims_namespace: self
                .claims_namespace
                .unwrap_or_else(|| DEFAULT_CLAIMS_NAMESPACE.to_string()),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            storage,
            http_client,
            platform: self
                .platform
                .unwrap_or_else(|| Arc::new(HeadlessPlatform) as Arc<dyn PlatformAdapter>),
            clock: self
                .clock
                .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>),
            token_decoder: self.token_decoder,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, HttpRequest, HttpResponse};

    struct MockStore;

    #[async_trait]
    impl KeyValueStore for MockStore {
        async fn get(&self, _key: &str) -> std::result::Result<Option<String>, BridgeError> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &str) -> std::result::Result<(), BridgeError> {
            Ok(())
        }

        async fn clear(&self) -> std::result::Result<(), BridgeError> {
            Ok(())
        }
    }

    struct MockHttpClient;

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn execute(
            &self,
            _request: HttpRequest,
        ) -> std::result::Result<HttpResponse, BridgeError> {
            Ok(HttpResponse::new(204, ""))
        }
    }

    fn complete_builder() -> AuthConfigBuilder {
        AuthConfig::builder()
            .endpoint("https://auth.example.com")
            .storage(Arc::new(MockStore))
            .http_client(Arc::new(MockHttpClient))
    }

    #[test]
    fn test_build_with_defaults() {
        let config = complete_builder().build().unwrap();

        assert_eq!(config.endpoint, "https://auth.example.com");
        assert_eq!(config.refresh_interval, DEFAULT_REFRESH_INTERVAL);
        assert_eq!(config.claims_namespace, DEFAULT_CLAIMS_NAMESPACE);
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert!(config.app_id.is_none());
        assert!(config.request_timeout.is_none());
        assert!(config.token_decoder.is_none());
        assert!(config.platform.current_url().is_none());
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let config = complete_builder()
            .endpoint("https://auth.example.com/api/")
            .build()
            .unwrap();

        assert_eq!(config.endpoint, "https://auth.example.com/api");
    }

    #[test]
    fn test_builder_requires_endpoint() {
        let result = AuthConfig::builder()
            .storage(Arc::new(MockStore))
            .http_client(Arc::new(MockHttpClient))
            .build();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("Endpoint is required"));
    }

    #[test]
    fn test_builder_rejects_relative_endpoint() {
        let err = complete_builder().endpoint("/auth").build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_builder_rejects_non_http_scheme() {
        let err = complete_builder()
            .endpoint("ftp://auth.example.com")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn test_builder_rejects_zero_refresh_interval() {
        let err = complete_builder()
            .refresh_interval(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Refresh interval"));
    }

    #[test]
    fn test_builder_rejects_empty_claims_namespace() {
        let err = complete_builder()
            .claims_namespace("  ")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Claims namespace"));
    }

    #[test]
    fn test_builder_custom_values() {
        let config = complete_builder()
            .app_id("dashboard")
            .refresh_interval(Duration::from_secs(30))
            .request_timeout(Duration::from_secs(5))
            .claims_namespace("https://example.com/claims")
            .event_buffer_size(8)
            .build()
            .unwrap();

        assert_eq!(config.app_id.as_deref(), Some("dashboard"));
        assert_eq!(config.refresh_interval, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.claims_namespace, "https://example.com/claims");
        assert_eq!(config.event_buffer_size, 8);
    }

    #[test]
    fn test_debug_hides_capabilities() {
        let config = complete_builder().build().unwrap();
        let debug = format!("{:?}", config);

        assert!(debug.contains("https://auth.example.com"));
        assert!(debug.contains("KeyValueStore { ... }"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_storage() {
        let err = AuthConfig::builder()
            .endpoint("https://auth.example.com")
            .http_client(Arc::new(MockHttpClient))
            .build()
            .unwrap_err();

        match err {
            Error::CapabilityMissing { capability, .. } => assert_eq!(capability, "KeyValueStore"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_http_client() {
        let err = AuthConfig::builder()
            .endpoint("https://auth.example.com")
            .storage(Arc::new(MockStore))
            .build()
            .unwrap_err();

        assert!(err.to_string().contains("HttpClient"));
    }

    #[cfg(feature = "desktop-shims")]
    #[tokio::test]
    async fn test_build_with_desktop_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("session.db");

        let config = AuthConfig::builder()
            .endpoint("https://auth.example.com")
            .database_path(&db_path)
            .build()
            .expect("desktop defaults should succeed");

        config.storage.set("refresh_token", "r1").await.unwrap();
        assert_eq!(
            config.storage.get("refresh_token").await.unwrap().as_deref(),
            Some("r1")
        );

        assert!(db_path.exists());
    }
}
