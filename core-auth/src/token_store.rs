//! Durable Token Storage
//!
//! Thin wrapper over the host's [`KeyValueStore`] holding the refresh token.
//! The access token is never written here; it lives in the session manager's
//! memory only.
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::TokenStore;
//! use std::sync::Arc;
//! # use bridge_traits::storage::KeyValueStore;
//! # async fn example(backend: Arc<dyn KeyValueStore>) -> core_auth::Result<()> {
//! let token_store = TokenStore::new(backend);
//!
//! token_store.store_refresh_token("r-123").await?;
//! assert_eq!(token_store.refresh_token().await?.as_deref(), Some("r-123"));
//!
//! token_store.clear().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use bridge_traits::storage::KeyValueStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage key of the persisted refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Durable key-value persistence for the session.
///
/// Values are stored verbatim. Errors from the backend surface as
/// [`AuthError::StorageUnavailable`] and are logged without the value.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        debug!("Initializing TokenStore");
        Self { backend }
    }

    /// Read a raw value
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.backend.get(key).await.map_err(|e| {
            warn!(key = key, error = %e, "Failed to read from token storage");
            AuthError::StorageUnavailable(e.to_string())
        })
    }

    /// Write a raw value, replacing any previous one
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.backend.set(key, value).await.map_err(|e| {
            warn!(key = key, error = %e, "Failed to write to token storage");
            AuthError::StorageUnavailable(e.to_string())
        })
    }

    /// Remove everything in the store. No-op when already empty.
    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await.map_err(|e| {
            warn!(error = %e, "Failed to clear token storage");
            AuthError::StorageUnavailable(e.to_string())
        })?;
        debug!("Token storage cleared");
        Ok(())
    }

    pub async fn refresh_token(&self) -> Result<Option<String>> {
        self.get(REFRESH_TOKEN_KEY).await
    }

    pub async fn store_refresh_token(&self, refresh_token: &str) -> Result<()> {
        self.set(REFRESH_TOKEN_KEY, refresh_token).await
    }

    /// Whether a refresh token is currently persisted
    pub async fn has_refresh_token(&self) -> Result<bool> {
        Ok(self.refresh_token().await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use std::collections::HashMap;
    use std::sync::Mutex;

    // Mock KeyValueStore for testing
    struct MockKeyValueStore {
        data: Mutex<HashMap<String, String>>,
        fail: bool,
    }

    impl MockKeyValueStore {
        fn new() -> Self {
            Self {
                data: Mutex::new(HashMap::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                data: Mutex::new(HashMap::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl KeyValueStore for MockKeyValueStore {
        async fn get(&self, key: &str) -> BridgeResult<Option<String>> {
            if self.fail {
                return Err(BridgeError::Storage("quota exceeded".into()));
            }
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str) -> BridgeResult<()> {
            if self.fail {
                return Err(BridgeError::Storage("quota exceeded".into()));
            }
            self.data
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn clear(&self) -> BridgeResult<()> {
            if self.fail {
                return Err(BridgeError::Storage("quota exceeded".into()));
            }
            self.data.lock().unwrap().clear();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_refresh_token_roundtrip() {
        let token_store = TokenStore::new(Arc::new(MockKeyValueStore::new()));

        assert!(!token_store.has_refresh_token().await.unwrap());

        token_store.store_refresh_token("r-1").await.unwrap();
        assert_eq!(
            token_store.refresh_token().await.unwrap(),
            Some("r-1".to_string())
        );
        assert!(token_store.has_refresh_token().await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_keeps_latest() {
        let token_store = TokenStore::new(Arc::new(MockKeyValueStore::new()));

        token_store.store_refresh_token("r-1").await.unwrap();
        token_store.store_refresh_token("r-2").await.unwrap();

        assert_eq!(
            token_store.get(REFRESH_TOKEN_KEY).await.unwrap(),
            Some("r-2".to_string())
        );
    }

    #[tokio::test]
    async fn test_values_not_validated() {
        let token_store = TokenStore::new(Arc::new(MockKeyValueStore::new()));

        token_store.set("anything", "").await.unwrap();
        assert_eq!(token_store.get("anything").await.unwrap(), Some(String::new()));
    }

    #[tokio::test]
    async fn test_clear_removes_everything_and_is_idempotent() {
        let token_store = TokenStore::new(Arc::new(MockKeyValueStore::new()));

        token_store.clear().await.unwrap();

        token_store.store_refresh_token("r-1").await.unwrap();
        token_store.set("logout", "1700000000000").await.unwrap();
        token_store.clear().await.unwrap();

        assert_eq!(token_store.refresh_token().await.unwrap(), None);
        assert_eq!(token_store.get("logout").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_backend_failure_maps_to_storage_unavailable() {
        let token_store = TokenStore::new(Arc::new(MockKeyValueStore::failing()));

        let err = token_store.store_refresh_token("r-1").await.unwrap_err();
        assert!(matches!(err, AuthError::StorageUnavailable(_)));

        let err = token_store.refresh_token().await.unwrap_err();
        assert!(matches!(err, AuthError::StorageUnavailable(_)));
    }
}
