//! Platform Adapter Abstraction
//!
//! Browser hosts expose three globals the session core cares about: the
//! current location (to import a refresh token handed over by an OAuth
//! redirect), the history API (to strip that token from the address bar), and
//! `storage` events fired in *other* tabs when shared storage changes (to
//! propagate logout). This trait hides them behind one capability so native
//! hosts can opt out with [`HeadlessPlatform`].

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{BridgeError, Result};

/// A change to shared storage made by another browsing context.
///
/// Mirrors the browser `StorageEvent`: `key` is `None` when the other context
/// cleared the whole store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    /// Changed key, or `None` for a full clear
    pub key: Option<String>,
    /// Value after the change, `None` when removed
    pub new_value: Option<String>,
}

impl StorageChange {
    /// A single key was written
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            new_value: Some(value.into()),
        }
    }

    /// The whole store was cleared
    pub fn cleared() -> Self {
        Self {
            key: None,
            new_value: None,
        }
    }

    /// Whether this change touched `key`
    pub fn is_key(&self, key: &str) -> bool {
        self.key.as_deref() == Some(key)
    }
}

/// Platform adapter trait
///
/// Every method has a headless default, so an implementation only overrides
/// what its platform actually provides.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::platform::PlatformAdapter;
///
/// fn has_redirect_token(platform: &dyn PlatformAdapter) -> bool {
///     platform
///         .current_url()
///         .map(|url| url.contains("refresh_token="))
///         .unwrap_or(false)
/// }
/// ```
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Absolute URL of the current location, if the host has one
    fn current_url(&self) -> Option<String> {
        None
    }

    /// Rewrite the current location without reloading (history.replaceState)
    fn replace_url(&self, _url: &str) -> Result<()> {
        Err(BridgeError::NotAvailable(
            "Location rewriting is not supported on this platform".to_string(),
        ))
    }

    /// Subscribe to storage changes made by other contexts
    ///
    /// Returns `None` when the platform has no cross-context storage events.
    /// Changes made through this adapter's own context must not be delivered
    /// back to it.
    fn storage_changes(&self) -> Option<broadcast::Receiver<StorageChange>> {
        None
    }

    /// Write a value other contexts observe as a [`StorageChange`]
    async fn write_shared_signal(&self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }
}

/// Platform adapter for hosts without a location bar or sibling contexts.
///
/// Bootstrap import and cross-tab sync become no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessPlatform;

impl PlatformAdapter for HeadlessPlatform {}
