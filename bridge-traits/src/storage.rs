//! Durable Key-Value Storage Abstraction
//!
//! The session core persists exactly one long-lived value (the refresh token)
//! and needs to wipe its namespace on logout. Anything that can do those three
//! things can back it: browser localStorage, React-Native AsyncStorage, a
//! SQLite table, a keychain-backed map.

use async_trait::async_trait;

use crate::error::Result;

/// Durable string key-value storage trait
///
/// Abstracts platform-specific persistent storage:
/// - Web: localStorage
/// - iOS/Android: UserDefaults / SharedPreferences / AsyncStorage
/// - Desktop: SQLite-backed table
///
/// # Requirements
///
/// Implementations MUST:
/// - Survive process restarts within the same client installation
/// - Store and return values verbatim (no trimming, no validation)
/// - Treat `clear` on an empty store as a successful no-op
/// - Never log stored values
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::KeyValueStore;
///
/// async fn remember(store: &dyn KeyValueStore, token: &str) -> Result<()> {
///     store.set("refresh_token", token).await
/// }
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieve a value
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove every entry in this store's namespace
    async fn clear(&self) -> Result<()>;
}
