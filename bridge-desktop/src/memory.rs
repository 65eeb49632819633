//! In-process storage and multi-context platform emulation
//!
//! [`SharedStorageHub`] plays the role of a browser origin's localStorage:
//! every [`StorageContext`] opened on it (one per "tab") reads and writes the
//! same map, and each write is announced to every *other* context as a
//! [`StorageChange`]. Useful for embedding several session managers in one
//! process and for exercising cross-context logout in tests.

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    platform::{PlatformAdapter, StorageChange},
    storage::KeyValueStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::debug;

const CHANGE_BUFFER: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Volatile key-value store for a single context
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        lock(&self.entries).clear();
        Ok(())
    }
}

struct Subscriber {
    context_id: u64,
    sender: broadcast::Sender<StorageChange>,
}

#[derive(Default)]
struct HubState {
    entries: HashMap<String, String>,
    subscribers: Vec<Subscriber>,
}

/// Storage shared by several [`StorageContext`]s
#[derive(Clone, Default)]
pub struct SharedStorageHub {
    state: Arc<Mutex<HubState>>,
    next_id: Arc<AtomicU64>,
}

impl SharedStorageHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new context ("tab") on this hub
    pub fn open_context(&self) -> StorageContext {
        let context_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, _) = broadcast::channel(CHANGE_BUFFER);

        lock(&self.state).subscribers.push(Subscriber {
            context_id,
            sender: sender.clone(),
        });
        debug!(context_id, "Opened storage context");

        StorageContext {
            id: context_id,
            hub: self.clone(),
            changes: sender,
            location: Arc::new(Mutex::new(None)),
        }
    }

    /// Value currently stored under `key`, bypassing any context
    pub fn peek(&self, key: &str) -> Option<String> {
        lock(&self.state).entries.get(key).cloned()
    }

    fn write(&self, origin: u64, key: &str, value: &str) {
        let mut state = lock(&self.state);
        state.entries.insert(key.to_string(), value.to_string());
        Self::announce(&state, origin, StorageChange::set(key, value));
    }

    fn clear(&self, origin: u64) {
        let mut state = lock(&self.state);
        state.entries.clear();
        Self::announce(&state, origin, StorageChange::cleared());
    }

    fn announce(state: &HubState, origin: u64, change: StorageChange) {
        for subscriber in state.subscribers.iter().filter(|s| s.context_id != origin) {
            // No receivers yet is fine; the change is simply unobserved.
            let _ = subscriber.sender.send(change.clone());
        }
    }

    fn close(&self, context_id: u64) {
        lock(&self.state)
            .subscribers
            .retain(|s| s.context_id != context_id);
    }
}

/// One browsing context on a [`SharedStorageHub`]
///
/// Implements both [`KeyValueStore`] (the shared map) and
/// [`PlatformAdapter`] (a settable location plus change notifications from
/// sibling contexts).
#[derive(Clone)]
pub struct StorageContext {
    id: u64,
    hub: SharedStorageHub,
    changes: broadcast::Sender<StorageChange>,
    location: Arc<Mutex<Option<String>>>,
}

impl StorageContext {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Point this context's location at `url`
    pub fn navigate(&self, url: impl Into<String>) {
        *lock(&self.location) = Some(url.into());
    }

    /// Builder form of [`navigate`](Self::navigate)
    pub fn with_location(self, url: impl Into<String>) -> Self {
        self.navigate(url);
        self
    }

    /// Stop receiving sibling changes
    pub fn close(&self) {
        self.hub.close(self.id);
    }
}

#[async_trait]
impl KeyValueStore for StorageContext {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.hub.peek(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.hub.write(self.id, key, value);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.hub.clear(self.id);
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for StorageContext {
    fn current_url(&self) -> Option<String> {
        lock(&self.location).clone()
    }

    fn replace_url(&self, url: &str) -> Result<()> {
        *lock(&self.location) = Some(url.to_string());
        Ok(())
    }

    fn storage_changes(&self) -> Option<broadcast::Receiver<StorageChange>> {
        Some(self.changes.subscribe())
    }

    async fn write_shared_signal(&self, key: &str, value: &str) -> Result<()> {
        self.hub.write(self.id, key, value);
        Ok(())
    }
}
