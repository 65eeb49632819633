//! # Host Bridge Traits
//!
//! Capability traits the session core needs from its host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the session core and the
//! platform-specific pieces it must not hard-wire: the network transport, the
//! durable key-value store, browser-style location and storage-event access,
//! and access-token claim extraction. Each host (desktop, mobile, web) ships
//! concrete adapters.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Single request/response exchange with
//!   optional credential (cookie) attachment
//!
//! ### Storage
//! - [`KeyValueStore`](storage::KeyValueStore) - Durable string store holding
//!   the refresh token (localStorage, SQLite, AsyncStorage, ...)
//!
//! ### Platform Integration
//! - [`PlatformAdapter`](platform::PlatformAdapter) - Current location,
//!   history rewrite, storage-change events, shared signals
//! - [`TokenDecoder`](token::TokenDecoder) - Claim extraction from access tokens
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Headless Hosts
//!
//! Hosts without a browser location or cross-context storage events use
//! [`HeadlessPlatform`](platform::HeadlessPlatform); every platform capability
//! then degrades to a no-op instead of failing.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform-specific errors into it with actionable messages
//! and must never include secret values in the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single implementation can be
//! shared across the session manager's background tasks.
//!
//! ## Examples
//!
//! ### Implementing KeyValueStore
//!
//! ```ignore
//! use bridge_traits::storage::KeyValueStore;
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct BrowserLocalStorage { /* web_sys::Storage */ }
//!
//! #[async_trait]
//! impl KeyValueStore for BrowserLocalStorage {
//!     async fn get(&self, key: &str) -> Result<Option<String>> { todo!() }
//!     async fn set(&self, key: &str, value: &str) -> Result<()> { todo!() }
//!     async fn clear(&self) -> Result<()> { todo!() }
//! }
//! ```

pub mod error;
pub mod http;
pub mod platform;
pub mod storage;
pub mod time;
pub mod token;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use platform::{HeadlessPlatform, PlatformAdapter, StorageChange};
pub use storage::KeyValueStore;
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, StderrLogger, SystemClock};
pub use token::{Claims, TokenDecoder};
