//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, with a cookie jar for credentialed requests
//! - `KeyValueStore` using a SQLite-backed table, opened eagerly or on first use
//! - `MemoryKeyValueStore` for volatile, single-process storage
//! - `SharedStorageHub` / `StorageContext` emulating several browser tabs that
//!   share one localStorage, including storage-change events
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SqliteKeyValueStore};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let storage = SqliteKeyValueStore::new("/tmp/session.db").await?;
//!
//!     // Hand both to the auth configuration builder
//!     Ok(())
//! }
//! ```

mod http;
mod kv_store;
mod memory;

pub use http::ReqwestHttpClient;
pub use kv_store::{default_data_dir, DeferredSqliteStore, SqliteKeyValueStore, DEFAULT_DB_FILE};
pub use memory::{MemoryKeyValueStore, SharedStorageHub, StorageContext};
