//! # Session Core
//!
//! Client-side session management against a remote auth service.
//!
//! ## Overview
//!
//! A session is a long-lived refresh token kept in durable storage plus a
//! short-lived access token (and its decoded claims) kept in memory. The
//! [`SessionManager`] keeps the access token fresh on a timer, signs out
//! when a refresh fails, and propagates logout to sibling contexts sharing
//! the same store.
//!
//! ## Components
//!
//! - [`TokenStore`]: durable key-value persistence of the refresh token
//! - [`RemoteAuthClient`]: the auth service's HTTP operations
//! - [`JwtClaimsDecoder`]: default claim extraction from the access token
//! - [`SessionManager`]: the state machine tying everything together
//! - [`CrossTabSync`]: storage-change listener for cross-context logout
//! - [`BootstrapImporter`]: one-shot import of a redirect-delivered token

pub mod bootstrap;
pub mod client;
pub mod cross_tab;
pub mod decoder;
pub mod error;
pub mod manager;
pub mod token_store;
pub mod types;

pub use bootstrap::{BootstrapImporter, BootstrapOutcome};
pub use client::RemoteAuthClient;
pub use cross_tab::{CrossTabSync, LOGOUT_SIGNAL_KEY};
pub use decoder::JwtClaimsDecoder;
pub use error::{AuthError, Result};
pub use manager::SessionManager;
pub use token_store::{TokenStore, REFRESH_TOKEN_KEY};
pub use types::{AuthStatus, ListenerId, SessionSnapshot, SessionTokens};
