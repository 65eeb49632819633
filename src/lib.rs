//! Workspace facade crate.
//!
//! Re-exports the session crates so host applications can depend on
//! `session-workspace` alone and pick a platform profile through features:
//! `desktop-shims` (reqwest + SQLite defaults) or `headless` (bring your own
//! bridges).

#[cfg(any(feature = "desktop-shims", feature = "headless"))]
pub use bridge_traits as bridge;
#[cfg(any(feature = "desktop-shims", feature = "headless"))]
pub use core_auth as auth;
#[cfg(any(feature = "desktop-shims", feature = "headless"))]
pub use core_runtime as runtime;

#[cfg(any(feature = "desktop-shims", feature = "headless"))]
pub use core_auth::{AuthError, AuthStatus, SessionManager, SessionTokens};
#[cfg(any(feature = "desktop-shims", feature = "headless"))]
pub use core_runtime::config::AuthConfig;
