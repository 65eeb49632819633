//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the session core:
//! - Configuration ([`config::AuthConfig`]) with fail-fast validation
//! - Lifecycle event bus ([`events::EventBus`])
//! - Logging and tracing setup ([`logging::init_logging`])
//!
//! ## Overview
//!
//! Nothing here knows how a session works; it wires host capabilities
//! together and gives the auth layer a place to publish what happened.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{AuthConfig, AuthConfigBuilder};
pub use error::{Error, Result};
pub use events::{AuthEvent, CoreEvent, EventBus, SignInMethod, SignOutReason};
