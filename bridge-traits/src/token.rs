//! Access Token Decoding Abstraction
//!
//! The session core never verifies signatures; it only needs the
//! application-specific claims embedded in the access token. Hosts may inject
//! their own decoder (e.g. one backed by a platform JWT library).

use serde_json::{Map, Value};

use crate::error::Result;

/// Decoded application claims: claim name to JSON value.
pub type Claims = Map<String, Value>;

/// Claim extraction trait
///
/// Implementations return the application's custom claims object from an
/// access token, or [`BridgeError::Decode`](crate::error::BridgeError::Decode)
/// when the token is not decodable or lacks the claims block.
pub trait TokenDecoder: Send + Sync {
    /// Extract the claims carried by `access_token`
    fn decode(&self, access_token: &str) -> Result<Claims>;
}
