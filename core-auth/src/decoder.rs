//! JWT claim extraction
//!
//! Reads the application claims object from a JWT payload without verifying
//! the signature; the auth service is trusted and the token is only ever
//! presented back to it.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::token::{Claims, TokenDecoder};
use serde_json::Value;

/// Decodes `header.payload.signature` tokens and returns the object stored
/// under the configured namespace key of the payload.
#[derive(Debug, Clone)]
pub struct JwtClaimsDecoder {
    namespace: String,
}

impl JwtClaimsDecoder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn payload(access_token: &str) -> Result<Value> {
        let mut segments = access_token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => {
                return Err(BridgeError::Decode(
                    "Token is not a three-part JWT".to_string(),
                ))
            }
        };

        // Some issuers pad the segment; the no-pad engine rejects '='.
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| BridgeError::Decode(format!("Payload is not base64url: {}", e)))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| BridgeError::Decode(format!("Payload is not JSON: {}", e)))
    }
}

impl TokenDecoder for JwtClaimsDecoder {
    fn decode(&self, access_token: &str) -> Result<Claims> {
        match Self::payload(access_token)? {
            Value::Object(mut payload) => match payload.remove(&self.namespace) {
                Some(Value::Object(claims)) => Ok(claims),
                Some(_) => Err(BridgeError::Decode(format!(
                    "Claims under '{}' are not an object",
                    self.namespace
                ))),
                None => Err(BridgeError::Decode(format!(
                    "Payload has no '{}' claims",
                    self.namespace
                ))),
            },
            _ => Err(BridgeError::Decode(
                "Payload is not a JSON object".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE;
    use serde_json::json;

    const NS: &str = "https://hasura.io/jwt/claims";

    fn token_with_payload(payload: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).unwrap());
        format!("{}.{}.signature", header, body)
    }

    #[test]
    fn test_decodes_namespaced_claims() {
        let token = token_with_payload(&json!({
            "sub": "42",
            NS: { "x-hasura-user-id": "42", "x-hasura-default-role": "user" }
        }));

        let claims = JwtClaimsDecoder::new(NS).decode(&token).unwrap();

        assert_eq!(claims.len(), 2);
        assert_eq!(claims["x-hasura-user-id"], "42");
    }

    #[test]
    fn test_custom_namespace() {
        let token = token_with_payload(&json!({ "app": { "role": "admin" } }));

        let claims = JwtClaimsDecoder::new("app").decode(&token).unwrap();
        assert_eq!(claims["role"], "admin");
    }

    #[test]
    fn test_tolerates_padded_payload() {
        let header = URL_SAFE_NO_PAD.encode(b"{}");
        let body = URL_SAFE.encode(serde_json::to_vec(&json!({ NS: { "a": 1 } })).unwrap());
        let token = format!("{}.{}.sig", header, body);

        let claims = JwtClaimsDecoder::new(NS).decode(&token).unwrap();
        assert_eq!(claims["a"], 1);
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        let decoder = JwtClaimsDecoder::new(NS);

        assert!(matches!(decoder.decode("opaque"), Err(BridgeError::Decode(_))));
        assert!(matches!(decoder.decode("a.b.c.d"), Err(BridgeError::Decode(_))));
        assert!(matches!(decoder.decode("a.!!!.c"), Err(BridgeError::Decode(_))));

        let not_json = format!("h.{}.s", URL_SAFE_NO_PAD.encode(b"not json"));
        assert!(matches!(decoder.decode(&not_json), Err(BridgeError::Decode(_))));
    }

    #[test]
    fn test_rejects_missing_or_non_object_claims() {
        let decoder = JwtClaimsDecoder::new(NS);

        let missing = token_with_payload(&json!({ "sub": "42" }));
        assert!(matches!(decoder.decode(&missing), Err(BridgeError::Decode(_))));

        let scalar = token_with_payload(&json!({ NS: "nope" }));
        assert!(matches!(decoder.decode(&scalar), Err(BridgeError::Decode(_))));
    }
}
