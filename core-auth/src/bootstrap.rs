//! Redirect token import
//!
//! External sign-in flows hand the refresh token back through the landing
//! URL (`?refresh_token=...&auth_success=1`). [`BootstrapImporter`] moves it
//! into the durable store once, then rewrites the location without those
//! parameters so the token does not linger in history or get re-imported.

use crate::error::Result;
use crate::token_store::TokenStore;
use bridge_traits::platform::PlatformAdapter;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Query parameter carrying the redirected refresh token.
pub const REFRESH_TOKEN_PARAM: &str = "refresh_token";
/// Marker parameter added by the auth service on success.
pub const AUTH_SUCCESS_PARAM: &str = "auth_success";

/// What a bootstrap run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// A refresh token was already persisted; the location was not inspected.
    ExistingSession,
    /// The location carried no refresh token (or there is no location).
    NothingToImport,
    /// A token was imported from the location.
    Imported,
}

pub struct BootstrapImporter {
    token_store: TokenStore,
    platform: Arc<dyn PlatformAdapter>,
}

impl BootstrapImporter {
    pub fn new(token_store: TokenStore, platform: Arc<dyn PlatformAdapter>) -> Self {
        Self {
            token_store,
            platform,
        }
    }

    /// Import a redirect-delivered refresh token if no session is persisted.
    ///
    /// Only storage failures are errors; an unparsable location or a
    /// platform that cannot rewrite it is logged and tolerated.
    pub async fn run(&self) -> Result<BootstrapOutcome> {
        if self.token_store.has_refresh_token().await? {
            debug!("Refresh token already persisted; skipping redirect import");
            return Ok(BootstrapOutcome::ExistingSession);
        }

        let Some(current) = self.platform.current_url() else {
            return Ok(BootstrapOutcome::NothingToImport);
        };

        let mut location = match Url::parse(&current) {
            Ok(location) => location,
            Err(e) => {
                warn!(error = %e, "Current location is not a valid URL; skipping import");
                return Ok(BootstrapOutcome::NothingToImport);
            }
        };

        let Some(refresh_token) = location
            .query_pairs()
            .find(|(name, _)| name == REFRESH_TOKEN_PARAM)
            .map(|(_, value)| value.into_owned())
        else {
            return Ok(BootstrapOutcome::NothingToImport);
        };

        self.token_store.store_refresh_token(&refresh_token).await?;
        info!("Imported refresh token from redirect");

        strip_auth_params(&mut location);
        if let Err(e) = self.platform.replace_url(location.as_str()) {
            warn!(error = %e, "Could not remove auth parameters from location");
        }

        Ok(BootstrapOutcome::Imported)
    }
}

/// Remove the redirect parameters, keeping every other pair in order.
fn strip_auth_params(location: &mut Url) {
    let remaining: Vec<(String, String)> = location
        .query_pairs()
        .filter(|(name, _)| name != REFRESH_TOKEN_PARAM && name != AUTH_SUCCESS_PARAM)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    if remaining.is_empty() {
        location.set_query(None);
    } else {
        location
            .query_pairs_mut()
            .clear()
            .extend_pairs(remaining.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
}
