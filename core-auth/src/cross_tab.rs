//! Cross-context logout propagation
//!
//! Contexts sharing one durable store (browser tabs, several managers in one
//! process) announce a logout by writing a fresh timestamp under
//! [`LOGOUT_SIGNAL_KEY`]. [`CrossTabSync`] watches the platform's storage
//! change feed and runs a teardown callback whenever that key changes.

use bridge_traits::platform::{PlatformAdapter, StorageChange};
use bridge_traits::time::Clock;
use std::future::Future;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared key carrying the logout marker.
pub const LOGOUT_SIGNAL_KEY: &str = "logout";

/// Write the logout marker so sibling contexts tear down their sessions.
///
/// The value is the current Unix time in milliseconds, making every write
/// distinct. Failures are logged and swallowed: local logout must not depend
/// on the signal.
pub async fn signal_logout(platform: &dyn PlatformAdapter, clock: &dyn Clock) {
    let marker = clock.unix_timestamp_millis().to_string();
    if let Err(e) = platform.write_shared_signal(LOGOUT_SIGNAL_KEY, &marker).await {
        warn!(error = %e, "Failed to publish logout signal");
    } else {
        debug!(marker = %marker, "Published logout signal");
    }
}

/// Handle to a running storage-change listener.
///
/// Dropping the handle stops the listener.
#[derive(Debug)]
pub struct CrossTabSync {
    cancel: CancellationToken,
}

impl CrossTabSync {
    /// Start listening on `platform`'s change feed.
    ///
    /// `on_logout` runs for every change of [`LOGOUT_SIGNAL_KEY`]; returning
    /// `false` ends the listener (e.g. once the owning manager is gone).
    /// Returns `None` on platforms without a change feed.
    pub fn listen<F, Fut>(platform: &dyn PlatformAdapter, on_logout: F) -> Option<Self>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let Some(changes) = platform.storage_changes() else {
            debug!("Platform has no storage change feed; cross-tab sync disabled");
            return None;
        };

        let cancel = CancellationToken::new();
        tokio::spawn(run_listener(changes, cancel.clone(), on_logout));
        debug!("Cross-tab listener registered");

        Some(Self { cancel })
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl Drop for CrossTabSync {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_listener<F, Fut>(
    mut changes: broadcast::Receiver<StorageChange>,
    cancel: CancellationToken,
    on_logout: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    loop {
        let change = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            change = changes.recv() => change,
        };

        match change {
            Ok(change) if change.is_key(LOGOUT_SIGNAL_KEY) => {
                info!("Logout signalled by another context");
                let teardown = on_logout();
                if !teardown.await {
                    break;
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Cross-tab listener lagged behind storage changes");
            }
            Err(RecvError::Closed) => break,
        }
    }

    debug!("Cross-tab listener stopped");
}
