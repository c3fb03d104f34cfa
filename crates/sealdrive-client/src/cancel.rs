//! Cancellation helpers
//!
//! Every public drive operation takes a [`CancellationToken`]. Network calls
//! are only started while the token is live, and an in-flight call is
//! abandoned as soon as the token fires.

use crate::{DriveError, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Derive a token that cancels itself after `after`, or earlier with `parent`
///
/// Must be called from within a tokio runtime.
pub fn deadline_token(parent: &CancellationToken, after: Duration) -> CancellationToken {
    let token = parent.child_token();
    let timer = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(after) => timer.cancel(),
            _ = timer.cancelled() => {}
        }
    });
    token
}

/// Fail with `Cancelled` if the token has fired
pub(crate) fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(DriveError::Cancelled);
    }
    Ok(())
}

/// Run `call` unless cancelled, abandoning it if the token fires first
pub(crate) async fn guarded<T, E, F>(cancel: &CancellationToken, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<DriveError>,
{
    ensure_active(cancel)?;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DriveError::Cancelled),
        result = call => result.map_err(Into::into),
    }
}
