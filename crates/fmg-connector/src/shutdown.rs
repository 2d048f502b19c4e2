//! Cancellable waits.

use std::time::Duration;

use fmg_rpc_common::{ConnectorError, ConnectorResult};
use tokio_util::sync::CancellationToken;

/// Sleeps for `duration` unless `cancel` fires first.
///
/// Returns [`ConnectorError::Cancelled`] naming `stage` when interrupted.
pub async fn sleep_or_cancel(
    cancel: &CancellationToken,
    duration: Duration,
    stage: &str,
) -> ConnectorResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ConnectorError::cancelled(stage)),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
