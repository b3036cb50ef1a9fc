use std::future::Future;
use std::io::ErrorKind;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{IoError, Result};

/// Run one transport operation, failing with [`IoError::Closed`] as soon as
/// the close signal fires. `Interrupted` is surfaced as `Ok(None)` so callers
/// re-issue the operation.
pub(crate) async fn until_closed<F>(closed: &CancellationToken, op: F) -> Result<Option<usize>>
where
    F: Future<Output = std::io::Result<usize>>,
{
    tokio::select! {
        biased;
        _ = closed.cancelled() => Err(IoError::Closed),
        outcome = op => match outcome {
            Ok(count) => Ok(Some(count)),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(None),
            Err(err) => Err(IoError::Transport(err)),
        },
    }
}

/// Closes the connection if a suspended request is dropped before it
/// resolves; the half-served request has already moved the buffer.
pub(crate) struct AbandonGuard {
    closed: CancellationToken,
    direction: &'static str,
    armed: bool,
}

impl AbandonGuard {
    pub(crate) fn new(closed: CancellationToken, direction: &'static str) -> Self {
        Self {
            closed,
            direction,
            armed: true,
        }
    }

    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if self.armed && !self.closed.is_cancelled() {
            warn!(
                direction = self.direction,
                "pending request dropped before completion; closing connection"
            );
            self.closed.cancel();
        }
    }
}
