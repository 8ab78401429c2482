use kube::Resource;
use std::{future::Future, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result, SyncError};
use crate::watcher::WatchStream;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    Completed(T),
    DeadlineExceeded,
    Cancelled,
}

/// Waits for `fut`, giving up after `timeout` or as soon as `stop` fires.
///
/// A token that is already cancelled wins immediately.
pub async fn bounded_wait<F>(
    fut: F,
    stop: &CancellationToken,
    timeout: Duration,
) -> WaitOutcome<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = stop.cancelled() => WaitOutcome::Cancelled,
        res = tokio::time::timeout(timeout, fut) => match res {
            Ok(value) => WaitOutcome::Completed(value),
            Err(_) => WaitOutcome::DeadlineExceeded,
        },
    }
}

pub async fn wait_for_sync<K>(
    stream: &WatchStream<K>,
    stop: &CancellationToken,
    timeout: Duration,
) -> Result<()>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    if stream.has_synced() {
        return Ok(());
    }

    let source = match bounded_wait(stream.synced(), stop, timeout).await {
        WaitOutcome::Completed(()) => return Ok(()),
        WaitOutcome::DeadlineExceeded => SyncError::DeadlineExceeded(timeout),
        WaitOutcome::Cancelled => SyncError::Cancelled,
    };
    warn!(kind = %stream.kind(), "{source} while waiting for initial list");
    Err(Error::SyncWait {
        kind: stream.kind(),
        source,
    })
}
