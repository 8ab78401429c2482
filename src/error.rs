use std::time::Duration;

use thiserror::Error;

use crate::watcher::ResourceKind;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Client construction or API failure
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A watch stream did not finish its initial list
    #[error("sync wait failed for {kind} stream: {source}")]
    SyncWait {
        kind: ResourceKind,
        #[source]
        source: SyncError,
    },

    #[error("controller for cluster {0} is stopped")]
    Stopped(String),

    #[error("tombstone {key} contained object that is not a {expected}: {found}")]
    MalformedTombstone {
        key: String,
        expected: String,
        found: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("routing locality error: {0}")]
    RoutingLocality(String),
}

/// Why a bounded wait gave up
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("cancelled by controller stop")]
    Cancelled,
}

impl Error {
    pub fn routing_locality(msg: impl Into<String>) -> Self {
        Self::RoutingLocality(msg.into())
    }

    /// The cause of a failed sync wait, if this is one
    pub fn sync_cause(&self) -> Option<&SyncError> {
        match self {
            Self::SyncWait { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
