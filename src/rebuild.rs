use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::warn;

/// A request to recompute one application's routes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildSignal {
    pub app_name: String,
}

/// Downstream consumer of rebuild signals.
///
/// Enqueueing is fire-and-forget; duplicates for the same application are
/// expected to be coalesced by the implementation.
pub trait RebuildQueue: Send + Sync {
    fn enqueue_routes_rebuild(&self, app_name: &str);
}

/// Hands signals to an in-process consumer over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelRebuildQueue {
    tx: mpsc::UnboundedSender<RebuildSignal>,
}

impl ChannelRebuildQueue {
    pub fn new() -> (Self, UnboundedReceiverStream<RebuildSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, UnboundedReceiverStream::new(rx))
    }
}

impl RebuildQueue for ChannelRebuildQueue {
    fn enqueue_routes_rebuild(&self, app_name: &str) {
        let signal = RebuildSignal {
            app_name: app_name.to_string(),
        };
        if self.tx.send(signal).is_err() {
            warn!(app = app_name, "rebuild queue closed, dropping signal");
        }
    }
}
