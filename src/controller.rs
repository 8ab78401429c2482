use k8s_openapi::api::core::v1::{Node, Pod, Service};
use parking_lot::Mutex;
use serde::Serialize;
use std::{fmt::Debug, sync::Arc, time::Duration};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cluster::Cluster;
use crate::dispatch::RouteRebuildHandler;
use crate::error::{Error, Result};
use crate::rebuild::RebuildQueue;
use crate::source::{EventStream, SourceFactory, WatchSource};
use crate::sync::wait_for_sync;
use crate::watcher::{ResourceKind, WatchStream};

#[derive(Default)]
struct Streams {
    pods: Option<Arc<WatchStream<Pod>>>,
    services: Option<Arc<WatchStream<Service>>>,
    nodes: Option<Arc<WatchStream<Node>>>,
}

/// Ties a resource type to its lazily created stream slot
trait Tracked:
    kube::Resource<DynamicType = ()> + Clone + Debug + Serialize + Send + Sync + 'static
{
    const KIND: ResourceKind;

    fn slot(streams: &mut Streams) -> &mut Option<Arc<WatchStream<Self>>>;

    fn open(source: &dyn WatchSource) -> EventStream<Self>;
}

impl Tracked for Pod {
    const KIND: ResourceKind = ResourceKind::Pod;

    fn slot(streams: &mut Streams) -> &mut Option<Arc<WatchStream<Self>>> {
        &mut streams.pods
    }

    fn open(source: &dyn WatchSource) -> EventStream<Self> {
        source.pods()
    }
}

impl Tracked for Service {
    const KIND: ResourceKind = ResourceKind::Service;

    fn slot(streams: &mut Streams) -> &mut Option<Arc<WatchStream<Self>>> {
        &mut streams.services
    }

    fn open(source: &dyn WatchSource) -> EventStream<Self> {
        source.services()
    }
}

impl Tracked for Node {
    const KIND: ResourceKind = ResourceKind::Node;

    fn slot(streams: &mut Streams) -> &mut Option<Arc<WatchStream<Self>>> {
        &mut streams.nodes
    }

    fn open(source: &dyn WatchSource) -> EventStream<Self> {
        source.nodes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterStatus {
    pub name: String,
    pub started: bool,
    pub stopped: bool,
    /// Sync state of each stream opened so far
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pods_synced: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services_synced: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes_synced: Option<bool>,
}

/// Watches one cluster.
///
/// Streams are opened on first use and live as long as the controller. The
/// stop token is the only teardown primitive: cancelling it ends every
/// stream driver and unblocks any sync wait.
pub struct ClusterController {
    cluster: Arc<dyn Cluster>,
    factory: Arc<dyn SourceFactory>,
    queue: Arc<dyn RebuildQueue>,
    sync_timeout: Duration,
    stop: CancellationToken,
    started: OnceCell<()>,
    source: Mutex<Option<Arc<dyn WatchSource>>>,
    streams: Mutex<Streams>,
}

impl ClusterController {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        factory: Arc<dyn SourceFactory>,
        queue: Arc<dyn RebuildQueue>,
        sync_timeout: Duration,
    ) -> Self {
        Self {
            cluster,
            factory,
            queue,
            sync_timeout,
            stop: CancellationToken::new(),
            started: OnceCell::new(),
            source: Mutex::new(None),
            streams: Mutex::new(Streams::default()),
        }
    }

    pub fn cluster(&self) -> &Arc<dyn Cluster> {
        &self.cluster
    }

    /// Waits for the pod stream's initial list, then routes pod events to
    /// the rebuild queue. Runs once; later calls return immediately.
    pub async fn start(&self) -> Result<()> {
        self.started
            .get_or_try_init(|| async {
                let pods = self.stream::<Pod>(false).await?;
                wait_for_sync(&pods, &self.stop, self.sync_timeout).await?;
                pods.add_handler(Arc::new(RouteRebuildHandler::new(
                    self.cluster.clone(),
                    self.queue.clone(),
                )));
                info!(cluster = self.cluster.name(), "cluster controller started");
                Ok::<(), Error>(())
            })
            .await?;
        Ok(())
    }

    pub fn stop(&self) {
        let _streams = self.streams.lock();
        if !self.stop.is_cancelled() {
            info!(cluster = self.cluster.name(), "stopping cluster controller");
        }
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub async fn pod_stream(&self) -> Result<Arc<WatchStream<Pod>>> {
        self.stream(true).await
    }

    pub async fn service_stream(&self, wait: bool) -> Result<Arc<WatchStream<Service>>> {
        self.stream(wait).await
    }

    pub async fn node_stream(&self, wait: bool) -> Result<Arc<WatchStream<Node>>> {
        self.stream(wait).await
    }

    pub fn status(&self) -> ClusterStatus {
        let streams = self.streams.lock();
        ClusterStatus {
            name: self.cluster.name().to_string(),
            started: self.started.initialized(),
            stopped: self.is_stopped(),
            pods_synced: streams.pods.as_ref().map(|s| s.has_synced()),
            services_synced: streams.services.as_ref().map(|s| s.has_synced()),
            nodes_synced: streams.nodes.as_ref().map(|s| s.has_synced()),
        }
    }

    async fn stream<K: Tracked>(&self, wait: bool) -> Result<Arc<WatchStream<K>>> {
        let stream = self.get_or_create::<K>()?;
        if wait {
            wait_for_sync(&stream, &self.stop, self.sync_timeout).await?;
        }
        Ok(stream)
    }

    // Stream slots are only filled under the `streams` lock with the stop
    // token checked, and `stop` cancels under the same lock, so no stream is
    // created once stop has returned. The source is built under its own lock
    // so a slow build never blocks stop.
    fn get_or_create<K: Tracked>(&self) -> Result<Arc<WatchStream<K>>> {
        if let Some(stream) = self.existing::<K>()? {
            return Ok(stream);
        }

        let source = self.source()?;

        let mut streams = self.streams.lock();
        if self.is_stopped() {
            return Err(self.stopped());
        }
        if let Some(stream) = K::slot(&mut streams) {
            return Ok(stream.clone());
        }
        let stream = WatchStream::spawn(
            K::KIND,
            self.cluster.name(),
            K::open(source.as_ref()),
            self.stop.clone(),
        );
        *K::slot(&mut streams) = Some(stream.clone());
        Ok(stream)
    }

    fn existing<K: Tracked>(&self) -> Result<Option<Arc<WatchStream<K>>>> {
        let mut streams = self.streams.lock();
        if self.is_stopped() {
            return Err(self.stopped());
        }
        Ok(K::slot(&mut streams).clone())
    }

    fn source(&self) -> Result<Arc<dyn WatchSource>> {
        let mut source = self.source.lock();
        if let Some(source) = source.as_ref() {
            return Ok(source.clone());
        }
        let built = self.factory.build(self.cluster.as_ref())?;
        *source = Some(built.clone());
        Ok(built)
    }

    fn stopped(&self) -> Error {
        Error::Stopped(self.cluster.name().to_string())
    }
}

impl Debug for ClusterController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterController")
            .field("cluster", &self.cluster.name())
            .field("started", &self.started.initialized())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Drop for ClusterController {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
