use futures::{StreamExt, stream::BoxStream};
use k8s_openapi::api::core::v1::{Node, Pod, Service};
use kube::{
    Client,
    api::Api,
    runtime::{
        WatchStreamExt,
        watcher::{self, Error as WatcherError},
    },
};
use std::{sync::Arc, time::Duration};
use tracing::debug;

use crate::cluster::Cluster;
use crate::error::Result;

/// The API server rejects watch timeouts of 295s and above
pub const MAX_LIST_TIMEOUT_SECS: u64 = 290;

pub type EventStream<K> = BoxStream<'static, Result<watcher::Event<K>, WatcherError>>;

/// Opens cluster-wide watch streams for the kinds the controllers track.
///
/// Each call opens a new subscription; callers are expected to open each
/// kind at most once.
pub trait WatchSource: Send + Sync {
    fn pods(&self) -> EventStream<Pod>;
    fn services(&self) -> EventStream<Service>;
    fn nodes(&self) -> EventStream<Node>;
}

pub trait SourceFactory: Send + Sync {
    fn build(&self, cluster: &dyn Cluster) -> Result<Arc<dyn WatchSource>>;
}

/// Builds watch sources backed by the cluster's API server
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeSourceFactory;

impl SourceFactory for KubeSourceFactory {
    fn build(&self, cluster: &dyn Cluster) -> Result<Arc<dyn WatchSource>> {
        let timeout = cluster.timeout();

        // The cluster timeout bounds each list/watch call instead of the
        // connection, so long-lived watches are not cut off.
        let mut config = cluster.kube_config().clone();
        config.read_timeout = None;
        config.write_timeout = None;
        let client = Client::try_from(config)?;

        let config = with_list_timeout(watcher::Config::default(), timeout);
        debug!(cluster = cluster.name(), timeout = ?config.timeout, "built watch source");

        Ok(Arc::new(KubeWatchSource { client, config }))
    }
}

/// Sets the per-call list/watch timeout to `timeout` unless one is already set.
pub fn with_list_timeout(mut config: watcher::Config, timeout: Duration) -> watcher::Config {
    if config.timeout.is_none() {
        let secs = timeout.as_secs().min(MAX_LIST_TIMEOUT_SECS);
        if secs > 0 {
            config.timeout = Some(secs as u32);
        }
    }
    config
}

#[derive(Clone)]
pub struct KubeWatchSource {
    client: Client,
    config: watcher::Config,
}

impl WatchSource for KubeWatchSource {
    fn pods(&self) -> EventStream<Pod> {
        let api: Api<Pod> = Api::all(self.client.clone());
        watcher::watcher(api, self.config.clone())
            .default_backoff()
            .boxed()
    }

    fn services(&self) -> EventStream<Service> {
        let api: Api<Service> = Api::all(self.client.clone());
        watcher::watcher(api, self.config.clone())
            .default_backoff()
            .boxed()
    }

    fn nodes(&self) -> EventStream<Node> {
        let api: Api<Node> = Api::all(self.client.clone());
        watcher::watcher(api, self.config.clone())
            .default_backoff()
            .boxed()
    }
}
