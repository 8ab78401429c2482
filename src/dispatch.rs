use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::debug;

use crate::cluster::Cluster;
use crate::error::Result;
use crate::labels::LabelSet;
use crate::rebuild::{RebuildQueue, RebuildSignal};
use crate::watcher::{DeletedObject, EventHandler, Notification, PodEvent};

/// Decides whether a pod notification should trigger a routes rebuild.
///
/// Adds never do: a pod is not ready to serve traffic when first observed.
/// Updates that carry the same resource version are redeliveries and are
/// ignored. Deletes may arrive as tombstones; a tombstone that does not wrap
/// a pod is an error.
pub fn dispatch(event: &PodEvent, cluster: &dyn Cluster) -> Result<Option<RebuildSignal>> {
    match event {
        Notification::Added(_) => Ok(None),
        Notification::Updated { old, new } => {
            if old.metadata.resource_version == new.metadata.resource_version {
                return Ok(None);
            }
            Ok(rebuild_signal(new, cluster))
        }
        Notification::Deleted(DeletedObject::Object(pod)) => Ok(rebuild_signal(pod, cluster)),
        Notification::Deleted(DeletedObject::Tombstone(tombstone)) => {
            let pod: Pod = tombstone.recover()?;
            Ok(rebuild_signal(&pod, cluster))
        }
    }
}

fn rebuild_signal(pod: &Pod, cluster: &dyn Cluster) -> Option<RebuildSignal> {
    let labels = LabelSet::from_meta(&pod.metadata);
    let app_name = labels.app_name();
    if app_name.is_empty() {
        return None;
    }
    if labels.is_deploy() || labels.is_isolated_run() {
        return None;
    }

    match cluster.router_address_local(labels.app_pool()) {
        Ok(true) => Some(RebuildSignal {
            app_name: app_name.to_string(),
        }),
        Ok(false) => None,
        Err(err) => {
            debug!(
                cluster = cluster.name(),
                pod = %pod.name_any(),
                "assuming router address is not local: {err}"
            );
            None
        }
    }
}

/// Pod handler that forwards rebuild signals to the queue
pub struct RouteRebuildHandler {
    cluster: Arc<dyn Cluster>,
    queue: Arc<dyn RebuildQueue>,
}

impl RouteRebuildHandler {
    pub fn new(cluster: Arc<dyn Cluster>, queue: Arc<dyn RebuildQueue>) -> Self {
        Self { cluster, queue }
    }
}

impl EventHandler<Pod> for RouteRebuildHandler {
    fn handle(&self, notification: &PodEvent) -> Result<()> {
        if let Some(signal) = dispatch(notification, self.cluster.as_ref())? {
            debug!(
                cluster = self.cluster.name(),
                app = %signal.app_name,
                "enqueueing routes rebuild after pod {}",
                notification.verb()
            );
            self.queue.enqueue_routes_rebuild(&signal.app_name);
        }
        Ok(())
    }
}
