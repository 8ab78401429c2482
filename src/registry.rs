use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tracing::{info, warn};

use crate::cluster::Cluster;
use crate::config::Settings;
use crate::controller::{ClusterController, ClusterStatus};
use crate::error::Result;
use crate::rebuild::RebuildQueue;
use crate::source::SourceFactory;

/// Owns the controller of every registered cluster, keyed by cluster name.
///
/// The map lock is only held to look up or insert an entry. Starting a
/// controller (which may wait for its initial sync) happens outside it;
/// concurrent callers for the same cluster share the one in-flight start.
pub struct ControllerRegistry {
    factory: Arc<dyn SourceFactory>,
    queue: Arc<dyn RebuildQueue>,
    settings: Settings,
    controllers: Mutex<HashMap<String, Arc<ClusterController>>>,
}

impl ControllerRegistry {
    pub fn new(
        factory: Arc<dyn SourceFactory>,
        queue: Arc<dyn RebuildQueue>,
        settings: Settings,
    ) -> Self {
        Self {
            factory,
            queue,
            settings,
            controllers: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, cluster: Arc<dyn Cluster>) -> Result<Arc<ClusterController>> {
        let name = cluster.name().to_string();
        let controller = {
            let mut controllers = self.controllers.lock();
            controllers
                .entry(name.clone())
                .or_insert_with(|| {
                    info!(cluster = %name, "creating cluster controller");
                    Arc::new(ClusterController::new(
                        cluster,
                        self.factory.clone(),
                        self.queue.clone(),
                        self.settings.sync_timeout(),
                    ))
                })
                .clone()
        };

        if let Err(err) = controller.start().await {
            warn!(cluster = %name, "cluster controller failed to start: {err}");
            let mut controllers = self.controllers.lock();
            if controllers
                .get(&name)
                .is_some_and(|c| Arc::ptr_eq(c, &controller))
            {
                controllers.remove(&name);
            }
            drop(controllers);
            controller.stop();
            return Err(err);
        }
        Ok(controller)
    }

    pub fn remove(&self, cluster: &dyn Cluster) {
        let removed = self.controllers.lock().remove(cluster.name());
        if let Some(controller) = removed {
            controller.stop();
            info!(cluster = cluster.name(), "removed cluster controller");
        }
    }

    /// Starts a controller for every cluster, stopping at the first failure.
    pub async fn init_all<I>(&self, clusters: I) -> Result<()>
    where
        I: IntoIterator<Item = Arc<dyn Cluster>>,
    {
        for cluster in clusters {
            self.get_or_create(cluster).await?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ClusterController>> {
        self.controllers.lock().get(name).cloned()
    }

    pub fn statuses(&self) -> Vec<ClusterStatus> {
        let controllers: Vec<_> = self.controllers.lock().values().cloned().collect();
        let mut statuses: Vec<_> = controllers.iter().map(|c| c.status()).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Stops and forgets every controller
    pub fn shutdown(&self) {
        let controllers: Vec<_> = self.controllers.lock().drain().collect();
        for (_, controller) in controllers {
            controller.stop();
        }
        info!("all cluster controllers stopped");
    }
}
