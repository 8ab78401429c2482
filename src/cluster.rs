use std::{collections::BTreeMap, time::Duration};

use crate::error::{Error, Result};

/// Used when neither an explicit timeout nor a config read timeout is set
pub const DEFAULT_CLUSTER_TIMEOUT: Duration = Duration::from_secs(30);

pub const ROUTER_ADDRESS_LOCAL_KEY: &str = "router-address-local";

/// An externally registered cluster this process observes.
///
/// Connection parameters are opaque here; only the name, the request timeout
/// and the routing-locality query are consumed by the controllers.
pub trait Cluster: Send + Sync {
    fn name(&self) -> &str;

    fn timeout(&self) -> Duration;

    fn kube_config(&self) -> &kube::Config;

    /// Whether routers for `pool` reach pods on this cluster by their local address
    fn router_address_local(&self, pool: &str) -> Result<bool>;
}

#[derive(Clone)]
pub struct KubeCluster {
    name: String,
    config: kube::Config,
    timeout: Option<Duration>,
    custom_data: BTreeMap<String, String>,
}

impl KubeCluster {
    pub fn new(name: impl Into<String>, config: kube::Config) -> Self {
        Self {
            name: name.into(),
            config,
            timeout: None,
            custom_data: BTreeMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_custom_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_data.insert(key.into(), value.into());
        self
    }
}

impl Cluster for KubeCluster {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
            .or(self.config.read_timeout)
            .unwrap_or(DEFAULT_CLUSTER_TIMEOUT)
    }

    fn kube_config(&self) -> &kube::Config {
        &self.config
    }

    fn router_address_local(&self, pool: &str) -> Result<bool> {
        let pool_key = format!("{pool}:{ROUTER_ADDRESS_LOCAL_KEY}");
        let value = match self
            .custom_data
            .get(&pool_key)
            .or_else(|| self.custom_data.get(ROUTER_ADDRESS_LOCAL_KEY))
        {
            Some(v) => v,
            None => return Ok(false),
        };

        value.parse().map_err(|_| {
            Error::routing_locality(format!(
                "cluster {}: invalid {ROUTER_ADDRESS_LOCAL_KEY} value {value:?}",
                self.name
            ))
        })
    }
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster")
            .field("name", &self.name)
            .field("cluster_url", &self.config.cluster_url)
            .field("timeout", &self.timeout())
            .finish()
    }
}
