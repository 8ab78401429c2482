use k8s_openapi::api::core::v1::Node;
use kube::{Api, Client, Config, config::Kubeconfig};
use std::time::Duration;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::k3s::K3s;

const READY_ATTEMPTS: usize = 60;

/// A throwaway k3s server and the kube config pointing at it
pub struct TestCluster {
    container: ContainerAsync<K3s>,
    pub client: Client,
    pub config: Config,
}

impl TestCluster {
    /// Boots k3s and returns once a node reports Ready.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let container = K3s::default().start().await?;
        let kubeconfig: Kubeconfig =
            serde_yaml::from_str(&container.image().read_kube_config()?)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &Default::default()).await?;
        let client = Client::try_from(config.clone())?;

        let cluster = TestCluster {
            container,
            client,
            config,
        };
        cluster.await_node_ready().await?;
        Ok(cluster)
    }

    async fn await_node_ready(&self) -> Result<(), Box<dyn std::error::Error>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        for _ in 0..READY_ATTEMPTS {
            if let Ok(list) = nodes.list(&Default::default()).await {
                if list.items.iter().any(node_ready) {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Err("no k3s node became Ready".into())
    }

    pub async fn cleanup(self) -> Result<(), Box<dyn std::error::Error>> {
        self.container.rm().await?;
        Ok(())
    }
}

fn node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}
