use futures::StreamExt;
use routewatch::{
    ChannelRebuildQueue, ControllerRegistry, KubeCluster, KubeSourceFactory, Settings,
    server::Server,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().compact().init();

    let settings = Settings::default();
    let name = std::env::var("ROUTEWATCH_CLUSTER").unwrap_or_else(|_| "local".to_string());
    let cluster = KubeCluster::new(name, kube::Config::infer().await?);

    let (queue, mut signals) = ChannelRebuildQueue::new();
    tokio::spawn(async move {
        while let Some(signal) = signals.next().await {
            info!(app = %signal.app_name, "routes rebuild requested");
        }
    });

    let registry = Arc::new(ControllerRegistry::new(
        Arc::new(KubeSourceFactory),
        Arc::new(queue),
        settings.clone(),
    ));
    registry.get_or_create(Arc::new(cluster)).await?;

    let server = Server::new(&settings.bind_addr, registry).await?;
    server.serve().await
}
