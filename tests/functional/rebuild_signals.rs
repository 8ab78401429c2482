use crate::functional::{TestCluster, TestResources};
use futures::StreamExt;
use routewatch::{
    ChannelRebuildQueue, ControllerRegistry, KubeCluster, KubeSourceFactory, Settings,
    labels::{APP_NAME_LABEL, APP_POOL_LABEL, IS_DEPLOY_LABEL},
    server::Server,
};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;

#[cfg(feature = "functional-tests")]
#[tokio::test]
async fn test_pod_lifecycle_signals_rebuilds() -> Result<(), Box<dyn std::error::Error>> {
    let cluster = TestCluster::start().await?;
    let resources = TestResources::new(cluster.client.clone(), "rebuild-ns");
    resources.create_namespace().await?;

    let (queue, mut signals) = ChannelRebuildQueue::new();
    let registry = Arc::new(ControllerRegistry::new(
        Arc::new(KubeSourceFactory),
        Arc::new(queue),
        Settings::default(),
    ));
    let k3s = Arc::new(
        KubeCluster::new("k3s", cluster.config.clone())
            .with_timeout(Duration::from_secs(30))
            .with_custom_data("router-address-local", "true"),
    );

    let controller = registry.get_or_create(k3s.clone()).await?;
    let status = controller.status();
    assert!(status.started);
    assert_eq!(status.pods_synced, Some(true));

    let nodes = controller.node_stream(true).await?;
    assert!(!nodes.store().state().is_empty());

    let server = Server::new("127.0.0.1:0", registry.clone())
        .await
        .map_err(|e| -> Box<dyn std::error::Error> { e })?;
    let server_url = format!("http://{}", server.addr);
    let (stop_server, server_stopped) = tokio::sync::oneshot::channel::<()>();
    let server_handle = tokio::spawn(server.serve_with_shutdown(async {
        let _ = server_stopped.await;
    }));

    let clusters: Value = reqwest::get(format!("{server_url}/clusters"))
        .await?
        .json()
        .await?;
    let clusters = clusters.as_array().ok_or("expected a cluster list")?;
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0]["name"], "k3s");
    assert_eq!(clusters[0]["pods_synced"], true);
    assert_eq!(clusters[0]["nodes_synced"], true);

    // pods outside the routing lifecycle never signal
    resources.create_pod("plain", &[]).await?;
    resources
        .create_pod(
            "deploy",
            &[(APP_NAME_LABEL, "builder"), (IS_DEPLOY_LABEL, "true")],
        )
        .await?;
    resources
        .create_pod("web-1", &[(APP_NAME_LABEL, "web"), (APP_POOL_LABEL, "prod")])
        .await?;
    resources.label_pod("web-1", "revision", "2").await?;

    let signal = timeout(Duration::from_secs(60), signals.next())
        .await?
        .ok_or("rebuild queue closed")?;
    assert_eq!(signal.app_name, "web");

    resources.delete_pod("web-1").await?;
    loop {
        let signal = timeout(Duration::from_secs(60), signals.next())
            .await?
            .ok_or("rebuild queue closed")?;
        assert_eq!(signal.app_name, "web");
        if controller
            .pod_stream()
            .await?
            .store()
            .state()
            .iter()
            .all(|pod| pod.metadata.name.as_deref() != Some("web-1"))
        {
            break;
        }
    }

    registry.remove(k3s.as_ref());
    assert!(controller.is_stopped());

    let _ = stop_server.send(());
    server_handle.await?.map_err(|e| e.to_string())?;

    resources.cleanup().await?;
    cluster.cleanup().await?;
    Ok(())
}
