use crate::{registry::ControllerRegistry, router};
use std::{net::SocketAddr, sync::Arc};
use tracing::info;

pub struct Server {
    pub registry: Arc<ControllerRegistry>,
    pub addr: SocketAddr,
    pub listener: tokio::net::TcpListener,
    pub router: axum::Router,
}

impl Server {
    pub async fn new(
        bind_addr: &str,
        registry: Arc<ControllerRegistry>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let router = router::new_router(registry.clone());
        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        let addr = listener.local_addr()?;

        Ok(Server {
            registry,
            addr,
            listener,
            router,
        })
    }

    /// Serves until ctrl-c, then stops every cluster controller.
    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    pub async fn serve_with_shutdown<F>(
        self,
        signal: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        info!(addr = %self.addr, "serving");
        let result = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(signal)
            .await;
        self.registry.shutdown();
        result?;
        Ok(())
    }
}
