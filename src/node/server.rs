//! Storage node server

use std::net::SocketAddr;
use std::sync::Arc;

use crate::common::{NodeConfig, Result};
use crate::node::http::{create_router, NodeState};
use crate::node::store::AccountStore;
use crate::proxy::server::shutdown_signal;

pub struct NodeServer {
    config: NodeConfig,
    store: Arc<AccountStore>,
}

impl NodeServer {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            store: Arc::new(AccountStore::new()),
        }
    }

    pub fn store(&self) -> Arc<AccountStore> {
        self.store.clone()
    }

    pub fn router(&self) -> axum::Router {
        create_router(NodeState {
            store: self.store.clone(),
            device: self.config.device.clone(),
        })
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting storage node");
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Device: {}", self.config.device);

        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!("✓ Storage node ready");
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("Storage node stopped");
        Ok(())
    }
}
