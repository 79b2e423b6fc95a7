//! Proxy server

use std::net::SocketAddr;
use std::sync::Arc;

use crate::common::{Config, Result};
use crate::proxy::account::{AccountController, AccountSettings};
use crate::proxy::cache::{CacheStore, MemoryCache};
use crate::proxy::gatekeeper::MetadataGate;
use crate::proxy::http::{create_router, ProxyState};
use crate::proxy::replica::ReplicaCoordinator;
use crate::proxy::ring::HashRing;
use crate::proxy::transport::{HttpTransport, Transport};

pub struct ProxyServer {
    config: Config,
    cache: Arc<dyn CacheStore>,
}

impl ProxyServer {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cache: Arc::new(MemoryCache::new()),
        }
    }

    /// Build the router without binding, for embedding and tests
    pub fn router(&self) -> Result<axum::Router> {
        let ring = Arc::new(HashRing::new(&self.config.ring)?);
        let transport: Arc<dyn Transport> =
            Arc::new(HttpTransport::new(self.config.proxy.node_timeout())?);
        let coordinator = Arc::new(ReplicaCoordinator::new(
            transport,
            self.config.proxy.node_timeout(),
            self.config.proxy.read_concurrency,
        ));

        let state = ProxyState {
            ring_nodes: ring.node_count(),
            replicas: ring.replica_count(),
            accounts: Arc::new(AccountController::new(
                AccountSettings::from(&self.config.proxy),
                ring,
                coordinator,
                self.cache.clone(),
            )),
        };
        let gate = Arc::new(MetadataGate::new()?);
        Ok(create_router(state, gate))
    }

    pub async fn serve(self) -> Result<()> {
        let proxy = &self.config.proxy;
        tracing::info!("Starting proxy");
        tracing::info!("  HTTP API: {}", proxy.bind_addr);
        tracing::info!(
            "  Ring: {} nodes, {} replicas, {} partitions",
            self.config.ring.nodes.len(),
            self.config.ring.replicas,
            self.config.ring.partitions
        );
        tracing::info!("  Account management: {}", proxy.allow_account_management);
        tracing::info!("  Account autocreate: {}", proxy.account_autocreate);

        let router = self.router()?;
        let listener = tokio::net::TcpListener::bind(proxy.bind_addr).await?;

        tracing::info!("✓ Proxy ready");
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("Proxy stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
