//! In-process cluster for end-to-end tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use ringproxy::common::{Config, NodeConfig, NodeDescriptor};
use ringproxy::node::AccountStore;
use ringproxy::{NodeServer, ProxyServer};
use tokio::net::TcpListener;

pub struct Cluster {
    pub proxy_url: String,
    /// Stores of the live nodes
    pub stores: Vec<Arc<AccountStore>>,
}

impl Cluster {
    pub fn account_url(&self, account: &str) -> String {
        format!("{}/v1/{}", self.proxy_url, account)
    }

    /// Live nodes holding `account`
    pub fn replicas_of(&self, account: &str) -> usize {
        self.stores.iter().filter(|s| s.get(account).is_some()).count()
    }
}

async fn spawn_node() -> (SocketAddr, Arc<AccountStore>) {
    let server = NodeServer::new(NodeConfig::default());
    let store = server.store();
    let router = server.router();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, store)
}

/// An address nothing listens on
fn dead_address() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// `live` working nodes plus `dead` unreachable ones, one replica per node
pub async fn spawn_cluster(live: usize, dead: usize, management: bool, autocreate: bool) -> Cluster {
    let mut config = Config::default();
    config.proxy.allow_account_management = management;
    config.proxy.account_autocreate = autocreate;
    config.proxy.node_timeout_ms = 2_000;
    config.ring.partitions = 64;
    config.ring.replicas = live + dead;

    let mut stores = Vec::new();
    for id in 0..live {
        let (addr, store) = spawn_node().await;
        stores.push(store);
        config.ring.nodes.push(NodeDescriptor {
            id: id as u64 + 1,
            address: addr.to_string(),
            device: "sda1".into(),
        });
    }
    for id in live..live + dead {
        config.ring.nodes.push(NodeDescriptor {
            id: id as u64 + 1,
            address: dead_address().to_string(),
            device: "sda1".into(),
        });
    }

    let router = ProxyServer::new(config).router().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Cluster {
        proxy_url: format!("http://{}", addr),
        stores,
    }
}
