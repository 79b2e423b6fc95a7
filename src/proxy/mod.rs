//! Proxy layer: client API, metadata gate and replica fan-out

pub mod account;
pub mod cache;
pub mod gatekeeper;
pub mod http;
pub mod replica;
pub mod ring;
pub mod server;
pub mod transport;

pub use account::{AccountController, AccountSettings, ProxyRequest, ProxyResponse};
pub use cache::{CacheStore, MemoryCache, NoCache};
pub use gatekeeper::{ExclusionSet, MetadataGate};
pub use replica::{QuorumDecision, ReplicaCoordinator, RequestEnvelope};
pub use ring::{HashRing, Partitioner, ReplicaNode};
pub use server::ProxyServer;
pub use transport::{HttpTransport, Transport};
