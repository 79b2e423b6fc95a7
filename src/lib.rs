//! # ringproxy
//!
//! Account proxy for a replicated object store:
//! - Hash-ring placement of accounts onto storage nodes
//! - Quorum fan-out: first-success reads, majority writes
//! - Account autocreate and management policy
//! - A gatekeeper keeping system metadata away from clients
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!            client
//!              │ HTTP /v1/{account}
//! ┌────────────▼────────────────────────────┐
//! │  Proxy                                  │
//! │   tracing middleware (X-Trans-Id)       │
//! │   metadata gate (sysmeta in/out)        │
//! │   account controller ── cache           │
//! │   replica coordinator (quorum)          │
//! └───────────┬─────────────────────────────┘
//!             │ HTTP /{device}/{partition}/{account}
//!   ┌─────────┴──────────┬──────────────┐
//!   │                    │              │
//! ┌─▼──────────┐   ┌─────▼──────┐   ┌───▼────────┐
//! │ Node 1     │   │ Node 2     │   │ Node 3     │
//! └────────────┘   └────────────┘   └────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start storage nodes
//! ```bash
//! ringproxy-node --bind 127.0.0.1:6002
//! ringproxy-node --bind 127.0.0.1:6003
//! ringproxy-node --bind 127.0.0.1:6004
//! ```
//!
//! ### Start the proxy
//! ```bash
//! ringproxy serve \
//!   --bind 0.0.0.0:8080 \
//!   --nodes 1=127.0.0.1:6002,2=127.0.0.1:6003,3=127.0.0.1:6004 \
//!   --allow-account-management
//! ```
//!
//! ### Talk to it
//! ```bash
//! curl -X PUT  http://localhost:8080/v1/AUTH_test
//! curl -I      http://localhost:8080/v1/AUTH_test
//! curl -X POST http://localhost:8080/v1/AUTH_test -H 'X-Account-Meta-Color: blue'
//! ```

pub mod common;
pub mod node;
pub mod proxy;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use node::NodeServer;
pub use proxy::ProxyServer;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
