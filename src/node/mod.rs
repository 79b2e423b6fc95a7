//! Development storage node
//!
//! Keeps account records in memory and answers the proxy's internal account
//! API. Enough for local clusters and end-to-end tests; it never holds
//! containers.

pub mod http;
pub mod server;
pub mod store;

pub use server::NodeServer;
pub use store::{AccountRecord, AccountStore, MetadataUpdate, PutOutcome};
