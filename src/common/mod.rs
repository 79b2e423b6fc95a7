//! Common utilities and types shared across ringproxy

pub mod config;
pub mod constraints;
pub mod error;
pub mod hash;
pub mod metrics;
pub mod tracing_middleware;
pub mod utils;

pub use config::{Config, NodeConfig, NodeDescriptor, ProxyConfig, RingConfig};
pub use error::{Error, Result};
pub use hash::{hrw_order, partition_for, select_replicas, PartitionTable};
pub use metrics::METRICS;
pub use utils::{encode_segment, normalize_timestamp, parse_duration, parse_millis, timestamp_now};
