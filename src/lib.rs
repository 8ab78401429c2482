//! Per-cluster watch controllers that turn pod lifecycle changes into
//! routing-rebuild signals.

pub mod cluster;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod labels;
pub mod rebuild;
pub mod registry;
pub mod router;
pub mod server;
pub mod source;
pub mod sync;
pub mod watcher;


pub use cluster::{Cluster, KubeCluster};
pub use config::Settings;
pub use controller::{ClusterController, ClusterStatus};
pub use error::{Error, Result};
pub use rebuild::{ChannelRebuildQueue, RebuildQueue, RebuildSignal};
pub use registry::ControllerRegistry;
pub use source::{KubeSourceFactory, SourceFactory, WatchSource};
