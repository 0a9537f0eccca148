//! This mod is meant to hold most of the code for the library's client-facing API.
mod client;
mod config;
mod options;
mod wiring;

pub use client::ClientError;
pub use client::PartitionClient;
pub use config::NodeConfig;
pub use config::NodeConfigError;
pub use config::RaftSection;
pub use options::RaftOptions;
pub use wiring::create_partition;
pub use wiring::PartitionConfig;
pub use wiring::PartitionCreationError;
pub use wiring::StartMode;

// So the node can validate its options.
pub(crate) use options::RaftOptionsValidated;
