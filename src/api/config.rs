use crate::api::{PartitionConfig, RaftOptions, StartMode};
use crate::raft::MemberId;
use crate::service::ServiceTypeRegistry;
use serde::Deserialize;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum NodeConfigError {
    #[error("failed to read node configuration")]
    Io(#[from] io::Error),
    #[error("node configuration is not valid TOML")]
    Parse(#[from] toml::de::Error),
    #[error("invalid member address {0:?}, expected host:port")]
    InvalidMember(String),
    #[error("invalid listen address {0:?}")]
    InvalidListenAddress(String),
    #[error("unknown start mode {0:?}, expected \"bootstrap\" or \"join\"")]
    UnknownStartMode(String),
}

/// NodeConfig is the TOML configuration of one node.
///
/// ```toml
/// member = "127.0.0.1:7001"
/// listen_addr = "0.0.0.0:7001"
/// data_directory = "/var/lib/partition-raft/node-1"
/// partition_id = 1
/// start_mode = "bootstrap"
/// members = ["127.0.0.1:7001", "127.0.0.1:7002", "127.0.0.1:7003"]
///
/// [raft]
/// election_timeout_min_ms = 500
/// snapshot_threshold = 10000
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct NodeConfig {
    pub member: String,
    pub listen_addr: Option<String>,
    pub data_directory: PathBuf,
    #[serde(default = "default_partition_id")]
    pub partition_id: u32,
    #[serde(default = "default_start_mode")]
    pub start_mode: String,
    /// Bootstrap members, or contacts to join through.
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub raft: RaftSection,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RaftSection {
    pub heartbeat_interval_ms: Option<u64>,
    pub election_timeout_min_ms: Option<u64>,
    pub election_timeout_max_ms: Option<u64>,
    pub append_timeout_ms: Option<u64>,
    pub join_retry_interval_ms: Option<u64>,
    pub tick_interval_ms: Option<u64>,
    pub max_entries_per_append: Option<u64>,
    pub snapshot_threshold: Option<u64>,
}

fn default_partition_id() -> u32 {
    1
}

fn default_start_mode() -> String {
    "bootstrap".to_string()
}

impl NodeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, NodeConfigError> {
        let contents = std::fs::read_to_string(path)?;
        NodeConfig::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, NodeConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn member_id(&self) -> Result<MemberId, NodeConfigError> {
        parse_member(&self.member)
    }

    /// Defaults to all interfaces on the member's port.
    pub fn listen_addr(&self) -> Result<SocketAddr, NodeConfigError> {
        let addr = match &self.listen_addr {
            Some(addr) => addr.clone(),
            None => format!("0.0.0.0:{}", self.member_id()?.port()),
        };
        addr.parse()
            .map_err(|_| NodeConfigError::InvalidListenAddress(addr.clone()))
    }

    pub fn start_mode(&self) -> Result<StartMode, NodeConfigError> {
        let members = self
            .members
            .iter()
            .map(|member| parse_member(member))
            .collect::<Result<Vec<_>, _>>()?;
        match self.start_mode.as_str() {
            "bootstrap" => Ok(StartMode::Bootstrap(members)),
            "join" => Ok(StartMode::Join(members)),
            other => Err(NodeConfigError::UnknownStartMode(other.to_string())),
        }
    }

    pub fn raft_options(&self) -> RaftOptions {
        let millis = |value: Option<u64>| value.map(Duration::from_millis);
        RaftOptions {
            heartbeat_interval: millis(self.raft.heartbeat_interval_ms),
            election_timeout_min: millis(self.raft.election_timeout_min_ms),
            election_timeout_max: millis(self.raft.election_timeout_max_ms),
            append_timeout: millis(self.raft.append_timeout_ms),
            join_retry_interval: millis(self.raft.join_retry_interval_ms),
            tick_interval: millis(self.raft.tick_interval_ms),
            max_entries_per_append: self.raft.max_entries_per_append,
            snapshot_threshold: self.raft.snapshot_threshold,
        }
    }

    /// Metadata and snapshots live in subdirectories of `data_directory`.
    pub fn into_partition_config(
        self,
        logger: slog::Logger,
        service_types: ServiceTypeRegistry,
    ) -> Result<PartitionConfig, NodeConfigError> {
        Ok(PartitionConfig {
            logger,
            member_id: self.member_id()?,
            listen_addr: self.listen_addr()?,
            partition_id: self.partition_id,
            metadata_directory: self.data_directory.join("metadata"),
            snapshot_directory: self.data_directory.join("snapshots"),
            options: self.raft_options(),
            start_mode: self.start_mode()?,
            service_types,
        })
    }
}

fn parse_member(address: &str) -> Result<MemberId, NodeConfigError> {
    let invalid = || NodeConfigError::InvalidMember(address.to_string());
    let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    if host.is_empty() {
        return Err(invalid());
    }
    Ok(MemberId::new(host, port))
}
