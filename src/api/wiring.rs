use crate::actor::{self, PartitionActor};
use crate::api::{PartitionClient, RaftOptions, RaftOptionsValidated};
use crate::commitlog::InMemoryLog;
use crate::metadata::{FileMetadataStore, MetadataError};
use crate::partition::{Partition, PartitionError};
use crate::raft::{MemberId, MembershipError, NodeCreationError, RaftNode, RaftNodeConfig, RealClock};
use crate::server::{self, GrpcTransport, RpcServer};
use crate::service::{ServiceManager, ServiceTypeRegistry};
use crate::snapshot::{SnapshotError, SnapshotStore};
use std::convert::TryFrom;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

const ACTOR_BUFFER_SIZE: usize = 256;
const METADATA_LOG_NAME: &str = "raft";

#[derive(Clone, Debug, PartialEq)]
pub enum StartMode {
    /// Start as a member of these members, or of the stored configuration after a restart.
    Bootstrap(Vec<MemberId>),
    /// Ask these contacts to admit us into their cluster.
    Join(Vec<MemberId>),
}

pub struct PartitionConfig {
    pub logger: slog::Logger,
    pub member_id: MemberId,
    pub listen_addr: SocketAddr,
    pub partition_id: u32,
    pub metadata_directory: PathBuf,
    pub snapshot_directory: PathBuf,
    pub options: RaftOptions,
    pub start_mode: StartMode,
    pub service_types: ServiceTypeRegistry,
}

#[derive(Debug, thiserror::Error)]
pub enum PartitionCreationError {
    #[error("Illegal options for configuring partition: {0}")]
    IllegalOptions(String),
    #[error("Metadata store initialization failure")]
    Metadata(#[from] MetadataError),
    #[error("Snapshot store initialization failure")]
    Snapshots(#[from] SnapshotError),
    #[error("Log initialization failure")]
    LogInitialization(std::io::Error),
    #[error("Node creation failure")]
    Node(#[from] NodeCreationError),
    #[error("Recovery from snapshot failed")]
    Recovery(#[from] PartitionError),
    #[error("Failed to start membership")]
    Start(#[from] MembershipError),
}

/// Starts the local member of a partition: its gRPC server, its actor and the node inside it.
/// Must be called from within a tokio runtime.
pub async fn create_partition(config: PartitionConfig) -> Result<PartitionClient, PartitionCreationError> {
    let root_logger = config
        .logger
        .new(slog::o!("partition" => config.partition_id));

    let options = RaftOptionsValidated::try_from(config.options.clone())
        .map_err(|e| PartitionCreationError::IllegalOptions(e.to_string()))?;

    let metadata = FileMetadataStore::open(
        root_logger.clone(),
        &config.metadata_directory,
        config.partition_id,
        METADATA_LOG_NAME,
    )?;
    let snapshots = Arc::new(SnapshotStore::open(root_logger.clone(), &config.snapshot_directory)?);
    let snapshot_name = format!("partition-{}", config.partition_id);
    let log = InMemoryLog::create().map_err(PartitionCreationError::LogInitialization)?;

    let (actor_client, mailbox) = actor::channel(ACTOR_BUFFER_SIZE);
    let transport = GrpcTransport::new(root_logger.clone(), actor_client.clone(), options.append_timeout);

    let (node, commits) = RaftNode::new(RaftNodeConfig {
        logger: root_logger.clone(),
        member_id: config.member_id.clone(),
        options: config.options,
        metadata,
        log,
        transport,
        clock: Arc::new(RealClock),
        snapshots: snapshots.clone(),
        snapshot_name: snapshot_name.clone(),
        rng_seed: None,
    })?;
    let services = ServiceManager::new(root_logger.clone(), config.service_types);
    let mut partition = Partition::new(
        root_logger.clone(),
        node,
        commits,
        services,
        snapshots,
        snapshot_name,
        options.snapshot_threshold,
    )?;

    match config.start_mode {
        StartMode::Bootstrap(members) => partition.bootstrap(members)?,
        StartMode::Join(contacts) => partition.join(contacts)?,
    }

    let (server_shutdown_handle, server_shutdown_signal) = server::shutdown_signal(root_logger.clone());
    let partition_actor = PartitionActor::new(root_logger.clone(), mailbox, partition, options.tick_interval);
    tokio::spawn(partition_actor.run_event_loop());

    let rpc_server = RpcServer::new(root_logger.clone(), actor_client.clone());
    tokio::spawn(rpc_server.run(config.listen_addr, server_shutdown_signal));

    slog::info!(root_logger, "Started {} listening on {:?}", config.member_id, config.listen_addr);
    Ok(PartitionClient::new(root_logger, actor_client, Some(server_shutdown_handle)))
}
