mod actor;
mod api;
mod commitlog;
mod metadata;
mod partition;
mod primitives;
mod raft;
mod server;
mod service;
mod snapshot;
mod grpc {
    include!("../generated/partition_raft.rs");
}

pub use actor::ActorClient;
pub use actor::PartitionStatus;
pub use api::create_partition;
pub use api::ClientError;
pub use api::NodeConfig;
pub use api::NodeConfigError;
pub use api::PartitionClient;
pub use api::PartitionConfig;
pub use api::PartitionCreationError;
pub use api::RaftOptions;
pub use api::RaftSection;
pub use api::StartMode;
pub use commitlog::Entry;
pub use commitlog::InMemoryLog;
pub use commitlog::Index;
pub use commitlog::Log;
pub use metadata::FileMetadataStore;
pub use metadata::InMemoryMetadataStore;
pub use metadata::MetadataError;
pub use metadata::MetadataStore;
pub use partition::CommandError;
pub use partition::CommandResult;
pub use partition::Partition;
pub use partition::PartitionError;
pub use partition::QueryError;
pub use partition::ReadConsistency;
pub use primitives::counter;
pub use primitives::lock;
pub use primitives::map;
pub use primitives::register_builtins;
pub use raft::mocked_clock;
pub use raft::quorum;
pub use raft::AppendRequest;
pub use raft::AppendResponse;
pub use raft::Clock;
pub use raft::CommitEvent;
pub use raft::CommitStream;
pub use raft::CommittedEntry;
pub use raft::Configuration;
pub use raft::ConfigurationError;
pub use raft::ConfigureRequest;
pub use raft::ConfigureResponse;
pub use raft::EntryKind;
pub use raft::InstallSnapshotRequest;
pub use raft::InstallSnapshotResponse;
pub use raft::JoinRequest;
pub use raft::JoinResponse;
pub use raft::LeaveRequest;
pub use raft::LeaveResponse;
pub use raft::LogEntry;
pub use raft::MemberId;
pub use raft::MembershipError;
pub use raft::MockClock;
pub use raft::MockClockController;
pub use raft::NodeCreationError;
pub use raft::ProposeError;
pub use raft::RaftNode;
pub use raft::RaftNodeConfig;
pub use raft::RaftRequest;
pub use raft::RaftResponse;
pub use raft::RealClock;
pub use raft::RoleChangeListener;
pub use raft::RoleKind;
pub use raft::RoleSnapshot;
pub use raft::Term;
pub use raft::Transport;
pub use raft::VoteRequest;
pub use raft::VoteResponse;
pub use server::GrpcTransport;
pub use service::encode;
pub use service::Commit;
pub use service::OperationError;
pub use service::OperationId;
pub use service::OperationRegistry;
pub use service::OperationType;
pub use service::PartitionSnapshot;
pub use service::PrimitiveService;
pub use service::ScheduledTaskId;
pub use service::ServiceContext;
pub use service::ServiceError;
pub use service::ServiceExecutor;
pub use service::ServiceHost;
pub use service::ServiceManager;
pub use service::ServiceRequest;
pub use service::ServiceSnapshot;
pub use service::ServiceTypeRegistry;
pub use service::Session;
pub use service::SessionEvent;
pub use service::SessionId;
pub use service::SessionState;
pub use service::WallClockMillis;
pub use snapshot::SnapshotError;
pub use snapshot::SnapshotMetadata;
pub use snapshot::SnapshotStore;

// Learning 1: `create::{root_mod}` should not have any code. Just `mod` and `pub use` statements.
// Learning 2: All `mod` statements, anywhere, should not be `pub`. Only export `pub` via individual
//             use statements.
//
// This keeps the `crate::{root_mod}` root_mod only responsible for exporting types to the rest of
// crate, and allows me to organize my root_mod impl however I want.
