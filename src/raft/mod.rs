mod clock;
mod commit_stream;
mod configuration;
mod log_entry;
mod members;
mod messages;
mod node;
mod peer;
mod raft_log;
mod role;
mod state_change_listener;
mod transport;
mod types;

pub use clock::mocked_clock;
pub use clock::Clock;
pub use clock::MockClock;
pub use clock::MockClockController;
pub use clock::RealClock;
pub use commit_stream::CommitEvent;
pub use commit_stream::CommitStream;
pub use commit_stream::CommittedEntry;
pub use configuration::quorum;
pub use configuration::Configuration;
pub use configuration::ConfigurationError;
pub use log_entry::EntryKind;
pub use log_entry::LogEntry;
pub use messages::AppendRequest;
pub use messages::AppendResponse;
pub use messages::ConfigureRequest;
pub use messages::ConfigureResponse;
pub use messages::InstallSnapshotRequest;
pub use messages::InstallSnapshotResponse;
pub use messages::JoinRequest;
pub use messages::JoinResponse;
pub use messages::LeaveRequest;
pub use messages::LeaveResponse;
pub use messages::RaftRequest;
pub use messages::RaftResponse;
pub use messages::VoteRequest;
pub use messages::VoteResponse;
pub use node::MembershipError;
pub use node::NodeCreationError;
pub use node::ProposeError;
pub use node::RaftNode;
pub use node::RaftNodeConfig;
pub use role::RoleKind;
pub use state_change_listener::RoleChangeListener;
pub use state_change_listener::RoleSnapshot;
pub use transport::Transport;
pub use types::MemberId;
pub use types::Term;
