use crate::commitlog::Index;
use crate::raft::{Configuration, LogEntry, MemberId, Term};
use bytes::Bytes;

#[derive(Clone, Debug, PartialEq)]
pub struct VoteRequest {
    pub term: Term,
    pub candidate: MemberId,
    pub last_log_index: Index,
    pub last_log_term: Term,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VoteResponse {
    pub term: Term,
    pub granted: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppendRequest {
    pub term: Term,
    pub leader: MemberId,
    pub prev_log_index: Index,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry>,
    pub leader_commit: Index,
}

/// On success `match_index` is the last index the follower now shares with the leader. On
/// failure it is a hint of where the follower's log may still match.
#[derive(Clone, Debug, PartialEq)]
pub struct AppendResponse {
    pub term: Term,
    pub success: bool,
    pub match_index: Index,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JoinRequest {
    pub member: MemberId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JoinResponse {
    pub success: bool,
    pub configuration: Option<Configuration>,
    pub leader: Option<MemberId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeaveRequest {
    pub member: MemberId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeaveResponse {
    pub success: bool,
    pub configuration: Option<Configuration>,
    pub leader: Option<MemberId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConfigureRequest {
    pub term: Term,
    pub leader: MemberId,
    pub configuration: Configuration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConfigureResponse {
    pub term: Term,
    pub success: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InstallSnapshotRequest {
    pub term: Term,
    pub leader: MemberId,
    pub snapshot_index: Index,
    pub snapshot_term: Term,
    pub configuration: Configuration,
    pub data: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InstallSnapshotResponse {
    pub term: Term,
    pub success: bool,
    /// Echo of the request's snapshot index.
    pub snapshot_index: Index,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RaftRequest {
    Vote(VoteRequest),
    Append(AppendRequest),
    Join(JoinRequest),
    Leave(LeaveRequest),
    Configure(ConfigureRequest),
    InstallSnapshot(InstallSnapshotRequest),
}

#[derive(Clone, Debug, PartialEq)]
pub enum RaftResponse {
    Vote(VoteResponse),
    Append(AppendResponse),
    Join(JoinResponse),
    Leave(LeaveResponse),
    Configure(ConfigureResponse),
    InstallSnapshot(InstallSnapshotResponse),
}

impl RaftRequest {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            RaftRequest::Vote(_) => "Vote",
            RaftRequest::Append(_) => "Append",
            RaftRequest::Join(_) => "Join",
            RaftRequest::Leave(_) => "Leave",
            RaftRequest::Configure(_) => "Configure",
            RaftRequest::InstallSnapshot(_) => "InstallSnapshot",
        }
    }
}
