//! Conversions between the wire protos and the node's messages.
use crate::commitlog::{Entry, Index};
use crate::grpc::{
    ProtoAppendReq, ProtoAppendResult, ProtoConfiguration, ProtoConfigureReq, ProtoConfigureResult,
    ProtoInstallSnapshotReq, ProtoInstallSnapshotResult, ProtoJoinReq, ProtoJoinResult, ProtoLeaveReq,
    ProtoLeaveResult, ProtoMember, ProtoVoteReq, ProtoVoteResult,
};
use crate::raft::{
    AppendRequest, AppendResponse, Configuration, ConfigurationError, ConfigureRequest, ConfigureResponse,
    InstallSnapshotRequest, InstallSnapshotResponse, JoinRequest, JoinResponse, LeaveRequest, LeaveResponse, LogEntry,
    MemberId, Term, VoteRequest, VoteResponse,
};
use bytes::Bytes;
use std::convert::TryFrom;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("port {0} is out of range")]
    InvalidPort(u32),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigurationError),
    #[error("undecodable log entry: {0}")]
    InvalidEntry(io::Error),
}

// ------- Members and configurations --------

fn member_to_proto(member: &MemberId) -> ProtoMember {
    ProtoMember {
        host: member.host().to_string(),
        port: u32::from(member.port()),
    }
}

fn member_from_proto(member: Option<ProtoMember>, field: &'static str) -> Result<MemberId, ConvertError> {
    let member = member.ok_or(ConvertError::MissingField(field))?;
    let port = u16::try_from(member.port).map_err(|_| ConvertError::InvalidPort(member.port))?;
    Ok(MemberId::new(member.host, port))
}

fn optional_member_from_proto(member: Option<ProtoMember>) -> Result<Option<MemberId>, ConvertError> {
    match member {
        Some(member) => member_from_proto(Some(member), "member").map(Some),
        None => Ok(None),
    }
}

fn configuration_to_proto(configuration: &Configuration) -> ProtoConfiguration {
    ProtoConfiguration {
        position: configuration.position().as_u64(),
        term: configuration.term().as_u64(),
        members: configuration.members().iter().map(member_to_proto).collect(),
    }
}

fn configuration_from_proto(
    configuration: Option<ProtoConfiguration>,
    field: &'static str,
) -> Result<Configuration, ConvertError> {
    let configuration = configuration.ok_or(ConvertError::MissingField(field))?;
    let members = configuration
        .members
        .into_iter()
        .map(|member| member_from_proto(Some(member), "members"))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Configuration::new(
        Index::new(configuration.position),
        Term::new(configuration.term),
        members,
    )?)
}

fn optional_configuration_from_proto(
    configuration: Option<ProtoConfiguration>,
) -> Result<Option<Configuration>, ConvertError> {
    match configuration {
        Some(configuration) => configuration_from_proto(Some(configuration), "configuration").map(Some),
        None => Ok(None),
    }
}

// ------- Vote --------

pub(crate) fn vote_request_to_proto(request: &VoteRequest) -> ProtoVoteReq {
    ProtoVoteReq {
        term: request.term.as_u64(),
        candidate: Some(member_to_proto(&request.candidate)),
        last_log_index: request.last_log_index.as_u64(),
        last_log_term: request.last_log_term.as_u64(),
    }
}

pub(crate) fn vote_request_from_proto(request: ProtoVoteReq) -> Result<VoteRequest, ConvertError> {
    Ok(VoteRequest {
        term: Term::new(request.term),
        candidate: member_from_proto(request.candidate, "candidate")?,
        last_log_index: Index::new(request.last_log_index),
        last_log_term: Term::new(request.last_log_term),
    })
}

pub(crate) fn vote_response_to_proto(response: VoteResponse) -> ProtoVoteResult {
    ProtoVoteResult {
        term: response.term.as_u64(),
        granted: response.granted,
    }
}

pub(crate) fn vote_response_from_proto(response: ProtoVoteResult) -> VoteResponse {
    VoteResponse {
        term: Term::new(response.term),
        granted: response.granted,
    }
}

// ------- Append --------

pub(crate) fn append_request_to_proto(request: &AppendRequest) -> Result<ProtoAppendReq, ConvertError> {
    let entries = request
        .entries
        .iter()
        .map(|entry| entry.encode().map_err(ConvertError::InvalidEntry))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ProtoAppendReq {
        term: request.term.as_u64(),
        leader: Some(member_to_proto(&request.leader)),
        prev_log_index: request.prev_log_index.as_u64(),
        prev_log_term: request.prev_log_term.as_u64(),
        entries,
        leader_commit: request.leader_commit.as_u64(),
    })
}

pub(crate) fn append_request_from_proto(request: ProtoAppendReq) -> Result<AppendRequest, ConvertError> {
    let entries = request
        .entries
        .iter()
        .map(|bytes| LogEntry::decode(bytes).map_err(ConvertError::InvalidEntry))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AppendRequest {
        term: Term::new(request.term),
        leader: member_from_proto(request.leader, "leader")?,
        prev_log_index: Index::new(request.prev_log_index),
        prev_log_term: Term::new(request.prev_log_term),
        entries,
        leader_commit: Index::new(request.leader_commit),
    })
}

pub(crate) fn append_response_to_proto(response: AppendResponse) -> ProtoAppendResult {
    ProtoAppendResult {
        term: response.term.as_u64(),
        success: response.success,
        match_index: response.match_index.as_u64(),
    }
}

pub(crate) fn append_response_from_proto(response: ProtoAppendResult) -> AppendResponse {
    AppendResponse {
        term: Term::new(response.term),
        success: response.success,
        match_index: Index::new(response.match_index),
    }
}

// ------- Join and leave --------

pub(crate) fn join_request_to_proto(request: &JoinRequest) -> ProtoJoinReq {
    ProtoJoinReq {
        member: Some(member_to_proto(&request.member)),
    }
}

pub(crate) fn join_request_from_proto(request: ProtoJoinReq) -> Result<JoinRequest, ConvertError> {
    Ok(JoinRequest {
        member: member_from_proto(request.member, "member")?,
    })
}

pub(crate) fn join_response_to_proto(response: JoinResponse) -> ProtoJoinResult {
    ProtoJoinResult {
        success: response.success,
        configuration: response.configuration.as_ref().map(configuration_to_proto),
        leader: response.leader.as_ref().map(member_to_proto),
    }
}

pub(crate) fn join_response_from_proto(response: ProtoJoinResult) -> Result<JoinResponse, ConvertError> {
    Ok(JoinResponse {
        success: response.success,
        configuration: optional_configuration_from_proto(response.configuration)?,
        leader: optional_member_from_proto(response.leader)?,
    })
}

pub(crate) fn leave_request_to_proto(request: &LeaveRequest) -> ProtoLeaveReq {
    ProtoLeaveReq {
        member: Some(member_to_proto(&request.member)),
    }
}

pub(crate) fn leave_request_from_proto(request: ProtoLeaveReq) -> Result<LeaveRequest, ConvertError> {
    Ok(LeaveRequest {
        member: member_from_proto(request.member, "member")?,
    })
}

pub(crate) fn leave_response_to_proto(response: LeaveResponse) -> ProtoLeaveResult {
    ProtoLeaveResult {
        success: response.success,
        configuration: response.configuration.as_ref().map(configuration_to_proto),
        leader: response.leader.as_ref().map(member_to_proto),
    }
}

pub(crate) fn leave_response_from_proto(response: ProtoLeaveResult) -> Result<LeaveResponse, ConvertError> {
    Ok(LeaveResponse {
        success: response.success,
        configuration: optional_configuration_from_proto(response.configuration)?,
        leader: optional_member_from_proto(response.leader)?,
    })
}

// ------- Configure --------

pub(crate) fn configure_request_to_proto(request: &ConfigureRequest) -> ProtoConfigureReq {
    ProtoConfigureReq {
        term: request.term.as_u64(),
        leader: Some(member_to_proto(&request.leader)),
        configuration: Some(configuration_to_proto(&request.configuration)),
    }
}

pub(crate) fn configure_request_from_proto(request: ProtoConfigureReq) -> Result<ConfigureRequest, ConvertError> {
    Ok(ConfigureRequest {
        term: Term::new(request.term),
        leader: member_from_proto(request.leader, "leader")?,
        configuration: configuration_from_proto(request.configuration, "configuration")?,
    })
}

pub(crate) fn configure_response_to_proto(response: ConfigureResponse) -> ProtoConfigureResult {
    ProtoConfigureResult {
        term: response.term.as_u64(),
        success: response.success,
    }
}

pub(crate) fn configure_response_from_proto(response: ProtoConfigureResult) -> ConfigureResponse {
    ConfigureResponse {
        term: Term::new(response.term),
        success: response.success,
    }
}

// ------- InstallSnapshot --------

pub(crate) fn install_snapshot_request_to_proto(request: &InstallSnapshotRequest) -> ProtoInstallSnapshotReq {
    ProtoInstallSnapshotReq {
        term: request.term.as_u64(),
        leader: Some(member_to_proto(&request.leader)),
        snapshot_index: request.snapshot_index.as_u64(),
        snapshot_term: request.snapshot_term.as_u64(),
        configuration: Some(configuration_to_proto(&request.configuration)),
        data: request.data.to_vec(),
    }
}

pub(crate) fn install_snapshot_request_from_proto(
    request: ProtoInstallSnapshotReq,
) -> Result<InstallSnapshotRequest, ConvertError> {
    Ok(InstallSnapshotRequest {
        term: Term::new(request.term),
        leader: member_from_proto(request.leader, "leader")?,
        snapshot_index: Index::new(request.snapshot_index),
        snapshot_term: Term::new(request.snapshot_term),
        configuration: configuration_from_proto(request.configuration, "configuration")?,
        data: Bytes::from(request.data),
    })
}

pub(crate) fn install_snapshot_response_to_proto(response: InstallSnapshotResponse) -> ProtoInstallSnapshotResult {
    ProtoInstallSnapshotResult {
        term: response.term.as_u64(),
        success: response.success,
        snapshot_index: response.snapshot_index.as_u64(),
    }
}

pub(crate) fn install_snapshot_response_from_proto(response: ProtoInstallSnapshotResult) -> InstallSnapshotResponse {
    InstallSnapshotResponse {
        term: Term::new(response.term),
        success: response.success,
        snapshot_index: Index::new(response.snapshot_index),
    }
}
