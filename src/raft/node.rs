use crate::api::{RaftOptions, RaftOptionsValidated};
use crate::commitlog::{Index, Log};
use crate::metadata::{MetadataError, MetadataStore};
use crate::raft::commit_stream::{self, CommitStream};
use crate::raft::members::MemberArena;
use crate::raft::peer::ReplicationAction;
use crate::raft::raft_log::RaftLog;
use crate::raft::role::{
    self, CandidateState, FollowerState, InactiveState, LeaderState, Membership, Role, RoleEvent, RoleKind,
};
use crate::raft::state_change_listener::{self, RoleChangeListener, RoleChangeNotifier, RoleSnapshot};
use crate::raft::{
    AppendRequest, AppendResponse, Clock, Configuration, ConfigurationError, ConfigureRequest, ConfigureResponse,
    EntryKind, InstallSnapshotRequest, InstallSnapshotResponse, JoinRequest, JoinResponse, LeaveRequest,
    LeaveResponse, LogEntry, MemberId, RaftRequest, RaftResponse, Term, Transport, VoteRequest, VoteResponse,
};
use crate::snapshot::SnapshotStore;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::convert::TryFrom;
use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct RaftNodeConfig<L, M, T> {
    pub logger: slog::Logger,
    pub member_id: MemberId,
    pub options: RaftOptions,
    pub metadata: M,
    pub log: L,
    pub transport: T,
    pub clock: Arc<dyn Clock>,
    /// Where snapshots received from a leader are stored, and where the leader looks for the
    /// snapshot to send to followers that fell behind its log.
    pub snapshots: Arc<SnapshotStore>,
    pub snapshot_name: String,
    /// Seeds election jitter. `None` seeds from entropy.
    pub rng_seed: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeCreationError {
    #[error("Illegal options for configuring node: {0}")]
    IllegalOptions(String),
    #[error("Failed to load metadata")]
    Metadata(#[from] MetadataError),
    #[error("Failed to recover the log")]
    LogRecovery(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ProposeError {
    #[error("not leader (leader: {leader:?})")]
    NotLeader { leader: Option<MemberId> },
    #[error("entries of this kind are only appended by the node itself")]
    ReservedEntry,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MembershipError {
    #[error("node is already active")]
    AlreadyActive,
    #[error("node is not active")]
    NotActive,
    #[error("node is not a member of its configuration")]
    NotAMember,
    #[error("no contacts to join through")]
    NoContacts,
    #[error("a leader cannot leave")]
    LeaderCannotLeave,
    #[error("an election is in progress")]
    ElectionInProgress,
    #[error("invalid configuration")]
    Configuration(#[from] ConfigurationError),
}

/// RaftNode is one member's consensus state machine.
///
/// It never blocks and never spawns. Requests are answered synchronously; outbound requests go
/// through the `Transport`, and whatever comes back is fed into `handle_response`. Time only
/// moves when `tick` is called.
pub struct RaftNode<L, M, T>
where
    L: Log<LogEntry>,
    M: MetadataStore,
    T: Transport,
{
    logger: slog::Logger,
    member_id: MemberId,
    options: RaftOptionsValidated,
    metadata: M,
    log: RaftLog<L>,
    transport: T,
    clock: Arc<dyn Clock>,
    snapshots: Arc<SnapshotStore>,
    snapshot_name: String,
    rng: StdRng,

    term: Term,
    vote: Option<MemberId>,
    leader: Option<MemberId>,
    // Oldest first; the last one is current. The first one is the configuration in effect at the
    // log's base, the rest were appended to the log after it.
    configurations: Vec<Configuration>,
    members: MemberArena,
    role: Role,
    role_notifier: RoleChangeNotifier,
}

impl<L, M, T> RaftNode<L, M, T>
where
    L: Log<LogEntry>,
    M: MetadataStore,
    T: Transport,
{
    pub fn new(config: RaftNodeConfig<L, M, T>) -> Result<(Self, CommitStream), NodeCreationError> {
        let options = RaftOptionsValidated::try_from(config.options)
            .map_err(|e| NodeCreationError::IllegalOptions(e.to_string()))?;
        let logger = config
            .logger
            .new(slog::o!("member" => config.member_id.to_string()));

        let mut metadata = config.metadata;
        let term = metadata.load_term()?;
        let vote = metadata.load_vote()?;
        let configurations: Vec<Configuration> = metadata.load_configuration()?.into_iter().collect();
        slog::info!(
            logger,
            "Loaded metadata: term {:?}, vote {:?}, configuration {:?}",
            term,
            vote,
            configurations.last()
        );

        let (publisher, commit_stream) = commit_stream::new();
        let log = RaftLog::new(logger.clone(), config.log, publisher)?;
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (role_notifier, _) = state_change_listener::new(RoleSnapshot {
            role: RoleKind::Inactive,
            term,
            leader: None,
        });

        let mut node = RaftNode {
            logger,
            member_id: config.member_id,
            options,
            metadata,
            log,
            transport: config.transport,
            clock: config.clock,
            snapshots: config.snapshots,
            snapshot_name: config.snapshot_name,
            rng,
            term,
            vote,
            leader: None,
            configurations,
            members: MemberArena::new(),
            role: Role::Inactive(InactiveState {
                membership: Membership::Idle,
                next_attempt: None,
            }),
            role_notifier,
        };
        node.reconcile_members();

        Ok((node, commit_stream))
    }

    // ------- Public API --------

    /// Starts the node as a member of `members`, or of its stored configuration if it has one.
    pub fn bootstrap(&mut self, members: Vec<MemberId>) -> Result<(), MembershipError> {
        if self.role.kind() != RoleKind::Inactive {
            return Err(MembershipError::AlreadyActive);
        }

        if self.configurations.is_empty() {
            let configuration = Configuration::new(Index::ZERO, Term::ZERO, members)?;
            self.configure(configuration);
        } else {
            slog::info!(
                self.logger,
                "Restarting with stored configuration {:?}",
                self.configurations.last()
            );
        }

        self.start()
    }

    /// Joins an existing cluster through `contacts`. The node stays `Inactive` until a leader
    /// admits it.
    pub fn join(&mut self, contacts: Vec<MemberId>) -> Result<(), MembershipError> {
        if self.role.kind() != RoleKind::Inactive {
            return Err(MembershipError::AlreadyActive);
        }
        if self.is_voting_member() {
            return self.start();
        }

        let contacts: Vec<MemberId> = contacts.into_iter().filter(|c| *c != self.member_id).collect();
        if contacts.is_empty() {
            return Err(MembershipError::NoContacts);
        }

        slog::info!(self.logger, "Joining through {:?}", contacts);
        self.role = Role::Inactive(InactiveState {
            membership: Membership::Joining { contacts },
            next_attempt: None,
        });
        self.send_join_requests(self.clock.now());
        Ok(())
    }

    /// Asks the leader to remove this node. The node becomes `Inactive` once the leader agrees.
    pub fn leave(&mut self) -> Result<(), MembershipError> {
        let now = self.clock.now();
        match &mut self.role {
            Role::Follower(state) => state.leaving = Some(now),
            Role::Leader(_) => return Err(MembershipError::LeaderCannotLeave),
            Role::Candidate(_) => return Err(MembershipError::ElectionInProgress),
            Role::Inactive(_) => return Err(MembershipError::NotActive),
        }

        slog::info!(self.logger, "Leaving the cluster");
        self.send_leave_requests(now);
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.step(RoleEvent::Stopped);
        self.publish_role();
    }

    /// Drives timeouts: elections, heartbeats, replication retries, join and leave retries.
    pub fn tick(&mut self) {
        let now = self.clock.now();

        enum Due {
            Nothing,
            Join,
            Election,
            Leave,
            Votes,
            Replication,
        }

        let due = match &self.role {
            Role::Inactive(InactiveState {
                membership: Membership::Joining { .. },
                next_attempt,
            }) => match next_attempt {
                Some(at) if now < *at => Due::Nothing,
                _ => Due::Join,
            },
            Role::Inactive(_) => Due::Nothing,
            Role::Follower(state) => {
                if state.election_deadline.map(|at| now >= at).unwrap_or(false) {
                    Due::Election
                } else if state.leaving.map(|at| now >= at).unwrap_or(false) {
                    Due::Leave
                } else {
                    Due::Nothing
                }
            }
            Role::Candidate(state) => {
                if now >= state.election_deadline {
                    Due::Election
                } else {
                    Due::Votes
                }
            }
            Role::Leader(_) => Due::Replication,
        };

        match due {
            Due::Nothing => {}
            Due::Join => self.send_join_requests(now),
            Due::Election => {
                slog::info!(self.logger, "Election timeout in term {:?}", self.term);
                self.step(RoleEvent::ElectionTimeout);
            }
            Due::Leave => self.send_leave_requests(now),
            Due::Votes => self.send_vote_requests(),
            Due::Replication => {
                self.pump_replication();
                self.advance_commit_index();
            }
        }

        self.publish_role();
    }

    pub fn handle_request(&mut self, request: RaftRequest) -> RaftResponse {
        slog::debug!(self.logger, "ServerWire - {} request: {:?}", request.name(), request);

        let response = match request {
            RaftRequest::Vote(request) => RaftResponse::Vote(self.on_vote_request(request)),
            RaftRequest::Append(request) => RaftResponse::Append(self.on_append_request(request)),
            RaftRequest::Join(request) => RaftResponse::Join(self.on_join(request)),
            RaftRequest::Leave(request) => RaftResponse::Leave(self.on_leave(request)),
            RaftRequest::Configure(request) => RaftResponse::Configure(self.on_configure(request)),
            RaftRequest::InstallSnapshot(request) => RaftResponse::InstallSnapshot(self.on_install_snapshot(request)),
        };

        self.publish_role();
        response
    }

    pub fn handle_response(&mut self, from: &MemberId, response: RaftResponse) {
        slog::debug!(self.logger, "ClientWire - response from {}: {:?}", from, response);

        match response {
            RaftResponse::Vote(response) => self.on_vote_response(from, response),
            RaftResponse::Append(response) => self.on_append_response(from, response),
            RaftResponse::Join(response) => self.on_join_response(response),
            RaftResponse::Leave(response) => self.on_leave_response(response),
            RaftResponse::Configure(response) => {
                self.observe_response_term(response.term);
            }
            RaftResponse::InstallSnapshot(response) => self.on_install_snapshot_response(from, response),
        }

        self.publish_role();
    }

    /// Appends an entry to the leader's log and starts replicating it.
    pub fn propose(&mut self, kind: EntryKind) -> Result<Index, ProposeError> {
        if !matches!(self.role, Role::Leader(_)) {
            return Err(ProposeError::NotLeader {
                leader: self.leader.clone(),
            });
        }
        if matches!(kind, EntryKind::Initialize | EntryKind::Configuration { .. }) {
            return Err(ProposeError::ReservedEntry);
        }

        // > If command received from client: append entry to local log,
        // > respond after entry applied to state machine (§5.3)
        let index = self.append_local(kind);
        self.pump_replication();
        self.advance_commit_index();
        Ok(index)
    }

    /// Discards log entries up to and including `index`, once they are captured by a snapshot.
    pub fn compact(&mut self, index: Index) -> Result<(), io::Error> {
        self.log.compact(index)?;
        let (base, _) = self.log.base();
        self.trim_configurations(base);
        Ok(())
    }

    /// Positions the log after a snapshot found at startup. Must be called before the node starts.
    pub fn recover_from_snapshot(&mut self, index: Index, term: Term, configuration: Configuration) {
        self.log.recover_from_snapshot(index, term);

        let stored_is_newer = self
            .configurations
            .last()
            .map(|stored| stored.position() > configuration.position())
            .unwrap_or(false);
        if !stored_is_newer {
            self.persist_configuration(&configuration);
            self.configurations = vec![configuration];
            self.reconcile_members();
        }
        slog::info!(self.logger, "Recovered from snapshot at {:?} (term {:?})", index, term);
    }

    pub fn subscribe(&self) -> RoleChangeListener {
        self.role_notifier.subscribe()
    }

    pub fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    pub fn term(&self) -> Term {
        self.term
    }

    pub fn voted_for(&self) -> Option<&MemberId> {
        self.vote.as_ref()
    }

    pub fn role(&self) -> RoleKind {
        self.role.kind()
    }

    pub fn is_leader(&self) -> bool {
        self.role.kind() == RoleKind::Leader
    }

    pub fn leader(&self) -> Option<&MemberId> {
        self.leader.as_ref()
    }

    pub fn configuration(&self) -> Option<&Configuration> {
        self.configurations.last()
    }

    pub fn commit_index(&self) -> Index {
        self.log.commit_index()
    }

    pub fn last_log_index(&self) -> Index {
        self.log.last_index()
    }

    pub fn first_log_index(&self) -> Index {
        self.log.first_index()
    }

    pub fn entry(&self, index: Index) -> Result<Option<LogEntry>, io::Error> {
        self.log.read(index)
    }

    pub fn term_at(&self, index: Index) -> Result<Option<Term>, io::Error> {
        self.log.term_at(index)
    }

    // ------- Roles --------

    fn step(&mut self, event: RoleEvent) {
        let current = self.role.kind();
        let next = match role::transition(current, event) {
            Some(next) => next,
            None => return,
        };
        slog::info!(
            self.logger,
            "Role transition {:?} -> {:?} on {:?} (term {:?})",
            current,
            next,
            event,
            self.term
        );

        match next {
            RoleKind::Inactive => self.become_inactive(),
            RoleKind::Follower => self.become_follower(),
            RoleKind::Candidate => self.become_candidate(),
            RoleKind::Leader => self.become_leader(),
        }
    }

    fn become_inactive(&mut self) {
        self.role = Role::Inactive(InactiveState {
            membership: Membership::Idle,
            next_attempt: None,
        });
        self.leader = None;
        self.members.clear();
    }

    fn become_follower(&mut self) {
        let leaving = match &self.role {
            Role::Follower(state) => state.leaving,
            _ => None,
        };
        self.close_controllers();
        self.reconcile_members();

        let election_deadline = if self.is_voting_member() {
            Some(self.random_election_deadline())
        } else {
            None
        };
        self.role = Role::Follower(FollowerState {
            election_deadline,
            leaving,
        });
    }

    fn become_candidate(&mut self) {
        // Write-ahead log style: Vote for self on local state before transitioning to candidate.
        let term = self.term.next();
        self.persist_term_and_vote(term, Some(self.member_id.clone()));
        self.leader = None;

        let election_deadline = self.random_election_deadline();
        self.role = Role::Candidate(CandidateState { election_deadline });
        for member in self.members.iter_mut() {
            member.replication.close();
            member.vote.reset(term);
        }
        slog::info!(self.logger, "Starting election for term {:?}", term);

        if self.has_vote_quorum() {
            self.step(RoleEvent::QuorumOfVotes);
            return;
        }
        self.send_vote_requests();
    }

    fn become_leader(&mut self) {
        let last_index = self.log.last_index();
        for member in self.members.iter_mut() {
            member.vote.close();
            member.replication.reset(last_index);
        }
        self.leader = Some(self.member_id.clone());

        // Entries from earlier terms can only commit once an entry of this term does.
        let initialize_index = self.append_local(EntryKind::Initialize);
        self.role = Role::Leader(LeaderState { initialize_index });
        slog::info!(
            self.logger,
            "Became leader for term {:?}, initializing at {:?}",
            self.term,
            initialize_index
        );

        self.pump_replication();
        self.advance_commit_index();
    }

    fn close_controllers(&mut self) {
        for member in self.members.iter_mut() {
            member.replication.close();
            member.vote.close();
        }
    }

    /// > If RPC request or response contains term T > currentTerm:
    /// > set currentTerm = T, convert to follower (§5.1)
    fn observe_term(&mut self, term: Term) {
        slog::info!(self.logger, "Observed term {:?} > {:?}", term, self.term);
        self.persist_term_and_vote(term, None);
        self.leader = None;
        self.step(RoleEvent::HigherTerm);
    }

    fn observe_response_term(&mut self, term: Term) -> bool {
        if term > self.term {
            self.observe_term(term);
            return true;
        }
        false
    }

    /// Accepts `leader` as the leader of `term`, which is at least our own.
    fn follow(&mut self, term: Term, leader: &MemberId) {
        if term > self.term {
            self.observe_term(term);
        } else if matches!(self.role, Role::Candidate(_)) {
            self.step(RoleEvent::LeaderDiscovered);
        }
        if self.leader.as_ref() != Some(leader) {
            slog::info!(self.logger, "Following {} in term {:?}", leader, term);
            self.leader = Some(leader.clone());
        }
        self.reset_election_timer();
    }

    fn reset_election_timer(&mut self) {
        if !matches!(self.role, Role::Follower(_)) {
            return;
        }
        let deadline = if self.is_voting_member() {
            Some(self.random_election_deadline())
        } else {
            None
        };
        if let Role::Follower(state) = &mut self.role {
            state.election_deadline = deadline;
        }
    }

    fn random_election_deadline(&mut self) -> Instant {
        let min = self.options.election_timeout_min.as_millis() as u64;
        let max = self.options.election_timeout_max.as_millis() as u64;
        self.clock.now() + Duration::from_millis(self.rng.gen_range(min..=max))
    }

    fn is_voting_member(&self) -> bool {
        self.configurations
            .last()
            .map(|configuration| configuration.contains(&self.member_id))
            .unwrap_or(false)
    }

    fn is_idle_inactive(&self) -> bool {
        matches!(
            self.role,
            Role::Inactive(InactiveState {
                membership: Membership::Idle,
                ..
            })
        )
    }

    fn is_joining(&self) -> bool {
        matches!(
            self.role,
            Role::Inactive(InactiveState {
                membership: Membership::Joining { .. },
                ..
            })
        )
    }

    fn start(&mut self) -> Result<(), MembershipError> {
        if !self.is_voting_member() {
            return Err(MembershipError::NotAMember);
        }
        self.step(RoleEvent::Started);
        self.publish_role();
        Ok(())
    }

    fn publish_role(&self) {
        self.role_notifier.notify_new_state(RoleSnapshot {
            role: self.role.kind(),
            term: self.term,
            leader: self.leader.clone(),
        });
    }

    // ------- Elections --------

    fn on_vote_request(&mut self, request: VoteRequest) -> VoteResponse {
        if matches!(self.role, Role::Inactive(_)) {
            return self.vote_response(false);
        }

        // 1. Reply false if term < currentTerm (§5.1)
        if request.term < self.term {
            slog::info!(self.logger, "Not granting vote. Candidate term is out of date.");
            return self.vote_response(false);
        }

        if request.term > self.term {
            self.observe_term(request.term);
        }

        // Ensure candidate is known member.
        let candidate_is_member = self
            .configurations
            .last()
            .map(|configuration| configuration.contains(&request.candidate))
            .unwrap_or(false);
        if !candidate_is_member {
            slog::info!(self.logger, "Not granting vote. {} is not a member.", request.candidate);
            return self.vote_response(false);
        }

        // 2. If votedFor is null or candidateId, and candidate’s log is at
        // least as up-to-date as receiver’s log, grant vote (§5.2, §5.4).
        if let Some(voted_for) = &self.vote {
            if *voted_for != request.candidate {
                slog::info!(self.logger, "Not granting vote. We already voted for {}.", voted_for);
                return self.vote_response(false);
            }
        }

        if !self.is_candidate_log_gte_mine(request.last_log_index, request.last_log_term) {
            slog::info!(self.logger, "Not granting vote. Candidate log is out of date.");
            return self.vote_response(false);
        }

        slog::info!(self.logger, "Voting for {} in term {:?}.", request.candidate, self.term);
        if self.vote.is_none() {
            self.persist_term_and_vote(self.term, Some(request.candidate));
        }
        self.reset_election_timer();
        self.vote_response(true)
    }

    fn vote_response(&self, granted: bool) -> VoteResponse {
        VoteResponse {
            term: self.term,
            granted,
        }
    }

    fn is_candidate_log_gte_mine(&self, last_log_index: Index, last_log_term: Term) -> bool {
        // > Raft determines which of two logs is more up-to-date
        // > by comparing the index and term of the last entries in the
        // > logs. If the logs have last entries with different terms, then
        // > the log with the later term is more up-to-date. If the logs
        // > end with the same term, then whichever log is longer is
        // > more up-to-date.
        let (my_last_index, my_last_term) = self.log.latest_entry();
        if last_log_term != my_last_term {
            return last_log_term > my_last_term;
        }
        last_log_index >= my_last_index
    }

    fn send_vote_requests(&mut self) {
        if !matches!(self.role, Role::Candidate(_)) {
            return;
        }
        let now = self.clock.now();
        let term = self.term;
        let (last_log_index, last_log_term) = self.log.latest_entry();

        for key in self.members.keys() {
            if let Some(member) = self.members.get_mut(key) {
                if member.vote.poll(now, term, self.options.append_timeout) {
                    let request = RaftRequest::Vote(VoteRequest {
                        term,
                        candidate: self.member_id.clone(),
                        last_log_index,
                        last_log_term,
                    });
                    self.transport.send(&member.id, request);
                }
            }
        }
    }

    fn on_vote_response(&mut self, from: &MemberId, response: VoteResponse) {
        if self.observe_response_term(response.term) {
            return;
        }
        if !matches!(self.role, Role::Candidate(_)) {
            slog::debug!(self.logger, "Received vote from {} while {:?}", from, self.role);
            return;
        }

        let newly_granted = match self.members.by_id_mut(from) {
            Some(member) => member.vote.on_vote_response(response.term, response.granted),
            None => return,
        };
        if !newly_granted {
            return;
        }

        slog::info!(self.logger, "Received vote from {} for term {:?}", from, self.term);
        if self.has_vote_quorum() {
            self.step(RoleEvent::QuorumOfVotes);
        }
    }

    fn has_vote_quorum(&self) -> bool {
        let configuration = match self.configurations.last() {
            Some(configuration) => configuration,
            None => return false,
        };

        let mut votes = if configuration.contains(&self.member_id) { 1 } else { 0 };
        votes += self
            .members
            .iter()
            .filter(|member| configuration.contains(&member.id) && member.vote.is_granted(self.term))
            .count();
        votes >= configuration.quorum()
    }

    // ------- Replication --------

    fn on_append_request(&mut self, request: AppendRequest) -> AppendResponse {
        // 1. Reply false if term < currentTerm (§5.1)
        if request.term < self.term || self.is_idle_inactive() {
            return self.append_response(false, self.log.last_index());
        }

        self.accept_leader(request.term, &request.leader);

        // 2. Reply false if [my] log doesn't contain an entry at [leader's]
        // prevLogIndex whose term matches [leader's] prevLogTerm (§5.3)
        let prev_log_index = request.prev_log_index;
        let (base_index, _) = self.log.base();
        if prev_log_index > self.log.last_index() {
            return self.append_response(false, self.log.last_index());
        }
        // Anything at or below the base is committed, so it matches the leader.
        if prev_log_index >= base_index {
            match self.log.term_at(prev_log_index) {
                Ok(Some(term)) if term == request.prev_log_term => {}
                Ok(_) => {
                    slog::debug!(self.logger, "Missing previous log entry {:?}", prev_log_index);
                    return self.append_response(false, prev_log_index.minus(1));
                }
                Err(e) => {
                    slog::warn!(self.logger, "Failed to read log at {:?}: {:?}", prev_log_index, e);
                    return self.append_response(false, self.log.commit_index());
                }
            }
        }

        // 3. If [my] existing entry conflicts with [leader's new entries]
        // (same index but different terms), delete [my] existing entry and
        // all that follow it (§5.3)
        // 4. Append any new entries not already in the log
        let num_entries = request.entries.len() as u64;
        let mut next_entry_index = prev_log_index.plus(1);
        for entry in request.entries {
            if next_entry_index > base_index {
                if let Err(e) = self.append_from_leader(next_entry_index, entry) {
                    slog::warn!(self.logger, "Failed to append {:?}: {:?}", next_entry_index, e);
                    return self.append_response(false, next_entry_index.minus(1));
                }
            }
            next_entry_index = next_entry_index.plus(1);
        }

        // 5. If leaderCommit > commitIndex, set commitIndex = min(leaderCommit, index of last new entry)
        let index_of_last_new_entry = prev_log_index.plus(num_entries);
        if request.leader_commit > self.log.commit_index() {
            let new_commit_index = request.leader_commit.min(index_of_last_new_entry);
            if let Err(e) = self.log.ratchet_fwd_commit_index(new_commit_index) {
                slog::warn!(self.logger, "Failed to publish committed entries: {:?}", e);
            }
        }

        self.append_response(true, index_of_last_new_entry)
    }

    fn append_response(&self, success: bool, match_index: Index) -> AppendResponse {
        AppendResponse {
            term: self.term,
            success,
            match_index,
        }
    }

    /// Leader discovery shared by appends, snapshot installs and configure requests.
    fn accept_leader(&mut self, term: Term, leader: &MemberId) {
        if self.is_joining() {
            if term > self.term {
                self.observe_term(term);
            }
            self.leader = Some(leader.clone());
        } else {
            self.follow(term, leader);
        }
    }

    fn append_from_leader(&mut self, index: Index, entry: LogEntry) -> Result<(), io::Error> {
        match self.log.term_at(index)? {
            // 4. (no-op)
            Some(term) if term == entry.term => return Ok(()),
            // 3. (delete)
            Some(_) => {
                self.log.truncate(index)?;
                self.revert_configurations(index);
            }
            None => {}
        }

        // 4. (append)
        let configuration_members = match &entry.kind {
            EntryKind::Configuration { members } => Some(members.clone()),
            _ => None,
        };
        let term = entry.term;
        let appended_index = self.log.append(entry)?;
        if appended_index != index {
            self.halt(
                "Appended log entry to unexpected index",
                format!("expected {:?}, got {:?}", index, appended_index),
            );
        }

        if let Some(members) = configuration_members {
            match Configuration::new(index, term, members) {
                Ok(configuration) => {
                    self.configure(configuration);
                }
                Err(e) => slog::warn!(self.logger, "Ignoring invalid configuration at {:?}: {}", index, e),
            }
        }
        Ok(())
    }

    fn append_local(&mut self, kind: EntryKind) -> Index {
        let entry = LogEntry {
            term: self.term,
            timestamp: self.clock.wall_millis(),
            kind,
        };
        match self.log.append(entry) {
            Ok(index) => index,
            Err(e) => self.halt("Failed to append to local log", e),
        }
    }

    fn pump_replication(&mut self) {
        if !matches!(self.role, Role::Leader(_)) {
            return;
        }
        let now = self.clock.now();

        for key in self.members.keys() {
            let action = match self.members.get(key) {
                Some(member) => member.replication.poll(
                    now,
                    self.log.first_index(),
                    self.log.last_index(),
                    self.options.max_entries_per_append,
                    self.options.append_timeout,
                ),
                None => continue,
            };

            let request = match action {
                ReplicationAction::Idle => continue,
                ReplicationAction::Append {
                    prev_log_index,
                    last_index,
                } => match self.new_append_request(prev_log_index, last_index) {
                    Ok(request) => Some(RaftRequest::Append(request)),
                    Err(e) => {
                        slog::error!(self.logger, "Failed to read log after {:?}: {:?}", prev_log_index, e);
                        continue;
                    }
                },
                ReplicationAction::InstallSnapshot => self.new_install_snapshot_request().map(RaftRequest::InstallSnapshot),
            };

            if let Some(member) = self.members.get_mut(key) {
                // Even when no snapshot could be sent: wait a timeout before trying again.
                member.replication.on_sent(now, self.options.heartbeat_interval);
                if let Some(request) = request {
                    self.transport.send(&member.id, request);
                }
            }
        }
    }

    fn new_append_request(&self, prev_log_index: Index, last_index: Index) -> Result<AppendRequest, io::Error> {
        let prev_log_term = self.log.term_at(prev_log_index)?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no term for previous log entry {:?}", prev_log_index),
            )
        })?;
        let entries = self.log.read_range(prev_log_index.plus(1), last_index)?;

        Ok(AppendRequest {
            term: self.term,
            leader: self.member_id.clone(),
            prev_log_index,
            prev_log_term,
            entries,
            leader_commit: self.log.commit_index(),
        })
    }

    fn new_install_snapshot_request(&self) -> Option<InstallSnapshotRequest> {
        let (base_index, base_term) = self.log.base();
        let snapshot = match self.snapshots.latest(&self.snapshot_name) {
            Ok(Some(snapshot)) if snapshot.position == base_index => snapshot,
            Ok(other) => {
                slog::warn!(
                    self.logger,
                    "No snapshot at log base {:?} to send (latest: {:?})",
                    base_index,
                    other.map(|s| s.position)
                );
                return None;
            }
            Err(e) => {
                slog::warn!(self.logger, "Failed to list snapshots: {:?}", e);
                return None;
            }
        };
        let data = match self.snapshots.read(&snapshot) {
            Ok(data) => data,
            Err(e) => {
                slog::warn!(self.logger, "Failed to read snapshot {:?}: {:?}", snapshot.path, e);
                return None;
            }
        };
        let configuration = self.configuration_at(base_index)?.clone();

        Some(InstallSnapshotRequest {
            term: self.term,
            leader: self.member_id.clone(),
            snapshot_index: base_index,
            snapshot_term: base_term,
            configuration,
            data: Bytes::from(data),
        })
    }

    fn on_append_response(&mut self, from: &MemberId, response: AppendResponse) {
        if self.observe_response_term(response.term) {
            return;
        }
        if !matches!(self.role, Role::Leader(_)) || response.term != self.term {
            slog::debug!(self.logger, "Ignoring stale append response from {}", from);
            return;
        }

        match self.members.by_id_mut(from) {
            Some(member) => member.replication.on_append_response(&response),
            None => return,
        }
        if !response.success {
            slog::debug!(self.logger, "{} rejected append, hint {:?}", from, response.match_index);
        }

        self.advance_commit_index();
        self.pump_replication();
    }

    /// > If there exists an N such that N > commitIndex, a majority
    /// > of matchIndex[i] ≥ N, and log[N].term == currentTerm:
    /// > set commitIndex = N (§5.3, §5.4).
    fn advance_commit_index(&mut self) {
        if !matches!(self.role, Role::Leader(_)) {
            return;
        }
        let configuration = match self.configurations.last() {
            Some(configuration) => configuration,
            None => return,
        };

        let mut matched: Vec<Index> = self
            .members
            .iter()
            .filter(|member| configuration.contains(&member.id))
            .map(|member| member.replication.matched())
            .collect();
        if configuration.contains(&self.member_id) {
            matched.push(self.log.last_index());
        }
        let quorum = configuration.quorum();

        if let Some(tentative_new_commit_index) = cluster_commit_index(matched, quorum) {
            match self
                .log
                .ratchet_fwd_commit_index_if_valid(tentative_new_commit_index, self.term)
            {
                Ok(true) => slog::debug!(self.logger, "Commit index is now {:?}", tentative_new_commit_index),
                Ok(false) => {}
                Err(e) => slog::warn!(
                    self.logger,
                    "IO failure while confirming new commit index {:?}: {:?}",
                    tentative_new_commit_index,
                    e
                ),
            }
        }
    }

    // ------- Snapshots --------

    fn on_install_snapshot(&mut self, request: InstallSnapshotRequest) -> InstallSnapshotResponse {
        let snapshot_index = request.snapshot_index;
        if request.term < self.term || self.is_idle_inactive() {
            return self.install_snapshot_response(false, snapshot_index);
        }

        self.accept_leader(request.term, &request.leader);

        if snapshot_index <= self.log.commit_index() {
            return self.install_snapshot_response(true, snapshot_index);
        }

        if let Err(e) = self
            .snapshots
            .write(&self.snapshot_name, snapshot_index, snapshot_index, &request.data)
        {
            slog::warn!(self.logger, "Failed to store snapshot at {:?}: {:?}", snapshot_index, e);
            return self.install_snapshot_response(false, snapshot_index);
        }

        slog::info!(
            self.logger,
            "Installed snapshot at {:?} (term {:?}) from {}",
            snapshot_index,
            request.snapshot_term,
            request.leader
        );
        self.log.reset_to_snapshot(snapshot_index, request.snapshot_term);

        self.persist_configuration(&request.configuration);
        self.configurations = vec![request.configuration];
        self.reconcile_members();
        self.apply_membership();

        self.install_snapshot_response(true, snapshot_index)
    }

    fn install_snapshot_response(&self, success: bool, snapshot_index: Index) -> InstallSnapshotResponse {
        InstallSnapshotResponse {
            term: self.term,
            success,
            snapshot_index,
        }
    }

    fn on_install_snapshot_response(&mut self, from: &MemberId, response: InstallSnapshotResponse) {
        if self.observe_response_term(response.term) {
            return;
        }
        if !matches!(self.role, Role::Leader(_)) || response.term != self.term {
            return;
        }

        match self.members.by_id_mut(from) {
            Some(member) if response.success => member.replication.on_snapshot_installed(response.snapshot_index),
            Some(member) => member.replication.on_snapshot_failed(),
            None => return,
        }

        self.advance_commit_index();
        self.pump_replication();
    }

    // ------- Membership --------

    /// Adopts `configuration` if it is newer than the current one.
    fn configure(&mut self, configuration: Configuration) -> bool {
        if let Some(current) = self.configurations.last() {
            if configuration.position() <= current.position() {
                return false;
            }
        }

        slog::info!(self.logger, "Adopting configuration {:?}", configuration);
        self.persist_configuration(&configuration);
        self.configurations.push(configuration);
        self.reconcile_members();
        self.apply_membership();
        true
    }

    fn reconcile_members(&mut self) {
        let configuration = match self.configurations.last() {
            Some(configuration) => configuration,
            None => return,
        };
        let next = self.log.last_index().plus(1);
        let reconciliation = self.members.reconcile(configuration, &self.member_id, next);

        if !reconciliation.added.is_empty() || !reconciliation.removed.is_empty() {
            slog::info!(
                self.logger,
                "Members added: {:?}, removed: {:?}",
                reconciliation.added,
                reconciliation.removed
            );
        }
    }

    /// Starts a joining node once it's admitted, stops an active node once it's removed.
    fn apply_membership(&mut self) {
        let is_member = self.is_voting_member();
        let is_active = !matches!(self.role, Role::Inactive(_));

        if self.is_joining() && is_member {
            slog::info!(self.logger, "Admitted to the cluster");
            self.step(RoleEvent::Started);
        } else if is_active && !is_member {
            slog::info!(self.logger, "Removed from the cluster");
            self.step(RoleEvent::Stopped);
        }
    }

    /// Drops configurations whose entries were truncated from the log. The base configuration is
    /// always kept.
    fn revert_configurations(&mut self, truncated_from: Index) {
        let before = self.configurations.last().map(|c| c.position());
        while self.configurations.len() > 1
            && self
                .configurations
                .last()
                .map(|c| c.position() >= truncated_from)
                .unwrap_or(false)
        {
            self.configurations.pop();
        }

        if self.configurations.last().map(|c| c.position()) != before {
            if let Some(configuration) = self.configurations.last().cloned() {
                slog::info!(self.logger, "Reverted to configuration {:?}", configuration);
                self.persist_configuration(&configuration);
                self.reconcile_members();
            }
        }
    }

    fn trim_configurations(&mut self, base: Index) {
        if let Some(keep_from) = self.configurations.iter().rposition(|c| c.position() <= base) {
            self.configurations.drain(..keep_from);
        }
    }

    /// The configuration in effect at `index`.
    pub fn configuration_at(&self, index: Index) -> Option<&Configuration> {
        self.configurations
            .iter()
            .rev()
            .find(|configuration| configuration.position() <= index)
            .or_else(|| self.configurations.first())
    }

    fn send_join_requests(&mut self, now: Instant) {
        let contacts = match &mut self.role {
            Role::Inactive(InactiveState {
                membership: Membership::Joining { contacts },
                next_attempt,
            }) => {
                *next_attempt = Some(now + self.options.join_retry_interval);
                contacts.clone()
            }
            _ => return,
        };

        for contact in contacts.iter() {
            let request = RaftRequest::Join(JoinRequest {
                member: self.member_id.clone(),
            });
            self.transport.send(contact, request);
        }
    }

    fn on_join(&mut self, request: JoinRequest) -> JoinResponse {
        let initialize_index = match &self.role {
            Role::Leader(state) => state.initialize_index,
            _ => return self.join_response(false, None),
        };
        let current = match self.configurations.last() {
            Some(configuration) => configuration.clone(),
            None => return self.join_response(false, None),
        };

        if current.contains(&request.member) {
            return self.join_response(true, Some(current));
        }
        if !self.can_change_configuration(initialize_index) {
            slog::info!(self.logger, "Deferring join of {}: configuration change in progress", request.member);
            return self.join_response(false, None);
        }

        let mut members = current.members().to_vec();
        members.push(request.member.clone());
        match self.append_configuration(members) {
            Ok(configuration) => {
                slog::info!(self.logger, "Admitted {} at {:?}", request.member, configuration.position());
                let configure = RaftRequest::Configure(ConfigureRequest {
                    term: self.term,
                    leader: self.member_id.clone(),
                    configuration: configuration.clone(),
                });
                self.transport.send(&request.member, configure);
                self.join_response(true, Some(configuration))
            }
            Err(e) => {
                slog::warn!(self.logger, "Rejecting join of {}: {}", request.member, e);
                self.join_response(false, None)
            }
        }
    }

    fn join_response(&self, success: bool, configuration: Option<Configuration>) -> JoinResponse {
        JoinResponse {
            success,
            configuration,
            leader: self.leader.clone(),
        }
    }

    fn on_join_response(&mut self, response: JoinResponse) {
        if !self.is_joining() {
            return;
        }

        if response.success {
            if let Some(configuration) = response.configuration {
                if configuration.contains(&self.member_id) {
                    self.leader = response.leader;
                    self.configure(configuration);
                }
            }
            return;
        }

        if let Some(leader) = response.leader {
            if let Role::Inactive(InactiveState {
                membership: Membership::Joining { contacts },
                ..
            }) = &mut self.role
            {
                if !contacts.contains(&leader) && leader != self.member_id {
                    contacts.insert(0, leader);
                }
            }
        }
    }

    fn send_leave_requests(&mut self, now: Instant) {
        match &mut self.role {
            Role::Follower(state) => state.leaving = Some(now + self.options.join_retry_interval),
            _ => return,
        }

        let targets: Vec<MemberId> = match &self.leader {
            Some(leader) => vec![leader.clone()],
            None => self.members.iter().map(|member| member.id.clone()).collect(),
        };
        for target in targets.iter() {
            let request = RaftRequest::Leave(LeaveRequest {
                member: self.member_id.clone(),
            });
            self.transport.send(target, request);
        }
    }

    fn on_leave(&mut self, request: LeaveRequest) -> LeaveResponse {
        let initialize_index = match &self.role {
            Role::Leader(state) => state.initialize_index,
            _ => return self.leave_response(false, None),
        };
        let current = match self.configurations.last() {
            Some(configuration) => configuration.clone(),
            None => return self.leave_response(false, None),
        };

        if request.member == self.member_id {
            return self.leave_response(false, None);
        }
        if !current.contains(&request.member) {
            return self.leave_response(true, Some(current));
        }
        if !self.can_change_configuration(initialize_index) {
            return self.leave_response(false, None);
        }

        let members: Vec<MemberId> = current
            .members()
            .iter()
            .filter(|member| **member != request.member)
            .cloned()
            .collect();
        match self.append_configuration(members) {
            Ok(configuration) => {
                slog::info!(self.logger, "Removed {} at {:?}", request.member, configuration.position());
                self.leave_response(true, Some(configuration))
            }
            Err(e) => {
                slog::warn!(self.logger, "Rejecting leave of {}: {}", request.member, e);
                self.leave_response(false, None)
            }
        }
    }

    fn leave_response(&self, success: bool, configuration: Option<Configuration>) -> LeaveResponse {
        LeaveResponse {
            success,
            configuration,
            leader: self.leader.clone(),
        }
    }

    fn on_leave_response(&mut self, response: LeaveResponse) {
        let leaving = matches!(&self.role, Role::Follower(state) if state.leaving.is_some());
        if !leaving {
            return;
        }

        if response.success {
            if let Some(configuration) = response.configuration {
                self.configure(configuration);
            }
            self.step(RoleEvent::Stopped);
        } else if let Some(leader) = response.leader {
            self.leader = Some(leader);
        }
    }

    fn on_configure(&mut self, request: ConfigureRequest) -> ConfigureResponse {
        if request.term < self.term || self.is_idle_inactive() {
            return ConfigureResponse {
                term: self.term,
                success: false,
            };
        }

        self.accept_leader(request.term, &request.leader);
        self.configure(request.configuration);

        ConfigureResponse {
            term: self.term,
            success: true,
        }
    }

    /// Only one change may be in flight, and only after this leader's `Initialize` committed.
    fn can_change_configuration(&self, initialize_index: Index) -> bool {
        let commit_index = self.log.commit_index();
        let current_is_committed = self
            .configurations
            .last()
            .map(|configuration| configuration.position() <= commit_index)
            .unwrap_or(false);
        commit_index >= initialize_index && current_is_committed
    }

    /// Leader only. The new configuration takes effect as soon as it is appended.
    fn append_configuration(&mut self, members: Vec<MemberId>) -> Result<Configuration, ConfigurationError> {
        let index = self.log.last_index().plus(1);
        let configuration = Configuration::new(index, self.term, members.clone())?;

        let appended_index = self.append_local(EntryKind::Configuration { members });
        if appended_index != index {
            self.halt(
                "Appended configuration to unexpected index",
                format!("expected {:?}, got {:?}", index, appended_index),
            );
        }

        self.configure(configuration.clone());
        self.pump_replication();
        self.advance_commit_index();
        Ok(configuration)
    }

    // ------- Persistence --------

    fn persist_term_and_vote(&mut self, term: Term, vote: Option<MemberId>) {
        if let Err(e) = self.metadata.store_term_and_vote(term, vote.as_ref()) {
            self.halt("Failed to persist term and vote", e);
        }
        self.term = term;
        self.vote = vote;
    }

    fn persist_configuration(&mut self, configuration: &Configuration) {
        if let Err(e) = self.metadata.store_configuration(configuration) {
            self.halt("Failed to persist configuration", e);
        }
    }

    /// Consensus can't continue safely without its durable state.
    fn halt<E: Debug>(&self, context: &str, error: E) -> ! {
        slog::crit!(self.logger, "{}: {:?}. Halting.", context, error);
        panic!("{}: {:?}", context, error);
    }
}

/// Highest index stored by a quorum, given the matched index of every voting member (the leader
/// included).
fn cluster_commit_index(mut matched: Vec<Index>, quorum: usize) -> Option<Index> {
    matched.sort_unstable_by(|a, b| b.cmp(a));
    quorum.checked_sub(1).and_then(|i| matched.get(i)).copied()
}
