use crate::commitlog::{Index, Log};
use crate::metadata::MetadataStore;
use crate::raft::{
    CommitEvent, CommitStream, Configuration, EntryKind, LogEntry, MembershipError, MemberId, ProposeError, RaftNode,
    RaftRequest, RaftResponse, RoleChangeListener, Term, Transport,
};
use crate::service::{
    OperationError, OperationId, PartitionSnapshot, ServiceError, ServiceManager, SessionEvent, SessionId,
};
use crate::snapshot::{SnapshotError, SnapshotMetadata, SnapshotStore};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub type CommandResult = Result<Bytes, CommandError>;

#[derive(Clone, Debug, thiserror::Error, PartialEq)]
pub enum CommandError {
    #[error("not leader (leader: {leader:?})")]
    NotLeader { leader: Option<MemberId> },
    #[error("the entry was replaced by another leader's entry before it committed")]
    Superseded,
    #[error(transparent)]
    Operation(#[from] OperationError),
}

impl From<ProposeError> for CommandError {
    fn from(e: ProposeError) -> Self {
        match e {
            ProposeError::NotLeader { leader } => CommandError::NotLeader { leader },
            // The partition never proposes reserved entries.
            ProposeError::ReservedEntry => CommandError::Superseded,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadConsistency {
    /// Reads this member's state, which may lag the leader's.
    Sequential,
    /// Only answered by a leader that has applied everything committed in its term.
    Linearizable,
}

#[derive(Clone, Debug, thiserror::Error, PartialEq)]
pub enum QueryError {
    #[error("linearizable reads need the leader (leader: {leader:?})")]
    NotLeader { leader: Option<MemberId> },
    #[error("the leader hasn't caught up with its own term yet")]
    NotReady,
    #[error(transparent)]
    Operation(#[from] OperationError),
}

#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    #[error("snapshot store failed")]
    Snapshot(#[from] SnapshotError),
    #[error("snapshot couldn't be encoded or decoded")]
    Service(#[from] ServiceError),
    #[error("snapshot couldn't be restored")]
    Restore(#[from] OperationError),
    #[error("log I/O failed")]
    Io(#[from] io::Error),
    #[error("no term is known for index {0:?}")]
    UnknownTerm(Index),
    #[error("no configuration is known at index {0:?}")]
    UnknownConfiguration(Index),
}

struct PendingCommand {
    term: Term,
    responder: oneshot::Sender<CommandResult>,
}

/// Partition is one member of a replicated partition: a consensus node plus the services its
/// committed entries are applied to.
///
/// Every mutating call applies whatever the node committed meanwhile, so callers never see state
/// older than their own effects.
pub struct Partition<L, M, T>
where
    L: Log<LogEntry>,
    M: MetadataStore,
    T: Transport,
{
    logger: slog::Logger,
    node: RaftNode<L, M, T>,
    commits: CommitStream,
    services: ServiceManager,
    snapshots: Arc<SnapshotStore>,
    snapshot_name: String,
    snapshot_threshold: Option<u64>,
    applied_since_snapshot: u64,
    pending: BTreeMap<Index, PendingCommand>,
    events: broadcast::Sender<SessionEvent>,
}

impl<L, M, T> Partition<L, M, T>
where
    L: Log<LogEntry>,
    M: MetadataStore,
    T: Transport,
{
    /// Wraps a node that hasn't started yet. If the store has a snapshot for this partition, the
    /// services and the node's log resume from it.
    pub fn new(
        logger: slog::Logger,
        mut node: RaftNode<L, M, T>,
        commits: CommitStream,
        mut services: ServiceManager,
        snapshots: Arc<SnapshotStore>,
        snapshot_name: String,
        snapshot_threshold: Option<u64>,
    ) -> Result<Self, PartitionError> {
        if let Some(metadata) = snapshots.latest(&snapshot_name)? {
            let snapshot = PartitionSnapshot::decode(&snapshots.read(&metadata)?)?;
            services.restore(&snapshot)?;
            node.recover_from_snapshot(snapshot.index, snapshot.term, snapshot.configuration);
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Partition {
            logger,
            node,
            commits,
            services,
            snapshots,
            snapshot_name,
            snapshot_threshold,
            applied_since_snapshot: 0,
            pending: BTreeMap::new(),
            events,
        })
    }

    // ------- Consensus --------

    pub fn bootstrap(&mut self, members: Vec<MemberId>) -> Result<(), MembershipError> {
        let result = self.node.bootstrap(members);
        self.apply_commits();
        result
    }

    pub fn join(&mut self, contacts: Vec<MemberId>) -> Result<(), MembershipError> {
        self.node.join(contacts)
    }

    pub fn leave(&mut self) -> Result<(), MembershipError> {
        self.node.leave()
    }

    /// Stops the node. Commands still waiting for their entry fail.
    pub fn shutdown(&mut self) {
        self.node.shutdown();
        self.pending.clear();
    }

    pub fn tick(&mut self) {
        self.node.tick();
        self.apply_commits();
    }

    pub fn handle_request(&mut self, request: RaftRequest) -> RaftResponse {
        let response = self.node.handle_request(request);
        self.apply_commits();
        response
    }

    pub fn handle_response(&mut self, from: &MemberId, response: RaftResponse) {
        self.node.handle_response(from, response);
        self.apply_commits();
    }

    pub fn node(&self) -> &RaftNode<L, M, T> {
        &self.node
    }

    pub fn subscribe_roles(&self) -> RoleChangeListener {
        self.node.subscribe()
    }

    /// Events published by the services to their sessions, on this member.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn services(&self) -> &ServiceManager {
        &self.services
    }

    // ------- Sessions and commands --------

    /// Proposes `kind`. The receiver resolves once the entry at the returned index is applied.
    pub fn submit(&mut self, kind: EntryKind) -> Result<(Index, oneshot::Receiver<CommandResult>), CommandError> {
        let index = self.node.propose(kind)?;
        let (responder, receiver) = oneshot::channel();
        self.pending.insert(
            index,
            PendingCommand {
                term: self.node.term(),
                responder,
            },
        );
        // A single member cluster commits on proposal.
        self.apply_commits();
        Ok((index, receiver))
    }

    /// The session id is the index of the entry that opens it.
    pub fn open_session(
        &mut self,
        client: &str,
        service_name: &str,
        service_type: &str,
        timeout_millis: u64,
    ) -> Result<(SessionId, oneshot::Receiver<CommandResult>), CommandError> {
        let (index, receiver) = self.submit(EntryKind::OpenSession {
            client: client.to_string(),
            service_name: service_name.to_string(),
            service_type: service_type.to_string(),
            timeout_millis,
        })?;
        Ok((SessionId::from(index), receiver))
    }

    pub fn query(
        &mut self,
        session: SessionId,
        operation: OperationId,
        operand: Bytes,
        consistency: ReadConsistency,
    ) -> Result<Bytes, QueryError> {
        self.apply_commits();
        if consistency == ReadConsistency::Linearizable {
            if !self.node.is_leader() {
                return Err(QueryError::NotLeader {
                    leader: self.node.leader().cloned(),
                });
            }
            let commit_index = self.node.commit_index();
            let committed_in_term = matches!(self.node.term_at(commit_index), Ok(Some(term)) if term == self.node.term());
            if !committed_in_term || self.services.last_applied() < commit_index {
                return Err(QueryError::NotReady);
            }
        }
        Ok(self.services.query(session, operation, operand)?)
    }

    // ------- Applying --------

    /// Applies every entry the node has committed so far, in order.
    pub fn apply_commits(&mut self) {
        while let Some(event) = self.commits.try_next() {
            match event {
                CommitEvent::Entry(committed) => self.apply_entry(committed.index, committed.entry),
                CommitEvent::Restore { index } => self.restore(index),
            }
        }
    }

    fn apply_entry(&mut self, index: Index, entry: LogEntry) {
        let result = match self.services.apply(index, &entry) {
            Err(OperationError::OutOfOrder { .. }) => {
                slog::debug!(self.logger, "Skipping {:?}, already applied", index);
                return;
            }
            result => result,
        };

        if let Some(pending) = self.pending.remove(&index) {
            let result = if pending.term == entry.term {
                result.map_err(CommandError::from)
            } else {
                Err(CommandError::Superseded)
            };
            let _ = pending.responder.send(result);
        }
        self.publish_events();

        self.applied_since_snapshot += 1;
        let threshold_reached = self
            .snapshot_threshold
            .map(|threshold| self.applied_since_snapshot >= threshold)
            .unwrap_or(false);
        if threshold_reached {
            if let Err(e) = self.snapshot_applied() {
                slog::warn!(self.logger, "Failed to take snapshot at {:?}: {}", index, e);
            }
        }
    }

    /// The node installed a leader's snapshot that replaced everything up to `index`.
    fn restore(&mut self, index: Index) {
        let snapshot = match self.read_snapshot(index) {
            Ok(snapshot) => snapshot,
            Err(e) => self.halt("Failed to load installed snapshot", e),
        };
        if let Err(e) = self.services.restore(&snapshot) {
            self.halt("Failed to restore installed snapshot", e);
        }

        // Their entries are now behind the snapshot; whether they made it in is unknown.
        let remaining = self.pending.split_off(&index.plus(1));
        for (_, pending) in std::mem::replace(&mut self.pending, remaining) {
            let _ = pending.responder.send(Err(CommandError::Superseded));
        }
        self.applied_since_snapshot = 0;
        slog::info!(self.logger, "Services restored from snapshot at {:?}", index);
    }

    fn read_snapshot(&self, index: Index) -> Result<PartitionSnapshot, PartitionError> {
        let metadata = match self.snapshots.latest(&self.snapshot_name)? {
            Some(metadata) if metadata.position == index => metadata,
            _ => return Err(SnapshotError::Validation(format!("no snapshot at {:?}", index)).into()),
        };
        Ok(PartitionSnapshot::decode(&self.snapshots.read(&metadata)?)?)
    }

    fn publish_events(&mut self) {
        for event in self.services.take_events() {
            // Nobody listening is fine.
            let _ = self.events.send(event);
        }
    }

    // ------- Snapshots --------

    /// Snapshots the services at the last applied index and compacts the log up to it. Returns
    /// `None` if nothing was applied since the log's base.
    pub fn take_snapshot(&mut self) -> Result<Option<SnapshotMetadata>, PartitionError> {
        self.apply_commits();
        self.snapshot_applied()
    }

    fn snapshot_applied(&mut self) -> Result<Option<SnapshotMetadata>, PartitionError> {
        let index = self.services.last_applied();
        if index < self.node.first_log_index() {
            return Ok(None);
        }

        let term = self.node.term_at(index)?.ok_or(PartitionError::UnknownTerm(index))?;
        let configuration: Configuration = self
            .node
            .configuration_at(index)
            .cloned()
            .ok_or(PartitionError::UnknownConfiguration(index))?;
        let data = self.services.snapshot(term, configuration)?.encode()?;

        let metadata = self
            .snapshots
            .write(&self.snapshot_name, index, self.node.commit_index(), &data)?;
        self.node.compact(index)?;
        self.applied_since_snapshot = 0;

        slog::info!(
            self.logger,
            "Took snapshot at {:?} ({} bytes, checksum {})",
            index,
            data.len(),
            metadata.checksum
        );
        Ok(Some(metadata))
    }

    fn halt<E: Debug>(&self, context: &str, error: E) -> ! {
        slog::crit!(self.logger, "{}: {:?}. Halting.", context, error);
        panic!("{}: {:?}", context, error);
    }
}
