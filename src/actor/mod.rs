use crate::api::ClientError;
use crate::commitlog::{Index, Log};
use crate::metadata::MetadataStore;
use crate::partition::{CommandResult, Partition, ReadConsistency};
use crate::raft::{
    Configuration, EntryKind, LogEntry, MemberId, RaftRequest, RaftResponse, RoleChangeListener, RoleKind, Term,
    Transport,
};
use crate::service::{OperationId, SessionEvent, SessionId};
use crate::snapshot::SnapshotMetadata;
use bytes::Bytes;
use std::error::Error;
use std::fmt::Debug;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Creates the mailbox of a partition actor. The client half can be handed out (e.g. to the
/// transport) before the partition it will reach exists.
pub fn channel(buffer_size: usize) -> (ActorClient, ActorMailbox) {
    let (tx, rx) = mpsc::channel(buffer_size);

    (ActorClient { sender: tx }, ActorMailbox { receiver: rx })
}

pub struct ActorMailbox {
    receiver: mpsc::Receiver<Event>,
}

/// What the partition looks like right now, from this member.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionStatus {
    pub member_id: MemberId,
    pub role: RoleKind,
    pub term: Term,
    pub leader: Option<MemberId>,
    pub configuration: Option<Configuration>,
    pub commit_index: Index,
    pub last_applied: Index,
}

// Everything the partition does happens on the actor's task, one event at a time. Disk access is
// synchronous.
enum Event {
    // Inbound peer traffic: answered right away.
    Request(RaftRequest, oneshot::Sender<RaftResponse>),
    // What a peer answered to one of our requests.
    Response(MemberId, RaftResponse),

    Bootstrap(Vec<MemberId>, Callback<(), ClientError>),
    Join(Vec<MemberId>, Callback<(), ClientError>),
    Leave(Callback<(), ClientError>),

    // Leader: append and replicate; the inner receiver resolves once applied.
    // Others: redirect.
    Submit(EntryKind, Callback<(Index, oneshot::Receiver<CommandResult>), ClientError>),
    Query {
        session: SessionId,
        operation: OperationId,
        operand: Bytes,
        consistency: ReadConsistency,
        callback: Callback<Bytes, ClientError>,
    },
    TakeSnapshot(Callback<Option<SnapshotMetadata>, ClientError>),

    Status(oneshot::Sender<PartitionStatus>),
    SubscribeRoles(oneshot::Sender<RoleChangeListener>),
    SubscribeEvents(oneshot::Sender<broadcast::Receiver<SessionEvent>>),
    Shutdown(oneshot::Sender<()>),
}

struct Callback<O, E: Error>(oneshot::Sender<Result<O, E>>);

impl<O, E: Error> Callback<O, E> {
    fn send(self, message: Result<O, E>) {
        let _ = self.0.send(message);
    }
}

/// ActorClient is a cheap handle to a partition actor.
#[derive(Clone)]
pub struct ActorClient {
    sender: mpsc::Sender<Event>,
}

impl ActorClient {
    pub async fn handle_request(&self, request: RaftRequest) -> Result<RaftResponse, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Request(request, tx)).await?;

        rx.await.map_err(|_| ClientError::ActorExited)
    }

    /// Feeds a peer's response back into the partition.
    pub async fn deliver_response(&self, from: MemberId, response: RaftResponse) -> Result<(), ClientError> {
        self.send(Event::Response(from, response)).await
    }

    pub async fn bootstrap(&self, members: Vec<MemberId>) -> Result<(), ClientError> {
        self.call(|callback| Event::Bootstrap(members, callback)).await
    }

    pub async fn join(&self, contacts: Vec<MemberId>) -> Result<(), ClientError> {
        self.call(|callback| Event::Join(contacts, callback)).await
    }

    pub async fn leave(&self) -> Result<(), ClientError> {
        self.call(Event::Leave).await
    }

    /// Proposes `kind` and waits until it is applied. Returns the entry's index and output.
    pub async fn submit(&self, kind: EntryKind) -> Result<(Index, Bytes), ClientError> {
        let (index, applied) = self.call(|callback| Event::Submit(kind, callback)).await?;
        let output = applied.await.map_err(|_| ClientError::ActorExited)??;
        Ok((index, output))
    }

    pub async fn query(
        &self,
        session: SessionId,
        operation: OperationId,
        operand: Bytes,
        consistency: ReadConsistency,
    ) -> Result<Bytes, ClientError> {
        self.call(|callback| Event::Query {
            session,
            operation,
            operand,
            consistency,
            callback,
        })
        .await
    }

    pub async fn take_snapshot(&self) -> Result<Option<SnapshotMetadata>, ClientError> {
        self.call(Event::TakeSnapshot).await
    }

    pub async fn status(&self) -> Result<PartitionStatus, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Status(tx)).await?;

        rx.await.map_err(|_| ClientError::ActorExited)
    }

    pub async fn subscribe_roles(&self) -> Result<RoleChangeListener, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::SubscribeRoles(tx)).await?;

        rx.await.map_err(|_| ClientError::ActorExited)
    }

    pub async fn subscribe_events(&self) -> Result<broadcast::Receiver<SessionEvent>, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::SubscribeEvents(tx)).await?;

        rx.await.map_err(|_| ClientError::ActorExited)
    }

    /// Stops the node and the actor. Returns once the actor has stopped handling events.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Shutdown(tx)).await?;

        rx.await.map_err(|_| ClientError::ActorExited)
    }

    async fn call<O, F>(&self, event: F) -> Result<O, ClientError>
    where
        F: FnOnce(Callback<O, ClientError>) -> Event,
    {
        let (tx, rx) = oneshot::channel();
        self.send(event(Callback(tx))).await?;

        rx.await.map_err(|_| ClientError::ActorExited)?
    }

    async fn send(&self, event: Event) -> Result<(), ClientError> {
        self.sender.send(event).await.map_err(|_| ClientError::ActorExited)
    }
}

/// PartitionActor is a partition in actor model.
pub struct PartitionActor<L, M, T>
where
    L: Log<LogEntry>,
    M: MetadataStore,
    T: Transport,
{
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    partition: Partition<L, M, T>,
    tick_interval: Duration,
}

impl<L, M, T> PartitionActor<L, M, T>
where
    L: Log<LogEntry>,
    M: MetadataStore,
    T: Transport,
{
    pub fn new(
        logger: slog::Logger,
        mailbox: ActorMailbox,
        partition: Partition<L, M, T>,
        tick_interval: Duration,
    ) -> Self {
        PartitionActor {
            logger,
            receiver: mailbox.receiver,
            partition,
            tick_interval,
        }
    }

    pub async fn run_event_loop(mut self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                event = self.receiver.recv() => match event {
                    Some(Event::Shutdown(done)) => {
                        self.partition.shutdown();
                        let _ = done.send(());
                        break;
                    }
                    Some(event) => self.handle_event(event),
                    None => {
                        self.partition.shutdown();
                        break;
                    }
                },
                _ = ticker.tick() => self.partition.tick(),
            }
        }
        slog::info!(self.logger, "Partition actor has exited");
    }

    // This must NOT be async. Any long running work must be spawned on another task
    // and/or come back as an event to this actor.
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Request(request, reply) => {
                let response = self.partition.handle_request(request);
                let _ = reply.send(response);
            }
            Event::Response(from, response) => {
                self.partition.handle_response(&from, response);
            }
            Event::Bootstrap(members, callback) => {
                callback.send(self.partition.bootstrap(members).map_err(ClientError::from));
            }
            Event::Join(contacts, callback) => {
                callback.send(self.partition.join(contacts).map_err(ClientError::from));
            }
            Event::Leave(callback) => {
                callback.send(self.partition.leave().map_err(ClientError::from));
            }
            Event::Submit(kind, callback) => {
                callback.send(self.partition.submit(kind).map_err(ClientError::from));
            }
            Event::Query {
                session,
                operation,
                operand,
                consistency,
                callback,
            } => {
                let result = self.partition.query(session, operation, operand, consistency);
                callback.send(result.map_err(ClientError::from));
            }
            Event::TakeSnapshot(callback) => {
                callback.send(self.partition.take_snapshot().map_err(ClientError::from));
            }
            Event::Status(reply) => {
                let node = self.partition.node();
                let _ = reply.send(PartitionStatus {
                    member_id: node.member_id().clone(),
                    role: node.role(),
                    term: node.term(),
                    leader: node.leader().cloned(),
                    configuration: node.configuration().cloned(),
                    commit_index: node.commit_index(),
                    last_applied: self.partition.services().last_applied(),
                });
            }
            Event::SubscribeRoles(reply) => {
                let _ = reply.send(self.partition.subscribe_roles());
            }
            Event::SubscribeEvents(reply) => {
                let _ = reply.send(self.partition.subscribe_events());
            }
            Event::Shutdown(done) => {
                self.partition.shutdown();
                let _ = done.send(());
            }
        }
    }
}

impl Debug for ActorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorClient").finish()
    }
}
