use crate::actor::{ActorClient, PartitionStatus};
use crate::commitlog::Index;
use crate::partition::{CommandError, PartitionError, QueryError, ReadConsistency};
use crate::raft::{EntryKind, MemberId, MembershipError, RoleChangeListener};
use crate::server::RpcServerShutdownHandle;
use crate::service::{OperationError, OperationId, SessionEvent, SessionId};
use crate::snapshot::SnapshotMetadata;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("partition actor has exited")]
    ActorExited,
    #[error("not leader (leader: {leader:?})")]
    NotLeader { leader: Option<MemberId> },
    // Can be retried; the entry may or may not have been applied.
    #[error("the request was superseded by a leader change")]
    Superseded,
    #[error("the leader hasn't caught up with its own term yet")]
    NotReady,
    #[error("operation failed: {0}")]
    Operation(#[from] OperationError),
    #[error("membership change refused: {0}")]
    Membership(#[from] MembershipError),
    #[error("snapshot failed")]
    Snapshot(#[from] PartitionError),
}

impl From<CommandError> for ClientError {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::NotLeader { leader } => ClientError::NotLeader { leader },
            CommandError::Superseded => ClientError::Superseded,
            CommandError::Operation(e) => ClientError::Operation(e),
        }
    }
}

impl From<QueryError> for ClientError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::NotLeader { leader } => ClientError::NotLeader { leader },
            QueryError::NotReady => ClientError::NotReady,
            QueryError::Operation(e) => ClientError::Operation(e),
        }
    }
}

/// PartitionClient is the application's handle to the local member of a partition.
///
/// Commands and session changes must be sent to the leader; `NotLeader` carries a hint.
#[derive(Clone)]
pub struct PartitionClient {
    logger: slog::Logger,
    actor: ActorClient,
    server: Arc<Mutex<Option<RpcServerShutdownHandle>>>,
}

impl PartitionClient {
    pub(crate) fn new(logger: slog::Logger, actor: ActorClient, server: Option<RpcServerShutdownHandle>) -> Self {
        PartitionClient {
            logger,
            actor,
            server: Arc::new(Mutex::new(server)),
        }
    }

    /// Opens a session with the service `service_name`, creating it as a `service_type` if it
    /// doesn't exist yet.
    pub async fn open_session(
        &self,
        client: &str,
        service_name: &str,
        service_type: &str,
        timeout: Duration,
    ) -> Result<SessionId, ClientError> {
        let (index, _) = self
            .actor
            .submit(EntryKind::OpenSession {
                client: client.to_string(),
                service_name: service_name.to_string(),
                service_type: service_type.to_string(),
                timeout_millis: timeout.as_millis() as u64,
            })
            .await?;

        let session = SessionId::from(index);
        slog::debug!(self.logger, "Opened {} with {:?}", session, service_name);
        Ok(session)
    }

    /// Runs a command and returns its output once the command is applied.
    pub async fn execute(&self, session: SessionId, operation: &str, operand: Bytes) -> Result<Bytes, ClientError> {
        let (_, output) = self
            .actor
            .submit(EntryKind::Command {
                session_id: session,
                operation: OperationId::from(operation),
                operand,
            })
            .await?;
        Ok(output)
    }

    pub async fn query(
        &self,
        session: SessionId,
        operation: &str,
        operand: Bytes,
        consistency: ReadConsistency,
    ) -> Result<Bytes, ClientError> {
        self.actor
            .query(session, OperationId::from(operation), operand, consistency)
            .await
    }

    pub async fn keep_alive(&self, sessions: Vec<SessionId>) -> Result<Index, ClientError> {
        let (index, _) = self
            .actor
            .submit(EntryKind::KeepAlive { session_ids: sessions })
            .await?;
        Ok(index)
    }

    pub async fn close_session(&self, session: SessionId) -> Result<(), ClientError> {
        self.actor
            .submit(EntryKind::CloseSession { session_id: session })
            .await?;
        Ok(())
    }

    pub async fn take_snapshot(&self) -> Result<Option<SnapshotMetadata>, ClientError> {
        self.actor.take_snapshot().await
    }

    pub async fn leave(&self) -> Result<(), ClientError> {
        self.actor.leave().await
    }

    pub async fn status(&self) -> Result<PartitionStatus, ClientError> {
        self.actor.status().await
    }

    pub async fn role_listener(&self) -> Result<RoleChangeListener, ClientError> {
        self.actor.subscribe_roles().await
    }

    /// Events the services publish to `session` on this member, in order. The stream ends when
    /// the partition stops.
    pub async fn session_events(&self, session: SessionId) -> Result<mpsc::UnboundedReceiver<SessionEvent>, ClientError> {
        let mut events = self.actor.subscribe_events().await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let logger = self.logger.clone();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.session == session => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        slog::warn!(logger, "{} missed {} session events", session, missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }

    /// Stops the partition and its server.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        let server = match self.server.lock() {
            Ok(mut server) => server.take(),
            Err(_) => None,
        };
        if let Some(server) = server {
            server.trigger();
        }
        self.actor.shutdown().await
    }
}
