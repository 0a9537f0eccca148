use crate::commitlog::Index;
use crate::service::primitive::Handler;
use crate::service::scheduler::Scheduler;
use crate::service::{
    Commit, OperationError, OperationId, OperationRegistry, OperationType, PrimitiveService, ServiceContext,
    ServiceError, Session, SessionEvent, SessionId, SessionRegistry, SessionState, WallClockMillis,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// What a committed entry asks of one service.
#[derive(Clone, Debug, PartialEq)]
pub enum ServiceRequest {
    /// Only advance the clocks.
    Tick,
    OpenSession {
        client: String,
        timeout_millis: u64,
    },
    KeepAlive {
        sessions: Vec<SessionId>,
    },
    CloseSession {
        session: SessionId,
    },
    Command {
        session: SessionId,
        operation: OperationId,
        operand: Bytes,
    },
}

/// ServiceHost is a type-erased `ServiceExecutor`, so a partition can hold services of different
/// types.
pub trait ServiceHost: Send {
    fn name(&self) -> &str;

    fn service_type(&self) -> &str;

    fn last_applied(&self) -> Index;

    fn wall_clock(&self) -> WallClockMillis;

    /// Applies the entry at `index`. Indexes must strictly increase.
    ///
    /// For `OpenSession` the new session's id is `index`.
    fn apply(&mut self, index: Index, timestamp: WallClockMillis, request: ServiceRequest) -> Result<Bytes, OperationError>;

    /// Runs a query against the current state without advancing anything.
    fn query(&mut self, session: SessionId, operation: OperationId, operand: Bytes) -> Result<Bytes, OperationError>;

    fn has_session(&self, session: SessionId) -> bool;

    fn sessions(&self) -> Vec<Session>;

    fn take_events(&mut self) -> Vec<SessionEvent>;

    fn backup(&self) -> Result<Vec<u8>, ServiceError>;

    /// Replaces sessions and state with a backup taken at `index`.
    fn restore(&mut self, index: Index, timestamp: WallClockMillis, data: &[u8]) -> Result<(), ServiceError>;
}

#[derive(Serialize, Deserialize)]
struct ExecutorBackup {
    sessions: Vec<Session>,
    service: Vec<u8>,
}

/// ServiceExecutor applies commits to one primitive service instance, single threaded and in
/// strictly increasing index order.
///
/// Its logical clock is the index of the entry being applied. Its wall clock is the leader's
/// timestamp on that entry, but never moves backwards.
pub struct ServiceExecutor<S: PrimitiveService> {
    logger: slog::Logger,
    name: String,
    service_type: String,
    service: S,
    operations: OperationRegistry<S>,
    scheduler: Scheduler<S>,
    sessions: SessionRegistry,
    index: Index,
    wall_clock: WallClockMillis,
}

impl<S: PrimitiveService> ServiceExecutor<S> {
    pub fn new(logger: slog::Logger, name: &str, service_type: &str, service: S) -> Self {
        let mut operations = OperationRegistry::new();
        S::operations(&mut operations);

        let mut executor = ServiceExecutor {
            logger: logger.new(slog::o!("service" => name.to_string())),
            name: name.to_string(),
            service_type: service_type.to_string(),
            service,
            operations,
            scheduler: Scheduler::new(),
            sessions: SessionRegistry::new(name),
            index: Index::ZERO,
            wall_clock: 0,
        };

        let mut ctx = ServiceContext::new(
            executor.index,
            executor.wall_clock,
            OperationType::Command,
            &mut executor.scheduler,
            &mut executor.sessions,
        );
        executor.service.init(&mut ctx);
        executor
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    fn advance_clocks(&mut self, index: Index, timestamp: WallClockMillis) -> Result<(), OperationError> {
        if index <= self.index {
            return Err(OperationError::OutOfOrder {
                index,
                last_applied: self.index,
            });
        }
        self.index = index;
        self.wall_clock = self.wall_clock.max(timestamp);
        Ok(())
    }

    fn run_scheduled_tasks(&mut self) {
        while let Some(task) = self.scheduler.pop_due(self.wall_clock) {
            let mut ctx = ServiceContext::new(
                self.index,
                self.wall_clock,
                OperationType::Command,
                &mut self.scheduler,
                &mut self.sessions,
            );
            task(&mut self.service, &mut ctx);
        }
    }

    fn expire_timed_out_sessions(&mut self) {
        for id in self.sessions.timed_out(self.wall_clock) {
            slog::info!(self.logger, "Expiring {} at wall clock {}", id, self.wall_clock);
            self.terminate_session(id, SessionState::Expired);
        }
    }

    /// Runs the service's hook exactly once, then forgets the session.
    fn terminate_session(&mut self, id: SessionId, state: SessionState) -> bool {
        if self.sessions.terminate(id, state).is_none() {
            return false;
        }

        let mut ctx = ServiceContext::new(
            self.index,
            self.wall_clock,
            OperationType::Command,
            &mut self.scheduler,
            &mut self.sessions,
        );
        match state {
            SessionState::Expired => self.service.expire(id, &mut ctx),
            _ => self.service.close(id, &mut ctx),
        }
        self.sessions.remove(id);
        true
    }

    fn open_session(&mut self, client: String, timeout_millis: u64) -> Result<Bytes, OperationError> {
        let session = Session::new(SessionId::from(self.index), client, timeout_millis, self.wall_clock);

        let mut ctx = ServiceContext::new(
            self.index,
            self.wall_clock,
            OperationType::Command,
            &mut self.scheduler,
            &mut self.sessions,
        );
        self.service.register(&session, &mut ctx);
        slog::debug!(self.logger, "Opened {} for {}", session.id, session.client);
        self.sessions.insert(session);

        Ok(Bytes::new())
    }

    fn execute(&mut self, session: SessionId, operation: OperationId, operand: Bytes) -> Result<Bytes, OperationError> {
        if !self.sessions.touch(session, self.wall_clock) {
            return Err(OperationError::UnknownSession(session));
        }

        let commit = Commit {
            index: self.index,
            session,
            wall_clock: self.wall_clock,
            operation,
            operand,
        };
        let handler = match self.operations.get(&commit.operation) {
            Some(Handler::Command(handler)) => handler,
            Some(Handler::Query(_)) => return Err(OperationError::NotACommand(commit.operation)),
            None => return Err(OperationError::UnknownOperation(commit.operation)),
        };

        let mut ctx = ServiceContext::new(
            self.index,
            self.wall_clock,
            OperationType::Command,
            &mut self.scheduler,
            &mut self.sessions,
        );
        handler(&mut self.service, &commit, &mut ctx).map_err(OperationError::from)
    }
}

impl<S: PrimitiveService> ServiceHost for ServiceExecutor<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn service_type(&self) -> &str {
        &self.service_type
    }

    fn last_applied(&self) -> Index {
        self.index
    }

    fn wall_clock(&self) -> WallClockMillis {
        self.wall_clock
    }

    fn apply(&mut self, index: Index, timestamp: WallClockMillis, request: ServiceRequest) -> Result<Bytes, OperationError> {
        self.advance_clocks(index, timestamp)?;

        self.run_scheduled_tasks();
        self.service.tick(self.wall_clock);
        self.expire_timed_out_sessions();

        match request {
            ServiceRequest::Tick => Ok(Bytes::new()),
            ServiceRequest::OpenSession { client, timeout_millis } => self.open_session(client, timeout_millis),
            ServiceRequest::KeepAlive { sessions } => {
                for session in sessions {
                    if !self.sessions.touch(session, self.wall_clock) {
                        slog::debug!(self.logger, "Keep-alive for unknown {}", session);
                    }
                }
                Ok(Bytes::new())
            }
            ServiceRequest::CloseSession { session } => {
                if !self.terminate_session(session, SessionState::Closed) {
                    slog::debug!(self.logger, "Close of unknown {}", session);
                }
                Ok(Bytes::new())
            }
            ServiceRequest::Command {
                session,
                operation,
                operand,
            } => self.execute(session, operation, operand),
        }
    }

    fn query(&mut self, session: SessionId, operation: OperationId, operand: Bytes) -> Result<Bytes, OperationError> {
        if !self.sessions.is_open(session) {
            return Err(OperationError::UnknownSession(session));
        }

        let commit = Commit {
            index: self.index,
            session,
            wall_clock: self.wall_clock,
            operation,
            operand,
        };
        let handler = match self.operations.get(&commit.operation) {
            Some(Handler::Query(handler)) => handler,
            Some(Handler::Command(_)) => return Err(OperationError::NotAQuery(commit.operation)),
            None => return Err(OperationError::UnknownOperation(commit.operation)),
        };

        let mut ctx = ServiceContext::new(
            self.index,
            self.wall_clock,
            OperationType::Query,
            &mut self.scheduler,
            &mut self.sessions,
        );
        handler(&self.service, &commit, &mut ctx).map_err(OperationError::from)
    }

    fn has_session(&self, session: SessionId) -> bool {
        self.sessions.is_open(session)
    }

    fn sessions(&self) -> Vec<Session> {
        self.sessions.records()
    }

    fn take_events(&mut self) -> Vec<SessionEvent> {
        self.sessions.take_events()
    }

    fn backup(&self) -> Result<Vec<u8>, ServiceError> {
        let backup = ExecutorBackup {
            sessions: self.sessions.records(),
            service: self.service.backup()?,
        };
        Ok(bincode::serialize(&backup)?)
    }

    fn restore(&mut self, index: Index, timestamp: WallClockMillis, data: &[u8]) -> Result<(), ServiceError> {
        let backup: ExecutorBackup = bincode::deserialize(data)?;

        self.index = index;
        self.wall_clock = timestamp;
        self.scheduler.clear();
        self.sessions.restore(backup.sessions);

        let mut ctx = ServiceContext::new(
            self.index,
            self.wall_clock,
            OperationType::Command,
            &mut self.scheduler,
            &mut self.sessions,
        );
        self.service.restore(&backup.service, &mut ctx)?;
        slog::info!(
            self.logger,
            "Restored at {:?} with {} sessions",
            index,
            self.sessions.len()
        );
        Ok(())
    }
}
