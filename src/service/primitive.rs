use crate::commitlog::Index;
use crate::service::scheduler::Scheduler;
use crate::service::{
    OperationId, OperationType, ScheduledTaskId, ServiceError, Session, SessionId, SessionRegistry, WallClockMillis,
};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// PrimitiveService is a deterministic state machine replicated through the log.
///
/// Every replica feeds it the same commits in the same order with the same clocks, so handlers
/// must only depend on their inputs and the context: no system time, randomness or I/O.
pub trait PrimitiveService: Send + Sized + 'static {
    /// Declares the operations of this service. Called once, when the service is created.
    fn operations(registry: &mut OperationRegistry<Self>);

    fn init(&mut self, _ctx: &mut ServiceContext<'_, Self>) {}

    /// Called for every applied entry, before it is dispatched.
    fn tick(&mut self, _wall_clock: WallClockMillis) {}

    /// Called before the session becomes visible as open. Events published to it are dropped.
    fn register(&mut self, _session: &Session, _ctx: &mut ServiceContext<'_, Self>) {}

    fn expire(&mut self, _session: SessionId, _ctx: &mut ServiceContext<'_, Self>) {}

    fn close(&mut self, _session: SessionId, _ctx: &mut ServiceContext<'_, Self>) {}

    fn backup(&self) -> Result<Vec<u8>, ServiceError>;

    /// Replaces the whole state. Scheduled callbacks are not part of a backup, so a service with
    /// deadlines reschedules them here.
    fn restore(&mut self, data: &[u8], ctx: &mut ServiceContext<'_, Self>) -> Result<(), ServiceError>;
}

/// Commit is one operation being applied, either from a committed `Command` entry or from a query.
#[derive(Clone, Debug, PartialEq)]
pub struct Commit {
    pub index: Index,
    pub session: SessionId,
    pub wall_clock: WallClockMillis,
    pub operation: OperationId,
    pub operand: Bytes,
}

impl Commit {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ServiceError> {
        Ok(bincode::deserialize(&self.operand)?)
    }
}

/// Encodes a handler's output or an operand.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, ServiceError> {
    Ok(Bytes::from(bincode::serialize(value)?))
}

pub(crate) type CommandHandler<S> =
    Box<dyn Fn(&mut S, &Commit, &mut ServiceContext<'_, S>) -> Result<Bytes, ServiceError> + Send>;
pub(crate) type QueryHandler<S> =
    Box<dyn Fn(&S, &Commit, &mut ServiceContext<'_, S>) -> Result<Bytes, ServiceError> + Send>;

pub(crate) enum Handler<S> {
    Command(CommandHandler<S>),
    Query(QueryHandler<S>),
}

/// OperationRegistry maps operation ids to handlers.
pub struct OperationRegistry<S> {
    handlers: HashMap<OperationId, Handler<S>>,
}

impl<S> OperationRegistry<S> {
    pub(crate) fn new() -> Self {
        OperationRegistry {
            handlers: HashMap::new(),
        }
    }

    pub fn command<F>(&mut self, id: &str, handler: F)
    where
        F: Fn(&mut S, &Commit, &mut ServiceContext<'_, S>) -> Result<Bytes, ServiceError> + Send + 'static,
    {
        self.handlers
            .insert(OperationId::from(id), Handler::Command(Box::new(handler)));
    }

    pub fn query<F>(&mut self, id: &str, handler: F)
    where
        F: Fn(&S, &Commit, &mut ServiceContext<'_, S>) -> Result<Bytes, ServiceError> + Send + 'static,
    {
        self.handlers
            .insert(OperationId::from(id), Handler::Query(Box::new(handler)));
    }

    pub(crate) fn get(&self, id: &OperationId) -> Option<&Handler<S>> {
        self.handlers.get(id)
    }

    pub fn operation_type(&self, id: &OperationId) -> Option<OperationType> {
        self.handlers.get(id).map(|handler| match handler {
            Handler::Command(_) => OperationType::Command,
            Handler::Query(_) => OperationType::Query,
        })
    }
}

/// ServiceContext is what a service sees of the executor while it is handling something.
pub struct ServiceContext<'a, S> {
    index: Index,
    wall_clock: WallClockMillis,
    operation_type: OperationType,
    scheduler: &'a mut Scheduler<S>,
    sessions: &'a mut SessionRegistry,
}

impl<'a, S> ServiceContext<'a, S> {
    pub(crate) fn new(
        index: Index,
        wall_clock: WallClockMillis,
        operation_type: OperationType,
        scheduler: &'a mut Scheduler<S>,
        sessions: &'a mut SessionRegistry,
    ) -> Self {
        ServiceContext {
            index,
            wall_clock,
            operation_type,
            scheduler,
            sessions,
        }
    }

    /// Logical clock: the index of the entry being applied. For queries, the last applied index.
    pub fn index(&self) -> Index {
        self.index
    }

    /// Wall clock of the entry being applied, never moving backwards.
    pub fn wall_clock(&self) -> WallClockMillis {
        self.wall_clock
    }

    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    /// Runs `task` once an applied entry's wall clock reaches now + `delay`.
    pub fn schedule<F>(&mut self, delay: Duration, task: F) -> Result<ScheduledTaskId, ServiceError>
    where
        F: FnOnce(&mut S, &mut ServiceContext<'_, S>) + Send + 'static,
    {
        self.schedule_at(self.wall_clock.saturating_add(delay.as_millis() as i64), task)
    }

    pub fn schedule_at<F>(&mut self, due: WallClockMillis, task: F) -> Result<ScheduledTaskId, ServiceError>
    where
        F: FnOnce(&mut S, &mut ServiceContext<'_, S>) + Send + 'static,
    {
        if self.operation_type == OperationType::Query {
            return Err(ServiceError::IllegalScheduling);
        }
        Ok(self.scheduler.schedule(due, Box::new(task)))
    }

    pub fn cancel(&mut self, id: ScheduledTaskId) -> bool {
        self.scheduler.cancel(id)
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.open_sessions()
    }

    /// Queries can't publish: their events would only exist on one replica.
    pub fn publish(&mut self, session: SessionId, event_type: &str, payload: Bytes) {
        if self.operation_type == OperationType::Query {
            return;
        }
        self.sessions.publish(session, event_type, payload);
    }
}
