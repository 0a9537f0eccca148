use crate::commitlog::Index;
use crate::raft::{Configuration, EntryKind, LogEntry, Term};
use crate::service::{
    OperationError, OperationId, PrimitiveService, ServiceError, ServiceExecutor, ServiceHost, ServiceRequest,
    SessionEvent, SessionId, WallClockMillis,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

type ServiceFactory = Box<dyn Fn(&slog::Logger, &str) -> Box<dyn ServiceHost> + Send + Sync>;

/// ServiceTypeRegistry knows how to create a service instance for each service type name.
pub struct ServiceTypeRegistry {
    factories: HashMap<String, ServiceFactory>,
}

impl ServiceTypeRegistry {
    pub fn new() -> Self {
        ServiceTypeRegistry {
            factories: HashMap::new(),
        }
    }

    pub fn register<S, F>(&mut self, service_type: &str, factory: F)
    where
        S: PrimitiveService,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let type_name = service_type.to_string();
        self.factories.insert(
            service_type.to_string(),
            Box::new(move |logger: &slog::Logger, name: &str| -> Box<dyn ServiceHost> {
                Box::new(ServiceExecutor::new(logger.clone(), name, &type_name, factory()))
            }),
        );
    }

    pub fn contains(&self, service_type: &str) -> bool {
        self.factories.contains_key(service_type)
    }

    fn create(&self, logger: &slog::Logger, service_type: &str, name: &str) -> Option<Box<dyn ServiceHost>> {
        self.factories.get(service_type).map(|factory| factory(logger, name))
    }
}

impl Default for ServiceTypeRegistry {
    fn default() -> Self {
        ServiceTypeRegistry::new()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub name: String,
    pub service_type: String,
    pub data: Vec<u8>,
}

/// PartitionSnapshot is the whole service layer as of `index`, plus what the log needs to resume
/// after it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartitionSnapshot {
    pub index: Index,
    pub term: Term,
    pub timestamp: WallClockMillis,
    pub configuration: Configuration,
    pub services: Vec<ServiceSnapshot>,
}

impl PartitionSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>, ServiceError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ServiceError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// ServiceManager applies committed entries to the services of one partition.
///
/// Every entry reaches every service, so the clocks of all services advance together: the entry's
/// own service gets the request, the others a tick.
pub struct ServiceManager {
    logger: slog::Logger,
    types: ServiceTypeRegistry,
    services: BTreeMap<String, Box<dyn ServiceHost>>,
    session_services: BTreeMap<SessionId, String>,
    last_applied: Index,
    wall_clock: WallClockMillis,
}

impl ServiceManager {
    pub fn new(logger: slog::Logger, types: ServiceTypeRegistry) -> Self {
        ServiceManager {
            logger,
            types,
            services: BTreeMap::new(),
            session_services: BTreeMap::new(),
            last_applied: Index::ZERO,
            wall_clock: 0,
        }
    }

    pub fn last_applied(&self) -> Index {
        self.last_applied
    }

    pub fn wall_clock(&self) -> WallClockMillis {
        self.wall_clock
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn has_session(&self, session: SessionId) -> bool {
        self.session_services.contains_key(&session)
    }

    /// Applies the committed entry at `index`. The error is the operation's outcome: the entry is
    /// applied either way, unless it was out of order.
    pub fn apply(&mut self, index: Index, entry: &LogEntry) -> Result<Bytes, OperationError> {
        if index <= self.last_applied {
            return Err(OperationError::OutOfOrder {
                index,
                last_applied: self.last_applied,
            });
        }
        self.last_applied = index;
        self.wall_clock = self.wall_clock.max(entry.timestamp);

        let result = match &entry.kind {
            EntryKind::Initialize | EntryKind::Configuration { .. } => {
                self.tick_all(index, entry.timestamp);
                Ok(Bytes::new())
            }
            EntryKind::OpenSession {
                client,
                service_name,
                service_type,
                timeout_millis,
            } => self.open_session(index, entry.timestamp, client, service_name, service_type, *timeout_millis),
            EntryKind::KeepAlive { session_ids } => {
                self.keep_alive(index, entry.timestamp, session_ids);
                Ok(Bytes::new())
            }
            EntryKind::CloseSession { session_id } => self.route(
                index,
                entry.timestamp,
                *session_id,
                ServiceRequest::CloseSession { session: *session_id },
            ),
            EntryKind::Command {
                session_id,
                operation,
                operand,
            } => self.route(
                index,
                entry.timestamp,
                *session_id,
                ServiceRequest::Command {
                    session: *session_id,
                    operation: operation.clone(),
                    operand: operand.clone(),
                },
            ),
        };

        self.forget_terminated_sessions();
        result
    }

    /// Reads from the current state. Never advances the clocks.
    pub fn query(&mut self, session: SessionId, operation: OperationId, operand: Bytes) -> Result<Bytes, OperationError> {
        let name = self
            .session_services
            .get(&session)
            .ok_or(OperationError::UnknownSession(session))?;
        let service = self
            .services
            .get_mut(name)
            .ok_or_else(|| OperationError::UnknownService(name.clone()))?;
        service.query(session, operation, operand)
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        self.services
            .values_mut()
            .flat_map(|service| service.take_events())
            .collect()
    }

    pub fn snapshot(&self, term: Term, configuration: Configuration) -> Result<PartitionSnapshot, ServiceError> {
        let mut services = Vec::with_capacity(self.services.len());
        for (name, service) in self.services.iter() {
            services.push(ServiceSnapshot {
                name: name.clone(),
                service_type: service.service_type().to_string(),
                data: service.backup()?,
            });
        }

        Ok(PartitionSnapshot {
            index: self.last_applied,
            term,
            timestamp: self.wall_clock,
            configuration,
            services,
        })
    }

    /// Replaces every service with the snapshot's.
    pub fn restore(&mut self, snapshot: &PartitionSnapshot) -> Result<(), OperationError> {
        let mut services = BTreeMap::new();
        for service_snapshot in snapshot.services.iter() {
            let mut service = self
                .types
                .create(&self.logger, &service_snapshot.service_type, &service_snapshot.name)
                .ok_or_else(|| OperationError::UnknownServiceType(service_snapshot.service_type.clone()))?;
            service.restore(snapshot.index, snapshot.timestamp, &service_snapshot.data)?;
            services.insert(service_snapshot.name.clone(), service);
        }

        self.services = services;
        self.session_services = self
            .services
            .iter()
            .flat_map(|(name, service)| {
                service
                    .sessions()
                    .into_iter()
                    .map(move |session| (session.id, name.clone()))
            })
            .collect();
        self.last_applied = snapshot.index;
        self.wall_clock = snapshot.timestamp;

        slog::info!(
            self.logger,
            "Restored {} services and {} sessions at {:?}",
            self.services.len(),
            self.session_services.len(),
            snapshot.index
        );
        Ok(())
    }

    fn open_session(
        &mut self,
        index: Index,
        timestamp: WallClockMillis,
        client: &str,
        service_name: &str,
        service_type: &str,
        timeout_millis: u64,
    ) -> Result<Bytes, OperationError> {
        let existing_type = self
            .services
            .get(service_name)
            .map(|service| service.service_type().to_string());
        match existing_type {
            Some(actual) if actual != service_type => {
                self.tick_all(index, timestamp);
                return Err(OperationError::ServiceTypeMismatch {
                    service: service_name.to_string(),
                    requested: service_type.to_string(),
                    actual,
                });
            }
            Some(_) => {}
            None => match self.types.create(&self.logger, service_type, service_name) {
                Some(service) => {
                    slog::info!(self.logger, "Created service {:?} of type {:?}", service_name, service_type);
                    self.services.insert(service_name.to_string(), service);
                }
                None => {
                    self.tick_all(index, timestamp);
                    return Err(OperationError::UnknownServiceType(service_type.to_string()));
                }
            },
        }

        let request = ServiceRequest::OpenSession {
            client: client.to_string(),
            timeout_millis,
        };
        let result = self.dispatch(index, timestamp, service_name, request);
        self.session_services
            .insert(SessionId::from(index), service_name.to_string());
        result
    }

    fn keep_alive(&mut self, index: Index, timestamp: WallClockMillis, session_ids: &[SessionId]) {
        let mut by_service: BTreeMap<&str, Vec<SessionId>> = BTreeMap::new();
        for session in session_ids {
            match self.session_services.get(session) {
                Some(name) => by_service.entry(name.as_str()).or_default().push(*session),
                None => slog::debug!(self.logger, "Keep-alive for unknown {}", session),
            }
        }

        for (name, service) in self.services.iter_mut() {
            let request = match by_service.remove(name.as_str()) {
                Some(sessions) => ServiceRequest::KeepAlive { sessions },
                None => ServiceRequest::Tick,
            };
            if let Err(e) = service.apply(index, timestamp, request) {
                slog::warn!(self.logger, "Service {:?} failed to apply keep-alive: {}", name, e);
            }
        }
    }

    fn route(
        &mut self,
        index: Index,
        timestamp: WallClockMillis,
        session: SessionId,
        request: ServiceRequest,
    ) -> Result<Bytes, OperationError> {
        match self.session_services.get(&session).cloned() {
            Some(name) => self.dispatch(index, timestamp, &name, request),
            None => {
                self.tick_all(index, timestamp);
                Err(OperationError::UnknownSession(session))
            }
        }
    }

    fn tick_all(&mut self, index: Index, timestamp: WallClockMillis) {
        for (name, service) in self.services.iter_mut() {
            if let Err(e) = service.apply(index, timestamp, ServiceRequest::Tick) {
                slog::warn!(self.logger, "Service {:?} failed to tick: {}", name, e);
            }
        }
    }

    /// Sends `request` to the `target` service and a tick to every other one.
    fn dispatch(
        &mut self,
        index: Index,
        timestamp: WallClockMillis,
        target: &str,
        request: ServiceRequest,
    ) -> Result<Bytes, OperationError> {
        let mut request = Some(request);
        let mut result = Err(OperationError::UnknownService(target.to_string()));
        for (name, service) in self.services.iter_mut() {
            if name == target {
                if let Some(request) = request.take() {
                    result = service.apply(index, timestamp, request);
                }
                continue;
            }
            if let Err(e) = service.apply(index, timestamp, ServiceRequest::Tick) {
                slog::warn!(self.logger, "Service {:?} failed to tick: {}", name, e);
            }
        }
        result
    }

    fn forget_terminated_sessions(&mut self) {
        let services = &self.services;
        self.session_services.retain(|session, name| {
            services
                .get(name)
                .map(|service| service.has_session(*session))
                .unwrap_or(false)
        });
    }
}
