use crate::commitlog::Index;
use crate::service::{
    encode, Commit, OperationRegistry, PrimitiveService, ScheduledTaskId, ServiceContext, ServiceError, SessionId,
    WallClockMillis,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

pub const TYPE: &str = "map";

pub const PUT: &str = "put";
pub const GET: &str = "get";
pub const REMOVE: &str = "remove";
pub const SIZE: &str = "size";
pub const LISTEN: &str = "listen";
pub const UNLISTEN: &str = "unlisten";

/// Event type of the change notifications sent to listeners.
pub const CHANGE_EVENT: &str = "change";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PutRequest {
    pub key: String,
    pub value: Vec<u8>,
    /// The entry is removed this long after the put, unless overwritten first.
    pub ttl_millis: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Versioned {
    pub value: Vec<u8>,
    /// Index of the put that wrote the value.
    pub version: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Removed,
    Expired,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub key: String,
    pub value: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct MapEntry {
    value: Vec<u8>,
    version: Index,
    expires_at: Option<WallClockMillis>,
}

#[derive(Serialize, Deserialize)]
struct MapBackup {
    entries: BTreeMap<String, MapEntry>,
    listeners: BTreeSet<SessionId>,
}

/// MapService is a replicated key-value map with optional per-key time to live.
#[derive(Default)]
pub struct MapService {
    entries: BTreeMap<String, MapEntry>,
    listeners: BTreeSet<SessionId>,
    timers: HashMap<String, ScheduledTaskId>,
}

impl MapService {
    pub fn new() -> Self {
        MapService::default()
    }

    fn put(&mut self, commit: &Commit, ctx: &mut ServiceContext<'_, Self>) -> Result<Bytes, ServiceError> {
        let request: PutRequest = commit.decode()?;
        let expires_at = request
            .ttl_millis
            .map(|ttl| ctx.wall_clock().saturating_add(ttl as i64));

        self.cancel_timer(&request.key, ctx);
        let previous = self.entries.insert(
            request.key.clone(),
            MapEntry {
                value: request.value.clone(),
                version: ctx.index(),
                expires_at,
            },
        );
        if let Some(due) = expires_at {
            self.schedule_expiry(&request.key, ctx.index(), due, ctx)?;
        }

        let kind = match previous {
            Some(_) => ChangeKind::Updated,
            None => ChangeKind::Inserted,
        };
        self.notify(kind, &request.key, Some(request.value), ctx)?;
        encode(&previous.map(|entry| versioned(&entry)))
    }

    fn get(&self, commit: &Commit, _ctx: &mut ServiceContext<'_, Self>) -> Result<Bytes, ServiceError> {
        let key: String = commit.decode()?;
        encode(&self.entries.get(&key).map(versioned))
    }

    fn remove(&mut self, commit: &Commit, ctx: &mut ServiceContext<'_, Self>) -> Result<Bytes, ServiceError> {
        let key: String = commit.decode()?;
        self.cancel_timer(&key, ctx);

        let removed = self.entries.remove(&key);
        if removed.is_some() {
            self.notify(ChangeKind::Removed, &key, None, ctx)?;
        }
        encode(&removed.map(|entry| versioned(&entry)))
    }

    fn size(&self, _commit: &Commit, _ctx: &mut ServiceContext<'_, Self>) -> Result<Bytes, ServiceError> {
        encode(&(self.entries.len() as u64))
    }

    fn listen(&mut self, commit: &Commit, _ctx: &mut ServiceContext<'_, Self>) -> Result<Bytes, ServiceError> {
        self.listeners.insert(commit.session);
        Ok(Bytes::new())
    }

    fn unlisten(&mut self, commit: &Commit, _ctx: &mut ServiceContext<'_, Self>) -> Result<Bytes, ServiceError> {
        self.listeners.remove(&commit.session);
        Ok(Bytes::new())
    }

    fn cancel_timer(&mut self, key: &str, ctx: &mut ServiceContext<'_, Self>) {
        if let Some(timer) = self.timers.remove(key) {
            ctx.cancel(timer);
        }
    }

    fn schedule_expiry(
        &mut self,
        key: &str,
        version: Index,
        due: WallClockMillis,
        ctx: &mut ServiceContext<'_, Self>,
    ) -> Result<(), ServiceError> {
        let expiring = key.to_string();
        let timer = ctx.schedule_at(due, move |map: &mut MapService, ctx: &mut ServiceContext<'_, MapService>| {
            map.expire_key(&expiring, version, ctx);
        })?;
        self.timers.insert(key.to_string(), timer);
        Ok(())
    }

    /// Only removes the value written by the put that scheduled the expiry.
    fn expire_key(&mut self, key: &str, version: Index, ctx: &mut ServiceContext<'_, Self>) {
        let current = self.entries.get(key).map(|entry| entry.version);
        if current != Some(version) {
            return;
        }
        self.timers.remove(key);
        self.entries.remove(key);
        // Change events are best effort: a listener can't be told about a failed encoding.
        let _ = self.notify(ChangeKind::Expired, key, None, ctx);
    }

    fn notify(
        &self,
        kind: ChangeKind,
        key: &str,
        value: Option<Vec<u8>>,
        ctx: &mut ServiceContext<'_, Self>,
    ) -> Result<(), ServiceError> {
        if self.listeners.is_empty() {
            return Ok(());
        }
        let payload = encode(&ChangeEvent {
            kind,
            key: key.to_string(),
            value,
        })?;
        for listener in self.listeners.iter() {
            ctx.publish(*listener, CHANGE_EVENT, payload.clone());
        }
        Ok(())
    }
}

fn versioned(entry: &MapEntry) -> Versioned {
    Versioned {
        value: entry.value.clone(),
        version: entry.version.as_u64(),
    }
}

impl PrimitiveService for MapService {
    fn operations(registry: &mut OperationRegistry<Self>) {
        registry.command(PUT, MapService::put);
        registry.query(GET, MapService::get);
        registry.command(REMOVE, MapService::remove);
        registry.query(SIZE, MapService::size);
        registry.command(LISTEN, MapService::listen);
        registry.command(UNLISTEN, MapService::unlisten);
    }

    fn expire(&mut self, session: SessionId, _ctx: &mut ServiceContext<'_, Self>) {
        self.listeners.remove(&session);
    }

    fn close(&mut self, session: SessionId, _ctx: &mut ServiceContext<'_, Self>) {
        self.listeners.remove(&session);
    }

    fn backup(&self) -> Result<Vec<u8>, ServiceError> {
        let backup = MapBackup {
            entries: self.entries.clone(),
            listeners: self.listeners.clone(),
        };
        Ok(bincode::serialize(&backup)?)
    }

    fn restore(&mut self, data: &[u8], ctx: &mut ServiceContext<'_, Self>) -> Result<(), ServiceError> {
        let backup: MapBackup = bincode::deserialize(data)?;
        self.entries = backup.entries;
        self.listeners = backup.listeners;
        self.timers.clear();

        let deadlines: Vec<(String, Index, WallClockMillis)> = self
            .entries
            .iter()
            .filter_map(|(key, entry)| entry.expires_at.map(|due| (key.clone(), entry.version, due)))
            .collect();
        for (key, version, due) in deadlines {
            self.schedule_expiry(&key, version, due, ctx)?;
        }
        Ok(())
    }
}

/// Convenience for building a `put` operand.
pub fn put_operand(key: &str, value: &[u8], ttl: Option<Duration>) -> Result<Bytes, ServiceError> {
    encode(&PutRequest {
        key: key.to_string(),
        value: value.to_vec(),
        ttl_millis: ttl.map(|ttl| ttl.as_millis() as u64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{OperationId, ServiceExecutor, ServiceHost, ServiceRequest};

    fn executor() -> ServiceExecutor<MapService> {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let mut executor = ServiceExecutor::new(logger, "map-1", TYPE, MapService::new());
        for index in 1..=2 {
            executor
                .apply(
                    Index::new(index),
                    0,
                    ServiceRequest::OpenSession {
                        client: "client".to_string(),
                        timeout_millis: 60_000,
                    },
                )
                .unwrap();
        }
        executor
    }

    fn command(operation: &str, operand: Bytes) -> ServiceRequest {
        ServiceRequest::Command {
            session: SessionId::new(1),
            operation: OperationId::from(operation),
            operand,
        }
    }

    fn get(executor: &mut ServiceExecutor<MapService>, key: &str) -> Option<Versioned> {
        let bytes = executor
            .query(SessionId::new(1), OperationId::from(GET), encode(&key.to_string()).unwrap())
            .unwrap();
        bincode::deserialize(&bytes).unwrap()
    }

    #[test]
    fn put_get_remove() {
        let mut executor = executor();
        let previous = executor
            .apply(Index::new(3), 10, command(PUT, put_operand("a", b"1", None).unwrap()))
            .unwrap();
        assert_eq!(bincode::deserialize::<Option<Versioned>>(&previous).unwrap(), None);

        let previous = executor
            .apply(Index::new(4), 10, command(PUT, put_operand("a", b"2", None).unwrap()))
            .unwrap();
        assert_eq!(
            bincode::deserialize::<Option<Versioned>>(&previous).unwrap(),
            Some(Versioned {
                value: b"1".to_vec(),
                version: 3
            })
        );
        assert_eq!(
            get(&mut executor, "a"),
            Some(Versioned {
                value: b"2".to_vec(),
                version: 4
            })
        );

        executor
            .apply(Index::new(5), 10, command(REMOVE, encode(&"a".to_string()).unwrap()))
            .unwrap();
        assert_eq!(get(&mut executor, "a"), None);
    }

    #[test]
    fn ttl_expires_entries_unless_overwritten() {
        let mut executor = executor();
        let ttl = Some(Duration::from_millis(100));
        executor
            .apply(Index::new(3), 1_000, command(PUT, put_operand("a", b"1", ttl).unwrap()))
            .unwrap();
        executor
            .apply(Index::new(4), 1_000, command(PUT, put_operand("b", b"1", ttl).unwrap()))
            .unwrap();
        // Overwriting "b" without a TTL keeps it.
        executor
            .apply(Index::new(5), 1_050, command(PUT, put_operand("b", b"2", None).unwrap()))
            .unwrap();

        executor.apply(Index::new(6), 1_099, ServiceRequest::Tick).unwrap();
        assert!(get(&mut executor, "a").is_some());

        executor.apply(Index::new(7), 1_100, ServiceRequest::Tick).unwrap();
        assert_eq!(get(&mut executor, "a"), None);
        assert!(get(&mut executor, "b").is_some());
    }

    #[test]
    fn listeners_receive_changes_until_they_leave() {
        let mut executor = executor();
        executor
            .apply(
                Index::new(3),
                0,
                ServiceRequest::Command {
                    session: SessionId::new(2),
                    operation: OperationId::from(LISTEN),
                    operand: Bytes::new(),
                },
            )
            .unwrap();
        executor
            .apply(Index::new(4), 0, command(PUT, put_operand("a", b"1", None).unwrap()))
            .unwrap();

        let events = executor.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session, SessionId::new(2));
        assert_eq!(events[0].event_type, CHANGE_EVENT);
        let change: ChangeEvent = bincode::deserialize(&events[0].payload).unwrap();
        assert_eq!(change.kind, ChangeKind::Inserted);

        executor
            .apply(Index::new(5), 0, ServiceRequest::CloseSession { session: SessionId::new(2) })
            .unwrap();
        executor
            .apply(Index::new(6), 0, command(PUT, put_operand("a", b"2", None).unwrap()))
            .unwrap();
        assert!(executor.take_events().is_empty());
    }

    #[test]
    fn restore_reschedules_expiry() {
        let mut executor = executor();
        executor
            .apply(
                Index::new(3),
                1_000,
                command(PUT, put_operand("a", b"1", Some(Duration::from_millis(100))).unwrap()),
            )
            .unwrap();
        let backup = executor.backup().unwrap();

        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let mut restored = ServiceExecutor::new(logger, "map-1", TYPE, MapService::new());
        restored.restore(Index::new(3), 1_000, &backup).unwrap();
        assert!(get(&mut restored, "a").is_some());

        restored.apply(Index::new(4), 1_100, ServiceRequest::Tick).unwrap();
        assert_eq!(get(&mut restored, "a"), None);
    }
}
