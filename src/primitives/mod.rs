//! Built-in primitive services.

pub mod counter;
pub mod lock;
pub mod map;

use crate::service::ServiceTypeRegistry;

/// Registers `map`, `counter` and `lock`.
pub fn register_builtins(types: &mut ServiceTypeRegistry) {
    types.register(map::TYPE, map::MapService::new);
    types.register(counter::TYPE, counter::CounterService::new);
    types.register(lock::TYPE, lock::LockService::new);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitlog::Index;
    use crate::raft::{EntryKind, LogEntry, Term};
    use crate::service::{encode, OperationError, OperationId, ServiceManager, SessionId};

    fn entry(kind: EntryKind) -> LogEntry {
        LogEntry {
            term: Term::new(1),
            timestamp: 0,
            kind,
        }
    }

    fn open(name: &str, service_type: &str) -> EntryKind {
        EntryKind::OpenSession {
            client: "client".to_string(),
            service_name: name.to_string(),
            service_type: service_type.to_string(),
            timeout_millis: 5_000,
        }
    }

    #[test]
    fn builtins_are_registered() {
        let mut types = ServiceTypeRegistry::new();
        register_builtins(&mut types);
        assert!(types.contains(map::TYPE));
        assert!(types.contains(counter::TYPE));
        assert!(types.contains(lock::TYPE));
        assert!(!types.contains("queue"));
    }

    #[test]
    fn services_of_different_types_share_a_partition() {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let mut types = ServiceTypeRegistry::new();
        register_builtins(&mut types);
        let mut manager = ServiceManager::new(logger, types);

        manager.apply(Index::new(1), &entry(open("hits", counter::TYPE))).unwrap();
        manager.apply(Index::new(2), &entry(open("users", map::TYPE))).unwrap();

        let incremented = manager
            .apply(
                Index::new(3),
                &entry(EntryKind::Command {
                    session_id: SessionId::new(1),
                    operation: OperationId::from(counter::INCREMENT),
                    operand: encode(&3i64).unwrap(),
                }),
            )
            .unwrap();
        assert_eq!(bincode::deserialize::<i64>(&incremented).unwrap(), 3);

        // The map session can't reach the counter's operations.
        let result = manager.apply(
            Index::new(4),
            &entry(EntryKind::Command {
                session_id: SessionId::new(2),
                operation: OperationId::from(counter::INCREMENT),
                operand: encode(&1i64).unwrap(),
            }),
        );
        assert!(matches!(result, Err(OperationError::UnknownOperation(_))));

        let result = manager.apply(Index::new(5), &entry(open("hits", map::TYPE)));
        assert!(matches!(result, Err(OperationError::ServiceTypeMismatch { .. })));
    }
}
