use crate::service::{encode, Commit, OperationRegistry, PrimitiveService, ServiceContext, ServiceError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub const TYPE: &str = "counter";

pub const GET: &str = "get";
pub const SET: &str = "set";
pub const INCREMENT: &str = "increment";
pub const COMPARE_AND_SET: &str = "compare_and_set";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompareAndSet {
    pub expect: i64,
    pub update: i64,
}

/// CounterService is a replicated 64 bit counter. Arithmetic wraps.
#[derive(Default)]
pub struct CounterService {
    value: i64,
}

impl CounterService {
    pub fn new() -> Self {
        CounterService::default()
    }

    fn get(&self, _commit: &Commit, _ctx: &mut ServiceContext<'_, Self>) -> Result<Bytes, ServiceError> {
        encode(&self.value)
    }

    /// Returns the previous value.
    fn set(&mut self, commit: &Commit, _ctx: &mut ServiceContext<'_, Self>) -> Result<Bytes, ServiceError> {
        let value: i64 = commit.decode()?;
        let previous = std::mem::replace(&mut self.value, value);
        encode(&previous)
    }

    /// Returns the new value.
    fn increment(&mut self, commit: &Commit, _ctx: &mut ServiceContext<'_, Self>) -> Result<Bytes, ServiceError> {
        let delta: i64 = commit.decode()?;
        self.value = self.value.wrapping_add(delta);
        encode(&self.value)
    }

    fn compare_and_set(&mut self, commit: &Commit, _ctx: &mut ServiceContext<'_, Self>) -> Result<Bytes, ServiceError> {
        let request: CompareAndSet = commit.decode()?;
        let swapped = self.value == request.expect;
        if swapped {
            self.value = request.update;
        }
        encode(&swapped)
    }
}

impl PrimitiveService for CounterService {
    fn operations(registry: &mut OperationRegistry<Self>) {
        registry.query(GET, CounterService::get);
        registry.command(SET, CounterService::set);
        registry.command(INCREMENT, CounterService::increment);
        registry.command(COMPARE_AND_SET, CounterService::compare_and_set);
    }

    fn backup(&self) -> Result<Vec<u8>, ServiceError> {
        Ok(bincode::serialize(&self.value)?)
    }

    fn restore(&mut self, data: &[u8], _ctx: &mut ServiceContext<'_, Self>) -> Result<(), ServiceError> {
        self.value = bincode::deserialize(data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitlog::Index;
    use crate::service::{OperationId, ServiceExecutor, ServiceHost, ServiceRequest, SessionId};

    fn apply<T: serde::de::DeserializeOwned>(
        executor: &mut ServiceExecutor<CounterService>,
        index: u64,
        operation: &str,
        operand: Bytes,
    ) -> T {
        let output = executor
            .apply(
                Index::new(index),
                0,
                ServiceRequest::Command {
                    session: SessionId::new(1),
                    operation: OperationId::from(operation),
                    operand,
                },
            )
            .unwrap();
        bincode::deserialize(&output).unwrap()
    }

    #[test]
    fn counter_operations() {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let mut executor = ServiceExecutor::new(logger, "counter-1", TYPE, CounterService::new());
        executor
            .apply(
                Index::new(1),
                0,
                ServiceRequest::OpenSession {
                    client: "client".to_string(),
                    timeout_millis: 1_000,
                },
            )
            .unwrap();

        assert_eq!(apply::<i64>(&mut executor, 2, INCREMENT, encode(&5i64).unwrap()), 5);
        assert_eq!(apply::<i64>(&mut executor, 3, SET, encode(&10i64).unwrap()), 5);

        let cas = |expect, update| encode(&CompareAndSet { expect, update }).unwrap();
        assert!(!apply::<bool>(&mut executor, 4, COMPARE_AND_SET, cas(5, 20)));
        assert!(apply::<bool>(&mut executor, 5, COMPARE_AND_SET, cas(10, 20)));

        let value = executor
            .query(SessionId::new(1), OperationId::from(GET), Bytes::new())
            .unwrap();
        assert_eq!(bincode::deserialize::<i64>(&value).unwrap(), 20);
    }
}
