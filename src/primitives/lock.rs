use crate::commitlog::Index;
use crate::service::{encode, Commit, OperationRegistry, PrimitiveService, ServiceContext, ServiceError, SessionId};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const TYPE: &str = "lock";

pub const LOCK: &str = "lock";
pub const TRY_LOCK: &str = "try_lock";
pub const UNLOCK: &str = "unlock";
pub const IS_LOCKED: &str = "is_locked";

/// Published to a waiting session when the lock is granted to it. Payload is the `LockGrant`.
pub const LOCKED_EVENT: &str = "locked";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LockOutcome {
    /// Granted; the version is the index of the entry that granted it.
    Acquired { version: u64 },
    /// Queued; a `locked` event follows when it's granted.
    Queued,
    Unavailable,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LockGrant {
    pub version: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Holder {
    session: SessionId,
    version: Index,
}

#[derive(Serialize, Deserialize)]
struct LockBackup {
    holder: Option<Holder>,
    waiters: VecDeque<SessionId>,
}

/// LockService is a replicated exclusive lock with a FIFO queue of waiting sessions.
///
/// A lock held by a session that expires or closes is released to the next waiter.
#[derive(Default)]
pub struct LockService {
    holder: Option<Holder>,
    waiters: VecDeque<SessionId>,
}

impl LockService {
    pub fn new() -> Self {
        LockService::default()
    }

    fn lock(&mut self, commit: &Commit, ctx: &mut ServiceContext<'_, Self>) -> Result<Bytes, ServiceError> {
        if let Some(holder) = &self.holder {
            if holder.session == commit.session {
                return encode(&LockOutcome::Acquired {
                    version: holder.version.as_u64(),
                });
            }
            if !self.waiters.contains(&commit.session) {
                self.waiters.push_back(commit.session);
            }
            return encode(&LockOutcome::Queued);
        }

        let version = ctx.index();
        self.holder = Some(Holder {
            session: commit.session,
            version,
        });
        encode(&LockOutcome::Acquired {
            version: version.as_u64(),
        })
    }

    fn try_lock(&mut self, commit: &Commit, ctx: &mut ServiceContext<'_, Self>) -> Result<Bytes, ServiceError> {
        match &self.holder {
            Some(holder) if holder.session != commit.session => encode(&LockOutcome::Unavailable),
            _ => self.lock(commit, ctx),
        }
    }

    /// Returns false if the session didn't hold the lock. A waiting session leaves the queue.
    fn unlock(&mut self, commit: &Commit, ctx: &mut ServiceContext<'_, Self>) -> Result<Bytes, ServiceError> {
        self.waiters.retain(|waiter| *waiter != commit.session);

        let held = matches!(&self.holder, Some(holder) if holder.session == commit.session);
        if held {
            self.release(ctx)?;
        }
        encode(&held)
    }

    fn is_locked(&self, _commit: &Commit, _ctx: &mut ServiceContext<'_, Self>) -> Result<Bytes, ServiceError> {
        encode(&self.holder.is_some())
    }

    /// Hands the lock to the first waiter that is still open.
    fn release(&mut self, ctx: &mut ServiceContext<'_, Self>) -> Result<(), ServiceError> {
        self.holder = None;
        while let Some(next) = self.waiters.pop_front() {
            if ctx.session(next).map(|session| session.is_open()).unwrap_or(false) {
                let version = ctx.index();
                self.holder = Some(Holder { session: next, version });
                ctx.publish(
                    next,
                    LOCKED_EVENT,
                    encode(&LockGrant {
                        version: version.as_u64(),
                    })?,
                );
                break;
            }
        }
        Ok(())
    }

    fn session_gone(&mut self, session: SessionId, ctx: &mut ServiceContext<'_, Self>) {
        self.waiters.retain(|waiter| *waiter != session);
        let held = matches!(&self.holder, Some(holder) if holder.session == session);
        if held {
            // Granting can only fail to encode the event; the new holder is set either way.
            let _ = self.release(ctx);
        }
    }
}

impl PrimitiveService for LockService {
    fn operations(registry: &mut OperationRegistry<Self>) {
        registry.command(LOCK, LockService::lock);
        registry.command(TRY_LOCK, LockService::try_lock);
        registry.command(UNLOCK, LockService::unlock);
        registry.query(IS_LOCKED, LockService::is_locked);
    }

    fn expire(&mut self, session: SessionId, ctx: &mut ServiceContext<'_, Self>) {
        self.session_gone(session, ctx);
    }

    fn close(&mut self, session: SessionId, ctx: &mut ServiceContext<'_, Self>) {
        self.session_gone(session, ctx);
    }

    fn backup(&self) -> Result<Vec<u8>, ServiceError> {
        let backup = LockBackup {
            holder: self.holder.clone(),
            waiters: self.waiters.clone(),
        };
        Ok(bincode::serialize(&backup)?)
    }

    fn restore(&mut self, data: &[u8], _ctx: &mut ServiceContext<'_, Self>) -> Result<(), ServiceError> {
        let backup: LockBackup = bincode::deserialize(data)?;
        self.holder = backup.holder;
        self.waiters = backup.waiters;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{OperationId, ServiceExecutor, ServiceHost, ServiceRequest};

    fn executor(sessions: u64) -> ServiceExecutor<LockService> {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let mut executor = ServiceExecutor::new(logger, "lock-1", TYPE, LockService::new());
        for index in 1..=sessions {
            executor
                .apply(
                    Index::new(index),
                    0,
                    ServiceRequest::OpenSession {
                        client: format!("client-{}", index),
                        timeout_millis: 1_000,
                    },
                )
                .unwrap();
        }
        executor
    }

    fn run<T: serde::de::DeserializeOwned>(
        executor: &mut ServiceExecutor<LockService>,
        index: u64,
        session: u64,
        operation: &str,
    ) -> T {
        let output = executor
            .apply(
                Index::new(index),
                0,
                ServiceRequest::Command {
                    session: SessionId::new(session),
                    operation: OperationId::from(operation),
                    operand: Bytes::new(),
                },
            )
            .unwrap();
        bincode::deserialize(&output).unwrap()
    }

    #[test]
    fn waiters_are_granted_in_order() {
        let mut executor = executor(3);
        assert_eq!(run::<LockOutcome>(&mut executor, 4, 1, LOCK), LockOutcome::Acquired { version: 4 });
        assert_eq!(run::<LockOutcome>(&mut executor, 5, 3, LOCK), LockOutcome::Queued);
        assert_eq!(run::<LockOutcome>(&mut executor, 6, 2, LOCK), LockOutcome::Queued);
        assert_eq!(run::<LockOutcome>(&mut executor, 7, 2, TRY_LOCK), LockOutcome::Unavailable);

        assert!(run::<bool>(&mut executor, 8, 1, UNLOCK));
        let events = executor.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session, SessionId::new(3));
        assert_eq!(events[0].event_type, LOCKED_EVENT);
        assert_eq!(
            bincode::deserialize::<LockGrant>(&events[0].payload).unwrap(),
            LockGrant { version: 8 }
        );

        // Not the holder anymore.
        assert!(!run::<bool>(&mut executor, 9, 1, UNLOCK));
    }

    #[test]
    fn expired_holder_releases_the_lock() {
        let mut executor = executor(2);
        run::<LockOutcome>(&mut executor, 3, 1, LOCK);
        run::<LockOutcome>(&mut executor, 4, 2, LOCK);

        // Session 2 stays alive, session 1 times out.
        executor
            .apply(
                Index::new(5),
                900,
                ServiceRequest::KeepAlive {
                    sessions: vec![SessionId::new(2)],
                },
            )
            .unwrap();
        executor.apply(Index::new(6), 1_001, ServiceRequest::Tick).unwrap();

        let events = executor.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session, SessionId::new(2));
        let locked = executor
            .query(SessionId::new(2), OperationId::from(IS_LOCKED), Bytes::new())
            .unwrap();
        assert!(bincode::deserialize::<bool>(&locked).unwrap());
    }
}
