use crate::commitlog::Index;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SessionId is the log index of the entry that opened the session, so every replica assigns
/// the same id.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        SessionId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<Index> for SessionId {
    fn from(index: Index) -> Self {
        SessionId(index.as_u64())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// OperationId names a handler registered by a primitive service.
#[derive(Clone, PartialOrd, PartialEq, Ord, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(String);

impl OperationId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        OperationId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OperationId {
    fn from(id: &str) -> Self {
        OperationId(id.to_string())
    }
}

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commands are logged and may mutate state. Queries are not logged and must not.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperationType {
    Command,
    Query,
}

/// Wall clock time in milliseconds since the epoch, as assigned by the leader that logged an entry.
pub type WallClockMillis = i64;
