use crate::commitlog::Index;
use crate::service::{OperationId, SessionId};

/// ServiceError is what a primitive's handler can fail with.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ServiceError {
    #[error("callbacks can't be scheduled while executing a query")]
    IllegalScheduling,
    #[error("invalid operand: {0}")]
    InvalidOperand(String),
    #[error("{0}")]
    Failed(String),
}

impl From<bincode::Error> for ServiceError {
    fn from(e: bincode::Error) -> Self {
        ServiceError::InvalidOperand(e.to_string())
    }
}

/// OperationError is the outcome of dispatching a committed entry or a query that didn't reach a
/// handler, or whose handler failed.
///
/// None of these corrupt the executor: the entry stays applied and the clocks still advance.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum OperationError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error("unknown service {0:?}")]
    UnknownService(String),
    #[error("unknown service type {0:?}")]
    UnknownServiceType(String),
    #[error("service {service:?} has type {actual:?}, not {requested:?}")]
    ServiceTypeMismatch {
        service: String,
        requested: String,
        actual: String,
    },
    #[error("unknown operation {0}")]
    UnknownOperation(OperationId),
    #[error("operation {0} can't be executed as a command")]
    NotACommand(OperationId),
    #[error("operation {0} can't be executed as a query")]
    NotAQuery(OperationId),
    #[error("index {index:?} is not after the last applied index {last_applied:?}")]
    OutOfOrder { index: Index, last_applied: Index },
    #[error("service failed")]
    Service(#[from] ServiceError),
}
