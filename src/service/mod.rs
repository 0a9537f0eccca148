mod error;
mod executor;
mod manager;
mod primitive;
mod scheduler;
mod session;
mod types;

pub use error::OperationError;
pub use error::ServiceError;
pub use executor::ServiceExecutor;
pub use executor::ServiceHost;
pub use executor::ServiceRequest;
pub use manager::PartitionSnapshot;
pub use manager::ServiceManager;
pub use manager::ServiceSnapshot;
pub use manager::ServiceTypeRegistry;
pub use primitive::encode;
pub use primitive::Commit;
pub use primitive::OperationRegistry;
pub use primitive::PrimitiveService;
pub use primitive::ServiceContext;
pub use scheduler::ScheduledTaskId;
pub use session::Session;
pub use session::SessionEvent;
pub use session::SessionRegistry;
pub use session::SessionState;
pub use types::OperationId;
pub use types::OperationType;
pub use types::SessionId;
pub use types::WallClockMillis;
