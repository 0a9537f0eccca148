mod partition;

pub use partition::CommandError;
pub use partition::CommandResult;
pub use partition::Partition;
pub use partition::PartitionError;
pub use partition::QueryError;
pub use partition::ReadConsistency;
