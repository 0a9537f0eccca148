mod store;

pub use store::SnapshotError;
pub use store::SnapshotMetadata;
pub use store::SnapshotStore;
pub use store::SnapshotWriter;
