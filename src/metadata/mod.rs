mod file;
mod memory;
mod record;
mod store;

pub use file::FileMetadataStore;
pub use memory::InMemoryMetadataStore;
pub use store::MetadataError;
pub use store::MetadataStore;

pub(crate) use file::sync_directory;
