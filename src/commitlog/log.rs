use serde::{Deserialize, Serialize};
use std::{fmt, io};

/// Index is an index of an entry in the log; i.e. a log entry's index.
///
/// Index 0 never holds an entry. It is used as the "previous index" of the first entry and as the
/// position of the bootstrap configuration.
#[derive(Copy, Clone, Default, PartialOrd, PartialEq, Ord, Eq, Hash, Serialize, Deserialize)]
pub struct Index(u64);

impl Index {
    pub const ZERO: Index = Index(0);

    pub fn new(index: u64) -> Self {
        Index(index)
    }

    pub fn start_index() -> Self {
        Index(1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn plus(&self, delta: u64) -> Index {
        Index(self.0 + delta)
    }

    /// Saturates at zero.
    pub fn minus(&self, delta: u64) -> Index {
        Index(self.0.saturating_sub(delta))
    }

    pub fn checked_minus(&self, delta: u64) -> Option<Index> {
        self.0.checked_sub(delta).map(Index)
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Log is an append only log intended for use as a replicated commit log.
///
/// Log indexes entries starting from 1. A log may have its prefix compacted away, after which
/// `first_index()` is the lowest readable index.
pub trait Log<E: Entry> {
    /// append() appends a log entry to the log at the next log entry index, then returns
    /// the log entry index that was just used to append the entry.
    fn append(&mut self, entry: E) -> Result<Index, io::Error>;

    /// Read log entry at specified index. Compacted and unwritten indexes read as `None`.
    fn read(&self, index: Index) -> Result<Option<E>, io::Error>;

    /// Deletes anything starting at `index` and later.
    fn truncate(&mut self, index: Index);

    /// next_index returns the next index that will be used to append an entry.
    fn next_index(&self) -> Index;

    /// Lowest index that can still be read. Equal to `next_index()` for an empty log.
    fn first_index(&self) -> Index;

    /// Discards every entry up to and including `index`.
    fn compact(&mut self, index: Index);

    /// Discards every entry; the next append lands at `next_index`.
    fn reset(&mut self, next_index: Index);
}

pub trait Entry: Clone {
    fn encode(&self) -> Result<Vec<u8>, io::Error>;

    fn decode(bytes: &[u8]) -> Result<Self, io::Error>;
}
