use crate::raft::{Configuration, ConfigurationError, MemberId, Term};
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata I/O failed")]
    Io(#[from] io::Error),
    #[error("metadata file is unreadable")]
    Corrupt(#[from] bincode::Error),
    #[error("stored configuration is invalid")]
    InvalidConfiguration(#[from] ConfigurationError),
    #[error("stored vote port {0} is out of range")]
    InvalidVotePort(i32),
}

/// MetadataStore is used whenever raft requires that something is persisted to a durable store to
/// guarantee safety: the current term, the vote cast in it, and the last adopted configuration.
///
/// Every store method must be durable before it returns. Callers rely on this to persist a vote
/// before answering the candidate.
pub trait MetadataStore: Send {
    fn load_term(&mut self) -> Result<Term, MetadataError>;

    fn load_vote(&mut self) -> Result<Option<MemberId>, MetadataError>;

    /// `None` if no configuration has ever been stored.
    fn load_configuration(&mut self) -> Result<Option<Configuration>, MetadataError>;

    fn store_term(&mut self, term: Term) -> Result<(), MetadataError>;

    fn store_vote(&mut self, vote: Option<&MemberId>) -> Result<(), MetadataError>;

    fn store_term_and_vote(&mut self, term: Term, vote: Option<&MemberId>) -> Result<(), MetadataError>;

    fn store_configuration(&mut self, configuration: &Configuration) -> Result<(), MetadataError>;
}
