use crate::metadata::{MetadataError, MetadataStore};
use crate::raft::{Configuration, MemberId, Term};

/// InMemoryMetadataStore keeps metadata in RAM. It survives nothing and is meant for
/// simulations and tests.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMetadataStore {
    term: Term,
    vote: Option<MemberId>,
    configuration: Option<Configuration>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        InMemoryMetadataStore::default()
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn load_term(&mut self) -> Result<Term, MetadataError> {
        Ok(self.term)
    }

    fn load_vote(&mut self) -> Result<Option<MemberId>, MetadataError> {
        Ok(self.vote.clone())
    }

    fn load_configuration(&mut self) -> Result<Option<Configuration>, MetadataError> {
        Ok(self.configuration.clone())
    }

    fn store_term(&mut self, term: Term) -> Result<(), MetadataError> {
        self.term = term;
        Ok(())
    }

    fn store_vote(&mut self, vote: Option<&MemberId>) -> Result<(), MetadataError> {
        self.vote = vote.cloned();
        Ok(())
    }

    fn store_term_and_vote(&mut self, term: Term, vote: Option<&MemberId>) -> Result<(), MetadataError> {
        self.term = term;
        self.vote = vote.cloned();
        Ok(())
    }

    fn store_configuration(&mut self, configuration: &Configuration) -> Result<(), MetadataError> {
        self.configuration = Some(configuration.clone());
        Ok(())
    }
}
