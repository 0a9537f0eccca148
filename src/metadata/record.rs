use crate::commitlog::Index;
use crate::metadata::MetadataError;
use crate::raft::{Configuration, MemberId, Term};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

/// MetadataRecord is the whole persisted metadata of one partition. It is always written as a
/// unit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct MetadataRecord {
    pub(crate) id: u32,
    pub(crate) log_name: String,
    pub(crate) log_directory: String,
    pub(crate) term: u64,
    // No vote is an empty host and port -1.
    pub(crate) vote_host: String,
    pub(crate) vote_port: i32,
    pub(crate) configuration_entry_term: u64,
    pub(crate) configuration_entry_position: u64,
    // Empty means "never configured"; a real configuration always has members.
    pub(crate) members: Vec<MemberRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct MemberRecord {
    pub(crate) host: String,
    pub(crate) port: u16,
}

impl MetadataRecord {
    pub(crate) fn new(id: u32, log_name: String, log_directory: String) -> Self {
        MetadataRecord {
            id,
            log_name,
            log_directory,
            vote_port: -1,
            ..MetadataRecord::default()
        }
    }

    pub(crate) fn term(&self) -> Term {
        Term::new(self.term)
    }

    pub(crate) fn set_term(&mut self, term: Term) {
        self.term = term.as_u64();
    }

    pub(crate) fn vote(&self) -> Result<Option<MemberId>, MetadataError> {
        if self.vote_host.is_empty() && self.vote_port == -1 {
            return Ok(None);
        }
        let port = u16::try_from(self.vote_port).map_err(|_| MetadataError::InvalidVotePort(self.vote_port))?;
        Ok(Some(MemberId::new(self.vote_host.clone(), port)))
    }

    pub(crate) fn set_vote(&mut self, vote: Option<&MemberId>) {
        match vote {
            Some(member) => {
                self.vote_host = member.host().to_string();
                self.vote_port = i32::from(member.port());
            }
            None => {
                self.vote_host.clear();
                self.vote_port = -1;
            }
        }
    }

    pub(crate) fn configuration(&self) -> Result<Option<Configuration>, MetadataError> {
        if self.members.is_empty() {
            return Ok(None);
        }
        let members = self
            .members
            .iter()
            .map(|m| MemberId::new(m.host.clone(), m.port))
            .collect();
        let configuration = Configuration::new(
            Index::new(self.configuration_entry_position),
            Term::new(self.configuration_entry_term),
            members,
        )?;
        Ok(Some(configuration))
    }

    pub(crate) fn set_configuration(&mut self, configuration: &Configuration) {
        self.configuration_entry_term = configuration.term().as_u64();
        self.configuration_entry_position = configuration.position().as_u64();
        self.members = configuration
            .members()
            .iter()
            .map(|m| MemberRecord {
                host: m.host().to_string(),
                port: m.port(),
            })
            .collect();
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, MetadataError> {
        Ok(bincode::serialize(self)?)
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, MetadataError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
