use crate::commitlog::Index;
use crate::raft::{MemberId, Term};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigurationError {
    #[error("a configuration must have at least one member")]
    NoMembers,
    #[error("member {0} is listed more than once")]
    DuplicateMember(MemberId),
}

/// Configuration is the authoritative member list of a partition as of a log position.
///
/// It is immutable. A node replaces its current configuration wholesale when it observes one with
/// a higher position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    position: Index,
    term: Term,
    members: Vec<MemberId>,
}

impl Configuration {
    pub fn new(position: Index, term: Term, members: Vec<MemberId>) -> Result<Self, ConfigurationError> {
        if members.is_empty() {
            return Err(ConfigurationError::NoMembers);
        }
        for (i, member) in members.iter().enumerate() {
            if members[..i].contains(member) {
                return Err(ConfigurationError::DuplicateMember(member.clone()));
            }
        }

        Ok(Configuration {
            position,
            term,
            members,
        })
    }

    /// Log position at which this configuration was adopted.
    pub fn position(&self) -> Index {
        self.position
    }

    pub fn term(&self) -> Term {
        self.term
    }

    pub fn members(&self) -> &[MemberId] {
        &self.members
    }

    pub fn contains(&self, member: &MemberId) -> bool {
        self.members.contains(member)
    }

    pub fn quorum(&self) -> usize {
        quorum(self.members.len())
    }
}

/// Minimum number of members (self included) that make a majority of `member_count`.
///
/// Written in terms of remote members this is `floor((remote + 1) / 2) + 1`.
pub fn quorum(member_count: usize) -> usize {
    member_count / 2 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(port: u16) -> MemberId {
        MemberId::new("localhost", port)
    }

    #[test]
    fn quorum_arithmetic() {
        let quorums: Vec<usize> = (1..=7).map(quorum).collect();
        assert_eq!(quorums, vec![1, 2, 2, 3, 3, 4, 4]);
    }

    #[test]
    fn quorum_matches_remote_member_formula() {
        for n in 1..=7usize {
            let remote = n - 1;
            assert_eq!(quorum(n), (remote + 1) / 2 + 1);
        }
    }

    #[test]
    fn empty_configuration_is_illegal() {
        assert_eq!(
            Configuration::new(Index::ZERO, Term::ZERO, vec![]),
            Err(ConfigurationError::NoMembers)
        );
    }

    #[test]
    fn duplicate_members_are_illegal() {
        assert_eq!(
            Configuration::new(Index::ZERO, Term::ZERO, vec![member(1), member(2), member(1)]),
            Err(ConfigurationError::DuplicateMember(member(1)))
        );
    }

    #[test]
    fn configuration_accessors() {
        let configuration = Configuration::new(Index::new(7), Term::new(2), vec![member(1), member(2), member(3)]).unwrap();
        assert_eq!(configuration.position(), Index::new(7));
        assert_eq!(configuration.term(), Term::new(2));
        assert!(configuration.contains(&member(2)));
        assert!(!configuration.contains(&member(4)));
        assert_eq!(configuration.quorum(), 2);
    }
}
