use crate::commitlog::Index;
use crate::raft::MemberId;
use std::fmt;
use std::time::Instant;

/// RoleKind is the observable part of a node's role.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RoleKind {
    Inactive,
    Follower,
    Candidate,
    Leader,
}

/// Events that can move a node between roles.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum RoleEvent {
    /// Bootstrap or join finished; the node has a configuration that includes it.
    Started,
    ElectionTimeout,
    QuorumOfVotes,
    /// An append/snapshot from a leader of a term at least as high as ours.
    LeaderDiscovered,
    HigherTerm,
    /// Shutdown, or a configuration that no longer includes this node.
    Stopped,
}

/// The transition table. `None` means the event doesn't move the node out of `current`.
/// `Some(Candidate)` from `Candidate` is a re-entry: a new election in a higher term.
pub(crate) fn transition(current: RoleKind, event: RoleEvent) -> Option<RoleKind> {
    use RoleEvent::*;
    use RoleKind::*;

    match (current, event) {
        (_, Stopped) => match current {
            Inactive => None,
            _ => Some(Inactive),
        },

        (Inactive, Started) => Some(Follower),
        (Inactive, _) => None,

        (Follower, ElectionTimeout) => Some(Candidate),
        (Follower, HigherTerm) => Some(Follower),
        (Follower, Started) | (Follower, QuorumOfVotes) | (Follower, LeaderDiscovered) => None,

        (Candidate, ElectionTimeout) => Some(Candidate),
        (Candidate, QuorumOfVotes) => Some(Leader),
        (Candidate, LeaderDiscovered) | (Candidate, HigherTerm) => Some(Follower),
        (Candidate, Started) => None,

        (Leader, HigherTerm) => Some(Follower),
        (Leader, Started) | (Leader, ElectionTimeout) | (Leader, QuorumOfVotes) | (Leader, LeaderDiscovered) => None,
    }
}

/// Role is a node's role along with the state that only exists while in that role.
pub(crate) enum Role {
    Inactive(InactiveState),
    Follower(FollowerState),
    Candidate(CandidateState),
    Leader(LeaderState),
}

impl Role {
    pub(crate) fn kind(&self) -> RoleKind {
        match self {
            Role::Inactive(_) => RoleKind::Inactive,
            Role::Follower(_) => RoleKind::Follower,
            Role::Candidate(_) => RoleKind::Candidate,
            Role::Leader(_) => RoleKind::Leader,
        }
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind())
    }
}

/// Membership work an inactive node is doing.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Membership {
    Idle,
    Joining { contacts: Vec<MemberId> },
}

pub(crate) struct InactiveState {
    pub(crate) membership: Membership,
    pub(crate) next_attempt: Option<Instant>,
}

pub(crate) struct FollowerState {
    /// `None` while this node isn't part of the configuration; such a node never starts elections.
    pub(crate) election_deadline: Option<Instant>,
    /// When to (re)send the leave request, while leaving.
    pub(crate) leaving: Option<Instant>,
}

pub(crate) struct CandidateState {
    pub(crate) election_deadline: Instant,
}

pub(crate) struct LeaderState {
    /// Index of the `Initialize` entry appended on election. Configuration changes wait until it
    /// commits.
    pub(crate) initialize_index: Index,
}

#[cfg(test)]
mod tests {
    use super::*;
    use RoleEvent::*;
    use RoleKind::*;

    const ALL_EVENTS: [RoleEvent; 6] = [Started, ElectionTimeout, QuorumOfVotes, LeaderDiscovered, HigherTerm, Stopped];

    #[test]
    fn inactive_only_leaves_on_start() {
        for event in ALL_EVENTS.iter() {
            let expected = if *event == Started { Some(Follower) } else { None };
            assert_eq!(transition(Inactive, *event), expected, "{:?}", event);
        }
    }

    #[test]
    fn election_transitions() {
        assert_eq!(transition(Follower, ElectionTimeout), Some(Candidate));
        assert_eq!(transition(Candidate, QuorumOfVotes), Some(Leader));
        assert_eq!(transition(Candidate, ElectionTimeout), Some(Candidate));
        assert_eq!(transition(Candidate, LeaderDiscovered), Some(Follower));
        assert_eq!(transition(Follower, QuorumOfVotes), None);
        assert_eq!(transition(Leader, ElectionTimeout), None);
    }

    #[test]
    fn higher_term_always_demotes() {
        for role in [Follower, Candidate, Leader].iter() {
            assert_eq!(transition(*role, HigherTerm), Some(Follower));
        }
    }

    #[test]
    fn every_active_role_stops() {
        for role in [Follower, Candidate, Leader].iter() {
            assert_eq!(transition(*role, Stopped), Some(Inactive));
        }
        assert_eq!(transition(Inactive, Stopped), None);
    }
}
