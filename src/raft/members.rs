use crate::commitlog::Index;
use crate::raft::peer::{ReplicationController, VoteController};
use crate::raft::{Configuration, MemberId};
use std::collections::HashMap;

/// Stable handle of a member record. Keys are never reused, so a key held across a
/// reconfiguration can't alias a different member.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct MemberKey(usize);

/// Member is a remote cluster member together with its per-peer controllers.
pub(crate) struct Member {
    pub(crate) id: MemberId,
    pub(crate) replication: ReplicationController,
    pub(crate) vote: VoteController,
}

impl Member {
    fn new(id: MemberId, next: Index) -> Self {
        Member {
            replication: ReplicationController::new(id.clone(), next),
            vote: VoteController::new(id.clone()),
            id,
        }
    }

    fn force_close(&mut self) {
        self.replication.close();
        self.vote.close();
    }
}

/// MemberArena holds the remote members of the current configuration.
pub(crate) struct MemberArena {
    slots: Vec<Option<Member>>,
    by_id: HashMap<MemberId, MemberKey>,
}

#[derive(Debug, Default, PartialEq)]
pub(crate) struct Reconciliation {
    pub(crate) added: Vec<MemberId>,
    pub(crate) removed: Vec<MemberId>,
}

impl MemberArena {
    pub(crate) fn new() -> Self {
        MemberArena {
            slots: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// Makes the arena hold exactly the remote members of `configuration`. New members get fresh
    /// controllers starting at `next`; members no longer listed are force-closed and dropped.
    pub(crate) fn reconcile(&mut self, configuration: &Configuration, local: &MemberId, next: Index) -> Reconciliation {
        let mut reconciliation = Reconciliation::default();

        let mut stale: Vec<MemberId> = self
            .by_id
            .keys()
            .filter(|id| !configuration.contains(id))
            .cloned()
            .collect();
        stale.sort();
        for id in stale {
            if let Some(key) = self.by_id.remove(&id) {
                if let Some(mut member) = self.slots[key.0].take() {
                    member.force_close();
                }
            }
            reconciliation.removed.push(id);
        }

        for id in configuration.members() {
            if id == local || self.by_id.contains_key(id) {
                continue;
            }
            let key = MemberKey(self.slots.len());
            self.slots.push(Some(Member::new(id.clone(), next)));
            self.by_id.insert(id.clone(), key);
            reconciliation.added.push(id.clone());
        }

        reconciliation
    }

    /// Force-closes and drops every member.
    pub(crate) fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            if let Some(mut member) = slot.take() {
                member.force_close();
            }
        }
        self.by_id.clear();
    }

    pub(crate) fn key(&self, id: &MemberId) -> Option<MemberKey> {
        self.by_id.get(id).copied()
    }

    pub(crate) fn get(&self, key: MemberKey) -> Option<&Member> {
        self.slots.get(key.0).and_then(|slot| slot.as_ref())
    }

    pub(crate) fn get_mut(&mut self, key: MemberKey) -> Option<&mut Member> {
        self.slots.get_mut(key.0).and_then(|slot| slot.as_mut())
    }

    pub(crate) fn by_id_mut(&mut self, id: &MemberId) -> Option<&mut Member> {
        match self.key(id) {
            Some(key) => self.get_mut(key),
            None => None,
        }
    }

    /// Keys of live members, in a stable order.
    pub(crate) fn keys(&self) -> Vec<MemberKey> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| MemberKey(i))
            .collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Member> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Member> {
        self.slots.iter_mut().filter_map(|slot| slot.as_mut())
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raft::Term;

    fn member(port: u16) -> MemberId {
        MemberId::new("localhost", port)
    }

    fn configuration(ports: &[u16]) -> Configuration {
        Configuration::new(Index::new(1), Term::new(1), ports.iter().map(|p| member(*p)).collect()).unwrap()
    }

    #[test]
    fn reconcile_adds_and_removes_remote_members() {
        let local = member(1);
        let mut arena = MemberArena::new();

        let first = arena.reconcile(&configuration(&[1, 2, 3]), &local, Index::new(1));
        assert_eq!(first.added, vec![member(2), member(3)]);
        assert!(first.removed.is_empty());
        assert_eq!(arena.len(), 2);
        let key_of_2 = arena.key(&member(2)).unwrap();

        let second = arena.reconcile(&configuration(&[1, 2, 4]), &local, Index::new(5));
        assert_eq!(second.added, vec![member(4)]);
        assert_eq!(second.removed, vec![member(3)]);
        assert!(arena.key(&member(3)).is_none());

        // Surviving members keep their key and their controllers.
        assert_eq!(arena.key(&member(2)), Some(key_of_2));
        assert_eq!(arena.get(key_of_2).unwrap().replication.next(), Index::new(1));
        assert_eq!(arena.by_id_mut(&member(4)).unwrap().replication.next(), Index::new(5));
    }

    #[test]
    fn removed_keys_are_not_reused() {
        let local = member(1);
        let mut arena = MemberArena::new();
        arena.reconcile(&configuration(&[1, 2]), &local, Index::new(1));
        let old_key = arena.key(&member(2)).unwrap();

        arena.reconcile(&configuration(&[1]), &local, Index::new(1));
        arena.reconcile(&configuration(&[1, 3]), &local, Index::new(1));

        assert!(arena.get(old_key).is_none());
        assert_ne!(arena.key(&member(3)), Some(old_key));
        assert_eq!(arena.keys().len(), 1);
    }

    #[test]
    fn clear_closes_everything() {
        let local = member(1);
        let mut arena = MemberArena::new();
        arena.reconcile(&configuration(&[1, 2, 3]), &local, Index::new(1));
        arena.clear();
        assert_eq!(arena.len(), 0);
        assert_eq!(arena.iter().count(), 0);
    }
}
