mod common;

use bytes::Bytes;
use common::{logger, member};
use partition_raft::{
    counter, encode, mocked_clock, quorum, AppendRequest, Commit, Configuration, EntryKind, FileMetadataStore,
    InMemoryLog, Index, LogEntry, MetadataStore, OperationError, OperationId, OperationRegistry, Partition,
    PrimitiveService, RaftNode, RaftNodeConfig, RaftOptions, RaftRequest, RaftResponse, RoleKind, ServiceContext,
    ServiceError, ServiceManager, ServiceTypeRegistry, SessionId, SnapshotStore, Term, Transport, VoteRequest,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

struct NullTransport;

impl Transport for NullTransport {
    fn send(&mut self, _to: &partition_raft::MemberId, _request: RaftRequest) {}
}

#[test]
fn quorum_is_a_strict_majority() {
    let quorums: Vec<usize> = (1..=7).map(quorum).collect();
    assert_eq!(quorums, vec![1, 2, 2, 3, 3, 4, 4]);
}

#[test]
fn metadata_survives_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let voted_for = member(2);
    {
        let mut store = FileMetadataStore::open(logger(), dir.path(), 1, "raft").unwrap();
        assert_eq!(store.load_term().unwrap(), Term::ZERO);
        assert_eq!(store.load_vote().unwrap(), None);
        assert_eq!(store.load_configuration().unwrap(), None);

        store.store_term_and_vote(Term::new(5), Some(&voted_for)).unwrap();
        let configuration = Configuration::new(Index::new(3), Term::new(5), vec![member(1), member(2)]).unwrap();
        store.store_configuration(&configuration).unwrap();
    }
    {
        let mut store = FileMetadataStore::open(logger(), dir.path(), 1, "raft").unwrap();
        assert_eq!(store.load_term().unwrap(), Term::new(5));
        assert_eq!(store.load_vote().unwrap(), Some(voted_for));
        let configuration = store.load_configuration().unwrap().unwrap();
        assert_eq!(configuration.position(), Index::new(3));
        assert_eq!(configuration.members(), &[member(1), member(2)]);

        store.store_term_and_vote(Term::new(6), None).unwrap();
    }

    let mut store = FileMetadataStore::open(logger(), dir.path(), 1, "raft").unwrap();
    assert_eq!(store.load_term().unwrap(), Term::new(6));
    assert_eq!(store.load_vote().unwrap(), None);
}

#[test]
fn terms_never_go_backwards() {
    let dir = tempfile::tempdir().unwrap();
    let snapshots = Arc::new(SnapshotStore::open(logger(), dir.path().join("snapshots")).unwrap());
    let (clock, clock_controller) = mocked_clock();
    let (mut node, _commits) = RaftNode::new(RaftNodeConfig {
        logger: logger(),
        member_id: member(1),
        options: RaftOptions::default(),
        metadata: FileMetadataStore::open(logger(), dir.path().join("metadata"), 1, "raft").unwrap(),
        log: InMemoryLog::create().unwrap(),
        transport: NullTransport,
        clock: Arc::new(clock),
        snapshots,
        snapshot_name: "partition-1".to_string(),
        rng_seed: Some(7),
    })
    .unwrap();
    node.bootstrap(vec![member(1), member(2), member(3)]).unwrap();

    let mut rng = StdRng::seed_from_u64(42);
    let mut highest = node.term();
    for _ in 0..500 {
        let term = Term::new(rng.gen_range(0..40));
        let sender = member(rng.gen_range(2..=3));
        let request = if rng.gen_bool(0.5) {
            RaftRequest::Vote(VoteRequest {
                term,
                candidate: sender,
                last_log_index: Index::new(rng.gen_range(0..5)),
                last_log_term: Term::new(rng.gen_range(0..40)),
            })
        } else {
            RaftRequest::Append(AppendRequest {
                term,
                leader: sender,
                prev_log_index: Index::ZERO,
                prev_log_term: Term::ZERO,
                entries: vec![],
                leader_commit: Index::ZERO,
            })
        };

        let response_term = match node.handle_request(request) {
            RaftResponse::Vote(response) => response.term,
            RaftResponse::Append(response) => response.term,
            other => panic!("unexpected response {:?}", other),
        };
        let expected = highest.max(term);
        assert_eq!(node.term(), expected);
        assert_eq!(response_term, expected);
        highest = expected;

        // Let an election fire now and then; it may only raise the term.
        if rng.gen_bool(0.1) {
            clock_controller.advance(Duration::from_secs(2));
            node.tick();
            assert!(node.term() >= highest);
            highest = node.term();
        }
    }

    let vote = node.voted_for().cloned();
    drop(node);
    let mut store = FileMetadataStore::open(logger(), dir.path().join("metadata"), 1, "raft").unwrap();
    assert_eq!(store.load_term().unwrap(), highest);
    assert_eq!(store.load_vote().unwrap(), vote);
}

/// Reports the logical clock it observed for every command.
#[derive(Default)]
struct ClockObserver;

impl ClockObserver {
    fn observe(&mut self, commit: &Commit, ctx: &mut ServiceContext<'_, Self>) -> Result<Bytes, ServiceError> {
        encode(&(commit.index, ctx.index()))
    }
}

impl PrimitiveService for ClockObserver {
    fn operations(registry: &mut OperationRegistry<Self>) {
        registry.command("observe", ClockObserver::observe);
    }

    fn backup(&self) -> Result<Vec<u8>, ServiceError> {
        Ok(vec![])
    }

    fn restore(&mut self, _data: &[u8], _ctx: &mut ServiceContext<'_, Self>) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[test]
fn commands_apply_in_log_order_with_the_index_as_clock() {
    let dir = tempfile::tempdir().unwrap();
    let snapshots = Arc::new(SnapshotStore::open(logger(), dir.path().join("snapshots")).unwrap());
    let (clock, clock_controller) = mocked_clock();
    let (node, commits) = RaftNode::new(RaftNodeConfig {
        logger: logger(),
        member_id: member(1),
        options: RaftOptions::default(),
        metadata: FileMetadataStore::open(logger(), dir.path().join("metadata"), 1, "raft").unwrap(),
        log: InMemoryLog::create().unwrap(),
        transport: NullTransport,
        clock: Arc::new(clock),
        snapshots: snapshots.clone(),
        snapshot_name: "partition-1".to_string(),
        rng_seed: Some(3),
    })
    .unwrap();
    let mut types = ServiceTypeRegistry::new();
    types.register("clock", ClockObserver::default);
    let mut partition = Partition::new(
        logger(),
        node,
        commits,
        ServiceManager::new(logger(), types),
        snapshots,
        "partition-1".to_string(),
        None,
    )
    .unwrap();

    partition.bootstrap(vec![member(1)]).unwrap();
    for _ in 0..100 {
        if partition.node().role() == RoleKind::Leader {
            break;
        }
        clock_controller.advance(Duration::from_millis(50));
        partition.tick();
    }
    assert!(partition.node().is_leader());

    let (session, mut opened) = partition.open_session("clock-client", "clock", "clock", 60_000).unwrap();
    opened.try_recv().unwrap().unwrap();

    let mut previous = Index::new(session.as_u64());
    for _ in 1..=100 {
        let (index, mut applied) = partition
            .submit(EntryKind::Command {
                session_id: session,
                operation: OperationId::from("observe"),
                operand: Bytes::new(),
            })
            .unwrap();
        let bytes = applied.try_recv().unwrap().unwrap();
        let (commit_index, logical_clock): (Index, Index) = bincode::deserialize(&bytes).unwrap();

        assert_eq!(commit_index, index);
        assert_eq!(logical_clock, index);
        assert!(index > previous);
        previous = index;
    }
    assert_eq!(partition.services().last_applied(), previous);
}

fn counter_manager() -> ServiceManager {
    let mut types = ServiceTypeRegistry::new();
    partition_raft::register_builtins(&mut types);
    let mut manager = ServiceManager::new(logger(), types);
    let open = LogEntry {
        term: Term::new(1),
        timestamp: 10,
        kind: EntryKind::OpenSession {
            client: "reorder-client".to_string(),
            service_name: "hits".to_string(),
            service_type: counter::TYPE.to_string(),
            timeout_millis: 60_000,
        },
    };
    manager.apply(Index::new(1), &open).unwrap();
    manager
}

fn counter_value(manager: &mut ServiceManager, session: SessionId) -> i64 {
    let bytes = manager
        .query(session, OperationId::from(counter::GET), Bytes::new())
        .unwrap();
    bincode::deserialize(&bytes).unwrap()
}

#[test]
fn shuffled_entries_apply_only_in_index_order() {
    let session = SessionId::from(Index::new(1));
    let batch: Vec<(Index, LogEntry)> = (2..=40u64)
        .map(|index| {
            let entry = LogEntry {
                term: Term::new(1),
                timestamp: (index * 10) as i64,
                kind: EntryKind::Command {
                    session_id: session,
                    operation: OperationId::from(counter::INCREMENT),
                    operand: encode(&(index as i64)).unwrap(),
                },
            };
            (Index::new(index), entry)
        })
        .collect();

    let mut in_order = counter_manager();
    let mut outputs = BTreeMap::new();
    for (index, entry) in batch.iter() {
        outputs.insert(*index, in_order.apply(*index, entry).unwrap());
    }

    let mut shuffled = batch.clone();
    shuffled.shuffle(&mut StdRng::seed_from_u64(11));
    assert_ne!(shuffled, batch);

    // Anything at or below the last applied index is refused and leaves the state alone.
    let mut manager = counter_manager();
    let mut accepted = vec![];
    let mut rejected = vec![];
    for (index, entry) in shuffled.iter() {
        let last_applied = manager.last_applied();
        let before = counter_value(&mut manager, session);
        match manager.apply(*index, entry) {
            Ok(_) => {
                assert!(*index > last_applied);
                accepted.push(*index);
            }
            Err(e) => {
                assert_eq!(
                    e,
                    OperationError::OutOfOrder {
                        index: *index,
                        last_applied,
                    }
                );
                assert_eq!(manager.last_applied(), last_applied);
                assert_eq!(counter_value(&mut manager, session), before);
                rejected.push(*index);
            }
        }
    }
    assert!(!rejected.is_empty());
    assert!(accepted.windows(2).all(|pair| pair[0] < pair[1]));
    let accepted_sum: i64 = accepted.iter().map(|index| index.as_u64() as i64).sum();
    assert_eq!(counter_value(&mut manager, session), accepted_sum);

    // Sorting the same batch back into index order reproduces the in-order run exactly.
    shuffled.sort_by_key(|(index, _)| *index);
    let mut sorted = counter_manager();
    for (index, entry) in shuffled.iter() {
        assert_eq!(&sorted.apply(*index, entry).unwrap(), &outputs[index]);
    }
    assert_eq!(sorted.last_applied(), in_order.last_applied());
    assert_eq!(counter_value(&mut sorted, session), counter_value(&mut in_order, session));
}
