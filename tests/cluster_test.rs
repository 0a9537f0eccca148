mod common;

use bytes::Bytes;
use common::{member, Cluster, ClusterOptions};
use partition_raft::{
    counter, encode, CommandError, EntryKind, MemberId, OperationId, QueryError, ReadConsistency, RoleKind,
    SessionId,
};
use std::time::Duration;

const SESSION_TIMEOUT: Duration = Duration::from_secs(3_600);

fn increment(session: SessionId, delta: i64) -> EntryKind {
    EntryKind::Command {
        session_id: session,
        operation: OperationId::from(counter::INCREMENT),
        operand: encode(&delta).unwrap(),
    }
}

fn counter_value(cluster: &mut Cluster, at: &MemberId, session: SessionId) -> i64 {
    let bytes = cluster
        .partition(at)
        .query(
            session,
            OperationId::from(counter::GET),
            Bytes::new(),
            ReadConsistency::Sequential,
        )
        .unwrap();
    bincode::deserialize(&bytes).unwrap()
}

fn last_applied(cluster: &Cluster, at: &MemberId) -> u64 {
    cluster.partitions[at].services().last_applied().as_u64()
}

#[test]
fn at_most_one_leader_per_term() {
    for seed in 1..=6 {
        let mut cluster = Cluster::bootstrap(
            5,
            ClusterOptions {
                seed,
                drop_rate: 0.1,
                ..ClusterOptions::default()
            },
        );

        // Knock out whoever leads, a few times over. Every step checks the invariants.
        for _ in 0..3 {
            let leader = cluster.wait_for_leader(Duration::from_secs(30));
            cluster.run_for(Duration::from_secs(1));
            cluster.kill(&leader);
            cluster.run_for(Duration::from_secs(2));
            cluster.revive(&leader);
        }
        cluster.run_for(Duration::from_secs(2));

        assert!(!cluster.leaders_by_term().is_empty(), "seed {} elected nobody", seed);
    }
}

#[test]
fn committed_logs_agree() {
    let mut cluster = Cluster::bootstrap(
        3,
        ClusterOptions {
            seed: 11,
            drop_rate: 0.2,
            ..ClusterOptions::default()
        },
    );
    let session = cluster.open_session("hits", counter::TYPE, SESSION_TIMEOUT);

    for round in 0..4 {
        for _ in 0..5 {
            // Lost to a leader change now and then; only agreement matters here.
            let _ = cluster.try_submit(increment(session, 1));
        }
        if round % 2 == 0 {
            let leader = cluster.wait_for_leader(Duration::from_secs(30));
            cluster.kill(&leader);
            cluster.run_for(Duration::from_secs(2));
            cluster.revive(&leader);
        }
    }
    cluster.run_for(Duration::from_secs(3));

    cluster.assert_logs_match();
}

#[test]
fn survives_the_loss_of_its_leader() {
    let mut cluster = Cluster::bootstrap(3, ClusterOptions::default());
    let session = cluster.open_session("hits", counter::TYPE, SESSION_TIMEOUT);

    for _ in 0..5 {
        cluster.submit(increment(session, 1)).unwrap();
    }
    let first_leader = cluster.wait_for_leader(Duration::from_secs(10));
    let old_commit = cluster.partitions[&first_leader].node().commit_index();
    let old_term = cluster.partitions[&first_leader].node().term();
    cluster.kill(&first_leader);

    let second_leader = cluster.wait_for_leader(Duration::from_secs(10));
    assert_ne!(first_leader, second_leader);

    let mut last = Bytes::new();
    for _ in 0..5 {
        last = cluster.submit(increment(session, 1)).unwrap();
    }
    assert_eq!(bincode::deserialize::<i64>(&last).unwrap(), 10);

    // The new leader committed past everything the old one had, in a later term.
    let new_leader = cluster.partitions[&second_leader].node();
    assert!(new_leader.commit_index() > old_commit);
    assert!(new_leader.term() > old_term);

    // The old leader rejoins as a follower and catches up.
    cluster.revive(&first_leader);
    let target = last_applied(&cluster, &second_leader);
    assert!(cluster.run_until(Duration::from_secs(10), |cluster| {
        last_applied(cluster, &first_leader) >= target
    }));
    assert_eq!(cluster.partitions[&first_leader].node().role(), RoleKind::Follower);
    assert_eq!(counter_value(&mut cluster, &first_leader, session), 10);

    // Followers refuse linearizable reads.
    let read = cluster.partition(&first_leader).query(
        session,
        OperationId::from(counter::GET),
        Bytes::new(),
        ReadConsistency::Linearizable,
    );
    assert!(matches!(read, Err(QueryError::NotLeader { .. })));

    cluster.assert_logs_match();
}

#[test]
fn followers_propose_nothing() {
    let mut cluster = Cluster::bootstrap(3, ClusterOptions::default());
    let leader = cluster.wait_for_leader(Duration::from_secs(10));
    let follower = cluster
        .partitions
        .keys()
        .find(|member| **member != leader)
        .cloned()
        .unwrap();

    let result = cluster.partition(&follower).submit(EntryKind::KeepAlive { session_ids: vec![] });
    match result {
        Err(CommandError::NotLeader { leader: hint }) => assert_eq!(hint, Some(leader)),
        other => panic!("expected NotLeader, got {:?}", other.map(|(index, _)| index)),
    }
}

#[test]
fn lagging_follower_catches_up_from_a_snapshot() {
    let mut cluster = Cluster::bootstrap(
        3,
        ClusterOptions {
            snapshot_threshold: Some(5),
            ..ClusterOptions::default()
        },
    );
    let session = cluster.open_session("hits", counter::TYPE, SESSION_TIMEOUT);
    let leader = cluster.wait_for_leader(Duration::from_secs(10));
    let lagging = cluster
        .partitions
        .keys()
        .find(|member| **member != leader)
        .cloned()
        .unwrap();

    cluster.kill(&lagging);
    for _ in 0..20 {
        cluster.submit(increment(session, 2)).unwrap();
    }
    let leader_log_start = cluster.partitions[&leader].node().first_log_index();
    assert!(
        leader_log_start > cluster.partitions[&lagging].node().last_log_index(),
        "the leader no longer has the entries the follower is missing"
    );

    cluster.revive(&lagging);
    let target = last_applied(&cluster, &leader);
    assert!(cluster.run_until(Duration::from_secs(10), |cluster| {
        last_applied(cluster, &lagging) >= target
    }));

    assert_eq!(counter_value(&mut cluster, &lagging, session), 40);
    assert!(cluster.partitions[&lagging].services().has_session(session));

    // And it keeps following afterwards.
    cluster.submit(increment(session, 2)).unwrap();
    let target = last_applied(&cluster, &leader);
    assert!(cluster.run_until(Duration::from_secs(5), |cluster| {
        last_applied(cluster, &lagging) >= target
    }));
    assert_eq!(counter_value(&mut cluster, &lagging, session), 42);
}

#[test]
fn members_join_and_leave() {
    let mut cluster = Cluster::bootstrap(3, ClusterOptions::default());
    let session = cluster.open_session("hits", counter::TYPE, SESSION_TIMEOUT);
    cluster.submit(increment(session, 7)).unwrap();

    let newcomer = member(4);
    cluster.add(newcomer.clone());
    cluster
        .partition(&newcomer)
        .join(vec![member(1), member(2), member(3)])
        .unwrap();

    let admitted = cluster.run_until(Duration::from_secs(10), |cluster| {
        let leader = match cluster.leader() {
            Some(leader) => leader,
            None => return false,
        };
        let in_configuration = cluster.partitions[&leader]
            .node()
            .configuration()
            .map(|configuration| configuration.contains(&newcomer))
            .unwrap_or(false);
        in_configuration && last_applied(cluster, &newcomer) >= last_applied(cluster, &leader)
    });
    assert!(admitted, "{} was never admitted", newcomer);
    assert_eq!(cluster.partitions[&newcomer].node().role(), RoleKind::Follower);
    assert_eq!(counter_value(&mut cluster, &newcomer, session), 7);

    // One of the original followers leaves.
    let leader = cluster.wait_for_leader(Duration::from_secs(10));
    let leaving = (1..=3)
        .map(member)
        .find(|member| *member != leader)
        .unwrap();
    cluster.partition(&leaving).leave().unwrap();

    let left = cluster.run_until(Duration::from_secs(10), |cluster| {
        let leader_knows = cluster
            .leader()
            .and_then(|leader| cluster.partitions[&leader].node().configuration().cloned())
            .map(|configuration| !configuration.contains(&leaving) && configuration.members().len() == 3)
            .unwrap_or(false);
        leader_knows && cluster.partitions[&leaving].node().role() == RoleKind::Inactive
    });
    assert!(left, "{} never left", leaving);

    // The remaining three still make progress.
    let value = cluster.submit(increment(session, 1)).unwrap();
    assert_eq!(bincode::deserialize::<i64>(&value).unwrap(), 8);
}
