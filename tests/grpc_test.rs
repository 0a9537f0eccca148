use bytes::Bytes;
use partition_raft::{
    counter, create_partition, encode, map, ClientError, MemberId, PartitionClient, PartitionConfig, RaftOptions,
    ReadConsistency, RoleKind, ServiceTypeRegistry, StartMode,
};
use slog::Drain;
use std::time::Duration;

fn create_root_logger_for_stdout() -> slog::Logger {
    let decorator = slog_term::PlainDecorator::new(std::io::stdout());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = slog::LevelFilter::new(drain, slog::Level::Info).fuse();

    slog::Logger::root(drain, slog::o!())
}

fn options() -> RaftOptions {
    RaftOptions {
        heartbeat_interval: Some(Duration::from_millis(50)),
        election_timeout_min: Some(Duration::from_millis(300)),
        election_timeout_max: Some(Duration::from_millis(600)),
        append_timeout: Some(Duration::from_millis(150)),
        tick_interval: Some(Duration::from_millis(10)),
        ..RaftOptions::default()
    }
}

struct Node {
    member: MemberId,
    client: PartitionClient,
    _dir: tempfile::TempDir,
}

async fn start_cluster(ports: &[u16]) -> Vec<Node> {
    let logger = create_root_logger_for_stdout();
    let members: Vec<MemberId> = ports.iter().map(|port| MemberId::new("127.0.0.1", *port)).collect();

    let mut nodes = Vec::new();
    for member in members.iter() {
        let dir = tempfile::tempdir().unwrap();
        let mut service_types = ServiceTypeRegistry::new();
        partition_raft::register_builtins(&mut service_types);

        let client = create_partition(PartitionConfig {
            logger: logger.new(slog::o!("Member" => member.to_string())),
            member_id: member.clone(),
            listen_addr: format!("127.0.0.1:{}", member.port()).parse().unwrap(),
            partition_id: 1,
            metadata_directory: dir.path().join("metadata"),
            snapshot_directory: dir.path().join("snapshots"),
            options: options(),
            start_mode: StartMode::Bootstrap(members.clone()),
            service_types,
        })
        .await
        .unwrap();

        nodes.push(Node {
            member: member.clone(),
            client,
            _dir: dir,
        });
    }
    nodes
}

async fn find_leader(nodes: &[Node]) -> usize {
    for _ in 0..100 {
        for (i, node) in nodes.iter().enumerate() {
            if let Ok(status) = node.client.status().await {
                if status.role == RoleKind::Leader {
                    return i;
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("no leader elected");
}

#[tokio::test]
async fn replicates_over_grpc() {
    let nodes = start_cluster(&[47101, 47102, 47103]).await;
    let leader = find_leader(&nodes).await;
    let client = &nodes[leader].client;

    let session = client
        .open_session("grpc-test", "hits", counter::TYPE, Duration::from_secs(60))
        .await
        .unwrap();
    let mut last = Bytes::new();
    for _ in 0..10 {
        last = client
            .execute(session, counter::INCREMENT, encode(&1i64).unwrap())
            .await
            .unwrap();
    }
    assert_eq!(bincode::deserialize::<i64>(&last).unwrap(), 10);

    let read = client
        .query(session, counter::GET, Bytes::new(), ReadConsistency::Linearizable)
        .await
        .unwrap();
    assert_eq!(bincode::deserialize::<i64>(&read).unwrap(), 10);

    // Followers catch up and refuse writes.
    let status = nodes[leader].client.status().await.unwrap();
    for (i, node) in nodes.iter().enumerate().filter(|(i, _)| *i != leader) {
        let mut applied = false;
        for _ in 0..100 {
            if node.client.status().await.unwrap().last_applied >= status.commit_index {
                applied = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(applied, "follower {} never caught up", i);

        let read = node
            .client
            .query(session, counter::GET, Bytes::new(), ReadConsistency::Sequential)
            .await
            .unwrap();
        assert_eq!(bincode::deserialize::<i64>(&read).unwrap(), 10);

        let write = node
            .client
            .execute(session, counter::INCREMENT, encode(&1i64).unwrap())
            .await;
        match write {
            Err(ClientError::NotLeader { leader: hint }) => assert_eq!(hint, Some(nodes[leader].member.clone())),
            other => panic!("expected NotLeader, got {:?}", other),
        }
    }

    for node in nodes.iter() {
        node.client.shutdown().await.unwrap();
    }
}

#[tokio::test]
async fn listeners_receive_map_changes() {
    let nodes = start_cluster(&[47111, 47112, 47113]).await;
    let leader = find_leader(&nodes).await;
    let client = &nodes[leader].client;

    let session = client
        .open_session("grpc-test", "users", map::TYPE, Duration::from_secs(60))
        .await
        .unwrap();
    let mut events = client.session_events(session).await.unwrap();
    client.execute(session, map::LISTEN, Bytes::new()).await.unwrap();
    client
        .execute(session, map::PUT, map::put_operand("alice", b"admin", None).unwrap())
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event_type, map::CHANGE_EVENT);
    let change: map::ChangeEvent = bincode::deserialize(&event.payload).unwrap();
    assert_eq!(change.kind, map::ChangeKind::Inserted);
    assert_eq!(change.key, "alice");

    client.close_session(session).await.unwrap();
    for node in nodes.iter() {
        node.client.shutdown().await.unwrap();
    }
}
