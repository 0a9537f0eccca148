//! A whole cluster in one thread: partitions wired through an in-memory network that delivers
//! messages in a seeded random order, all driven by one manual clock.
#![allow(dead_code)]

use partition_raft::{
    mocked_clock, CommandResult, EntryKind, FileMetadataStore, InMemoryLog, LogEntry, MemberId, MockClock,
    MockClockController, Partition, RaftNode, RaftNodeConfig, RaftOptions, RaftRequest, RaftResponse, RoleKind,
    ServiceManager, ServiceTypeRegistry, SessionId, SnapshotStore, Term, Transport,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot::error::TryRecvError;

pub const STEP: Duration = Duration::from_millis(25);
pub const BASE_PORT: u16 = 7000;

enum Envelope {
    Request {
        from: MemberId,
        to: MemberId,
        request: RaftRequest,
    },
    Response {
        from: MemberId,
        to: MemberId,
        response: RaftResponse,
    },
}

type Queue = Arc<Mutex<VecDeque<Envelope>>>;

pub struct NetworkTransport {
    me: MemberId,
    queue: Queue,
}

impl Transport for NetworkTransport {
    fn send(&mut self, to: &MemberId, request: RaftRequest) {
        self.queue.lock().unwrap().push_back(Envelope::Request {
            from: self.me.clone(),
            to: to.clone(),
            request,
        });
    }
}

pub type TestPartition = Partition<InMemoryLog<LogEntry>, FileMetadataStore, NetworkTransport>;

pub struct ClusterOptions {
    pub seed: u64,
    pub snapshot_threshold: Option<u64>,
    /// Chance of losing any one message.
    pub drop_rate: f64,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        ClusterOptions {
            seed: 1,
            snapshot_threshold: None,
            drop_rate: 0.0,
        }
    }
}

pub fn member(id: u16) -> MemberId {
    MemberId::new("127.0.0.1", BASE_PORT + id)
}

pub fn logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

pub fn service_types() -> ServiceTypeRegistry {
    let mut types = ServiceTypeRegistry::new();
    partition_raft::register_builtins(&mut types);
    types
}

pub struct Cluster {
    pub partitions: BTreeMap<MemberId, TestPartition>,
    pub clock: MockClockController,
    clock_source: MockClock,
    queue: Queue,
    down: BTreeSet<MemberId>,
    rng: StdRng,
    options: ClusterOptions,
    dirs: BTreeMap<MemberId, tempfile::TempDir>,
    // Invariants checked on every step.
    leaders_by_term: BTreeMap<Term, MemberId>,
    terms: BTreeMap<MemberId, Term>,
}

impl Cluster {
    /// Bootstraps members `1..=size`.
    pub fn bootstrap(size: u16, options: ClusterOptions) -> Self {
        let mut cluster = Cluster::empty(options);
        let members: Vec<MemberId> = (1..=size).map(member).collect();
        for member in members.iter() {
            cluster.add(member.clone());
        }
        for member in members.iter() {
            cluster.partition(member).bootstrap(members.clone()).unwrap();
        }
        cluster
    }

    pub fn empty(options: ClusterOptions) -> Self {
        let (clock_source, clock) = mocked_clock();
        Cluster {
            partitions: BTreeMap::new(),
            clock,
            clock_source,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            down: BTreeSet::new(),
            rng: StdRng::seed_from_u64(options.seed),
            options,
            dirs: BTreeMap::new(),
            leaders_by_term: BTreeMap::new(),
            terms: BTreeMap::new(),
        }
    }

    /// Creates a partition for `member` that hasn't started yet.
    pub fn add(&mut self, member: MemberId) {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger();
        let snapshots = Arc::new(SnapshotStore::open(logger.clone(), dir.path().join("snapshots")).unwrap());
        let metadata = FileMetadataStore::open(logger.clone(), dir.path().join("metadata"), 1, "raft").unwrap();

        let (node, commits) = RaftNode::new(RaftNodeConfig {
            logger: logger.clone(),
            member_id: member.clone(),
            options: RaftOptions::default(),
            metadata,
            log: InMemoryLog::create().unwrap(),
            transport: NetworkTransport {
                me: member.clone(),
                queue: self.queue.clone(),
            },
            clock: Arc::new(self.clock_source.clone()),
            snapshots: snapshots.clone(),
            snapshot_name: "partition-1".to_string(),
            rng_seed: Some(self.options.seed * 1_000 + u64::from(member.port())),
        })
        .unwrap();
        let partition = Partition::new(
            logger.clone(),
            node,
            commits,
            ServiceManager::new(logger, service_types()),
            snapshots,
            "partition-1".to_string(),
            self.options.snapshot_threshold,
        )
        .unwrap();

        self.partitions.insert(member.clone(), partition);
        self.dirs.insert(member, dir);
    }

    pub fn partition(&mut self, member: &MemberId) -> &mut TestPartition {
        self.partitions.get_mut(member).unwrap()
    }

    pub fn kill(&mut self, member: &MemberId) {
        self.down.insert(member.clone());
    }

    pub fn revive(&mut self, member: &MemberId) {
        self.down.remove(member);
    }

    pub fn is_up(&self, member: &MemberId) -> bool {
        !self.down.contains(member)
    }

    pub fn up_members(&self) -> Vec<MemberId> {
        self.partitions
            .keys()
            .filter(|member| self.is_up(member))
            .cloned()
            .collect()
    }

    /// Advances the clock by one step, ticks every live member and delivers every message.
    pub fn step(&mut self) {
        self.clock.advance(STEP);
        for member in self.up_members() {
            self.partition(&member).tick();
        }
        self.deliver_all();
        self.check_invariants();
    }

    pub fn run_for(&mut self, duration: Duration) {
        let steps = duration.as_millis() / STEP.as_millis();
        for _ in 0..steps {
            self.step();
        }
    }

    /// Steps until `condition` holds. Returns false if it didn't within `max`.
    pub fn run_until<F>(&mut self, max: Duration, mut condition: F) -> bool
    where
        F: FnMut(&mut Cluster) -> bool,
    {
        let steps = max.as_millis() / STEP.as_millis();
        for _ in 0..steps {
            if condition(self) {
                return true;
            }
            self.step();
        }
        condition(self)
    }

    /// The live leader with the highest term.
    pub fn leader(&self) -> Option<MemberId> {
        self.partitions
            .iter()
            .filter(|(member, partition)| self.is_up(member) && partition.node().role() == RoleKind::Leader)
            .max_by_key(|(_, partition)| partition.node().term())
            .map(|(member, _)| member.clone())
    }

    pub fn wait_for_leader(&mut self, max: Duration) -> MemberId {
        assert!(self.run_until(max, |cluster| cluster.leader().is_some()), "no leader elected");
        self.leader().unwrap()
    }

    /// Submits through the current leader and steps until the entry is applied there.
    pub fn submit(&mut self, kind: EntryKind) -> CommandResult {
        self.try_submit(kind).expect("command was not applied in time")
    }

    /// Like `submit`, but gives up after ten seconds or if the leader lost the command.
    pub fn try_submit(&mut self, kind: EntryKind) -> Option<CommandResult> {
        let leader = self.wait_for_leader(Duration::from_secs(30));
        let mut applied = match self.partition(&leader).submit(kind) {
            Ok((_, applied)) => applied,
            Err(e) => return Some(Err(e)),
        };
        for _ in 0..400 {
            match applied.try_recv() {
                Ok(result) => return Some(result),
                Err(TryRecvError::Empty) => self.step(),
                Err(TryRecvError::Closed) => return None,
            }
        }
        None
    }

    pub fn open_session(&mut self, service_name: &str, service_type: &str, timeout: Duration) -> SessionId {
        let leader = self.wait_for_leader(Duration::from_secs(10));
        let (session, mut applied) = self
            .partition(&leader)
            .open_session("test-client", service_name, service_type, timeout.as_millis() as u64)
            .unwrap();
        for _ in 0..400 {
            match applied.try_recv() {
                Ok(result) => {
                    result.unwrap();
                    return session;
                }
                Err(TryRecvError::Empty) => self.step(),
                Err(TryRecvError::Closed) => panic!("leader dropped the session"),
            }
        }
        panic!("session was not opened in time");
    }

    fn deliver_all(&mut self) {
        loop {
            let envelope = {
                let mut queue = self.queue.lock().unwrap();
                if queue.is_empty() {
                    return;
                }
                let i = self.rng.gen_range(0..queue.len());
                match queue.swap_remove_back(i) {
                    Some(envelope) => envelope,
                    None => return,
                }
            };
            if self.options.drop_rate > 0.0 && self.rng.gen_bool(self.options.drop_rate) {
                continue;
            }

            match envelope {
                Envelope::Request { from, to, request } => {
                    if !self.is_up(&from) || !self.is_up(&to) || !self.partitions.contains_key(&to) {
                        continue;
                    }
                    let response = self.partition(&to).handle_request(request);
                    self.queue.lock().unwrap().push_back(Envelope::Response {
                        from: to,
                        to: from,
                        response,
                    });
                }
                Envelope::Response { from, to, response } => {
                    if !self.is_up(&from) || !self.is_up(&to) {
                        continue;
                    }
                    self.partition(&to).handle_response(&from, response);
                }
            }
        }
    }

    fn check_invariants(&mut self) {
        for (member, partition) in self.partitions.iter() {
            let term = partition.node().term();

            let previous = self.terms.insert(member.clone(), term).unwrap_or(Term::ZERO);
            assert!(term >= previous, "{} went back from term {:?} to {:?}", member, previous, term);

            if partition.node().role() == RoleKind::Leader {
                let leader = self.leaders_by_term.entry(term).or_insert_with(|| member.clone());
                assert_eq!(leader, member, "two leaders in term {:?}", term);
            }
        }
    }

    /// Every committed entry is the same on every member that still has it.
    pub fn assert_logs_match(&self) {
        let members: Vec<&MemberId> = self.partitions.keys().collect();
        for (i, a) in members.iter().enumerate() {
            for b in members.iter().skip(i + 1) {
                let a_node = self.partitions[*a].node();
                let b_node = self.partitions[*b].node();
                let first = a_node.first_log_index().max(b_node.first_log_index());
                let last = a_node.commit_index().min(b_node.commit_index());

                let mut index = first;
                while index <= last {
                    assert_eq!(
                        a_node.entry(index).unwrap(),
                        b_node.entry(index).unwrap(),
                        "{} and {} disagree at {:?}",
                        a,
                        b,
                        index
                    );
                    index = index.plus(1);
                }
            }
        }
    }

    pub fn leaders_by_term(&self) -> &BTreeMap<Term, MemberId> {
        &self.leaders_by_term
    }
}
