use crate::commitlog::Index;
use crate::raft::{AppendResponse, MemberId, Term};
use std::time::{Duration, Instant};

/// What the leader should send to a peer next.
#[derive(Debug, PartialEq)]
pub(crate) enum ReplicationAction {
    Idle,
    /// Send entries `(prev_log_index, last_index]`. Empty when it's a heartbeat.
    Append { prev_log_index: Index, last_index: Index },
    /// The entries the peer needs were compacted away.
    InstallSnapshot,
}

/// ReplicationController is the leader's replication pump for one follower.
pub(crate) struct ReplicationController {
    member: MemberId,

    // > index of the next log entry to send to that server
    // > (initialized to leader last log index + 1)
    next: Index,
    // > index of highest log entry known to be replicated on server
    // > (initialized to 0, increases monotonically)
    matched: Index,

    // One request at a time. A request that doesn't get a reply within the append timeout is
    // considered lost and may be resent.
    in_flight_since: Option<Instant>,
    next_heartbeat: Option<Instant>,
    closed: bool,
}

impl ReplicationController {
    pub(crate) fn new(member: MemberId, next: Index) -> Self {
        ReplicationController {
            member,
            next: next.max(Index::start_index()),
            matched: Index::ZERO,
            in_flight_since: None,
            next_heartbeat: None,
            closed: false,
        }
    }

    pub(crate) fn member(&self) -> &MemberId {
        &self.member
    }

    pub(crate) fn next(&self) -> Index {
        self.next
    }

    pub(crate) fn matched(&self) -> Index {
        self.matched
    }

    /// Called when this node becomes leader.
    pub(crate) fn reset(&mut self, leader_last_index: Index) {
        self.next = leader_last_index.plus(1);
        self.matched = Index::ZERO;
        self.in_flight_since = None;
        self.next_heartbeat = None;
        self.closed = false;
    }

    pub(crate) fn poll(
        &self,
        now: Instant,
        log_first_index: Index,
        log_last_index: Index,
        max_entries: u64,
        append_timeout: Duration,
    ) -> ReplicationAction {
        if self.closed {
            return ReplicationAction::Idle;
        }
        if let Some(sent) = self.in_flight_since {
            if now < sent + append_timeout {
                return ReplicationAction::Idle;
            }
        }

        if self.next < log_first_index {
            return ReplicationAction::InstallSnapshot;
        }

        let has_entries = log_last_index >= self.next;
        let heartbeat_due = self.next_heartbeat.map(|at| now >= at).unwrap_or(true);
        if !has_entries && !heartbeat_due {
            return ReplicationAction::Idle;
        }

        let prev_log_index = self.next.minus(1);
        let last_index = if has_entries {
            log_last_index.min(prev_log_index.plus(max_entries))
        } else {
            prev_log_index
        };
        ReplicationAction::Append {
            prev_log_index,
            last_index,
        }
    }

    pub(crate) fn on_sent(&mut self, now: Instant, heartbeat_interval: Duration) {
        self.in_flight_since = Some(now);
        self.next_heartbeat = Some(now + heartbeat_interval);
    }

    /// Duplicate and reordered responses are harmless: `matched` only moves forward and `next`
    /// never drops below `matched + 1`.
    pub(crate) fn on_append_response(&mut self, response: &AppendResponse) {
        self.in_flight_since = None;

        if response.success {
            self.matched = self.matched.max(response.match_index);
            self.next = self.next.max(self.matched.plus(1));
        } else {
            let rewound = self.next.minus(1).min(response.match_index.plus(1));
            self.next = rewound.max(self.matched.plus(1));
        }
    }

    pub(crate) fn on_snapshot_installed(&mut self, snapshot_index: Index) {
        self.in_flight_since = None;
        self.matched = self.matched.max(snapshot_index);
        self.next = self.next.max(self.matched.plus(1));
    }

    pub(crate) fn on_snapshot_failed(&mut self) {
        self.in_flight_since = None;
    }

    /// Discards in-flight state immediately. Safe to call more than once.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.in_flight_since = None;
        self.next_heartbeat = None;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }
}

/// VoteController solicits one peer's vote for the current candidacy.
pub(crate) struct VoteController {
    member: MemberId,
    term: Option<Term>,
    granted: bool,
    in_flight_since: Option<Instant>,
    closed: bool,
}

impl VoteController {
    pub(crate) fn new(member: MemberId) -> Self {
        VoteController {
            member,
            term: None,
            granted: false,
            in_flight_since: None,
            closed: false,
        }
    }

    pub(crate) fn member(&self) -> &MemberId {
        &self.member
    }

    /// Starts soliciting for `term`, forgetting any earlier candidacy.
    pub(crate) fn reset(&mut self, term: Term) {
        self.term = Some(term);
        self.granted = false;
        self.in_flight_since = None;
        self.closed = false;
    }

    /// Returns true if a vote request should be sent now. Requests that got no reply within
    /// `timeout` are retried.
    pub(crate) fn poll(&mut self, now: Instant, term: Term, timeout: Duration) -> bool {
        if self.closed || self.granted || self.term != Some(term) {
            return false;
        }
        if let Some(sent) = self.in_flight_since {
            if now < sent + timeout {
                return false;
            }
        }

        self.in_flight_since = Some(now);
        true
    }

    /// Returns true if this response newly granted the vote.
    pub(crate) fn on_vote_response(&mut self, term: Term, granted: bool) -> bool {
        if self.closed || self.term != Some(term) {
            return false;
        }
        self.in_flight_since = None;
        if granted && !self.granted {
            self.granted = true;
            return true;
        }
        false
    }

    pub(crate) fn is_granted(&self, term: Term) -> bool {
        self.granted && self.term == Some(term)
    }

    /// Discards in-flight state immediately. Safe to call more than once.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.granted = false;
        self.in_flight_since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(300);
    const HEARTBEAT: Duration = Duration::from_millis(100);

    fn peer() -> MemberId {
        MemberId::new("localhost", 7001)
    }

    fn response(success: bool, match_index: u64) -> AppendResponse {
        AppendResponse {
            term: Term::new(1),
            success,
            match_index: Index::new(match_index),
        }
    }

    #[test]
    fn sends_entries_then_waits_for_reply() {
        let now = Instant::now();
        let mut controller = ReplicationController::new(peer(), Index::new(1));

        assert_eq!(
            controller.poll(now, Index::new(1), Index::new(10), 4, TIMEOUT),
            ReplicationAction::Append {
                prev_log_index: Index::new(0),
                last_index: Index::new(4),
            }
        );
        controller.on_sent(now, HEARTBEAT);
        assert_eq!(
            controller.poll(now, Index::new(1), Index::new(10), 4, TIMEOUT),
            ReplicationAction::Idle
        );

        controller.on_append_response(&response(true, 4));
        assert_eq!(controller.matched(), Index::new(4));
        assert_eq!(controller.next(), Index::new(5));
        assert_eq!(
            controller.poll(now, Index::new(1), Index::new(10), 4, TIMEOUT),
            ReplicationAction::Append {
                prev_log_index: Index::new(4),
                last_index: Index::new(8),
            }
        );
    }

    #[test]
    fn lost_request_is_retried_after_timeout() {
        let now = Instant::now();
        let mut controller = ReplicationController::new(peer(), Index::new(3));
        controller.on_sent(now, HEARTBEAT);

        assert_eq!(
            controller.poll(now + TIMEOUT / 2, Index::new(1), Index::new(3), 8, TIMEOUT),
            ReplicationAction::Idle
        );
        assert_ne!(
            controller.poll(now + TIMEOUT, Index::new(1), Index::new(3), 8, TIMEOUT),
            ReplicationAction::Idle
        );
    }

    #[test]
    fn heartbeat_when_caught_up() {
        let now = Instant::now();
        let mut controller = ReplicationController::new(peer(), Index::new(6));
        controller.on_sent(now, HEARTBEAT);
        controller.on_append_response(&response(true, 5));

        assert_eq!(
            controller.poll(now, Index::new(1), Index::new(5), 8, TIMEOUT),
            ReplicationAction::Idle
        );
        assert_eq!(
            controller.poll(now + HEARTBEAT, Index::new(1), Index::new(5), 8, TIMEOUT),
            ReplicationAction::Append {
                prev_log_index: Index::new(5),
                last_index: Index::new(5),
            }
        );
    }

    #[test]
    fn rejection_rewinds_but_never_below_matched() {
        let mut controller = ReplicationController::new(peer(), Index::new(10));
        controller.on_append_response(&response(false, 3));
        assert_eq!(controller.next(), Index::new(4));

        controller.on_append_response(&response(true, 6));
        assert_eq!(controller.next(), Index::new(7));

        // A stale rejection arriving late can't undo the success.
        controller.on_append_response(&response(false, 2));
        assert_eq!(controller.next(), Index::new(7));
        assert_eq!(controller.matched(), Index::new(6));

        // Duplicate success is a no-op.
        controller.on_append_response(&response(true, 6));
        assert_eq!(controller.next(), Index::new(7));
    }

    #[test]
    fn compacted_entries_need_snapshot() {
        let controller = ReplicationController::new(peer(), Index::new(2));
        assert_eq!(
            controller.poll(Instant::now(), Index::new(5), Index::new(9), 8, TIMEOUT),
            ReplicationAction::InstallSnapshot
        );
    }

    #[test]
    fn close_is_idempotent() {
        let now = Instant::now();
        let mut controller = ReplicationController::new(peer(), Index::new(1));
        controller.on_sent(now, HEARTBEAT);
        controller.close();
        controller.close();
        assert!(controller.is_closed());
        assert_eq!(
            controller.poll(now + TIMEOUT * 10, Index::new(1), Index::new(9), 8, TIMEOUT),
            ReplicationAction::Idle
        );
    }

    #[test]
    fn vote_controller_counts_one_grant_per_term() {
        let now = Instant::now();
        let mut controller = VoteController::new(peer());
        controller.reset(Term::new(2));

        assert!(controller.poll(now, Term::new(2), TIMEOUT));
        assert!(!controller.poll(now, Term::new(2), TIMEOUT));

        // Responses for another term are ignored.
        assert!(!controller.on_vote_response(Term::new(1), true));
        assert!(controller.on_vote_response(Term::new(2), true));
        // Duplicates don't count twice.
        assert!(!controller.on_vote_response(Term::new(2), true));
        assert!(controller.is_granted(Term::new(2)));
        assert!(!controller.is_granted(Term::new(3)));
    }

    #[test]
    fn vote_request_retried_after_timeout() {
        let now = Instant::now();
        let mut controller = VoteController::new(peer());
        controller.reset(Term::new(1));
        assert!(controller.poll(now, Term::new(1), TIMEOUT));
        assert!(controller.poll(now + TIMEOUT, Term::new(1), TIMEOUT));
    }

    #[test]
    fn closed_vote_controller_ignores_everything() {
        let mut controller = VoteController::new(peer());
        controller.reset(Term::new(1));
        controller.close();
        controller.close();
        assert!(!controller.poll(Instant::now(), Term::new(1), TIMEOUT));
        assert!(!controller.on_vote_response(Term::new(1), true));
    }
}
