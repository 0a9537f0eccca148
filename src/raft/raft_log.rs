use crate::commitlog;
use crate::commitlog::Index;
use crate::raft::commit_stream::CommitStreamPublisher;
use crate::raft::{LogEntry, Term};
use std::io;

/// RaftLog is the raft-specific log facade.
///
/// Note: A log entry has 3 states (not modeled directly in code):
/// 1. Persisted - written locally, not yet replicated to majority
/// 2. Committed - written locally, replicated to majority
/// 3. Published - a committed entry that has been handed to the commit stream
///
/// A log entry's state has no global truth. Each member has its own local view of what state the
/// log entry is in.
pub(crate) struct RaftLog<L>
where
    L: commitlog::Log<LogEntry>,
{
    logger: slog::Logger,

    log: L,
    // Last entry discarded by compaction or replaced by an installed snapshot. Index 0 / term 0
    // when nothing has been discarded.
    base: (Index, Term),
    // Metadata about the highest log entry that we've locally written.
    latest_entry: (Index, Term),

    commit_stream: CommitStreamPublisher,
    commit_index: Index,
    published_index: Index,
}

impl<L> RaftLog<L>
where
    L: commitlog::Log<LogEntry>,
{
    /// Wraps `log`, keeping whatever entries it already holds. Nothing is considered committed
    /// until a snapshot is recovered or a leader advances the commit index.
    pub(crate) fn new(logger: slog::Logger, log: L, commit_stream: CommitStreamPublisher) -> Result<Self, io::Error> {
        let first_index = log.first_index();
        let next_index = log.next_index();
        let base = (first_index.minus(1), Term::ZERO);

        let latest_entry = if next_index > first_index {
            let last_index = next_index.minus(1);
            match log.read(last_index)? {
                Some(entry) => (last_index, entry.term),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("last entry {:?} missing from log", last_index),
                    ))
                }
            }
        } else {
            base
        };

        if latest_entry.0 > base.0 {
            slog::info!(
                logger,
                "Recovered log entries {:?} to {:?} (last term {:?})",
                first_index,
                latest_entry.0,
                latest_entry.1
            );
        }

        Ok(RaftLog {
            logger,
            log,
            base,
            latest_entry,
            commit_stream,
            commit_index: base.0,
            published_index: base.0,
        })
    }

    pub(crate) fn latest_entry(&self) -> (Index, Term) {
        self.latest_entry
    }

    pub(crate) fn last_index(&self) -> Index {
        self.latest_entry.0
    }

    /// Lowest index whose entry can still be read.
    pub(crate) fn first_index(&self) -> Index {
        self.base.0.plus(1)
    }

    pub(crate) fn base(&self) -> (Index, Term) {
        self.base
    }

    pub(crate) fn commit_index(&self) -> Index {
        self.commit_index
    }

    pub(crate) fn read(&self, index: Index) -> Result<Option<LogEntry>, io::Error> {
        if index < self.first_index() {
            return Ok(None);
        }
        self.log.read(index)
    }

    /// Term of the entry at `index`, if it is known. The base of the log is known even after its
    /// entry has been compacted away.
    pub(crate) fn term_at(&self, index: Index) -> Result<Option<Term>, io::Error> {
        if index == self.base.0 {
            return Ok(Some(self.base.1));
        }
        if index == self.latest_entry.0 {
            return Ok(Some(self.latest_entry.1));
        }
        Ok(self.read(index)?.map(|entry| entry.term))
    }

    /// Reads `[from, to]`, stopping early at the first missing entry.
    pub(crate) fn read_range(&self, from: Index, to: Index) -> Result<Vec<LogEntry>, io::Error> {
        let mut entries = Vec::new();
        let mut index = from;
        while index <= to {
            match self.read(index)? {
                Some(entry) => entries.push(entry),
                None => break,
            }
            index = index.plus(1);
        }
        Ok(entries)
    }

    pub(crate) fn append(&mut self, entry: LogEntry) -> Result<Index, io::Error> {
        let appended_term = entry.term;
        let appended_index = self.log.append(entry)?;
        // Only update state after log action completes.
        self.latest_entry = (appended_index, appended_term);

        Ok(appended_index)
    }

    /// Remove anything starting at `index` and later. Committed entries are never removed.
    pub(crate) fn truncate(&mut self, index: Index) -> Result<(), io::Error> {
        assert!(
            index > self.commit_index,
            "Can't truncate committed entries. Truncate from {:?}, commit index {:?}",
            index,
            self.commit_index,
        );

        let new_latest_index = index.minus(1);
        let new_latest_term = match self.term_at(new_latest_index)? {
            Some(term) => term,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no entry at {:?} to become the latest entry", new_latest_index),
                ))
            }
        };

        self.log.truncate(index);
        self.latest_entry = (new_latest_index, new_latest_term);
        Ok(())
    }

    /// > If there exists an N such that N > commitIndex, a majority
    /// > of matchIndex[i] ≥ N, and log[N].term == currentTerm:
    /// > set commitIndex = N (§5.3, §5.4).
    ///
    /// Returns true if the commit index moved.
    pub(crate) fn ratchet_fwd_commit_index_if_valid(
        &mut self,
        tentative_new_commit_index: Index,
        current_term: Term,
    ) -> Result<bool, io::Error> {
        if tentative_new_commit_index <= self.commit_index {
            return Ok(false);
        }

        match self.term_at(tentative_new_commit_index)? {
            Some(term) if term == current_term => {
                self.ratchet_fwd_commit_index(tentative_new_commit_index)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Follower path: the leader already established that `new_commit_index` is committed.
    pub(crate) fn ratchet_fwd_commit_index(&mut self, new_commit_index: Index) -> Result<(), io::Error> {
        if new_commit_index <= self.commit_index {
            return Ok(());
        }
        assert!(
            self.latest_entry.0 >= new_commit_index,
            "Can't ratchet commit index forwards past our local log. Expected [latest log] {:?} >= {:?} [input]",
            self.latest_entry.0,
            new_commit_index,
        );

        self.commit_index = new_commit_index;
        self.publish_committed_entries()
    }

    fn publish_committed_entries(&mut self) -> Result<(), io::Error> {
        while self.published_index < self.commit_index {
            let next_index = self.published_index.plus(1);
            match self.read(next_index)? {
                Some(entry) => self.commit_stream.notify_commit(&self.logger, next_index, entry),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("committed entry {:?} missing from log", next_index),
                    ))
                }
            }
            self.published_index = next_index;
        }

        Ok(())
    }

    /// Drops entries up to and including `index`. Only published entries may be compacted.
    pub(crate) fn compact(&mut self, index: Index) -> Result<(), io::Error> {
        let index = index.min(self.published_index);
        if index <= self.base.0 {
            return Ok(());
        }
        let term = match self.term_at(index)? {
            Some(term) => term,
            None => return Ok(()),
        };

        self.log.compact(index);
        self.base = (index, term);
        slog::debug!(self.logger, "Compacted log up to {:?}", index);
        Ok(())
    }

    /// Replaces the whole log with the state captured by a snapshot at `(index, term)`.
    pub(crate) fn reset_to_snapshot(&mut self, index: Index, term: Term) {
        self.log.reset(index.plus(1));
        self.base = (index, term);
        self.latest_entry = (index, term);
        self.commit_index = self.commit_index.max(index);
        self.published_index = index;
        self.commit_stream.notify_restore(&self.logger, index);
    }

    /// Positions the log after a snapshot recovered at startup, without publishing a restore.
    /// Entries following the snapshot are kept when the log still holds them.
    pub(crate) fn recover_from_snapshot(&mut self, index: Index, term: Term) {
        let after = index.plus(1);
        if self.log.first_index() <= after && self.log.next_index() > after {
            self.log.compact(index);
        } else {
            self.log.reset(after);
            self.latest_entry = (index, term);
        }
        if self.latest_entry.0 <= index {
            self.latest_entry = (index, term);
        }
        self.base = (index, term);
        self.commit_index = index;
        self.published_index = index;
    }
}
