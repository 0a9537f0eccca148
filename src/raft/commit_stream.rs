use crate::commitlog::Index;
use crate::raft::LogEntry;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

pub(crate) struct CommitStreamPublisher {
    sender: mpsc::UnboundedSender<CommitEvent>,
}

/// CommitStream yields committed entries strictly in index order.
pub struct CommitStream {
    receiver: mpsc::UnboundedReceiver<CommitEvent>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommittedEntry {
    pub index: Index,
    pub entry: LogEntry,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CommitEvent {
    Entry(CommittedEntry),
    /// Everything up to and including `index` was replaced by an installed snapshot.
    Restore { index: Index },
}

pub(crate) fn new() -> (CommitStreamPublisher, CommitStream) {
    let (tx, rx) = mpsc::unbounded_channel();

    (CommitStreamPublisher { sender: tx }, CommitStream { receiver: rx })
}

impl CommitStreamPublisher {
    pub(crate) fn notify_commit(&self, logger: &slog::Logger, index: Index, entry: LogEntry) {
        self.publish(logger, CommitEvent::Entry(CommittedEntry { index, entry }));
    }

    pub(crate) fn notify_restore(&self, logger: &slog::Logger, index: Index) {
        self.publish(logger, CommitEvent::Restore { index });
    }

    fn publish(&self, logger: &slog::Logger, event: CommitEvent) {
        if self.sender.send(event).is_err() {
            slog::warn!(logger, "CommitStream has disconnected.");
        }
    }
}

impl CommitStream {
    pub async fn recv(&mut self) -> Option<CommitEvent> {
        self.receiver.recv().await
    }

    /// Returns the next event if one is already buffered.
    pub fn try_next(&mut self) -> Option<CommitEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}
