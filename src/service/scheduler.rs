use crate::service::{ServiceContext, WallClockMillis};
use std::collections::BTreeMap;

/// Handle to cancel a scheduled callback.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduledTaskId(u64);

pub(crate) type ScheduledTask<S> = Box<dyn FnOnce(&mut S, &mut ServiceContext<'_, S>) + Send>;

/// Scheduler holds a service's deferred callbacks, ordered by due time and then by the order they
/// were scheduled in.
///
/// Callbacks run only when the executor applies an entry whose wall clock reached their due time,
/// so every replica runs them at the same point of the log.
pub(crate) struct Scheduler<S> {
    tasks: BTreeMap<(WallClockMillis, u64), ScheduledTask<S>>,
    due_times: BTreeMap<u64, WallClockMillis>,
    next_sequence: u64,
}

impl<S> Scheduler<S> {
    pub(crate) fn new() -> Self {
        Scheduler {
            tasks: BTreeMap::new(),
            due_times: BTreeMap::new(),
            next_sequence: 0,
        }
    }

    pub(crate) fn schedule(&mut self, due: WallClockMillis, task: ScheduledTask<S>) -> ScheduledTaskId {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.tasks.insert((due, sequence), task);
        self.due_times.insert(sequence, due);
        ScheduledTaskId(sequence)
    }

    /// Returns true if the task was still pending.
    pub(crate) fn cancel(&mut self, id: ScheduledTaskId) -> bool {
        match self.due_times.remove(&id.0) {
            Some(due) => self.tasks.remove(&(due, id.0)).is_some(),
            None => false,
        }
    }

    /// Removes and returns the earliest task due at or before `wall_clock`.
    pub(crate) fn pop_due(&mut self, wall_clock: WallClockMillis) -> Option<ScheduledTask<S>> {
        let key = match self.tasks.keys().next() {
            Some(&(due, sequence)) if due <= wall_clock => (due, sequence),
            _ => return None,
        };
        self.due_times.remove(&key.1);
        self.tasks.remove(&key)
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn clear(&mut self) {
        self.tasks.clear();
        self.due_times.clear();
    }
}
