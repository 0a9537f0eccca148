use crate::raft::{MemberId, RoleKind, Term};
use tokio::sync::watch;

#[derive(Clone, Debug, PartialEq)]
pub struct RoleSnapshot {
    pub role: RoleKind,
    pub term: Term,
    pub leader: Option<MemberId>,
}

pub(crate) fn new(initial_state: RoleSnapshot) -> (RoleChangeNotifier, RoleChangeListener) {
    let (snd, rcv) = watch::channel(initial_state);

    (RoleChangeNotifier { snd }, RoleChangeListener { rcv })
}

pub(crate) struct RoleChangeNotifier {
    snd: watch::Sender<RoleSnapshot>,
}

impl RoleChangeNotifier {
    pub(crate) fn notify_new_state(&self, new_state: RoleSnapshot) {
        if *self.snd.borrow() != new_state {
            self.snd.send_replace(new_state);
        }
    }

    pub(crate) fn subscribe(&self) -> RoleChangeListener {
        RoleChangeListener {
            rcv: self.snd.subscribe(),
        }
    }
}

#[derive(Clone)]
pub struct RoleChangeListener {
    rcv: watch::Receiver<RoleSnapshot>,
}

impl RoleChangeListener {
    /// Waits for the next change. `None` once the node is gone.
    pub async fn next(&mut self) -> Option<RoleSnapshot> {
        match self.rcv.changed().await {
            Ok(_) => Some(self.rcv.borrow().clone()),
            Err(_) => None,
        }
    }

    pub fn current(&self) -> RoleSnapshot {
        self.rcv.borrow().clone()
    }
}
