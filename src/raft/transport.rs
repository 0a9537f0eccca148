use crate::raft::{MemberId, RaftRequest};

/// Transport carries requests to other members.
///
/// `send` must not block: the node's loop calls it inline. Whatever the peer answers has to be
/// fed back through `RaftNode::handle_response` (the actor does this with a `Response` event).
/// Lost requests need no reporting; controllers resend after their timeout.
pub trait Transport: Send {
    fn send(&mut self, to: &MemberId, request: RaftRequest);
}
