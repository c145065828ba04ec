//! Outstanding poll tracking.

use std::collections::HashMap;

use snowdag_ids::{Id, NodeId};
use snowdag_utils::Bag;

/// One outstanding poll: the validators still owing a reply and the votes
/// collected so far. A validator sampled more than once carries its full
/// multiplicity when it answers.
#[derive(Debug)]
struct Poll {
    polled: Bag<NodeId>,
    votes: Bag<Id>,
}

/// The set of outstanding polls, keyed by request id.
#[derive(Debug, Default)]
pub struct PollSet {
    polls: HashMap<u32, Poll>,
}

impl PollSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.polls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }

    /// Opens a poll against the sampled validator bag. Returns false when
    /// the request id is already taken.
    pub fn add(&mut self, request_id: u32, polled: Bag<NodeId>) -> bool {
        if self.polls.contains_key(&request_id) {
            return false;
        }
        self.polls.insert(
            request_id,
            Poll {
                polled,
                votes: Bag::new(),
            },
        );
        true
    }

    /// Records a reply. Each voted id is counted once per time the validator
    /// was sampled. Returns the final vote bag when the poll completes.
    pub fn vote(&mut self, request_id: u32, node_id: &NodeId, votes: Vec<Id>) -> Option<Bag<Id>> {
        let poll = self.polls.get_mut(&request_id)?;
        let count = poll.polled.count(node_id);
        if count == 0 {
            // Not sampled for this request, or already answered.
            return None;
        }
        poll.polled.remove(node_id);
        for vote in votes {
            poll.votes.add_count(vote, count);
        }
        self.finish_if_done(request_id)
    }

    /// Records a failed query; the validator's weight is simply lost.
    /// Returns the final vote bag when the poll completes.
    pub fn drop(&mut self, request_id: u32, node_id: &NodeId) -> Option<Bag<Id>> {
        let poll = self.polls.get_mut(&request_id)?;
        poll.polled.remove(node_id);
        self.finish_if_done(request_id)
    }

    /// Discards every outstanding poll.
    pub fn clear(&mut self) {
        self.polls.clear();
    }

    fn finish_if_done(&mut self, request_id: u32) -> Option<Bag<Id>> {
        if self.polls.get(&request_id)?.polled.is_empty() {
            return self.polls.remove(&request_id).map(|poll| poll.votes);
        }
        None
    }
}
