//! The outbound message boundary.

use parking_lot::Mutex;
use snowdag_ids::{Id, NodeId};

/// Delivers queries and gossip to the network. The transport is a
/// collaborator; the engine only ever calls these while holding the chain
/// lock, so implementations must not call back into it.
pub trait Sender: Send + Sync {
    /// Sends a vertex to `validators` and asks for their preferences.
    fn push_query(&self, validators: &[NodeId], request_id: u32, vertex_id: Id, vertex_bytes: &[u8]);

    /// Asks `validators` for their preferences on an already-gossiped vertex.
    fn pull_query(&self, validators: &[NodeId], request_id: u32, vertex_id: Id);

    /// Gossips a vertex without expecting responses.
    fn gossip(&self, vertex_id: Id, vertex_bytes: &[u8]);
}

/// A message captured by [`RecordingSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    PushQuery {
        validators: Vec<NodeId>,
        request_id: u32,
        vertex_id: Id,
    },
    PullQuery {
        validators: Vec<NodeId>,
        request_id: u32,
        vertex_id: Id,
    },
    Gossip {
        vertex_id: Id,
    },
}

/// A sender that records everything it is asked to send. Test double.
#[derive(Debug, Default)]
pub struct RecordingSender {
    messages: Mutex<Vec<SentMessage>>,
}

impl RecordingSender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<SentMessage> {
        std::mem::take(&mut self.messages.lock())
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl Sender for RecordingSender {
    fn push_query(
        &self,
        validators: &[NodeId],
        request_id: u32,
        vertex_id: Id,
        _vertex_bytes: &[u8],
    ) {
        self.messages.lock().push(SentMessage::PushQuery {
            validators: validators.to_vec(),
            request_id,
            vertex_id,
        });
    }

    fn pull_query(&self, validators: &[NodeId], request_id: u32, vertex_id: Id) {
        self.messages.lock().push(SentMessage::PullQuery {
            validators: validators.to_vec(),
            request_id,
            vertex_id,
        });
    }

    fn gossip(&self, vertex_id: Id, _vertex_bytes: &[u8]) {
        self.messages.lock().push(SentMessage::Gossip { vertex_id });
    }
}
