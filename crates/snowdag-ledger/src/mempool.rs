//! Transition batching.
//!
//! Issued transitions buffer here until either `batch_size` is reached or
//! `batch_timeout` has elapsed since the first pending item. The buffer
//! never blocks: the driver reads [`Mempool::deadline`] to know when to come
//! back, and a flush that finds the engine busy re-arms the deadline instead
//! of waiting.

use std::time::{Duration, Instant};

use snowdag_consensus::TransitionRef;

/// Transitions per drained batch.
pub const BATCH_SIZE: usize = 30;

/// How long a lone transition waits before being flushed anyway.
pub const BATCH_TIMEOUT: Duration = Duration::from_secs(1);

/// A size-and-deadline bounded transition buffer.
pub struct Mempool {
    transitions: Vec<TransitionRef>,
    deadline: Option<Instant>,
    batch_size: usize,
    batch_timeout: Duration,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new(BATCH_SIZE, BATCH_TIMEOUT)
    }
}

impl Mempool {
    #[must_use]
    pub fn new(batch_size: usize, batch_timeout: Duration) -> Self {
        Self {
            transitions: Vec::new(),
            deadline: None,
            batch_size: batch_size.max(1),
            batch_timeout,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// True when the buffer has reached the batch size.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.transitions.len() >= self.batch_size
    }

    /// When the buffer should be flushed regardless of size.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Buffers a transition. Returns true when the buffer reached the batch
    /// size and should be flushed now.
    pub fn push(&mut self, transition: TransitionRef, now: Instant) -> bool {
        self.transitions.push(transition);
        if self.transitions.len() == 1 {
            self.deadline = Some(now + self.batch_timeout);
        }
        self.transitions.len() >= self.batch_size
    }

    /// True when the deadline has passed with items pending.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) => !self.transitions.is_empty() && now >= deadline,
            None => false,
        }
    }

    /// Drains the buffer and clears the deadline.
    pub fn take(&mut self) -> Vec<TransitionRef> {
        self.deadline = None;
        std::mem::take(&mut self.transitions)
    }

    /// Puts a drained batch back and re-arms the deadline. Used when the
    /// engine could not take the batch.
    pub fn defer(&mut self, transitions: Vec<TransitionRef>, now: Instant) {
        let mut restored = transitions;
        restored.extend(self.transitions.drain(..));
        self.transitions = restored;
        if !self.transitions.is_empty() {
            self.deadline = Some(now + self.batch_timeout);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use snowdag_consensus::choices::Transition;
    use snowdag_consensus::testing::TestTransition;
    use snowdag_ids::Id;

    fn transition(seed: u64) -> TransitionRef {
        Arc::new(TestTransition::new(Id::EMPTY.prefix(&[seed]), vec![]))
    }

    #[test]
    fn fills_to_batch_size() {
        let mut mempool = Mempool::new(3, Duration::from_secs(1));
        let now = Instant::now();
        assert!(!mempool.push(transition(1), now));
        assert!(!mempool.push(transition(2), now));
        assert!(mempool.push(transition(3), now));
        assert_eq!(mempool.take().len(), 3);
        assert!(mempool.deadline().is_none());
    }

    #[test]
    fn deadline_armed_by_first_item() {
        let mut mempool = Mempool::new(10, Duration::from_secs(1));
        let now = Instant::now();
        assert!(mempool.deadline().is_none());

        mempool.push(transition(1), now);
        assert_eq!(mempool.deadline(), Some(now + Duration::from_secs(1)));

        // A second push doesn't move the deadline.
        mempool.push(transition(2), now + Duration::from_millis(500));
        assert_eq!(mempool.deadline(), Some(now + Duration::from_secs(1)));

        assert!(!mempool.is_due(now));
        assert!(mempool.is_due(now + Duration::from_secs(1)));
    }

    #[test]
    fn defer_rearms_and_preserves_order() {
        let mut mempool = Mempool::new(10, Duration::from_secs(1));
        let now = Instant::now();
        let first = transition(1);
        let first_id = first.id();
        mempool.push(first, now);

        let batch = mempool.take();
        assert!(mempool.deadline().is_none());

        // Engine was busy; put it back.
        let later = now + Duration::from_secs(2);
        mempool.push(transition(2), later);
        mempool.defer(batch, later);
        assert_eq!(mempool.len(), 2);
        assert_eq!(mempool.take()[0].id(), first_id);
    }
}
