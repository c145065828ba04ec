//! Chain context: identity, epoch schedule, and the clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use snowdag_ids::{Id, NodeId};

/// A source of wall-clock time, injectable for tests.
pub trait Clock: Send + Sync {
    /// Current unix time in seconds.
    fn unix(&self) -> u64;
}

/// The system clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::Release);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn unix(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

/// Where a chain is executing: its identity and its epoch schedule.
///
/// Epoch 0 runs until `epoch_first_transition`; after that, epochs advance
/// every `epoch_duration` seconds.
#[derive(Clone)]
pub struct ChainContext {
    pub chain_id: Id,
    pub node_id: NodeId,
    pub epoch_first_transition: u64,
    pub epoch_duration: u64,
    clock: Arc<dyn Clock>,
}

impl ChainContext {
    pub fn new(
        chain_id: Id,
        node_id: NodeId,
        epoch_first_transition: u64,
        epoch_duration: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            chain_id,
            node_id,
            epoch_first_transition,
            epoch_duration,
            clock,
        }
    }

    /// Current unix time in seconds.
    #[must_use]
    pub fn time(&self) -> u64 {
        self.clock.unix()
    }

    /// The current epoch.
    #[must_use]
    pub fn epoch(&self) -> u32 {
        let now = self.clock.unix();
        if now < self.epoch_first_transition || self.epoch_duration == 0 {
            return 0;
        }
        let elapsed = now - self.epoch_first_transition;
        1 + (elapsed / self.epoch_duration) as u32
    }

    /// The serialization version new values should be written with: 0 before
    /// the first epoch transition, 1 after.
    #[must_use]
    pub fn codec_version(&self) -> u16 {
        if self.clock.unix() < self.epoch_first_transition {
            snowdag_codec::CODEC_VERSION_PRE_FORK
        } else {
            snowdag_codec::CODEC_VERSION_POST_FORK
        }
    }
}
