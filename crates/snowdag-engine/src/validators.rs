//! Validator sets and stake-weighted sampling.

use std::collections::HashMap;

use parking_lot::RwLock;
use snowdag_ids::NodeId;
use snowdag_utils::{sampler, Set};

use crate::{EngineError, Result};

/// A staked validator.
#[derive(Debug, Clone)]
pub struct Validator {
    pub node_id: NodeId,
    pub weight: u64,
}

impl Validator {
    pub fn new(node_id: NodeId, weight: u64) -> Self {
        Self { node_id, weight }
    }
}

/// The sampling interface the engine polls through.
pub trait Validators: Send + Sync {
    /// Draws `k` validators with replacement, weighted by stake.
    fn sample(&self, k: usize) -> Result<Vec<NodeId>>;

    /// Total stake.
    fn total_weight(&self) -> u64;

    /// Stake held by validators we are currently connected to.
    fn connected_weight(&self) -> u64;
}

/// A weighted validator set with connectivity tracking.
#[derive(Default)]
pub struct ValidatorSet {
    validators: RwLock<HashMap<NodeId, Validator>>,
    connected: RwLock<Set<NodeId>>,
}

impl ValidatorSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or updates a validator.
    pub fn set(&self, validator: Validator) {
        self.validators
            .write()
            .insert(validator.node_id, validator);
    }

    pub fn remove(&self, node_id: &NodeId) {
        self.validators.write().remove(node_id);
        self.connected.write().remove(node_id);
    }

    #[must_use]
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.validators.read().contains_key(node_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.read().is_empty()
    }

    #[must_use]
    pub fn weight(&self, node_id: &NodeId) -> u64 {
        self.validators
            .read()
            .get(node_id)
            .map(|v| v.weight)
            .unwrap_or(0)
    }

    pub fn mark_connected(&self, node_id: NodeId) {
        if self.contains(&node_id) {
            self.connected.write().add(node_id);
        }
    }

    pub fn mark_disconnected(&self, node_id: &NodeId) {
        self.connected.write().remove(node_id);
    }

    /// Fraction of total stake held by connected validators.
    #[must_use]
    pub fn percent_connected(&self) -> f64 {
        let total = self.total_weight();
        if total == 0 {
            return 0.0;
        }
        self.connected_weight() as f64 / total as f64
    }
}

impl Validators for ValidatorSet {
    fn sample(&self, k: usize) -> Result<Vec<NodeId>> {
        let validators = self.validators.read();
        let entries: Vec<&Validator> = validators.values().collect();
        let weights: Vec<u64> = entries.iter().map(|v| v.weight).collect();

        let mut rng = rand::thread_rng();
        let indices = sampler::weighted_with_replacement(&mut rng, &weights, k)
            .ok_or(EngineError::EmptyValidatorSet)?;
        Ok(indices.into_iter().map(|i| entries[i].node_id).collect())
    }

    fn total_weight(&self) -> u64 {
        self.validators.read().values().map(|v| v.weight).sum()
    }

    fn connected_weight(&self) -> u64 {
        let validators = self.validators.read();
        self.connected
            .read()
            .iter()
            .map(|id| validators.get(id).map(|v| v.weight).unwrap_or(0))
            .sum()
    }
}
