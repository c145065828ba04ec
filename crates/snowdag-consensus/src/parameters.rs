//! Snowball parameters.

use crate::{ConsensusError, Result};

/// Tuning parameters for the snowstorm graph.
#[derive(Debug, Clone)]
pub struct Parameters {
    /// Sample size: validators polled per query.
    pub k: usize,

    /// Quorum threshold: votes required for a successful poll.
    pub alpha: usize,

    /// Consecutive successes to finalize a virtuous transaction.
    pub beta_virtuous: usize,

    /// Consecutive successes to finalize a rogue transaction.
    pub beta_rogue: usize,

    /// Outstanding repolls the engine keeps in flight.
    pub concurrent_repolls: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            k: 20,
            alpha: 15,
            beta_virtuous: 15,
            beta_rogue: 20,
            concurrent_repolls: 4,
        }
    }
}

impl Parameters {
    pub fn new(k: usize, alpha: usize, beta_virtuous: usize, beta_rogue: usize) -> Self {
        Self {
            k,
            alpha,
            beta_virtuous,
            beta_rogue,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(ConsensusError::InvalidParameters(msg));
        if self.k == 0 {
            return fail("k must be positive".into());
        }
        if self.alpha == 0 {
            return fail("alpha must be positive".into());
        }
        if self.alpha > self.k {
            return fail(format!("alpha ({}) must be <= k ({})", self.alpha, self.k));
        }
        if self.beta_virtuous == 0 {
            return fail("beta_virtuous must be positive".into());
        }
        if self.beta_rogue < self.beta_virtuous {
            return fail(format!(
                "beta_rogue ({}) must be >= beta_virtuous ({})",
                self.beta_rogue, self.beta_virtuous
            ));
        }
        if self.concurrent_repolls == 0 {
            return fail("concurrent_repolls must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(Parameters::default().validate().is_ok());
    }

    #[test]
    fn alpha_bounded_by_k() {
        let params = Parameters::new(2, 3, 1, 1);
        assert!(params.validate().is_err());
    }

    #[test]
    fn beta_ordering_enforced() {
        let params = Parameters::new(2, 2, 3, 2);
        assert!(params.validate().is_err());
        assert!(Parameters::new(2, 2, 1, 2).validate().is_ok());
    }

    #[test]
    fn zeroes_rejected() {
        assert!(Parameters::new(0, 0, 0, 0).validate().is_err());
        let params = Parameters {
            concurrent_repolls: 0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
