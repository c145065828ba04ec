//! Stake-weighted sampling.

use rand::Rng;

/// Draws `k` indices from `weights`, with replacement, each draw proportional
/// to its weight. Returns `None` when there is nothing to draw from.
pub fn weighted_with_replacement<R: Rng>(
    rng: &mut R,
    weights: &[u64],
    k: usize,
) -> Option<Vec<usize>> {
    let total: u64 = weights.iter().sum();
    if total == 0 {
        return None;
    }

    // Cumulative weights; a uniform draw in [0, total) lands in one bucket.
    let mut cumulative = Vec::with_capacity(weights.len());
    let mut running = 0u64;
    for &w in weights {
        running += w;
        cumulative.push(running);
    }

    let mut sampled = Vec::with_capacity(k);
    for _ in 0..k {
        let target = rng.gen_range(0..total);
        let idx = cumulative.partition_point(|&c| c <= target);
        sampled.push(idx);
    }
    Some(sampled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn empty_weights_yield_none() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(weighted_with_replacement(&mut rng, &[], 3).is_none());
        assert!(weighted_with_replacement(&mut rng, &[0, 0], 3).is_none());
    }

    #[test]
    fn draws_requested_count() {
        let mut rng = StdRng::seed_from_u64(1);
        let sampled = weighted_with_replacement(&mut rng, &[1, 1, 1], 10).unwrap();
        assert_eq!(sampled.len(), 10);
        assert!(sampled.iter().all(|&i| i < 3));
    }

    #[test]
    fn zero_weight_entries_never_drawn() {
        let mut rng = StdRng::seed_from_u64(2);
        let sampled = weighted_with_replacement(&mut rng, &[0, 5, 0], 100).unwrap();
        assert!(sampled.iter().all(|&i| i == 1));
    }

    #[test]
    fn heavier_entries_drawn_more() {
        let mut rng = StdRng::seed_from_u64(3);
        let sampled = weighted_with_replacement(&mut rng, &[1, 99], 1000).unwrap();
        let heavy = sampled.iter().filter(|&&i| i == 1).count();
        assert!(heavy > 900, "heavy index drawn only {heavy} times");
    }
}
