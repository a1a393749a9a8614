//! Uniform random choice of a backend config from a template's pool.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use parley_types::error::SelectionError;

/// Picks a config name from `pool \ excluded`, uniformly at random.
#[derive(Debug)]
pub struct ConfigSelector {
    rng: StdRng,
}

impl ConfigSelector {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic selector for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Select one name. Duplicate pool entries count once.
    pub fn select(
        &mut self,
        pool: &[String],
        excluded: &[String],
    ) -> Result<String, SelectionError> {
        let mut eligible: Vec<&String> = Vec::with_capacity(pool.len());
        for name in pool {
            if !excluded.contains(name) && !eligible.contains(&name) {
                eligible.push(name);
            }
        }

        eligible
            .choose(&mut self.rng)
            .map(|name| (*name).clone())
            .ok_or(SelectionError::NoEligibleConfig)
    }
}

impl Default for ConfigSelector {
    fn default() -> Self {
        Self::new()
    }
}
