//! Thompson sampling over the arm catalogue.
//!
//! Every `(operation, arm)` pair carries a Beta posterior, starting at the
//! uniform prior `Beta(1, 1)`. Selection draws one sample per arm in catalogue
//! order and keeps the strictly largest, so ties go to the earlier arm.
//!
//! Reproducibility: given the same seed, the same sequence of selections is
//! produced for the same sequence of updates.

use std::collections::{BTreeMap, HashMap};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Beta, Distribution};
use serde::Serialize;

use crate::arms::{Arm, ARMS};

/// Floor applied after every update so parameters stay strictly positive
/// under any discount factor.
pub const MIN_PARAM: f64 = 1e-6;

/// Posterior parameters for one `(operation, arm)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BetaParams {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for BetaParams {
    fn default() -> Self {
        BetaParams {
            alpha: 1.0,
            beta: 1.0,
        }
    }
}

impl BetaParams {
    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }
}

/// Per-run bandit state and its random source.
#[derive(Debug, Clone)]
pub struct ThompsonSampler {
    rng: ChaCha8Rng,
    gamma: f64,
    state: HashMap<(String, &'static str), BetaParams>,
}

impl ThompsonSampler {
    /// Creates a sampler. `seed` makes selection reproducible; `gamma`
    /// outside `(0, 1]` falls back to 1.0 (no forgetting).
    pub fn new(seed: Option<u64>, gamma: f64) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let gamma = if gamma > 0.0 && gamma <= 1.0 { gamma } else { 1.0 };
        ThompsonSampler {
            rng,
            gamma,
            state: HashMap::new(),
        }
    }

    /// Picks the arm to try next for `op`.
    pub fn select(&mut self, op: &str) -> &'static Arm {
        let mut best = &ARMS[0];
        let mut best_theta = f64::NEG_INFINITY;
        for arm in &ARMS {
            let params = self.params(op, arm.name);
            let theta = self.sample(params);
            if theta > best_theta {
                best = arm;
                best_theta = theta;
            }
        }
        best
    }

    /// Applies `alpha' = gamma*alpha + r`, `beta' = gamma*beta + (1 - r)`.
    pub fn update(&mut self, op: &str, arm: &'static str, reward: f64) {
        let reward = reward.clamp(0.0, 1.0);
        let params = self
            .state
            .entry((op.to_string(), arm))
            .or_default();
        params.alpha = (self.gamma * params.alpha + reward).max(MIN_PARAM);
        params.beta = (self.gamma * params.beta + (1.0 - reward)).max(MIN_PARAM);
    }

    pub fn params(&self, op: &str, arm: &'static str) -> BetaParams {
        self.state
            .get(&(op.to_string(), arm))
            .copied()
            .unwrap_or_default()
    }

    /// Posterior of every pair touched so far, grouped by operation.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<&'static str, BetaParams>> {
        let mut grouped: BTreeMap<String, BTreeMap<&'static str, BetaParams>> = BTreeMap::new();
        for ((op, arm), params) in &self.state {
            grouped.entry(op.clone()).or_default().insert(arm, *params);
        }
        grouped
    }

    fn sample(&mut self, params: BetaParams) -> f64 {
        match Beta::new(params.alpha, params.beta) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => params.mean(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_on_the_only_rewarding_arm() {
        let good = ARMS[5].name;
        let mut sampler = ThompsonSampler::new(Some(7), 1.0);
        let mut late_hits = 0;
        for i in 0..2000 {
            let arm = sampler.select("film");
            let reward = if arm.name == good { 1.0 } else { 0.0 };
            sampler.update("film", arm.name, reward);
            if i >= 1000 && arm.name == good {
                late_hits += 1;
            }
        }
        assert!(late_hits > 950, "good arm picked {late_hits}/1000 late rounds");
        assert!(sampler.params("film", good).mean() > 0.99);
    }

    #[test]
    fn same_seed_same_choices() {
        let mut a = ThompsonSampler::new(Some(42), 1.0);
        let mut b = ThompsonSampler::new(Some(42), 1.0);
        for _ in 0..50 {
            let pa = a.select("op");
            let pb = b.select("op");
            assert_eq!(pa.name, pb.name);
            a.update("op", pa.name, 0.0);
            b.update("op", pb.name, 0.0);
        }
    }

    #[test]
    fn updates_follow_discounted_rule() {
        let mut sampler = ThompsonSampler::new(Some(1), 0.5);
        sampler.update("op", "schema_min_known", 1.0);
        let p = sampler.params("op", "schema_min_known");
        assert_eq!(p, BetaParams { alpha: 1.5, beta: 0.5 });

        sampler.update("op", "schema_min_known", 1.0);
        let p = sampler.params("op", "schema_min_known");
        assert_eq!(p, BetaParams { alpha: 1.75, beta: 0.25 });
    }

    #[test]
    fn parameters_stay_positive() {
        let mut sampler = ThompsonSampler::new(Some(3), 0.01);
        for _ in 0..200 {
            sampler.update("op", "schema_min_real", 1.0);
        }
        let p = sampler.params("op", "schema_min_real");
        assert!(p.alpha > 0.0 && p.beta >= MIN_PARAM);
        let _ = sampler.select("op");
    }

    #[test]
    fn invalid_gamma_means_no_forgetting() {
        let mut sampler = ThompsonSampler::new(Some(3), 0.0);
        sampler.update("op", "schema_min_real", 0.0);
        assert_eq!(
            sampler.params("op", "schema_min_real"),
            BetaParams { alpha: 1.0, beta: 2.0 }
        );
        assert!(sampler.snapshot()["op"].contains_key("schema_min_real"));
    }
}
