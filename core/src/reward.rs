//! Spin reward policies.
//!
//! The engine asks the policy how much a single spin pays out. Randomised
//! policies draw from a seeded PCG stream so runs can be reproduced.

use crate::{
    config::{RewardConfig, RewardTier},
    types::Amount,
};
use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::sync::Mutex;

pub trait RewardPolicy: Send + Sync {
    fn next_reward(&self) -> Amount;
}

/// Every spin pays the same amount.
#[derive(Debug, Clone, Copy)]
pub struct FixedReward(pub Amount);

impl RewardPolicy for FixedReward {
    fn next_reward(&self) -> Amount {
        self.0
    }
}

/// Picks a tier with probability proportional to its weight.
pub struct WeightedReward {
    table: Vec<RewardTier>,
    total_weight: u64,
    rng: Mutex<Pcg64Mcg>,
}

impl WeightedReward {
    /// `table` must carry a non-zero total weight; `BotConfig::validate` checks this.
    pub fn new(seed: u64, table: Vec<RewardTier>) -> Self {
        let total_weight = table.iter().map(|t| t.weight as u64).sum();
        Self {
            table,
            total_weight,
            rng: Mutex::new(Pcg64Mcg::seed_from_u64(seed)),
        }
    }
}

impl RewardPolicy for WeightedReward {
    fn next_reward(&self) -> Amount {
        if self.total_weight == 0 {
            return 0;
        }
        let roll = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            rng.next_u64() % self.total_weight
        };
        let mut cumulative = 0u64;
        for tier in &self.table {
            cumulative += tier.weight as u64;
            if roll < cumulative {
                return tier.amount;
            }
        }
        0
    }
}

pub fn policy_from_config(config: &RewardConfig) -> Box<dyn RewardPolicy> {
    match config {
        RewardConfig::Fixed { amount } => Box::new(FixedReward(*amount)),
        RewardConfig::Weighted { seed, table } => Box::new(WeightedReward::new(*seed, table.clone())),
    }
}
