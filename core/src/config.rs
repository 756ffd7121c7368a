//! Bot configuration, loaded from a JSON file.
//! In tests, use `BotConfig::default_test()`.

use crate::{
    error::{BotError, BotResult},
    types::{Amount, UserId},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_WITHDRAWAL: Amount = 100_000;
pub const DEFAULT_BONUS_COOLDOWN_SECS: i64 = 24 * 60 * 60;
/// Longest cooldown or session lifetime accepted: ten years.
pub const MAX_DURATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Public address of the bot, e.g. `https://t.me/spin_bot`.
    pub bot_identity: String,
    pub admin_id: UserId,
    #[serde(default = "default_min_withdrawal")]
    pub min_withdrawal: Amount,
    #[serde(default = "default_starting_spins")]
    pub starting_spins: Amount,
    #[serde(default = "default_bonus_cooldown_secs")]
    pub bonus_cooldown_secs: i64,
    /// Upper bound for a single channel membership check.
    #[serde(default = "default_membership_timeout_ms")]
    pub membership_timeout_ms: u64,
    /// Membership checks allowed to run at once. Further checks fail closed
    /// until a running one returns.
    #[serde(default = "default_max_pending_membership_checks")]
    pub max_pending_membership_checks: usize,
    /// Idle withdrawal dialogues older than this are dropped.
    #[serde(default = "default_withdrawal_session_ttl_secs")]
    pub withdrawal_session_ttl_secs: i64,
    #[serde(default)]
    pub reward: RewardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardConfig {
    Fixed { amount: Amount },
    Weighted { seed: u64, table: Vec<RewardTier> },
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self::Fixed { amount: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RewardTier {
    pub amount: Amount,
    pub weight: u32,
}

fn default_min_withdrawal() -> Amount { DEFAULT_MIN_WITHDRAWAL }
fn default_starting_spins() -> Amount { 1 }
fn default_bonus_cooldown_secs() -> i64 { DEFAULT_BONUS_COOLDOWN_SECS }
fn default_membership_timeout_ms() -> u64 { 3_000 }
fn default_max_pending_membership_checks() -> usize { 16 }
fn default_withdrawal_session_ttl_secs() -> i64 { 600 }

impl BotConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let mut config: BotConfig = serde_json::from_str(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Environment variables win over the file.
    pub fn apply_env(&mut self) {
        if let Ok(admin) = std::env::var("SPINBOT_ADMIN_ID") {
            if !admin.trim().is_empty() {
                self.admin_id = admin.trim().to_string();
            }
        }
        if let Ok(identity) = std::env::var("SPINBOT_BOT_IDENTITY") {
            if !identity.trim().is_empty() {
                self.bot_identity = identity.trim().to_string();
            }
        }
    }

    pub fn validate(&self) -> BotResult<()> {
        if self.bot_identity.trim().is_empty() {
            return Err(BotError::Config("bot_identity is blank".into()));
        }
        if self.admin_id.trim().is_empty() {
            return Err(BotError::Config("admin_id is blank".into()));
        }
        if self.min_withdrawal == 0 {
            return Err(BotError::Config("min_withdrawal must be positive".into()));
        }
        if self.bonus_cooldown_secs < 0 || self.withdrawal_session_ttl_secs <= 0 {
            return Err(BotError::Config("durations must be positive".into()));
        }
        if self.bonus_cooldown_secs > MAX_DURATION_SECS
            || self.withdrawal_session_ttl_secs > MAX_DURATION_SECS
        {
            return Err(BotError::Config(format!(
                "durations must not exceed {MAX_DURATION_SECS}s"
            )));
        }
        if self.max_pending_membership_checks == 0 {
            return Err(BotError::Config("max_pending_membership_checks must be positive".into()));
        }
        if let RewardConfig::Weighted { table, .. } = &self.reward {
            if table.iter().map(|t| t.weight as u64).sum::<u64>() == 0 {
                return Err(BotError::Config("reward table has no weight".into()));
            }
        }
        Ok(())
    }

    /// Defaults used across the test suite: 100000 floor, fixed reward of 1.
    pub fn default_test() -> Self {
        Self {
            bot_identity: "https://t.me/spin_test_bot".into(),
            admin_id: "1".into(),
            min_withdrawal: DEFAULT_MIN_WITHDRAWAL,
            starting_spins: default_starting_spins(),
            bonus_cooldown_secs: DEFAULT_BONUS_COOLDOWN_SECS,
            membership_timeout_ms: 200,
            max_pending_membership_checks: 4,
            withdrawal_session_ttl_secs: default_withdrawal_session_ttl_secs(),
            reward: RewardConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_gets_defaults() {
        let json = r#"{ "bot_identity": "https://t.me/x_bot", "admin_id": "7" }"#;
        let config: BotConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.min_withdrawal, 100_000);
        assert_eq!(config.starting_spins, 1);
        assert_eq!(config.bonus_cooldown_secs, 86_400);
        assert_eq!(config.reward, RewardConfig::Fixed { amount: 1 });
        config.validate().unwrap();
    }

    #[test]
    fn weighted_table_parses_and_rejects_zero_weight() {
        let json = r#"{
            "bot_identity": "https://t.me/x_bot",
            "admin_id": "7",
            "reward": { "kind": "weighted", "seed": 9, "table": [ { "amount": 5, "weight": 0 } ] }
        }"#;
        let config: BotConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config.validate(), Err(BotError::Config(_))));
    }

    #[test]
    fn oversized_durations_are_invalid() {
        let mut config = BotConfig::default_test();
        config.bonus_cooldown_secs = i64::MAX;
        assert!(matches!(config.validate(), Err(BotError::Config(_))));

        let mut config = BotConfig::default_test();
        config.withdrawal_session_ttl_secs = i64::MAX / 1000 + 1;
        assert!(matches!(config.validate(), Err(BotError::Config(_))));

        let mut config = BotConfig::default_test();
        config.bonus_cooldown_secs = MAX_DURATION_SECS;
        config.withdrawal_session_ttl_secs = MAX_DURATION_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_pending_checks_is_invalid() {
        let mut config = BotConfig::default_test();
        config.max_pending_membership_checks = 0;
        assert!(matches!(config.validate(), Err(BotError::Config(_))));
    }

    #[test]
    fn blank_identity_is_invalid() {
        let mut config = BotConfig::default_test();
        config.bot_identity = "  ".into();
        assert!(config.validate().is_err());
    }
}
