//! Engagement engine — spins, daily bonus and referrals.
//!
//! RULES:
//!   - Every mutation is read-modify-write under the user's lock:
//!     lock, get_or_create, mutate in memory, put, unlock.
//!   - A rejected action writes nothing.
//!   - Audit events are appended after the write, outside the lock.
//!
//! Callers run the subscription gate before calling in; the engine does
//! not re-check it.

use crate::{
    clock::Clock,
    config::BotConfig,
    error::{BotResult, Rejection},
    event::{self, BotEvent},
    locks::KeyedLocks,
    reward::RewardPolicy,
    store::BotStore,
    types::{Amount, UserId},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub balance: Amount,
    pub spins: Amount,
    pub last_bonus_time: Option<DateTime<Utc>>,
    pub referrals: Amount,
    /// Write-once: set by the first successful referral, never changed after.
    pub invited_by: Option<UserId>,
}

impl UserRecord {
    pub fn fresh(starting_spins: Amount) -> Self {
        Self {
            balance: 0,
            spins: starting_spins,
            last_bonus_time: None,
            referrals: 0,
            invited_by: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpinOutcome {
    pub reward: Amount,
    pub balance: Amount,
    pub spins_left: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BonusOutcome {
    pub spins: Amount,
    pub next_bonus_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReferralOutcome {
    Credited { referrer_id: UserId },
    /// A user cannot refer themselves. Not an error; nothing changes.
    SelfReferralIgnored,
    /// The user already has a referrer.
    AlreadyReferred,
    /// The start parameter was blank.
    InvalidReferrer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub user_id: UserId,
    pub balance: Amount,
    pub spins: Amount,
    pub referrals: Amount,
    pub invited_by: Option<UserId>,
    /// None when the bonus can be claimed right now.
    pub next_bonus_at: Option<DateTime<Utc>>,
}

pub struct EngagementEngine {
    store: Arc<BotStore>,
    locks: Arc<KeyedLocks>,
    clock: Arc<dyn Clock>,
    reward: Box<dyn RewardPolicy>,
    starting_spins: Amount,
    bonus_cooldown: Duration,
    bot_identity: String,
}

impl EngagementEngine {
    pub fn new(
        config: &BotConfig,
        store: Arc<BotStore>,
        locks: Arc<KeyedLocks>,
        clock: Arc<dyn Clock>,
        reward: Box<dyn RewardPolicy>,
    ) -> Self {
        Self {
            store,
            locks,
            clock,
            reward,
            starting_spins: config.starting_spins,
            bonus_cooldown: Duration::seconds(config.bonus_cooldown_secs),
            bot_identity: config.bot_identity.trim_end_matches('/').to_string(),
        }
    }

    /// Lookup-or-create. First contact creates the default record.
    pub fn ensure_user(&self, user_id: &str) -> BotResult<UserRecord> {
        self.store.get_or_create_user(user_id, self.starting_spins)
    }

    /// Spend one spin for a reward drawn from the reward policy.
    pub fn spin(&self, user_id: &str) -> BotResult<SpinOutcome> {
        let outcome = self.locks.with_lock(user_id, || -> BotResult<SpinOutcome> {
            let mut record = self.ensure_user(user_id)?;
            if record.spins == 0 {
                return Err(Rejection::InsufficientSpins.into());
            }
            let reward = self.reward.next_reward();
            record.spins -= 1;
            record.balance = record.balance.saturating_add(reward);
            self.store.put_user(user_id, &record)?;
            Ok(SpinOutcome {
                reward,
                balance: record.balance,
                spins_left: record.spins,
            })
        })?;

        log::debug!(
            "engagement: {user_id} spun for {} (balance={}, spins={})",
            outcome.reward, outcome.balance, outcome.spins_left
        );
        self.record(BotEvent::SpinUsed {
            user_id: user_id.to_string(),
            reward: outcome.reward,
            balance: outcome.balance,
            spins_left: outcome.spins_left,
        });
        Ok(outcome)
    }

    /// Grant one spin once per cooldown window.
    /// Exactly one full window after the last claim is already eligible.
    pub fn claim_daily_bonus(&self, user_id: &str) -> BotResult<BonusOutcome> {
        let (outcome, now) = self.locks.with_lock(user_id, || -> BotResult<_> {
            let now = self.clock.now();
            let mut record = self.ensure_user(user_id)?;
            if let Some(last) = record.last_bonus_time {
                let elapsed = now - last;
                if elapsed < self.bonus_cooldown {
                    let remaining = self.bonus_cooldown - elapsed;
                    return Err(Rejection::BonusOnCooldown {
                        remaining_secs: ceil_secs(remaining),
                    }
                    .into());
                }
            }
            record.spins = record.spins.saturating_add(1);
            record.last_bonus_time = Some(now);
            self.store.put_user(user_id, &record)?;
            Ok((
                BonusOutcome {
                    spins: record.spins,
                    next_bonus_at: now + self.bonus_cooldown,
                },
                now,
            ))
        })?;

        log::debug!("engagement: {user_id} claimed daily bonus at {now}");
        self.record(BotEvent::BonusClaimed {
            user_id: user_id.to_string(),
            spins: outcome.spins,
        });
        Ok(outcome)
    }

    /// Credit `referrer_id` for bringing in `new_user_id`.
    ///
    /// Only applies while the new user has no referrer. Both records are
    /// written in one transaction under both users' locks, so the credit
    /// and the `invited_by` mark land together or not at all.
    pub fn register_referral(&self, new_user_id: &str, referrer_id: &str) -> BotResult<ReferralOutcome> {
        let referrer_id = referrer_id.trim();
        if referrer_id.is_empty() {
            return Ok(ReferralOutcome::InvalidReferrer);
        }
        if referrer_id == new_user_id {
            log::debug!("engagement: {new_user_id} tried to refer themselves, ignored");
            return Ok(ReferralOutcome::SelfReferralIgnored);
        }

        let outcome = self.locks.with_pair(new_user_id, referrer_id, || -> BotResult<_> {
            let mut new_user = self.ensure_user(new_user_id)?;
            if new_user.invited_by.is_some() {
                return Ok(ReferralOutcome::AlreadyReferred);
            }
            let mut referrer = self.ensure_user(referrer_id)?;
            referrer.referrals = referrer.referrals.saturating_add(1);
            referrer.spins = referrer.spins.saturating_add(1);
            new_user.invited_by = Some(referrer_id.to_string());
            self.store
                .put_users(&[(referrer_id, &referrer), (new_user_id, &new_user)])?;
            Ok(ReferralOutcome::Credited {
                referrer_id: referrer_id.to_string(),
            })
        })?;

        if let ReferralOutcome::Credited { .. } = &outcome {
            log::info!("engagement: {referrer_id} credited for referring {new_user_id}");
            self.record(BotEvent::ReferralCredited {
                user_id: new_user_id.to_string(),
                referrer_id: referrer_id.to_string(),
            });
        }
        Ok(outcome)
    }

    /// `<bot-identity>?start=<user>`. Pure; touches nothing.
    pub fn referral_link(&self, user_id: &str) -> String {
        format!("{}?start={}", self.bot_identity, user_id)
    }

    pub fn profile(&self, user_id: &str) -> BotResult<Profile> {
        let record = self.ensure_user(user_id)?;
        let now = self.clock.now();
        let next_bonus_at = record
            .last_bonus_time
            .map(|last| last + self.bonus_cooldown)
            .filter(|at| *at > now);
        Ok(Profile {
            user_id: user_id.to_string(),
            balance: record.balance,
            spins: record.spins,
            referrals: record.referrals,
            invited_by: record.invited_by,
            next_bonus_at,
        })
    }

    fn record(&self, event: BotEvent) {
        event::record(&self.store, &event, self.clock.now());
    }
}

fn ceil_secs(d: Duration) -> i64 {
    (d.num_milliseconds() + 999).div_euclid(1000)
}
