//! The bot facade — the entry points the transport layer calls.
//!
//! ORDER OF CHECKS (fixed):
//!   1. Any action other than a withdrawal step abandons an open
//!      withdrawal dialogue.
//!   2. Gameplay actions pass the subscription gate. The gate runs before
//!      any user lock is taken.
//!   3. The engagement engine or withdrawal flow performs the change.
//!   4. Notices go out last, best effort.
//!
//! Nothing here renders text or talks to the network; every handler
//! returns a typed result for the presentation layer.

use crate::{
    admin::{AdminOps, UserStats},
    clock::{Clock, SystemClock},
    config::BotConfig,
    engagement::{BonusOutcome, EngagementEngine, Profile, ReferralOutcome, SpinOutcome, UserRecord},
    error::{BotResult, Rejection},
    gate::{GateStatus, MembershipChecker, SubscriptionGate},
    locks::KeyedLocks,
    notify::{send_best_effort, Notice, Notifier},
    reward::policy_from_config,
    store::BotStore,
    types::{Amount, ChannelId},
    withdrawal::{WithdrawalFlow, WithdrawalReceipt, WithdrawalRequest, WithdrawalStarted, WithdrawalState},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartOutcome {
    pub user: UserRecord,
    /// Present when the start carried a referrer parameter.
    pub referral: Option<ReferralOutcome>,
    pub gate: GateStatus,
}

pub struct SpinBot {
    config: BotConfig,
    store: Arc<BotStore>,
    gate: SubscriptionGate,
    engine: EngagementEngine,
    withdrawals: WithdrawalFlow,
    admin: AdminOps,
    notifier: Arc<dyn Notifier>,
}

impl SpinBot {
    /// Wire every component around one store. The store must be migrated.
    pub fn build(
        config: BotConfig,
        store: Arc<BotStore>,
        checker: Arc<dyn MembershipChecker>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> BotResult<Self> {
        config.validate()?;
        let locks = Arc::new(KeyedLocks::new());
        let gate = SubscriptionGate::new(
            Arc::clone(&store),
            checker,
            Duration::from_millis(config.membership_timeout_ms),
            config.max_pending_membership_checks,
        );
        let engine = EngagementEngine::new(
            &config,
            Arc::clone(&store),
            Arc::clone(&locks),
            Arc::clone(&clock),
            policy_from_config(&config.reward),
        );
        let withdrawals = WithdrawalFlow::new(
            &config,
            Arc::clone(&store),
            Arc::clone(&locks),
            Arc::clone(&clock),
            Arc::clone(&notifier),
        );
        let admin = AdminOps::new(Arc::clone(&store), clock);
        Ok(Self {
            config,
            store,
            gate,
            engine,
            withdrawals,
            admin,
            notifier,
        })
    }

    /// In-memory store, test config and the system clock.
    pub fn build_test(
        checker: Arc<dyn MembershipChecker>,
        notifier: Arc<dyn Notifier>,
    ) -> BotResult<Self> {
        let store = BotStore::in_memory()?;
        store.migrate()?;
        Self::build(
            BotConfig::default_test(),
            Arc::new(store),
            checker,
            notifier,
            Arc::new(SystemClock),
        )
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn store(&self) -> &BotStore {
        &self.store
    }

    pub fn engine(&self) -> &EngagementEngine {
        &self.engine
    }

    pub fn withdrawals(&self) -> &WithdrawalFlow {
        &self.withdrawals
    }

    pub fn gate(&self) -> &SubscriptionGate {
        &self.gate
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        user_id == self.config.admin_id
    }

    // ── User actions ──────────────────────────────────────────────

    /// First contact (or any later /start).
    ///
    /// The referral is captured before the gate, so a newcomer who still
    /// has to subscribe does not lose the link they came through.
    pub fn handle_start(
        &self,
        user_id: &str,
        referrer_id: Option<&str>,
        handle: Option<&str>,
    ) -> BotResult<StartOutcome> {
        self.withdrawals.cancel(user_id);
        self.engine.ensure_user(user_id)?;

        let referral = match referrer_id {
            Some(referrer) => Some(self.engine.register_referral(user_id, referrer)?),
            None => None,
        };
        if let Some(ReferralOutcome::Credited { referrer_id }) = &referral {
            send_best_effort(
                self.notifier.as_ref(),
                referrer_id,
                &Notice::ReferralJoined {
                    new_user: user_id.to_string(),
                    handle: handle.map(str::to_string),
                },
            );
        }

        let gate = self.gate.evaluate(user_id)?;
        let user = self.engine.ensure_user(user_id)?;
        Ok(StartOutcome { user, referral, gate })
    }

    /// Re-run the gate on demand ("I have subscribed").
    pub fn handle_check_subscription(&self, user_id: &str) -> BotResult<GateStatus> {
        self.gate.evaluate(user_id)
    }

    pub fn handle_spin(&self, user_id: &str) -> BotResult<SpinOutcome> {
        self.gated(user_id)?;
        self.engine.spin(user_id)
    }

    pub fn handle_daily_bonus(&self, user_id: &str) -> BotResult<BonusOutcome> {
        self.gated(user_id)?;
        self.engine.claim_daily_bonus(user_id)
    }

    pub fn handle_referral_link_request(&self, user_id: &str) -> BotResult<String> {
        self.gated(user_id)?;
        Ok(self.engine.referral_link(user_id))
    }

    pub fn handle_profile(&self, user_id: &str) -> BotResult<Profile> {
        self.gated(user_id)?;
        self.engine.profile(user_id)
    }

    // ── Withdrawal dialogue ───────────────────────────────────────

    pub fn handle_withdraw_start(&self, user_id: &str) -> BotResult<WithdrawalStarted> {
        self.gate.require(user_id)?;
        self.withdrawals.start(user_id)
    }

    /// Later steps are not re-gated: the dialogue was gated on entry.
    pub fn handle_withdraw_amount(&self, user_id: &str, text: &str) -> BotResult<Amount> {
        self.withdrawals.submit_amount(user_id, text)
    }

    pub fn handle_withdraw_card(&self, user_id: &str, text: &str) -> BotResult<WithdrawalReceipt> {
        self.withdrawals.submit_card(user_id, text)
    }

    pub fn handle_withdraw_cancel(&self, user_id: &str) -> bool {
        self.withdrawals.cancel(user_id)
    }

    /// Route free text to whichever withdrawal step the user is on.
    pub fn handle_withdraw_text(&self, user_id: &str, text: &str) -> BotResult<WithdrawalStep> {
        match self.withdrawals.state(user_id) {
            WithdrawalState::AwaitingAmount => {
                let amount = self.withdrawals.submit_amount(user_id, text)?;
                Ok(WithdrawalStep::AmountAccepted { amount })
            }
            WithdrawalState::AwaitingCard { .. } => {
                Ok(WithdrawalStep::Committed(self.withdrawals.submit_card(user_id, text)?))
            }
            WithdrawalState::Idle => Err(Rejection::NoWithdrawalInProgress.into()),
        }
    }

    // ── Admin ─────────────────────────────────────────────────────

    pub fn handle_admin_add_channel(&self, caller: &str, channel_id: &str) -> BotResult<bool> {
        self.admin_only(caller)?;
        self.admin.add_channel(channel_id)
    }

    pub fn handle_admin_remove_channel(&self, caller: &str, channel_id: &str) -> BotResult<bool> {
        self.admin_only(caller)?;
        self.admin.remove_channel(channel_id)
    }

    pub fn handle_admin_channels(&self, caller: &str) -> BotResult<Vec<ChannelId>> {
        self.admin_only(caller)?;
        self.admin.channels()
    }

    pub fn handle_admin_stats(&self, caller: &str) -> BotResult<Vec<UserStats>> {
        self.admin_only(caller)?;
        self.admin.statistics()
    }

    pub fn handle_admin_pending_withdrawals(&self, caller: &str) -> BotResult<Vec<WithdrawalRequest>> {
        self.admin_only(caller)?;
        self.admin.pending_withdrawals()
    }

    fn gated(&self, user_id: &str) -> BotResult<()> {
        self.withdrawals.cancel(user_id);
        self.gate.require(user_id)
    }

    fn admin_only(&self, caller: &str) -> BotResult<()> {
        if self.is_admin(caller) {
            Ok(())
        } else {
            log::warn!("admin: rejected admin action from {caller}");
            Err(Rejection::NotAdmin.into())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum WithdrawalStep {
    AmountAccepted { amount: Amount },
    Committed(WithdrawalReceipt),
}
