//! Admin operations: the gated channel list, statistics and the payout queue.
//! These bypass the subscription gate and never mutate user records.

use crate::{
    clock::Clock,
    error::{BotResult, Rejection},
    event::{self, BotEvent},
    store::BotStore,
    types::{Amount, ChannelId, UserId},
    withdrawal::WithdrawalRequest,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub user_id: UserId,
    pub referrals: Amount,
    pub balance: Amount,
}

pub struct AdminOps {
    store: Arc<BotStore>,
    clock: Arc<dyn Clock>,
}

impl AdminOps {
    pub fn new(store: Arc<BotStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Append a channel to the gate. Idempotent; returns whether it was new.
    pub fn add_channel(&self, channel_id: &str) -> BotResult<bool> {
        let channel_id = normalize_channel(channel_id)?;
        let added = self.store.add_channel(&channel_id)?;
        if added {
            log::info!("admin: channel {channel_id} added to gate");
            self.record(BotEvent::ChannelAdded { channel_id });
        }
        Ok(added)
    }

    /// Remove a channel from the gate. Idempotent; returns whether it was present.
    pub fn remove_channel(&self, channel_id: &str) -> BotResult<bool> {
        let channel_id = normalize_channel(channel_id)?;
        let removed = self.store.remove_channel(&channel_id)?;
        if removed {
            log::info!("admin: channel {channel_id} removed from gate");
            self.record(BotEvent::ChannelRemoved { channel_id });
        }
        Ok(removed)
    }

    pub fn channels(&self) -> BotResult<Vec<ChannelId>> {
        self.store.channels()
    }

    /// Snapshot of every user, in first-contact order.
    pub fn statistics(&self) -> BotResult<Vec<UserStats>> {
        let stats = self
            .store
            .all_users()?
            .into_iter()
            .map(|(user_id, record)| UserStats {
                user_id,
                referrals: record.referrals,
                balance: record.balance,
            })
            .collect();
        Ok(stats)
    }

    pub fn pending_withdrawals(&self) -> BotResult<Vec<WithdrawalRequest>> {
        self.store.pending_withdrawals()
    }

    fn record(&self, event: BotEvent) {
        event::record(&self.store, &event, self.clock.now());
    }
}

fn normalize_channel(channel_id: &str) -> Result<ChannelId, Rejection> {
    let trimmed = channel_id.trim();
    if trimmed.is_empty() {
        return Err(Rejection::InvalidChannel);
    }
    Ok(trimmed.to_string())
}
