//! Audit events — one per committed state change.
//!
//! RULE: An event is appended only after the mutation it describes has
//! been written. Losing an event never rolls back the mutation.

use crate::{
    error::BotError,
    store::BotStore,
    types::{Amount, ChannelId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Variants are only ever appended — stored payloads depend on the tags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotEvent {
    // ── Engagement ─────────────────────────────────
    SpinUsed {
        user_id: UserId,
        reward: Amount,
        balance: Amount,
        spins_left: Amount,
    },
    BonusClaimed {
        user_id: UserId,
        spins: Amount,
    },
    ReferralCredited {
        user_id: UserId,
        referrer_id: UserId,
    },

    // ── Withdrawal ─────────────────────────────────
    WithdrawalRequested {
        user_id: UserId,
        request_id: String,
        amount: Amount,
        card_last4: String,
    },

    // ── Admin ──────────────────────────────────────
    ChannelAdded {
        channel_id: ChannelId,
    },
    ChannelRemoved {
        channel_id: ChannelId,
    },
}

impl BotEvent {
    /// Stable name stored in the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SpinUsed { .. }            => "spin_used",
            Self::BonusClaimed { .. }        => "bonus_claimed",
            Self::ReferralCredited { .. }    => "referral_credited",
            Self::WithdrawalRequested { .. } => "withdrawal_requested",
            Self::ChannelAdded { .. }        => "channel_added",
            Self::ChannelRemoved { .. }      => "channel_removed",
        }
    }

    /// The user the event belongs to, if any.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::SpinUsed { user_id, .. }
            | Self::BonusClaimed { user_id, .. }
            | Self::ReferralCredited { user_id, .. }
            | Self::WithdrawalRequested { user_id, .. } => Some(user_id),
            Self::ChannelAdded { .. } | Self::ChannelRemoved { .. } => None,
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub user_id: Option<UserId>,
    pub event_type: String,
    pub payload: String, // JSON-serialized BotEvent
    pub created_at: DateTime<Utc>,
}

impl EventLogEntry {
    pub fn new(event: &BotEvent, at: DateTime<Utc>) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: None,
            user_id: event.user_id().map(str::to_string),
            event_type: event.type_name().to_string(),
            payload: serde_json::to_string(event)?,
            created_at: at,
        })
    }

    pub fn decode(&self) -> Result<BotEvent, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// Append an event, logging instead of failing: the change it describes
/// is already committed.
pub fn record(store: &BotStore, event: &BotEvent, at: DateTime<Utc>) {
    let appended = EventLogEntry::new(event, at)
        .map_err(BotError::from)
        .and_then(|entry| store.append_event(&entry));
    if let Err(e) = appended {
        log::warn!("event: failed to append {}: {e}", event.type_name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trips_with_stable_tag() {
        let event = BotEvent::WithdrawalRequested {
            user_id: "42".into(),
            request_id: "r-1".into(),
            amount: 120_000,
            card_last4: "5678".into(),
        };
        let entry = EventLogEntry::new(&event, Utc::now()).unwrap();
        assert_eq!(entry.event_type, "withdrawal_requested");
        assert_eq!(entry.user_id.as_deref(), Some("42"));
        assert!(entry.payload.contains("\"type\":\"withdrawal_requested\""));
        assert_eq!(entry.decode().unwrap(), event);
    }

    #[test]
    fn channel_events_have_no_user() {
        let event = BotEvent::ChannelAdded { channel_id: "@news".into() };
        assert_eq!(event.user_id(), None);
    }
}
