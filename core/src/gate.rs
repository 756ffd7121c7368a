//! Subscription gate — every gameplay action must pass it first.
//!
//! The gate is the AND over all gated channels, in channel order, of an
//! external membership predicate. It fails closed: a check that errors,
//! answers "unknown" or exceeds its time budget counts as not subscribed.
//!
//! Membership checks are network calls. They run on their own worker
//! thread with a deadline and are never made while a user lock is held.
//! A check that outlives its deadline keeps its worker until the transport
//! returns, so the number of workers alive at once is capped; past the cap
//! checks fail closed without spawning.

use crate::{
    error::{BotResult, Rejection},
    store::BotStore,
    types::ChannelId,
};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Member,
    NotMember,
    Unknown,
}

impl MembershipStatus {
    /// Map a platform chat-member status string.
    /// Owners and admins count as members; left, kicked and restricted do not.
    pub fn from_chat_status(status: &str) -> Self {
        match status {
            "member" | "administrator" | "creator" => Self::Member,
            "left" | "kicked" | "restricted" => Self::NotMember,
            _ => Self::Unknown,
        }
    }
}

/// The external "is this user in this channel" call.
pub trait MembershipChecker: Send + Sync {
    fn check(&self, channel_id: &str, user_id: &str) -> anyhow::Result<MembershipStatus>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum GateStatus {
    Satisfied,
    /// First channel, in gate order, the user is not (provably) a member of.
    Missing { channel: ChannelId },
}

impl GateStatus {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }

    pub fn into_result(self) -> Result<(), Rejection> {
        match self {
            Self::Satisfied => Ok(()),
            Self::Missing { channel } => Err(Rejection::GateNotSatisfied { channel }),
        }
    }
}

pub struct SubscriptionGate {
    store: Arc<BotStore>,
    checker: Arc<dyn MembershipChecker>,
    timeout: Duration,
    max_pending: usize,
    pending: Arc<AtomicUsize>,
}

/// Releases a pending-check slot when the worker finishes, however it ends.
struct PendingSlot(Arc<AtomicUsize>);

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SubscriptionGate {
    pub fn new(
        store: Arc<BotStore>,
        checker: Arc<dyn MembershipChecker>,
        timeout: Duration,
        max_pending: usize,
    ) -> Self {
        Self {
            store,
            checker,
            timeout,
            max_pending,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Membership checks whose worker has not returned yet, timed out or not.
    pub fn pending_checks(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Evaluate the gate, short-circuiting on the first failing channel.
    /// Only a failure to read the channel list is an error.
    pub fn evaluate(&self, user_id: &str) -> BotResult<GateStatus> {
        for channel in self.store.channels()? {
            if self.check_one(&channel, user_id) != MembershipStatus::Member {
                log::debug!("gate: user {user_id} not subscribed to {channel}");
                return Ok(GateStatus::Missing { channel });
            }
        }
        Ok(GateStatus::Satisfied)
    }

    pub fn is_satisfied(&self, user_id: &str) -> BotResult<bool> {
        Ok(self.evaluate(user_id)?.is_satisfied())
    }

    /// Evaluate and turn a miss into `Rejection::GateNotSatisfied`.
    pub fn require(&self, user_id: &str) -> BotResult<()> {
        self.evaluate(user_id)?.into_result()?;
        Ok(())
    }

    fn check_one(&self, channel: &str, user_id: &str) -> MembershipStatus {
        if self.pending.fetch_add(1, Ordering::SeqCst) >= self.max_pending {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            log::warn!(
                "gate: {} membership checks still pending, refusing check for {channel}",
                self.max_pending
            );
            return MembershipStatus::Unknown;
        }
        let slot = PendingSlot(Arc::clone(&self.pending));

        let (tx, rx) = mpsc::channel();
        let checker = Arc::clone(&self.checker);
        let (channel_owned, user_owned) = (channel.to_string(), user_id.to_string());
        // A timed-out worker is abandoned but keeps its slot until it returns.
        let spawned = std::thread::Builder::new()
            .name("membership-check".into())
            .spawn(move || {
                let _slot = slot;
                let _ = tx.send(checker.check(&channel_owned, &user_owned));
            });
        if let Err(e) = spawned {
            log::warn!("gate: cannot spawn membership check for {channel}: {e}");
            return MembershipStatus::Unknown;
        }

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                log::warn!("gate: membership check for {channel} failed: {e}");
                MembershipStatus::Unknown
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                log::warn!("gate: membership check for {channel} timed out after {:?}", self.timeout);
                MembershipStatus::Unknown
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                log::warn!("gate: membership check for {channel} aborted");
                MembershipStatus::Unknown
            }
        }
    }
}
