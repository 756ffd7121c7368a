//! Engagement core for a subscription-gated spin bot: spins, daily bonus,
//! referrals, withdrawal requests and the admin channel list.

pub mod admin;
pub mod bot;
pub mod clock;
pub mod config;
pub mod engagement;
pub mod error;
pub mod event;
pub mod gate;
pub mod locks;
pub mod notify;
pub mod reward;
pub mod store;
pub mod types;
pub mod withdrawal;
