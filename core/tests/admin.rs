//! Admin operations: channel list, statistics, authorization.

use spinbot_core::{
    bot::SpinBot,
    error::Rejection,
    gate::{MembershipChecker, MembershipStatus},
    notify::LogNotifier,
};
use std::sync::Arc;

struct Open;

impl MembershipChecker for Open {
    fn check(&self, _: &str, _: &str) -> anyhow::Result<MembershipStatus> {
        Ok(MembershipStatus::Member)
    }
}

const ADMIN: &str = "1";

fn build() -> SpinBot {
    SpinBot::build_test(Arc::new(Open), Arc::new(LogNotifier)).expect("build test bot")
}

#[test]
fn channels_keep_insertion_order_without_duplicates() {
    let bot = build();
    assert!(bot.handle_admin_add_channel(ADMIN, "@b").unwrap());
    assert!(bot.handle_admin_add_channel(ADMIN, "@a").unwrap());
    assert!(!bot.handle_admin_add_channel(ADMIN, "@b").unwrap());
    assert!(!bot.handle_admin_add_channel(ADMIN, "  @a ").unwrap());
    assert_eq!(bot.handle_admin_channels(ADMIN).unwrap(), ["@b", "@a"]);
}

#[test]
fn remove_is_idempotent() {
    let bot = build();
    bot.handle_admin_add_channel(ADMIN, "@a").unwrap();
    bot.handle_admin_add_channel(ADMIN, "@b").unwrap();
    assert!(bot.handle_admin_remove_channel(ADMIN, "@a").unwrap());
    assert!(!bot.handle_admin_remove_channel(ADMIN, "@a").unwrap());
    assert!(!bot.handle_admin_remove_channel(ADMIN, "@never").unwrap());
    assert_eq!(bot.handle_admin_channels(ADMIN).unwrap(), ["@b"]);

    // Re-adding goes to the back of the list.
    bot.handle_admin_add_channel(ADMIN, "@a").unwrap();
    assert_eq!(bot.handle_admin_channels(ADMIN).unwrap(), ["@b", "@a"]);
}

#[test]
fn blank_channel_is_rejected() {
    let bot = build();
    let err = bot.handle_admin_add_channel(ADMIN, "   ").unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::InvalidChannel));
    assert!(bot.handle_admin_channels(ADMIN).unwrap().is_empty());
}

#[test]
fn non_admin_is_refused() {
    let bot = build();
    for err in [
        bot.handle_admin_add_channel("2", "@a").map(|_| ()).unwrap_err(),
        bot.handle_admin_remove_channel("2", "@a").map(|_| ()).unwrap_err(),
        bot.handle_admin_stats("2").map(|_| ()).unwrap_err(),
        bot.handle_admin_pending_withdrawals("2").map(|_| ()).unwrap_err(),
    ] {
        assert_eq!(err.rejection(), Some(&Rejection::NotAdmin));
    }
    assert!(bot.handle_admin_channels(ADMIN).unwrap().is_empty());
}

#[test]
fn statistics_list_every_user_in_first_contact_order() {
    let bot = build();
    bot.handle_start("30", None, None).unwrap();
    bot.handle_start("10", Some("30"), None).unwrap();
    bot.handle_start("20", Some("30"), None).unwrap();
    bot.handle_spin("10").unwrap();

    let stats = bot.handle_admin_stats(ADMIN).unwrap();
    let rows: Vec<_> = stats
        .iter()
        .map(|s| (s.user_id.as_str(), s.referrals, s.balance))
        .collect();
    assert_eq!(rows, [("30", 2, 0), ("10", 0, 1), ("20", 0, 0)]);
}

#[test]
fn channel_changes_are_audited() {
    let bot = build();
    bot.handle_admin_add_channel(ADMIN, "@a").unwrap();
    bot.handle_admin_add_channel(ADMIN, "@a").unwrap();
    bot.handle_admin_remove_channel(ADMIN, "@a").unwrap();
    assert_eq!(bot.store().event_count("channel_added").unwrap(), 1);
    assert_eq!(bot.store().event_count("channel_removed").unwrap(), 1);
}
