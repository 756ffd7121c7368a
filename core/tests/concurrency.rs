//! Same-user races must never lose an update.

use spinbot_core::{
    bot::SpinBot,
    engagement::{ReferralOutcome, UserRecord},
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

fn build() -> SpinBot {
    let _ = env_logger::builder().is_test(true).try_init();
    SpinBot::build_test(Arc::new(Open), Arc::new(LogNotifier)).expect("build test bot")
}

/// 100 concurrent spins against 100 spins: exactly all of them land.
#[test]
fn hundred_concurrent_spins_lose_nothing() {
    let bot = build();
    let mut seeded = UserRecord::fresh(100);
    seeded.balance = 5;
    bot.store().put_user("42", &seeded).unwrap();

    std::thread::scope(|s| {
        for _ in 0..100 {
            s.spawn(|| bot.handle_spin("42").expect("spin"));
        }
    });

    let after = bot.store().get_user("42").unwrap().unwrap();
    assert_eq!(after.spins, 0);
    assert_eq!(after.balance, 105);
}

/// More spinners than spins: the surplus is rejected, spins never go negative.
#[test]
fn oversubscribed_spins_stop_at_zero() {
    let bot = build();
    bot.store().put_user("42", &UserRecord::fresh(10)).unwrap();

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..40).map(|_| s.spawn(|| bot.handle_spin("42"))).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let ok = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.rejection() == Some(&Rejection::InsufficientSpins)))
        .count();
    assert_eq!(ok, 10);
    assert_eq!(rejected, 30);

    let after = bot.store().get_user("42").unwrap().unwrap();
    assert_eq!((after.spins, after.balance), (0, 10));
}

#[test]
fn concurrent_bonus_claims_grant_once() {
    let bot = build();
    let granted = std::thread::scope(|s| {
        let handles: Vec<_> = (0..20).map(|_| s.spawn(|| bot.handle_daily_bonus("7"))).collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Result::is_ok)
            .count()
    });

    assert_eq!(granted, 1);
    let after = bot.store().get_user("7").unwrap().unwrap();
    assert_eq!(after.spins, 2, "exactly one bonus spin on top of the starting spin");
}

/// Competing referrers for the same newcomer: exactly one wins.
#[test]
fn racing_referrers_credit_exactly_one() {
    let bot = build();
    let outcomes: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let bot = &bot;
                s.spawn(move || {
                    bot.engine()
                        .register_referral("newbie", &format!("ref-{i}"))
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let credited: Vec<_> = outcomes
        .iter()
        .filter_map(|o| match o {
            ReferralOutcome::Credited { referrer_id } => Some(referrer_id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(credited.len(), 1);

    let newbie = bot.store().get_user("newbie").unwrap().unwrap();
    assert_eq!(newbie.invited_by.as_ref(), Some(&credited[0]));
    let total_referrals: u64 = bot
        .handle_admin_stats("1")
        .unwrap()
        .iter()
        .map(|s| s.referrals)
        .sum();
    assert_eq!(total_referrals, 1);
}

/// A user who is both referrer and spinner at once keeps both updates.
#[test]
fn referral_credit_racing_own_spins_keeps_both() {
    let bot = build();
    bot.store().put_user("host", &UserRecord::fresh(50)).unwrap();

    std::thread::scope(|s| {
        for _ in 0..50 {
            s.spawn(|| bot.handle_spin("host").unwrap());
        }
        for i in 0..25 {
            let bot = &bot;
            s.spawn(move || bot.engine().register_referral(&format!("guest-{i}"), "host").unwrap());
        }
    });

    let host = bot.store().get_user("host").unwrap().unwrap();
    assert_eq!(host.balance, 50);
    assert_eq!(host.referrals, 25);
    assert_eq!(host.spins, 25);
}
