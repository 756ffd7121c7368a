//! Record store contract: lookup-or-create, full overwrite, scans, durability.

use chrono::{TimeZone, Utc};
use spinbot_core::{
    bot::SpinBot,
    clock::SystemClock,
    config::BotConfig,
    engagement::UserRecord,
    error::BotError,
    gate::{MembershipChecker, MembershipStatus},
    notify::LogNotifier,
    store::BotStore,
};
use std::sync::Arc;

struct Open;

impl MembershipChecker for Open {
    fn check(&self, _: &str, _: &str) -> anyhow::Result<MembershipStatus> {
        Ok(MembershipStatus::Member)
    }
}

fn store() -> BotStore {
    let store = BotStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

#[test]
fn get_or_create_is_stable() {
    let store = store();
    let first = store.get_or_create_user("u1", 1).unwrap();
    assert_eq!(first, UserRecord::fresh(1));

    let mut changed = first.clone();
    changed.balance = 10;
    store.put_user("u1", &changed).unwrap();

    // A second lookup never resets an existing record.
    assert_eq!(store.get_or_create_user("u1", 1).unwrap(), changed);
    assert_eq!(store.user_count().unwrap(), 1);
}

#[test]
fn put_overwrites_every_field() {
    let store = store();
    store.get_or_create_user("u1", 1).unwrap();
    let record = UserRecord {
        balance: 150_000,
        spins: 4,
        last_bonus_time: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
        referrals: 7,
        invited_by: Some("u0".into()),
    };
    store.put_user("u1", &record).unwrap();
    assert_eq!(store.get_user("u1").unwrap(), Some(record));
}

#[test]
fn missing_user_reads_as_none() {
    let store = store();
    assert_eq!(store.get_user("ghost").unwrap(), None);
}

#[test]
fn put_users_writes_all_records() {
    let store = store();
    let a = UserRecord { referrals: 1, ..UserRecord::fresh(2) };
    let b = UserRecord { invited_by: Some("a".into()), ..UserRecord::fresh(1) };
    store.put_users(&[("a", &a), ("b", &b)]).unwrap();

    let all = store.all_users().unwrap();
    assert_eq!(all, vec![("a".to_string(), a), ("b".to_string(), b)]);
}

/// A referral credit and its `invited_by` mark land together: when the
/// second write fails the first one is rolled back.
#[test]
fn put_users_is_all_or_nothing() {
    let store = store();
    let before = store.get_or_create_user("referrer", 1).unwrap();

    let credited = UserRecord {
        referrals: before.referrals + 1,
        spins: before.spins + 1,
        ..before.clone()
    };
    // Stored as a negative integer, which the balance CHECK refuses.
    let unstorable = UserRecord {
        balance: u64::MAX,
        invited_by: Some("referrer".into()),
        ..UserRecord::fresh(1)
    };

    let err = store
        .put_users(&[("referrer", &credited), ("newcomer", &unstorable)])
        .unwrap_err();
    assert!(matches!(err, BotError::Database(_)));
    assert!(!err.is_rejection());

    assert_eq!(store.get_user("referrer").unwrap(), Some(before));
    assert_eq!(store.get_user("newcomer").unwrap(), None);
}

/// Storage failures surface as infrastructure errors, never as a rejection
/// and never as a silently defaulted record.
#[test]
fn storage_failure_is_not_a_rejection() {
    let bot = SpinBot::build(
        BotConfig::default_test(),
        Arc::new(BotStore::in_memory().unwrap()),
        Arc::new(Open),
        Arc::new(LogNotifier),
        Arc::new(SystemClock),
    )
    .unwrap();

    let err = bot.handle_spin("u1").unwrap_err();
    assert!(!err.is_rejection());
    assert_eq!(err.rejection(), None);
    assert!(matches!(err, BotError::Database(_)));

    let err = bot.engine().spin("u1").unwrap_err();
    assert!(matches!(err, BotError::Database(_)));

    // Once the schema exists, nothing was written on the user's behalf.
    bot.store().migrate().unwrap();
    assert_eq!(bot.store().get_user("u1").unwrap(), None);
    assert_eq!(bot.handle_spin("u1").unwrap().spins_left, 0);
}

#[test]
fn migrate_is_idempotent() {
    let store = store();
    store.add_channel("@a").unwrap();
    store.migrate().unwrap();
    assert_eq!(store.channels().unwrap(), ["@a"]);
}

/// Records and channels survive closing and reopening the file.
#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("bot.db");
    let path = path.to_str().unwrap();

    {
        let store = BotStore::open(path).unwrap();
        store.migrate().unwrap();
        let mut record = store.get_or_create_user("u1", 1).unwrap();
        record.balance = 42;
        store.put_user("u1", &record).unwrap();
        store.add_channel("@news").unwrap();
    }

    let reopened = BotStore::open(path).unwrap();
    reopened.migrate().unwrap();
    assert_eq!(reopened.get_user("u1").unwrap().unwrap().balance, 42);
    assert_eq!(reopened.channels().unwrap(), ["@news"]);

    let second = reopened.reopen().unwrap();
    assert_eq!(second.user_count().unwrap(), 1);
}
