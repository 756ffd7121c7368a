//! bot-runner: headless driver for the spin bot core.
//!
//! Reads one JSON command per line on stdin, writes one JSON reply per line
//! on stdout. Stands in for the messaging transport when exercising the core.
//!
//! Usage:
//!   bot-runner --config config/bot.json --db bot.db
//!   bot-runner --open-gate            (every membership check passes)

use anyhow::Result;
use serde_json::{json, Value};
use spinbot_core::{
    bot::SpinBot,
    clock::SystemClock,
    config::BotConfig,
    error::{BotError, BotResult},
    gate::{MembershipChecker, MembershipStatus},
    notify::LogNotifier,
    store::BotStore,
};
use std::collections::HashMap;
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How often abandoned withdrawal dialogues are dropped from memory.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Start {
        user: String,
        referrer: Option<String>,
        handle: Option<String>,
    },
    CheckSubscription { user: String },
    Spin { user: String },
    Bonus { user: String },
    ReferralLink { user: String },
    Profile { user: String },
    Withdraw { user: String },
    Text { user: String, text: String },
    Cancel { user: String },
    AddChannel { user: String, channel: String },
    RemoveChannel { user: String, channel: String },
    Channels { user: String },
    Stats { user: String },
    PendingWithdrawals { user: String },
    /// Script the membership answer the runner's checker gives.
    SetMembership {
        channel: String,
        user: String,
        status: String,
    },
    Quit,
}

/// Membership answers held in memory and scripted over IPC.
/// Pairs never scripted answer `Unknown`, which the gate treats as "not a member".
#[derive(Default)]
struct ScriptedMembership {
    open: bool,
    answers: Mutex<HashMap<(String, String), MembershipStatus>>,
}

impl ScriptedMembership {
    fn set(&self, channel: &str, user: &str, status: MembershipStatus) {
        self.answers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((channel.to_string(), user.to_string()), status);
    }
}

impl MembershipChecker for ScriptedMembership {
    fn check(&self, channel_id: &str, user_id: &str) -> anyhow::Result<MembershipStatus> {
        if self.open {
            return Ok(MembershipStatus::Member);
        }
        let answers = self.answers.lock().unwrap_or_else(|e| e.into_inner());
        Ok(answers
            .get(&(channel_id.to_string(), user_id.to_string()))
            .copied()
            .unwrap_or(MembershipStatus::Unknown))
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let config_path = flag_value(&args, "--config").unwrap_or("config/bot.json");
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let open_gate = args.iter().any(|a| a == "--open-gate");

    let config = BotConfig::load(config_path)?;
    log::info!(
        "bot-runner: started at {} (config={config_path}, db={db}, open_gate={open_gate})",
        chrono::Utc::now().to_rfc3339()
    );

    let store = BotStore::open(db)?;
    store.migrate()?;

    let membership = Arc::new(ScriptedMembership {
        open: open_gate,
        ..ScriptedMembership::default()
    });
    let bot = SpinBot::build(
        config,
        Arc::new(store),
        membership.clone(),
        Arc::new(LogNotifier),
        Arc::new(SystemClock),
    )?;

    run_ipc_loop(&bot, &membership)
}

fn run_ipc_loop(bot: &SpinBot, membership: &ScriptedMembership) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut last_sweep = Instant::now();

    for line in stdin.lock().lines() {
        let line = line?;
        if last_sweep.elapsed() >= SESSION_SWEEP_INTERVAL {
            let dropped = bot.withdrawals().sweep_expired();
            if dropped > 0 {
                log::debug!("bot-runner: swept {dropped} expired withdrawal dialogues");
            }
            last_sweep = Instant::now();
        }
        if line.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&line) {
            Ok(c) => c,
            Err(e) => {
                writeln!(stdout, "{}", json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };
        if let IpcCommand::Quit = cmd {
            break;
        }

        let reply = reply_json(handle_command(bot, membership, cmd));
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_command(bot: &SpinBot, membership: &ScriptedMembership, cmd: IpcCommand) -> BotResult<Value> {
    let value = match cmd {
        IpcCommand::Start { user, referrer, handle } => {
            to_value(bot.handle_start(&user, referrer.as_deref(), handle.as_deref())?)?
        }
        IpcCommand::CheckSubscription { user } => to_value(bot.handle_check_subscription(&user)?)?,
        IpcCommand::Spin { user } => to_value(bot.handle_spin(&user)?)?,
        IpcCommand::Bonus { user } => to_value(bot.handle_daily_bonus(&user)?)?,
        IpcCommand::ReferralLink { user } => json!({ "link": bot.handle_referral_link_request(&user)? }),
        IpcCommand::Profile { user } => to_value(bot.handle_profile(&user)?)?,
        IpcCommand::Withdraw { user } => to_value(bot.handle_withdraw_start(&user)?)?,
        IpcCommand::Text { user, text } => to_value(bot.handle_withdraw_text(&user, &text)?)?,
        IpcCommand::Cancel { user } => json!({ "cancelled": bot.handle_withdraw_cancel(&user) }),
        IpcCommand::AddChannel { user, channel } => {
            json!({ "added": bot.handle_admin_add_channel(&user, &channel)? })
        }
        IpcCommand::RemoveChannel { user, channel } => {
            json!({ "removed": bot.handle_admin_remove_channel(&user, &channel)? })
        }
        IpcCommand::Channels { user } => to_value(bot.handle_admin_channels(&user)?)?,
        IpcCommand::Stats { user } => to_value(bot.handle_admin_stats(&user)?)?,
        IpcCommand::PendingWithdrawals { user } => {
            to_value(bot.handle_admin_pending_withdrawals(&user)?)?
        }
        IpcCommand::SetMembership { channel, user, status } => {
            let status = MembershipStatus::from_chat_status(&status);
            membership.set(&channel, &user, status);
            json!({ "membership": format!("{status:?}") })
        }
        IpcCommand::Quit => Value::Null,
    };
    Ok(value)
}

/// Rejections are normal replies; anything else is an infrastructure error.
fn reply_json(result: BotResult<Value>) -> Value {
    match result {
        Ok(value) => json!({ "ok": value }),
        Err(BotError::Rejected(rejection)) => json!({
            "rejected": { "kind": rejection.kind(), "message": rejection.to_string() }
        }),
        Err(e) => {
            log::error!("bot-runner: command failed: {e}");
            json!({ "error": e.to_string() })
        }
    }
}

fn to_value<T: serde::Serialize>(value: T) -> BotResult<Value> {
    Ok(serde_json::to_value(value)?)
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
