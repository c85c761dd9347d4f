//! myfin
//!
//! Terminal front-end for the MyFin rewards core. Each invocation opens the
//! device store, starts a session (day rollover first), dispatches one event
//! and prints the resulting notices.
//!
//! Usage:
//!   myfin login        --phone <11 digits> --account-name <name> --account-number <10 digits> [--password <pw>]
//!   myfin set-password --phone <11 digits> --verify <last 4> --new <pw> --confirm <pw>
//!   myfin status | mine | tasks | plans | history
//!   myfin task-start <id> | page-hidden | page-visible
//!   myfin claim-free
//!   myfin buy <plan> [--decline]
//!   myfin withdraw <amount>

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;

use myfin_client::{Collaborators, Dispatcher, Event};
use myfin_core::identity::{default_password, Credentials, PasswordCheck};
use myfin_core::{AppConfig, TaskId};
use myfin_state::{login, set_custom_password, StateDb};
use myfin_tasks::TaskState;

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "myfin", version, about = "MyFin NG: tap to mine, complete tasks, withdraw")]
struct Args {
    /// Directory for the device state database.
    #[arg(long, global = true, default_value = "~/.myfin/data")]
    data_dir: PathBuf,

    /// Optional JSON file overriding rewards, plans and tasks.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in (or register) and make this identity the active one.
    Login {
        #[arg(long)]
        phone: String,
        #[arg(long)]
        account_name: String,
        #[arg(long)]
        account_number: String,
        /// Defaults to the last four digits of the phone number.
        #[arg(long)]
        password: Option<String>,
    },

    /// Replace the default password with a custom one.
    SetPassword {
        #[arg(long)]
        phone: String,
        /// Last four digits of the phone number.
        #[arg(long)]
        verify: String,
        #[arg(long)]
        new: String,
        #[arg(long)]
        confirm: String,
    },

    /// Balance, taps and offer status.
    Status,

    /// Tap once.
    Mine,

    /// List tasks and their state.
    Tasks,

    /// Open a task's link and start its dwell timer.
    TaskStart { id: String },

    /// Report that the app lost visibility.
    PageHidden,

    /// Report that the app is visible again.
    PageVisible,

    /// Claim the one-time free taps.
    ClaimFree,

    /// List the plans currently on offer.
    Plans,

    /// Buy a plan through the simulated payment provider.
    Buy {
        plan: String,
        /// Close the payment instead of confirming it.
        #[arg(long, default_value_t = false)]
        decline: bool,
    },

    /// Request a withdrawal in whole Naira.
    Withdraw { amount: i64 },

    /// Transaction history, newest first.
    History {
        /// Print entries as JSON lines.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,myfin=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref()).context("loading config")?;
    config.validate().context("validating config")?;
    let config = Arc::new(config);

    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = Arc::new(StateDb::open(&data_dir).context("opening state database")?);

    let result = run(args.command, db.clone(), config).await;
    db.flush().context("flushing state database")?;
    result
}

async fn run(command: Command, db: Arc<StateDb>, config: Arc<AppConfig>) -> anyhow::Result<()> {
    let now = Utc::now();

    // Commands that work without an active identity.
    match command {
        Command::Login { phone, account_name, account_number, password } => {
            let password = password.unwrap_or_else(|| default_password(&phone).to_string());
            let creds = Credentials { phone, account_name, account_number, password };
            let outcome = login(&db, &creds, now)?;
            println!("Logged in as {}", creds.account_name);
            if outcome.first_login {
                println!("New account created on this device.");
            }
            if outcome.password == PasswordCheck::Default {
                println!("You are using the default password. Run `myfin set-password` to change it.");
            }
            return Ok(());
        }
        Command::SetPassword { phone, verify, new, confirm } => {
            set_custom_password(&db, &phone, &verify, &new, &confirm)?;
            println!("Password updated.");
            return Ok(());
        }
        _ => {}
    }

    if db.current_identity()?.is_none() {
        bail!("no active identity; run `myfin login` first");
    }

    let decline = matches!(command, Command::Buy { decline: true, .. });
    let (mut dispatcher, sender, rx) =
        Dispatcher::open(db.clone(), config.clone(), Collaborators::console(!decline));
    dispatcher.start(now)?;

    let event = match command {
        Command::Status => return print_status(&dispatcher, now),
        Command::Tasks => return print_tasks(&dispatcher),
        Command::Plans => return print_plans(&dispatcher),
        Command::History { json } => return print_history(&dispatcher, json),
        Command::Mine => Event::Mine,
        Command::TaskStart { id } => Event::TriggerTask(TaskId::new(id)),
        Command::PageHidden => Event::PageHidden,
        Command::PageVisible => Event::PageVisible,
        Command::ClaimFree => Event::ClaimFreeGrant,
        Command::Buy { plan, .. } => Event::BuyPlan(plan),
        Command::Withdraw { amount } => Event::RequestWithdrawal(amount),
        Command::Login { .. } | Command::SetPassword { .. } => unreachable!("handled above"),
    };

    sender.send_at(event, now).await?;
    sender.send_at(Event::Shutdown, now).await?;
    let dispatcher = dispatcher.run(rx).await;
    info!(pending = dispatcher.pending_purchase().is_some(), "session finished");
    Ok(())
}

// ── Read-only views ───────────────────────────────────────────────────────────

fn print_status(dispatcher: &Dispatcher, now: chrono::DateTime<Utc>) -> anyhow::Result<()> {
    let engine = dispatcher.engine();
    let snap = engine.snapshot()?;
    let config = engine.config();
    println!("Balance:        ₦{}", snap.balance);
    println!("Taps today:     {}/{} ({} left)", snap.used_today, snap.capacity, snap.remaining);
    println!("Per tap:        ₦{}", config.tap_reward);
    println!(
        "Withdrawal:     {}",
        if snap.balance >= config.withdrawal_threshold {
            "available".to_string()
        } else {
            format!("unlocks at ₦{}", config.withdrawal_threshold)
        }
    );
    println!("Special offer:  {}", if snap.special_claimed { "claimed today" } else { "available" });
    println!("Free taps:      {}", if snap.free_claimed { "claimed" } else { "available" });
    if let Some(left) = engine.new_user_offer_remaining(now)? {
        println!(
            "New-user deal:  ends in {}d {}h {}m",
            left.num_days(),
            left.num_hours() % 24,
            left.num_minutes() % 60
        );
    }
    Ok(())
}

fn print_tasks(dispatcher: &Dispatcher) -> anyhow::Result<()> {
    let verifier = dispatcher.verifier();
    for task in verifier.catalog() {
        let state = match verifier.state(&task.id)? {
            TaskState::NotStarted => "todo",
            TaskState::Armed => "opened",
            TaskState::Away { .. } => "in progress",
            TaskState::Completed => "done",
        };
        let dwell = task.dwell_secs.map(|s| format!("{s}s")).unwrap_or_else(|| "instant".into());
        println!("{:<16} {:<12} {:<8} {}", task.id.as_str(), state, dwell, task.name);
    }
    if verifier.all_completed()? {
        println!("All tasks completed.");
    }
    Ok(())
}

fn print_plans(dispatcher: &Dispatcher) -> anyhow::Result<()> {
    for plan in dispatcher.engine().visible_plans()? {
        println!(
            "{:<16} ₦{:<8} {:>4} taps  {:?}",
            plan.name, plan.price, plan.taps, plan.kind
        );
    }
    Ok(())
}

fn print_history(dispatcher: &Dispatcher, json: bool) -> anyhow::Result<()> {
    let entries = dispatcher.engine().history()?;
    if entries.is_empty() {
        println!("No transactions yet.");
    }
    for entry in entries {
        if json {
            println!("{}", serde_json::to_string(&entry)?);
        } else {
            println!(
                "{:>6}  {}  {:<10} {:>8}  {:?}",
                entry.id.0,
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                format!("{:?}", entry.kind),
                entry.amount,
                entry.status
            );
        }
    }
    Ok(())
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
