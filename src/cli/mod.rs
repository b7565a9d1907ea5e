use crate::allowlist::AllowlistGate;
use crate::bridge::{Bridge, BridgeContext, Collaborators};
use crate::config::{Config, get_config_path, load_config, save_config};
use crate::context::ChatContextStore;
use crate::decision::{DecisionService, HttpDecisionService};
use crate::gateway::{self, GatewayState};
use crate::host::{NotificationBoard, TokioAlarm, WebhookReplySender};
use crate::message::ConversationId;
use crate::scheduler::{Scheduler, normalized_boundary, time_hint};
use crate::storage::{KvStore, SqliteKv};
use crate::utils::now_ms;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How often the running gateway re-reads the allow-list file.
const ALLOWLIST_RELOAD_SECS: u64 = 10;

#[derive(Parser)]
#[command(name = "chatbridge")]
#[command(about = "Relay chat notifications to a decision service and inject its replies")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Run the bridge: HTTP gateway, dispatch queue and scheduler
    Gateway,
    /// Manage the allow-list
    Allow {
        #[command(subcommand)]
        cmd: AllowCommands,
    },
    /// Forward every conversation regardless of the allow-list
    Turbo {
        #[command(subcommand)]
        cmd: TurboCommands,
    },
    /// Inspect and maintain stored chat contexts
    Contexts {
        #[command(subcommand)]
        cmd: ContextCommands,
    },
    /// Run one scheduled pull for the current time and print what is due
    Pull,
    /// Show bridge status
    Status,
}

#[derive(Subcommand)]
enum AllowCommands {
    /// List allowed contacts and groups
    List,
    AddContact { name: String },
    RemoveContact { name: String },
    AddGroup { name: String },
    RemoveGroup { name: String },
}

#[derive(Subcommand)]
enum TurboCommands {
    On,
    Off,
}

#[derive(Subcommand)]
enum ContextCommands {
    /// List chat contexts, most recent first
    List {
        #[arg(long, short = 'a')]
        all: bool,
    },
    /// Mark a conversation inactive (e.g. personal_Alice)
    Deactivate { id: String },
    /// Remove contexts past the retention window
    Cleanup,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => init(force),
        Commands::Gateway => gateway().await,
        Commands::Allow { cmd } => allow_command(cmd),
        Commands::Turbo { cmd } => turbo_command(cmd),
        Commands::Contexts { cmd } => contexts_command(cmd),
        Commands::Pull => pull().await,
        Commands::Status => status(),
    }
}

fn init(force: bool) -> Result<()> {
    let path = get_config_path()?;
    if path.exists() && !force {
        println!("Config already exists at {} (use --force to overwrite)", path.display());
        return Ok(());
    }
    save_config(&Config::default(), None)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn open_contexts(config: &Config) -> Result<ChatContextStore> {
    let db_path = config.storage.db_path()?;
    let kv = SqliteKv::open(&db_path)
        .with_context(|| format!("Failed to open context store at {}", db_path.display()))?;
    Ok(ChatContextStore::new(Arc::new(kv), config.storage.retention))
}

async fn gateway() -> Result<()> {
    let config = load_config(None)?;

    let db_path = config.storage.db_path()?;
    let kv: Arc<dyn KvStore> = Arc::new(SqliteKv::open(&db_path)?);
    let board = Arc::new(NotificationBoard::new(config.host.notification_ttl_secs));
    let sender = Arc::new(WebhookReplySender::new(
        board.clone(),
        Duration::from_secs(config.service.timeout_secs),
    ));
    let decision = Arc::new(HttpDecisionService::new(&config.service));
    let gate = Arc::new(AllowlistGate::open(AllowlistGate::default_path()?)?);

    let ctx = Arc::new(BridgeContext::new(
        &config,
        Collaborators {
            host: board.clone(),
            sender,
            decision,
            kv,
            gate: gate.clone(),
        },
    ));
    match ctx.contexts.cleanup(now_ms()) {
        Ok(0) => {}
        Ok(n) => info!("retention cleanup removed {} chat contexts", n),
        Err(e) => warn!("retention cleanup failed: {}", e),
    }

    let concurrency = config.queue.concurrency();
    let bridge = Bridge::new(ctx.clone(), concurrency);
    info!(
        "dispatch queue ready ({:?} profile, {} concurrent)",
        config.queue.profile, concurrency
    );

    let scheduler = if config.scheduler.enabled {
        let scheduler = Scheduler::new(ctx, Arc::new(TokioAlarm::new()), &config.scheduler)?;
        scheduler.start();
        Some(scheduler)
    } else {
        info!("scheduler disabled");
        None
    };

    let shutdown = CancellationToken::new();
    spawn_allowlist_watch(gate, shutdown.clone());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            signal_token.cancel();
        }
    });

    let state = GatewayState::new(bridge.clone(), board, config.gateway.secret.clone());
    let result = gateway::serve(
        &config.gateway.host,
        config.gateway.port,
        state,
        shutdown.clone(),
    )
    .await;

    shutdown.cancel();
    if let Some(scheduler) = scheduler {
        scheduler.stop();
    }
    bridge.shutdown();
    result
}

fn spawn_allowlist_watch(gate: Arc<AllowlistGate>, shutdown: CancellationToken) {
    let mut rx = gate.subscribe();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(ALLOWLIST_RELOAD_SECS));
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    if let Err(e) = gate.reload() {
                        warn!("allowlist reload failed: {:#}", e);
                    }
                }
                Ok(()) = rx.changed() => {
                    let (contacts, groups, turbo) = {
                        let s = rx.borrow_and_update();
                        (s.personal.len(), s.groups.len(), s.turbo_mode)
                    };
                    info!(
                        "allowlist updated: {} contacts, {} groups, turbo={}",
                        contacts, groups, turbo
                    );
                }
            }
        }
    });
}

fn allow_command(cmd: AllowCommands) -> Result<()> {
    let gate = AllowlistGate::open(AllowlistGate::default_path()?)?;
    let report = |changed: bool, what: &str, name: &str| {
        if changed {
            println!("{} '{}'", what, name.trim());
        } else {
            println!("No change for '{}'", name.trim());
        }
    };
    match cmd {
        AllowCommands::List => {
            let snap = gate.snapshot();
            println!("Turbo mode: {}", if snap.turbo_mode { "on" } else { "off" });
            println!("Contacts ({}):", snap.personal.len());
            for name in &snap.personal {
                println!("  {}", name);
            }
            println!("Groups ({}):", snap.groups.len());
            for name in &snap.groups {
                println!("  {}", name);
            }
        }
        AllowCommands::AddContact { name } => report(gate.add_contact(&name)?, "Allowed contact", &name),
        AllowCommands::RemoveContact { name } => {
            report(gate.remove_contact(&name)?, "Removed contact", &name);
        }
        AllowCommands::AddGroup { name } => report(gate.add_group(&name)?, "Allowed group", &name),
        AllowCommands::RemoveGroup { name } => {
            report(gate.remove_group(&name)?, "Removed group", &name);
        }
    }
    Ok(())
}

fn turbo_command(cmd: TurboCommands) -> Result<()> {
    let gate = AllowlistGate::open(AllowlistGate::default_path()?)?;
    let enabled = matches!(cmd, TurboCommands::On);
    gate.set_turbo(enabled)?;
    println!("Turbo mode {}", if enabled { "on" } else { "off" });
    Ok(())
}

fn format_local(ms: i64) -> String {
    DateTime::<chrono::Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn contexts_command(cmd: ContextCommands) -> Result<()> {
    let config = load_config(None)?;
    let store = open_contexts(&config)?;
    match cmd {
        ContextCommands::List { all } => {
            let contexts = if all {
                store.list_all()?
            } else {
                store.list_active()?
            };
            if contexts.is_empty() {
                println!("No chat contexts.");
                return Ok(());
            }
            println!("{:<32} {:<8} {:<20} {:<16} Active", "Id", "Kind", "Last sender", "Updated");
            for c in contexts {
                println!(
                    "{:<32} {:<8} {:<20} {:<16} {}",
                    c.conversation_id.as_str(),
                    c.kind.as_str(),
                    c.last_sender,
                    format_local(c.last_update_time),
                    if c.is_active { "yes" } else { "no" }
                );
            }
        }
        ContextCommands::Deactivate { id } => {
            if store.deactivate(&ConversationId::from_raw(id.clone()))? {
                println!("Deactivated {}", id);
            } else {
                println!("No chat context '{}'", id);
            }
        }
        ContextCommands::Cleanup => {
            let removed = store.cleanup(now_ms())?;
            println!("Removed {} chat contexts ({:?} retention)", removed, config.storage.retention);
        }
    }
    Ok(())
}

async fn pull() -> Result<()> {
    let config = load_config(None)?;
    let tz: chrono_tz::Tz = config
        .scheduler
        .timezone
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid timezone '{}'", config.scheduler.timezone))?;
    let interval_ms = i64::try_from(config.scheduler.interval_minutes)?.saturating_mul(60_000);
    let hint = time_hint(normalized_boundary(now_ms(), interval_ms, tz), tz);

    let service = HttpDecisionService::new(&config.service);
    let messages = service.pull_scheduled(Some(&hint)).await?;
    println!("{} message(s) due at {}", messages.len(), hint);
    for m in messages {
        println!(
            "  {} [{}] {}",
            m.chat_id,
            m.message_type.as_deref().unwrap_or("text"),
            m.message
        );
    }
    Ok(())
}

fn status() -> Result<()> {
    let config_path = get_config_path()?;
    let config = load_config(None)?;

    println!("chatbridge v{}", crate::VERSION);
    println!(
        "Config: {} {}",
        config_path.display(),
        if config_path.exists() { "✓" } else { "(defaults)" }
    );
    println!(
        "Decision service: {}{}",
        config.service.base_url, config.service.process_path
    );
    println!(
        "Queue: {:?} profile, {} concurrent",
        config.queue.profile,
        config.queue.concurrency()
    );
    println!(
        "Scheduler: {} (every {} min, {})",
        if config.scheduler.enabled { "enabled" } else { "disabled" },
        config.scheduler.interval_minutes,
        config.scheduler.timezone
    );
    println!(
        "Gateway: {}:{} (signature {})",
        config.gateway.host,
        config.gateway.port,
        if config.gateway.secret.is_some() { "required" } else { "off" }
    );

    let gate = AllowlistGate::open(AllowlistGate::default_path()?)?;
    let snap = gate.snapshot();
    println!(
        "Allow-list: {} contacts, {} groups, turbo {}",
        snap.personal.len(),
        snap.groups.len(),
        if snap.turbo_mode { "on" } else { "off" }
    );

    match open_contexts(&config).and_then(|s| s.list_active().map_err(Into::into)) {
        Ok(active) => println!("Active chat contexts: {}", active.len()),
        Err(e) => println!("Chat contexts: unavailable ({:#})", e),
    }
    Ok(())
}
