use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use poise::serenity_prelude as serenity;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Discord bot that verifies members against their Genius.com account
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Surfaces to run; defaults to unified when UNIFIED_MODE=true, else bot
    #[arg(long, value_enum)]
    mode: Option<RunMode>,

    /// Force re-sync of slash commands to all guilds (use when commands aren't showing up)
    #[arg(long, short = 's')]
    sync_commands: bool,

    /// Register commands per-guild instead of globally (faster for testing)
    #[arg(long)]
    guild_commands: bool,

    /// Specific guild ID to sync commands to (for testing)
    #[arg(long)]
    guild_id: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print an argon2 hash for PANEL_PASSWORD_HASH
    HashPassword { password: String },
}

mod commands;
mod config;
mod error;
mod events;
mod genius;
mod logging;
mod managers;
mod notify;
mod services;
mod state;
mod web;

use config::{keys, ConfigStore, DynamicConfig, SharedConfig};
use genius::GeniusClient;
use managers::{
    create_shared_role_manager, create_shared_verification_manager, run_startup_permission_check,
    SharedRoleManager, SharedVerificationManager,
};
use notify::{topics, EventBus, SignalQueue};
use services::{create_keep_alive, InstanceGuard, SharedKeepAlive};
use state::{create_shared_bot_status, SharedBotStatus, SharedVerificationDb, VerificationDb};
use web::{PanelCredentials, RunMode, WebServerConfig, WebState};

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;
type ApplicationContext<'a> = poise::ApplicationContext<'a, Data, Error>;

const LOG_BUFFER_CAPACITY: usize = 1000;
const SIGNAL_POLL_INTERVAL: Duration = Duration::from_secs(2);
const PENDING_PURGE_INTERVAL: Duration = Duration::from_secs(60);
const LATENCY_SAMPLE_INTERVAL: Duration = Duration::from_secs(30);

/// Shared application state
pub struct Data {
    pub config: SharedConfig,
    pub verification_db: SharedVerificationDb,
    pub verifications: SharedVerificationManager,
    pub role_manager: SharedRoleManager,
    pub bot_status: SharedBotStatus,
    pub keep_alive: Option<SharedKeepAlive>,
}

fn default_mode() -> RunMode {
    let unified = std::env::var("UNIFIED_MODE")
        .ok()
        .and_then(|v| config::parse_bool(&v))
        .unwrap_or(false);
    if unified {
        RunMode::Unified
    } else {
        RunMode::Bot
    }
}

/// Reload on cross-process changes and audit role ids when they move.
fn subscribe_signals(config: &SharedConfig, role_manager: &SharedRoleManager) {
    let signals = config.signals();

    let reload_config = config.clone();
    signals.subscribe(topics::CONFIG_UPDATED, move |signal| {
        debug!("Config change signalled: {:?}", signal.data);
        reload_config.reload()?;
        Ok(())
    });

    signals.subscribe(topics::BOT_RESTART_REQUIRED, |signal| {
        warn!("A restart is required to apply {:?}", signal.data);
        Ok(())
    });

    signals.subscribe(topics::DISCORD_TOKEN_CHANGED, |_| {
        warn!("DISCORD_TOKEN changed; restart the bot to reconnect with the new token");
        Ok(())
    });

    let runtime = tokio::runtime::Handle::current();
    let roles = role_manager.clone();
    signals.subscribe(topics::ROLE_CONFIG_CHANGED, move |signal| {
        info!("Role configuration changed: {:?}", signal.data);
        let roles = roles.clone();
        runtime.spawn(async move {
            audit_roles(&roles).await;
        });
        Ok(())
    });
}

async fn audit_roles(role_manager: &SharedRoleManager) {
    if !role_manager.is_attached() {
        return;
    }
    match role_manager.audit_configured_roles().await {
        Ok(missing) if missing.is_empty() => info!("All configured roles exist"),
        Ok(missing) => warn!("Configured roles not found in the guild: {}", missing.join(", ")),
        Err(e) => warn!("Role audit failed: {}", e),
    }
}

fn spawn_pending_purge(db: SharedVerificationDb) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PENDING_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            match db.purge_expired_pending() {
                Ok(0) => {}
                Ok(n) => debug!("Purged {} expired pending verification(s)", n),
                Err(e) => warn!("Failed to purge pending verifications: {}", e),
            }
        }
    });
}

fn spawn_latency_sampler(shard_manager: Arc<serenity::ShardManager>, bot_status: SharedBotStatus) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LATENCY_SAMPLE_INTERVAL);
        loop {
            ticker.tick().await;
            let latency = {
                let runners = shard_manager.runners.lock().await;
                runners.values().find_map(|runner| runner.latency)
            };
            bot_status.write().await.latency_ms = latency.map(|d| d.as_millis() as u64);
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    if let Some(Command::HashPassword { password }) = &args.command {
        println!("{}", web::hash_password(password)?);
        return Ok(());
    }

    // Create log buffer for the panel log pages
    let log_buffer = logging::create_log_buffer(LOG_BUFFER_CAPACITY);
    logging::init(log_buffer.clone());

    let mode = args.mode.unwrap_or_else(default_mode);
    let data_dir = config::data_dir();
    info!("Starting in {:?} mode with data in {}", mode, data_dir.display());

    let event_bus = Arc::new(EventBus::new());
    event_bus.bind_runtime(tokio::runtime::Handle::current());
    let signals = Arc::new(SignalQueue::open(data_dir.join("signals.db"))?);
    let config: SharedConfig = Arc::new(DynamicConfig::new(
        ConfigStore::open(data_dir.join("config.db"))?,
        event_bus,
        signals.clone(),
    )?);
    config.init_default_configs()?;
    config.import_environment()?;

    let verification_db: SharedVerificationDb =
        Arc::new(VerificationDb::open(data_dir.join("verification.db"))?);

    let role_manager = create_shared_role_manager(config.clone());
    let verifications = create_shared_verification_manager(
        verification_db.clone(),
        config.clone(),
        Arc::new(GeniusClient::new(config.clone())?),
        role_manager.clone(),
    );
    let bot_status = create_shared_bot_status();

    let keep_alive = if mode.runs_bot()
        && config.get_bool(keys::KEEP_ALIVE_ENABLED, true)
        && !config.base_url().is_empty()
    {
        let interval = config.get_u64(keys::KEEP_ALIVE_INTERVAL, keys::DEFAULT_KEEP_ALIVE_SECS);
        Some(create_keep_alive(&config.base_url(), Duration::from_secs(interval))?)
    } else {
        None
    };

    let web_state = WebState {
        config: config.clone(),
        verification_db: verification_db.clone(),
        verifications: verifications.clone(),
        bot_status: bot_status.clone(),
        log_buffer,
        keep_alive: keep_alive.clone(),
        credentials: Arc::new(PanelCredentials::from_env()),
        requests: Arc::new(AtomicU64::new(0)),
    };
    let web_server = tokio::spawn(web::serve(WebServerConfig::from_env(), mode, web_state));

    if !mode.runs_bot() {
        info!("Panel mode: the Discord client is not started");
        return web_server.await?;
    }

    if !config.is_configured() {
        let missing = config.missing_configs().join(", ");
        if mode == RunMode::Unified {
            warn!(
                "Bot not configured (missing: {}); fill in the settings at /panel and restart",
                missing
            );
            return web_server.await?;
        }
        return Err(anyhow::anyhow!("Missing required configuration: {}", missing));
    }
    let Some(token) = config.discord_token() else {
        return Err(anyhow::anyhow!("Missing required configuration: {}", keys::DISCORD_TOKEN));
    };

    subscribe_signals(&config, &role_manager);
    signals.start_polling(SIGNAL_POLL_INTERVAL);
    spawn_pending_purge(verification_db.clone());
    if let Some(service) = &keep_alive {
        service.start();
    }

    // Extract CLI flags for use in setup
    let sync_commands = args.sync_commands;
    let guild_commands = args.guild_commands;
    let target_guild_id = args.guild_id;

    if sync_commands {
        info!("--sync-commands: Will force re-register slash commands");
    }
    if guild_commands {
        info!("--guild-commands: Will register commands per-guild (faster for testing)");
    } else {
        info!("Registering commands globally by default (takes up to 1 hour to propagate)");
    }
    if let Some(gid) = target_guild_id {
        info!("--guild-id: Targeting specific guild {}", gid);
    }

    let instance_id = bot_status.read().await.instance_id.clone();
    let guard_base_url = config.base_url();
    let setup_status = bot_status.clone();

    // Build framework
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                dynamic_prefix: Some(|ctx| Box::pin(async move { Ok(Some(ctx.data.config.prefix())) })),
                ..Default::default()
            },
            event_handler: |ctx, event, framework, data| {
                Box::pin(events::event_handler(ctx, event, framework, data))
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command '{}' invoked by {} (ID: {}) in {}",
                        ctx.command().qualified_name,
                        ctx.author().name,
                        ctx.author().id,
                        ctx.guild_id().map(|g| g.to_string()).unwrap_or_else(|| "DM".to_string())
                    );
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command '{}' completed for {}",
                        ctx.command().qualified_name,
                        ctx.author().name
                    );
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!("Error in command '{}': {}", ctx.command().qualified_name, error);
                            let _ = ctx.say(format!("❌ An error occurred: {}", error)).await;
                        }
                        poise::FrameworkError::ArgumentParse { error, input, ctx, .. } => {
                            error!("Argument parse error in '{}': {} (input: {:?})", ctx.command().qualified_name, error, input);
                            let _ = ctx
                                .say(format!("❌ Invalid arguments. Usage: `{}{}`", ctx.prefix(), ctx.command().qualified_name))
                                .await;
                        }
                        poise::FrameworkError::MissingBotPermissions { missing_permissions, ctx, .. } => {
                            error!("Bot missing permissions for '{}': {:?}", ctx.command().qualified_name, missing_permissions);
                            let _ = ctx.say(format!("Bot is missing permissions: {:?}", missing_permissions)).await;
                        }
                        poise::FrameworkError::GuildOnly { ctx, .. } => {
                            error!("Command '{}' is guild-only, used in DM by {}", ctx.command().qualified_name, ctx.author().name);
                        }
                        poise::FrameworkError::UnknownCommand { msg_content, .. } => {
                            debug!("Unknown command: {}", msg_content);
                        }
                        other => {
                            error!("Other framework error: {}", other);
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            let config = config.clone();
            let verification_db = verification_db.clone();
            let verifications = verifications.clone();
            let role_manager = role_manager.clone();
            let bot_status = setup_status.clone();
            let keep_alive = keep_alive.clone();

            Box::pin(async move {
                info!("Bot logged in as: {}", ready.user.name);
                {
                    let mut status = bot_status.write().await;
                    status.ready = true;
                    status.bot_name = Some(ready.user.name.clone());
                    status.guild_count = ready.guilds.len();
                }
                role_manager.attach(ctx.http.clone(), ctx.cache.clone());
                spawn_latency_sampler(framework.shard_manager().clone(), bot_status.clone());

                // Run permission check for all guilds
                let guild_ids: Vec<serenity::GuildId> = ready.guilds.iter().map(|g| g.id).collect();
                if !guild_ids.is_empty() {
                    let managed: Vec<serenity::RoleId> =
                        role_manager.configured_role_ids().into_iter().map(|(_, id)| id).collect();
                    run_startup_permission_check(ctx.http.as_ref(), &guild_ids, &managed).await;
                    audit_roles(&role_manager).await;
                } else {
                    warn!("Bot is not in any guilds - skipping permission check");
                }

                // Determine which guilds to register commands for
                let guilds_to_register: Vec<serenity::GuildId> = if let Some(gid) = target_guild_id {
                    vec![serenity::GuildId::new(gid)]
                } else {
                    guild_ids.clone()
                };

                if guild_commands || sync_commands {
                    for guild_id in &guilds_to_register {
                        info!("Registering commands to guild: {}", guild_id);
                        if let Err(e) = poise::builtins::register_in_guild(
                            ctx,
                            &framework.options().commands,
                            *guild_id,
                        ).await {
                            error!("Failed to register commands for guild {}: {}", guild_id, e);
                        } else {
                            info!("Successfully registered {} commands for guild {}",
                                  framework.options().commands.len(), guild_id);
                        }
                    }
                } else {
                    info!("Registering commands globally...");
                    if let Err(e) = poise::builtins::register_globally(
                        ctx,
                        &framework.options().commands,
                    ).await {
                        error!("Failed to register commands globally: {}", e);
                    } else {
                        info!("Successfully registered {} commands globally (may take up to 1 hour to propagate)",
                              framework.options().commands.len());
                    }
                }

                Ok(Data {
                    config,
                    verification_db,
                    verifications,
                    role_manager,
                    bot_status,
                    keep_alive,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS;

    // Log which privileged intents we're requesting
    let privileged_intents: Vec<&str> = [
        (serenity::GatewayIntents::MESSAGE_CONTENT, "MESSAGE_CONTENT"),
        (serenity::GatewayIntents::GUILD_MEMBERS, "GUILD_MEMBERS"),
        (serenity::GatewayIntents::GUILD_PRESENCES, "GUILD_PRESENCES"),
    ]
    .into_iter()
    .filter(|(intent, _)| intents.contains(*intent))
    .map(|(_, name)| name)
    .collect();

    info!("Requesting privileged intents: {:?}", privileged_intents);

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await?;

    // Step down gracefully when another instance owns the token
    let duplicate = Arc::new(AtomicBool::new(false));
    match InstanceGuard::new(&instance_id, &guard_base_url) {
        Ok(guard) => {
            let shard_manager = client.shard_manager.clone();
            let duplicate = duplicate.clone();
            tokio::spawn(async move {
                guard.watch().await;
                duplicate.store(true, Ordering::SeqCst);
                shard_manager.shutdown_all().await;
            });
        }
        Err(e) => warn!("Duplicate-instance guard disabled: {}", e),
    }

    info!("Starting bot...");
    if let Err(e) = client.start().await {
        // Check if it's a disallowed intents error
        let err_str = e.to_string();
        if err_str.contains("Disallowed") || err_str.contains("intents") {
            error!("Failed to start bot: {}", e);
            error!("The following privileged intents need to be enabled in the Discord Developer Portal:");
            for intent in &privileged_intents {
                error!("  - {}", intent);
            }
            error!("Go to https://discord.com/developers/applications -> Your App -> Bot -> Privileged Gateway Intents");
            return Err(anyhow::anyhow!(
                "Disallowed gateway intents. Enable these in Discord Developer Portal: {:?}",
                privileged_intents
            ));
        }
        return Err(e.into());
    }

    if duplicate.load(Ordering::SeqCst) {
        return Err(anyhow::anyhow!("Duplicate instance {} shut down", instance_id));
    }
    warn!("Bot ended.");

    Ok(())
}
