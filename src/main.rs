//! Starboard - Advent of Code leaderboard roles for Discord

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use starboard::{
    config::{Args, Command, FileConfig},
    membership::DiscordClient,
    CommunityRegistry, Commands, Invoker, Membership, Outcome, Reconciler, SyncDriver,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("starboard={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = match FileConfig::load(&args.config).and_then(|file| args.resolve(file)) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!("======================================");
    info!("  Starboard - leaderboard role sync");
    info!("======================================");
    info!("Config: {}", args.config.display());
    info!("Data dir: {}", settings.registry.data_dir.display());
    info!("Communities: {}", settings.communities.len());
    info!("Sync interval: {:?}", settings.sync_interval);
    info!("Cache TTL: {:?}", settings.registry.cache_ttl);
    info!("Role pace: {:?}", settings.reconciler.pace);
    info!("======================================");

    let discord = DiscordClient::new(settings.discord_token.clone(), settings.discord_api_url.clone())?;
    let membership: Arc<dyn Membership> = Arc::new(discord);
    let reconciler = Arc::new(Reconciler::new(membership, settings.reconciler.clone()));

    let mut registry = CommunityRegistry::new();
    for community in settings.communities.iter().cloned() {
        registry.open(community, &settings.registry)?;
    }
    let registry = Arc::new(registry);

    let commands = Commands::new(Arc::clone(&registry), Arc::clone(&reconciler));
    // The operator at the console acts with administrator rights
    let outcome = match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let driver = Arc::new(SyncDriver::new(registry, reconciler, settings.sync_interval));
            tokio::select! {
                _ = driver.run() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                }
            }
            return Ok(());
        }
        Command::Sync => {
            let driver = SyncDriver::new(registry, reconciler, settings.sync_interval);
            let mut failed = false;
            for (community_id, result) in driver.sync_once().await {
                match result {
                    Ok(summary) => info!(
                        community_id = %community_id,
                        reconciled = summary.reconciled,
                        skipped = summary.skipped,
                        added = summary.added,
                        removed = summary.removed,
                        failed = summary.failed,
                        "Sync complete"
                    ),
                    Err(_) => failed = true,
                }
            }
            if failed {
                anyhow::bail!("One or more communities failed to sync");
            }
            return Ok(());
        }
        Command::Claim { guild, member, query } => {
            commands.claim(&guild, &Invoker::admin(member), &query).await
        }
        Command::Unclaim { guild, member } => {
            commands.unclaim(&guild, &Invoker::admin(member), None).await
        }
        Command::Points { guild, member } => {
            commands.get_points(&guild, &Invoker::admin(member), None).await
        }
        Command::Spoiler { guild, member } => {
            commands.toggle_spoiler_badge(&guild, &Invoker::admin(member)).await
        }
        Command::SetupChannel { guild, day, channel } => {
            commands
                .setup_channel_for_day(&guild, &Invoker::admin("operator"), day, &channel)
                .await
        }
    };

    report(&outcome)
}

fn report(outcome: &Outcome) -> anyhow::Result<()> {
    println!("{}", outcome);
    if outcome.is_success() {
        Ok(())
    } else {
        anyhow::bail!("command did not succeed")
    }
}
