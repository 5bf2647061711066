use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use trailguard_core::{sizing_plan, ConfigLoader, ExecutionGateway, LogNotifier, TrailguardConfig};
use trailguard_gateway::{HyperliquidGateway, InfoClient, LeaderboardFeed};
use trailguard_orchestrator::{Daemon, DaemonCommand, Jobs, TradeLog};

#[derive(Parser)]
#[command(name = "trailguard")]
#[command(about = "Trailing-stop protection and rotation for leveraged positions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all protection jobs until interrupted
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Trailguard.toml")]
        config: String,
        /// Trade log output path
        #[arg(long, default_value = "trailguard-trades.jsonl")]
        trade_log: String,
    },
    /// Print the sizing plan for a budget
    Plan {
        /// Allocated capital in account currency
        budget: Decimal,
    },
    /// Classify the current leaderboard once and print entry candidates
    Scan {
        /// Config file path
        #[arg(short, long, default_value = "config/Trailguard.toml")]
        config: String,
    },
    /// Show live positions as the venue reports them
    Status {
        /// Config file path
        #[arg(short, long, default_value = "config/Trailguard.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Run { config, trade_log } => run(&config, &trade_log).await,
        Commands::Plan { budget } => plan(budget),
        Commands::Scan { config } => scan(&config).await,
        Commands::Status { config } => status(&config).await,
    }
}

fn build_jobs(config: &TrailguardConfig, trade_log: &str) -> Result<Arc<Jobs>> {
    let gateway = Arc::new(HyperliquidGateway::new(InfoClient::new(&config.gateway)?));
    let feed = Arc::new(LeaderboardFeed::new(InfoClient::new(&config.gateway)?));
    Ok(Arc::new(Jobs::new(
        config.strategy.clone(),
        config.classifier.clone(),
        config.conviction.clone(),
        gateway,
        feed.clone(),
        feed,
        Arc::new(LogNotifier),
        TradeLog::new(trade_log),
    )))
}

async fn run(config_path: &str, trade_log: &str) -> Result<()> {
    let config = ConfigLoader::load(config_path)?;
    tracing::info!(
        strategy = %config.strategy.strategy_id,
        slots = config.strategy.slots,
        "starting trailguard"
    );

    let jobs = build_jobs(&config, trade_log)?;
    let daemon = Daemon::new(jobs, config.cadence.clone());
    let commands = daemon.spawn();

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received, shutting down");
    let _ = commands.send(DaemonCommand::Shutdown).await;
    Ok(())
}

fn plan(budget: Decimal) -> Result<()> {
    let plan = sizing_plan(budget)?;
    println!("budget:            {}", plan.budget);
    println!("slots:             {}", plan.slots);
    println!("margin per slot:   {}", plan.margin_per_slot);
    println!("margin buffer:     {}", plan.margin_buffer);
    println!(
        "leverage:          {}x (max {}x)",
        plan.default_leverage, plan.max_leverage
    );
    println!("notional per slot: {}", plan.notional_per_slot);
    println!("daily loss limit:  {}", plan.daily_loss_limit);
    println!("drawdown cap:      {}", plan.drawdown_cap);
    println!("delever below:     {}", plan.auto_delever_threshold);
    Ok(())
}

async fn scan(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load(config_path)?;
    let jobs = build_jobs(&config, "trailguard-trades.jsonl")?;
    let signals = jobs.dry_scan().await?;
    if signals.is_empty() {
        println!("no entry candidates on this scan");
        return Ok(());
    }
    for signal in signals {
        println!(
            "{:<18} {:<6} rank {:>3} (delta {:+}) vel {:.3} reasons {:?}",
            signal.category.as_str(),
            signal.asset,
            signal.rank,
            signal.rank_delta,
            signal.velocity,
            signal.reasons
        );
    }
    Ok(())
}

async fn status(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load(config_path)?;
    let gateway = HyperliquidGateway::new(InfoClient::new(&config.gateway)?);
    let positions = gateway.positions(&config.strategy.wallet).await?;
    if positions.is_empty() {
        println!("no live positions");
        return Ok(());
    }
    for position in positions {
        println!(
            "{:<8} {:<5} size {} entry {} upnl {}",
            position.asset,
            position.direction,
            position.size,
            position.entry_price,
            position.unrealized_pnl
        );
    }
    Ok(())
}
