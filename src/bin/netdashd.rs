use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use netdash::{
    config::{Config, read_config_file},
    probe::{ProbeRunner, SpeedtestCommand, SpeedtestRunner},
    scheduler::{Schedule, ScheduleState, Scheduler, validate_schedule},
    storage::{AppConfig, MeasurementResult, StorageBackend, sqlite::SqliteBackend},
    util::{get_db_path, get_speedtest_bin},
};
use tracing::{error, info, instrument, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<PathBuf>,

    /// Database file (overrides NETDASH_DB and the config file)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Speedtest binary (overrides NETDASH_SPEEDTEST_BIN and the config file)
    #[arg(long)]
    speedtest_bin: Option<PathBuf>,

    /// Log everything down to TRACE
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the scheduler until interrupted (default)
    Serve,
    /// Trigger one measurement now
    Run,
    /// Show the most recent results
    History {
        /// Number of rows (defaults to the configured history limit)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show row count and on-disk size
    Stats,
    /// Delete one result
    Delete { id: i64 },
    /// Delete every result
    Clear,
    /// Show or change the runtime configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    Show,
    Set {
        /// Ookla server id, empty to let the probe pick
        #[arg(long)]
        server_id: Option<String>,
        /// Cron expression, or `manual`
        #[arg(long)]
        schedule: Option<String>,
        #[arg(long)]
        history_limit: Option<i64>,
    },
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter =
        filter::Targets::new().with_targets(vec![("netdash", level), ("netdashd", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    }
    .with_overrides(get_db_path(), get_speedtest_bin())
    .with_overrides(args.db.clone(), args.speedtest_bin.clone());

    let store: Arc<dyn StorageBackend> = Arc::new(
        SqliteBackend::new(&config.storage.path)
            .await
            .with_context(|| {
                format!(
                    "failed to open result store at {}",
                    config.storage.path.display()
                )
            })?,
    );

    let result = dispatch(args.command.unwrap_or(Command::Serve), &config, store.clone()).await;

    if let Err(e) = store.close().await {
        warn!("failed to close result store: {e}");
    }

    result
}

async fn dispatch(
    command: Command,
    config: &Config,
    store: Arc<dyn StorageBackend>,
) -> anyhow::Result<()> {
    match command {
        Command::Serve => serve(config, store).await,
        Command::Run => {
            let runner = build_runner(config, store);
            let result = runner.run().await?;
            print_result(&result);
            Ok(())
        }
        Command::History { limit } => {
            let limit = match limit {
                Some(limit) => limit,
                None => store.get_config().await?.history_limit(),
            };
            for result in store.get_latest_results(limit).await? {
                print_result(&result);
            }
            Ok(())
        }
        Command::Stats => {
            let stats = store.get_db_stats().await?;
            println!("{} results, {}", stats.total_tests, stats.db_size);
            Ok(())
        }
        Command::Delete { id } => {
            if store.delete_result(id).await? {
                println!("deleted result {id}");
            } else {
                println!("no result with id {id}");
            }
            Ok(())
        }
        Command::Clear => {
            let removed = store.clear_results().await?;
            println!("deleted {removed} results");
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            print_config(&store.get_config().await?);
            Ok(())
        }
        Command::Config(ConfigCommand::Set {
            server_id,
            schedule,
            history_limit,
        }) => {
            let current = store.get_config().await?;
            if let Some(schedule) = &schedule {
                validate_schedule(schedule)?;
            }
            let updated = AppConfig::new(
                server_id.or(current.server_id.clone()),
                schedule.unwrap_or(current.schedule.clone()),
                history_limit.unwrap_or(current.history_limit),
            );
            store.update_config(updated.clone()).await?;
            print_config(&updated);
            if let Some(notice) = reload_notice(&current, &updated) {
                println!("{notice}");
            }
            Ok(())
        }
    }
}

/// Server and history changes are read on every run; only a new schedule
/// has to reach a running `serve`
fn reload_notice(previous: &AppConfig, updated: &AppConfig) -> Option<&'static str> {
    (previous.schedule != updated.schedule).then_some(
        "schedule changed: send SIGHUP to a running `netdashd serve` (or restart it) to apply",
    )
}

fn build_runner(config: &Config, store: Arc<dyn StorageBackend>) -> Arc<SpeedtestRunner> {
    let command = SpeedtestCommand::discover(config.probe.binary.as_deref());
    info!("using speedtest binary {}", command.program().display());
    Arc::new(SpeedtestRunner::new(store, Arc::new(command)))
}

#[instrument(skip_all)]
async fn serve(config: &Config, store: Arc<dyn StorageBackend>) -> anyhow::Result<()> {
    let runner = build_runner(config, store.clone());
    let scheduler = Scheduler::new(store, runner);

    log_state(&scheduler.start().await);
    wait_for_signals(&scheduler).await?;
    scheduler.shutdown().await;

    Ok(())
}

/// Wait for Ctrl-C; on unix, SIGHUP reloads the stored schedule
#[cfg(unix)]
async fn wait_for_signals(scheduler: &Scheduler) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("interrupted, shutting down");
                return Ok(());
            }
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading schedule");
                log_state(&scheduler.reload().await);
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signals(_scheduler: &Scheduler) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("interrupted, shutting down");
    Ok(())
}

fn log_state(state: &ScheduleState) {
    match state {
        ScheduleState::Disabled => info!("automatic measurements disabled"),
        ScheduleState::Active {
            expression,
            next_fire,
        } => match next_fire {
            Some(next) => info!("schedule '{expression}' installed, next run at {next}"),
            None => info!("schedule '{expression}' installed, no upcoming run"),
        },
        ScheduleState::Invalid { expression, reason } => {
            error!("stored schedule '{expression}' is invalid ({reason}), running manually only")
        }
    }
}

fn print_result(result: &MeasurementResult) {
    println!(
        "#{:<5} {}  down {:>8.2} Mbit/s  up {:>8.2} Mbit/s  ping {:>6.1} ms  loss {:>4.1}%  {} ({}, {})",
        result.id,
        result.created_at.format("%Y-%m-%d %H:%M:%S"),
        result.download_mbps,
        result.upload_mbps,
        result.ping_ms,
        result.packet_loss_pct,
        result.server_name,
        result.server_id,
        result.isp,
    );
}

fn print_config(config: &AppConfig) {
    println!(
        "server_id: {}",
        config.server_id.as_deref().unwrap_or("(auto)")
    );
    println!("schedule: {}", config.schedule);
    println!("history_limit: {}", config.history_limit);
}
