use std::str::FromStr;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use watchdog::{
    HealthStatus, HttpMethod, MonitoringFrequency, NewTarget, TargetFilter, TargetId,
    WatchdogRuntime,
    analysis::analyze,
    config::{Config, read_config_file},
    notify, queue, storage,
    targets::TargetManager,
};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "HTTP uptime monitor")]
struct Args {
    /// Config file (JSON); built-in defaults are used when omitted
    #[arg(short, long)]
    file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the monitor until interrupted
    Guard,

    /// Register a new target
    Add {
        address: String,

        #[arg(short, long, default_value = "get", value_parser = HttpMethod::from_str)]
        method: HttpMethod,

        #[arg(short, long, default_value = "five_minutes", value_parser = MonitoringFrequency::from_str)]
        frequency: MonitoringFrequency,

        /// Address notified when the target goes down or comes back up
        #[arg(short, long)]
        contact: String,
    },

    /// Stop monitoring a target
    Remove { id: TargetId },

    /// Move a target to another frequency
    Frequency {
        id: TargetId,

        #[arg(value_parser = MonitoringFrequency::from_str)]
        frequency: MonitoringFrequency,
    },

    /// List registered targets
    List {
        #[arg(short, long, value_parser = HttpMethod::from_str)]
        method: Option<HttpMethod>,

        #[arg(short, long, value_parser = HealthStatus::from_str)]
        status: Option<HealthStatus>,

        #[arg(short, long, value_parser = MonitoringFrequency::from_str)]
        frequency: Option<MonitoringFrequency>,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Uptime report for one target
    Analysis { id: TargetId },
}

fn init() {
    let level = std::env::var("WATCHDOG_LOG")
        .ok()
        .and_then(|level| LevelFilter::from_str(&level).ok())
        .unwrap_or(LevelFilter::INFO);

    let filter = filter::Targets::new().with_targets(vec![("watchdog", level)]);
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

fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => read_config_file(path)
            .with_context(|| format!("failed to load configuration from {path}"))?,
        None => Config::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();

    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = load_config(args.file.as_deref())?;
    let stores = storage::connect(&config.storage)
        .await
        .context("failed to open storage")?;
    let queue = queue::connect(&config.queue)
        .await
        .context("failed to connect to pending-work queue")?;

    let manager = TargetManager::new(stores.registry.clone(), queue.clone());

    match args.command {
        Command::Guard => {
            let runtime =
                WatchdogRuntime::start(&config, stores, queue, notify::from_config(&config.notifier))
                    .await?;

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
            runtime.shutdown().await;
        }

        Command::Add {
            address,
            method,
            frequency,
            contact,
        } => {
            if !config.frequencies.contains(&frequency) {
                warn!("{frequency} is not in the configured frequencies; it will not be probed");
            }
            let target = manager
                .add(NewTarget {
                    address,
                    method,
                    frequency,
                    contact,
                })
                .await?;
            println!("Added target #{} ({})", target.id, target.address);
        }

        Command::Remove { id } => {
            let target = manager.remove(id).await?;
            println!("Removed target #{} ({})", target.id, target.address);
        }

        Command::Frequency { id, frequency } => {
            let target = manager.change_frequency(id, frequency).await?;
            println!("Target #{} is now probed every {}", target.id, target.frequency);
        }

        Command::List {
            method,
            status,
            frequency,
            limit,
            offset,
        } => {
            let filter = TargetFilter {
                method,
                status,
                frequency,
            };
            let targets = manager.list(filter, limit, offset).await?;

            println!(
                "{:<6} {:<7} {:<18} {:<10} ADDRESS",
                "ID", "METHOD", "FREQUENCY", "STATUS"
            );
            for target in targets {
                println!(
                    "{:<6} {:<7} {:<18} {:<10} {}",
                    target.id,
                    target.method.as_str().to_uppercase(),
                    target.frequency,
                    target.status,
                    target.address
                );
            }
        }

        Command::Analysis { id } => {
            let report = analyze(
                stores.registry.as_ref(),
                stores.samples.as_ref(),
                stores.incidents.as_ref(),
                id,
                Utc::now(),
            )
            .await?;
            print!("{report}");
        }
    }

    Ok(())
}
