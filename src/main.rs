//! Pressure Monitor CLI
//!
//! Polls foot-pressure telemetry and serves windowed queries.

use anyhow::Context;
use clap::{Parser, Subcommand};
use pressure_monitor::{
    config::{parse_subject_list, Config},
    core::{StoreKind, TelemetryStore, Timestamper},
    persist::StoreFiles,
    poller::{Poller, PollerConfig},
    query::{list_subjects, subject_profile},
    source::{HttpSource, SubjectId},
    stats::{create_shared_stats, create_shared_stats_with_persistence, read_counters},
    VERSION,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pressure-monitor")]
#[command(version = VERSION)]
#[command(about = "Foot-pressure telemetry poller and query service", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start polling and serving queries
    Start {
        /// Telemetry source base URL
        #[arg(long)]
        source_url: Option<String>,

        /// Subjects to poll, comma separated (e.g. 1,2,3)
        #[arg(long)]
        subjects: Option<String>,

        /// Seconds between the end of one round and the start of the next
        #[arg(long)]
        interval: Option<u64>,

        /// Simultaneous fetches within a round
        #[arg(long)]
        concurrency: Option<usize>,

        /// Read API port
        #[arg(long)]
        port: Option<u16>,

        /// Do not start the read API
        #[arg(long)]
        no_server: bool,

        /// Keep everything in memory only
        #[arg(long)]
        no_persist: bool,
    },

    /// List subjects known to the telemetry source
    Subjects,

    /// Show the details of one subject
    Profile {
        /// Subject ID
        id: SubjectId,
    },

    /// Show persisted ingest statistics and store sizes
    Status,

    /// Show configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Config::config_path);
    let mut config = Config::load_from(&config_path)
        .with_context(|| format!("loading configuration from {config_path:?}"))?;

    match cli.command {
        Commands::Start {
            source_url,
            subjects,
            interval,
            concurrency,
            port,
            no_server,
            no_persist,
        } => {
            if let Some(url) = source_url {
                config.source_base_url = url;
            }
            if let Some(list) = subjects {
                config.subject_ids = parse_subject_list(&list)?;
            }
            if let Some(secs) = interval {
                config.poll_interval = Duration::from_secs(secs);
            }
            if let Some(n) = concurrency {
                config.max_concurrent_fetches = n;
            }
            if let Some(p) = port {
                config.server_port = p;
            }
            if no_persist {
                config.persist = false;
            }
            config.validate()?;
            cmd_start(config, !no_server).await
        }
        Commands::Subjects => cmd_subjects(&config).await,
        Commands::Profile { id } => cmd_profile(&config, id).await,
        Commands::Status => {
            cmd_status(&config);
            Ok(())
        }
        Commands::Config => {
            cmd_config(&config, &config_path);
            Ok(())
        }
    }
}

async fn cmd_start(config: Config, serve: bool) -> anyhow::Result<()> {
    println!("Pressure Monitor v{VERSION}");
    println!();
    println!("  Source: {}", config.source_base_url);
    println!("  Subjects: {:?}", config.subject_ids);
    println!("  Poll interval: {}s", config.poll_interval.as_secs());
    println!("  History capacity: {}", config.history_capacity);
    println!("  Anomaly retention: {:?}", config.anomaly_retention);
    println!("  Timezone: {}", config.timezone);
    println!();

    let tz = config.tz()?;
    let timestamper = Arc::new(Timestamper::new(tz));
    let store = Arc::new(TelemetryStore::new(
        config.history_capacity,
        config.anomaly_retention,
    ));

    let (stats, files) = if config.persist {
        config.ensure_directories()?;
        let files = StoreFiles::new(config.store_path());
        match files.load(&store) {
            Ok(report) => tracing::info!(
                "Restored {} records for {} subjects ({} lines skipped)",
                report.records,
                report.subjects,
                report.skipped_lines
            ),
            Err(e) => tracing::warn!("Could not restore stores: {e}"),
        }
        (
            create_shared_stats_with_persistence(config.stats_path()),
            Some(files),
        )
    } else {
        (create_shared_stats(), None)
    };

    let source = Arc::new(HttpSource::new(config.source())?);

    let mut poller = Poller::new(
        source.clone(),
        store.clone(),
        timestamper.clone(),
        stats.clone(),
        PollerConfig {
            subject_ids: config.subject_ids.clone(),
            poll_interval: config.poll_interval,
            max_concurrent_fetches: config.max_concurrent_fetches,
            checkpoint_every_rounds: config.checkpoint_every_rounds,
        },
    );
    if let Some(files) = files {
        poller = poller.with_checkpoint(files);
    }
    let (poller_handle, poller_shutdown) = poller.spawn();

    #[cfg(feature = "server")]
    let server_shutdown = if serve {
        use pressure_monitor::query::TelemetryQuery;
        use pressure_monitor::server::{self, ServerConfig, ServerState};

        let server_config = ServerConfig::new(config.server_port, config.directory_ids.clone());
        let state = ServerState::new(
            &server_config,
            TelemetryQuery::new(store.clone(), timestamper.clone()),
            source.clone(),
            stats.clone(),
        );
        let (addr, shutdown) = server::run(server_config, state).await?;
        println!("Read API: http://{addr}");
        Some(shutdown)
    } else {
        None
    };

    #[cfg(not(feature = "server"))]
    if serve {
        eprintln!("Warning: read API not available (server feature not enabled at compile time)");
    }

    println!("Press Ctrl+C to stop");
    println!();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl+C")?;

    println!();
    println!("Stopping...");

    #[cfg(feature = "server")]
    if let Some(shutdown) = server_shutdown {
        let _ = shutdown.send(());
    }

    let _ = poller_shutdown.send(());
    if let Err(e) = poller_handle.await {
        tracing::error!("Poller task failed: {e}");
    }

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save ingest stats: {e}");
    }

    println!();
    println!("{}", stats.summary());
    Ok(())
}

async fn cmd_subjects(config: &Config) -> anyhow::Result<()> {
    let source = HttpSource::new(config.source())?;
    let entries = list_subjects(&source, &config.directory_ids).await;

    if entries.is_empty() {
        println!("No subjects answered at {}", config.source_base_url);
        return Ok(());
    }
    for entry in entries {
        println!("{:>3}  {}", entry.id, entry.display_name);
    }
    Ok(())
}

async fn cmd_profile(config: &Config, id: SubjectId) -> anyhow::Result<()> {
    let source = HttpSource::new(config.source())?;
    match subject_profile(&source, id).await {
        Some(profile) => {
            println!("First Name: {}", profile.firstname);
            println!("Last Name:  {}", profile.lastname);
            println!("Person ID:  {}", profile.id);
            println!(
                "Birthdate:  {}",
                profile.birthdate.as_deref().unwrap_or("N/A")
            );
            println!(
                "Disabled:   {}",
                if profile.disabled { "Yes" } else { "No" }
            );
        }
        None => println!("Failed to load person details."),
    }
    Ok(())
}

fn cmd_status(config: &Config) {
    println!("Pressure Monitor Status");
    println!("=======================");
    println!();

    let stats_path = config.stats_path();
    match read_counters(&stats_path) {
        Ok(counters) => {
            println!("Cumulative Statistics:");
            println!("  Rounds completed: {}", counters.rounds_completed);
            println!("  Snapshots stored: {}", counters.fetches_succeeded);
            println!("  Fetches failed: {}", counters.fetches_failed);
            println!("  Malformed snapshots: {}", counters.malformed_snapshots);
            println!("  Anomaly records: {}", counters.anomalies_stored);
            println!("  Last updated: {}", counters.last_updated);
        }
        Err(_) => println!("No previous session data found."),
    }
    println!();

    if !config.persist {
        return;
    }

    let files = StoreFiles::new(config.store_path());
    let store = TelemetryStore::new(config.history_capacity, config.anomaly_retention);
    match files.load(&store) {
        Ok(_) if store.is_empty() => println!("No stored records in {:?}", files.dir()),
        Ok(_) => {
            println!("Stored records:");
            for id in store.subjects() {
                println!(
                    "  Subject {id}: {} history, {} anomalies",
                    store.len(id, StoreKind::History),
                    store.len(id, StoreKind::Anomaly)
                );
            }
        }
        Err(e) => eprintln!("Could not read stored records: {e}"),
    }
}

fn cmd_config(config: &Config, config_path: &std::path::Path) {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {config_path:?}");
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).unwrap_or_else(|_| "Error".to_string())
    );
}
