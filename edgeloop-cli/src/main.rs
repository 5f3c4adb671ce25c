//! EdgeLoop CLI: service, ingestion, settlement and export commands.
//!
//! Commands:
//! - `run`: start every polling loop until stopped
//! - `ingest`: fetch venue history into the bar store
//! - `audit`: one settlement pass, then the performance report
//! - `report`: performance report over the trade ledger
//! - `export-features`: write the current feature frame as parquet
//! - `export-trades`: write the trade ledger as CSV or JSON
//! - `default-config`: print the default service config as TOML

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use edgeloop_core::clock::{Clock, SystemClock};
use edgeloop_core::features::export_parquet;
use edgeloop_core::settlement::{PerformanceReport, SettlementAuditor};
use edgeloop_core::store::{SqliteBarStore, TradeStore};
use edgeloop_runner::venues::build_feed;
use edgeloop_runner::{
    ingest_history, save_report, save_trades, Collaborators, FeatureDataset, IngestOptions,
    PolymarketClient, Service, ServiceConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "edgeloop",
    about = "EdgeLoop: multi-cadence bar pipeline and simulated binary-contract trading loop"
)]
struct Cli {
    /// Service config (TOML). Missing sections take their defaults.
    #[arg(long, global = true, default_value = "edgeloop.toml")]
    config: PathBuf,

    /// Log filter, e.g. `debug` or `edgeloop_runner=debug`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every polling loop. Stops on Enter, or after --for-secs.
    Run {
        /// Stop automatically after this many seconds.
        #[arg(long)]
        for_secs: Option<u64>,
    },
    /// Fetch venue history for the base and derived cadences.
    Ingest {
        /// Clear stored bars for each stream first.
        #[arg(long, default_value_t = false)]
        fresh: bool,
    },
    /// Reconcile expired trades once, then print the report.
    Audit,
    /// Print the performance report over the trade ledger.
    Report {
        /// Also write the report as Markdown.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write the current feature frame for one venue stream as parquet.
    ExportFeatures {
        #[arg(long, default_value = "features.parquet")]
        out: PathBuf,

        /// Index into `feed.venues`.
        #[arg(long, default_value_t = 0)]
        stream: usize,

        /// Base bars to load. Defaults to `model.history_limit`.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Write the trade ledger; a `.json` extension selects JSON.
    ExportTrades {
        #[arg(long, default_value = "trades.csv")]
        out: PathBuf,
    },
    /// Print the default configuration.
    DefaultConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    if let Commands::DefaultConfig = cli.command {
        print!("{}", ServiceConfig::default().to_toml()?);
        return Ok(());
    }

    let config = load_config(&cli.config)?;
    match cli.command {
        Commands::Run { for_secs } => run_service(&config, for_secs),
        Commands::Ingest { fresh } => run_ingest(&config, fresh),
        Commands::Audit => run_audit(&config),
        Commands::Report { out } => run_report(&config, out.as_deref()),
        Commands::ExportFeatures { out, stream, limit } => {
            run_export_features(&config, &out, stream, limit)
        }
        Commands::ExportTrades { out } => run_export_trades(&config, &out),
        Commands::DefaultConfig => Ok(()),
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(l) => EnvFilter::new(l),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: &Path) -> Result<ServiceConfig> {
    if path.exists() {
        ServiceConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
    } else {
        info!(path = %path.display(), "config not found, using defaults");
        Ok(ServiceConfig::default())
    }
}

fn open_bars(config: &ServiceConfig) -> Result<Arc<SqliteBarStore>> {
    let path = &config.storage.bar_db;
    ensure_parent(path)?;
    let store = SqliteBarStore::open(path)
        .with_context(|| format!("opening bar store {}", path.display()))?;
    Ok(Arc::new(store))
}

fn open_trades(config: &ServiceConfig) -> Result<Arc<TradeStore>> {
    let path = &config.storage.trade_db;
    ensure_parent(path)?;
    let store = TradeStore::open(path)
        .with_context(|| format!("opening trade ledger {}", path.display()))?;
    Ok(Arc::new(store))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

fn run_service(config: &ServiceConfig, for_secs: Option<u64>) -> Result<()> {
    let bars = open_bars(config)?;
    let trades = open_trades(config)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let collaborators = Collaborators::from_config(config, bars.clone(), clock)?;
    let handle = Service::start(config, bars, trades, collaborators)?;

    match for_secs {
        Some(secs) => {
            println!("Running for {secs}s...");
            std::thread::sleep(Duration::from_secs(secs));
        }
        None => {
            println!("Running. Press Enter to stop.");
            let mut line = String::new();
            let read = std::io::stdin().lock().read_line(&mut line)?;
            if read == 0 {
                // No interactive stdin: run until the process is killed.
                let listener = handle.shutdown_listener();
                while !listener.wait(Duration::from_secs(3600)) {}
            }
        }
    }

    handle.stop();
    Ok(())
}

fn run_ingest(config: &ServiceConfig, fresh: bool) -> Result<()> {
    let bars = open_bars(config)?;
    let timeout = Duration::from_secs(config.feed.timeout_secs);
    let streams = config
        .feed
        .venues
        .iter()
        .map(|v| {
            build_feed(v, timeout, config.feed.synthetic_seed)
                .map(|feed| (v.clone(), feed))
                .with_context(|| format!("building {} feed", v.venue))
        })
        .collect::<Result<Vec<_>>>()?;

    let opts = IngestOptions {
        base: config.feed.base_cadence,
        cadences: config.aggregation.cadences.clone(),
        limit: config.feed.history_limit,
        fresh,
    };
    let summary = ingest_history(&bars, &streams, &opts, Utc::now().timestamp_millis())?;

    if fresh {
        println!("Cleared {} stored bars", summary.cleared);
    }
    println!(
        "{:<12} {:<12} {:>6} {:>10} {:>8}",
        "Venue", "Instrument", "Cad", "Source", "Bars"
    );
    for s in &summary.series {
        println!(
            "{:<12} {:<12} {:>6} {:>10} {:>8}",
            s.venue.to_string(),
            s.instrument,
            s.cadence.label(),
            s.source.to_string(),
            s.written
        );
    }
    println!("Total: {} bars", summary.total_written());
    Ok(())
}

fn run_audit(config: &ServiceConfig) -> Result<()> {
    let trades = open_trades(config)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let market = PolymarketClient::new(config.market.clone(), clock.clone())
        .context("building market client")?;
    let auditor = SettlementAuditor::new(trades.clone(), Arc::new(market))
        .with_expiry_buffer(config.settlement.expiry_buffer())
        .with_max_resolution_age(config.settlement.max_resolution_age());

    let summary = auditor.audit_once(clock.now())?;
    println!(
        "Audit: checked={} resolved={} pending={} expired={}",
        summary.checked, summary.resolved, summary.pending, summary.expired
    );
    println!();
    print!("{}", PerformanceReport::from_trades(&trades.all()?).to_markdown());
    Ok(())
}

fn run_report(config: &ServiceConfig, out: Option<&Path>) -> Result<()> {
    let trades = open_trades(config)?.all()?;
    let report = match out {
        Some(path) => {
            let report = save_report(&trades, path)?;
            println!("Report saved to: {}", path.display());
            report
        }
        None => PerformanceReport::from_trades(&trades),
    };
    print!("{}", report.to_markdown());
    Ok(())
}

fn run_export_features(
    config: &ServiceConfig,
    out: &Path,
    stream: usize,
    limit: Option<usize>,
) -> Result<()> {
    let Some(venue) = config.feed.venues.get(stream) else {
        bail!(
            "stream {stream} not configured ({} venues in feed.venues)",
            config.feed.venues.len()
        );
    };
    let bars = open_bars(config)?;
    let dataset = FeatureDataset::new(
        bars,
        venue,
        config.feed.base_cadence,
        &config.features,
        limit.unwrap_or(config.model.history_limit),
    );
    let frame = dataset
        .load()
        .with_context(|| format!("building features for {}/{}", venue.venue, venue.instrument))?;
    let meta = export_parquet(&frame, out)
        .with_context(|| format!("writing {}", out.display()))?;
    println!(
        "Wrote {} rows x {} columns to {} (hash {})",
        meta.rows,
        meta.columns.len(),
        out.display(),
        meta.data_hash
    );
    Ok(())
}

fn run_export_trades(config: &ServiceConfig, out: &Path) -> Result<()> {
    let trades = open_trades(config)?.all()?;
    save_trades(&trades, out)?;
    println!("Exported {} trades to {}", trades.len(), out.display());
    Ok(())
}
