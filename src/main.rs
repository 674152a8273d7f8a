//! Glucoscope CLI
//!
//! Command-line interface for glucoscope operations:
//! - Sync readings from Nightscout
//! - Window metrics, weekly summaries and period comparisons
//! - Trend alerts and ML pattern insights
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use glucoscope::config::{generate_default_config, Config};
use glucoscope::metrics::{self, AnalysisError, AnalysisResult};
use glucoscope::patterns::{ml_insights, TrendAlertDetector};
use glucoscope::{
    AnalysisContext, NightscoutSource, ReadingStore, RemoteSource, SyncEngine, ThresholdsResolver,
    TimeRange,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "glucoscope")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CGM sync, metrics and pattern detection for Nightscout data")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database path, overriding the config
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pull readings from Nightscout into the local store
    Sync {
        /// How far back to fetch (default: [analysis].default_days)
        #[arg(short, long)]
        days: Option<i64>,
    },

    /// Statistics, time in range, GMI and CV for a window
    Analyze {
        #[arg(short, long)]
        days: Option<i64>,
    },

    /// Most recent reading straight from the server
    Current,

    /// Per ISO week summaries
    Weekly {
        #[arg(short, long)]
        days: Option<i64>,
    },

    /// Compare two periods, e.g. "last 7 days" "previous 7 days"
    Compare {
        period1: String,
        period2: String,
    },

    /// Recurring lows/highs and weekly TIR trends
    Alerts {
        #[arg(short, long)]
        days: Option<i64>,
        /// Events and distinct days a pattern needs
        #[arg(long)]
        min_occurrences: Option<usize>,
    },

    /// Clustering, weekday correlation and anomaly detection
    Insights {
        #[arg(short, long)]
        days: Option<i64>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::resolve(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }
    init_logging(&config);

    match cli.command {
        Commands::Sync { days } => {
            let days = days.unwrap_or(config.analysis.default_days);
            let source: Arc<dyn RemoteSource> = Arc::new(
                NightscoutSource::new(config.source.nightscout()).context("Cannot sync")?,
            );
            let mut store = open_store(&config)?;
            let report = SyncEngine::new(source)
                .page_size(config.source.page_size)
                .sync(&mut store, days)
                .await?;
            print_json(&report)?;
        }

        Commands::Analyze { days } => {
            let days = days.unwrap_or(config.analysis.default_days);
            let ctx = resolve_context(&config).await;
            let store = open_store(&config)?;
            emit(metrics::analyze(&store, &ctx, days))?;
        }

        Commands::Current => {
            let source = NightscoutSource::new(config.source.nightscout())
                .context("Cannot fetch the current reading")?;
            let ctx = ThresholdsResolver::new(&source).resolve().await;
            emit(metrics::current_glucose(&source, &ctx).await)?;
        }

        Commands::Weekly { days } => {
            let days = days.unwrap_or(config.analysis.default_days);
            let ctx = resolve_context(&config).await;
            let store = open_store(&config)?;
            let readings = store.query(TimeRange::last_days(days))?;
            emit(metrics::weekly_summary(&readings, &ctx))?;
        }

        Commands::Compare { period1, period2 } => {
            let ctx = resolve_context(&config).await;
            let store = open_store(&config)?;
            emit(metrics::compare_periods(&store, &ctx, &period1, &period2))?;
        }

        Commands::Alerts { days, min_occurrences } => {
            let days = days.unwrap_or(config.analysis.default_days);
            let analysis = &config.analysis;
            let ctx = resolve_context(&config).await;
            let store = open_store(&config)?;
            let readings = store.query(TimeRange::last_days(days))?;

            let detector = TrendAlertDetector::new(ctx)
                .min_occurrences(min_occurrences.unwrap_or(analysis.min_occurrences))
                .overnight(analysis.overnight_start_hour, analysis.overnight_end_hour);
            emit(detector.report(&readings, days))?;
        }

        Commands::Insights { days } => {
            let days = days.unwrap_or(config.analysis.default_days);
            let ctx = resolve_context(&config).await;
            let store = open_store(&config)?;
            let readings = store.query(TimeRange::last_days(days))?;
            emit(ml_insights(&readings, &ctx.thresholds, &config.analysis.ml_options()))?;
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!("Config written to {}", path.display());
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("glucoscope={}", config.logging.level)));
    let json = config.logging.is_json();

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn open_store(config: &Config) -> anyhow::Result<ReadingStore> {
    let path = &config.storage.db_path;
    ReadingStore::open(path).with_context(|| format!("Failed to open reading store at {}", path.display()))
}

/// Server thresholds when a source is configured, defaults otherwise
async fn resolve_context(config: &Config) -> AnalysisContext {
    match NightscoutSource::new(config.source.nightscout()) {
        Ok(source) => ThresholdsResolver::new(&source).resolve().await,
        Err(e) => {
            tracing::warn!(error = %e, "No remote source, using default thresholds");
            AnalysisContext::default()
        }
    }
}

#[derive(Serialize)]
struct ErrorDocument {
    error: String,
    generated_at: String,
}

/// Missing or insufficient data is a result document, not a failure
fn emit<T: Serialize>(result: AnalysisResult<T>) -> anyhow::Result<()> {
    match result {
        Ok(value) => print_json(&value),
        Err(e @ (AnalysisError::DataUnavailable(_) | AnalysisError::InsufficientData { .. })) => {
            tracing::info!(reason = %e, "Analysis produced no result");
            print_json(&ErrorDocument {
                error: e.to_string(),
                generated_at: Utc::now().to_rfc3339(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
