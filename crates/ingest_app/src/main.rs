//! `comic-ingest`: incremental comic chapter synchronizer.
//!
//! Exit codes: 0 when the work was identified and synced (partial chapter
//! failures included), 2 when the initial fetch or extraction fails.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};
use log::{error, warn, LevelFilter};
use tokio_util::sync::CancellationToken;

use engine_logging::LogDestination;
use ingest_engine::{
    FetchSettings, FreshnessGate, HarvestPolicy, HttpApiRepository, ImageStore, NoopRepository,
    ReqwestFetcher, RequestPacer, Repository, SqliteRepository, SyncEngine, SyncOptions,
    SyncResult, TruyenPageExtractor, DEFAULT_USER_AGENT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Local SQLite database.
    Sqlite,
    /// Remote story-service REST API.
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogTarget {
    Terminal,
    File,
    Both,
}

impl From<LogTarget> for LogDestination {
    fn from(target: LogTarget) -> Self {
        match target {
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::File => LogDestination::File,
            LogTarget::Both => LogDestination::Both,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "comic-ingest", version)]
#[command(about = "Incrementally synchronize a comic listing page into local storage")]
struct Cli {
    /// Source listing URL of the work to synchronize.
    url: String,

    /// Only refresh the work metadata; do not crawl chapters.
    #[arg(long)]
    skip_chapters: bool,

    /// Do not write to any repository backend (images are still stored).
    #[arg(long)]
    skip_store: bool,

    /// Repository backend for metadata.
    #[arg(long, value_enum, default_value_t = Backend::Sqlite)]
    backend: Backend,

    /// SQLite connection string for the sqlite backend.
    #[arg(long, env = "INGEST_DATABASE_URL", default_value = "sqlite://comics.db?mode=rwc")]
    database_url: String,

    /// Base URL of the content API for the api backend.
    #[arg(long, env = "INGEST_API_BASE")]
    api_base: Option<String>,

    /// Root directory for downloaded images and info.json sidecars.
    #[arg(long, default_value = "./images")]
    images_root: PathBuf,

    /// Freshness window; works synced more recently than this are skipped.
    #[arg(long, default_value_t = 24)]
    min_interval_hours: u64,

    /// Sync even inside the freshness window.
    #[arg(long)]
    force: bool,

    /// Re-harvest chapters the repository already has.
    #[arg(long)]
    refresh_existing: bool,

    /// Concurrent chapter harvests.
    #[arg(long, default_value_t = 2)]
    concurrency: usize,

    /// Minimum delay between outbound requests, milliseconds.
    #[arg(long, default_value_t = 1000)]
    min_delay_ms: u64,

    /// Maximum delay between outbound requests, milliseconds.
    #[arg(long, default_value_t = 2500)]
    max_delay_ms: u64,

    /// Where log output goes.
    #[arg(long, value_enum, default_value_t = LogTarget::Terminal)]
    log: LogTarget,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    engine_logging::initialize(cli.log.into(), log_level(cli.verbose));

    match run(cli).await {
        Ok(result) => {
            print_summary(&result);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("sync failed: {err:#}");
            eprintln!("sync failed: {err:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<SyncResult> {
    let pacer = Arc::new(RequestPacer::new(
        Duration::from_millis(cli.min_delay_ms),
        Duration::from_millis(cli.max_delay_ms),
    ));
    let settings = FetchSettings {
        user_agent: DEFAULT_USER_AGENT.to_string(),
        ..FetchSettings::default()
    };
    let fetcher = Arc::new(ReqwestFetcher::new(settings, pacer).context("building fetcher")?);

    let repository: Arc<dyn Repository> = if cli.skip_store {
        Arc::new(NoopRepository)
    } else {
        match cli.backend {
            Backend::Sqlite => Arc::new(
                SqliteRepository::connect(&cli.database_url)
                    .await
                    .context("opening sqlite database")?,
            ),
            Backend::Api => {
                let base = cli
                    .api_base
                    .clone()
                    .context("--api-base (or INGEST_API_BASE) is required for the api backend")?;
                Arc::new(HttpApiRepository::new(base))
            }
        }
    };

    let options = SyncOptions {
        crawl_chapters: !cli.skip_chapters,
        skip_existing: !cli.refresh_existing,
        force: cli.force,
        concurrency: cli.concurrency,
    };
    let gate = FreshnessGate::new(Duration::from_secs(cli.min_interval_hours * 60 * 60));
    let engine = SyncEngine::new(
        fetcher,
        Arc::new(TruyenPageExtractor),
        repository,
        Arc::new(ImageStore::new(cli.images_root)),
        HarvestPolicy::default(),
        gate,
        options,
    );

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight chapters");
            watcher.cancel();
        }
    });

    let result = engine.sync(&cli.url, &cancel).await?;
    Ok(result)
}

fn print_summary(result: &SyncResult) {
    if result.skipped {
        println!(
            "{}: inside freshness window, nothing to do (use --force to override)",
            result.work_slug
        );
        return;
    }
    println!(
        "{}: {} chapters stored, {} skipped, {} failed, {} images stored ({} policy-rejected)",
        result.work_slug,
        result.chapters_processed,
        result.chapters_skipped,
        result.chapters_failed.len(),
        result.images_stored,
        result.images_rejected
    );
    for failure in &result.chapters_failed {
        println!(
            "  chapter {}: {} ({})",
            ingest_engine::format_chapter_number(failure.number),
            failure.kind,
            failure.message
        );
    }
}
