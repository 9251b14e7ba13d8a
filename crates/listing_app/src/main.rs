use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;
use tokio_util::sync::CancellationToken;

use listing_core::{ColumnMap, ListingRecord, FIELD_NAMES};
use listing_engine::{
    FetchSettings, JsonFileStore, PatternRegistry, PersistencePipeline, ReqwestFetcher,
    RetryPolicy, RunSettings, Runner, UpdateMode,
};
use listing_logging::LogDestination;

/// Scrape rental listing pages into a tabular store.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Run mode: 'new_only' appends unseen listings, 'full_update'
    /// re-scrapes and rewrites every stored row
    #[arg(long, default_value = "new_only")]
    mode: String,

    /// Listing URL to process; repeatable
    #[arg(long = "url")]
    urls: Vec<String>,

    /// File with one listing URL per line ('#' starts a comment)
    #[arg(long)]
    urls_file: Option<PathBuf>,

    /// Path of the JSON grid store
    #[arg(long, default_value = "listings.json")]
    store: PathBuf,

    /// Extract a single page and print the record as JSON, without
    /// touching the store
    #[arg(long)]
    debug_html: Option<String>,

    /// Also write the log to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log verbosity (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.log_file {
        Some(ref path) => listing_logging::initialize(LogDestination::Both(path), cli.log_level),
        None => listing_logging::initialize(LogDestination::Terminal, cli.log_level),
    }

    let registry = PatternRegistry::load()?;
    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let pipeline = PersistencePipeline::new(ColumnMap::default(), RetryPolicy::default());
    let runner = Runner::new(registry, Box::new(fetcher), pipeline, RunSettings::default());

    if let Some(ref url) = cli.debug_html {
        let record = runner.scrape_single(url).await;
        println!("{}", serde_json::to_string_pretty(&record_to_json(&record))?);
        return Ok(());
    }

    let mode: UpdateMode = cli
        .mode
        .parse()
        .map_err(|message: String| anyhow::anyhow!(message))?;
    let urls = collect_urls(&cli)?;
    if urls.is_empty() && mode == UpdateMode::NewOnly {
        anyhow::bail!("no listing urls given; pass --url or --urls-file");
    }

    let store = JsonFileStore::open(&cli.store)?;
    log::info!("using store at {}", store.path().display());

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("interrupt received, finishing the current listing");
            cancel_clone.cancel();
        }
    });

    let result = runner.run(mode, &urls, &store, &cancel).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.is_fatal() {
        std::process::exit(1);
    }
    Ok(())
}

fn collect_urls(cli: &Cli) -> anyhow::Result<Vec<String>> {
    let mut urls = cli.urls.clone();
    if let Some(ref path) = cli.urls_file {
        let text = std::fs::read_to_string(path)
            .map_err(|err| anyhow::anyhow!("could not read {}: {err}", path.display()))?;
        urls.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from),
        );
    }
    Ok(urls)
}

fn record_to_json(record: &ListingRecord) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for field in FIELD_NAMES {
        map.insert(
            field.to_string(),
            serde_json::Value::String(record.get(field).to_string()),
        );
    }
    if let Some(error) = record.error() {
        map.insert(
            "error".to_string(),
            serde_json::Value::String(error.to_string()),
        );
    }
    serde_json::Value::Object(map)
}
