use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use scraper::Html;
use tokio_util::sync::CancellationToken;

use listing_core::{normalize_url_for_dedupe, ListingRecord, OperationResult};

use crate::decode::decode_html;
use crate::detect::detect;
use crate::extract::Extractor;
use crate::fetch::Fetcher;
use crate::patterns::PatternRegistry;
use crate::persist::PersistencePipeline;
use crate::store::TabularStore;

/// What a run does with the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Scrape only URLs not already present and append them.
    NewOnly,
    /// Re-scrape every stored URL and rewrite its row in place.
    FullUpdate,
}

impl FromStr for UpdateMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "new_only" => Ok(UpdateMode::NewOnly),
            "full_update" => Ok(UpdateMode::FullUpdate),
            other => Err(format!(
                "unknown mode '{other}', expected 'new_only' or 'full_update'"
            )),
        }
    }
}

/// Pacing between page fetches. The pause is drawn uniformly from the
/// configured interval so request timing does not form a fixed cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub page_pause_min: Duration,
    pub page_pause_max: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            page_pause_min: Duration::from_secs(3),
            page_pause_max: Duration::from_secs(5),
        }
    }
}

impl RunSettings {
    /// No pacing, for tests.
    pub fn immediate() -> Self {
        Self {
            page_pause_min: Duration::ZERO,
            page_pause_max: Duration::ZERO,
        }
    }
}

/// Drives a whole run: reads store state, scrapes the listings the mode
/// calls for and hands the records to the persistence pipeline.
pub struct Runner {
    registry: PatternRegistry,
    fetcher: Box<dyn Fetcher>,
    pipeline: PersistencePipeline,
    settings: RunSettings,
}

impl Runner {
    pub fn new(
        registry: PatternRegistry,
        fetcher: Box<dyn Fetcher>,
        pipeline: PersistencePipeline,
        settings: RunSettings,
    ) -> Self {
        Self {
            registry,
            fetcher,
            pipeline,
            settings,
        }
    }

    /// Execute one run. Cancellation is honored between listings; work
    /// already persisted stays persisted.
    pub async fn run(
        &self,
        mode: UpdateMode,
        urls: &[String],
        store: &dyn TabularStore,
        cancel: &CancellationToken,
    ) -> OperationResult {
        let mut result = OperationResult::new();
        match mode {
            UpdateMode::NewOnly => {
                self.run_new_only(urls, store, cancel, &mut result).await;
            }
            UpdateMode::FullUpdate => {
                self.run_full_update(store, cancel, &mut result).await;
            }
        }
        log::info!(
            "run finished: status {:?}, {} processed, {} succeeded, {} failed",
            result.status,
            result.processed,
            result.succeeded,
            result.failed
        );
        result
    }

    /// Scrape a single listing without touching any store. Used by the
    /// extraction debug mode.
    pub async fn scrape_single(&self, url: &str) -> ListingRecord {
        self.scrape(url).await
    }

    async fn run_new_only(
        &self,
        urls: &[String],
        store: &dyn TabularStore,
        cancel: &CancellationToken,
        result: &mut OperationResult,
    ) {
        let url_col = match self.pipeline.columns().index_of("url") {
            Some(col) => col,
            None => {
                result.record_fatal("store", "no url column configured");
                return;
            }
        };
        let column = match store.read_column(url_col).await {
            Ok(column) => column,
            Err(err) => {
                result.record_fatal("store", format!("could not read stored urls: {err}"));
                return;
            }
        };
        // Row 1 is the header.
        let existing_count = column.len().saturating_sub(1);
        let mut known: BTreeSet<String> = column
            .iter()
            .skip(1)
            .filter(|url| !url.is_empty())
            .map(|url| normalize_url_for_dedupe(url))
            .collect();

        let mut fresh: Vec<&String> = Vec::new();
        for url in urls {
            let normalized = normalize_url_for_dedupe(url);
            if known.contains(&normalized) {
                log::debug!("already stored, skipping: {url}");
                continue;
            }
            known.insert(normalized);
            fresh.push(url);
        }
        log::info!(
            "{} of {} urls are new ({} already stored)",
            fresh.len(),
            urls.len(),
            existing_count
        );

        let mut records = Vec::with_capacity(fresh.len());
        for (index, url) in fresh.iter().enumerate() {
            if cancel.is_cancelled() {
                log::info!("cancelled, persisting the {} listings scraped so far", records.len());
                break;
            }
            if index > 0 {
                self.page_pause().await;
            }
            records.push(self.scrape(url).await);
        }

        self.pipeline
            .append_new(store, &records, existing_count, result)
            .await;
    }

    async fn run_full_update(
        &self,
        store: &dyn TabularStore,
        cancel: &CancellationToken,
        result: &mut OperationResult,
    ) {
        let columns = self.pipeline.columns();
        let url_col = match columns.index_of("url") {
            Some(col) => col,
            None => {
                result.record_fatal("store", "no url column configured");
                return;
            }
        };
        let column = match store.read_column(url_col).await {
            Ok(column) => column,
            Err(err) => {
                result.record_fatal("store", format!("could not read stored urls: {err}"));
                return;
            }
        };

        let number_col = columns.index_of("number");
        let mut rows: Vec<(usize, ListingRecord)> = Vec::new();
        let mut scraped = 0usize;
        for (index, url) in column.iter().enumerate().skip(1) {
            if url.is_empty() {
                continue;
            }
            if cancel.is_cancelled() {
                log::info!("cancelled, persisting the {} listings scraped so far", rows.len());
                break;
            }
            if scraped > 0 {
                self.page_pause().await;
            }
            scraped += 1;
            let row = index + 1;
            let mut record = self.scrape(url).await;
            if !record.is_error() {
                if let Some(col) = number_col {
                    // Rows keep their display number across updates.
                    match store.read_cell(row, col).await {
                        Ok(number) if !number.is_empty() => record.set("number", number),
                        Ok(_) => {}
                        Err(err) => log::warn!("row {row}: could not read number: {err}"),
                    }
                }
            }
            rows.push((row, record));
        }

        self.pipeline.update_rows(store, &rows, result).await;
    }

    async fn scrape(&self, url: &str) -> ListingRecord {
        log::info!("scraping {url}");
        let output = match self.fetcher.fetch(url).await {
            Ok(output) => output,
            Err(err) => {
                log::warn!("fetch failed for {url}: {err}");
                return ListingRecord::failed(url, err.to_string());
            }
        };
        let decoded = match decode_html(&output.bytes, output.metadata.content_type.as_deref()) {
            Ok(decoded) => decoded,
            Err(err) => {
                log::warn!("decode failed for {url}: {err}");
                return ListingRecord::failed(url, err.to_string());
            }
        };
        self.parse_record(&decoded.html, url)
    }

    // Kept synchronous: the parsed DOM must never be held across an await.
    fn parse_record(&self, html: &str, url: &str) -> ListingRecord {
        let document = Html::parse_document(html);
        let detected = detect(&document, &self.registry);
        let mut record = Extractor::new(&self.registry).extract(&document, url, &detected);
        // The document itself never carries its own address.
        record.set("url", url);
        record
    }

    async fn page_pause(&self) {
        let min = self.settings.page_pause_min;
        let span = self.settings.page_pause_max.saturating_sub(min);
        let pause = min + span.mul_f64(fastrand::f64());
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
}
