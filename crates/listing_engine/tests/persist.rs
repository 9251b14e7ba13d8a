use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use listing_core::{ColumnMap, ListingRecord, OperationResult, OperationStatus};
use listing_engine::{
    CellWrite, PersistencePipeline, RangeWrite, RetryPolicy, StoreError, TabularStore,
    WriteOutcome,
};

/// Store double with per-method scripted failure counts. `u32::MAX`
/// means "always fail".
#[derive(Default)]
struct MockStore {
    range_failures: Mutex<u32>,
    cell_failures: Mutex<u32>,
    error: Mutex<Option<StoreError>>,
    cells: Mutex<BTreeMap<(usize, usize), String>>,
    range_batch_sizes: Mutex<Vec<usize>>,
    cell_batch_sizes: Mutex<Vec<usize>>,
    op_calls: Mutex<u32>,
}

impl MockStore {
    fn new() -> Self {
        Self::default()
    }

    fn failing_ranges(self, times: u32) -> Self {
        *self.range_failures.lock().unwrap() = times;
        self
    }

    fn failing_cells(self, times: u32) -> Self {
        *self.cell_failures.lock().unwrap() = times;
        self
    }

    fn with_error(self, error: StoreError) -> Self {
        *self.error.lock().unwrap() = Some(error);
        self
    }

    fn preset(&self, row: usize, col: usize, value: &str) {
        self.cells
            .lock()
            .unwrap()
            .insert((row, col), value.to_string());
    }

    fn cell(&self, row: usize, col: usize) -> String {
        self.cells
            .lock()
            .unwrap()
            .get(&(row, col))
            .cloned()
            .unwrap_or_default()
    }

    fn next_error(&self) -> StoreError {
        self.error
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(StoreError::Transient("scripted failure".into()))
    }

    fn should_fail(counter: &Mutex<u32>) -> bool {
        let mut remaining = counter.lock().unwrap();
        if *remaining == 0 {
            return false;
        }
        if *remaining != u32::MAX {
            *remaining -= 1;
        }
        true
    }
}

#[async_trait]
impl TabularStore for MockStore {
    async fn read_column(&self, col: usize) -> Result<Vec<String>, StoreError> {
        let cells = self.cells.lock().unwrap();
        let last_row = cells.keys().map(|(row, _)| *row).max().unwrap_or(0);
        Ok((1..=last_row)
            .map(|row| cells.get(&(row, col)).cloned().unwrap_or_default())
            .collect())
    }

    async fn read_cell(&self, row: usize, col: usize) -> Result<String, StoreError> {
        Ok(self.cell(row, col))
    }

    async fn write_ranges(&self, writes: &[RangeWrite]) -> Result<(), StoreError> {
        *self.op_calls.lock().unwrap() += 1;
        self.range_batch_sizes.lock().unwrap().push(writes.len());
        if Self::should_fail(&self.range_failures) {
            return Err(self.next_error());
        }
        let mut cells = self.cells.lock().unwrap();
        for write in writes {
            for (offset, value) in write.values.iter().enumerate() {
                cells.insert(
                    (write.range.row, write.range.first_col + offset),
                    value.clone(),
                );
            }
        }
        Ok(())
    }

    async fn write_cells(&self, writes: &[CellWrite]) -> Result<(), StoreError> {
        *self.op_calls.lock().unwrap() += 1;
        self.cell_batch_sizes.lock().unwrap().push(writes.len());
        if Self::should_fail(&self.cell_failures) {
            return Err(self.next_error());
        }
        let mut cells = self.cells.lock().unwrap();
        for write in writes {
            cells.insert((write.address.row, write.address.col), write.value.clone());
        }
        Ok(())
    }
}

fn pipeline() -> PersistencePipeline {
    PersistencePipeline::new(ColumnMap::default(), RetryPolicy::immediate(0))
}

fn sample_record(url: &str) -> ListingRecord {
    let mut record = ListingRecord::empty();
    record.set("url", url);
    record.set("property_id", "000012345678");
    record.set("name", "メゾン青葉 101号室");
    record.set("rent", "55000");
    record.set("layout", "2LDK");
    record.set("address", "東京都渋谷区神南1-2-3");
    record
}

#[tokio::test]
async fn whole_row_write_covers_the_full_column_span() {
    let store = MockStore::new();
    let pipeline = pipeline();
    let record = sample_record("https://example.test/jnc_000012345678/");

    let outcome = pipeline.persist_record(&store, 2, &record).await;
    assert_eq!(outcome, WriteOutcome::Success);
    assert_eq!(*store.range_batch_sizes.lock().unwrap(), vec![1]);

    assert_eq!(store.cell(2, 1), "1"); // number falls back to row - 1
    assert_eq!(store.cell(2, 2), "https://example.test/jnc_000012345678/");
    assert_eq!(store.cell(2, 7), "55000");
    // Sparse fields land as explicit empties, not holes.
    assert_eq!(store.cell(2, 23), "");
    assert!(store.cells.lock().unwrap().contains_key(&(2, 23)));
}

#[tokio::test]
async fn rewriting_a_row_is_idempotent() {
    let store = MockStore::new();
    let pipeline = pipeline();
    let mut record = sample_record("https://example.test/jnc_1/");
    record.set("number", "1");

    assert_eq!(
        pipeline.persist_record(&store, 2, &record).await,
        WriteOutcome::Success
    );
    let first = store.cells.lock().unwrap().clone();
    assert_eq!(
        pipeline.persist_record(&store, 2, &record).await,
        WriteOutcome::Success
    );
    assert_eq!(*store.cells.lock().unwrap(), first);
}

#[tokio::test]
async fn number_continues_from_previous_row() {
    let store = MockStore::new();
    store.preset(2, 1, "7");
    let pipeline = pipeline();
    let record = sample_record("https://example.test/jnc_2/");

    pipeline.persist_record(&store, 3, &record).await;
    assert_eq!(store.cell(3, 1), "8");
}

#[tokio::test]
async fn number_falls_back_when_previous_is_not_numeric() {
    let store = MockStore::new();
    store.preset(4, 1, "n/a");
    let pipeline = pipeline();
    let record = sample_record("https://example.test/jnc_3/");

    pipeline.persist_record(&store, 5, &record).await;
    assert_eq!(store.cell(5, 1), "4");
}

#[tokio::test]
async fn range_failure_degrades_to_cell_batches() {
    let store = MockStore::new().failing_ranges(u32::MAX);
    let pipeline = pipeline();
    let record = sample_record("https://example.test/jnc_4/");

    let outcome = pipeline.persist_record(&store, 2, &record).await;
    assert_eq!(outcome, WriteOutcome::Success);
    // All present fields landed through the cell path.
    assert_eq!(store.cell(2, 4), "メゾン青葉 101号室");
    assert_eq!(store.cell(2, 11), "2LDK");
}

#[tokio::test]
async fn cell_failure_degrades_to_essential_subset() {
    let store = MockStore::new().failing_ranges(u32::MAX).failing_cells(1);
    let pipeline = pipeline();
    let record = sample_record("https://example.test/jnc_5/");

    let outcome = pipeline.persist_record(&store, 2, &record).await;
    assert_eq!(
        outcome,
        WriteOutcome::PartialSuccess {
            detail: "essential columns only".into()
        }
    );
    assert_eq!(store.cell(2, 2), "https://example.test/jnc_5/");
    assert_eq!(store.cell(2, 7), "55000");
}

#[tokio::test]
async fn essential_failure_degrades_to_identity_cells() {
    let store = MockStore::new().failing_ranges(u32::MAX).failing_cells(2);
    let pipeline = pipeline();
    let record = sample_record("https://example.test/jnc_6/");

    let outcome = pipeline.persist_record(&store, 2, &record).await;
    assert_eq!(
        outcome,
        WriteOutcome::PartialSuccess {
            detail: "identity cells only".into()
        }
    );
    assert_eq!(store.cell(2, 2), "https://example.test/jnc_6/");
    assert_eq!(store.cell(2, 3), "000012345678");
    assert_eq!(store.cell(2, 7), "55000");
    assert_eq!(store.cell(2, 11), "2LDK");
    // Non-identity fields never landed.
    assert_eq!(store.cell(2, 4), "");
}

#[tokio::test]
async fn exhausted_ladder_reports_the_first_error() {
    let store = MockStore::new()
        .failing_ranges(u32::MAX)
        .failing_cells(u32::MAX)
        .with_error(StoreError::Permanent("grid is gone".into()));
    let pipeline = pipeline();
    let record = sample_record("https://example.test/jnc_7/");

    let outcome = pipeline.persist_record(&store, 2, &record).await;
    match outcome {
        WriteOutcome::Failure { reason } => assert!(reason.contains("grid is gone")),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn append_reserves_urls_in_fifty_cell_chunks() {
    let store = MockStore::new();
    let pipeline = pipeline();
    let records: Vec<ListingRecord> = (0..60)
        .map(|i| sample_record(&format!("https://example.test/jnc_{i:012}/")))
        .collect();
    let mut result = OperationResult::new();

    pipeline.append_new(&store, &records, 0, &mut result).await;

    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(result.succeeded, 60);
    // Phase one: 60 URL cells split at the per-request ceiling.
    assert_eq!(
        store.cell_batch_sizes.lock().unwrap()[..2],
        [50, 10]
    );
    // First record at row 2 numbered 1, last at row 61 numbered 60.
    assert_eq!(store.cell(2, 1), "1");
    assert_eq!(store.cell(61, 1), "60");
}

#[tokio::test]
async fn append_skips_unscrapable_records_but_keeps_their_rows() {
    let store = MockStore::new();
    let pipeline = pipeline();
    let records = vec![
        sample_record("https://example.test/jnc_a/"),
        ListingRecord::failed("https://example.test/jnc_b/", "fetch failed: timeout"),
        sample_record("https://example.test/jnc_c/"),
    ];
    let mut result = OperationResult::new();

    pipeline.append_new(&store, &records, 3, &mut result).await;

    assert_eq!(result.status, OperationStatus::PartialError);
    assert_eq!(result.succeeded, 2);
    assert_eq!(result.failed, 1);
    assert_eq!(result.failures[0].identifier, "https://example.test/jnc_b/");
    // The failed listing still owns its reserved row.
    assert_eq!(store.cell(6, 2), "https://example.test/jnc_b/");
    assert_eq!(store.cell(6, 4), "");
    assert_eq!(store.cell(7, 2), "https://example.test/jnc_c/");
}

#[tokio::test]
async fn failed_url_reservation_appends_nothing() {
    let store = MockStore::new().failing_cells(u32::MAX);
    let pipeline = pipeline();
    let records = vec![sample_record("https://example.test/jnc_d/")];
    let mut result = OperationResult::new();

    pipeline.append_new(&store, &records, 0, &mut result).await;

    assert_eq!(result.status, OperationStatus::PartialError);
    assert_eq!(result.failed, 1);
    assert!(store.range_batch_sizes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_reservation_keeps_per_record_scrape_errors() {
    let store = MockStore::new().failing_cells(u32::MAX);
    let pipeline = pipeline();
    let records = vec![
        sample_record("https://example.test/jnc_d/"),
        ListingRecord::failed("https://example.test/jnc_e/", "fetch failed: timeout"),
    ];
    let mut result = OperationResult::new();

    pipeline.append_new(&store, &records, 0, &mut result).await;

    assert_eq!(result.failed, 2);
    assert!(result.failures[0].message.contains("row reservation failed"));
    assert_eq!(result.failures[1].message, "fetch failed: timeout");
}

#[tokio::test]
async fn update_batches_rows_in_tens() {
    let store = MockStore::new();
    let pipeline = pipeline();
    let rows: Vec<(usize, ListingRecord)> = (0..25)
        .map(|i| {
            (
                i + 2,
                sample_record(&format!("https://example.test/jnc_{i:012}/")),
            )
        })
        .collect();
    let mut result = OperationResult::new();

    pipeline.update_rows(&store, &rows, &mut result).await;

    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(result.succeeded, 25);
    assert_eq!(*store.range_batch_sizes.lock().unwrap(), vec![10, 10, 5]);
}

#[tokio::test]
async fn failed_update_batch_retries_records_individually() {
    let store = MockStore::new().failing_ranges(1);
    let pipeline = pipeline();
    let rows: Vec<(usize, ListingRecord)> = (0..3)
        .map(|i| {
            (
                i + 2,
                sample_record(&format!("https://example.test/jnc_{i:012}/")),
            )
        })
        .collect();
    let mut result = OperationResult::new();

    pipeline.update_rows(&store, &rows, &mut result).await;

    assert_eq!(result.succeeded, 3);
    // One failed batch of 3, then one single-row range per record.
    assert_eq!(*store.range_batch_sizes.lock().unwrap(), vec![3, 1, 1, 1]);
    assert_eq!(store.cell(3, 2), "https://example.test/jnc_000000000001/");
}

#[tokio::test(start_paused = true)]
async fn rate_limit_backoff_doubles_up_to_the_ceiling() {
    let policy = RetryPolicy::default();
    let start = tokio::time::Instant::now();
    let attempts = Mutex::new(0u32);

    let outcome = policy
        .run(|| async {
            let mut n = attempts.lock().unwrap();
            *n += 1;
            if *n <= 2 {
                Err(StoreError::RateLimited { retry_after: None })
            } else {
                Ok(())
            }
        })
        .await;

    assert!(outcome.is_ok());
    // 5s interval, fail; 5s + 45s, fail; 5s + 90s, success.
    assert_eq!(start.elapsed(), Duration::from_secs(150));
}

#[tokio::test(start_paused = true)]
async fn other_errors_escalate_more_gently() {
    let policy = RetryPolicy::default();
    let start = tokio::time::Instant::now();
    let attempts = Mutex::new(0u32);

    let outcome = policy
        .run(|| async {
            let mut n = attempts.lock().unwrap();
            *n += 1;
            if *n <= 3 {
                Err(StoreError::Transient("flaky".into()))
            } else {
                Ok(())
            }
        })
        .await;

    assert!(outcome.is_ok());
    // 5s; 5s + 45s; 5s + 67.5s; 5s + 101.25s.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(233_700));
    assert!(elapsed <= Duration::from_millis(233_800));
}

#[tokio::test(start_paused = true)]
async fn advised_retry_after_raises_the_next_wait() {
    let policy = RetryPolicy::default();
    let start = tokio::time::Instant::now();
    let attempts = Mutex::new(0u32);

    let outcome = policy
        .run(|| async {
            let mut n = attempts.lock().unwrap();
            *n += 1;
            if *n == 1 {
                Err(StoreError::RateLimited {
                    retry_after: Some(Duration::from_secs(120)),
                })
            } else {
                Ok(())
            }
        })
        .await;

    assert!(outcome.is_ok());
    // 5s interval, fail with a 120s hint; 5s + 120s (not 45s), success.
    assert_eq!(start.elapsed(), Duration::from_secs(130));
}

#[tokio::test(start_paused = true)]
async fn short_retry_after_never_lowers_the_wait() {
    let policy = RetryPolicy::default();
    let start = tokio::time::Instant::now();
    let attempts = Mutex::new(0u32);

    let outcome = policy
        .run(|| async {
            let mut n = attempts.lock().unwrap();
            *n += 1;
            if *n == 1 {
                Err(StoreError::RateLimited {
                    retry_after: Some(Duration::from_secs(1)),
                })
            } else {
                Ok(())
            }
        })
        .await;

    assert!(outcome.is_ok());
    // The 1s hint loses to the 45s initial wait.
    assert_eq!(start.elapsed(), Duration::from_secs(55));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_wait_saturates_at_five_minutes() {
    let policy = RetryPolicy::default();
    let start = tokio::time::Instant::now();
    let attempts = Mutex::new(0u32);

    let outcome: Result<(), StoreError> = policy
        .run(|| async {
            *attempts.lock().unwrap() += 1;
            Err(StoreError::RateLimited { retry_after: None })
        })
        .await;

    assert!(outcome.is_err());
    assert_eq!(*attempts.lock().unwrap(), 6); // initial try plus five retries
    // Waits: 45, 90, 180, 300, 300; plus six 5s intervals.
    assert_eq!(start.elapsed(), Duration::from_secs(945));
}

#[tokio::test]
async fn immediate_policy_counts_attempts() {
    let policy = RetryPolicy::immediate(2);
    let attempts = Mutex::new(0u32);

    let outcome: Result<(), StoreError> = policy
        .run(|| async {
            *attempts.lock().unwrap() += 1;
            Err(StoreError::Transient("nope".into()))
        })
        .await;

    assert!(outcome.is_err());
    assert_eq!(*attempts.lock().unwrap(), 3);
}
