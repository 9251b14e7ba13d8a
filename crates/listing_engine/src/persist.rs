use listing_core::{
    CellAddress, ColumnMap, ListingRecord, OperationResult, RowRange, ESSENTIAL_FIELDS,
    IDENTITY_FIELDS,
};

use crate::retry::RetryPolicy;
use crate::store::{CellWrite, RangeWrite, StoreError, TabularStore};

/// Per-request cell ceiling of the remote batch API.
const MAX_CELLS_PER_BATCH: usize = 50;
/// Per-request range ceiling for batched whole-row updates.
const MAX_RANGES_PER_BATCH: usize = 10;

/// Result of persisting one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Every mapped field landed (whole-row or full field batch).
    Success,
    /// Only a degraded subset landed; operators must treat the row as
    /// incomplete.
    PartialSuccess { detail: String },
    /// All strategies exhausted. Carries the error of the first, most
    /// complete attempt.
    Failure { reason: String },
}

/// Writes canonical records into the tabular store through an escalating
/// strategy ladder: whole-row range, 50-cell batches, essential subset,
/// then single identity cells. Every write is wrapped in the retry policy.
pub struct PersistencePipeline {
    columns: ColumnMap,
    policy: RetryPolicy,
}

impl PersistencePipeline {
    pub fn new(columns: ColumnMap, policy: RetryPolicy) -> Self {
        Self { columns, policy }
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    /// Persist one record at `row`, degrading through the strategy ladder.
    /// Identical content written twice leaves the store unchanged.
    pub async fn persist_record(
        &self,
        store: &dyn TabularStore,
        row: usize,
        record: &ListingRecord,
    ) -> WriteOutcome {
        let mut record = record.clone();
        if record.get("number").is_empty() {
            let number = self.next_number(store, row).await;
            record.set("number", number);
        }

        // Strategy 1: one contiguous range covering the full configured
        // column span. Sparse fields are written as explicit empties so a
        // rewrite clears stale cells instead of leaving them behind.
        let range_write = RangeWrite {
            range: RowRange {
                row,
                first_col: 1,
                last_col: self.columns.max_index(),
            },
            values: self.row_vector(&record),
        };
        let original_error = match self
            .policy
            .run(|| store.write_range(range_write.clone()))
            .await
        {
            Ok(()) => {
                log::debug!("row {row}: whole-row write succeeded");
                return WriteOutcome::Success;
            }
            Err(err) => {
                log::warn!("row {row}: whole-row write failed, trying field batches: {err}");
                err
            }
        };

        // Strategy 2: every present field as individual cells, chunked to
        // the remote's per-request ceiling.
        let all_writes = self.cell_writes(row, &record, None);
        match self.write_chunked(store, &all_writes).await {
            Ok(()) => {
                log::debug!("row {row}: field-batch write succeeded");
                return WriteOutcome::Success;
            }
            Err(err) => {
                log::warn!("row {row}: field-batch write failed, trying essential subset: {err}");
            }
        }

        // Strategy 3: only the curated essential columns.
        let essential_writes = self.cell_writes(row, &record, Some(&ESSENTIAL_FIELDS));
        match self.write_chunked(store, &essential_writes).await {
            Ok(()) => {
                log::info!("row {row}: essential subset written, row is incomplete");
                return WriteOutcome::PartialSuccess {
                    detail: "essential columns only".into(),
                };
            }
            Err(err) => {
                log::warn!("row {row}: essential write failed, trying single cells: {err}");
            }
        }

        // Strategy 4: highest-priority identity fields, one cell at a
        // time, each independently retried.
        let identity_writes = self.cell_writes(row, &record, Some(&IDENTITY_FIELDS));
        let mut any_failed = false;
        for write in &identity_writes {
            let result = self
                .policy
                .run(|| store.write_cells(std::slice::from_ref(write)))
                .await;
            if let Err(err) = result {
                log::error!("row {row}: single-cell write {} failed: {err}", write.address);
                any_failed = true;
            }
        }
        if !identity_writes.is_empty() && !any_failed {
            log::info!("row {row}: identity cells written, row is incomplete");
            return WriteOutcome::PartialSuccess {
                detail: "identity cells only".into(),
            };
        }

        WriteOutcome::Failure {
            reason: original_error.to_string(),
        }
    }

    /// Append new records after the last used row.
    ///
    /// Two phases: reserve rows by batch-writing the URLs first, then
    /// persist each record through the ladder. Sequential numbers are
    /// assigned contiguously from each record's target row.
    pub async fn append_new(
        &self,
        store: &dyn TabularStore,
        records: &[ListingRecord],
        existing_count: usize,
        result: &mut OperationResult,
    ) {
        if records.is_empty() {
            return;
        }
        let url_col = match self.columns.index_of("url") {
            Some(col) => col,
            None => return,
        };
        // Row 1 is the header; data starts at row 2.
        let first_row = existing_count + 2;

        let url_writes: Vec<CellWrite> = records
            .iter()
            .enumerate()
            .map(|(offset, record)| CellWrite {
                address: CellAddress {
                    row: first_row + offset,
                    col: url_col,
                },
                value: record.get("url").to_string(),
            })
            .collect();

        if let Err(err) = self.write_chunked(store, &url_writes).await {
            log::error!("URL reservation failed, no rows appended: {err}");
            for record in records {
                // A record that already failed scraping keeps its own story.
                match record.error() {
                    Some(message) => result.record_failure(record.get("url"), message),
                    None => result.record_failure(
                        record.get("url"),
                        format!("row reservation failed: {err}"),
                    ),
                }
            }
            return;
        }
        log::info!("reserved {} rows starting at row {first_row}", records.len());

        for (offset, record) in records.iter().enumerate() {
            let row = first_row + offset;
            if let Some(message) = record.error() {
                result.record_failure(record.get("url"), message);
                continue;
            }
            let mut record = record.clone();
            record.set("number", (row - 1).to_string());
            self.persist_and_record(store, row, &record, result).await;
        }
    }

    /// Update known rows in place, batching whole-row ranges. A failed
    /// chunk degrades to the per-record ladder instead of dropping the
    /// chunk outright.
    pub async fn update_rows(
        &self,
        store: &dyn TabularStore,
        rows: &[(usize, ListingRecord)],
        result: &mut OperationResult,
    ) {
        let writable: Vec<&(usize, ListingRecord)> = rows
            .iter()
            .filter(|(_, record)| {
                if let Some(message) = record.error() {
                    result.record_failure(record.get("url"), message);
                    false
                } else {
                    true
                }
            })
            .collect();

        for chunk in writable.chunks(MAX_RANGES_PER_BATCH) {
            let writes: Vec<RangeWrite> = chunk
                .iter()
                .map(|(row, record)| RangeWrite {
                    range: RowRange {
                        row: *row,
                        first_col: 1,
                        last_col: self.columns.max_index(),
                    },
                    values: self.row_vector(record),
                })
                .collect();

            match self.policy.run(|| store.write_ranges(&writes)).await {
                Ok(()) => {
                    for _ in chunk {
                        result.record_success();
                    }
                }
                Err(err) => {
                    log::warn!(
                        "batched update of {} rows failed, retrying records individually: {err}",
                        chunk.len()
                    );
                    for (row, record) in chunk {
                        self.persist_and_record(store, *row, record, result).await;
                    }
                }
            }
        }
    }

    async fn persist_and_record(
        &self,
        store: &dyn TabularStore,
        row: usize,
        record: &ListingRecord,
        result: &mut OperationResult,
    ) {
        match self.persist_record(store, row, record).await {
            WriteOutcome::Success => result.record_success(),
            WriteOutcome::PartialSuccess { detail } => {
                result.record_partial(record.get("url"), detail);
            }
            WriteOutcome::Failure { reason } => {
                result.record_failure(record.get("url"), reason);
            }
        }
    }

    /// Sequential display number for a freshly appended row: previous
    /// row's number + 1, falling back to `row - 1` when the previous
    /// number is absent or non-numeric.
    async fn next_number(&self, store: &dyn TabularStore, row: usize) -> String {
        let fallback = row.saturating_sub(1).to_string();
        let Some(col) = self.columns.index_of("number") else {
            return fallback;
        };
        if row < 2 {
            return fallback;
        }
        match store.read_cell(row - 1, col).await {
            Ok(previous) => match previous.trim().parse::<u64>() {
                Ok(number) => (number + 1).to_string(),
                Err(_) => fallback,
            },
            Err(err) => {
                log::warn!("could not read previous row number: {err}");
                fallback
            }
        }
    }

    /// Serialize the record into the full configured column span, sparse
    /// fields as empty strings.
    fn row_vector(&self, record: &ListingRecord) -> Vec<String> {
        let mut values = vec![String::new(); self.columns.max_index()];
        for (field, col) in self.columns.iter() {
            values[col - 1] = record.get(field).to_string();
        }
        values
    }

    /// Cell writes for the record's non-empty fields, optionally limited
    /// to a subset, in column order.
    fn cell_writes(
        &self,
        row: usize,
        record: &ListingRecord,
        subset: Option<&[&str]>,
    ) -> Vec<CellWrite> {
        self.columns
            .iter()
            .filter(|(field, _)| subset.is_none_or(|fields| fields.contains(field)))
            .filter_map(|(field, col)| {
                let value = record.get(field);
                if value.is_empty() {
                    return None;
                }
                Some(CellWrite {
                    address: CellAddress { row, col },
                    value: value.to_string(),
                })
            })
            .collect()
    }

    async fn write_chunked(
        &self,
        store: &dyn TabularStore,
        writes: &[CellWrite],
    ) -> Result<(), StoreError> {
        for chunk in writes.chunks(MAX_CELLS_PER_BATCH) {
            self.policy.run(|| store.write_cells(chunk)).await?;
        }
        Ok(())
    }
}
