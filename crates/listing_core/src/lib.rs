//! Listing core: canonical record shape, field processors and result types.
mod columns;
mod processor;
mod record;
mod result;

pub use columns::{
    column_label, CellAddress, ColumnMap, RowRange, ESSENTIAL_FIELDS, IDENTITY_FIELDS,
};
pub use processor::{clean_text, process_age, process_currency, process_number, ProcessingRule};
pub use record::{
    normalize_url_for_dedupe, property_id_from_url, ListingRecord, EXTRACTED_FIELDS, FIELD_NAMES,
};
pub use result::{FailureEntry, OperationResult, OperationStatus};
