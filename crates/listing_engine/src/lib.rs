//! Listing engine: pattern-based extraction and store persistence.
mod decode;
mod detect;
mod extract;
mod fetch;
mod patterns;
mod persist;
mod retry;
mod run;
mod store;
mod store_file;
mod types;

pub use decode::{decode_html, DecodeError, DecodedHtml};
pub use detect::detect;
pub use extract::Extractor;
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher};
pub use patterns::{
    Cardinality, ConfigError, FieldSelector, PatternDefinition, PatternRegistry, DEFAULT_PATTERN,
    PRECEDENCE,
};
pub use persist::{PersistencePipeline, WriteOutcome};
pub use retry::RetryPolicy;
pub use run::{RunSettings, Runner, UpdateMode};
pub use store::{CellWrite, RangeWrite, StoreError, TabularStore};
pub use store_file::JsonFileStore;
pub use types::{FetchError, FetchFailureKind, FetchMetadata, FetchOutput};
