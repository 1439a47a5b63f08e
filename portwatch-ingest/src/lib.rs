//! Ingestion gateway: remote CSV download with a time-to-live cache and a
//! stale-cache fallback when the remote source is unreachable.

pub mod cache;
pub mod gateway;
pub mod source;

pub use cache::{CacheStore, FileCache, MemoryCache};
pub use gateway::{clean_download, IngestionGateway};
pub use source::{HttpSource, RemoteSource};

use chrono::NaiveDate;
use portwatch_core::{parse_date, RawTable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataOrigin {
    /// Fresh cache entry, no network call was made.
    Cache,
    /// Downloaded during this fetch.
    Remote,
    /// Download failed and an expired cache entry was used instead.
    StaleCache,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestMetadata {
    pub record_count: usize,
    pub last_updated: Option<NaiveDate>,
}

impl IngestMetadata {
    pub fn from_table(table: &RawTable) -> Self {
        let last_updated = table.column_index("DATE").and_then(|col| {
            (0..table.len())
                .filter_map(|row| table.cell(row, col).and_then(parse_date))
                .max()
        });

        Self {
            record_count: table.len(),
            last_updated,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ingested {
    pub table: RawTable,
    pub origin: DataOrigin,
    pub metadata: IngestMetadata,
}
