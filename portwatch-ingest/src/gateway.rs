use crate::{
    cache::{CacheStore, FileCache},
    source::{HttpSource, RemoteSource},
    DataOrigin, IngestMetadata, Ingested,
};
use portwatch_core::{parse_date, PortwatchConfig, PortwatchError, RawTable, Result};
use rand::{rngs::StdRng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const REQUIRED_COLUMNS: [&str; 2] = ["DATE", "PORTNAME"];

pub struct IngestionGateway {
    source: Arc<dyn RemoteSource>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
    seed: u64,
}

impl IngestionGateway {
    pub fn new(source: Arc<dyn RemoteSource>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            source,
            cache,
            ttl: Duration::from_secs(portwatch_core::DEFAULT_CACHE_TTL_SECS),
            seed: portwatch_core::DEFAULT_SAMPLE_SEED,
        }
    }

    pub fn from_config(config: &PortwatchConfig) -> Result<Self> {
        let source = HttpSource::new(
            config.source.url.clone(),
            Duration::from_secs(config.source.timeout_secs),
        )?;
        let cache = FileCache::new(config.cache.path.clone());

        Ok(Self::new(Arc::new(source), Arc::new(cache))
            .with_ttl(Duration::from_secs(config.cache.ttl_secs))
            .with_seed(config.sampling.seed))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Loads the raw table from a fresh cache or the remote source, falling
    /// back to a stale cache when the download fails, then optionally samples it.
    pub async fn fetch(&self, use_cache: bool, sample_fraction: Option<f64>) -> Result<Ingested> {
        let (table, origin) = if use_cache && self.cache.is_fresh(self.ttl) {
            info!(cache = %self.cache.describe(), "Using cached port traffic data");
            (self.cache.load()?, DataOrigin::Cache)
        } else {
            self.download_or_fallback().await?
        };

        let table = match sample_fraction {
            Some(fraction) => self.sample(table, fraction),
            None => table,
        };

        let metadata = IngestMetadata::from_table(&table);

        Ok(Ingested {
            table,
            origin,
            metadata,
        })
    }

    async fn download_or_fallback(&self) -> Result<(RawTable, DataOrigin)> {
        info!(source = self.source.name(), "Downloading port traffic CSV");

        match self.download().await {
            Ok(table) => {
                match self.cache.store(&table) {
                    Ok(()) => info!(cache = %self.cache.describe(), rows = table.len(), "Cached cleaned CSV data"),
                    Err(e) => warn!("Failed to write cache {}: {}", self.cache.describe(), e),
                }
                Ok((table, DataOrigin::Remote))
            }
            Err(e) => {
                error!("Failed to download/process CSV: {}", e);

                if self.cache.exists() {
                    warn!(cache = %self.cache.describe(), "Falling back to last known cached version");
                    return Ok((self.cache.load()?, DataOrigin::StaleCache));
                }

                if e.is_client_error() {
                    Err(e)
                } else {
                    Err(PortwatchError::NoDataAvailable)
                }
            }
        }
    }

    async fn download(&self) -> Result<RawTable> {
        let body = self.source.fetch_csv().await?;
        let table = RawTable::from_csv_str(&body)?;
        clean_download(table)
    }

    fn sample(&self, table: RawTable, fraction: f64) -> RawTable {
        if !(fraction > 0.0 && fraction < 1.0) {
            warn!(fraction, "Ignoring sample fraction, must be between 0 and 1");
            return table;
        }

        let amount = (fraction * table.len() as f64).round() as usize;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut indices = rand::seq::index::sample(&mut rng, table.len(), amount).into_vec();
        indices.sort_unstable();

        info!(
            rows = amount,
            total = table.len(),
            "Sampled {:.0}% of the full dataset",
            fraction * 100.0
        );

        table.select_rows(&indices)
    }
}

/// Normalizes a freshly downloaded table: canonical headers, coerced dates,
/// `PORT` naming, a derived `TRAFFIC` column and no rows without date or port.
pub fn clean_download(mut table: RawTable) -> Result<RawTable> {
    table.normalize_headers();

    info!(
        rows = table.len(),
        columns = ?table.headers(),
        "Loaded raw CSV"
    );

    let missing = table.missing_columns(&REQUIRED_COLUMNS);
    if !missing.is_empty() {
        return Err(PortwatchError::schema(missing));
    }

    if let Some(date_idx) = table.column_index("DATE") {
        let dates: Vec<String> = (0..table.len())
            .map(|row| {
                table
                    .cell(row, date_idx)
                    .and_then(parse_date)
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default()
            })
            .collect();
        table.set_column("DATE", dates);
    }

    table.rename_column("PORTNAME", "PORT");

    if !table.has_column("TRAFFIC") {
        let import_idx = table.column_index("IMPORT");
        let export_idx = table.column_index("EXPORT");
        let traffic: Vec<String> = (0..table.len())
            .map(|row| {
                let import = import_idx.and_then(|c| table.numeric(row, c)).unwrap_or(0.0);
                let export = export_idx.and_then(|c| table.numeric(row, c)).unwrap_or(0.0);
                (import + export).to_string()
            })
            .collect();
        table.set_column("TRAFFIC", traffic);
        info!("Derived TRAFFIC from IMPORT + EXPORT");
    }

    let (date_idx, port_idx) = match (table.column_index("DATE"), table.column_index("PORT")) {
        (Some(d), Some(p)) => (d, p),
        _ => return Err(PortwatchError::schema(["DATE", "PORT"])),
    };

    let before = table.len();
    table.retain_rows(|row| !row[date_idx].trim().is_empty() && !row[port_idx].trim().is_empty());
    if table.len() < before {
        info!(dropped = before - table.len(), "Dropped rows missing DATE or PORT");
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::fs::File;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::SystemTime;

    const BODY: &str = "\u{feff}date,portname,country,import,export\n\
        2024-01-01,Busan,KOR,10,5\n\
        2024/01/02 00:00:00+00,Busan,KOR,,7\n\
        garbage,Busan,KOR,1,1\n\
        2024-01-03,,KOR,1,1\n";

    struct StubSource {
        body: Option<String>,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn ok(body: &str) -> Arc<Self> {
            Arc::new(Self {
                body: Some(body.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                body: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteSource for StubSource {
        fn name(&self) -> &str {
            "stub"
        }

        async fn fetch_csv(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.body
                .clone()
                .ok_or_else(|| PortwatchError::Fetch("connection refused".to_string()))
        }
    }

    /// Formatted log output collected for the lifetime of a test.
    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogCapture {
        fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
            let writer = self.clone();
            tracing_subscriber::fmt()
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .finish()
        }

        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn cached_table() -> RawTable {
        RawTable::from_csv_str("DATE,PORT,TRAFFIC\n2023-12-31,Antwerp,4\n").unwrap()
    }

    fn numbered_table(rows: usize) -> RawTable {
        RawTable::new(
            vec!["DATE".into(), "PORT".into(), "N".into()],
            (0..rows)
                .map(|i| vec!["2024-01-01".into(), "Busan".into(), i.to_string()])
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_network() {
        let source = StubSource::ok(BODY);
        let cache = Arc::new(MemoryCache::with_table(cached_table(), Duration::from_secs(60)));
        let gateway = IngestionGateway::new(source.clone(), cache);

        let ingested = gateway.fetch(true, None).await.unwrap();

        assert_eq!(source.calls(), 0);
        assert_eq!(ingested.origin, DataOrigin::Cache);
        assert_eq!(ingested.table, cached_table());
    }

    #[tokio::test]
    async fn test_cache_disabled_downloads_even_when_fresh() {
        let source = StubSource::ok(BODY);
        let cache = Arc::new(MemoryCache::with_table(cached_table(), Duration::from_secs(60)));
        let gateway = IngestionGateway::new(source.clone(), cache);

        let ingested = gateway.fetch(false, None).await.unwrap();

        assert_eq!(source.calls(), 1);
        assert_eq!(ingested.origin, DataOrigin::Remote);
    }

    #[tokio::test]
    async fn test_download_is_cleaned_and_cached() {
        let source = StubSource::ok(BODY);
        let cache = Arc::new(MemoryCache::new());
        let gateway = IngestionGateway::new(source.clone(), cache.clone());

        let ingested = gateway.fetch(true, None).await.unwrap();
        let table = &ingested.table;

        assert_eq!(ingested.origin, DataOrigin::Remote);
        assert_eq!(table.len(), 2);
        assert!(table.has_column("PORT"));
        assert!(!table.has_column("PORTNAME"));

        let date = table.column_index("DATE").unwrap();
        let traffic = table.column_index("TRAFFIC").unwrap();
        assert_eq!(table.cell(1, date), Some("2024-01-02"));
        assert_eq!(table.numeric(0, traffic), Some(15.0));
        assert_eq!(table.numeric(1, traffic), Some(7.0));

        assert_eq!(cache.snapshot().as_ref(), Some(table));
        assert_eq!(ingested.metadata.record_count, 2);
        assert_eq!(
            ingested.metadata.last_updated,
            chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        );
    }

    #[tokio::test]
    async fn test_expired_cache_is_fallback_on_failure() {
        let source = StubSource::failing();
        let cache = Arc::new(MemoryCache::with_table(
            cached_table(),
            Duration::from_secs(7 * 3600),
        ));
        let gateway = IngestionGateway::new(source.clone(), cache);

        let ingested = gateway.fetch(true, None).await.unwrap();

        assert_eq!(source.calls(), 1);
        assert_eq!(ingested.origin, DataOrigin::StaleCache);
        assert_eq!(ingested.table, cached_table());
    }

    #[tokio::test]
    async fn test_stale_fallback_logs_a_warning() {
        let logs = LogCapture::default();
        let _guard = tracing::subscriber::set_default(logs.subscriber());

        let cache = Arc::new(MemoryCache::with_table(
            cached_table(),
            Duration::from_secs(7 * 3600),
        ));
        let gateway = IngestionGateway::new(StubSource::failing(), cache);
        let ingested = gateway.fetch(true, None).await.unwrap();
        assert_eq!(ingested.origin, DataOrigin::StaleCache);

        let output = logs.contents();
        let warning = output
            .lines()
            .find(|line| line.contains("Falling back to last known cached version"))
            .unwrap_or_else(|| panic!("no fallback warning in:\n{}", output));
        assert!(warning.contains("WARN"));
        assert!(warning.contains("memory"));
    }

    #[tokio::test]
    async fn test_expired_file_cache_falls_back_then_refreshes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw/cache.csv");
        let cache = FileCache::new(path.clone());
        cache.store(&cached_table()).unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(7 * 3600))
            .unwrap();

        let failing = StubSource::failing();
        let gateway = IngestionGateway::new(failing.clone(), Arc::new(cache.clone()));
        let stale = gateway.fetch(true, None).await.unwrap();
        assert_eq!(failing.calls(), 1);
        assert_eq!(stale.origin, DataOrigin::StaleCache);
        assert_eq!(stale.table, cached_table());

        let working = StubSource::ok(BODY);
        let gateway = IngestionGateway::new(working.clone(), Arc::new(cache.clone()));
        let fresh = gateway.fetch(true, None).await.unwrap();
        assert_eq!(working.calls(), 1);
        assert_eq!(fresh.origin, DataOrigin::Remote);
        assert!(cache.is_fresh(Duration::from_secs(portwatch_core::DEFAULT_CACHE_TTL_SECS)));
        assert_eq!(cache.load().unwrap(), fresh.table);

        let cached = gateway.fetch(true, None).await.unwrap();
        assert_eq!(working.calls(), 1);
        assert_eq!(cached.origin, DataOrigin::Cache);
    }

    #[tokio::test]
    async fn test_failure_without_cache_is_fatal() {
        let gateway = IngestionGateway::new(StubSource::failing(), Arc::new(MemoryCache::new()));
        assert!(matches!(
            gateway.fetch(true, None).await,
            Err(PortwatchError::NoDataAvailable)
        ));
    }

    #[tokio::test]
    async fn test_schema_error_without_cache_names_columns() {
        let gateway = IngestionGateway::new(
            StubSource::ok("DATE,COUNTRY\n2024-01-01,KOR\n"),
            Arc::new(MemoryCache::new()),
        );
        match gateway.fetch(true, None).await {
            Err(PortwatchError::Schema { missing }) => assert_eq!(missing, vec!["PORTNAME"]),
            other => panic!("expected schema error, got {:?}", other.map(|i| i.origin)),
        }
    }

    #[tokio::test]
    async fn test_schema_error_with_cache_falls_back() {
        let cache = Arc::new(MemoryCache::with_table(cached_table(), Duration::from_secs(7 * 3600)));
        let gateway = IngestionGateway::new(StubSource::ok("DATE\n2024-01-01\n"), cache);
        let ingested = gateway.fetch(true, None).await.unwrap();
        assert_eq!(ingested.origin, DataOrigin::StaleCache);
    }

    #[tokio::test]
    async fn test_sampling_is_exact_and_reproducible() {
        let cache = Arc::new(MemoryCache::with_table(numbered_table(1000), Duration::ZERO));
        let gateway = IngestionGateway::new(StubSource::failing(), cache);

        let first = gateway.fetch(true, Some(0.5)).await.unwrap();
        let second = gateway.fetch(true, Some(0.5)).await.unwrap();

        assert_eq!(first.table.len(), 500);
        assert_eq!(first.table, second.table);
        assert_eq!(first.metadata.record_count, 500);
    }

    #[tokio::test]
    async fn test_sampling_preserves_input_order() {
        let cache = Arc::new(MemoryCache::with_table(numbered_table(200), Duration::ZERO));
        let gateway = IngestionGateway::new(StubSource::failing(), cache);

        let sampled = gateway.fetch(true, Some(0.25)).await.unwrap().table;
        let numbers: Vec<usize> = (0..sampled.len())
            .map(|row| sampled.cell(row, 2).unwrap().parse().unwrap())
            .collect();

        assert_eq!(numbers.len(), 50);
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_out_of_range_fraction_is_ignored() {
        let cache = Arc::new(MemoryCache::with_table(numbered_table(10), Duration::ZERO));
        let gateway = IngestionGateway::new(StubSource::failing(), cache);

        for fraction in [0.0, 1.0, 1.5, -0.2, f64::NAN] {
            let ingested = gateway.fetch(true, Some(fraction)).await.unwrap();
            assert_eq!(ingested.table.len(), 10);
        }
    }

    #[test]
    fn test_clean_download_keeps_existing_traffic() {
        let table = RawTable::from_csv_str("DATE,PORTNAME,TRAFFIC,IMPORT\n2024-01-01,Busan,9,100\n").unwrap();
        let cleaned = clean_download(table).unwrap();
        let traffic = cleaned.column_index("TRAFFIC").unwrap();
        assert_eq!(cleaned.numeric(0, traffic), Some(9.0));
    }
}
