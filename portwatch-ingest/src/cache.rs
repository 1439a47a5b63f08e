use parking_lot::RwLock;
use portwatch_core::{PortwatchError, RawTable, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Storage for the last successfully ingested table.
///
/// Freshness is judged only by the time since the last write.
pub trait CacheStore: Send + Sync {
    fn describe(&self) -> String;

    fn exists(&self) -> bool;

    /// Time since the last write, `None` when nothing is cached.
    fn age(&self) -> Option<Duration>;

    fn load(&self) -> Result<RawTable>;

    fn store(&self, table: &RawTable) -> Result<()>;

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.age().is_some_and(|age| age < ttl)
    }
}

/// CSV file on local disk; its modification time is the write timestamp.
#[derive(Debug, Clone)]
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStore for FileCache {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn age(&self) -> Option<Duration> {
        let modified = fs::metadata(&self.path).ok()?.modified().ok()?;
        // A modification time in the future counts as just written.
        Some(
            SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO),
        )
    }

    fn load(&self) -> Result<RawTable> {
        RawTable::from_path(&self.path)
            .map_err(|e| PortwatchError::Cache(format!("{}: {}", self.path.display(), e)))
    }

    fn store(&self, table: &RawTable) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        // Write next to the target and rename so a crash never leaves a torn file.
        let tmp_path = self.path.with_extension("csv.tmp");
        {
            let file = File::create(&tmp_path)?;
            table.write_csv(BufWriter::new(file))?;
        }
        fs::rename(&tmp_path, &self.path)?;

        debug!(path = %self.path.display(), rows = table.len(), "Cache file written");
        Ok(())
    }
}

/// In-process cache, used where touching the filesystem is undesirable.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entry: RwLock<Option<(RawTable, SystemTime)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated cache whose entry was written `age` ago.
    pub fn with_table(table: RawTable, age: Duration) -> Self {
        let written_at = SystemTime::now()
            .checked_sub(age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        Self {
            entry: RwLock::new(Some((table, written_at))),
        }
    }

    pub fn snapshot(&self) -> Option<RawTable> {
        self.entry.read().as_ref().map(|(table, _)| table.clone())
    }
}

impl CacheStore for MemoryCache {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn exists(&self) -> bool {
        self.entry.read().is_some()
    }

    fn age(&self) -> Option<Duration> {
        self.entry.read().as_ref().map(|(_, written_at)| {
            SystemTime::now()
                .duration_since(*written_at)
                .unwrap_or(Duration::ZERO)
        })
    }

    fn load(&self) -> Result<RawTable> {
        self.snapshot()
            .ok_or_else(|| PortwatchError::Cache("memory cache is empty".to_string()))
    }

    fn store(&self, table: &RawTable) -> Result<()> {
        *self.entry.write() = Some((table.clone(), SystemTime::now()));
        Ok(())
    }
}
