//! Common test utilities.
//!
//! File-backed `SQLite` databases in a temp directory (every session opens
//! its own connection, so `sqlite::memory:` would give each one a fresh
//! database) and a few test sets.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sqlx::SqliteConnection;
use tempfile::TempDir;
use testset_db::{SqlScriptTestSet, TestDatabaseConfig, TestSet};

/// Directory with the fixture scripts.
pub fn scripts_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/scripts")
}

/// The `Default` test set: the `default_*.sql` fixture scripts, in name order.
pub fn default_test_set() -> SqlScriptTestSet {
    let mut names: Vec<PathBuf> = std::fs::read_dir(scripts_dir())
        .expect("scripts directory")
        .map(|entry| entry.expect("directory entry").path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("default_"))
        })
        .collect();
    names.sort();

    names.iter().fold(SqlScriptTestSet::new(), |test_set, path| {
        let contents = std::fs::read_to_string(path).expect("fixture script");
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        test_set.with_sql_script(name, &contents)
    })
}

/// Route `tracing` output through the test harness. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// A database file that lives as long as the value.
pub struct TestDb {
    temp_dir: TempDir,
    connection_string: String,
}

impl TestDb {
    pub fn new() -> anyhow::Result<Self> {
        init_tracing();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("testset.db");
        Ok(Self {
            connection_string: format!("sqlite://{}?mode=rwc", path.display()),
            temp_dir: dir,
        })
    }

    /// Directory holding the database file.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn config(&self) -> TestDatabaseConfig {
        TestDatabaseConfig::new(self.connection_string.clone())
    }
}

/// Wraps a test set and counts how often it was applied.
pub struct CountingTestSet<T> {
    inner: T,
    applied: Arc<AtomicUsize>,
}

impl<T> CountingTestSet<T> {
    pub fn new(inner: T) -> (Self, Arc<AtomicUsize>) {
        let applied = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                applied: Arc::clone(&applied),
            },
            applied,
        )
    }
}

#[async_trait]
impl<T: TestSet> TestSet for CountingTestSet<T> {
    async fn apply(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        self.applied.fetch_add(1, Ordering::SeqCst);
        self.inner.apply(conn).await
    }
}

pub fn applied(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
