use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use trailguard_core::TradeLogRecord;

/// Append-only trade log, one JSON record per line.
///
/// Writes happen inside the close transaction, so the mutex only ever sees
/// contention when two different positions close in the same instant.
#[derive(Debug)]
pub struct TradeLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TradeLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn append(&self, record: &TradeLogRecord) -> Result<()> {
        let line = serde_json::to_string(record).context("serializing trade record")?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening trade log {}", self.path.display()))?;
        writeln!(file, "{line}").context("appending trade record")?;
        Ok(())
    }

    /// All records on disk, oldest first. Used by reports and tests.
    pub fn read_all(&self) -> Result<Vec<TradeLogRecord>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()))
            }
        };
        let mut records = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            records.push(serde_json::from_str(line).context("parsing trade record")?);
        }
        Ok(records)
    }
}
