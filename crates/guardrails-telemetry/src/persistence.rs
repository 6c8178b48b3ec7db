//! File-backed violation ledger
//!
//! Records are written as JSON lines, one per violation, each carrying its
//! hash-chain link. Every record is synced before `record` returns, and a
//! failed write is truncated away before the next one. The active file is
//! rotated by size; rotated files keep the sequence number of their last
//! record in the name so a plain sort restores ledger order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guardrails_core::{Error, OrgId, RecordId, RecordedViolation, Result, Violation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit::{ChainLink, HashChain};
use crate::recorder::{count_recorded, new_record_id, ViolationRecorder};

const CURRENT_FILE: &str = "violations_current.jsonl";
const FILE_PREFIX: &str = "violations_";

/// Configuration for the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Directory holding the ledger files
    pub dir: PathBuf,

    /// Maximum file size before rotation (bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl LedgerConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_max_file_size() -> u64 {
    64 * 1024 * 1024 // 64MB
}

/// One ledger line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(flatten)]
    pub record: RecordedViolation,

    #[serde(flatten)]
    pub link: ChainLink,
}

impl LedgerEntry {
    fn payload(record: &RecordedViolation) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(record)?)
    }
}

/// Result of walking the whole chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    /// Entries that verified before the first break
    pub verified: u64,

    /// Sequence number of the first entry that failed, if any
    pub broken_at: Option<u64>,
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        self.broken_at.is_none()
    }
}

struct LedgerWriter {
    config: LedgerConfig,
    file: File,
    current_size: u64,
    chain: HashChain,

    /// Set when a write failed and its bytes may still be in the file
    dirty: bool,

    #[cfg(test)]
    fail_after: Option<usize>,
}

impl LedgerWriter {
    fn open(config: LedgerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.dir)?;
        trim_partial_tail(&config.dir.join(CURRENT_FILE))?;

        let chain = match read_entries(&config.dir)?.last() {
            Some(entry) => HashChain::resume(&entry.link),
            None => HashChain::new(),
        };

        let (file, current_size) = open_current(&config.dir)?;
        info!(
            dir = ?config.dir,
            sequence = chain.sequence(),
            "Opened violation ledger"
        );

        Ok(Self {
            config,
            file,
            current_size,
            chain,
            dirty: false,
            #[cfg(test)]
            fail_after: None,
        })
    }

    /// Append one record. A failed append leaves neither bytes in the file
    /// nor a step in the chain.
    fn append(&mut self, violation: Violation) -> Result<RecordedViolation> {
        if self.dirty {
            self.truncate_to_committed()?;
        }
        if self.current_size >= self.config.max_file_size {
            self.rotate()?;
        }

        let record = RecordedViolation {
            id: new_record_id(),
            violation,
        };
        let link = self.chain.next_link(&LedgerEntry::payload(&record)?);
        let entry = LedgerEntry { record, link };

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        if let Err(err) = self.write_line(&line) {
            self.dirty = true;
            if let Err(repair) = self.truncate_to_committed() {
                warn!("Could not roll back failed ledger write: {}", repair);
            }
            return Err(Error::recording(format!("ledger write failed: {}", err)));
        }

        self.current_size += line.len() as u64;
        self.chain.advance(&entry.link);
        Ok(entry.record)
    }

    fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        #[cfg(test)]
        if let Some(n) = self.fail_after.take() {
            self.file.write_all(&line[..n.min(line.len())])?;
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected write failure",
            ));
        }

        self.file.write_all(line)?;
        self.file.sync_data()
    }

    /// Cut the active file back to the last acknowledged record
    fn truncate_to_committed(&mut self) -> Result<()> {
        self.file.set_len(self.current_size)?;
        self.file.sync_data()?;
        self.dirty = false;
        debug!(size = self.current_size, "Truncated ledger to last committed record");
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        self.file.sync_data()?;

        let current = self.config.dir.join(CURRENT_FILE);
        let rotated = self
            .config
            .dir
            .join(format!("{}{:020}.jsonl", FILE_PREFIX, self.chain.sequence()));
        std::fs::rename(&current, &rotated)?;
        info!("Rotated violation ledger to: {:?}", rotated);

        let (file, size) = open_current(&self.config.dir)?;
        self.file = file;
        self.current_size = size;
        Ok(())
    }
}

fn open_current(dir: &Path) -> Result<(File, u64)> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(CURRENT_FILE))?;
    let size = file.metadata()?.len();
    Ok((file, size))
}

/// Drop an incomplete last line left by a write that never finished
fn trim_partial_tail(path: &Path) -> Result<()> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if bytes.is_empty() || bytes.ends_with(b"\n") {
        return Ok(());
    }

    let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    warn!(
        path = ?path,
        dropped_bytes = bytes.len() - keep,
        "Dropping incomplete ledger line"
    );
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(keep as u64)?;
    file.sync_data()?;
    Ok(())
}

/// Ledger files in chain order
fn ledger_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_ledger = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(".jsonl"));
        if is_ledger {
            files.push(path);
        }
    }
    // Zero-padded sequence numbers sort before "current"
    files.sort();
    Ok(files)
}

/// Every entry in the ledger, oldest first
fn read_entries(dir: &Path) -> Result<Vec<LedgerEntry>> {
    let mut entries = Vec::new();
    for path in ledger_files(dir)? {
        let reader = BufReader::new(File::open(&path)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str::<LedgerEntry>(&line)?);
        }
    }
    Ok(entries)
}

/// Walk the ledger in `dir` and check every hash link
pub fn verify_chain(dir: impl AsRef<Path>) -> Result<ChainVerification> {
    let mut chain = HashChain::new();
    let mut verified = 0;

    for entry in read_entries(dir.as_ref())? {
        let payload = LedgerEntry::payload(&entry.record)?;
        if !chain.verify_next(&payload, &entry.link) {
            warn!(sequence = entry.link.sequence, "Violation ledger chain broken");
            return Ok(ChainVerification {
                verified,
                broken_at: Some(entry.link.sequence),
            });
        }
        chain.advance(&entry.link);
        verified += 1;
    }

    Ok(ChainVerification {
        verified,
        broken_at: None,
    })
}

/// Hash-chained JSON-lines recorder
#[derive(Clone)]
pub struct JsonlRecorder {
    writer: Arc<Mutex<LedgerWriter>>,
    dir: PathBuf,
}

impl JsonlRecorder {
    /// Open (or create) the ledger, resuming the chain from its last entry
    pub fn open(config: LedgerConfig) -> Result<Self> {
        let dir = config.dir.clone();
        let writer = LedgerWriter::open(config)?;
        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Verify the chain, holding off writers while it runs
    pub async fn verify(&self) -> Result<ChainVerification> {
        self.blocking(|_, dir| verify_chain(dir)).await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut LedgerWriter, &Path) -> Result<T> + Send + 'static,
    {
        let writer = Arc::clone(&self.writer);
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = writer.lock();
            f(&mut guard, &dir)
        })
        .await
        .map_err(|e| Error::internal(format!("ledger task failed: {}", e)))?
    }
}

#[async_trait]
impl ViolationRecorder for JsonlRecorder {
    async fn record(&self, violation: Violation) -> Result<RecordId> {
        let counted = violation.clone();
        let record = self
            .blocking(move |writer, _| writer.append(violation))
            .await
            .map_err(|e| match e {
                Error::Recording(_) => e,
                other => Error::recording(other.to_string()),
            })?;

        debug!(id = %record.id, org = %record.violation.org_id, "Recorded violation");
        count_recorded(&counted);
        Ok(record.id)
    }

    async fn count_since(&self, org_id: &OrgId, since: DateTime<Utc>) -> Result<u64> {
        let org_id = org_id.clone();
        self.blocking(move |_, dir| {
            Ok(read_entries(dir)?
                .iter()
                .filter(|e| e.record.violation.org_id == org_id && e.record.violation.created_at >= since)
                .count() as u64)
        })
        .await
    }

    async fn recent(&self, org_id: &OrgId, limit: usize) -> Result<Vec<RecordedViolation>> {
        let org_id = org_id.clone();
        self.blocking(move |_, dir| {
            Ok(read_entries(dir)?
                .into_iter()
                .rev()
                .filter(|e| e.record.violation.org_id == org_id)
                .take(limit)
                .map(|e| e.record)
                .collect())
        })
        .await
    }
}
