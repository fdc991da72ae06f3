//! Dispatch ledger
//!
//! The provider's own journal of markers it has dispatched. It is consulted
//! before every send, so a message already accepted by a relay is not sent
//! again when the host retries a call whose state it never persisted (for
//! example after a crash between the send and the state write).
//!
//! Resources with identical content share one marker, so every entry counts
//! its holders and is only dropped when the last one releases it. A create
//! retried after a lost state write counts as a holder again; counts may run
//! high but never low, so a dispatch still held is never forgotten.
//!
//! Entries never contain the SMTP password.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::AttributeValues;
use mailkit::DispatchMarker;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// One recorded dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub marker: DispatchMarker,
    pub dispatched_at: DateTime<Utc>,
    /// Resource instances whose state carries this marker
    #[serde(default = "one_holder")]
    pub holders: u32,
    /// Resource attributes as dispatched, without the password and without nulls
    #[serde(default)]
    pub attributes: AttributeValues,
}

fn one_holder() -> u32 {
    1
}

impl LedgerEntry {
    pub fn new(marker: DispatchMarker, dispatched_at: DateTime<Utc>, attributes: &AttributeValues) -> Self {
        let attributes = attributes
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Self {
            marker,
            dispatched_at,
            holders: one_holder(),
            attributes,
        }
    }
}

/// Persistent set of dispatched markers, shared by all resource instances
pub trait Ledger: Send + Sync + fmt::Debug {
    /// Entry for `marker`, leaving its holders untouched
    fn lookup(&self, marker: &DispatchMarker) -> Result<Option<LedgerEntry>>;

    /// Add a holder to the entry for `marker` and return it, if recorded
    fn acquire(&self, marker: &DispatchMarker) -> Result<Option<LedgerEntry>>;

    /// Record a fresh dispatch, or add a holder when its marker is already recorded
    fn record(&self, entry: LedgerEntry) -> Result<()>;

    /// Drop one holder of `marker`
    ///
    /// Returns the holders left, `None` when the marker was not recorded. The
    /// entry is removed with its last holder.
    fn release(&self, marker: &DispatchMarker) -> Result<Option<u32>>;

    /// All entries, ordered by marker
    fn entries(&self) -> Result<Vec<LedgerEntry>>;
}

type Entries = BTreeMap<DispatchMarker, LedgerEntry>;

fn acquire_in(entries: &mut Entries, marker: &DispatchMarker) -> Option<LedgerEntry> {
    let entry = entries.get_mut(marker)?;
    entry.holders = entry.holders.saturating_add(1);
    Some(entry.clone())
}

fn record_in(entries: &mut Entries, entry: LedgerEntry) {
    match entries.get_mut(&entry.marker) {
        // Two identical creates raced past the lookup; keep the first record
        Some(existing) => existing.holders = existing.holders.saturating_add(1),
        None => {
            entries.insert(entry.marker.clone(), entry);
        }
    }
}

fn release_in(entries: &mut Entries, marker: &DispatchMarker) -> Option<u32> {
    let entry = entries.get_mut(marker)?;
    let left = entry.holders.saturating_sub(1);
    if left == 0 {
        entries.remove(marker);
    } else {
        entry.holders = left;
    }
    Some(left)
}

/// In-memory ledger, for tests and one-shot runs
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: Mutex<Entries>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ledger for MemoryLedger {
    fn lookup(&self, marker: &DispatchMarker) -> Result<Option<LedgerEntry>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(marker).cloned())
    }

    fn acquire(&self, marker: &DispatchMarker) -> Result<Option<LedgerEntry>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(acquire_in(&mut entries, marker))
    }

    fn record(&self, entry: LedgerEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        record_in(&mut entries, entry);
        Ok(())
    }

    fn release(&self, marker: &DispatchMarker) -> Result<Option<u32>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(release_in(&mut entries, marker))
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.values().cloned().collect())
    }
}

/// On-disk layout of the ledger file
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default = "ledger_version")]
    version: u32,
    #[serde(default, rename = "entry")]
    entries: Vec<LedgerEntry>,
}

fn ledger_version() -> u32 {
    1
}

/// TOML-file ledger
///
/// Every mutation rewrites the whole file through a temporary file and a
/// rename, so readers never observe a half-written ledger. Calls within one
/// process are serialised by a mutex.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Entries> {
        if !self.path.exists() {
            log::debug!("Ledger {} does not exist yet", self.path.display());
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read ledger: {}", self.path.display()))?;
        let file: LedgerFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse ledger: {}", self.path.display()))?;

        Ok(file
            .entries
            .into_iter()
            .map(|entry| (entry.marker.clone(), entry))
            .collect())
    }

    fn save(&self, entries: &Entries) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create ledger directory: {}", dir.display()))?;
        }

        let file = LedgerFile {
            version: ledger_version(),
            entries: entries.values().cloned().collect(),
        };
        let content = toml::to_string_pretty(&file).context("Failed to serialize ledger")?;

        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write ledger: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace ledger: {}", self.path.display()))?;

        log::debug!("Saved {} ledger entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}

impl Ledger for FileLedger {
    fn lookup(&self, marker: &DispatchMarker) -> Result<Option<LedgerEntry>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(marker))
    }

    fn acquire(&self, marker: &DispatchMarker) -> Result<Option<LedgerEntry>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        let acquired = acquire_in(&mut entries, marker);
        if acquired.is_some() {
            self.save(&entries)?;
        }
        Ok(acquired)
    }

    fn record(&self, entry: LedgerEntry) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        record_in(&mut entries, entry);
        self.save(&entries)
    }

    fn release(&self, marker: &DispatchMarker) -> Result<Option<u32>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        let left = release_in(&mut entries, marker);
        if left.is_some() {
            self.save(&entries)?;
        }
        Ok(left)
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.into_values().collect())
    }
}
