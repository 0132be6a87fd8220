//! Append-only, key-deduplicated event ledger (JSON Lines on disk).
//!
//! An event whose [`EventKey`] is already present is skipped, never
//! re-inserted, so re-mining a range leaves the ledger unchanged.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{EventKey, HistoricalEvent};
use crate::classify::HazardKind;
use crate::error::{HazardError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendSummary {
    pub inserted: usize,
    pub skipped: usize,
}

impl AppendSummary {
    pub fn merge(&mut self, other: AppendSummary) {
        self.inserted += other.inserted;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Default)]
pub struct EventLedger {
    path: Option<PathBuf>,
    events: Vec<HistoricalEvent>,
    keys: HashSet<EventKey>,
}

impl EventLedger {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or start) a ledger file. A missing file is an empty ledger.
    pub fn open(path: &Path) -> Result<Self> {
        let mut ledger = Self { path: Some(path.to_path_buf()), ..Self::default() };
        if !path.exists() {
            return Ok(ledger);
        }
        let text = fs::read_to_string(path)?;
        for (n, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: HistoricalEvent = serde_json::from_str(line).map_err(|e| {
                HazardError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("{}:{}: {e}", path.display(), n + 1),
                ))
            })?;
            if ledger.keys.insert(event.key()) {
                ledger.events.push(event);
            }
        }
        log::debug!("ledger {} holds {} events", path.display(), ledger.events.len());
        Ok(ledger)
    }

    /// Append every event whose key is new. File-backed ledgers are written
    /// before the in-memory view is updated.
    pub fn append(&mut self, events: impl IntoIterator<Item = HistoricalEvent>) -> Result<AppendSummary> {
        let mut summary = AppendSummary::default();
        let mut fresh = Vec::new();
        let mut batch_keys = HashSet::new();
        for event in events {
            let key = event.key();
            if self.keys.contains(&key) || !batch_keys.insert(key) {
                summary.skipped += 1;
            } else {
                fresh.push(event);
            }
        }
        if fresh.is_empty() {
            return Ok(summary);
        }

        if let Some(path) = &self.path {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let mut w = BufWriter::new(file);
            for event in &fresh {
                serde_json::to_writer(&mut w, event)?;
                w.write_all(b"\n")?;
            }
            w.flush()?;
        }

        summary.inserted = fresh.len();
        for event in fresh {
            self.keys.insert(event.key());
            self.events.push(event);
        }
        Ok(summary)
    }

    pub fn events(&self) -> &[HistoricalEvent] {
        &self.events
    }

    pub fn events_for(&self, hazard: HazardKind) -> Vec<HistoricalEvent> {
        self.events.iter().filter(|e| e.hazard == hazard).cloned().collect()
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
