//! Grid accessor boundary: how the pipeline pulls bounded time chunks.
//!
//! Acquisition and decoding of forecast / reanalysis files live outside this
//! crate. Whatever does that work hands the pipeline chunks through
//! [`GridAccessor`], one chunk in memory at a time.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::WeatherGrid;
use crate::error::{HazardError, Result};

/// Metadata for one time chunk, available without loading it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Number of timesteps in the chunk's reconciled timeline.
    pub steps: usize,
}

/// Source of time-ordered grid chunks sharing one spatial domain.
pub trait GridAccessor {
    fn chunk_count(&self) -> usize;

    fn chunk_info(&self, index: usize) -> Option<ChunkInfo>;

    /// Load chunk `index`. A failure here is recorded by the caller as a gap
    /// covering the chunk's span; it never aborts a mining run.
    fn load_chunk(&self, index: usize) -> Result<WeatherGrid>;
}

// ── In-memory accessor ────────────────────────────────────────────────────────

/// Splits an already-loaded grid along time. Used by tests and small runs.
pub struct InMemoryAccessor {
    chunks: Vec<WeatherGrid>,
    infos: Vec<ChunkInfo>,
}

impl InMemoryAccessor {
    pub fn new(grid: &WeatherGrid, chunk: Duration, tolerance: Duration) -> Self {
        Self::from_chunks(grid.split_time(chunk, tolerance), tolerance)
    }

    pub fn from_chunks(chunks: Vec<WeatherGrid>, tolerance: Duration) -> Self {
        let infos = chunks
            .iter()
            .map(|g| {
                let tl = g.timeline(tolerance);
                ChunkInfo {
                    start: tl.first().copied().unwrap_or_default(),
                    end: tl.last().copied().unwrap_or_default(),
                    steps: tl.len(),
                }
            })
            .collect();
        Self { chunks, infos }
    }
}

impl GridAccessor for InMemoryAccessor {
    fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn chunk_info(&self, index: usize) -> Option<ChunkInfo> {
        self.infos.get(index).cloned()
    }

    fn load_chunk(&self, index: usize) -> Result<WeatherGrid> {
        self.chunks
            .get(index)
            .cloned()
            .ok_or_else(|| HazardError::grid(format!("chunk {index} out of range")))
    }
}

// ── Manifest accessor ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Chunk file path, relative to the manifest's directory.
    pub path: PathBuf,
    #[serde(flatten)]
    pub info: ChunkInfo,
}

/// `chunks.json`-style manifest listing serialised [`WeatherGrid`] chunks in
/// time order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub chunks: Vec<ManifestEntry>,
}

pub struct ManifestAccessor {
    root: PathBuf,
    manifest: ChunkManifest,
}

impl ManifestAccessor {
    pub fn open(manifest_path: &Path) -> Result<Self> {
        let text = fs::read_to_string(manifest_path)?;
        let manifest: ChunkManifest = serde_json::from_str(&text)?;
        if manifest.chunks.windows(2).any(|w| w[1].info.start <= w[0].info.end) {
            return Err(HazardError::grid("manifest chunks must be time-ordered and non-overlapping"));
        }
        let root = manifest_path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self { root, manifest })
    }
}

impl GridAccessor for ManifestAccessor {
    fn chunk_count(&self) -> usize {
        self.manifest.chunks.len()
    }

    fn chunk_info(&self, index: usize) -> Option<ChunkInfo> {
        self.manifest.chunks.get(index).map(|e| e.info.clone())
    }

    fn load_chunk(&self, index: usize) -> Result<WeatherGrid> {
        let entry = self
            .manifest
            .chunks
            .get(index)
            .ok_or_else(|| HazardError::grid(format!("chunk {index} out of range")))?;
        let text = fs::read_to_string(self.root.join(&entry.path))?;
        let grid: WeatherGrid = serde_json::from_str(&text)?;
        grid.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::test_support::*;
    use crate::grid::{FieldKind, SpatialAxes};

    fn grid(steps: usize) -> WeatherGrid {
        let axes = SpatialAxes::regular(40.0, 14.0, 0.25, 2, 2).unwrap();
        WeatherGrid::new(axes)
            .unwrap()
            .with_field(FieldKind::Temperature2m, constant_series(FieldKind::Temperature2m, steps, 4, 290.0))
            .unwrap()
    }

    #[test]
    fn in_memory_chunks_report_their_spans() {
        let acc = InMemoryAccessor::new(&grid(6), Duration::hours(4), Duration::minutes(30));
        assert_eq!(acc.chunk_count(), 2);
        let second = acc.chunk_info(1).unwrap();
        assert_eq!(second.start, hours(4));
        assert_eq!(second.end, hours(5));
        assert_eq!(second.steps, 2);
        assert!(acc.load_chunk(2).is_err());
    }

    #[test]
    fn manifest_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let g = grid(3);
        fs::write(dir.path().join("c0.json"), serde_json::to_string(&g).unwrap()).unwrap();
        let manifest = ChunkManifest {
            chunks: vec![ManifestEntry {
                path: PathBuf::from("c0.json"),
                info: ChunkInfo { start: hours(0), end: hours(2), steps: 3 },
            }],
        };
        let mpath = dir.path().join("chunks.json");
        fs::write(&mpath, serde_json::to_string(&manifest).unwrap()).unwrap();

        let acc = ManifestAccessor::open(&mpath).unwrap();
        assert_eq!(acc.chunk_count(), 1);
        let loaded = acc.load_chunk(0).unwrap();
        assert_eq!(loaded.fields[&FieldKind::Temperature2m].times.len(), 3);
    }
}
