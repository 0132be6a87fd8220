//! Mining orchestrator: grid chunks → classification → event tracking →
//! ledger, resumable at chunk boundaries.
//!
//! Per chunk, a sequential pass derives precipitation state and detects
//! gaps, the classification of independent timesteps runs (in parallel
//! with the `threading` feature), and a second sequential pass steps the
//! per-hazard trackers. Events closed in the chunk are appended to the
//! ledger and the state is checkpointed before the next chunk is loaded.
//!
//! A hazard whose input field has no reading at a timestep, while the chunk
//! still carries that field, holds: its tracker is not stepped, so open
//! events neither grow nor close. The hold lasts at most
//! `mining.field_hold_minutes` past the hazard's last classified timestep.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::precip::PrecipAccumulator;
use crate::classify::{classify_frames, ClassificationPass, FrameInput, HazardKind};
use crate::config::{HazardConfig, PipelineConfig};
use crate::error::{HazardError, Result};
use crate::events::{AppendSummary, CellSampler, EventLedger, EventTracker, HistoricalEvent};
use crate::grid::source::GridAccessor;
use crate::grid::{FieldKind, SpatialAxes, WeatherGrid};

// ── State and report ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapRecord {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reason: String,
}

impl GapRecord {
    fn new(start: DateTime<Utc>, end: DateTime<Utc>, reason: impl Into<String>) -> Self {
        let gap = Self { start, end, reason: reason.into() };
        log::warn!(
            "{}",
            HazardError::GridGap { start: gap.start, end: gap.end, reason: gap.reason.clone() }
        );
        gap
    }
}

/// Everything carried between chunks, and between runs via checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningState {
    /// First chunk not yet fully processed.
    pub next_chunk: usize,
    pub last_time: Option<DateTime<Utc>>,
    /// Spatial domain fixed by the first chunk.
    pub axes: Option<SpatialAxes>,
    pub precip: PrecipAccumulator,
    pub trackers: BTreeMap<HazardKind, EventTracker>,
    pub gaps: Vec<GapRecord>,
}

impl MiningState {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            next_chunk: 0,
            last_time: None,
            axes: None,
            precip: config.hazards.precip_accumulator(),
            trackers: BTreeMap::new(),
            gaps: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    /// Load `path` if it exists, otherwise start fresh.
    pub fn resume_or_new(path: &Path, config: &PipelineConfig) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new(config));
        }
        let state = Self::load(path)?;
        if state.precip.window() != config.hazards.precip_window()
            || state.precip.max_rate() != config.hazards.max_plausible_rate_mm_h
        {
            return Err(HazardError::config(format!(
                "checkpoint {} was written with different precipitation settings",
                path.display()
            )));
        }
        log::info!("resuming from chunk {} ({})", state.next_chunk, path.display());
        Ok(state)
    }

    /// Write to a sibling temp file, then rename over `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn close_all(&mut self) -> Vec<HistoricalEvent> {
        self.trackers.values_mut().flat_map(|t| t.record_gap()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MiningReport {
    pub chunks_processed: usize,
    pub chunks_failed: usize,
    pub timesteps: usize,
    pub gaps: Vec<GapRecord>,
    pub events: AppendSummary,
}

// ── Mining ────────────────────────────────────────────────────────────────────

/// Mine every chunk from `state.next_chunk` onward into `ledger`.
///
/// A chunk that fails to load, or whose domain differs from the first
/// chunk's, is recorded as a gap and mining continues. With a checkpoint
/// path, `state` is saved after every chunk.
pub fn mine(
    accessor: &dyn GridAccessor,
    config: &PipelineConfig,
    ledger: &mut EventLedger,
    state: &mut MiningState,
    checkpoint: Option<&Path>,
) -> Result<MiningReport> {
    config.validate()?;
    let mut report = MiningReport::default();
    let gaps_before = state.gaps.len();

    for index in state.next_chunk..accessor.chunk_count() {
        let info = accessor.chunk_info(index);
        let loaded = accessor.load_chunk(index).and_then(|grid| {
            match &state.axes {
                Some(axes) if *axes != grid.axes => {
                    Err(HazardError::grid("chunk domain differs from the first chunk's"))
                }
                _ => Ok(grid),
            }
        });

        let closed = match loaded {
            Ok(grid) => {
                if state.axes.is_none() {
                    start_trackers(state, &grid.axes, config);
                }
                let before = report.timesteps;
                let closed = mine_chunk(&grid, config, state, &mut report)?;
                log::info!(
                    "chunk {index}: {} timesteps, {} events closed",
                    report.timesteps - before,
                    closed.len()
                );
                report.chunks_processed += 1;
                closed
            }
            Err(e) => {
                let fallback = state.last_time.unwrap_or_default();
                let (start, end) = info.map_or((fallback, fallback), |i| (i.start, i.end));
                state.gaps.push(GapRecord::new(start, end, format!("chunk {index} unavailable: {e}")));
                state.precip.reset();
                report.chunks_failed += 1;
                state.close_all()
            }
        };

        report.events.merge(ledger.append(closed)?);
        state.next_chunk = index + 1;
        if let Some(path) = checkpoint {
            state.save(path)?;
        }
    }

    let tail: Vec<HistoricalEvent> = state.trackers.values_mut().flat_map(|t| t.finish()).collect();
    report.events.merge(ledger.append(tail)?);
    if let Some(path) = checkpoint {
        state.save(path)?;
    }
    report.gaps = state.gaps[gaps_before..].to_vec();
    log::info!(
        "mining done: {} chunks ({} failed), {} events inserted, {} already present, {} gaps",
        report.chunks_processed + report.chunks_failed,
        report.chunks_failed,
        report.events.inserted,
        report.events.skipped,
        report.gaps.len()
    );
    Ok(report)
}

fn start_trackers(state: &mut MiningState, axes: &SpatialAxes, config: &PipelineConfig) {
    state.axes = Some(axes.clone());
    state.trackers = config
        .hazards
        .enabled()
        .map(|h| (h, EventTracker::new(h, axes.clone(), config.extraction.connectivity)))
        .collect();
}

enum Entry {
    Gap(GapRecord),
    Frame(FrameInput),
}

fn mine_chunk(
    grid: &WeatherGrid,
    config: &PipelineConfig,
    state: &mut MiningState,
    report: &mut MiningReport,
) -> Result<Vec<HistoricalEvent>> {
    let tolerance = config.mining.tolerance();
    let cadence = config.mining.cadence();

    // Pass 1: gaps and precipitation state, strictly in time order.
    let mut entries = Vec::new();
    for t in grid.timeline(tolerance) {
        if let Some(last) = state.last_time {
            if t <= last {
                log::warn!("timestep {t} is not after {last}; skipped");
                continue;
            }
            if t - last > cadence + tolerance {
                entries.push(Entry::Gap(GapRecord::new(last + cadence, t - cadence, "missing timesteps")));
                state.precip.reset();
            }
        }
        state.last_time = Some(t);

        let snapshot = grid.snapshot(t, tolerance);
        if snapshot.fields.is_empty() || snapshot.fields.values().any(|f| f.all_missing()) {
            entries.push(Entry::Gap(GapRecord::new(t, t, "corrupt timestep")));
            state.precip.reset();
            continue;
        }
        let precip = state.precip.advance(snapshot.field(FieldKind::TotalPrecip));
        entries.push(Entry::Frame(FrameInput { time: t, precip }));
    }

    // Pass 2: classification of independent frames.
    let frames: Vec<FrameInput> = entries
        .iter()
        .filter_map(|e| match e {
            Entry::Frame(f) => Some(f.clone()),
            Entry::Gap(_) => None,
        })
        .collect();
    report.timesteps += frames.len();
    let mut passes = classify_frames(grid, &frames, &config.hazards, tolerance).into_iter();

    // Pass 3: tracking, strictly in time order.
    let hold = config.mining.field_hold();
    let mut closed = Vec::new();
    let mut missing_logged = BTreeSet::new();
    for entry in entries {
        match entry {
            Entry::Gap(gap) => {
                closed.extend(state.close_all());
                state.gaps.push(gap);
            }
            Entry::Frame(frame) => {
                let Some(pass) = passes.next() else { break };
                let snapshot = grid.snapshot(frame.time, tolerance);
                let sampler = CellSampler { snapshot: &snapshot, precip: frame.precip.as_ref() };
                for (hazard, result) in pass.results {
                    let Some(tracker) = state.trackers.get_mut(&hazard) else { continue };
                    match result {
                        Ok(flags) => closed.extend(tracker.step(&flags, &sampler)?),
                        Err(HazardError::MissingField { field, .. })
                            if grid.has_field(field)
                                && tracker.last_time().is_some_and(|last| frame.time - last <= hold) =>
                        {
                            log::trace!("{hazard} held at {}: no {field} reading", frame.time);
                        }
                        Err(e) => {
                            if missing_logged.insert(hazard) {
                                log::warn!("{e} (from {}); {hazard} skipped for these timesteps", frame.time);
                            }
                            closed.extend(tracker.record_gap());
                        }
                    }
                }
            }
        }
    }
    Ok(closed)
}

// ── Forecast path ─────────────────────────────────────────────────────────────

/// Classify every timestep of a forecast grid directly, without mining.
/// Precipitation state starts empty, so the first timestep's precipitation
/// hazards are indeterminate.
pub fn classify_forecast(grid: &WeatherGrid, hazards: &HazardConfig, tolerance: Duration) -> Vec<ClassificationPass> {
    let mut precip = hazards.precip_accumulator();
    let frames: Vec<FrameInput> = grid
        .timeline(tolerance)
        .into_iter()
        .map(|t| {
            let snapshot = grid.snapshot(t, tolerance);
            FrameInput { time: t, precip: precip.advance(snapshot.field(FieldKind::TotalPrecip)) }
        })
        .collect();
    classify_frames(grid, &frames, hazards, tolerance)
}
