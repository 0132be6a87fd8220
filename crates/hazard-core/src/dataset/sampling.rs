//! Positive and negative sample extraction, one grid chunk at a time.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::split::split_samples;
use super::{DatasetStats, FeatureSchema, PartitionedDataset, TrainingSample};
use crate::classify::HazardKind;
use crate::config::{DatasetSettings, MiningSettings};
use crate::coords::{CellBounds, LatLon};
use crate::error::{HazardError, Result};
use crate::events::{EventKey, HistoricalEvent};
use crate::grid::source::GridAccessor;
use crate::grid::{nearest_time, SpatialAxes, WeatherGrid};

const NEGATIVE_SALT: u64 = 0x6E65_6761_7469_7665;
const CHUNK_MIX: u64 = 0x9E37_79B9_7F4A_7C15;
/// Draws allowed per requested negative before giving up on a chunk.
const ATTEMPTS_PER_NEGATIVE: usize = 50;

/// Space-time region no negative may be drawn from.
struct Exclusion {
    cells: CellBounds,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl Exclusion {
    fn new(e: &HistoricalEvent, axes: &SpatialAxes, settings: &DatasetSettings, cadence: Duration) -> Self {
        let (r0, c0) = axes.clamped_cell(LatLon::new(e.bounds.min_lat, e.bounds.min_lon));
        let (r1, c1) = axes.clamped_cell(LatLon::new(e.bounds.max_lat, e.bounds.max_lon));
        let mut cells = CellBounds::single(r0, c0);
        cells.include(r1, c1);
        let pad = cadence * settings.temporal_buffer_steps as i32;
        Self { cells: cells.expanded(settings.spatial_buffer_cells), from: e.start - pad, to: e.end + pad }
    }

    fn covers(&self, row: usize, col: usize, t: DateTime<Utc>) -> bool {
        t >= self.from && t <= self.to && self.cells.contains(row, col)
    }
}

/// Build the labelled, partitioned dataset for `hazard`.
///
/// `events` may hold any hazards; only `hazard`'s are used. Chunks are
/// loaded one at a time; a chunk that fails to load contributes no samples.
pub fn build_dataset(
    accessor: &dyn GridAccessor,
    events: &[HistoricalEvent],
    hazard: HazardKind,
    settings: &DatasetSettings,
    mining: &MiningSettings,
) -> Result<PartitionedDataset> {
    let schema = settings.schema()?;
    let tolerance = mining.tolerance();
    let cadence = mining.cadence();

    let mut events: Vec<&HistoricalEvent> = events.iter().filter(|e| e.hazard == hazard).collect();
    events.sort_by_key(|e| e.key());
    if events.is_empty() {
        return Err(HazardError::InsufficientData(format!("ledger has no {hazard} events")));
    }

    let target_negatives = (events.len() as f64 * settings.negative_ratio).round() as usize;
    let steps: Vec<usize> =
        (0..accessor.chunk_count()).map(|i| accessor.chunk_info(i).map_or(0, |c| c.steps)).collect();
    let quotas = allocate(target_negatives, &steps);

    let mut stats = DatasetStats::default();
    let mut placed: HashSet<EventKey> = HashSet::new();
    let mut positives = Vec::new();
    let mut negatives = Vec::new();

    for (index, &quota) in quotas.iter().enumerate() {
        let grid = match accessor.load_chunk(index) {
            Ok(g) => g,
            Err(e) => {
                log::warn!("dataset: chunk {index} unavailable, skipped: {e}");
                stats.negatives_short += quota;
                continue;
            }
        };
        let timeline = grid.timeline(tolerance);
        if timeline.is_empty() {
            stats.negatives_short += quota;
            continue;
        }

        for e in &events {
            if placed.contains(&e.key()) {
                continue;
            }
            if let Some(t) = nearest_time(&timeline, e.peak_time, tolerance) {
                placed.insert(e.key());
                match positive_sample(&grid, &schema, e, timeline[t], tolerance) {
                    Some(s) => positives.push(s),
                    None => stats.positives_skipped += 1,
                }
            }
        }

        let exclusions: Vec<Exclusion> = events
            .iter()
            .map(|e| Exclusion::new(e, &grid.axes, settings, cadence))
            .filter(|x| x.to >= timeline[0] && x.from <= timeline[timeline.len() - 1])
            .collect();
        let seed = settings.seed ^ NEGATIVE_SALT ^ (index as u64).wrapping_mul(CHUNK_MIX);
        let drawn = negative_samples(&grid, &schema, &timeline, &exclusions, quota, seed, tolerance);
        stats.negatives_short += quota - drawn.len();
        negatives.extend(drawn);
    }
    stats.positives_skipped += events.len() - placed.len();
    stats.positives = positives.len();
    stats.negatives = negatives.len();
    log::info!(
        "{hazard} dataset: {} positives, {} negatives ({} positives skipped, {} negatives short)",
        stats.positives,
        stats.negatives,
        stats.positives_skipped,
        stats.negatives_short
    );

    let mut samples = positives;
    samples.extend(negatives);
    let split = split_samples(samples, settings)?;
    stats.dropped_by_block = split.dropped;
    Ok(PartitionedDataset { hazard, schema, train: split.train, eval: split.eval, stats })
}

fn positive_sample(
    grid: &WeatherGrid,
    schema: &FeatureSchema,
    e: &HistoricalEvent,
    time: DateTime<Utc>,
    tolerance: Duration,
) -> Option<TrainingSample> {
    let (r, c) = grid.axes.nearest_cell(e.centroid)?;
    let cell = grid.axes.index(r, c);
    let snapshot = grid.snapshot(time, tolerance);
    let features = schema.extract(&snapshot, cell)?;
    Some(TrainingSample { time, location: grid.axes.cell_center(cell), features, label: true })
}

fn negative_samples(
    grid: &WeatherGrid,
    schema: &FeatureSchema,
    timeline: &[DateTime<Utc>],
    exclusions: &[Exclusion],
    quota: usize,
    seed: u64,
    tolerance: Duration,
) -> Vec<TrainingSample> {
    let mut rng = StdRng::seed_from_u64(seed);
    let cells = grid.axes.cell_count();
    let mut used: HashSet<(usize, usize)> = HashSet::new();
    let mut out = Vec::with_capacity(quota);
    let mut attempts = 0;
    while out.len() < quota && attempts < quota * ATTEMPTS_PER_NEGATIVE {
        attempts += 1;
        let t = rng.gen_range(0..timeline.len());
        let cell = rng.gen_range(0..cells);
        if !used.insert((t, cell)) {
            continue;
        }
        let (row, col) = grid.axes.row_col(cell);
        if exclusions.iter().any(|x| x.covers(row, col, timeline[t])) {
            continue;
        }
        let snapshot = grid.snapshot(timeline[t], tolerance);
        if let Some(features) = schema.extract(&snapshot, cell) {
            out.push(TrainingSample {
                time: timeline[t],
                location: grid.axes.cell_center(cell),
                features,
                label: false,
            });
        }
    }
    out
}

/// Split `total` across chunks in proportion to their step counts, by
/// cumulative rounding so the parts always sum to `total`.
fn allocate(total: usize, steps: &[usize]) -> Vec<usize> {
    let sum: usize = steps.iter().sum();
    if sum == 0 {
        return vec![0; steps.len()];
    }
    let mut out = Vec::with_capacity(steps.len());
    let mut cum = 0usize;
    let mut given = 0usize;
    for &s in steps {
        cum += s;
        let upto = ((total as f64) * cum as f64 / sum as f64).round() as usize;
        out.push(upto - given);
        given = upto;
    }
    out
}
