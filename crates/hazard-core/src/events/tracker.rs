//! Cross-timestep component tracking for one hazard.
//!
//! The registry of active tracks is an explicit value: the caller threads it
//! through chunk calls (and checkpoints it between runs).
//!
//! Tracks and components that share a cell form one region. Every component
//! of a region extends a single track, and every other track in the region is
//! absorbed into it, so splits and merges stay one event. The surviving track
//! belongs to the best candidate (track, component) pair, ordered by:
//! component size (desc), overlap with the track's last footprint (desc),
//! component peak severity (desc), then track start, track id and component
//! order for a total order.
//!
//! Events of one hazard never overlap. After each step any two tracks whose
//! step ranges and cell boxes both intersect are merged. A track that found
//! no continuation is held back until no live track can still reach it, then
//! released as an event.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::components::{connected_components, Component, Connectivity};
use super::{HistoricalEvent, RawSource, RawValues};
use crate::classify::{HazardFlagGrid, HazardKind};
use crate::coords::{CellBounds, GeoBounds, LatLon};
use crate::error::{HazardError, Result};
use crate::grid::SpatialAxes;

/// Lower bound on centroid weights so zero-severity cells still count.
const MIN_WEIGHT: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Peak {
    severity: f32,
    time: DateTime<Utc>,
    cell: usize,
    raw: RawValues,
}

impl Peak {
    /// Higher severity wins; ties keep the earlier time, then the lower cell.
    fn beats(&self, other: &Peak) -> bool {
        self.severity
            .total_cmp(&other.severity)
            .then(other.time.cmp(&self.time))
            .then(other.cell.cmp(&self.cell))
            .is_gt()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ActiveTrack {
    id: u64,
    start: DateTime<Utc>,
    last_time: DateTime<Utc>,
    /// Tracker step indices of the first and last flagged timestep.
    first_step: u64,
    last_step: u64,
    /// Cells flagged at `last_time`, ascending.
    footprint: Vec<usize>,
    cells_seen: BTreeSet<usize>,
    bounds: CellBounds,
    cell_steps: usize,
    weight_sum: f64,
    weighted_lat: f64,
    weighted_lon: f64,
    peak: Peak,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTracker {
    hazard: HazardKind,
    axes: SpatialAxes,
    connectivity: Connectivity,
    next_id: u64,
    step_index: u64,
    active: Vec<ActiveTrack>,
    /// Ended tracks a live track may still merge with.
    closing: Vec<ActiveTrack>,
    last_time: Option<DateTime<Utc>>,
}

impl EventTracker {
    pub fn new(hazard: HazardKind, axes: SpatialAxes, connectivity: Connectivity) -> Self {
        Self {
            hazard,
            axes,
            connectivity,
            next_id: 0,
            step_index: 0,
            active: Vec::new(),
            closing: Vec::new(),
            last_time: None,
        }
    }

    pub fn hazard(&self) -> HazardKind {
        self.hazard
    }

    /// Time of the last flag grid stepped through.
    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.last_time
    }

    /// Advance by one timestep. Returns the events released at this step.
    pub fn step(&mut self, flags: &HazardFlagGrid, raw: &dyn RawSource) -> Result<Vec<HistoricalEvent>> {
        if flags.hazard != self.hazard {
            return Err(HazardError::grid(format!(
                "{} tracker was fed {} flags",
                self.hazard, flags.hazard
            )));
        }
        if flags.width != self.axes.width() || flags.height != self.axes.height() {
            return Err(HazardError::grid(format!(
                "flag grid is {}×{}, tracker domain is {}×{}",
                flags.width,
                flags.height,
                self.axes.width(),
                self.axes.height()
            )));
        }
        if self.last_time.is_some_and(|t| flags.time <= t) {
            return Err(HazardError::grid(format!("flag grid at {} is not after the previous step", flags.time)));
        }
        self.last_time = Some(flags.time);
        self.step_index += 1;

        let components = connected_components(&flags.exceeded_mask(), flags.width, flags.height, self.connectivity);
        let peaks: Vec<f32> = components.iter().map(|c| component_peak(c, flags)).collect();

        // Candidate pairs with any overlap.
        let mut candidates: Vec<(usize, usize, usize)> = Vec::new();
        for (ti, track) in self.active.iter().enumerate() {
            for (ci, comp) in components.iter().enumerate() {
                let overlap = sorted_overlap(&track.footprint, &comp.cells);
                if overlap > 0 {
                    candidates.push((ti, ci, overlap));
                }
            }
        }
        candidates.sort_by(|&(ta, ca, oa), &(tb, cb, ob)| {
            components[cb]
                .len()
                .cmp(&components[ca].len())
                .then(ob.cmp(&oa))
                .then(peaks[cb].total_cmp(&peaks[ca]))
                .then(self.active[ta].start.cmp(&self.active[tb].start))
                .then(self.active[ta].id.cmp(&self.active[tb].id))
                .then(ca.cmp(&cb))
        });

        // Tracks and components linked by overlap form one space-time region.
        // Nodes 0..n are tracks, n.. are components.
        let n = self.active.len();
        let mut parent: Vec<usize> = (0..n + components.len()).collect();
        for &(ti, ci, _) in &candidates {
            union(&mut parent, ti, n + ci);
        }
        // The best-ranked pair of each region names the surviving track.
        let mut survivor: BTreeMap<usize, usize> = BTreeMap::new();
        for &(ti, _, _) in &candidates {
            let root = find(&mut parent, ti);
            survivor.entry(root).or_insert(ti);
        }

        let mut tracks: Vec<Option<ActiveTrack>> = std::mem::take(&mut self.active).into_iter().map(Some).collect();
        for ti in 0..n {
            let root = find(&mut parent, ti);
            match survivor.get(&root).copied() {
                Some(w) if w == ti => {}
                Some(w) => {
                    if let (Some(loser), Some(winner)) = (tracks[ti].take(), tracks[w].as_mut()) {
                        let (hazard, time) = (self.hazard, flags.time);
                        log::trace!("{hazard} track {} merged into track {} at {time}", loser.id, winner.id);
                        absorb(winner, loser);
                    }
                }
                None => {
                    if let Some(track) = tracks[ti].take() {
                        self.closing.push(track);
                    }
                }
            }
        }

        let mut region_cells: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut fresh = Vec::new();
        for (ci, comp) in components.iter().enumerate() {
            let root = find(&mut parent, n + ci);
            match survivor.get(&root) {
                Some(&w) => region_cells.entry(w).or_default().extend_from_slice(&comp.cells),
                None => fresh.push(ci),
            }
        }

        let mut continuing = Vec::with_capacity(region_cells.len() + fresh.len());
        for (w, mut cells) in region_cells {
            cells.sort_unstable();
            if let Some(mut track) = tracks[w].take() {
                self.extend(&mut track, &cells, flags, raw);
                continuing.push(track);
            }
        }
        for ci in fresh {
            let track = self.open(&components[ci], flags, raw);
            log::trace!("{} track {} opened at {} (component {ci})", self.hazard, track.id, flags.time);
            continuing.push(track);
        }
        self.active = continuing;
        Ok(self.settle())
    }

    /// Merge tracks whose step ranges and cell boxes both intersect, then
    /// release the ended tracks that no live track can reach any more.
    fn settle(&mut self) -> Vec<HistoricalEvent> {
        'restart: loop {
            for i in 0..self.active.len() {
                for j in i + 1..self.active.len() {
                    if self.active[i].bounds.intersects(&self.active[j].bounds) {
                        let mut other = self.active.remove(j);
                        if (other.start, other.id) < (self.active[i].start, self.active[i].id) {
                            std::mem::swap(&mut self.active[i], &mut other);
                        }
                        absorb(&mut self.active[i], other);
                        continue 'restart;
                    }
                }
                for j in 0..self.closing.len() {
                    let (live, ended) = (&self.active[i], &self.closing[j]);
                    if live.first_step <= ended.last_step && live.bounds.intersects(&ended.bounds) {
                        let ended = self.closing.remove(j);
                        log::trace!("{} track {} rejoined track {}", self.hazard, ended.id, self.active[i].id);
                        absorb(&mut self.active[i], ended);
                        continue 'restart;
                    }
                }
            }
            break;
        }

        // Absorbing an ended track pulls a live track's first step back, so
        // the reach extends through every ended track it could absorb.
        let mut horizon = self.active.iter().map(|t| t.first_step).min();
        while let Some(h) = horizon {
            let reach = self.closing.iter().filter(|t| t.last_step >= h).map(|t| t.first_step).min();
            match reach {
                Some(r) if r < h => horizon = Some(r),
                _ => break,
            }
        }
        let (held, released): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.closing).into_iter().partition(|t| horizon.is_some_and(|h| t.last_step >= h));
        self.closing = held;
        let mut out: Vec<HistoricalEvent> = released.into_iter().map(|t| self.close(t)).collect();
        out.sort_by(|a, b| a.key().cmp(&b.key()));
        out
    }

    /// A timestep or chunk is missing: close every active track. Events are
    /// never bridged across a gap.
    pub fn record_gap(&mut self) -> Vec<HistoricalEvent> {
        self.close_all()
    }

    /// End of the mining window: close every active track.
    pub fn finish(&mut self) -> Vec<HistoricalEvent> {
        self.close_all()
    }

    fn close_all(&mut self) -> Vec<HistoricalEvent> {
        let mut tracks = std::mem::take(&mut self.closing);
        tracks.append(&mut self.active);
        let mut out: Vec<HistoricalEvent> = tracks.into_iter().map(|t| self.close(t)).collect();
        out.sort_by(|a, b| a.key().cmp(&b.key()));
        out
    }

    fn open(&mut self, comp: &Component, flags: &HazardFlagGrid, raw: &dyn RawSource) -> ActiveTrack {
        let first = comp.cells[0];
        let (r, c) = self.axes.row_col(first);
        let mut track = ActiveTrack {
            id: self.next_id,
            start: flags.time,
            last_time: flags.time,
            first_step: self.step_index,
            last_step: self.step_index,
            footprint: Vec::new(),
            cells_seen: BTreeSet::new(),
            bounds: CellBounds::single(r, c),
            cell_steps: 0,
            weight_sum: 0.0,
            weighted_lat: 0.0,
            weighted_lon: 0.0,
            peak: Peak { severity: f32::NEG_INFINITY, time: flags.time, cell: first, raw: RawValues::default() },
        };
        self.next_id += 1;
        self.extend(&mut track, &comp.cells, flags, raw);
        track
    }

    /// Add this timestep's `cells` (ascending) to `track`.
    fn extend(&self, track: &mut ActiveTrack, cells: &[usize], flags: &HazardFlagGrid, raw: &dyn RawSource) {
        let mut peak_cell = None;
        for &i in cells {
            let sev = flags.cells[i].severity.unwrap_or(0.0);
            let (r, c) = self.axes.row_col(i);
            let centre = self.axes.cell_center(i);
            let w = (sev.abs() as f64).max(MIN_WEIGHT);
            track.weight_sum += w;
            track.weighted_lat += w * centre.lat;
            track.weighted_lon += w * centre.lon;
            track.bounds.include(r, c);
            track.cells_seen.insert(i);
            track.cell_steps += 1;
            // Strict comparison keeps the earliest time and lowest cell on ties.
            if sev > track.peak.severity {
                track.peak.severity = sev;
                track.peak.time = flags.time;
                track.peak.cell = i;
                peak_cell = Some(i);
            }
        }
        if let Some(i) = peak_cell {
            track.peak.raw = raw.raw_values(i);
        }
        track.footprint = cells.to_vec();
        track.last_time = flags.time;
        track.last_step = self.step_index;
    }

    fn close(&self, track: ActiveTrack) -> HistoricalEvent {
        let b = track.bounds;
        let axes = &self.axes;
        let bounds = GeoBounds {
            min_lat: axes.lats[b.min_row],
            max_lat: axes.lats[b.max_row],
            min_lon: axes.lons[b.min_col],
            max_lon: axes.lons[b.max_col],
        };
        // Clamp away rounding drift in the weighted sums.
        let centroid = LatLon::new(
            (track.weighted_lat / track.weight_sum).clamp(bounds.min_lat, bounds.max_lat),
            (track.weighted_lon / track.weight_sum).clamp(bounds.min_lon, bounds.max_lon),
        );
        let event = HistoricalEvent {
            hazard: self.hazard,
            start: track.start,
            end: track.last_time,
            peak_time: track.peak.time,
            centroid,
            peak_location: axes.cell_center(track.peak.cell),
            peak_severity: track.peak.severity,
            bounds,
            cell_count: track.cells_seen.len(),
            cell_steps: track.cell_steps,
            duration_steps: (track.last_step - track.first_step + 1) as usize,
            raw: track.peak.raw,
        };
        log::debug!(
            "{} event closed: {} .. {} over {} cells, peak {:.2}",
            self.hazard,
            event.start,
            event.end,
            event.cell_count,
            event.peak_severity
        );
        event
    }
}

/// Fold `other` into `into`. Merged tracks always share a step, so their
/// step ranges join into one contiguous range.
fn absorb(into: &mut ActiveTrack, other: ActiveTrack) {
    into.start = into.start.min(other.start);
    into.first_step = into.first_step.min(other.first_step);
    into.last_step = into.last_step.max(other.last_step);
    into.cells_seen.extend(other.cells_seen);
    into.bounds.include(other.bounds.min_row, other.bounds.min_col);
    into.bounds.include(other.bounds.max_row, other.bounds.max_col);
    into.cell_steps += other.cell_steps;
    into.weight_sum += other.weight_sum;
    into.weighted_lat += other.weighted_lat;
    into.weighted_lon += other.weighted_lon;
    if other.peak.beats(&into.peak) {
        into.peak = other.peak;
    }
    match other.last_time.cmp(&into.last_time) {
        Ordering::Greater => {
            into.last_time = other.last_time;
            into.footprint = other.footprint;
        }
        Ordering::Equal => {
            into.footprint.extend(other.footprint);
            into.footprint.sort_unstable();
            into.footprint.dedup();
        }
        Ordering::Less => {}
    }
}

fn find(parent: &mut [usize], x: usize) -> usize {
    let mut root = x;
    while parent[root] != root {
        root = parent[root];
    }
    let mut cur = x;
    while parent[cur] != root {
        let next = parent[cur];
        parent[cur] = root;
        cur = next;
    }
    root
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        parent[ra.max(rb)] = ra.min(rb);
    }
}

fn component_peak(comp: &Component, flags: &HazardFlagGrid) -> f32 {
    comp.cells
        .iter()
        .filter_map(|&i| flags.cells[i].severity)
        .max_by(f32::total_cmp)
        .unwrap_or(f32::NEG_INFINITY)
}

/// Size of the intersection of two ascending index lists.
fn sorted_overlap(a: &[usize], b: &[usize]) -> usize {
    let (mut i, mut j, mut n) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                n += 1;
                i += 1;
                j += 1;
            }
        }
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::CellFlag;
    use crate::events::NoRaw;
    use crate::grid::test_support::hours;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn axes(h: usize, w: usize) -> SpatialAxes {
        SpatialAxes::regular(40.0, 14.0, 0.25, h, w).unwrap()
    }

    /// Flags from (cell, severity) pairs; every other cell is clear.
    fn grid(axes: &SpatialAxes, h: i64, hot: &[(usize, f32)]) -> HazardFlagGrid {
        let mut cells = vec![CellFlag::above(0.0, 15.0); axes.cell_count()];
        for &(i, s) in hot {
            cells[i] = CellFlag::above(s, 15.0);
        }
        let (width, height) = (axes.width(), axes.height());
        HazardFlagGrid { hazard: HazardKind::HighWind, time: hours(h), width, height, cells }
    }

    fn run(tracker: &mut EventTracker, grids: &[HazardFlagGrid]) -> Vec<HistoricalEvent> {
        let mut out = Vec::new();
        for g in grids {
            out.extend(tracker.step(g, &NoRaw).unwrap());
        }
        out.extend(tracker.finish());
        out
    }

    #[test]
    fn moving_blob_stays_one_event() {
        let ax = axes(1, 6);
        let grids = vec![
            grid(&ax, 0, &[(0, 20.0), (1, 20.0)]),
            grid(&ax, 1, &[(1, 25.0), (2, 20.0)]),
            grid(&ax, 2, &[(2, 30.0), (3, 20.0)]),
        ];
        let mut t = EventTracker::new(HazardKind::HighWind, ax.clone(), Connectivity::Four);
        let events = run(&mut t, &grids);
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.peak_severity, 30.0);
        assert_eq!(e.peak_time, hours(2));
        assert_eq!(e.peak_location, ax.cell_center(2));
        assert_eq!(e.cell_count, 4);
    }

    #[test]
    fn no_overlap_means_new_event() {
        let ax = axes(1, 6);
        let grids = vec![grid(&ax, 0, &[(0, 20.0)]), grid(&ax, 1, &[(3, 20.0)])];
        let mut t = EventTracker::new(HazardKind::HighWind, ax, Connectivity::Eight);
        let first = t.step(&grids[0], &NoRaw).unwrap();
        assert!(first.is_empty());
        let second = t.step(&grids[1], &NoRaw).unwrap();
        assert_eq!(second.len(), 1, "track at cell 0 closes when nothing overlaps it");
        assert_eq!(t.finish().len(), 1);
    }

    fn assert_disjoint(events: &[HistoricalEvent]) {
        for (i, a) in events.iter().enumerate() {
            for b in &events[i + 1..] {
                assert!(!a.overlaps(b), "{:?} overlaps {:?}", a.key(), b.key());
            }
        }
    }

    #[test]
    fn split_stays_one_event() {
        // Footprint 0..=4 on a 1×7 row breaks into {0,1} and {4,5}.
        let ax = axes(1, 7);
        let t0 = grid(&ax, 0, &[(0, 20.0), (1, 20.0), (2, 20.0), (3, 20.0), (4, 20.0)]);
        let t1 = grid(&ax, 1, &[(0, 16.0), (1, 16.0), (4, 40.0), (5, 40.0)]);
        let mut t = EventTracker::new(HazardKind::HighWind, ax.clone(), Connectivity::Four);
        let events = run(&mut t, &[t0, t1]);
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!((e.start, e.end), (hours(0), hours(1)));
        assert_eq!(e.duration_steps, 2);
        assert_eq!(e.bounds.min_lon, ax.lons[0]);
        assert_eq!(e.bounds.max_lon, ax.lons[5]);
        assert_eq!(e.cell_count, 6);
        assert_eq!(e.cell_steps, 9);
        assert_eq!((e.peak_severity, e.peak_time, e.peak_location), (40.0, hours(1), ax.cell_center(4)));
    }

    #[test]
    fn merge_absorbs_the_younger_track() {
        let ax = axes(1, 7);
        let grids = vec![
            grid(&ax, 0, &[(0, 20.0), (1, 20.0)]),
            grid(&ax, 1, &[(0, 20.0), (1, 20.0), (4, 30.0), (5, 30.0)]),
            grid(&ax, 2, &[(1, 25.0), (2, 25.0), (3, 25.0), (4, 25.0)]),
        ];
        let mut t = EventTracker::new(HazardKind::HighWind, ax.clone(), Connectivity::Four);
        let events = run(&mut t, &grids);
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!((e.start, e.end), (hours(0), hours(2)));
        assert_eq!(e.duration_steps, 3);
        assert_eq!(e.cell_count, 6);
        assert_eq!(e.cell_steps, 2 + 4 + 4);
        assert_eq!((e.peak_severity, e.peak_time, e.peak_location), (30.0, hours(1), ax.cell_center(4)));
    }

    #[test]
    fn component_inside_a_live_extent_joins_it() {
        // An L along the top row and right column; cell 6 sits in its box
        // without touching it.
        let ax = axes(3, 3);
        let l_shape = [(0, 20.0), (1, 20.0), (2, 20.0), (5, 20.0), (8, 20.0)];
        let mut with_island = l_shape.to_vec();
        with_island.push((6, 35.0));
        let grids = vec![grid(&ax, 0, &l_shape), grid(&ax, 1, &with_island)];
        let mut t = EventTracker::new(HazardKind::HighWind, ax.clone(), Connectivity::Four);
        let events = run(&mut t, &grids);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start, hours(0));
        assert_eq!(events[0].cell_count, 6);
        assert_eq!(events[0].peak_location, ax.cell_center(6));
    }

    #[test]
    fn ended_track_is_held_until_no_live_track_can_reach_it() {
        // {0} ends after t0 while the track from {3} grows west into its box.
        let ax = axes(1, 5);
        let grids = vec![
            grid(&ax, 0, &[(0, 20.0), (3, 20.0)]),
            grid(&ax, 1, &[(2, 20.0), (3, 20.0)]),
            grid(&ax, 2, &[(0, 20.0), (1, 20.0), (2, 22.0)]),
            grid(&ax, 3, &[]),
        ];
        let mut t = EventTracker::new(HazardKind::HighWind, ax.clone(), Connectivity::Four);
        for g in &grids[..3] {
            assert!(t.step(g, &NoRaw).unwrap().is_empty());
        }
        let events = t.step(&grids[3], &NoRaw).unwrap();
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!((e.start, e.end), (hours(0), hours(2)));
        assert_eq!(e.duration_steps, 3);
        assert_eq!(e.cell_count, 4);
        assert!(t.finish().is_empty());
    }

    #[test]
    fn random_fields_yield_disjoint_events() {
        let ax = axes(6, 6);
        for seed in 0..8 {
            let mut rng = StdRng::seed_from_u64(seed);
            let grids: Vec<_> = (0..12)
                .map(|h| {
                    let hot: Vec<(usize, f32)> =
                        (0..36).filter_map(|i| rng.gen_bool(0.15).then(|| (i, rng.gen_range(15.5..40.0)))).collect();
                    grid(&ax, h, &hot)
                })
                .collect();
            for connectivity in [Connectivity::Four, Connectivity::Eight] {
                let mut t = EventTracker::new(HazardKind::HighWind, ax.clone(), connectivity);
                assert_disjoint(&run(&mut t, &grids));
            }
        }
    }

    #[test]
    fn centroid_inside_footprint_hull() {
        let ax = axes(6, 6);
        let mut rng = StdRng::seed_from_u64(11);
        let grids: Vec<_> = (0..5)
            .map(|h| {
                let hot: Vec<(usize, f32)> =
                    (0..36).filter_map(|i| rng.gen_bool(0.4).then(|| (i, rng.gen_range(15.5..40.0)))).collect();
                grid(&ax, h, &hot)
            })
            .collect();
        let mut t = EventTracker::new(HazardKind::HighWind, ax, Connectivity::Eight);
        for e in run(&mut t, &grids) {
            assert!(e.bounds.contains(e.centroid), "centroid {:?} outside {:?}", e.centroid, e.bounds);
        }
    }

    #[test]
    fn rejects_foreign_or_reordered_grids() {
        let ax = axes(2, 2);
        let mut t = EventTracker::new(HazardKind::HighWind, ax.clone(), Connectivity::Eight);
        let mut g = grid(&ax, 1, &[]);
        t.step(&g, &NoRaw).unwrap();
        g.time = hours(0);
        assert!(t.step(&g, &NoRaw).is_err());
        g.time = hours(2);
        g.hazard = HazardKind::Freezing;
        assert!(t.step(&g, &NoRaw).is_err());
    }

    #[test]
    fn checkpointed_tracker_resumes_identically() {
        let ax = axes(1, 4);
        let grids: Vec<_> = (0..4).map(|h| grid(&ax, h, &[(1, 20.0 + h as f32), (2, 18.0)])).collect();
        let mut straight = EventTracker::new(HazardKind::HighWind, ax.clone(), Connectivity::Four);
        let expected = run(&mut straight, &grids);

        let mut first = EventTracker::new(HazardKind::HighWind, ax, Connectivity::Four);
        for g in &grids[..2] {
            assert!(first.step(g, &NoRaw).unwrap().is_empty());
        }
        let mut resumed: EventTracker = serde_json::from_str(&serde_json::to_string(&first).unwrap()).unwrap();
        assert_eq!(run(&mut resumed, &grids[2..]), expected);
    }
}
