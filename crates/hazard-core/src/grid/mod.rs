//! Read-only gridded meteorological fields (time × latitude × longitude).
//!
//! A [`WeatherGrid`] holds several fields over one shared spatial domain.
//! Fields may sit on different time axes; [`WeatherGrid::snapshot`] reconciles
//! them by nearest-or-exact timestamp match within a tolerance before any
//! joint use.
//!
//! Storage order per field: `data[t * height * width + row * width + col]`,
//! row 0 = southernmost latitude (axes are strictly increasing).

pub mod source;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::coords::{GeoBounds, LatLon};
use crate::error::{HazardError, Result};

// ── Field identifiers ─────────────────────────────────────────────────────────

/// Meteorological input fields consumed by the hazard rules.
///
/// Serialised with ECMWF short names; ERA5 / GRIB param aliases are accepted
/// on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldKind {
    #[serde(rename = "2t", alias = "t2m", alias = "var167")]
    Temperature2m,
    #[serde(rename = "2d", alias = "d2m", alias = "var168")]
    Dewpoint2m,
    #[serde(rename = "10u", alias = "u10", alias = "var165")]
    WindU10,
    #[serde(rename = "10v", alias = "v10", alias = "var166")]
    WindV10,
    /// Total precipitation, accumulated since the start of the forecast cycle.
    #[serde(rename = "tp", alias = "var228")]
    TotalPrecip,
}

impl FieldKind {
    pub const ALL: [FieldKind; 5] = [
        FieldKind::Temperature2m,
        FieldKind::Dewpoint2m,
        FieldKind::WindU10,
        FieldKind::WindV10,
        FieldKind::TotalPrecip,
    ];

    pub fn short_name(self) -> &'static str {
        match self {
            FieldKind::Temperature2m => "2t",
            FieldKind::Dewpoint2m => "2d",
            FieldKind::WindU10 => "10u",
            FieldKind::WindV10 => "10v",
            FieldKind::TotalPrecip => "tp",
        }
    }

    /// Resolve a short name or one of its ERA5 / GRIB aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "2t" | "t2m" | "var167" => Some(FieldKind::Temperature2m),
            "2d" | "d2m" | "var168" => Some(FieldKind::Dewpoint2m),
            "10u" | "u10" | "var165" => Some(FieldKind::WindU10),
            "10v" | "v10" | "var166" => Some(FieldKind::WindV10),
            "tp" | "var228" => Some(FieldKind::TotalPrecip),
            _ => None,
        }
    }

    /// Unit every field is normalised to on insertion.
    pub fn canonical_unit(self) -> &'static str {
        match self {
            FieldKind::Temperature2m | FieldKind::Dewpoint2m => "K",
            FieldKind::WindU10 | FieldKind::WindV10 => "m s**-1",
            FieldKind::TotalPrecip => "mm",
        }
    }

    /// Returns `(scale, offset)` mapping `unit` onto the canonical unit, or
    /// `None` if the unit is not understood for this field.
    fn unit_conversion(self, unit: &str) -> Option<(f32, f32)> {
        match (self, unit) {
            (FieldKind::Temperature2m | FieldKind::Dewpoint2m, "K") => Some((1.0, 0.0)),
            (FieldKind::Temperature2m | FieldKind::Dewpoint2m, "degC" | "C" | "°C") => Some((1.0, 273.15)),
            (FieldKind::WindU10 | FieldKind::WindV10, "m s**-1" | "m/s" | "m s-1") => Some((1.0, 0.0)),
            (FieldKind::TotalPrecip, "mm") => Some((1.0, 0.0)),
            (FieldKind::TotalPrecip, "m") => Some((1000.0, 0.0)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

// ── Axes ──────────────────────────────────────────────────────────────────────

/// Spatial axes shared by every field in a grid. Both vectors strictly increase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialAxes {
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
}

impl SpatialAxes {
    pub fn new(lats: Vec<f64>, lons: Vec<f64>) -> Result<Self> {
        let axes = Self { lats, lons };
        axes.validate()?;
        Ok(axes)
    }

    /// Regular axes starting at (`lat0`, `lon0`) with uniform `step` degrees.
    pub fn regular(lat0: f64, lon0: f64, step: f64, height: usize, width: usize) -> Result<Self> {
        let lats = (0..height).map(|r| lat0 + r as f64 * step).collect();
        let lons = (0..width).map(|c| lon0 + c as f64 * step).collect();
        Self::new(lats, lons)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lats.is_empty() || self.lons.is_empty() {
            return Err(HazardError::grid("spatial axes must be non-empty"));
        }
        for (name, axis) in [("latitude", &self.lats), ("longitude", &self.lons)] {
            if axis.iter().any(|v| !v.is_finite()) {
                return Err(HazardError::grid(format!("{name} axis contains non-finite values")));
            }
            if axis.windows(2).any(|w| w[1] <= w[0]) {
                return Err(HazardError::grid(format!("{name} axis must be strictly increasing")));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.lons.len()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.lats.len()
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.width() * self.height()
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.width() + col
    }

    #[inline]
    pub fn row_col(&self, cell: usize) -> (usize, usize) {
        (cell / self.width(), cell % self.width())
    }

    pub fn cell_center(&self, cell: usize) -> LatLon {
        let (r, c) = self.row_col(cell);
        LatLon::new(self.lats[r], self.lons[c])
    }

    pub fn extent(&self) -> GeoBounds {
        GeoBounds {
            min_lat: self.lats[0],
            max_lat: self.lats[self.lats.len() - 1],
            min_lon: self.lons[0],
            max_lon: self.lons[self.lons.len() - 1],
        }
    }

    /// Nearest (row, col) to `p`. Points more than half a grid step outside
    /// the domain return `None`.
    pub fn nearest_cell(&self, p: LatLon) -> Option<(usize, usize)> {
        Some((nearest_on_axis(&self.lats, p.lat)?, nearest_on_axis(&self.lons, p.lon)?))
    }

    /// Nearest (row, col) to `p`, clamped onto the domain edge.
    pub fn clamped_cell(&self, p: LatLon) -> (usize, usize) {
        (clamped_on_axis(&self.lats, p.lat), clamped_on_axis(&self.lons, p.lon))
    }
}

fn nearest_on_axis(axis: &[f64], v: f64) -> Option<usize> {
    let n = axis.len();
    let half_step = if n > 1 { (axis[1] - axis[0]).abs() / 2.0 } else { 0.5 };
    if v < axis[0] - half_step || v > axis[n - 1] + half_step {
        return None;
    }
    Some(clamped_on_axis(axis, v))
}

fn clamped_on_axis(axis: &[f64], v: f64) -> usize {
    let i = axis.partition_point(|&a| a < v);
    if i == 0 {
        return 0;
    }
    if i == axis.len() {
        return axis.len() - 1;
    }
    if (v - axis[i - 1]).abs() <= (axis[i] - v).abs() {
        i - 1
    } else {
        i
    }
}

/// Index of the timestamp in `times` nearest to `t`, if within `tolerance`.
/// Ties resolve to the earlier timestamp.
pub fn nearest_time(times: &[DateTime<Utc>], t: DateTime<Utc>, tolerance: Duration) -> Option<usize> {
    if times.is_empty() {
        return None;
    }
    let i = times.partition_point(|&x| x < t);
    let mut best: Option<(usize, Duration)> = None;
    for j in [i.checked_sub(1), Some(i)].into_iter().flatten() {
        if let Some(&tj) = times.get(j) {
            let d = (tj - t).abs();
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((j, d));
            }
        }
    }
    best.filter(|&(_, d)| d <= tolerance).map(|(j, _)| j)
}

// ── Field series ──────────────────────────────────────────────────────────────

#[inline]
pub fn is_missing(v: f32, sentinel: f32) -> bool {
    v.is_nan() || v == sentinel
}

/// One field over its own time axis, on the grid's spatial axes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSeries {
    pub unit: String,
    /// Strictly increasing.
    pub times: Vec<DateTime<Utc>>,
    /// Missing-value sentinel. NaN is always treated as missing as well.
    pub missing: f32,
    pub data: Vec<f32>,
}

impl FieldSeries {
    pub fn new(unit: impl Into<String>, times: Vec<DateTime<Utc>>, missing: f32, data: Vec<f32>) -> Self {
        Self { unit: unit.into(), times, missing, data }
    }

    /// Values of timestep `t` (row-major, `cells` long).
    #[inline]
    pub fn frame(&self, t: usize, cells: usize) -> &[f32] {
        &self.data[t * cells..(t + 1) * cells]
    }
}

// ── Grid ──────────────────────────────────────────────────────────────────────

/// Immutable multi-field grid over one rectangular spatial domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherGrid {
    pub axes: SpatialAxes,
    pub fields: BTreeMap<FieldKind, FieldSeries>,
}

impl WeatherGrid {
    pub fn new(axes: SpatialAxes) -> Result<Self> {
        axes.validate()?;
        Ok(Self { axes, fields: BTreeMap::new() })
    }

    /// Add (or replace) a field after checking its shape and time axis, and
    /// normalising its unit to [`FieldKind::canonical_unit`].
    pub fn insert_field(&mut self, kind: FieldKind, series: FieldSeries) -> Result<()> {
        let series = normalise_series(kind, series, self.axes.cell_count())?;
        self.fields.insert(kind, series);
        Ok(())
    }

    pub fn with_field(mut self, kind: FieldKind, series: FieldSeries) -> Result<Self> {
        self.insert_field(kind, series)?;
        Ok(self)
    }

    /// Re-check every invariant. Used after deserialising a grid from disk,
    /// since serde bypasses [`WeatherGrid::insert_field`].
    pub fn validate(self) -> Result<Self> {
        let mut grid = WeatherGrid::new(self.axes)?;
        for (kind, series) in self.fields {
            grid.insert_field(kind, series)?;
        }
        Ok(grid)
    }

    pub fn has_field(&self, kind: FieldKind) -> bool {
        self.fields.contains_key(&kind)
    }

    /// Union of all field timestamps, with timestamps closer than `tolerance`
    /// to an already-kept one collapsed onto the earlier timestamp.
    pub fn timeline(&self, tolerance: Duration) -> Vec<DateTime<Utc>> {
        let mut all: Vec<DateTime<Utc>> = self.fields.values().flat_map(|f| f.times.iter().copied()).collect();
        all.sort_unstable();
        let mut out: Vec<DateTime<Utc>> = Vec::with_capacity(all.len());
        for t in all {
            match out.last() {
                Some(&last) if t - last <= tolerance => {}
                _ => out.push(t),
            }
        }
        out
    }

    /// Joint view of every field at `time`. Fields with no timestamp within
    /// `tolerance` of `time` are left out of the snapshot.
    pub fn snapshot(&self, time: DateTime<Utc>, tolerance: Duration) -> Snapshot<'_> {
        let cells = self.axes.cell_count();
        let fields = self
            .fields
            .iter()
            .filter_map(|(&kind, series)| {
                let t = nearest_time(&series.times, time, tolerance)?;
                Some((
                    kind,
                    FieldSlice { values: series.frame(t, cells), missing: series.missing, time: series.times[t] },
                ))
            })
            .collect();
        Snapshot { time, axes: &self.axes, fields }
    }

    /// Sub-grid with every field restricted to timestamps in `[start, end)`.
    pub fn slice_time(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> WeatherGrid {
        let cells = self.axes.cell_count();
        let fields = self
            .fields
            .iter()
            .map(|(&kind, s)| {
                let lo = s.times.partition_point(|&t| t < start);
                let hi = s.times.partition_point(|&t| t < end);
                let series = FieldSeries {
                    unit: s.unit.clone(),
                    times: s.times[lo..hi].to_vec(),
                    missing: s.missing,
                    data: s.data[lo * cells..hi * cells].to_vec(),
                };
                (kind, series)
            })
            .collect();
        WeatherGrid { axes: self.axes.clone(), fields }
    }

    /// Split along time into consecutive chunks of at most `chunk` duration,
    /// anchored at the first timestamp. Empty chunks are dropped.
    pub fn split_time(&self, chunk: Duration, tolerance: Duration) -> Vec<WeatherGrid> {
        let timeline = self.timeline(tolerance);
        let (Some(&first), Some(&last)) = (timeline.first(), timeline.last()) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut start = first;
        while start <= last {
            let end = start + chunk;
            let part = self.slice_time(start, end);
            if part.fields.values().any(|f| !f.times.is_empty()) {
                out.push(part);
            }
            start = end;
        }
        out
    }
}

fn normalise_series(kind: FieldKind, mut series: FieldSeries, cells: usize) -> Result<FieldSeries> {
    if series.missing == 0.0 {
        return Err(HazardError::grid(format!("field {kind}: missing-value sentinel must be distinct from zero")));
    }
    if series.times.windows(2).any(|w| w[1] <= w[0]) {
        return Err(HazardError::grid(format!("field {kind}: timestamps must be strictly increasing")));
    }
    let expected = series.times.len() * cells;
    if series.data.len() != expected {
        return Err(HazardError::grid(format!(
            "field {kind}: expected {expected} values ({} steps × {cells} cells), got {}",
            series.times.len(),
            series.data.len()
        )));
    }
    let (scale, offset) = kind
        .unit_conversion(&series.unit)
        .ok_or_else(|| HazardError::grid(format!("field {kind}: unsupported unit `{}`", series.unit)))?;
    if scale != 1.0 || offset != 0.0 {
        let sentinel = series.missing;
        for v in &mut series.data {
            if !is_missing(*v, sentinel) {
                *v = *v * scale + offset;
            }
        }
    }
    series.unit = kind.canonical_unit().to_string();
    Ok(series)
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// One field's values at one (reconciled) timestep.
#[derive(Debug, Clone, Copy)]
pub struct FieldSlice<'a> {
    pub values: &'a [f32],
    pub missing: f32,
    /// The field's own timestamp that was matched.
    pub time: DateTime<Utc>,
}

impl FieldSlice<'_> {
    #[inline]
    pub fn get(&self, cell: usize) -> Option<f32> {
        let v = self.values[cell];
        (!is_missing(v, self.missing)).then_some(v)
    }

    /// True when every cell carries the missing sentinel.
    pub fn all_missing(&self) -> bool {
        self.values.iter().all(|&v| is_missing(v, self.missing))
    }
}

/// Temporally reconciled view of all available fields at one time.
#[derive(Debug, Clone)]
pub struct Snapshot<'a> {
    pub time: DateTime<Utc>,
    pub axes: &'a SpatialAxes,
    pub fields: BTreeMap<FieldKind, FieldSlice<'a>>,
}

impl<'a> Snapshot<'a> {
    #[inline]
    pub fn field(&self, kind: FieldKind) -> Option<&FieldSlice<'a>> {
        self.fields.get(&kind)
    }

    #[inline]
    pub fn value(&self, kind: FieldKind, cell: usize) -> Option<f32> {
        self.fields.get(&kind).and_then(|f| f.get(cell))
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.axes.cell_count()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn axes_must_strictly_increase() {
        assert!(SpatialAxes::new(vec![1.0, 1.0], vec![0.0]).is_err());
        assert!(SpatialAxes::new(vec![2.0, 1.0], vec![0.0]).is_err());
        assert!(SpatialAxes::new(vec![], vec![0.0]).is_err());
        assert!(SpatialAxes::new(vec![1.0, 2.0], vec![0.0, 0.25]).is_ok());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let axes = SpatialAxes::regular(40.0, 14.0, 0.25, 2, 2).unwrap();
        let mut grid = WeatherGrid::new(axes).unwrap();
        let bad = FieldSeries::new("K", vec![t0()], -9999.0, vec![280.0; 3]);
        assert!(grid.insert_field(FieldKind::Temperature2m, bad).is_err());
    }

    #[test]
    fn zero_sentinel_is_rejected() {
        let axes = SpatialAxes::regular(40.0, 14.0, 0.25, 1, 1).unwrap();
        let mut grid = WeatherGrid::new(axes).unwrap();
        let bad = FieldSeries::new("mm", vec![t0()], 0.0, vec![1.0]);
        assert!(grid.insert_field(FieldKind::TotalPrecip, bad).is_err());
    }

    #[test]
    fn precipitation_in_metres_is_converted_to_mm() {
        let axes = SpatialAxes::regular(40.0, 14.0, 0.25, 1, 2).unwrap();
        let grid = WeatherGrid::new(axes)
            .unwrap()
            .with_field(FieldKind::TotalPrecip, FieldSeries::new("m", vec![t0()], -9999.0, vec![0.006, -9999.0]))
            .unwrap();
        let tp = &grid.fields[&FieldKind::TotalPrecip];
        assert_eq!(tp.unit, "mm");
        assert!((tp.data[0] - 6.0).abs() < 1e-4);
        assert_eq!(tp.data[1], -9999.0, "sentinel must not be scaled");
    }

    #[test]
    fn snapshot_reconciles_offset_time_axes() {
        let axes = SpatialAxes::regular(40.0, 14.0, 0.25, 1, 1).unwrap();
        let offset: Vec<_> = (0..3).map(|h| hours(h) + Duration::minutes(10)).collect();
        let grid = WeatherGrid::new(axes)
            .unwrap()
            .with_field(FieldKind::Temperature2m, constant_series(FieldKind::Temperature2m, 3, 1, 300.0))
            .unwrap()
            .with_field(FieldKind::Dewpoint2m, FieldSeries::new("K", offset, -9999.0, vec![290.0, 291.0, 292.0]))
            .unwrap();

        let tol = Duration::minutes(30);
        assert_eq!(grid.timeline(tol).len(), 3);

        let snap = grid.snapshot(hours(1), tol);
        assert_eq!(snap.value(FieldKind::Dewpoint2m, 0), Some(291.0));

        let strict = grid.snapshot(hours(1), Duration::minutes(5));
        assert!(strict.field(FieldKind::Dewpoint2m).is_none());
        assert!(strict.field(FieldKind::Temperature2m).is_some());
    }

    #[test]
    fn missing_sentinel_and_nan_read_as_none() {
        let axes = SpatialAxes::regular(40.0, 14.0, 0.25, 1, 3).unwrap();
        let grid = WeatherGrid::new(axes)
            .unwrap()
            .with_field(
                FieldKind::Dewpoint2m,
                FieldSeries::new("K", vec![t0()], -9999.0, vec![290.0, -9999.0, f32::NAN]),
            )
            .unwrap();
        let snap = grid.snapshot(t0(), Duration::zero());
        assert_eq!(snap.value(FieldKind::Dewpoint2m, 0), Some(290.0));
        assert_eq!(snap.value(FieldKind::Dewpoint2m, 1), None);
        assert_eq!(snap.value(FieldKind::Dewpoint2m, 2), None);
    }

    #[test]
    fn split_time_partitions_every_timestep_once() {
        let axes = SpatialAxes::regular(40.0, 14.0, 0.25, 2, 2).unwrap();
        let grid = WeatherGrid::new(axes)
            .unwrap()
            .with_field(FieldKind::TotalPrecip, constant_series(FieldKind::TotalPrecip, 10, 4, 1.0))
            .unwrap();
        let chunks = grid.split_time(Duration::hours(4), Duration::minutes(30));
        let steps: Vec<usize> = chunks.iter().map(|c| c.fields[&FieldKind::TotalPrecip].times.len()).collect();
        assert_eq!(steps, vec![4, 4, 2]);
    }

    #[test]
    fn nearest_cell_rejects_far_points() {
        let axes = SpatialAxes::regular(40.0, 14.0, 0.5, 3, 3).unwrap();
        assert_eq!(axes.nearest_cell(LatLon::new(40.6, 14.9)), Some((1, 2)));
        assert_eq!(axes.nearest_cell(LatLon::new(39.8, 13.8)), Some((0, 0)));
        assert_eq!(axes.nearest_cell(LatLon::new(38.0, 14.0)), None);
        assert_eq!(axes.clamped_cell(LatLon::new(38.0, 14.0)), (0, 0));
    }

    #[test]
    fn field_aliases_resolve() {
        assert_eq!(FieldKind::from_name("t2m"), Some(FieldKind::Temperature2m));
        assert_eq!(FieldKind::from_name("var228"), Some(FieldKind::TotalPrecip));
        let k: FieldKind = serde_json::from_str("\"u10\"").unwrap();
        assert_eq!(k, FieldKind::WindU10);
        assert_eq!(serde_json::to_string(&k).unwrap(), "\"10u\"");
    }
}
