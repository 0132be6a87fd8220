/// Geographic point and bounding-box types.
/// All coordinate math uses f64 for precision.

use serde::{Deserialize, Serialize};

/// A point in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
    /// Longitude in degrees, -180 to +180 (or 0 to 360, matching the grid).
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Inclusive latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl GeoBounds {
    pub fn contains(&self, p: LatLon) -> bool {
        p.lat >= self.min_lat && p.lat <= self.max_lat && p.lon >= self.min_lon && p.lon <= self.max_lon
    }

    pub fn intersects(&self, other: &GeoBounds) -> bool {
        self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
            && self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
    }
}

/// Inclusive row/column box in grid-index space. Row 0 is the southernmost row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellBounds {
    pub min_row: usize,
    pub max_row: usize,
    pub min_col: usize,
    pub max_col: usize,
}

impl CellBounds {
    pub fn single(row: usize, col: usize) -> Self {
        Self { min_row: row, max_row: row, min_col: col, max_col: col }
    }

    pub fn include(&mut self, row: usize, col: usize) {
        self.min_row = self.min_row.min(row);
        self.max_row = self.max_row.max(row);
        self.min_col = self.min_col.min(col);
        self.max_col = self.max_col.max(col);
    }

    /// Grow by `cells` on every side, saturating at zero. The upper edges are
    /// not clamped to the grid; callers compare against in-grid indices only.
    pub fn expanded(&self, cells: usize) -> Self {
        Self {
            min_row: self.min_row.saturating_sub(cells),
            max_row: self.max_row + cells,
            min_col: self.min_col.saturating_sub(cells),
            max_col: self.max_col + cells,
        }
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.min_row && row <= self.max_row && col >= self.min_col && col <= self.max_col
    }

    /// Boxes sharing an edge row or column intersect.
    pub fn intersects(&self, other: &CellBounds) -> bool {
        self.min_row <= other.max_row
            && other.min_row <= self.max_row
            && self.min_col <= other.max_col
            && other.min_col <= self.max_col
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expanded_bounds_saturate_at_origin() {
        let b = CellBounds::single(0, 3).expanded(1);
        assert_eq!(b, CellBounds { min_row: 0, max_row: 1, min_col: 2, max_col: 4 });
        assert!(b.contains(1, 4));
        assert!(!b.contains(2, 4));
    }

    #[test]
    fn cell_bounds_touching_on_a_column_intersect() {
        let left = CellBounds { min_row: 0, max_row: 0, min_col: 0, max_col: 2 };
        let right = CellBounds { min_row: 0, max_row: 1, min_col: 2, max_col: 5 };
        let apart = CellBounds::single(0, 3);
        assert!(left.intersects(&right) && right.intersects(&left));
        assert!(!left.intersects(&apart));
        assert!(right.intersects(&apart));
    }

    #[test]
    fn geo_bounds_intersection_is_symmetric() {
        let a = GeoBounds { min_lat: 40.0, max_lat: 41.0, min_lon: 14.0, max_lon: 15.0 };
        let b = GeoBounds { min_lat: 41.0, max_lat: 42.0, min_lon: 14.5, max_lon: 16.0 };
        let c = GeoBounds { min_lat: 43.0, max_lat: 44.0, min_lon: 14.5, max_lon: 16.0 };
        assert!(a.intersects(&b) && b.intersects(&a));
        assert!(!a.intersects(&c) && !c.intersects(&a));
        assert!(a.contains(LatLon::new(40.5, 14.2)));
    }
}
