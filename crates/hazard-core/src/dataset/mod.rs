//! Labelled feature tables for training.
//!
//! Positives come from ledger events, negatives from randomly drawn
//! space-time points kept clear of every event of the same hazard. The
//! result is partitioned chronologically so that train and evaluation never
//! share a timestamp.

pub mod sampling;
pub mod split;

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::classify::HazardKind;
use crate::coords::LatLon;
use crate::error::{HazardError, Result};
use crate::grid::{FieldKind, Snapshot};

pub use sampling::build_dataset;
pub use split::split_samples;

// ── Feature schema ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    Field(FieldKind),
    Latitude,
    Longitude,
    DayOfYear,
    HourOfDay,
}

impl Feature {
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(kind) = FieldKind::from_name(name) {
            return Some(Feature::Field(kind));
        }
        match name {
            "latitude" | "lat" => Some(Feature::Latitude),
            "longitude" | "lon" => Some(Feature::Longitude),
            "day_of_year" => Some(Feature::DayOfYear),
            "hour_of_day" => Some(Feature::HourOfDay),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Feature::Field(kind) => kind.short_name(),
            Feature::Latitude => "latitude",
            Feature::Longitude => "longitude",
            Feature::DayOfYear => "day_of_year",
            Feature::HourOfDay => "hour_of_day",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered feature list. Serialised as its canonical names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    features: Vec<Feature>,
}

impl FeatureSchema {
    /// Resolve names (aliases allowed). Rejects unknown, duplicate and empty lists.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        if names.is_empty() {
            return Err(HazardError::config("feature schema must not be empty"));
        }
        let mut features = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let f = Feature::parse(name).ok_or_else(|| HazardError::config(format!("unknown feature `{name}`")))?;
            if features.contains(&f) {
                return Err(HazardError::config(format!("feature `{f}` listed twice")));
            }
            features.push(f);
        }
        Ok(Self { features })
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Grid fields the schema reads.
    pub fn fields(&self) -> impl Iterator<Item = FieldKind> + '_ {
        self.features.iter().filter_map(|f| match f {
            Feature::Field(k) => Some(*k),
            _ => None,
        })
    }

    /// Feature vector for one cell of a snapshot. `None` if any field value
    /// is missing there.
    pub fn extract(&self, snapshot: &Snapshot<'_>, cell: usize) -> Option<Vec<f32>> {
        let at = snapshot.axes.cell_center(cell);
        self.features.iter().map(|&f| feature_value(f, snapshot, cell, at, snapshot.time)).collect()
    }
}

fn feature_value(f: Feature, snapshot: &Snapshot<'_>, cell: usize, at: LatLon, time: DateTime<Utc>) -> Option<f32> {
    match f {
        Feature::Field(kind) => snapshot.value(kind, cell),
        Feature::Latitude => Some(at.lat as f32),
        Feature::Longitude => Some(at.lon as f32),
        Feature::DayOfYear => Some(time.ordinal() as f32),
        Feature::HourOfDay => Some(time.hour() as f32),
    }
}

impl TryFrom<Vec<String>> for FeatureSchema {
    type Error = HazardError;

    fn try_from(names: Vec<String>) -> Result<Self> {
        FeatureSchema::parse(&names)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(schema: FeatureSchema) -> Self {
        schema.names()
    }
}

// ── Samples ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub time: DateTime<Utc>,
    pub location: LatLon,
    pub features: Vec<f32>,
    /// Hazard occurred.
    pub label: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub positives: usize,
    pub negatives: usize,
    /// Events whose representative point fell in a missing chunk or had missing features.
    pub positives_skipped: usize,
    /// Negatives requested but not found within the attempt budget.
    pub negatives_short: usize,
    /// Samples discarded because their spatial block disagreed with their time group.
    pub dropped_by_block: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionedDataset {
    pub hazard: HazardKind,
    pub schema: FeatureSchema,
    pub train: Vec<TrainingSample>,
    pub eval: Vec<TrainingSample>,
    pub stats: DatasetStats,
}

impl PartitionedDataset {
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_vec(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let ds: PartitionedDataset = serde_json::from_slice(&fs::read(path)?)?;
        let width = ds.schema.len();
        if ds.train.iter().chain(&ds.eval).any(|s| s.features.len() != width) {
            return Err(HazardError::InsufficientData(format!(
                "{}: sample width does not match the {width}-feature schema",
                path.display()
            )));
        }
        Ok(ds)
    }

    /// SHA-256 over hazard, schema and every sample, hex-encoded.
    pub fn fingerprint(&self) -> String {
        let mut h = Sha256::new();
        h.update(self.hazard.name().as_bytes());
        for name in self.schema.names() {
            h.update(name.as_bytes());
            h.update([0u8]);
        }
        for (tag, split) in [(b'T', &self.train), (b'E', &self.eval)] {
            for s in split {
                h.update([tag]);
                h.update(s.time.timestamp().to_le_bytes());
                h.update(s.location.lat.to_le_bytes());
                h.update(s.location.lon.to_le_bytes());
                for v in &s.features {
                    h.update(v.to_le_bytes());
                }
                h.update([s.label as u8]);
            }
        }
        hex::encode(h.finalize())
    }
}
