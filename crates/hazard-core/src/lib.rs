//! Weather hazard risk classification and historical event mining.
//!
//! Gridded fields ([`grid`]) are classified per cell into hazard flags
//! ([`classify`]), flags are tracked over time into discrete historical
//! events ([`events`]), events are joined back onto the grids into labelled
//! samples ([`dataset`]) and a forest classifier is trained on them
//! ([`model`]). [`pipeline`] drives the chunked, resumable mining run.

pub mod classify;
pub mod config;
pub mod coords;
pub mod dataset;
pub mod error;
pub mod events;
pub mod grid;
pub mod model;
pub mod pipeline;

pub use classify::{classify_snapshot, CellFlag, ClassificationPass, FlagState, HazardFlagGrid, HazardKind};
pub use config::{HazardConfig, PipelineConfig};
pub use error::{HazardError, Result};
pub use events::{EventLedger, HistoricalEvent};
pub use grid::{FieldKind, FieldSeries, SpatialAxes, WeatherGrid};
pub use model::{train_model, ModelArtifact, TrainedModel};
pub use pipeline::{mine, MiningReport, MiningState};
