//! End-to-end runs over a synthetic archive: mining, dataset building,
//! training and inference.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hazard_core::dataset::build_dataset;
use hazard_core::grid::source::InMemoryAccessor;
use hazard_core::model::FeatureVector;
use hazard_core::{
    mine, train_model, EventLedger, FieldKind, FieldSeries, HazardKind, MiningState, ModelArtifact, PipelineConfig,
    SpatialAxes, WeatherGrid,
};

const DAYS: usize = 20;
const SIDE: usize = 8;
const WINDY_HOURS: [usize; 3] = [12, 13, 14];

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap()
}

/// Top-left cell of the 2×2 gust block on day `d`.
fn block(d: usize) -> (usize, usize) {
    ((d * 3) % (SIDE - 2), (d * 5) % (SIDE - 2))
}

/// Hourly 8×8 archive with light background wind and one 2×2 gust block
/// per day at midday.
fn archive() -> WeatherGrid {
    let cells = SIDE * SIDE;
    let steps = DAYS * 24;
    let axes = SpatialAxes::regular(40.0, 10.0, 0.25, SIDE, SIDE).unwrap();
    let mut u: Vec<f32> = (0..steps * cells).map(|i| 3.0 + ((i * 7) % 10) as f32 * 0.2).collect();
    let v: Vec<f32> = (0..steps * cells).map(|i| ((i * 3) % 5) as f32 * 0.3).collect();
    for d in 0..DAYS {
        let (r, c) = block(d);
        for h in WINDY_HOURS {
            let step = d * 24 + h;
            for (dr, dc) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                u[step * cells + axes.index(r + dr, c + dc)] = 22.0;
            }
        }
    }
    let times: Vec<_> = (0..steps as i64).map(|h| t0() + Duration::hours(h)).collect();
    WeatherGrid::new(axes)
        .unwrap()
        .with_field(FieldKind::WindU10, FieldSeries::new("m/s", times.clone(), -9999.0, u))
        .unwrap()
        .with_field(FieldKind::WindV10, FieldSeries::new("m/s", times, -9999.0, v))
        .unwrap()
}

fn config() -> PipelineConfig {
    PipelineConfig::from_toml_str(
        r#"
[mining]
chunk_hours = 72

[dataset]
features = ["10u", "10v", "latitude", "longitude"]
negative_ratio = 3.0
eval_fraction = 0.25

[training]
n_trees = 40
"#,
    )
    .unwrap()
}

fn accessor(grid: &WeatherGrid, config: &PipelineConfig) -> InMemoryAccessor {
    InMemoryAccessor::new(grid, config.mining.chunk(), config.mining.tolerance())
}

#[test]
fn archive_to_model() {
    let config = config();
    let grid = archive();
    let acc = accessor(&grid, &config);

    let mut ledger = EventLedger::in_memory();
    let report = mine(&acc, &config, &mut ledger, &mut MiningState::new(&config), None).unwrap();
    assert_eq!(report.timesteps, DAYS * 24);
    assert!(report.gaps.is_empty());

    let wind = ledger.events_for(HazardKind::HighWind);
    assert_eq!(wind.len(), DAYS);
    for (d, e) in wind.iter().enumerate() {
        let noon = t0() + Duration::hours((d * 24 + 12) as i64);
        assert_eq!(e.start, noon);
        assert_eq!(e.end, noon + Duration::hours(2));
        assert_eq!(e.cell_count, 4);
        assert_eq!(e.duration_steps, 3);
        assert!(e.bounds.contains(e.centroid));
    }

    let dataset = build_dataset(&acc, &wind, HazardKind::HighWind, &config.dataset, &config.mining).unwrap();
    assert_eq!(dataset.stats.positives, DAYS);
    assert_eq!(dataset.stats.negatives, DAYS * 3);
    assert!(dataset.train.iter().chain(&dataset.eval).all(|s| s.label == (s.features[0] > 15.0)));
    let last_train = dataset.train.iter().map(|s| s.time).max().unwrap();
    let first_eval = dataset.eval.iter().map(|s| s.time).min().unwrap();
    assert!(last_train.date_naive() < first_eval.date_naive(), "splits share a day");

    let trained = train_model(&dataset, &config.training).unwrap();
    assert!(trained.metrics.accuracy >= 0.8, "accuracy {}", trained.metrics.accuracy);
    assert!(trained.metrics.recall() >= 0.6, "recall {}", trained.metrics.recall());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wind.json");
    trained.artifact.save(&path).unwrap();
    let model = ModelArtifact::load(&path).unwrap();
    assert_eq!(model.hazard, HazardKind::HighWind);
    assert_eq!(model.training_fingerprint, dataset.fingerprint());

    let gusty = FeatureVector::from_pairs([("10u", 22.0), ("10v", 0.3), ("latitude", 40.5), ("longitude", 10.5)]);
    let calm = FeatureVector::from_pairs([("10u", 3.2), ("10v", 0.3), ("latitude", 40.5), ("longitude", 10.5)]);
    assert!(model.predict(&gusty).unwrap().probability > model.predict(&calm).unwrap().probability);
}

#[test]
fn mined_events_never_overlap_within_a_hazard() {
    let config = config();
    let grid = archive();
    let mut ledger = EventLedger::in_memory();
    mine(&accessor(&grid, &config), &config, &mut ledger, &mut MiningState::new(&config), None).unwrap();

    let events = ledger.events();
    assert!(!events.is_empty());
    for (i, a) in events.iter().enumerate() {
        for b in &events[i + 1..] {
            assert!(!a.overlaps(b), "{:?} overlaps {:?}", a.key(), b.key());
        }
    }
}

#[test]
fn file_ledger_remining_appends_nothing() {
    let config = config();
    let grid = archive();
    let acc = accessor(&grid, &config);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");

    let mut ledger = EventLedger::open(&path).unwrap();
    let first = mine(&acc, &config, &mut ledger, &mut MiningState::new(&config), None).unwrap();
    assert_eq!(first.events.inserted, DAYS);

    let mut reopened = EventLedger::open(&path).unwrap();
    assert_eq!(reopened.len(), DAYS);
    let second = mine(&acc, &config, &mut reopened, &mut MiningState::new(&config), None).unwrap();
    assert_eq!(second.events.inserted, 0);
    assert_eq!(second.events.skipped, DAYS);
    assert_eq!(EventLedger::open(&path).unwrap().events(), ledger.events());
}

#[test]
fn dataset_build_is_deterministic() {
    let config = config();
    let grid = archive();
    let acc = accessor(&grid, &config);
    let mut ledger = EventLedger::in_memory();
    mine(&acc, &config, &mut ledger, &mut MiningState::new(&config), None).unwrap();
    let events = ledger.events_for(HazardKind::HighWind);

    let a = build_dataset(&acc, &events, HazardKind::HighWind, &config.dataset, &config.mining).unwrap();
    let b = build_dataset(&acc, &events, HazardKind::HighWind, &config.dataset, &config.mining).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.fingerprint(), b.fingerprint());
}

/// 1×7 strip of hourly wind: a band splits in two, the halves drift apart,
/// and a new band bridges them.
fn splitting_band() -> WeatherGrid {
    let frames: [&[usize]; 5] = [&[0, 1, 2, 3, 4], &[0, 1, 4, 5], &[0, 5, 6], &[1, 2, 3, 4, 5], &[]];
    let axes = SpatialAxes::regular(40.0, 10.0, 0.25, 1, 7).unwrap();
    let mut u = vec![2.0f32; frames.len() * 7];
    for (step, windy) in frames.iter().enumerate() {
        for &cell in windy.iter() {
            u[step * 7 + cell] = 20.0 + cell as f32;
        }
    }
    let times: Vec<_> = (0..frames.len() as i64).map(|h| t0() + Duration::hours(h)).collect();
    let calm = vec![0.0; u.len()];
    WeatherGrid::new(axes)
        .unwrap()
        .with_field(FieldKind::WindU10, FieldSeries::new("m/s", times.clone(), -9999.0, u))
        .unwrap()
        .with_field(FieldKind::WindV10, FieldSeries::new("m/s", times, -9999.0, calm))
        .unwrap()
}

#[test]
fn split_and_rejoined_band_is_one_event() {
    let config = PipelineConfig::from_toml_str("[mining]\nchunk_hours = 2\n").unwrap();
    let grid = splitting_band();
    let mut ledger = EventLedger::in_memory();
    mine(&accessor(&grid, &config), &config, &mut ledger, &mut MiningState::new(&config), None).unwrap();

    let wind = ledger.events_for(HazardKind::HighWind);
    assert_eq!(wind.len(), 1, "{wind:?}");
    let e = &wind[0];
    assert_eq!((e.start, e.end), (t0(), t0() + Duration::hours(3)));
    assert_eq!(e.duration_steps, 4);
    assert_eq!(e.cell_count, 7);
    assert_eq!(e.peak_severity, 26.0);
    for (i, a) in ledger.events().iter().enumerate() {
        for b in &ledger.events()[i + 1..] {
            assert!(!a.overlaps(b), "{:?} overlaps {:?}", a.key(), b.key());
        }
    }
}
