//! Leakage-controlled train/evaluation partitioning.
//!
//! Samples are grouped by UTC day (or exact timestamp); the latest groups go
//! to evaluation, so no timestamp appears on both sides. Optionally, samples
//! are also assigned to lat/lon blocks, a seeded subset of blocks is marked
//! for evaluation, and a sample is kept only when its block agrees with its
//! time group.

use std::collections::{BTreeSet, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::TrainingSample;
use crate::config::{DatasetSettings, SplitUnit};
use crate::error::{HazardError, Result};

const BLOCK_SALT: u64 = 0x626C_6F63_6B73_706C;

#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: Vec<TrainingSample>,
    pub eval: Vec<TrainingSample>,
    pub dropped: usize,
}

fn group_of(s: &TrainingSample, unit: SplitUnit) -> i64 {
    match unit {
        SplitUnit::Day => s.time.timestamp().div_euclid(86_400),
        SplitUnit::Timestamp => s.time.timestamp(),
    }
}

fn block_of(s: &TrainingSample, deg: f64) -> (i64, i64) {
    ((s.location.lat / deg).floor() as i64, (s.location.lon / deg).floor() as i64)
}

/// Number of held-out units out of `n`, at least one on each side.
fn held_out(n: usize, fraction: f64) -> usize {
    ((n as f64 * fraction).ceil() as usize).clamp(1, n - 1)
}

pub fn split_samples(samples: Vec<TrainingSample>, settings: &DatasetSettings) -> Result<Split> {
    let groups: BTreeSet<i64> = samples.iter().map(|s| group_of(s, settings.split_unit)).collect();
    if groups.len() < 2 {
        return Err(HazardError::InsufficientData(format!(
            "{} distinct {:?} group(s); a temporal split needs at least two",
            groups.len(),
            settings.split_unit
        )));
    }
    let n_eval = held_out(groups.len(), settings.eval_fraction);
    let eval_groups: HashSet<i64> = groups.iter().rev().take(n_eval).copied().collect();

    let eval_blocks: Option<(f64, HashSet<(i64, i64)>)> = match settings.spatial_block_deg {
        None => None,
        Some(deg) => {
            let mut blocks: Vec<(i64, i64)> =
                samples.iter().map(|s| block_of(s, deg)).collect::<BTreeSet<_>>().into_iter().collect();
            if blocks.len() < 2 {
                return Err(HazardError::InsufficientData(format!(
                    "spatial blocks of {deg}° leave a single block; a spatial split needs at least two"
                )));
            }
            let n = held_out(blocks.len(), settings.eval_fraction);
            blocks.shuffle(&mut StdRng::seed_from_u64(settings.seed ^ BLOCK_SALT));
            Some((deg, blocks.into_iter().take(n).collect()))
        }
    };

    let mut split = Split { train: Vec::new(), eval: Vec::new(), dropped: 0 };
    for s in samples {
        let in_eval = eval_groups.contains(&group_of(&s, settings.split_unit));
        if let Some((deg, blocks)) = &eval_blocks {
            if blocks.contains(&block_of(&s, *deg)) != in_eval {
                split.dropped += 1;
                continue;
            }
        }
        if in_eval {
            split.eval.push(s);
        } else {
            split.train.push(s);
        }
    }

    if split.train.is_empty() || split.eval.is_empty() {
        return Err(HazardError::InsufficientData(format!(
            "split left {} training and {} evaluation samples",
            split.train.len(),
            split.eval.len()
        )));
    }
    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::LatLon;
    use crate::grid::test_support::hours;

    fn sample(h: i64, lat: f64, lon: f64) -> TrainingSample {
        TrainingSample { time: hours(h), location: LatLon::new(lat, lon), features: vec![h as f32], label: h % 3 == 0 }
    }

    fn spread() -> Vec<TrainingSample> {
        (0..240).map(|h| sample(h, 30.0 + (h % 7) as f64, 10.0 + (h % 5) as f64)).collect()
    }

    #[test]
    fn no_timestamp_or_day_on_both_sides() {
        let split = split_samples(spread(), &DatasetSettings::default()).unwrap();
        let train_days: HashSet<_> = split.train.iter().map(|s| s.time.date_naive()).collect();
        assert!(split.eval.iter().all(|s| !train_days.contains(&s.time.date_naive())));
        // 10 days, 20 % held out → the last two days.
        assert_eq!(split.eval.len(), 48);
        assert!(split.train.iter().map(|s| s.time).max() < split.eval.iter().map(|s| s.time).min());
    }

    #[test]
    fn timestamp_unit_still_disjoint() {
        let settings = DatasetSettings { split_unit: SplitUnit::Timestamp, ..DatasetSettings::default() };
        let split = split_samples(spread(), &settings).unwrap();
        let train_times: HashSet<_> = split.train.iter().map(|s| s.time).collect();
        assert!(split.eval.iter().all(|s| !train_times.contains(&s.time)));
    }

    #[test]
    fn spatial_blocks_keep_only_agreeing_samples() {
        let settings = DatasetSettings { spatial_block_deg: Some(2.0), ..DatasetSettings::default() };
        let split = split_samples(spread(), &settings).unwrap();
        let train_blocks: HashSet<_> = split.train.iter().map(|s| block_of(s, 2.0)).collect();
        let eval_blocks: HashSet<_> = split.eval.iter().map(|s| block_of(s, 2.0)).collect();
        assert!(train_blocks.is_disjoint(&eval_blocks));
        assert_eq!(split.train.len() + split.eval.len() + split.dropped, 240);
        assert_eq!(split, split_samples(spread(), &settings).unwrap(), "block assignment is seeded");
    }

    #[test]
    fn single_day_cannot_be_split() {
        let samples: Vec<_> = (0..5).map(|h| sample(h, 40.0, 14.0)).collect();
        assert!(matches!(
            split_samples(samples, &DatasetSettings::default()),
            Err(HazardError::InsufficientData(_))
        ));
    }
}
