//! Precipitation rate and trailing-window totals from an accumulated field.
//!
//! Accumulated precipitation is differenced between consecutive readings of
//! the accumulation field, using the field's own timestamps. A negative
//! difference, or one implying a rate above the plausibility ceiling, means
//! the accumulation restarted (forecast-cycle boundary), in which case the
//! latest accumulation itself is the increment.
//!
//! [`PrecipAccumulator`] is the only state carried between timesteps. It is
//! threaded explicitly through chunk calls and serialised into mining
//! checkpoints, so chunk boundaries never reset the rolling window.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::grid::FieldSlice;

/// Differences more negative than this (mm) are accumulation resets; smaller
/// negative differences are packing noise and read as zero.
pub const RESET_TOLERANCE_MM: f32 = 0.01;

/// Differenced rates above this (mm/h) cannot be rainfall and are read as
/// accumulation resets.
pub const DEFAULT_MAX_RATE_MM_H: f32 = 500.0;

fn default_max_rate() -> f32 {
    DEFAULT_MAX_RATE_MM_H
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Frame {
    time: DateTime<Utc>,
    values: Vec<Option<f32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Increment {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    values: Vec<Option<f32>>,
}

/// Derived precipitation quantities at one accumulation reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecipDerived {
    /// Time of the accumulation reading.
    pub time: DateTime<Utc>,
    /// Hours since the previous accumulation reading.
    pub interval_hours: f32,
    /// mm/h over the last interval, per cell.
    pub rate: Vec<Option<f32>>,
    /// mm over the trailing window, per cell.
    pub window_total: Vec<Option<f32>>,
    /// Hours of history actually backing `window_total` (≤ `window_hours`).
    pub window_covered_hours: f32,
    pub window_hours: f32,
}

impl PrecipDerived {
    /// Whether history spans the whole trailing window. A partial window
    /// total is a lower bound only.
    pub fn window_complete(&self) -> bool {
        self.window_covered_hours >= self.window_hours
    }
}

/// Rolling accumulator: the previous accumulation frame plus every increment
/// that still falls inside the trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecipAccumulator {
    window_minutes: i64,
    #[serde(default = "default_max_rate")]
    max_rate_mm_h: f32,
    previous: Option<Frame>,
    increments: VecDeque<Increment>,
    /// Result for `previous`, replayed when the same reading is fed again.
    #[serde(default)]
    last: Option<PrecipDerived>,
}

impl PrecipAccumulator {
    pub fn new(window: Duration, max_rate_mm_h: f32) -> Self {
        Self {
            window_minutes: window.num_minutes(),
            max_rate_mm_h,
            previous: None,
            increments: VecDeque::new(),
            last: None,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::minutes(self.window_minutes)
    }

    pub fn max_rate(&self) -> f32 {
        self.max_rate_mm_h
    }

    /// Drop all history. Used after a gap, where differencing across the
    /// missing span would attribute unknown precipitation to one interval.
    pub fn reset(&mut self) {
        self.previous = None;
        self.increments.clear();
        self.last = None;
    }

    pub fn has_history(&self) -> bool {
        self.previous.is_some()
    }

    /// Feed the accumulation reading matched to the current timestep.
    ///
    /// Returns `None` when the field has no reading at this timestep (the
    /// state is left untouched, so a coarser accumulation cadence keeps its
    /// history), for the first reading after construction or reset, and for
    /// a reading older than the last one seen. The same reading fed twice
    /// yields the same result.
    pub fn advance(&mut self, accumulation: Option<&FieldSlice<'_>>) -> Option<PrecipDerived> {
        let slice = accumulation?;
        let time = slice.time;
        let current: Vec<Option<f32>> = (0..slice.values.len()).map(|i| slice.get(i)).collect();

        match self.previous.as_ref().map(|p| (p.time, p.values.len())) {
            Some((t, _)) if time == t => return self.last.clone(),
            Some((t, _)) if time < t => {
                log::debug!("accumulation reading at {time} is older than {t}; ignored");
                return None;
            }
            Some((_, n)) if n != current.len() => self.reset(),
            _ => {}
        }

        let previous = self.previous.replace(Frame { time, values: current.clone() })?;
        let interval_hours = (time - previous.time).num_seconds() as f32 / 3600.0;
        let increment: Vec<Option<f32>> = previous
            .values
            .iter()
            .zip(&current)
            .map(|(&p, &c)| match (p, c) {
                (Some(p), Some(c)) => Some(interval_increment(p, c, interval_hours, self.max_rate_mm_h)),
                _ => None,
            })
            .collect();
        let rate = increment.iter().map(|v| v.map(|mm| mm / interval_hours)).collect();

        self.increments.push_back(Increment { start: previous.time, end: time, values: increment });
        let window_start = time - self.window();
        while self.increments.front().is_some_and(|inc| inc.end <= window_start) {
            self.increments.pop_front();
        }

        let cells = current.len();
        let window_total = (0..cells)
            .map(|i| self.increments.iter().try_fold(0.0f32, |acc, inc| inc.values[i].map(|v| acc + v)))
            .collect();

        let window_hours = self.window_minutes as f32 / 60.0;
        let oldest_start = self.increments.front().map_or(time, |inc| inc.start);
        let covered = ((time - oldest_start).num_seconds() as f32 / 3600.0).min(window_hours);

        let derived =
            PrecipDerived { time, interval_hours, rate, window_total, window_covered_hours: covered, window_hours };
        self.last = Some(derived.clone());
        Some(derived)
    }
}

/// Precipitation that fell between two accumulation readings
/// `interval_hours` apart.
#[inline]
pub fn interval_increment(previous: f32, current: f32, interval_hours: f32, max_rate_mm_h: f32) -> f32 {
    let diff = current - previous;
    if diff < -RESET_TOLERANCE_MM || diff > max_rate_mm_h * interval_hours {
        current.max(0.0)
    } else {
        diff.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::test_support::*;

    fn slice(time: DateTime<Utc>, values: &[f32]) -> FieldSlice<'_> {
        FieldSlice { values, missing: -9999.0, time }
    }

    fn accumulator(window_hours: i64) -> PrecipAccumulator {
        PrecipAccumulator::new(Duration::hours(window_hours), DEFAULT_MAX_RATE_MM_H)
    }

    #[test]
    fn ten_minute_six_mm_is_36_mm_per_hour() {
        let mut acc = accumulator(24);
        assert!(acc.advance(Some(&slice(t0(), &[0.0]))).is_none());
        let d = acc.advance(Some(&slice(t0() + Duration::minutes(10), &[6.0]))).unwrap();
        assert!((d.rate[0].unwrap() - 36.0).abs() < 1e-3);
    }

    #[test]
    fn reset_uses_latest_accumulation() {
        assert_eq!(interval_increment(40.0, 3.0, 1.0, DEFAULT_MAX_RATE_MM_H), 3.0);
        let noise = interval_increment(5.0, 4.995, 1.0, DEFAULT_MAX_RATE_MM_H);
        assert_eq!(noise, 0.0, "tiny negative noise is not a reset");
        assert_eq!(interval_increment(5.0, 7.5, 1.0, DEFAULT_MAX_RATE_MM_H), 2.5);

        let mut acc = accumulator(24);
        acc.advance(Some(&slice(hours(0), &[40.0])));
        let d = acc.advance(Some(&slice(hours(2), &[3.0]))).unwrap();
        assert!((d.rate[0].unwrap() - 1.5).abs() < 1e-5, "rate must be 3 mm / 2 h, never negative");
    }

    #[test]
    fn implausible_rate_is_a_reset() {
        // +600 mm in one hour cannot be rain: the accumulation restarted.
        assert_eq!(interval_increment(10.0, 610.0, 1.0, 500.0), 610.0);
        assert_eq!(interval_increment(10.0, 410.0, 1.0, 500.0), 400.0);
        // The ceiling scales with the interval.
        assert_eq!(interval_increment(10.0, 610.0, 2.0, 500.0), 600.0);

        let mut acc = PrecipAccumulator::new(Duration::hours(24), 100.0);
        acc.advance(Some(&slice(hours(0), &[900.0, 0.0])));
        let d = acc.advance(Some(&slice(hours(1), &[1020.0, 45.0]))).unwrap();
        assert_eq!(d.rate[0], Some(1020.0), "rate is the latest accumulation over the interval");
        assert_eq!(d.rate[1], Some(45.0));
    }

    #[test]
    fn window_total_drops_old_increments() {
        let mut acc = accumulator(3);
        let mut total = None;
        for (h, a) in [0.0f32, 10.0, 20.0, 30.0, 40.0, 40.0].iter().enumerate() {
            total = acc.advance(Some(&slice(hours(h as i64), &[*a]))).map(|d| d.window_total[0]);
        }
        // Increments ending at h=3,4,5 are 10,10,0.
        assert_eq!(total, Some(Some(20.0)));
    }

    #[test]
    fn window_coverage_grows_until_the_window_is_full() {
        let mut acc = accumulator(3);
        assert!(acc.advance(Some(&slice(hours(0), &[0.0]))).is_none());
        let covered: Vec<(f32, bool)> = (1..=4)
            .map(|h| {
                let d = acc.advance(Some(&slice(hours(h), &[h as f32]))).unwrap();
                (d.window_covered_hours, d.window_complete())
            })
            .collect();
        assert_eq!(covered, vec![(1.0, false), (2.0, false), (3.0, true), (3.0, true)]);

        acc.reset();
        acc.advance(Some(&slice(hours(10), &[0.0])));
        assert!(!acc.advance(Some(&slice(hours(11), &[1.0]))).unwrap().window_complete());
    }

    #[test]
    fn missing_cell_makes_rate_indeterminate() {
        let mut acc = accumulator(24);
        acc.advance(Some(&slice(hours(0), &[0.0, -9999.0])));
        let d = acc.advance(Some(&slice(hours(1), &[1.0, 2.0]))).unwrap();
        assert_eq!(d.rate[0], Some(1.0));
        assert_eq!(d.rate[1], None);
        assert_eq!(d.window_total[1], None);
    }

    #[test]
    fn absent_reading_keeps_history() {
        let mut acc = accumulator(24);
        acc.advance(Some(&slice(hours(0), &[0.0])));
        assert!(acc.advance(None).is_none());
        assert!(acc.has_history());
        let d = acc.advance(Some(&slice(hours(1), &[40.0]))).unwrap();
        assert_eq!(d.rate[0], Some(40.0));
        assert_eq!(d.interval_hours, 1.0);
    }

    #[test]
    fn repeated_or_stale_reading_is_not_differenced() {
        let mut acc = accumulator(24);
        acc.advance(Some(&slice(hours(0), &[0.0])));
        let first = acc.advance(Some(&slice(hours(1), &[40.0])));
        assert!(first.is_some());
        assert_eq!(acc.advance(Some(&slice(hours(1), &[40.0]))), first);
        assert!(acc.advance(Some(&slice(hours(0), &[0.0]))).is_none());
        let d = acc.advance(Some(&slice(hours(2), &[50.0]))).unwrap();
        assert_eq!(d.rate[0], Some(10.0));
        assert_eq!(d.window_total[0], Some(50.0));
    }

    #[test]
    fn carried_state_matches_uninterrupted_run() {
        let frames = [0.0f32, 5.0, 20.0, 22.0, 60.0];
        let mut straight = accumulator(24);
        let mut last_straight = None;
        for (h, a) in frames.iter().enumerate() {
            last_straight = straight.advance(Some(&slice(hours(h as i64), &[*a])));
        }

        let mut first = accumulator(24);
        for (h, a) in frames[..2].iter().enumerate() {
            first.advance(Some(&slice(hours(h as i64), &[*a])));
        }
        let json = serde_json::to_string(&first).unwrap();
        let mut resumed: PrecipAccumulator = serde_json::from_str(&json).unwrap();
        let mut last_resumed = None;
        for (h, a) in frames.iter().enumerate().skip(2) {
            last_resumed = resumed.advance(Some(&slice(hours(h as i64), &[*a])));
        }
        assert_eq!(last_straight, last_resumed);
    }
}
