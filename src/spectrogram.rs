//! Time x frequency intensity grid derived from the sample buffer.

use serde::{Deserialize, Serialize};

use crate::source::Sample;

/// Below this many samples the grid is empty.
pub const MIN_SAMPLES: usize = 50;
/// Only the most recent timestamps are kept.
pub const MAX_TIME_POINTS: usize = 50;
/// Coordinate match tolerance for both axes.
pub const MATCH_TOLERANCE: f64 = 0.01;

/// Dense grid, `intensities[time][frequency]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectrogramGrid {
    pub frequencies: Vec<f64>,
    pub time_points: Vec<f64>,
    pub intensities: Vec<Vec<f64>>,
}

impl SpectrogramGrid {
    pub fn is_empty(&self) -> bool {
        self.time_points.is_empty() || self.frequencies.is_empty()
    }

    /// `(time points, frequencies)`
    pub fn dimensions(&self) -> (usize, usize) {
        (self.time_points.len(), self.frequencies.len())
    }
}

fn distinct_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut v: Vec<f64> = values.collect();
    v.sort_by(f64::total_cmp);
    v.dedup();
    v
}

/// Index range of `axis` (ascending) within `tol` of `x`, exclusive bounds.
fn within(axis: &[f64], x: f64, tol: f64) -> std::ops::Range<usize> {
    let lo = axis.partition_point(|&a| a <= x - tol);
    let hi = axis.partition_point(|&a| a < x + tol);
    lo..hi.max(lo)
}

/// Build the grid from scratch.
///
/// Each cell holds the maximum amplitude of the samples within
/// [`MATCH_TOLERANCE`] of its (time, frequency) coordinates, or 0 where none
/// match.
pub fn build<'a>(samples: impl IntoIterator<Item = &'a Sample>) -> SpectrogramGrid {
    let samples: Vec<&Sample> = samples.into_iter().filter(|s| s.is_finite()).collect();
    if samples.len() < MIN_SAMPLES {
        return SpectrogramGrid::default();
    }

    let frequencies = distinct_sorted(samples.iter().map(|s| s.frequency));
    let mut time_points = distinct_sorted(samples.iter().map(|s| s.time));
    if time_points.len() > MAX_TIME_POINTS {
        time_points.drain(..time_points.len() - MAX_TIME_POINTS);
    }

    let mut cells: Vec<Vec<Option<f64>>> = vec![vec![None; frequencies.len()]; time_points.len()];
    for s in &samples {
        let cols = within(&frequencies, s.frequency, MATCH_TOLERANCE);
        for row in &mut cells[within(&time_points, s.time, MATCH_TOLERANCE)] {
            for cell in &mut row[cols.clone()] {
                *cell = Some(cell.map_or(s.amplitude, |m| m.max(s.amplitude)));
            }
        }
    }

    let intensities = cells
        .into_iter()
        .map(|row| row.into_iter().map(|c| c.unwrap_or(0.0)).collect())
        .collect();

    SpectrogramGrid {
        frequencies,
        time_points,
        intensities,
    }
}
