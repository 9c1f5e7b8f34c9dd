//! Velocity derivation and forward projection.

use serde::Serialize;

/// IQR fence factor for outlier exclusion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierFilter {
    /// Values outside `[Q1 - k*IQR, Q3 + k*IQR]` are excluded
    pub k: f64,
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self { k: 1.5 }
    }
}

/// Pace figures derived from a burn series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VelocitySummary {
    /// Arithmetic mean, zero days included
    pub avg: f64,

    /// Best observed single-day burn
    pub max: f64,

    /// Worst observed single-day burn (0 for an empty series)
    pub min: f64,
}

/// Derive pace figures from the ordered burn series of elapsed business
/// days.
///
/// With a filter, the IQR fence is applied before summarizing; max and min
/// still report values actually observed in the filtered series, never
/// interpolated ones.
pub fn summarize(burns: &[f64], filter: Option<OutlierFilter>) -> VelocitySummary {
    let kept = match filter {
        Some(f) => fence(burns, f.k),
        None => burns.to_vec(),
    };
    let Some((&first, rest)) = kept.split_first() else {
        return VelocitySummary::default();
    };

    let avg = kept.iter().sum::<f64>() / kept.len() as f64;
    let max = rest.iter().fold(first, |acc, &b| acc.max(b));
    let min = rest.iter().fold(first, |acc, &b| acc.min(b));
    VelocitySummary { avg, max, min }
}

/// Drop values outside the Tukey fence. Series too short for meaningful
/// quartiles pass through untouched.
fn fence(burns: &[f64], k: f64) -> Vec<f64> {
    if burns.len() < 4 {
        return burns.to_vec();
    }
    let mut sorted = burns.to_vec();
    sorted.sort_by(f64::total_cmp);
    let (q1, q3) = quartiles(&sorted);
    let iqr = q3 - q1;
    let (lo, hi) = (q1 - k * iqr, q3 + k * iqr);
    burns.iter().copied().filter(|b| (lo..=hi).contains(b)).collect()
}

/// Tukey hinges: medians of the lower and upper half.
fn quartiles(sorted: &[f64]) -> (f64, f64) {
    let half = sorted.len() / 2;
    (median(&sorted[..half]), median(&sorted[sorted.len() - half..]))
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// One pacing scenario projected forward from today's remaining hours.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    /// Hours burned per business day under this scenario
    pub pace: f64,

    /// Projected remaining hours for n = 1..=horizon business days out
    pub points: Vec<f64>,

    /// Smallest n at which the projection reaches zero; `None` when the
    /// pace never gets there within the horizon
    pub completion_index: Option<u32>,
}

/// The three standard scenarios fanned out from one summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    /// Remaining hours the projections start from
    pub remaining_today: f64,

    /// Average-pace scenario
    pub avg: Projection,

    /// Best-pace scenario
    pub max: Projection,

    /// Worst-pace scenario
    pub min: Projection,
}

/// Project all three scenarios over `horizon` business days.
pub fn forecast(remaining_today: f64, summary: VelocitySummary, horizon: u32) -> Forecast {
    Forecast {
        remaining_today,
        avg: project(remaining_today, summary.avg, horizon),
        max: project(remaining_today, summary.max, horizon),
        min: project(remaining_today, summary.min, horizon),
    }
}

/// `remaining - n * pace`, floored at zero.
///
/// A zero pace yields a flat line at today's remaining hours: an explicit
/// risk signal, never a division or a fabricated completion date.
pub fn project(remaining: f64, pace: f64, horizon: u32) -> Projection {
    let mut points = Vec::with_capacity(horizon as usize);
    let mut completion_index = None;
    for n in 1..=horizon {
        let value = if pace > 0.0 {
            (remaining - pace * f64::from(n)).max(0.0)
        } else {
            remaining
        };
        if completion_index.is_none() && pace > 0.0 && value <= 0.0 {
            completion_index = Some(n);
        }
        points.push(value);
    }
    Projection { pace, points, completion_index }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_of_an_empty_series_is_all_zero() {
        assert_eq!(summarize(&[], None), VelocitySummary::default());
    }

    #[test]
    fn mean_includes_zero_days() {
        let summary = summarize(&[8.0, 0.0, 4.0, 0.0], None);
        assert_eq!(summary.avg, 3.0);
        assert_eq!(summary.max, 8.0);
        assert_eq!(summary.min, 0.0);
    }

    #[test]
    fn stalled_sprint_summarizes_to_zero() {
        let summary = summarize(&[0.0, 0.0, 0.0, 0.0], None);
        assert_eq!(summary, VelocitySummary { avg: 0.0, max: 0.0, min: 0.0 });
    }

    #[test]
    fn outlier_fence_drops_the_spike() {
        let burns = [4.0, 5.0, 4.0, 6.0, 5.0, 4.0, 5.0, 100.0];
        let summary = summarize(&burns, Some(OutlierFilter::default()));
        // the 100h day is excluded; max comes from the surviving values
        assert_eq!(summary.max, 6.0);
        assert!(summary.avg < 10.0);
        assert_eq!(summary.min, 4.0);
    }

    #[test]
    fn filtered_extremes_are_observed_values() {
        let burns = [4.0, 5.0, 4.0, 6.0, 5.0, 4.0, 5.0, 100.0];
        let summary = summarize(&burns, Some(OutlierFilter::default()));
        assert!(burns.contains(&summary.max));
        assert!(burns.contains(&summary.min));
    }

    #[test]
    fn short_series_bypass_the_fence() {
        let summary = summarize(&[1.0, 50.0], Some(OutlierFilter::default()));
        assert_eq!(summary.max, 50.0);
    }

    #[test]
    fn uniform_series_survives_the_fence() {
        let burns = [5.0; 6];
        let summary = summarize(&burns, Some(OutlierFilter::default()));
        assert_eq!(summary, VelocitySummary { avg: 5.0, max: 5.0, min: 5.0 });
    }

    #[test]
    fn projection_steps_down_and_floors_at_zero() {
        let projection = project(20.0, 8.0, 5);
        assert_eq!(projection.points, vec![12.0, 4.0, 0.0, 0.0, 0.0]);
        assert_eq!(projection.completion_index, Some(3));
    }

    #[test]
    fn zero_pace_projects_a_flat_line_with_no_completion() {
        let projection = project(20.0, 0.0, 4);
        assert_eq!(projection.points, vec![20.0, 20.0, 20.0, 20.0]);
        assert_eq!(projection.completion_index, None);
    }

    #[test]
    fn completion_outside_the_horizon_is_none() {
        let projection = project(100.0, 1.0, 5);
        assert_eq!(projection.completion_index, None);
        assert_eq!(projection.points.last(), Some(&95.0));
    }

    #[test]
    fn forecast_fans_out_all_three_scenarios() {
        let summary = summarize(&[0.0, 0.0, 0.0], None);
        let forecast = forecast(32.0, summary, 3);
        for scenario in [&forecast.avg, &forecast.max, &forecast.min] {
            assert_eq!(scenario.points, vec![32.0, 32.0, 32.0]);
            assert_eq!(scenario.completion_index, None);
        }
    }
}
