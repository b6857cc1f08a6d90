use serde::{Deserialize, Serialize};

use super::HistorySnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Worsening,
    Improving,
    Stable,
    /// Fewer than two time buckets.
    Insufficient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// Start of the bucket, unix seconds.
    pub bucket_start: i64,
    pub rate: f64,
    /// Observations in the bucket; 0 for points taken from history.
    pub sample: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    /// Oldest first.
    pub points: Vec<TrendPoint>,
    pub direction: TrendDirection,
}

/// One timestamped observation: `hits` out of `sample`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Observation {
    pub timestamp: i64,
    pub hits: u32,
    pub sample: u32,
}

/// Bucket observations into fixed windows, merge in history snapshots taken
/// before the latest window, and compare the latest rate with the mean of
/// the rest.
pub(crate) fn compute_trend(
    key: &str,
    observations: &[Observation],
    history: &[HistorySnapshot],
    bucket_secs: i64,
    tolerance: f64,
) -> Trend {
    let bucket_secs = bucket_secs.max(1);
    let mut windows: Vec<(i64, u32, u32)> = Vec::new();
    let mut sorted = observations.to_vec();
    sorted.sort_by_key(|o| o.timestamp);
    for obs in sorted.iter().filter(|o| o.sample > 0) {
        let start = obs.timestamp.div_euclid(bucket_secs) * bucket_secs;
        match windows.last_mut() {
            Some((s, hits, sample)) if *s == start => {
                *hits += obs.hits;
                *sample += obs.sample;
            }
            _ => windows.push((start, obs.hits, obs.sample)),
        }
    }

    // Snapshots only count when taken before the latest window, and the
    // windows they already summarise are not counted again.
    let latest_window = windows.last().map(|w| w.0).unwrap_or(i64::MIN);
    let mut points: Vec<TrendPoint> = history
        .iter()
        .filter(|h| h.timestamp < latest_window)
        .filter_map(|h| {
            h.rates.get(key).map(|&rate| TrendPoint {
                bucket_start: h.timestamp,
                rate,
                sample: 0,
            })
        })
        .collect();
    points.sort_by_key(|p| p.bucket_start);
    let covered_until = points.last().map(|p| p.bucket_start).unwrap_or(i64::MIN);
    points.extend(
        windows
            .into_iter()
            .filter(|&(start, _, _)| start > covered_until)
            .map(|(start, hits, sample)| TrendPoint {
                bucket_start: start,
                rate: f64::from(hits) / f64::from(sample),
                sample,
            }),
    );

    let direction = match points.split_last() {
        Some((latest, prior)) if !prior.is_empty() => {
            let mean = prior.iter().map(|p| p.rate).sum::<f64>() / prior.len() as f64;
            let diff = latest.rate - mean;
            if diff > tolerance {
                TrendDirection::Worsening
            } else if diff < -tolerance {
                TrendDirection::Improving
            } else {
                TrendDirection::Stable
            }
        }
        _ => TrendDirection::Insufficient,
    };

    Trend { points, direction }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const DAY: i64 = 86_400;

    fn obs(day: i64, hits: u32, sample: u32) -> Observation {
        Observation {
            timestamp: day * DAY,
            hits,
            sample,
        }
    }

    #[test]
    fn single_bucket_is_insufficient() {
        let trend = compute_trend("k", &[obs(1, 1, 1), obs(2, 0, 1)], &[], 30 * DAY, 0.05);
        assert_eq!(trend.points.len(), 1);
        assert_eq!(trend.points[0].rate, 0.5);
        assert_eq!(trend.direction, TrendDirection::Insufficient);
    }

    #[test]
    fn rising_rate_is_worsening() {
        let trend = compute_trend(
            "k",
            &[obs(45, 1, 1), obs(1, 0, 1), obs(2, 0, 1)],
            &[],
            30 * DAY,
            0.05,
        );
        assert_eq!(trend.points.len(), 2);
        assert_eq!(trend.direction, TrendDirection::Worsening);
    }

    #[test]
    fn history_counts_as_earlier_points() {
        let snapshot = HistorySnapshot {
            timestamp: 0,
            rates: BTreeMap::from([("k".to_string(), 0.9)]),
        };
        let trend = compute_trend("k", &[obs(100, 1, 2)], &[snapshot], 30 * DAY, 0.05);
        assert_eq!(trend.points.len(), 2);
        assert_eq!(trend.points[0].sample, 0);
        assert_eq!(trend.direction, TrendDirection::Improving);
    }

    #[test]
    fn snapshot_stands_in_for_the_windows_it_covers() {
        let snapshot = HistorySnapshot {
            timestamp: 2 * DAY,
            rates: BTreeMap::from([("k".to_string(), 0.9)]),
        };
        let trend = compute_trend("k", &[obs(1, 1, 1), obs(45, 0, 1)], &[snapshot], 30 * DAY, 0.05);

        assert_eq!(trend.points.len(), 2);
        assert_eq!(trend.points[0].bucket_start, 2 * DAY);
        assert_eq!(trend.points[0].rate, 0.9);
        assert_eq!(trend.points[1].rate, 0.0);
        assert_eq!(trend.direction, TrendDirection::Improving);
    }

    #[test]
    fn snapshot_inside_the_latest_window_is_ignored() {
        let snapshot = HistorySnapshot {
            timestamp: 50 * DAY,
            rates: BTreeMap::from([("k".to_string(), 0.0)]),
        };
        let trend = compute_trend("k", &[obs(45, 1, 1)], &[snapshot], 30 * DAY, 0.05);
        assert_eq!(trend.points.len(), 1);
        assert_eq!(trend.direction, TrendDirection::Insufficient);
    }

    #[test]
    fn small_changes_are_stable() {
        let trend = compute_trend("k", &[obs(1, 5, 10), obs(40, 52, 100)], &[], 30 * DAY, 0.05);
        assert_eq!(trend.direction, TrendDirection::Stable);
    }
}
