use crate::error::Result;
use crate::structs::{DetectorConfig, RawRecord, Reading, Season, TemperatureRecord};
use log::debug;
use rayon::prelude::*;
use std::collections::HashMap;

/// Rolling mean and sample standard deviation for one window position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowStats {
    pub mean: Option<f64>,
    pub std: Option<f64>,
}

/// Annotates every record with a per-city rolling baseline and anomaly flag.
///
/// Records are partitioned by city. Inside a city the caller's order is kept
/// as-is: the window is positional, so callers that want chronological
/// windows must sort first (see [`sort_chronologically`]).
///
/// # Arguments
///
/// * `records` - Raw readings in caller order
/// * `config` - Window size, minimum periods and sigma multiplier
///
/// # Returns
///
/// One `TemperatureRecord` per input record, in input order.
///
/// # Errors
///
/// Returns `PipelineError::InvalidInput` if:
/// - The configuration is out of bounds
/// - Any record lacks a city, timestamp or temperature
/// - Any temperature is NaN or infinite
pub fn annotate(records: &[RawRecord], config: &DetectorConfig) -> Result<Vec<TemperatureRecord>> {
    config.validate()?;
    let readings = records
        .iter()
        .enumerate()
        .map(|(position, record)| record.validate(position))
        .collect::<Result<Vec<_>>>()?;
    annotate_readings(readings, config)
}

/// Same as [`annotate`] for readings built directly rather than through
/// [`RawRecord::validate`].
///
/// # Errors
///
/// Returns `PipelineError::InvalidInput` if the configuration is out of
/// bounds, or any reading has a blank city or a non-finite temperature.
pub fn annotate_readings(
    readings: Vec<Reading>,
    config: &DetectorConfig,
) -> Result<Vec<TemperatureRecord>> {
    config.validate()?;
    for (position, reading) in readings.iter().enumerate() {
        reading.check(position)?;
    }

    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, reading) in readings.iter().enumerate() {
        groups.entry(reading.city.as_str()).or_default().push(index);
    }
    debug!(
        "Annotating {} readings across {} cities (window={}, min_periods={}, sigma={})",
        readings.len(),
        groups.len(),
        config.window,
        config.min_periods,
        config.sigma
    );

    // Partitions share nothing, so they are rolled in parallel and scattered
    // back by original index.
    let per_city: Vec<(usize, WindowStats)> = groups
        .into_par_iter()
        .flat_map_iter(|(_, indices)| {
            let temps: Vec<f64> = indices.iter().map(|&i| readings[i].temperature).collect();
            let stats = rolling_stats(&temps, config.window, config.min_periods);
            indices.into_iter().zip(stats)
        })
        .collect();

    let mut stats = vec![WindowStats::default(); readings.len()];
    for (index, window) in per_city {
        stats[index] = window;
    }

    let annotated: Vec<TemperatureRecord> = readings
        .into_iter()
        .zip(stats)
        .map(|(reading, window)| {
            let is_anomaly = match (window.mean, window.std) {
                (Some(mean), Some(std)) => deviates(reading.temperature, mean, std, config.sigma),
                _ => false,
            };
            TemperatureRecord {
                season: Season::of(&reading.timestamp),
                city: reading.city,
                timestamp: reading.timestamp,
                temperature: reading.temperature,
                rolling_mean: window.mean,
                rolling_std: window.std,
                is_anomaly,
            }
        })
        .collect();

    debug!(
        "Flagged {} anomalies",
        annotated.iter().filter(|r| r.is_anomaly).count()
    );
    Ok(annotated)
}

/// Computes trailing-window statistics for one ordered series.
///
/// The window at position `i` covers the last `min(window, i + 1)` values
/// ending at `i`. Positions whose window holds fewer than `min_periods`
/// values get no statistics at all.
pub fn rolling_stats(values: &[f64], window: usize, min_periods: usize) -> Vec<WindowStats> {
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            if slice.len() < min_periods {
                return WindowStats::default();
            }
            let (mean, std) = sample_stats(slice);
            WindowStats { mean, std }
        })
        .collect()
}

/// Arithmetic mean and sample standard deviation (N-1 denominator).
///
/// The mean is `None` for an empty slice, the deviation is `None` for fewer
/// than two values. Both are accumulated incrementally so values near
/// `f64::MAX` do not overflow a running sum; a result that still is not
/// finite is reported as `None`.
pub fn sample_stats(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None);
    }
    let mut mean = 0.0;
    let mut m2 = 0.0;
    for (k, &x) in values.iter().enumerate() {
        let delta = x - mean;
        mean += delta / (k + 1) as f64;
        m2 += delta * (x - mean);
    }
    let mean = Some(mean).filter(|m| m.is_finite());
    if values.len() < 2 || mean.is_none() {
        return (mean, None);
    }
    let std = (m2 / (values.len() - 1) as f64).sqrt();
    (mean, Some(std).filter(|s| s.is_finite()))
}

/// True when `value` sits strictly more than `sigma` deviations from `mean`.
pub fn deviates(value: f64, mean: f64, std: f64, sigma: f64) -> bool {
    (value - mean).abs() > sigma * std
}

/// Stable sort by timestamp, which leaves every city's subsequence in
/// chronological order. Records without a timestamp sort first.
pub fn sort_chronologically(records: &mut [RawRecord]) {
    records.sort_by_key(|r| r.timestamp);
}

/// Distinct cities in order of first appearance.
pub fn cities(records: &[TemperatureRecord]) -> Vec<&str> {
    let mut seen: Vec<&str> = Vec::new();
    for record in records {
        if !seen.contains(&record.city.as_str()) {
            seen.push(&record.city);
        }
    }
    seen
}

pub fn records_for_city<'a>(
    records: &'a [TemperatureRecord],
    city: &'a str,
) -> impl Iterator<Item = &'a TemperatureRecord> + 'a {
    records.iter().filter(move |r| r.city == city)
}

pub fn anomalies(records: &[TemperatureRecord]) -> impl Iterator<Item = &TemperatureRecord> {
    records.iter().filter(|r| r.is_anomaly)
}
