use crate::error::{PipelineError, Result};
use chrono::{Datelike, NaiveDateTime};
use log::{Level, Log, Metadata, Record as LogRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Simple logger implementation
///
/// Everything at `Warn` and above goes to stderr so that verdict text on
/// stdout stays clean when piped.
pub struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &LogRecord) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match record.level() {
            Level::Error | Level::Warn => eprintln!("[{}] {}", record.level(), record.args()),
            _ => println!("[{}] {}", record.level(), record.args()),
        }
    }

    fn flush(&self) {}
}

/// A reading exactly as handed over by an ingestion layer. Any field may be
/// absent; [`RawRecord::validate`] decides whether it is usable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub city: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    pub temperature: Option<f64>,
}

impl RawRecord {
    pub fn new(city: &str, timestamp: NaiveDateTime, temperature: f64) -> Self {
        Self {
            city: Some(city.to_string()),
            timestamp: Some(timestamp),
            temperature: Some(temperature),
        }
    }

    /// Checks that every field is present and the temperature is finite.
    ///
    /// `position` is only used to point at the offending record in the error.
    ///
    /// # Errors
    /// Returns `PipelineError::InvalidInput` for a missing or blank city, a
    /// missing timestamp, a missing temperature, or a NaN/infinite temperature.
    pub fn validate(&self, position: usize) -> Result<Reading> {
        let city = self.city.clone().unwrap_or_default();
        let timestamp = self.timestamp.ok_or_else(|| {
            PipelineError::invalid(format!("record {} ({}): missing timestamp", position, city))
        })?;
        let temperature = self.temperature.ok_or_else(|| {
            PipelineError::invalid(format!(
                "record {} ({}): missing temperature",
                position, city
            ))
        })?;

        let reading = Reading {
            city: city.trim().to_string(),
            timestamp,
            temperature,
        };
        reading.check(position)?;
        Ok(reading)
    }
}

/// A reading with city, instant and temperature. Values built by hand or
/// deserialized go through [`Reading::check`] before any statistics use them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub city: String,
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
}

impl Reading {
    /// # Errors
    /// Returns `PipelineError::InvalidInput` for a blank city or a
    /// NaN/infinite temperature.
    pub fn check(&self, position: usize) -> Result<()> {
        if self.city.trim().is_empty() {
            return Err(PipelineError::invalid(format!(
                "record {}: missing city",
                position
            )));
        }
        check_temperature(self.temperature, position, &self.city)
    }
}

/// Rejects NaN and infinite temperatures.
pub(crate) fn check_temperature(temperature: f64, position: usize, city: &str) -> Result<()> {
    if temperature.is_finite() {
        Ok(())
    } else {
        Err(PipelineError::invalid(format!(
            "record {} ({}): temperature {} is not a finite number",
            position, city, temperature
        )))
    }
}

/// Meteorological season, bucketed by calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    pub const ALL: [Season; 4] = [
        Season::Winter,
        Season::Spring,
        Season::Summer,
        Season::Autumn,
    ];

    /// Maps a calendar month (1-12) to its season.
    ///
    /// # Errors
    /// Returns `PipelineError::InvalidInput` if `month` is outside 1-12.
    pub fn from_month(month: u32) -> Result<Season> {
        Self::lookup(month).ok_or_else(|| {
            PipelineError::invalid(format!("month {} is outside 1-12", month))
        })
    }

    /// Season of any chrono date or date-time.
    pub fn of<D: Datelike>(date: &D) -> Season {
        // chrono months are always 1..=12, so the lookup cannot miss
        Self::lookup(date.month()).unwrap_or(Season::Winter)
    }

    fn lookup(month: u32) -> Option<Season> {
        Season::ALL
            .into_iter()
            .find(|season| season.months().contains(&month))
    }

    pub fn months(self) -> [u32; 3] {
        match self {
            Season::Winter => [12, 1, 2],
            Season::Spring => [3, 4, 5],
            Season::Summer => [6, 7, 8],
            Season::Autumn => [9, 10, 11],
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Autumn => "Autumn",
        };
        f.write_str(name)
    }
}

/// A reading annotated with its rolling baseline and anomaly flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRecord {
    pub city: String,
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub season: Season,
    pub rolling_mean: Option<f64>,
    pub rolling_std: Option<f64>,
    pub is_anomaly: bool,
}

/// Anything that can feed the seasonal baseline: a city, a season and a
/// temperature.
pub trait Observation {
    fn city(&self) -> &str;
    fn season(&self) -> Season;
    fn temperature(&self) -> f64;
}

impl Observation for Reading {
    fn city(&self) -> &str {
        &self.city
    }

    fn season(&self) -> Season {
        Season::of(&self.timestamp)
    }

    fn temperature(&self) -> f64 {
        self.temperature
    }
}

impl Observation for TemperatureRecord {
    fn city(&self) -> &str {
        &self.city
    }

    fn season(&self) -> Season {
        self.season
    }

    fn temperature(&self) -> f64 {
        self.temperature
    }
}

/// Historical statistics for one city and season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalAggregate {
    pub city: String,
    pub season: Season,
    /// `None` when there are no samples.
    pub mean_temperature: Option<f64>,
    /// `None` when there are fewer than two samples.
    pub std_temperature: Option<f64>,
    pub sample_count: usize,
}

/// Outcome of comparing a candidate temperature with a seasonal baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Normal,
    Anomalous,
    /// Too few historical samples to compute a standard deviation.
    Undetermined,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Classification::Normal => "normal",
            Classification::Anomalous => "anomalous",
            Classification::Undetermined => "undetermined",
        };
        f.write_str(name)
    }
}

/// Full result of a seasonal comparison, including the baseline used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub candidate: f64,
    pub sigma: f64,
    pub aggregate: SeasonalAggregate,
    pub classification: Classification,
}

impl fmt::Display for BaselineComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let agg = &self.aggregate;
        match (self.classification, agg.mean_temperature, agg.std_temperature) {
            (Classification::Undetermined, _, _) | (_, None, _) | (_, _, None) => write!(
                f,
                "{:.1}°C in {} ({}): not enough history to judge ({} samples)",
                self.candidate, agg.city, agg.season, agg.sample_count
            ),
            (classification, Some(mean), Some(std)) => write!(
                f,
                "{:.1}°C in {} ({}) is {} | seasonal mean {:.1}°C, std {:.1}°C, {} samples, threshold {}σ",
                self.candidate,
                agg.city,
                agg.season,
                classification,
                mean,
                std,
                agg.sample_count,
                self.sigma
            ),
        }
    }
}

/// A current temperature already resolved by a live weather source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveObservation {
    pub city: String,
    pub temperature: f64,
    pub description: Option<String>,
}

/// Configuration for the rolling anomaly detector
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub window: usize,
    pub min_periods: usize,
    /// Number of standard deviations beyond which a reading is anomalous.
    pub sigma: f64,
}

impl DetectorConfig {
    /// # Errors
    /// Returns `PipelineError::InvalidInput` if the window or min periods is
    /// zero, min periods exceeds the window, or sigma is negative/non-finite.
    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(PipelineError::invalid("window must be at least 1"));
        }
        if self.min_periods == 0 {
            return Err(PipelineError::invalid("min_periods must be at least 1"));
        }
        if self.min_periods > self.window {
            return Err(PipelineError::invalid(format!(
                "min_periods {} exceeds window {}",
                self.min_periods, self.window
            )));
        }
        validate_sigma(self.sigma)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window: 30,
            min_periods: 1,
            sigma: 2.0,
        }
    }
}

/// Configuration for the seasonal baseline comparator
#[derive(Debug, Clone, PartialEq)]
pub struct ComparatorConfig {
    pub sigma: f64,
}

impl ComparatorConfig {
    pub fn validate(&self) -> Result<()> {
        validate_sigma(self.sigma)
    }
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self { sigma: 2.0 }
    }
}

fn validate_sigma(sigma: f64) -> Result<()> {
    if sigma.is_finite() && sigma >= 0.0 {
        Ok(())
    } else {
        Err(PipelineError::invalid(format!(
            "sigma must be a finite non-negative number, got {}",
            sigma
        )))
    }
}
