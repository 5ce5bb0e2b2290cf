//! Seasonal baseline lookup and classification of a single candidate
//! temperature against it.

use crate::error::{PipelineError, Result};
use crate::structs::{
    BaselineComparison, Classification, ComparatorConfig, LiveObservation, Observation, Season,
    SeasonalAggregate, check_temperature,
};
use crate::transform::{deviates, sample_stats};
use log::debug;

/// Mean and sample deviation of every historical temperature recorded for
/// `city` in `season`.
///
/// # Errors
/// Returns `PipelineError::InvalidInput` if a matching record carries a NaN
/// or infinite temperature.
pub fn seasonal_aggregate<O: Observation>(
    history: &[O],
    city: &str,
    season: Season,
) -> Result<SeasonalAggregate> {
    let mut temps = Vec::new();
    for (position, observation) in history.iter().enumerate() {
        if observation.city() == city && observation.season() == season {
            check_temperature(observation.temperature(), position, city)?;
            temps.push(observation.temperature());
        }
    }
    let (mean_temperature, std_temperature) = sample_stats(&temps);

    Ok(SeasonalAggregate {
        city: city.to_string(),
        season,
        mean_temperature,
        std_temperature,
        sample_count: temps.len(),
    })
}

/// One aggregate per season that has at least one reading for `city`,
/// Winter through Autumn.
///
/// # Errors
/// Same as [`seasonal_aggregate`].
pub fn seasonal_profiles<O: Observation>(
    history: &[O],
    city: &str,
) -> Result<Vec<SeasonalAggregate>> {
    let mut profiles = Vec::new();
    for season in Season::ALL {
        let aggregate = seasonal_aggregate(history, city, season)?;
        if aggregate.sample_count > 0 {
            profiles.push(aggregate);
        }
    }
    Ok(profiles)
}

/// Classifies `candidate` against an already computed aggregate.
///
/// Without a defined deviation (fewer than two samples) the answer is
/// `Undetermined`, never `Normal`.
pub fn classify(candidate: f64, aggregate: &SeasonalAggregate, sigma: f64) -> Classification {
    match (aggregate.mean_temperature, aggregate.std_temperature) {
        (Some(mean), Some(std)) if aggregate.sample_count >= 2 => {
            if deviates(candidate, mean, std, sigma) {
                Classification::Anomalous
            } else {
                Classification::Normal
            }
        }
        _ => Classification::Undetermined,
    }
}

/// Stateless comparator holding only its threshold.
#[derive(Debug, Clone, Default)]
pub struct BaselineComparator {
    config: ComparatorConfig,
}

impl BaselineComparator {
    /// # Errors
    /// Returns `PipelineError::InvalidInput` if sigma is negative or not finite.
    pub fn new(config: ComparatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Compares `candidate` with the history for `city` in the season of
    /// `month` (1-12).
    ///
    /// # Errors
    /// Returns `PipelineError::InvalidInput` if `month` is outside 1-12 or the
    /// candidate is not finite.
    pub fn compare_month<O: Observation>(
        &self,
        history: &[O],
        city: &str,
        month: u32,
        candidate: f64,
    ) -> Result<BaselineComparison> {
        let season = Season::from_month(month)?;
        self.compare_season(history, city, season, candidate)
    }

    /// # Errors
    /// Returns `PipelineError::InvalidInput` if the candidate or a matching
    /// historical temperature is not finite.
    pub fn compare_season<O: Observation>(
        &self,
        history: &[O],
        city: &str,
        season: Season,
        candidate: f64,
    ) -> Result<BaselineComparison> {
        if !candidate.is_finite() {
            return Err(PipelineError::invalid(format!(
                "candidate temperature {} is not a finite number",
                candidate
            )));
        }

        let aggregate = seasonal_aggregate(history, city, season)?;
        let classification = classify(candidate, &aggregate, self.config.sigma);
        debug!(
            "{} {}: candidate={} mean={:?} std={:?} n={} -> {}",
            city,
            season,
            candidate,
            aggregate.mean_temperature,
            aggregate.std_temperature,
            aggregate.sample_count,
            classification
        );

        Ok(BaselineComparison {
            candidate,
            sigma: self.config.sigma,
            aggregate,
            classification,
        })
    }

    /// Compares a resolved live observation using the city it was taken in.
    ///
    /// # Errors
    /// Same as [`BaselineComparator::compare_month`].
    pub fn compare_observation<O: Observation>(
        &self,
        history: &[O],
        observation: &LiveObservation,
        month: u32,
    ) -> Result<BaselineComparison> {
        self.compare_month(history, &observation.city, month, observation.temperature)
    }
}
