pub mod baseline;
pub mod error;
pub mod load;
pub mod structs;
pub mod transform;

// Re-export public API
pub use baseline::{BaselineComparator, classify, seasonal_aggregate, seasonal_profiles};
pub use error::{PipelineError, Result};
pub use load::{read_csv, write_csv, write_json, write_parquet};
pub use structs::{
    BaselineComparison, Classification, ComparatorConfig, DetectorConfig, LiveObservation,
    Observation, RawRecord, Reading, Season, SeasonalAggregate, SimpleLogger, TemperatureRecord,
};
pub use transform::{
    annotate, annotate_readings, anomalies, cities, records_for_city, sort_chronologically,
};
