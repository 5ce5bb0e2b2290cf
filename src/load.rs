use crate::error::{PipelineError, Result};
use crate::structs::{RawRecord, TemperatureRecord};
use arrow_array::{BooleanArray, Float64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use chrono::{NaiveDate, NaiveDateTime};
use csv::{Reader, Writer};
use log::debug;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use serde::Deserialize;
use std::{fs::File, io::Read, path::Path, sync::Arc};

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One CSV row before any validation. Unknown columns (a precomputed
/// `season`, for instance) are ignored.
#[derive(Debug, Deserialize)]
struct CsvRow {
    city: Option<String>,
    timestamp: Option<String>,
    temperature: Option<String>,
}

/// Reads raw temperature records from a CSV file with `city`, `timestamp`
/// and `temperature` columns.
///
/// # Errors
/// Returns error if the file cannot be opened, is not valid CSV, or holds a
/// timestamp or temperature that cannot be parsed. Empty cells are kept as
/// absent fields.
pub fn read_csv(input_path: &Path) -> Result<Vec<RawRecord>> {
    debug!("Reading CSV file: {}", input_path.display());
    let file = File::open(input_path)?;
    read_csv_from(file)
}

/// Same as [`read_csv`] over any reader.
pub fn read_csv_from<R: Read>(source: R) -> Result<Vec<RawRecord>> {
    let mut reader = Reader::from_reader(source);
    let mut records = Vec::new();

    for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row?;
        // header is line 1
        let line = index + 2;
        let timestamp = match non_empty(row.timestamp) {
            Some(raw) => Some(parse_timestamp(&raw).ok_or_else(|| {
                PipelineError::invalid(format!("line {}: unparseable timestamp '{}'", line, raw))
            })?),
            None => None,
        };
        let temperature = match non_empty(row.temperature) {
            Some(raw) => Some(raw.parse::<f64>().map_err(|_| {
                PipelineError::invalid(format!("line {}: unparseable temperature '{}'", line, raw))
            })?),
            None => None,
        };
        records.push(RawRecord {
            city: non_empty(row.city),
            timestamp,
            temperature,
        });
    }

    debug!("Read {} rows", records.len());
    Ok(records)
}

fn non_empty(cell: Option<String>) -> Option<String> {
    cell.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Parses a full date-time, or a bare date taken as midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

/// Writes annotated records to a CSV file. Undefined rolling statistics are
/// written as empty cells.
///
/// # Errors
/// Returns error if file cannot be created or written to.
pub fn write_csv(records: &[TemperatureRecord], output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    writer.write_record([
        "City",
        "Timestamp",
        "Temperature",
        "Season",
        "Rolling_Mean",
        "Rolling_Std",
        "Is_Anomaly",
    ])?;

    for record in records {
        writer.write_record(&[
            record.city.clone(),
            record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            format!("{:.2}", record.temperature),
            record.season.to_string(),
            optional(record.rolling_mean),
            optional(record.rolling_std),
            record.is_anomaly.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes annotated records to a pretty-formatted JSON file.
///
/// # Errors
/// Returns error if file cannot be created or serialization fails.
pub fn write_json(records: &[TemperatureRecord], output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    serde_json::to_writer_pretty(file, records)?;
    Ok(())
}

/// Writes annotated records to a Parquet file. The rolling columns are
/// nullable so that undefined statistics stay null rather than NaN.
///
/// # Errors
/// Returns error if file cannot be created, schema is invalid, or Arrow operations fail.
pub fn write_parquet(records: &[TemperatureRecord], output_path: &Path) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("city", DataType::Utf8, false),
        Field::new("timestamp", DataType::Utf8, false),
        Field::new("temperature", DataType::Float64, false),
        Field::new("season", DataType::Utf8, false),
        Field::new("rolling_mean", DataType::Float64, true),
        Field::new("rolling_std", DataType::Float64, true),
        Field::new("is_anomaly", DataType::Boolean, false),
    ]));

    let cities = StringArray::from_iter_values(records.iter().map(|r| r.city.as_str()));
    let timestamps = StringArray::from_iter_values(
        records
            .iter()
            .map(|r| r.timestamp.format(TIMESTAMP_FORMAT).to_string()),
    );
    let temperatures: Float64Array = records.iter().map(|r| r.temperature).collect();
    let seasons = StringArray::from_iter_values(records.iter().map(|r| r.season.to_string()));
    let means: Float64Array = records.iter().map(|r| r.rolling_mean).collect();
    let stds: Float64Array = records.iter().map(|r| r.rolling_std).collect();
    let flags: BooleanArray = records.iter().map(|r| Some(r.is_anomaly)).collect();

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(cities),
            Arc::new(timestamps),
            Arc::new(temperatures),
            Arc::new(seasons),
            Arc::new(means),
            Arc::new(stds),
            Arc::new(flags),
        ],
    )?;

    let file = File::create(output_path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dates_and_date_times() {
        let midnight = parse_timestamp("2010-01-05").unwrap();
        assert_eq!(midnight.to_string(), "2010-01-05 00:00:00");
        assert!(parse_timestamp("2010-01-05 13:30:00").is_some());
        assert!(parse_timestamp("2010-01-05T13:30:00").is_some());
        assert!(parse_timestamp("05/01/2010").is_none());
    }

    #[test]
    fn csv_keeps_empty_cells_absent_and_ignores_extra_columns() {
        let data = "city,timestamp,temperature,season\n\
                    Moscow,2010-01-01,-5.5,winter\n\
                    ,2010-01-02,-6.0,winter\n\
                    Moscow,2010-01-03,,winter\n";
        let records = read_csv_from(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].temperature, Some(-5.5));
        assert_eq!(records[1].city, None);
        assert_eq!(records[2].temperature, None);
    }

    #[test]
    fn csv_rejects_garbage_with_line_number() {
        let data = "city,timestamp,temperature\nMoscow,yesterday,1.0\n";
        match read_csv_from(data.as_bytes()) {
            Err(PipelineError::InvalidInput(msg)) => assert!(msg.contains("line 2")),
            other => panic!("expected InvalidInput, got {:?}", other),
        }
        let data = "city,timestamp,temperature\nMoscow,2010-01-01,warm\n";
        assert!(matches!(
            read_csv_from(data.as_bytes()),
            Err(PipelineError::InvalidInput(_))
        ));
    }
}
