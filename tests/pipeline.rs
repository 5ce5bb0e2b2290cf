use arrow_array::{Array, BooleanArray, Float64Array};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use lib::{
    BaselineComparator, Classification, DetectorConfig, RawRecord, Season, TemperatureRecord,
    annotate, read_csv, write_csv, write_json, write_parquet,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs;

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2015, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// A year of daily readings for one city following a rough seasonal curve.
fn year(city: &str, offset: f64) -> Vec<RawRecord> {
    (0..365)
        .map(|d| {
            let ts = start() + Duration::days(d);
            let phase = (d as f64 / 365.0) * std::f64::consts::TAU;
            let temp = offset - 12.0 * phase.cos() + ((d * 7) % 5) as f64 * 0.5;
            RawRecord::new(city, ts, temp)
        })
        .collect()
}

#[test]
fn appending_future_records_leaves_the_past_alone() {
    let records = year("Moscow", 5.0);
    let config = DetectorConfig::default();
    let head = annotate(&records[..200], &config).unwrap();
    let full = annotate(&records, &config).unwrap();
    assert_eq!(head[..], full[..200]);
}

#[test]
fn annotation_is_deterministic() {
    let mut records = year("Moscow", 5.0);
    records.extend(year("Cairo", 25.0));
    let config = DetectorConfig::default();
    let first = annotate(&records, &config).unwrap();
    let second = annotate(&records, &config).unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn raising_the_deviation_flips_the_flag_once() {
    let base = [10.0, 11.0, 9.0, 10.0, 10.0, 11.0, 9.0, 10.0, 10.0, 10.0];
    let mut previous = false;
    for step in 0..40 {
        let candidate = 10.0 + step as f64 * 0.5;
        let mut records: Vec<RawRecord> = base
            .iter()
            .enumerate()
            .map(|(i, &t)| RawRecord::new("Lima", start() + Duration::days(i as i64), t))
            .collect();
        records.push(RawRecord::new("Lima", start() + Duration::days(10), candidate));
        let out = annotate(&records, &DetectorConfig::default()).unwrap();
        let last = &out[10];
        let ratio = (last.temperature - last.rolling_mean.unwrap()).abs() / last.rolling_std.unwrap();
        assert_eq!(last.is_anomaly, ratio > 2.0);
        assert!(!(previous && !last.is_anomaly), "flag went back to false at {}", candidate);
        previous = last.is_anomaly;
    }
    assert!(previous);
}

#[test]
fn seasonal_comparison_over_annotated_history() {
    let history: Vec<TemperatureRecord> =
        annotate(&year("Moscow", 5.0), &DetectorConfig::default()).unwrap();
    let comparator = BaselineComparator::default();

    let january = comparator.compare_month(&history, "Moscow", 1, -6.0).unwrap();
    assert_eq!(january.aggregate.season, Season::Winter);
    assert_eq!(january.classification, Classification::Normal);

    let heatwave = comparator.compare_month(&history, "Moscow", 1, 25.0).unwrap();
    assert_eq!(heatwave.classification, Classification::Anomalous);

    let unknown = comparator.compare_month(&history, "Tokyo", 7, 25.0).unwrap();
    assert_eq!(unknown.classification, Classification::Undetermined);
    assert_eq!(unknown.aggregate.sample_count, 0);
}

#[test]
fn csv_in_annotated_files_out() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("temperature_data.csv");
    let mut body = String::from("city,timestamp,temperature,season\n");
    for (i, t) in [-5.0, -6.0, -4.0, -5.0, -5.0, -6.0, -4.0, -5.0, -5.0, -5.0, -20.0]
        .iter()
        .enumerate()
    {
        body.push_str(&format!("Moscow,2015-01-{:02},{},winter\n", i + 1, t));
    }
    fs::write(&input, body).unwrap();

    let raw = read_csv(&input).unwrap();
    let annotated = annotate(&raw, &DetectorConfig::default()).unwrap();
    assert!(annotated[10].is_anomaly);

    let csv_path = dir.path().join("out.csv");
    let json_path = dir.path().join("out.json");
    let parquet_path = dir.path().join("out.parquet");
    write_csv(&annotated, &csv_path).unwrap();
    write_json(&annotated, &json_path).unwrap();
    write_parquet(&annotated, &parquet_path).unwrap();

    let csv_text = fs::read_to_string(&csv_path).unwrap();
    let second_line = csv_text.lines().nth(1).unwrap();
    // first record has no deviation yet
    assert_eq!(
        second_line,
        "Moscow,2015-01-01 00:00:00,-5.00,Winter,-5.00,,false"
    );

    let parsed: Vec<TemperatureRecord> =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(parsed.len(), annotated.len());
    for (read_back, original) in parsed.iter().zip(&annotated) {
        assert_eq!(read_back.timestamp, original.timestamp);
        assert_eq!(read_back.season, original.season);
        assert_eq!(read_back.is_anomaly, original.is_anomaly);
        assert_eq!(read_back.rolling_std.is_some(), original.rolling_std.is_some());
    }

    let reader = ParquetRecordBatchReaderBuilder::try_new(fs::File::open(&parquet_path).unwrap())
        .unwrap()
        .build()
        .unwrap();
    let batches: Vec<_> = reader.map(|b| b.unwrap()).collect();
    let batch = &batches[0];
    assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), annotated.len());
    let stds = batch
        .column_by_name("rolling_std")
        .unwrap()
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    // a single-record window has no deviation: stored as null, not NaN
    assert!(stds.is_null(0));
    assert!(stds.is_valid(1));
    let means = batch
        .column_by_name("rolling_mean")
        .unwrap()
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    assert_eq!(means.value(0), -5.0);
    let flags = batch
        .column_by_name("is_anomaly")
        .unwrap()
        .as_any()
        .downcast_ref::<BooleanArray>()
        .unwrap();
    assert!(flags.value(10));
    assert!(!flags.value(0));
}
