use chrono::{Datelike, Local};
use clap::Parser;
use lib::{
    BaselineComparator, ComparatorConfig, DetectorConfig, LiveObservation, PipelineError,
    SimpleLogger, annotate, anomalies, cities, read_csv, records_for_city, seasonal_profiles,
    sort_chronologically, write_csv, write_json, write_parquet,
};
use log::{debug, info, warn};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

static LOGGER: SimpleLogger = SimpleLogger;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// input CSV file with city, timestamp and temperature columns
    #[arg(short, long)]
    input_file: PathBuf,

    /// Output base name (will create dir containing .csv, .json, and .parquet files)
    #[arg(short, long, default_value = "output")]
    output: String,

    /// Cities to keep (e.g., Moscow,Berlin). If not specified, processes all cities.
    #[arg(short, long = "city", value_delimiter = ',')]
    cities: Vec<String>,

    /// Rolling window size in records
    #[arg(short, long, default_value_t = 30)]
    window: usize,

    /// Minimum records in a window before statistics are defined
    #[arg(long, default_value_t = 1)]
    min_periods: usize,

    /// Anomaly threshold (standard deviations)
    #[arg(long, default_value_t = 2.0)]
    sigma: f64,

    /// Current temperature to compare against the seasonal baseline of the first selected city
    #[arg(long, allow_hyphen_values = true)]
    current_temp: Option<f64>,

    /// Weather description reported alongside the current temperature
    #[arg(long)]
    description: Option<String>,

    /// Month (1-12) for the seasonal comparison; defaults to the current month
    #[arg(long)]
    month: Option<u32>,

    /// Keep file order instead of sorting each city chronologically
    #[arg(long, default_value_t = false)]
    keep_order: bool,

    /// Log level for output
    #[arg(long, default_value = "false")]
    debug: bool,
}

fn main() -> Result<(), PipelineError> {
    let total_start = Instant::now();
    if let Err(err) = log::set_logger(&LOGGER) {
        eprintln!("Logger already installed: {}", err);
    }

    let args = Args::parse();
    if args.debug {
        log::set_max_level(log::LevelFilter::Debug);
    } else {
        log::set_max_level(log::LevelFilter::Info);
    }

    println!("Seasonal temperature anomaly monitor");
    debug!(
        "Input file: {} | Cities: {} | Window={} MinPeriods={} Sigma={}",
        args.input_file.display(),
        if args.cities.is_empty() {
            "ALL".to_string()
        } else {
            args.cities.join(",")
        },
        args.window,
        args.min_periods,
        args.sigma
    );

    let detector_config = DetectorConfig {
        window: args.window,
        min_periods: args.min_periods,
        sigma: args.sigma,
    };
    let comparator = BaselineComparator::new(ComparatorConfig { sigma: args.sigma })?;

    // Ingest
    let mut raw = read_csv(&args.input_file)?;
    if !args.cities.is_empty() {
        raw.retain(|r| {
            r.city
                .as_deref()
                .is_some_and(|city| args.cities.iter().any(|c| c == city))
        });
    }
    if args.keep_order {
        debug!("Keeping file order; rolling windows are positional");
    } else {
        sort_chronologically(&mut raw);
    }

    // Annotate
    let processing_start = Instant::now();
    let annotated = annotate(&raw, &detector_config)?;
    let processing_time = processing_start.elapsed();
    println!(
        "Annotation completed in {:.2?} | {} records, {} anomalies",
        processing_time,
        annotated.len(),
        anomalies(&annotated).count()
    );

    // Seasonal profiles
    let city_names = cities(&annotated);
    for city in &city_names {
        let city_records: Vec<_> = records_for_city(&annotated, city).cloned().collect();
        println!(
            "\n{}: {} records, {} anomalies (threshold {}σ)",
            city,
            city_records.len(),
            anomalies(&city_records).count(),
            detector_config.sigma
        );
        for profile in seasonal_profiles(&city_records, city)? {
            match (profile.mean_temperature, profile.std_temperature) {
                (Some(mean), Some(std)) => println!(
                    "  {}: mean = {:.1}°C, std = {:.1}°C ({} samples)",
                    profile.season, mean, std, profile.sample_count
                ),
                (Some(mean), None) => println!(
                    "  {}: mean = {:.1}°C, std undefined ({} sample)",
                    profile.season, mean, profile.sample_count
                ),
                _ => {}
            }
        }
    }

    // Current vs historical
    if let Some(temperature) = args.current_temp {
        match city_names.first() {
            Some(city) => {
                let month = args.month.unwrap_or_else(|| Local::now().month());
                let observation = LiveObservation {
                    city: city.to_string(),
                    temperature,
                    description: args.description.clone(),
                };
                let comparison =
                    comparator.compare_observation(&annotated, &observation, month)?;
                println!("\nCurrent temperature in {}: {}°C", city, temperature);
                if let Some(description) = &observation.description {
                    println!("Weather: {}", description);
                }
                println!("{}", comparison);
            }
            None => warn!("No records left to compare the current temperature against"),
        }
    }

    // Export
    let output_dir = PathBuf::from(format!("./output/{}", args.output));
    fs::create_dir_all(&output_dir)?;
    let io_start = Instant::now();

    // Extract just the directory name for the file names (remove path separators)
    let output_name = args
        .output
        .split(['/', '\\'])
        .next_back()
        .unwrap_or(&args.output);
    let csv_path = output_dir.join(format!("{}.csv", output_name));
    let json_path = output_dir.join(format!("{}.json", output_name));
    let parquet_path = output_dir.join(format!("{}.parquet", output_name));

    write_csv(&annotated, &csv_path)?;
    write_json(&annotated, &json_path)?;
    write_parquet(&annotated, &parquet_path)?;
    info!(
        "Wrote {} in {:.2?}",
        output_dir.display(),
        io_start.elapsed()
    );
    debug!("  - {}", csv_path.display());
    debug!("  - {}", json_path.display());
    debug!("  - {}", parquet_path.display());

    println!("\nTotal runtime: {:.2?}", total_start.elapsed());
    Ok(())
}
