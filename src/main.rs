//! KlineForge command line
//!
//! Usage:
//!   klineforge fetch <settings>
//!   klineforge calculate <settings> <fetched.csv>
//!   klineforge train <settings> <calculated.csv>
//!   klineforge predict <settings> <pipeline.json> <forest.json>

use anyhow::{bail, Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use klineforge::cleaning::{finalize_columns, DEFAULT_DROP_COLUMNS};
use klineforge::model::{train_test_split, ForestModel, ForestTask};
use klineforge::table::{load_klines_csv, read_table_csv, save_klines_csv, write_table_csv, write_table_info};
use klineforge::{
    compute_features, fetch_sequence, prepare_features, BinanceKlineClient, FeatureTable,
    FittedPipeline, HistoricalFetcher, RunMode, Settings,
};

/// Predictions echoed at the end of `predict`
const SHOWN_PREDICTIONS: usize = 5;

const USAGE: &str = "usage:
  klineforge fetch <settings>
  klineforge calculate <settings> <fetched.csv>
  klineforge train <settings> <calculated.csv>
  klineforge predict <settings> <pipeline.json> <forest.json>";

fn init_tracing(log_file: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("KLINEFORGE_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let stdout = if json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };
    let file = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)).boxed())
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .init();
    Ok(())
}

/// `dir/name_fetched.csv` -> `dir/name{suffix}`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let base = ["_fetched", "_calculated", "_pipeline", "_forest"]
        .iter()
        .find_map(|tail| stem.strip_suffix(tail))
        .unwrap_or(stem);
    path.with_file_name(format!("{}{}", base, suffix))
}

fn info_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".info");
    PathBuf::from(name)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, rest) = match args.split_first() {
        Some((command, rest)) if !rest.is_empty() => (command.as_str(), rest),
        _ => bail!("{}", USAGE),
    };

    let settings = Settings::load(Some(Path::new(&rest[0])))
        .with_context(|| format!("Failed to load settings from {}", rest[0]))?;
    init_tracing(settings.data.log_file.as_deref())?;
    info!("🚀 klineforge {} ({})", command, settings.digest());

    match (command, &rest[1..]) {
        ("fetch", []) => run_fetch(&settings).await,
        ("calculate", [input]) => run_calculate(&settings, Path::new(input)),
        ("train", [input]) => run_train(&settings, Path::new(input)),
        ("predict", [pipeline, forest]) => {
            run_predict(&settings, Path::new(pipeline), Path::new(forest)).await
        }
        _ => bail!("{}", USAGE),
    }
}

async fn run_fetch(settings: &Settings) -> Result<()> {
    if settings.fetch_sequence.is_empty() {
        bail!("No fetch_sequence steps configured");
    }
    let client = BinanceKlineClient::new(&settings.fetch)?;
    let fetcher = HistoricalFetcher::new(client, &settings.fetch);
    let data_dir = Path::new(&settings.data.data_dir);

    let outcomes = fetch_sequence(&fetcher, &settings.fetch_sequence).await;
    let mut saved = 0;
    for outcome in outcomes {
        match outcome.result {
            Ok(series) => {
                let path = data_dir.join(format!("{}_fetched.csv", outcome.name));
                save_klines_csv(&series, &path)?;
                write_table_info(&FeatureTable::from_series(&series)?, &info_path(&path))?;
                saved += 1;
            }
            Err(e) => warn!("⚠️ Step '{}' produced no data: {}", outcome.name, e),
        }
    }
    info!(
        "✅ Fetch finished: {}/{} steps saved",
        saved,
        settings.fetch_sequence.len()
    );
    Ok(())
}

fn run_calculate(settings: &Settings, input: &Path) -> Result<()> {
    let series = load_klines_csv(input, &settings.fetch.symbol, settings.interval()?)
        .with_context(|| format!("Failed to read klines from {}", input.display()))?;
    let table = compute_features(&series, settings, RunMode::Training)?;

    let output = sibling(input, "_calculated.csv");
    write_table_csv(&table, &output)?;
    write_table_info(&table, &info_path(&output))?;
    Ok(())
}

fn run_train(settings: &Settings, input: &Path) -> Result<()> {
    let table = read_table_csv(input)
        .with_context(|| format!("Failed to read features from {}", input.display()))?;
    let prepared = finalize_columns(table, &DEFAULT_DROP_COLUMNS)?;

    let (fitted, sequences) = FittedPipeline::fit(&prepared, settings)?;
    fitted.save(&sibling(input, "_pipeline.json"))?;
    if sequences.is_empty() {
        bail!("Not enough rows to build any training sequence");
    }

    let seq = &settings.sequence;
    let (train, test) = train_test_split(&sequences, seq.test_size, seq.random_state);
    let task = if settings.labeling.classification {
        ForestTask::Classification
    } else {
        ForestTask::Regression
    };
    let model = ForestModel::fit(&train, task, seq.n_trees, seq.max_depth, seq.random_state)?;
    let report = model.evaluate(&test)?;
    info!("📊 Hold-out report: {}", report);

    model.save(&sibling(input, "_forest.json"))?;
    Ok(())
}

async fn run_predict(settings: &Settings, pipeline: &Path, forest: &Path) -> Result<()> {
    let fitted = FittedPipeline::load(pipeline)?;
    let model = ForestModel::load(forest)?;

    let client = BinanceKlineClient::new(&settings.fetch)?;
    let fetcher = HistoricalFetcher::new(client, &settings.fetch);
    let series = fetcher
        .fetch_recent(&settings.fetch.symbol, &settings.fetch.interval, &settings.fetch.lookback)
        .await?;

    let prepared = prepare_features(&series, settings, RunMode::Inference)?;
    let sequences = fitted.transform(&prepared)?;
    if sequences.is_empty() {
        bail!(
            "Lookback '{}' is shorter than the {}-row window plus the {}-row horizon",
            settings.fetch.lookback,
            fitted.window_size,
            fitted.horizon
        );
    }
    let predictions = model.predict(&sequences)?;

    // window n ends right before row window_size + n
    let offset = fitted.window_size;
    let shown = predictions.len().min(SHOWN_PREDICTIONS);
    for (n, p) in predictions.iter().enumerate().skip(predictions.len() - shown) {
        let last_row = offset + n - 1;
        let close_time = series
            .klines
            .get(last_row)
            .and_then(|k| k.close_datetime())
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        info!("🔮 {} window ending {}: {:.4}", series.symbol, close_time, p);
    }
    Ok(())
}
