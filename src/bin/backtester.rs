// =============================================================================
// pump-backtester — time-travel replay against the known-pump corpus
// =============================================================================

use std::fs::File;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pump_detector::backtest::{compute_metrics, Backtester};
use pump_detector::config::AppConfig;
use pump_detector::engine::{DetectionEngine, EngineConfig};
use pump_detector::store::Store;

const DEFAULT_METRICS_PATH: &str = "/tmp/pump_analysis/backtest_metrics.json";

/// Replays the detection engine against every known pump at several fixed
/// lead times, writes a classification row for each, then aggregates and
/// reports precision/recall/F1/accuracy.
#[derive(Parser, Debug)]
#[command(name = "pump-backtester")]
struct Cli {
    /// Path the metrics JSON artifact is written to.
    #[arg(long, default_value = DEFAULT_METRICS_PATH)]
    metrics_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    let store = Store::connect(&config.database).await?;
    let engine_config = EngineConfig::from_store(&store).await?;
    let engine = DetectionEngine::new(engine_config);
    let backtester = Backtester::new(store, engine);

    let results = backtester.run_full_backtest().await?;
    let metrics = compute_metrics(&results);

    info!(written = results.len(), "backtest complete");
    info!(
        tp = metrics.overall.tp,
        fp = metrics.overall.fp,
        fn_ = metrics.overall.fn_,
        tn = metrics.overall.tn,
        precision = metrics.overall.precision,
        recall = metrics.overall.recall,
        f1_score = metrics.overall.f1_score,
        accuracy = metrics.overall.accuracy,
        "overall performance"
    );
    for window in &metrics.by_time_window {
        info!(
            hours_before = window.hours_before,
            detected = window.detected,
            total = window.total,
            detection_rate = window.detection_rate,
            actionable = window.actionable,
            "detection rate by time window"
        );
    }
    for conf in &metrics.by_confidence {
        info!(
            confidence = %conf.confidence,
            count = conf.count,
            avg_score = conf.avg_score,
            actionable_count = conf.actionable_count,
            "detection by confidence level"
        );
    }
    for pattern in &metrics.by_pattern {
        info!(
            pattern_type = %pattern.pattern_type,
            count = pattern.count,
            avg_score = pattern.avg_score,
            "detection by pattern type"
        );
    }

    if let Some(parent) = cli.metrics_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(&cli.metrics_path)?;
    serde_json::to_writer_pretty(file, &metrics)?;
    info!(path = %cli.metrics_path.display(), "metrics saved");

    Ok(())
}
