// =============================================================================
// pump-analysis-runner — scores accumulated signals into candidates
// =============================================================================

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pump_detector::alerts::Alerter;
use pump_detector::config::AppConfig;
use pump_detector::engine::{DetectionEngine, EngineConfig};
use pump_detector::runner::AnalysisRunner;
use pump_detector::store::Store;

/// Analyzes the raw-signal backlog and maintains pump candidates.
#[derive(Parser, Debug)]
#[command(name = "pump-analysis-runner")]
struct Cli {
    /// Run a single analysis cycle, then exit.
    #[arg(long)]
    once: bool,

    /// Minutes between analysis cycles.
    #[arg(long, default_value_t = 30)]
    interval: u64,

    /// Minimum signal count a symbol must carry to be analyzed.
    #[arg(long, default_value_t = 10)]
    min_signal_count: i64,
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
    let alerter = Alerter::new(&config.messaging);

    let runner = AnalysisRunner::new(
        store,
        engine,
        alerter,
        config.universe.exchange_id,
        cli.min_signal_count,
    );

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    loop {
        let now = chrono::Utc::now();
        match runner.run_cycle(now).await {
            Ok(summary) => info!(
                symbols_considered = summary.symbols_considered,
                candidates_detected = summary.candidates_detected,
                actionable_alerts_sent = summary.actionable_alerts_sent,
                expired_candidates = summary.expired_candidates,
                "analysis cycle complete"
            ),
            Err(err) => error!(error = %err, "analysis cycle failed"),
        }

        if cli.once {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(cli.interval * 60)) => {}
            _ = token.cancelled() => {
                warn!("shutdown requested, exiting after current cycle");
                break;
            }
        }
    }

    Ok(())
}
