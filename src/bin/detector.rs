// =============================================================================
// pump-detector — volume-anomaly scan over the trading-pair universe
// =============================================================================

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pump_detector::config::AppConfig;
use pump_detector::detector::{DetectorConfig, SpikeDetector};
use pump_detector::store::Store;

/// Scans for volume anomalies and writes classified raw signals.
#[derive(Parser, Debug)]
#[command(name = "pump-detector")]
struct Cli {
    /// Run the 30-day batched historical backfill once, then exit.
    #[arg(long)]
    historical: bool,

    /// Run a single live scan cycle, then exit.
    #[arg(long)]
    once: bool,

    /// Minutes between live scan cycles.
    #[arg(long, default_value_t = 60)]
    interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    let store = Store::connect(&config.database).await?;
    let detector_config = DetectorConfig::from_store(&store).await?;
    let detector = SpikeDetector::new(
        store,
        detector_config,
        config.universe.exchange_id,
        config.universe.market_cap_floor,
    );

    if cli.historical {
        info!("starting historical backfill");
        let inserted = detector.run_historical(chrono::Utc::now()).await?;
        info!(inserted, "historical backfill complete");
        return Ok(());
    }

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    loop {
        let now = chrono::Utc::now();
        match detector.run_once(now, chrono::Duration::hours(4)).await {
            Ok(inserted) => info!(inserted, "scan cycle complete"),
            Err(err) => error!(error = %err, "scan cycle failed"),
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
