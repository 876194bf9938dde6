// =============================================================================
// pump-breakout-watcher — fine-interval dual-market volume trigger
// =============================================================================

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pump_detector::alerts::Alerter;
use pump_detector::config::AppConfig;
use pump_detector::store::Store;
use pump_detector::watcher::{BreakoutWatcher, WatcherConfig};

/// Watches ACTIVE high-confidence candidates for a dual-market volume surge.
#[derive(Parser, Debug)]
#[command(name = "pump-breakout-watcher")]
struct Cli {
    /// Run a single check cycle, then exit.
    #[arg(long)]
    once: bool,

    /// Minutes between check cycles.
    #[arg(long, default_value_t = 60)]
    interval: u64,

    /// Spot volume-ratio trigger threshold.
    #[arg(long)]
    spot_threshold: Option<f64>,

    /// Futures volume-ratio trigger threshold.
    #[arg(long)]
    futures_threshold: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    let store = Store::connect(&config.database).await?;
    let alerter = Alerter::new(&config.messaging);

    let mut watcher_config = WatcherConfig {
        exchange_id: config.universe.exchange_id,
        ..WatcherConfig::default()
    };
    if let Some(t) = cli.spot_threshold {
        watcher_config.spot_ratio_threshold = t;
    }
    if let Some(t) = cli.futures_threshold {
        watcher_config.futures_ratio_threshold = t;
    }

    let watcher = BreakoutWatcher::new(store, alerter, watcher_config);

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    loop {
        let now = chrono::Utc::now();
        match watcher.run_check_cycle(now).await {
            Ok((checked, triggered)) => info!(checked, triggered, "check cycle complete"),
            Err(err) => error!(error = %err, "check cycle failed"),
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
