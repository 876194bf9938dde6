// =============================================================================
// pump-extreme-monitor — same-timestamp spot/futures EXTREME co-occurrence
// =============================================================================

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pump_detector::alerts::Alerter;
use pump_detector::co_occurrence::{CoOccurrenceConfig, CoOccurrenceMonitor};
use pump_detector::config::AppConfig;
use pump_detector::store::Store;

/// One-shot check for same-timestamp EXTREME signals across spot and
/// futures. Intended to be run on a schedule (cron, systemd timer) rather
/// than looped internally.
#[derive(Parser, Debug)]
#[command(name = "pump-extreme-monitor")]
struct Cli {
    /// Minutes of lookback for the co-occurrence window.
    #[arg(long, default_value_t = 60)]
    lookback: i64,

    /// Find and log co-occurrences without dispatching alerts.
    #[arg(long)]
    dry_run: bool,
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
    let monitor = CoOccurrenceMonitor::new(
        store,
        alerter,
        CoOccurrenceConfig {
            lookback: chrono::Duration::minutes(cli.lookback),
        },
    );

    let now = chrono::Utc::now();
    match monitor.run_check_cycle(now, cli.dry_run).await {
        Ok(found) => info!(found, dry_run = cli.dry_run, "co-occurrence check complete"),
        Err(err) => {
            error!(error = %err, "co-occurrence check failed");
            return Err(err.into());
        }
    }

    Ok(())
}
