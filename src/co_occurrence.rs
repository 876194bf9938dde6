// =============================================================================
// Co-occurrence monitor — same-timestamp EXTREME spot/futures pairs
// =============================================================================
//
// A narrower, louder sibling of the analysis runner: rather than waiting
// for the scoring model to accumulate enough signals, this fires as soon as
// both market sides independently hit EXTREME strength at the same candle.
// =============================================================================

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::alerts::Alerter;
use crate::error::PumpError;
use crate::store::Store;

#[derive(Debug, Clone, Copy)]
pub struct CoOccurrenceConfig {
    pub lookback: Duration,
}

impl Default for CoOccurrenceConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::hours(1),
        }
    }
}

pub struct CoOccurrenceMonitor {
    store: Store,
    alerter: Alerter,
    config: CoOccurrenceConfig,
}

impl CoOccurrenceMonitor {
    pub fn new(store: Store, alerter: Alerter, config: CoOccurrenceConfig) -> Self {
        Self {
            store,
            alerter,
            config,
        }
    }

    /// Checks for newly-detected extreme co-occurrences within the
    /// configured lookback window and alerts once per pair found. When
    /// `dry_run` is set, pairs are found and logged but no alert is
    /// dispatched. Returns the number of pairs found.
    pub async fn run_check_cycle(&self, now: DateTime<Utc>, dry_run: bool) -> Result<usize, PumpError> {
        let pairs = self
            .store
            .find_extreme_co_occurrences(now, self.config.lookback)
            .await?;

        for (spot, futures) in &pairs {
            debug_assert_eq!(spot.symbol, futures.symbol);
            if dry_run {
                info!(symbol = %spot.symbol, timestamp = %spot.signal_timestamp, "dry run: would alert co-occurrence");
            } else {
                self.alerter.send_co_occurrence_alert(spot, futures).await;
            }
        }

        Ok(pairs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lookback_is_one_hour() {
        assert_eq!(CoOccurrenceConfig::default().lookback, Duration::hours(1));
    }
}
