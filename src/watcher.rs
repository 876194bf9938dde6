// =============================================================================
// Breakout watcher — fine-interval dual-market volume trigger
// =============================================================================
//
// Runs against the small set of ACTIVE/HIGH-confidence candidates only —
// this is a cheap, frequent check layered on top of the slower analysis
// cycle, not a second universe scan. A per-symbol cooldown prevents the
// same breakout from re-alerting every tick once triggered.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;

use crate::alerts::Alerter;
use crate::error::PumpError;
use crate::models::PumpCandidate;
use crate::store::Store;
use crate::types::MarketSide;

#[derive(Debug, Clone, Copy)]
pub struct WatcherConfig {
    pub spot_ratio_threshold: f64,
    pub futures_ratio_threshold: f64,
    pub interval_id: i32,
    pub exchange_id: i64,
    pub cooldown: chrono::Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            spot_ratio_threshold: 2.0,
            futures_ratio_threshold: 1.5,
            interval_id: 3,
            exchange_id: 1,
            cooldown: chrono::Duration::hours(6),
        }
    }
}

/// One cycle's verdict for a candidate.
#[derive(Debug, Clone, Copy)]
pub struct BreakoutCheck {
    pub spot_ratio: Option<f64>,
    pub futures_ratio: Option<f64>,
    pub triggered: bool,
}

pub struct BreakoutWatcher {
    store: Store,
    alerter: Alerter,
    config: WatcherConfig,
    last_triggered: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl BreakoutWatcher {
    pub fn new(store: Store, alerter: Alerter, config: WatcherConfig) -> Self {
        Self {
            store,
            alerter,
            config,
            last_triggered: RwLock::new(HashMap::new()),
        }
    }

    /// One pass over the high-confidence ACTIVE candidates. Returns
    /// `(checked, triggered)` counts.
    pub async fn run_check_cycle(&self, now: DateTime<Utc>) -> Result<(usize, usize), PumpError> {
        let candidates = self.store.list_active_candidates_high_confidence().await?;
        let mut triggered = 0usize;
        let checked = candidates.len();

        for candidate in &candidates {
            if self.in_cooldown(&candidate.symbol, now) {
                continue;
            }
            let check = self.check_pump_start(candidate).await?;
            if check.triggered {
                triggered += 1;
                self.last_triggered.write().insert(candidate.symbol.clone(), now);
                self.alerter
                    .send_breakout_alert(
                        &candidate.symbol,
                        check.spot_ratio.unwrap_or(0.0),
                        check.futures_ratio.unwrap_or(0.0),
                        candidate,
                    )
                    .await;
            }
        }

        Ok((checked, triggered))
    }

    fn in_cooldown(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        self.last_triggered
            .read()
            .get(symbol)
            .map(|last| now - *last < self.config.cooldown)
            .unwrap_or(false)
    }

    /// Compares the latest closed candle's volume against the single
    /// immediately-preceding candle on both market sides. Only USDT-quoted
    /// pairs are resolved, matching the naive base-asset split used to pair
    /// a symbol across spot and futures universes.
    async fn check_pump_start(&self, candidate: &PumpCandidate) -> Result<BreakoutCheck, PumpError> {
        if !candidate.symbol.ends_with("USDT") {
            return Ok(BreakoutCheck {
                spot_ratio: None,
                futures_ratio: None,
                triggered: false,
            });
        }

        let spot_ratio = self.volume_ratio(&candidate.symbol, MarketSide::Spot).await?;
        let futures_ratio = self.volume_ratio(&candidate.symbol, MarketSide::Futures).await?;

        let triggered = spot_ratio.unwrap_or(0.0) >= self.config.spot_ratio_threshold
            && futures_ratio.unwrap_or(0.0) >= self.config.futures_ratio_threshold;

        Ok(BreakoutCheck {
            spot_ratio,
            futures_ratio,
            triggered,
        })
    }

    async fn volume_ratio(&self, symbol: &str, side: MarketSide) -> Result<Option<f64>, PumpError> {
        let Some(trading_pair_id) = self
            .store
            .trading_pair_id_for(symbol, self.config.exchange_id, side)
            .await?
        else {
            return Ok(None);
        };

        let candles = self
            .store
            .get_latest_candles(trading_pair_id, self.config.interval_id, 2)
            .await?;

        let [latest, previous] = candles.as_slice() else {
            return Ok(None);
        };

        let latest_volume = latest.quote_volume.to_f64().unwrap_or(0.0);
        let previous_volume = previous.quote_volume.to_f64().unwrap_or(0.0);

        if previous_volume <= 0.0 {
            return Ok(None);
        }
        Ok(Some(latest_volume / previous_volume))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_match_known_monitor_defaults() {
        let cfg = WatcherConfig::default();
        assert_eq!(cfg.spot_ratio_threshold, 2.0);
        assert_eq!(cfg.futures_ratio_threshold, 1.5);
        assert_eq!(cfg.cooldown, chrono::Duration::hours(6));
    }
}
