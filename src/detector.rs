// =============================================================================
// Spike detector — scans the trading-pair universe for volume anomalies
// =============================================================================
//
// Baseline computation is pushed entirely into `Store::scan_volume_anomalies`
// as a single windowed SQL query; this module turns each returned row into a
// classified `RawSignal` and persists it. Spot and futures are scanned
// independently since they carry separate `contract_type_id` universes.
// =============================================================================

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::PumpError;
use crate::models::RawSignal;
use crate::store::{AnomalyRow, Store};
use crate::types::{MarketSide, SignalStrength};

/// Historical backfill window and batching, plus spike thresholds shared by
/// both market sides. Thresholds mirror `engine::EngineConfig`'s defaults —
/// the detector and the scoring model classify strength from the same
/// table, just at different points in the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    pub interval_id: i32,
    pub min_spike_ratio: f64,
    pub extreme_threshold: f64,
    pub very_strong_threshold: f64,
    pub strong_threshold: f64,
    pub medium_threshold: f64,
    pub historical_batch_hours: i64,
    pub historical_total_hours: i64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            interval_id: 4,
            min_spike_ratio: 1.5,
            extreme_threshold: 5.0,
            very_strong_threshold: 3.0,
            strong_threshold: 2.0,
            medium_threshold: 1.5,
            historical_batch_hours: 48,
            historical_total_hours: 720,
        }
    }
}

impl DetectorConfig {
    /// Load spike-ratio overrides from `pump.detector_config`; batching
    /// parameters are process-level and stay code-side.
    pub async fn from_store(store: &Store) -> Result<Self, crate::error::StorageError> {
        let d = Self::default();
        Ok(Self {
            min_spike_ratio: store
                .get_config_f64("min_spike_ratio", d.min_spike_ratio)
                .await?,
            extreme_threshold: store
                .get_config_f64("extreme_spike_threshold", d.extreme_threshold)
                .await?,
            very_strong_threshold: store
                .get_config_f64("very_strong_spike_threshold", d.very_strong_threshold)
                .await?,
            strong_threshold: store
                .get_config_f64("strong_spike_threshold", d.strong_threshold)
                .await?,
            medium_threshold: store
                .get_config_f64("medium_spike_threshold", d.medium_threshold)
                .await?,
            ..d
        })
    }
}

/// Scans the trading-pair universe for volume anomalies on both market
/// sides and writes classified `raw_signals` rows.
pub struct SpikeDetector {
    store: Store,
    config: DetectorConfig,
    exchange_id: i64,
    market_cap_floor: f64,
}

impl SpikeDetector {
    pub fn new(store: Store, config: DetectorConfig, exchange_id: i64, market_cap_floor: f64) -> Self {
        Self {
            store,
            config,
            exchange_id,
            market_cap_floor,
        }
    }

    /// One scan of `[now - lookback, now]` across both market sides.
    /// Returns the number of new signals persisted; rows colliding on the
    /// uniqueness key are silently skipped, matching `Store::insert_raw_signal`.
    pub async fn run_once(
        &self,
        now: DateTime<Utc>,
        lookback: Duration,
    ) -> Result<u64, PumpError> {
        let window_start_ms = (now - lookback).timestamp_millis();
        let window_end_ms = now.timestamp_millis();

        let mut inserted = 0u64;
        for side in [MarketSide::Spot, MarketSide::Futures] {
            inserted += self.scan_and_persist(side, window_start_ms, window_end_ms).await?;
        }
        Ok(inserted)
    }

    /// Batched backfill over a fixed 30-day lookback, split into
    /// `historical_batch_hours`-wide batches so a single slow or failing
    /// batch doesn't abort the whole load. Returns the total rows persisted.
    pub async fn run_historical(&self, now: DateTime<Utc>) -> Result<u64, PumpError> {
        let total_hours = self.config.historical_total_hours;
        let batch_hours = self.config.historical_batch_hours;
        let num_batches = total_hours / batch_hours;

        let mut total_inserted = 0u64;
        for batch in 0..num_batches {
            let batch_end = now - Duration::hours(batch * batch_hours);
            let batch_start = batch_end - Duration::hours(batch_hours);

            match self.run_once(batch_end, batch_end - batch_start).await {
                Ok(n) => total_inserted += n,
                Err(err) => {
                    tracing::warn!(
                        batch,
                        batch_start = %batch_start,
                        batch_end = %batch_end,
                        error = %err,
                        "historical batch failed, continuing"
                    );
                }
            }
        }
        Ok(total_inserted)
    }

    async fn scan_and_persist(
        &self,
        side: MarketSide,
        window_start_ms: i64,
        window_end_ms: i64,
    ) -> Result<u64, PumpError> {
        let rows = self
            .store
            .scan_volume_anomalies(
                side,
                self.exchange_id,
                self.config.interval_id,
                self.market_cap_floor,
                window_start_ms,
                window_end_ms,
                self.config.min_spike_ratio,
            )
            .await?;

        let mut inserted = 0u64;
        for row in rows {
            let signal = self.classify(side, row)?;
            if self.store.insert_raw_signal(&signal).await?.is_some() {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn classify(&self, side: MarketSide, row: AnomalyRow) -> Result<RawSignal, PumpError> {
        let volume = row.quote_volume.to_f64().ok_or_else(|| {
            PumpError::DataInsufficient(format!("non-finite volume for {}", row.symbol))
        })?;
        let baseline_7d = decimal_to_f64(row.baseline_7d);
        let baseline_14d = decimal_to_f64(row.baseline_14d);
        let baseline_30d = decimal_to_f64(row.baseline_30d);

        let spike_ratio_7d = ratio(volume, baseline_7d);
        let spike_ratio_14d = ratio(volume, baseline_14d);
        let spike_ratio_30d = ratio(volume, baseline_30d);

        let m = spike_ratio_7d.max(spike_ratio_14d);
        let strength = SignalStrength::classify(
            m,
            self.config.extreme_threshold,
            self.config.very_strong_threshold,
            self.config.strong_threshold,
            self.config.medium_threshold,
        );

        let signal_timestamp = DateTime::<Utc>::from_timestamp_millis(row.open_time_ms)
            .ok_or_else(|| PumpError::DataInsufficient(format!("bad candle time for {}", row.symbol)))?;

        Ok(RawSignal {
            id: Uuid::new_v4(),
            trading_pair_id: row.trading_pair_id,
            symbol: row.symbol,
            market_side: side,
            signal_timestamp,
            detected_at: Utc::now(),
            volume: row.quote_volume,
            baseline_7d: row.baseline_7d,
            baseline_14d: row.baseline_14d,
            baseline_30d: row.baseline_30d,
            spike_ratio_7d,
            spike_ratio_14d,
            spike_ratio_30d,
            signal_strength: strength,
            price_at_signal: row.close,
            detector_version: "2.0".to_string(),
        })
    }
}

fn decimal_to_f64(d: Option<Decimal>) -> Option<f64> {
    d.and_then(|v| v.to_f64())
}

fn ratio(volume: f64, baseline: Option<f64>) -> f64 {
    match baseline {
        Some(b) if b > 0.0 => volume / b,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_handles_missing_or_zero_baseline() {
        assert_eq!(ratio(100.0, None), 0.0);
        assert_eq!(ratio(100.0, Some(0.0)), 0.0);
        assert_eq!(ratio(300.0, Some(100.0)), 3.0);
    }

    #[test]
    fn historical_batching_covers_full_window_exactly() {
        let cfg = DetectorConfig::default();
        assert_eq!(cfg.historical_total_hours % cfg.historical_batch_hours, 0);
        assert_eq!(
            cfg.historical_total_hours / cfg.historical_batch_hours,
            15
        );
    }

    #[test]
    fn strength_classification_matches_engine_defaults() {
        let cfg = DetectorConfig::default();
        assert_eq!(
            SignalStrength::classify(
                5.0,
                cfg.extreme_threshold,
                cfg.very_strong_threshold,
                cfg.strong_threshold,
                cfg.medium_threshold
            ),
            SignalStrength::Extreme
        );
        assert_eq!(
            SignalStrength::classify(
                1.6,
                cfg.extreme_threshold,
                cfg.very_strong_threshold,
                cfg.strong_threshold,
                cfg.medium_threshold
            ),
            SignalStrength::Medium
        );
    }
}
