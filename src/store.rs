// =============================================================================
// Store — typed Postgres access for the pump schema
// =============================================================================
//
// Every method is a single transactional unit. `None` represents "no row"
// for lookups (`last_known_pump_before`, `get_latest_candles`, `get_config`)
// rather than an error; `StorageError` is reserved for I/O failure.
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::StorageError;
use crate::models::{
    BacktestResult, Candle, KnownPumpEvent, LastPumpInfo, PumpCandidate, RawSignal,
};
use crate::types::MarketSide;

/// Typed handle over a connection pool, owned by a single scheduler.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

/// One candle surfaced by [`Store::scan_volume_anomalies`], still carrying
/// raw baselines for the caller to turn into spike ratios and a strength
/// label.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnomalyRow {
    pub trading_pair_id: i64,
    pub symbol: String,
    pub open_time_ms: i64,
    pub close: Decimal,
    pub quote_volume: Decimal,
    pub baseline_7d: Option<Decimal>,
    pub baseline_14d: Option<Decimal>,
    pub baseline_30d: Option<Decimal>,
}

impl Store {
    /// Open a connection pool. Mirrors the source's "connect once at
    /// startup, reconnect from the outer tick on failure" lifecycle.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.connection_url())
            .await?;
        Ok(Self { pool })
    }

    /// Trivial connectivity probe, replacing the source's exception-driven
    /// reconnect with an explicit health check the outer loop can call.
    pub async fn health_check(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // -------------------------------------------------------------------
    // Config
    // -------------------------------------------------------------------

    /// Fetch a typed config value from `pump.detector_config`, falling back
    /// to `default` when the key is absent (not an error).
    pub async fn get_config_f64(&self, key: &str, default: f64) -> Result<f64, StorageError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM pump.detector_config WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(v,)| v.parse().ok()).unwrap_or(default))
    }

    pub async fn get_config_i32(&self, key: &str, default: i32) -> Result<i32, StorageError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM pump.detector_config WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(v,)| v.parse().ok()).unwrap_or(default))
    }

    // -------------------------------------------------------------------
    // Raw signals
    // -------------------------------------------------------------------

    /// Insert a raw signal. Returns `Ok(None)` (instead of an error) when
    /// the row collides on the `(trading_pair_id, signal_timestamp,
    /// market_side)` uniqueness key — the detector relies on this rather
    /// than pre-checking.
    pub async fn insert_raw_signal(
        &self,
        signal: &RawSignal,
    ) -> Result<Option<Uuid>, StorageError> {
        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO pump.raw_signals (
                id, trading_pair_id, pair_symbol, market_side, signal_timestamp,
                detected_at, volume, baseline_7d, baseline_14d, baseline_30d,
                spike_ratio_7d, spike_ratio_14d, spike_ratio_30d,
                signal_strength, price_at_signal, detector_version
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16
            )
            ON CONFLICT (trading_pair_id, signal_timestamp, market_side) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(signal.id)
        .bind(signal.trading_pair_id)
        .bind(&signal.symbol)
        .bind(signal.market_side)
        .bind(signal.signal_timestamp)
        .bind(signal.detected_at)
        .bind(signal.volume)
        .bind(signal.baseline_7d)
        .bind(signal.baseline_14d)
        .bind(signal.baseline_30d)
        .bind(signal.spike_ratio_7d)
        .bind(signal.spike_ratio_14d)
        .bind(signal.spike_ratio_30d)
        .bind(signal.signal_strength)
        .bind(signal.price_at_signal)
        .bind(&signal.detector_version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(result)
    }

    /// Signals for `symbol` in `[from, to]`, descending by `signal_timestamp`.
    pub async fn list_signals_for_symbol(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawSignal>, StorageError> {
        let rows = sqlx::query_as::<_, RawSignal>(
            r#"
            SELECT id, trading_pair_id, pair_symbol AS symbol, market_side, signal_timestamp,
                   detected_at, volume, baseline_7d, baseline_14d, baseline_30d,
                   spike_ratio_7d, spike_ratio_14d, spike_ratio_30d,
                   signal_strength, price_at_signal, detector_version
            FROM pump.raw_signals
            WHERE pair_symbol = $1 AND signal_timestamp >= $2 AND signal_timestamp <= $3
            ORDER BY signal_timestamp DESC
            "#,
        )
        .bind(symbol)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -------------------------------------------------------------------
    // Candidates
    // -------------------------------------------------------------------

    /// Update the ACTIVE row for `candidate.symbol` if one exists, otherwise
    /// insert a fresh ACTIVE row with `first_detected_at = now`.
    pub async fn upsert_candidate(&self, candidate: &PumpCandidate) -> Result<Uuid, StorageError> {
        let existing: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM pump.pump_candidates WHERE pair_symbol = $1 AND status = 'ACTIVE'
             ORDER BY first_detected_at DESC LIMIT 1",
        )
        .bind(&candidate.symbol)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = existing {
            sqlx::query(
                r#"
                UPDATE pump.pump_candidates SET
                    last_updated_at = NOW(),
                    confidence = $2, score = $3, pattern_type = $4,
                    total_signals = $5, extreme_signals = $6, critical_window_signals = $7,
                    eta_hours = $8, is_actionable = $9, pump_phase = $10,
                    price_change_from_first = $11, price_change_24h = $12,
                    hours_since_last_pump = $13
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(candidate.confidence)
            .bind(candidate.score)
            .bind(candidate.pattern_type)
            .bind(candidate.total_signals)
            .bind(candidate.extreme_signals)
            .bind(candidate.critical_window_signals)
            .bind(candidate.eta_hours)
            .bind(candidate.is_actionable)
            .bind(candidate.pump_phase)
            .bind(candidate.price_change_from_first)
            .bind(candidate.price_change_24h)
            .bind(candidate.hours_since_last_pump)
            .execute(&self.pool)
            .await?;
            Ok(id)
        } else {
            let id: Uuid = sqlx::query_scalar(
                r#"
                INSERT INTO pump.pump_candidates (
                    id, pair_symbol, trading_pair_id, first_detected_at, last_updated_at,
                    confidence, score, pattern_type, total_signals, extreme_signals,
                    critical_window_signals, eta_hours, status, is_actionable, pump_phase,
                    price_change_from_first, price_change_24h, hours_since_last_pump
                ) VALUES (
                    $1, $2, $3, NOW(), NOW(), $4, $5, $6, $7, $8, $9, $10, 'ACTIVE', $11, $12,
                    $13, $14, $15
                )
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&candidate.symbol)
            .bind(candidate.trading_pair_id)
            .bind(candidate.confidence)
            .bind(candidate.score)
            .bind(candidate.pattern_type)
            .bind(candidate.total_signals)
            .bind(candidate.extreme_signals)
            .bind(candidate.critical_window_signals)
            .bind(candidate.eta_hours)
            .bind(candidate.is_actionable)
            .bind(candidate.pump_phase)
            .bind(candidate.price_change_from_first)
            .bind(candidate.price_change_24h)
            .bind(candidate.hours_since_last_pump)
            .fetch_one(&self.pool)
            .await?;
            Ok(id)
        }
    }

    pub async fn write_snapshot(
        &self,
        candidate_id: Uuid,
        detail: &serde_json::Value,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO pump.analysis_snapshots (candidate_id, analysis_data) VALUES ($1, $2)",
        )
        .bind(candidate_id)
        .bind(detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Transactionally delete existing links for `candidate_id` and insert
    /// the new set, so readers never observe an empty link set.
    pub async fn replace_candidate_signals(
        &self,
        candidate_id: Uuid,
        links: &[(Uuid, f64)],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM pump.candidate_signals WHERE candidate_id = $1")
            .bind(candidate_id)
            .execute(&mut *tx)
            .await?;
        for (signal_id, relevance) in links {
            sqlx::query(
                "INSERT INTO pump.candidate_signals (candidate_id, signal_id, relevance_score)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (candidate_id, signal_id) DO NOTHING",
            )
            .bind(candidate_id)
            .bind(signal_id)
            .bind(relevance)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Sets `status = EXPIRED` for ACTIVE candidates older than 7 days.
    /// Returns the number of rows touched.
    pub async fn expire_stale_candidates(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let cutoff = now - chrono::Duration::days(7);
        let result = sqlx::query(
            "UPDATE pump.pump_candidates SET status = 'EXPIRED'
             WHERE status = 'ACTIVE' AND first_detected_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Symbols eligible for analysis: pass the universe filter (applied by
    /// the caller's query composition) and carry at least `min_signals`
    /// raw signals within the last 7 days, ordered
    /// `(extreme_count DESC, total_count DESC)`.
    pub async fn select_symbols_for_analysis(
        &self,
        now: DateTime<Utc>,
        min_signals: i64,
        exchange_id: i64,
    ) -> Result<Vec<(String, i64)>, StorageError> {
        let lookback = now - chrono::Duration::days(7);
        let rows: Vec<(String, i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT rs.pair_symbol,
                   MIN(rs.trading_pair_id) AS trading_pair_id,
                   COUNT(*) AS signal_count,
                   COUNT(*) FILTER (WHERE rs.signal_strength = 'EXTREME') AS extreme_count
            FROM pump.raw_signals rs
            INNER JOIN trading_pairs tp ON rs.trading_pair_id = tp.id
            WHERE rs.signal_timestamp >= $1
              AND tp.is_active = true
              AND tp.exchange_id = $2
            GROUP BY rs.pair_symbol
            HAVING COUNT(*) >= $3
            ORDER BY extreme_count DESC, signal_count DESC
            "#,
        )
        .bind(lookback)
        .bind(exchange_id)
        .bind(min_signals)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(symbol, trading_pair_id, _, _)| (symbol, trading_pair_id))
            .collect())
    }

    pub async fn list_active_candidates_high_confidence(
        &self,
    ) -> Result<Vec<PumpCandidate>, StorageError> {
        let rows = sqlx::query_as::<_, PumpCandidate>(
            r#"
            SELECT id, pair_symbol AS symbol, trading_pair_id, first_detected_at, last_updated_at,
                   confidence, score, pattern_type, total_signals, extreme_signals,
                   critical_window_signals, eta_hours, is_actionable, pump_phase,
                   price_change_from_first, price_change_24h, hours_since_last_pump,
                   status, actual_price, price_updated_at
            FROM pump.pump_candidates
            WHERE status = 'ACTIVE' AND confidence = 'HIGH'
            ORDER BY score DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_known_pumps(&self) -> Result<Vec<KnownPumpEvent>, StorageError> {
        let rows = sqlx::query_as::<_, KnownPumpEvent>(
            r#"
            SELECT id, trading_pair_id, pair_symbol AS symbol, pump_start, start_price,
                   high_price, price_after_24h, max_gain_24h, pump_duration_hours
            FROM pump.known_pump_events
            ORDER BY pump_start
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn write_backtest_result(&self, row: &BacktestResult) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO pump.backtest_results (
                known_pump_id, hours_before_pump, analysis_time, was_detected, confidence,
                score, pattern_type, is_actionable, total_signals, extreme_signals,
                critical_window_signals, classification, config_snapshot
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (known_pump_id, hours_before_pump) DO UPDATE SET
                analysis_time = EXCLUDED.analysis_time,
                was_detected = EXCLUDED.was_detected,
                confidence = EXCLUDED.confidence,
                score = EXCLUDED.score,
                pattern_type = EXCLUDED.pattern_type,
                is_actionable = EXCLUDED.is_actionable,
                total_signals = EXCLUDED.total_signals,
                extreme_signals = EXCLUDED.extreme_signals,
                critical_window_signals = EXCLUDED.critical_window_signals,
                classification = EXCLUDED.classification,
                config_snapshot = EXCLUDED.config_snapshot
            "#,
        )
        .bind(row.known_pump_id)
        .bind(row.hours_before_pump)
        .bind(row.analysis_time)
        .bind(row.was_detected)
        .bind(row.confidence)
        .bind(row.score)
        .bind(row.pattern_type)
        .bind(row.is_actionable)
        .bind(row.total_signals)
        .bind(row.extreme_signals)
        .bind(row.critical_window_signals)
        .bind(row.classification)
        .bind(&row.config_snapshot)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear_backtest_results(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM pump.backtest_results")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// The most recent known pump strictly at or before `t`, or `None`.
    pub async fn last_known_pump_before(
        &self,
        symbol: &str,
        t: DateTime<Utc>,
    ) -> Result<Option<LastPumpInfo>, StorageError> {
        let row: Option<(DateTime<Utc>, Decimal)> = sqlx::query_as(
            r#"
            SELECT pump_start, start_price FROM pump.known_pump_events
            WHERE pair_symbol = $1 AND pump_start <= $2
            ORDER BY pump_start DESC LIMIT 1
            "#,
        )
        .bind(symbol)
        .bind(t)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(pump_start, start_price)| LastPumpInfo {
            pump_start,
            start_price: start_price.to_f64().unwrap_or(0.0),
        }))
    }

    /// The `n` latest closed candles for `(trading_pair_id, interval_id)`,
    /// descending by `open_time_ms`. May return fewer than `n`.
    pub async fn get_latest_candles(
        &self,
        trading_pair_id: i64,
        interval_id: i32,
        n: i64,
    ) -> Result<Vec<Candle>, StorageError> {
        let rows = sqlx::query_as::<_, Candle>(
            r#"
            SELECT trading_pair_id, interval_id, open_time_ms, open, high, low, close,
                   quote_volume, is_closed
            FROM candles
            WHERE trading_pair_id = $1 AND interval_id = $2 AND is_closed = true
            ORDER BY open_time_ms DESC
            LIMIT $3
            "#,
        )
        .bind(trading_pair_id)
        .bind(interval_id)
        .bind(n)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Resolve a trading pair id for `symbol` on `exchange_id` with the
    /// given `market_side`, restricted to USDT-quoted symbols per the
    /// naive base-asset split used by the breakout watcher.
    pub async fn trading_pair_id_for(
        &self,
        symbol: &str,
        exchange_id: i64,
        side: MarketSide,
    ) -> Result<Option<i64>, StorageError> {
        let contract_type_id = match side {
            MarketSide::Futures => 1,
            MarketSide::Spot => 2,
        };
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM trading_pairs WHERE symbol = $1 AND exchange_id = $2
             AND contract_type_id = $3 AND is_active = true LIMIT 1",
        )
        .bind(symbol)
        .bind(exchange_id)
        .bind(contract_type_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    /// Self-join of same-timestamp EXTREME signals across spot and
    /// futures, where at least one side was detected within `lookback`.
    pub async fn find_extreme_co_occurrences(
        &self,
        now: DateTime<Utc>,
        lookback: chrono::Duration,
    ) -> Result<Vec<(RawSignal, RawSignal)>, StorageError> {
        let cutoff = now - lookback;
        let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            SELECT s.id AS spot_id, f.id AS futures_id
            FROM pump.raw_signals s
            JOIN pump.raw_signals f
                ON s.pair_symbol = f.pair_symbol
               AND s.signal_timestamp = f.signal_timestamp
            WHERE s.market_side = 'SPOT' AND f.market_side = 'FUTURES'
              AND s.signal_strength = 'EXTREME' AND f.signal_strength = 'EXTREME'
              AND (s.detected_at >= $1 OR f.detected_at >= $1)
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for (spot_id, futures_id) in rows {
            let spot = self.fetch_signal(spot_id).await?;
            let futures = self.fetch_signal(futures_id).await?;
            if let (Some(spot), Some(futures)) = (spot, futures) {
                out.push((spot, futures));
            }
        }
        Ok(out)
    }

    // -------------------------------------------------------------------
    // Universe scan
    // -------------------------------------------------------------------

    /// One candle whose volume cleared the 7-day baseline threshold,
    /// carrying enough of the neighboring baselines to classify strength.
    pub async fn scan_volume_anomalies(
        &self,
        side: MarketSide,
        exchange_id: i64,
        interval_id: i32,
        market_cap_floor: f64,
        window_start_ms: i64,
        window_end_ms: i64,
        min_spike_ratio: f64,
    ) -> Result<Vec<AnomalyRow>, StorageError> {
        let contract_type_id = match side {
            MarketSide::Futures => 1,
            MarketSide::Spot => 2,
        };
        let rows = sqlx::query_as::<_, AnomalyRow>(
            r#"
            WITH filtered AS (
                SELECT
                    c.trading_pair_id,
                    tp.symbol,
                    c.open_time_ms,
                    c.close,
                    c.quote_volume,
                    AVG(c.quote_volume) OVER (
                        PARTITION BY c.trading_pair_id ORDER BY c.open_time_ms
                        ROWS BETWEEN 42 PRECEDING AND 1 PRECEDING
                    ) AS baseline_7d,
                    AVG(c.quote_volume) OVER (
                        PARTITION BY c.trading_pair_id ORDER BY c.open_time_ms
                        ROWS BETWEEN 84 PRECEDING AND 1 PRECEDING
                    ) AS baseline_14d,
                    AVG(c.quote_volume) OVER (
                        PARTITION BY c.trading_pair_id ORDER BY c.open_time_ms
                        ROWS BETWEEN 180 PRECEDING AND 1 PRECEDING
                    ) AS baseline_30d
                FROM candles c
                JOIN trading_pairs tp ON tp.id = c.trading_pair_id
                WHERE c.interval_id = $1
                  AND c.is_closed = true
                  AND tp.exchange_id = $2
                  AND tp.is_active = true
                  AND tp.contract_type_id = $3
                  AND NOT is_meme_coin(tp.id)
                  AND EXISTS (
                      SELECT 1 FROM tokens t
                      JOIN cmc_crypto cc ON cc.token_id = t.id
                      WHERE t.id = tp.token_id AND cc.market_cap >= $4
                  )
                  AND c.open_time_ms >= $5
                  AND c.open_time_ms <= $6
            )
            SELECT trading_pair_id, symbol, open_time_ms, close, quote_volume,
                   baseline_7d, baseline_14d, baseline_30d
            FROM filtered
            WHERE baseline_7d IS NOT NULL AND baseline_7d > 0
              AND quote_volume / baseline_7d >= $7
            ORDER BY trading_pair_id, open_time_ms
            "#,
        )
        .bind(interval_id)
        .bind(exchange_id)
        .bind(contract_type_id)
        .bind(market_cap_floor)
        .bind(window_start_ms)
        .bind(window_end_ms)
        .bind(min_spike_ratio)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn fetch_signal(&self, id: Uuid) -> Result<Option<RawSignal>, StorageError> {
        let row = sqlx::query_as::<_, RawSignal>(
            r#"
            SELECT id, trading_pair_id, pair_symbol AS symbol, market_side, signal_timestamp,
                   detected_at, volume, baseline_7d, baseline_14d, baseline_30d,
                   spike_ratio_7d, spike_ratio_14d, spike_ratio_30d,
                   signal_strength, price_at_signal, detector_version
            FROM pump.raw_signals WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
