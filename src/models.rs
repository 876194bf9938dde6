// =============================================================================
// Typed records for the pump schema and its external, read-only neighbors
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{
    CandidateStatus, Classification, Confidence, MarketSide, PatternType, PumpPhase,
    SignalStrength,
};

/// External, read-only trading pair row.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TradingPair {
    pub id: i64,
    pub symbol: String,
    pub exchange_id: i64,
    pub contract_type_id: i32,
    pub is_active: bool,
    pub token_id: i64,
}

/// External, read-only OHLCV candle.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Candle {
    pub trading_pair_id: i64,
    pub interval_id: i32,
    pub open_time_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub quote_volume: Decimal,
    pub is_closed: bool,
}

/// One anomalous volume bucket for a `(pair, timestamp, market side)` triple.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct RawSignal {
    pub id: Uuid,
    pub trading_pair_id: i64,
    pub symbol: String,
    pub market_side: MarketSide,
    pub signal_timestamp: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
    pub volume: Decimal,
    pub baseline_7d: Option<Decimal>,
    pub baseline_14d: Option<Decimal>,
    pub baseline_30d: Option<Decimal>,
    pub spike_ratio_7d: f64,
    pub spike_ratio_14d: f64,
    pub spike_ratio_30d: f64,
    pub signal_strength: SignalStrength,
    pub price_at_signal: Decimal,
    pub detector_version: String,
}

/// Current aggregate judgment about a symbol.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct PumpCandidate {
    pub id: Uuid,
    pub symbol: String,
    pub trading_pair_id: i64,
    pub first_detected_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub confidence: Confidence,
    pub score: Decimal,
    pub pattern_type: PatternType,
    pub total_signals: i32,
    pub extreme_signals: i32,
    pub critical_window_signals: i32,
    pub eta_hours: Option<i32>,
    pub is_actionable: bool,
    pub pump_phase: PumpPhase,
    pub price_change_from_first: f64,
    pub price_change_24h: f64,
    pub hours_since_last_pump: Option<f64>,
    pub status: CandidateStatus,
    pub actual_price: Option<Decimal>,
    pub price_updated_at: Option<DateTime<Utc>>,
}

/// Link row for `candidate_signals`: `(candidate_id, signal_id, relevance_score)`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CandidateSignal {
    pub candidate_id: Uuid,
    pub signal_id: Uuid,
    pub relevance_score: f64,
}

/// Immutable labeled corpus entry used as backtester input.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct KnownPumpEvent {
    pub id: Uuid,
    pub trading_pair_id: i64,
    pub symbol: String,
    pub pump_start: DateTime<Utc>,
    pub start_price: Decimal,
    pub high_price: Decimal,
    pub price_after_24h: Decimal,
    pub max_gain_24h: f64,
    pub pump_duration_hours: i32,
}

/// One time-travel classification row written by the backtester.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BacktestResult {
    pub known_pump_id: Uuid,
    pub hours_before_pump: i32,
    pub analysis_time: DateTime<Utc>,
    pub was_detected: bool,
    pub confidence: Option<Confidence>,
    pub score: Option<Decimal>,
    pub pattern_type: Option<PatternType>,
    pub is_actionable: bool,
    pub total_signals: i32,
    pub extreme_signals: i32,
    pub critical_window_signals: i32,
    pub classification: Classification,
    pub config_snapshot: serde_json::Value,
}

/// Last known pump event strictly before a given timestamp, as consulted by
/// the engine's pump-phase step.
#[derive(Debug, Clone, Copy)]
pub struct LastPumpInfo {
    pub pump_start: DateTime<Utc>,
    pub start_price: f64,
}

/// Per-factor detail persisted verbatim as an `AnalysisSnapshot`.
///
/// This is the audit trail for a single `DetectionEngine::analyze` call —
/// never read back by the core, only written and later inspected by humans
/// or the dashboard collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisDetail {
    pub symbol: String,
    pub as_of: DateTime<Utc>,
    pub weights: FactorWeights,
    pub raw_scores: FactorRawScores,
    pub score: f64,
    pub strength_histogram: StrengthHistogram,
    pub market_side_histogram: MarketSideHistogram,
    pub critical_window_signals: i32,
    pub extreme_signals: i32,
    pub total_signals: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FactorWeights {
    pub signal_count: f64,
    pub time_distribution: f64,
    pub signal_strength: f64,
    pub escalation: f64,
    pub spot_futures_balance: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FactorRawScores {
    pub f1_signal_count: f64,
    pub f2_time_distribution: f64,
    pub f3_signal_strength: f64,
    pub f4_escalation: f64,
    pub f5_balance: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StrengthHistogram {
    pub extreme: i32,
    pub very_strong: i32,
    pub strong: i32,
    pub medium: i32,
    pub weak: i32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MarketSideHistogram {
    pub spot: i32,
    pub futures: i32,
}
