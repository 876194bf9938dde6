// =============================================================================
// Detection Engine — multi-factor scoring and pump-phase classification
// =============================================================================
//
// Pure over its inputs: `analyze` takes a signal slice and a last-pump
// lookup as plain arguments rather than a `Store` handle, so it stays
// synchronously testable and deterministic for backtest reproducibility.
// Weights and thresholds are loaded once at construction from
// `pump.detector_config` (see `EngineConfig::from_store`).
// =============================================================================

use chrono::{DateTime, Utc};

use crate::models::{
    AnalysisDetail, FactorRawScores, FactorWeights, MarketSideHistogram, PumpCandidate, RawSignal,
    StrengthHistogram,
};
use crate::store::Store;
use crate::types::{CandidateStatus, Confidence, MarketSide, PatternType, PumpPhase, SignalStrength};

/// The empirically observed mean signal count across actionable pumps.
/// Part of the scoring model, not a tunable — see the model's F1 factor.
const SIGNAL_COUNT_DENOMINATOR: f64 = 16.44;

/// Weights, thresholds, and critical-window bounds for the scoring model.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub min_signal_count: usize,
    pub high_conf_threshold: f64,
    pub medium_conf_threshold: f64,
    pub extreme_threshold: f64,
    pub very_strong_threshold: f64,
    pub strong_threshold: f64,
    pub medium_threshold: f64,
    pub critical_window_min_signals: i32,
    pub weight_signal_count: f64,
    pub weight_time_distribution: f64,
    pub weight_signal_strength: f64,
    pub weight_escalation: f64,
    pub weight_spot_futures: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_signal_count: 10,
            high_conf_threshold: 75.0,
            medium_conf_threshold: 50.0,
            extreme_threshold: 5.0,
            very_strong_threshold: 3.0,
            strong_threshold: 2.0,
            medium_threshold: 1.5,
            critical_window_min_signals: 4,
            weight_signal_count: 0.40,
            weight_time_distribution: 0.25,
            weight_signal_strength: 0.20,
            weight_escalation: 0.10,
            weight_spot_futures: 0.05,
        }
    }
}

impl EngineConfig {
    /// Load overrides from `pump.detector_config`, falling back to the
    /// code-side defaults above for anything absent — per the redesign
    /// note consolidating defaults to code with DB override.
    pub async fn from_store(store: &Store) -> Result<Self, crate::error::StorageError> {
        let d = Self::default();
        Ok(Self {
            min_signal_count: store
                .get_config_i32("min_signal_count", d.min_signal_count as i32)
                .await? as usize,
            high_conf_threshold: store
                .get_config_f64("high_confidence_threshold", d.high_conf_threshold)
                .await?,
            medium_conf_threshold: store
                .get_config_f64("medium_confidence_threshold", d.medium_conf_threshold)
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
            medium_threshold: d.medium_threshold,
            critical_window_min_signals: store
                .get_config_i32(
                    "critical_window_min_signals",
                    d.critical_window_min_signals,
                )
                .await?,
            weight_signal_count: store
                .get_config_f64("weight_signal_count", d.weight_signal_count)
                .await?,
            weight_time_distribution: store
                .get_config_f64("weight_time_distribution", d.weight_time_distribution)
                .await?,
            weight_signal_strength: store
                .get_config_f64("weight_signal_strength", d.weight_signal_strength)
                .await?,
            weight_escalation: store
                .get_config_f64("weight_escalation", d.weight_escalation)
                .await?,
            weight_spot_futures: store
                .get_config_f64("weight_spot_futures_balance", d.weight_spot_futures)
                .await?,
        })
    }
}

/// Detail object returned alongside a candidate, persisted verbatim as the
/// analysis snapshot.
pub struct AnalysisOutput {
    pub candidate: PumpCandidate,
    pub detail: AnalysisDetail,
}

pub struct DetectionEngine {
    config: EngineConfig,
}

impl DetectionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// `Analyze(symbol, as_of_time)`. Pure function of `signals`,
    /// `last_pump`, and `self.config`. Returns `None` when the signal count
    /// gate fails or the score falls below `medium_conf_threshold`.
    pub fn analyze(
        &self,
        symbol: &str,
        trading_pair_id: i64,
        signals: &[RawSignal],
        last_pump: Option<(DateTime<Utc>, f64)>,
        as_of: DateTime<Utc>,
    ) -> Option<AnalysisOutput> {
        if signals.len() < self.config.min_signal_count {
            return None;
        }

        let extreme_count = signals
            .iter()
            .filter(|s| s.signal_strength == SignalStrength::Extreme)
            .count() as i32;
        let very_strong_count = signals
            .iter()
            .filter(|s| s.signal_strength == SignalStrength::VeryStrong)
            .count() as i32;
        let strong_count = signals
            .iter()
            .filter(|s| s.signal_strength == SignalStrength::Strong)
            .count() as i32;
        let total = signals.len() as i32;

        let f1 = (total as f64 / SIGNAL_COUNT_DENOMINATOR * 100.0).min(100.0);
        let (f2, critical_window_signals) = self.time_distribution(signals, as_of);
        let f3 = Self::signal_strength_score(extreme_count, very_strong_count, strong_count, total);
        let f4 = Self::escalation_score(signals);
        let f5 = Self::balance_score(signals);

        let weights = FactorWeights {
            signal_count: self.config.weight_signal_count,
            time_distribution: self.config.weight_time_distribution,
            signal_strength: self.config.weight_signal_strength,
            escalation: self.config.weight_escalation,
            spot_futures_balance: self.config.weight_spot_futures,
        };

        let score = (f1 * weights.signal_count
            + f2 * weights.time_distribution
            + f3 * weights.signal_strength
            + f4 * weights.escalation
            + f5 * weights.spot_futures_balance)
            .clamp(0.0, 100.0);
        let score = (score * 100.0).round() / 100.0;

        if score < self.config.medium_conf_threshold {
            return None;
        }

        let confidence = if score >= self.config.high_conf_threshold {
            Confidence::High
        } else {
            Confidence::Medium
        };

        let pattern_type = Self::pattern_type(
            extreme_count,
            critical_window_signals,
            score,
            total,
        );
        let eta_hours = Self::eta_hours(critical_window_signals, score);
        let is_actionable =
            confidence == Confidence::High && critical_window_signals >= self.config.critical_window_min_signals;

        let (pump_phase, price_change_from_first, price_change_24h, hours_since_last_pump) =
            self.pump_phase(signals, last_pump, as_of);

        let raw_scores = FactorRawScores {
            f1_signal_count: round2(f1),
            f2_time_distribution: round2(f2),
            f3_signal_strength: round2(f3),
            f4_escalation: round2(f4),
            f5_balance: round2(f5),
        };

        let mut strength_histogram = StrengthHistogram::default();
        let mut market_side_histogram = MarketSideHistogram::default();
        for s in signals {
            match s.signal_strength {
                SignalStrength::Extreme => strength_histogram.extreme += 1,
                SignalStrength::VeryStrong => strength_histogram.very_strong += 1,
                SignalStrength::Strong => strength_histogram.strong += 1,
                SignalStrength::Medium => strength_histogram.medium += 1,
                SignalStrength::Weak => strength_histogram.weak += 1,
            }
            match s.market_side {
                MarketSide::Spot => market_side_histogram.spot += 1,
                MarketSide::Futures => market_side_histogram.futures += 1,
            }
        }

        let detail = AnalysisDetail {
            symbol: symbol.to_string(),
            as_of,
            weights,
            raw_scores,
            score,
            strength_histogram,
            market_side_histogram,
            critical_window_signals,
            extreme_signals: extreme_count,
            total_signals: total,
        };

        let candidate = PumpCandidate {
            id: uuid::Uuid::nil(),
            symbol: symbol.to_string(),
            trading_pair_id,
            first_detected_at: as_of,
            last_updated_at: as_of,
            confidence,
            score: rust_decimal::Decimal::try_from(score).unwrap_or_default(),
            pattern_type,
            total_signals: total,
            extreme_signals: extreme_count,
            critical_window_signals,
            eta_hours,
            is_actionable,
            pump_phase,
            price_change_from_first,
            price_change_24h,
            hours_since_last_pump,
            status: CandidateStatus::Active,
            actual_price: None,
            price_updated_at: None,
        };

        Some(AnalysisOutput { candidate, detail })
    }

    /// F2: partition by hours-before-`as_of` into the six buckets and score
    /// from the 48-72h critical-window count.
    fn time_distribution(&self, signals: &[RawSignal], as_of: DateTime<Utc>) -> (f64, i32) {
        let mut b_0_24 = 0i32;
        let mut b_24_48 = 0i32;
        let mut b_48_72 = 0i32;

        for s in signals {
            let hours_ago = (as_of - s.signal_timestamp).num_seconds() as f64 / 3600.0;
            if hours_ago <= 24.0 {
                b_0_24 += 1;
            } else if hours_ago <= 48.0 {
                b_24_48 += 1;
            } else if hours_ago <= 72.0 {
                b_48_72 += 1;
            }
        }

        let critical = b_48_72;
        let score = if critical >= 5 {
            100.0
        } else if critical >= 4 {
            90.0
        } else if critical >= 3 {
            70.0
        } else if critical >= 2 {
            50.0
        } else if critical >= 1 {
            30.0
        } else {
            (5.0 * (b_0_24 + b_24_48) as f64).min(40.0)
        };
        (score, critical)
    }

    /// F3: strength-weighted ratio plus an EXTREME-count bonus.
    fn signal_strength_score(extreme: i32, very_strong: i32, strong: i32, total: i32) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let weighted = (extreme * 3 + very_strong * 2 + strong) as f64;
        let max_possible = (total * 3) as f64;
        let mut score = (weighted / max_possible) * 100.0;
        if extreme >= 3 {
            score = (score + 20.0).min(100.0);
        } else if extreme >= 2 {
            score = (score + 10.0).min(100.0);
        }
        score
    }

    /// F4: density ratio of the second half of the (time-sorted) signal
    /// set against the first half.
    fn escalation_score(signals: &[RawSignal]) -> f64 {
        if signals.len() < 3 {
            return 50.0;
        }
        let mut times: Vec<DateTime<Utc>> = signals.iter().map(|s| s.signal_timestamp).collect();
        times.sort();

        let mid = times.len() / 2;
        let first_half = &times[..mid];
        let second_half = &times[mid..];

        let density = |half: &[DateTime<Utc>]| -> f64 {
            if half.is_empty() {
                return 0.0;
            }
            let duration_hours =
                ((*half.last().unwrap() - *half.first().unwrap()).num_seconds() as f64 / 3600.0)
                    .max(1.0);
            half.len() as f64 / duration_hours
        };

        let first_density = density(first_half);
        let second_density = density(second_half);

        let ratio = if first_density > 0.0 {
            second_density / first_density
        } else {
            1.0
        };

        if ratio >= 2.0 {
            100.0
        } else if ratio >= 1.5 {
            80.0
        } else if ratio >= 1.0 {
            60.0
        } else {
            40.0
        }
    }

    /// F5: presence/balance of SPOT vs FUTURES signals.
    fn balance_score(signals: &[RawSignal]) -> f64 {
        let spot = signals
            .iter()
            .filter(|s| s.market_side == MarketSide::Spot)
            .count();
        let futures = signals
            .iter()
            .filter(|s| s.market_side == MarketSide::Futures)
            .count();
        let total = spot + futures;
        if total == 0 {
            return 0.0;
        }
        if spot > 0 && futures > 0 {
            let ratio = spot.min(futures) as f64 / spot.max(futures) as f64;
            50.0 + ratio * 50.0
        } else {
            30.0
        }
    }

    fn pattern_type(extreme: i32, critical_window: i32, score: f64, total: i32) -> PatternType {
        if extreme >= 2 && critical_window >= 4 {
            PatternType::ExtremePrecursor
        } else if extreme >= 1 && critical_window >= 3 {
            PatternType::StrongPrecursor
        } else if score >= 60.0 && total >= 12 {
            PatternType::MediumPrecursor
        } else {
            PatternType::EarlyPattern
        }
    }

    fn eta_hours(critical_window: i32, score: f64) -> Option<i32> {
        if critical_window >= 5 {
            Some(48)
        } else if critical_window >= 3 {
            Some(60)
        } else if critical_window >= 1 {
            Some(72)
        } else if score >= 70.0 {
            Some(96)
        } else {
            None
        }
    }

    /// Step 6: pump-phase classification from price movement and the
    /// last-known-pump lookup.
    fn pump_phase(
        &self,
        signals: &[RawSignal],
        last_pump: Option<(DateTime<Utc>, f64)>,
        as_of: DateTime<Utc>,
    ) -> (PumpPhase, f64, f64, Option<f64>) {
        let hours_since_last_pump = last_pump
            .map(|(pump_start, _)| (as_of - pump_start).num_seconds() as f64 / 3600.0);

        let mut by_time: Vec<&RawSignal> = signals.iter().collect();
        by_time.sort_by_key(|s| s.signal_timestamp);

        if by_time.is_empty() {
            return (PumpPhase::EarlySignal, 0.0, 0.0, hours_since_last_pump);
        }

        let current_price = rust_decimal_to_f64(by_time.last().unwrap().price_at_signal);

        let base_price = match last_pump {
            Some((_, start_price)) if start_price > 0.0 => start_price,
            _ => rust_decimal_to_f64(by_time.first().unwrap().price_at_signal),
        };

        let price_change_from_first = if base_price > 0.0 {
            (current_price - base_price) / base_price * 100.0
        } else {
            0.0
        };

        let cutoff_24h = as_of - chrono::Duration::hours(24);
        let price_24h_ago = by_time
            .iter()
            .rev()
            .find(|s| s.signal_timestamp <= cutoff_24h)
            .map(|s| rust_decimal_to_f64(s.price_at_signal));

        let price_change_24h = match price_24h_ago {
            Some(p) if p > 0.0 => (current_price - p) / p * 100.0,
            _ => price_change_from_first,
        };

        let phase = Self::classify_pump_phase(
            price_change_from_first,
            price_change_24h,
            hours_since_last_pump,
        );

        (
            phase,
            round2(price_change_from_first),
            round2(price_change_24h),
            hours_since_last_pump,
        )
    }

    fn classify_pump_phase(
        price_from_first: f64,
        price_24h: f64,
        hours_since_pump: Option<f64>,
    ) -> PumpPhase {
        if price_from_first > 15.0 {
            if let Some(h) = hours_since_pump {
                if h < 72.0 && price_24h < 5.0 {
                    return PumpPhase::PostPumpCooling;
                }
            }
        }
        if let Some(h) = hours_since_pump {
            if h > 168.0 && price_24h > 10.0 {
                return PumpPhase::SecondWavePotential;
            }
        }
        PumpPhase::EarlySignal
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn rust_decimal_to_f64(d: rust_decimal::Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    d.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalStrength;
    use chrono::TimeZone;

    fn ts(hours_ago: i64, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::hours(hours_ago)
    }

    fn signal(
        symbol: &str,
        hours_ago: i64,
        now: DateTime<Utc>,
        strength: SignalStrength,
        side: MarketSide,
        price: f64,
    ) -> RawSignal {
        RawSignal {
            id: uuid::Uuid::new_v4(),
            trading_pair_id: 1,
            symbol: symbol.to_string(),
            market_side: side,
            signal_timestamp: ts(hours_ago, now),
            detected_at: ts(hours_ago, now),
            volume: rust_decimal::Decimal::new(1000, 0),
            baseline_7d: Some(rust_decimal::Decimal::new(100, 0)),
            baseline_14d: Some(rust_decimal::Decimal::new(100, 0)),
            baseline_30d: Some(rust_decimal::Decimal::new(100, 0)),
            spike_ratio_7d: 5.0,
            spike_ratio_14d: 5.0,
            spike_ratio_30d: 5.0,
            signal_strength: strength,
            price_at_signal: rust_decimal::Decimal::try_from(price).unwrap(),
            detector_version: "2.0".to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn s1_minimum_signals_gate() {
        let now = now();
        let engine = DetectionEngine::new(EngineConfig::default());
        let signals: Vec<RawSignal> = (0..9)
            .map(|i| signal("ABCUSDT", i * 10, now, SignalStrength::Strong, MarketSide::Spot, 1.0))
            .collect();
        let result = engine.analyze("ABCUSDT", 1, &signals, None, now);
        assert!(result.is_none());
    }

    #[test]
    fn s2_high_actionable() {
        let now = now();
        let engine = DetectionEngine::new(EngineConfig::default());
        let mut signals = Vec::new();
        for h in [56, 60, 64] {
            signals.push(signal(
                "XYZUSDT", h, now, SignalStrength::Extreme, MarketSide::Spot, 1.2,
            ));
        }
        for (i, h) in [50, 58, 62, 70].into_iter().enumerate() {
            let side = if i % 2 == 0 { MarketSide::Spot } else { MarketSide::Futures };
            signals.push(signal("XYZUSDT", h, now, SignalStrength::VeryStrong, side, 1.1));
        }
        for (i, h) in [5, 10, 20, 30, 40, 45].into_iter().enumerate() {
            let side = if i % 2 == 0 { MarketSide::Spot } else { MarketSide::Futures };
            signals.push(signal("XYZUSDT", h, now, SignalStrength::Strong, side, 1.0));
        }
        for h in [80, 100, 115] {
            signals.push(signal(
                "XYZUSDT", h, now, SignalStrength::Medium, MarketSide::Futures, 0.95,
            ));
        }

        assert_eq!(signals.len(), 16);
        let result = engine
            .analyze("XYZUSDT", 1, &signals, None, now)
            .expect("expected a candidate");

        assert_eq!(result.candidate.total_signals, 16);
        assert_eq!(result.candidate.extreme_signals, 3);
        assert!(result.candidate.critical_window_signals >= 4);
        assert_eq!(result.candidate.confidence, Confidence::High);
        assert_eq!(result.candidate.pattern_type, PatternType::ExtremePrecursor);
        assert!(result.candidate.is_actionable);
        assert_eq!(result.candidate.eta_hours, Some(60));
    }

    #[test]
    fn s3_post_pump_cooling() {
        let now = now();
        let engine = DetectionEngine::new(EngineConfig::default());
        let mut signals = Vec::new();
        for h in [56, 60, 64] {
            signals.push(signal(
                "XYZUSDT", h, now, SignalStrength::Extreme, MarketSide::Spot, 1.24,
            ));
        }
        for (i, h) in [50, 58, 62, 70].into_iter().enumerate() {
            let side = if i % 2 == 0 { MarketSide::Spot } else { MarketSide::Futures };
            signals.push(signal("XYZUSDT", h, now, SignalStrength::VeryStrong, side, 1.24));
        }
        for (i, h) in [5, 10, 20, 30, 40, 45].into_iter().enumerate() {
            let side = if i % 2 == 0 { MarketSide::Spot } else { MarketSide::Futures };
            signals.push(signal("XYZUSDT", h, now, SignalStrength::Strong, side, 1.25));
        }
        for h in [80, 100, 115] {
            signals.push(signal(
                "XYZUSDT", h, now, SignalStrength::Medium, MarketSide::Futures, 1.24,
            ));
        }

        let last_pump = Some((now - chrono::Duration::hours(48), 1.00));
        let result = engine
            .analyze("XYZUSDT", 1, &signals, last_pump, now)
            .expect("expected a candidate");

        assert!((result.candidate.price_change_from_first - 25.0).abs() < 0.5);
        assert!(result.candidate.price_change_24h < 5.0);
        assert_eq!(result.candidate.pump_phase, PumpPhase::PostPumpCooling);
    }

    #[test]
    fn boundary_score_exactly_at_thresholds() {
        assert_eq!(
            if 75.00 >= 75.0 { Confidence::High } else { Confidence::Medium },
            Confidence::High
        );
        assert_eq!(
            if 74.99 >= 75.0 { Confidence::High } else { Confidence::Medium },
            Confidence::Medium
        );
    }

    #[test]
    fn critical_window_boundary_gates_actionable() {
        let cfg = EngineConfig::default();
        assert!(4 >= cfg.critical_window_min_signals);
        assert!(!(3 >= cfg.critical_window_min_signals));
    }

    #[test]
    fn determinism_same_input_same_output() {
        let now = now();
        let engine = DetectionEngine::new(EngineConfig::default());
        let signals: Vec<RawSignal> = (0..16)
            .map(|i| signal("DETUSDT", i * 5, now, SignalStrength::Strong, MarketSide::Spot, 1.0))
            .collect();
        let r1 = engine.analyze("DETUSDT", 1, &signals, None, now);
        let r2 = engine.analyze("DETUSDT", 1, &signals, None, now);
        match (r1, r2) {
            (Some(a), Some(b)) => {
                assert_eq!(a.candidate.score, b.candidate.score);
                assert_eq!(a.candidate.confidence, b.candidate.confidence);
                assert_eq!(a.candidate.pattern_type, b.candidate.pattern_type);
            }
            (None, None) => {}
            _ => panic!("nondeterministic result"),
        }
    }
}
