// =============================================================================
// Backtester — time-travel replay against the known-pump corpus
// =============================================================================
//
// For each known pump, the engine is re-run as of several fixed offsets
// before the actual pump start, using only signals that existed at that
// point in time. This is the only caller that reruns the engine against
// historical `as_of` values rather than `now`.
// =============================================================================

use std::collections::BTreeMap;

use chrono::Duration;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::engine::DetectionEngine;
use crate::error::PumpError;
use crate::models::{BacktestResult, KnownPumpEvent};
use crate::store::Store;
use crate::types::Classification;

/// Hours before each known pump's start at which the engine is replayed.
pub const TEST_WINDOWS_HOURS: [i64; 5] = [72, 60, 48, 36, 24];

pub struct Backtester {
    store: Store,
    engine: DetectionEngine,
}

impl Backtester {
    pub fn new(store: Store, engine: DetectionEngine) -> Self {
        Self { store, engine }
    }

    /// Clears prior results and replays every known pump at every test
    /// window, writing one `BacktestResult` row per `(pump, window)` pair.
    /// Returns the rows written, for the caller to aggregate and report.
    pub async fn run_full_backtest(&self) -> Result<Vec<BacktestResult>, PumpError> {
        self.store.clear_backtest_results().await?;

        let known_pumps = self.store.list_known_pumps().await?;
        let mut results = Vec::new();

        for pump in &known_pumps {
            for hours_before in TEST_WINDOWS_HOURS {
                let result = self.replay_one(pump, hours_before).await?;
                self.store.write_backtest_result(&result).await?;
                results.push(result);
            }
        }

        Ok(results)
    }

    async fn replay_one(
        &self,
        pump: &KnownPumpEvent,
        hours_before: i64,
    ) -> Result<BacktestResult, PumpError> {
        let as_of = pump.pump_start - Duration::hours(hours_before);
        let lookback_start = as_of - Duration::days(7);

        let signals = self
            .store
            .list_signals_for_symbol(&pump.symbol, lookback_start, as_of)
            .await?;

        let last_pump = self
            .store
            .last_known_pump_before(&pump.symbol, as_of)
            .await?
            .map(|p| (p.pump_start, p.start_price));

        let output = self
            .engine
            .analyze(&pump.symbol, pump.trading_pair_id, &signals, last_pump, as_of);

        let config_snapshot = serde_json::json!({
            "hours_before_pump": hours_before,
            "as_of": as_of,
        });

        Ok(match output {
            Some(out) => BacktestResult {
                known_pump_id: pump.id,
                hours_before_pump: hours_before as i32,
                analysis_time: as_of,
                was_detected: true,
                confidence: Some(out.candidate.confidence),
                score: Some(out.candidate.score),
                pattern_type: Some(out.candidate.pattern_type),
                is_actionable: out.candidate.is_actionable,
                total_signals: out.candidate.total_signals,
                extreme_signals: out.candidate.extreme_signals,
                critical_window_signals: out.candidate.critical_window_signals,
                classification: Classification::Tp,
                config_snapshot,
            },
            None => BacktestResult {
                known_pump_id: pump.id,
                hours_before_pump: hours_before as i32,
                analysis_time: as_of,
                was_detected: false,
                confidence: None,
                score: None,
                pattern_type: None,
                is_actionable: false,
                total_signals: signals.len() as i32,
                extreme_signals: signals
                    .iter()
                    .filter(|s| s.signal_strength == crate::types::SignalStrength::Extreme)
                    .count() as i32,
                critical_window_signals: 0,
                classification: Classification::Fn_,
                config_snapshot,
            },
        })
    }
}

// Every replay targets a window preceding a *real* pump, so there is no
// negative control in this corpus: a miss is always a false negative, a
// catch is always a true positive regardless of whether the resulting
// candidate happened to clear the actionable bar. `FP`/`TN` are reserved
// for a future negative-control corpus this backtester doesn't yet run
// against.

/// Overall TP/FP/FN/TN counts and the precision/recall/F1/accuracy derived
/// from them.
#[derive(Debug, Clone, Serialize)]
pub struct OverallMetrics {
    pub tp: usize,
    pub fp: usize,
    pub fn_: usize,
    pub tn: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowMetrics {
    pub hours_before: i32,
    pub total: usize,
    pub detected: usize,
    pub actionable: usize,
    pub detection_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceMetrics {
    pub confidence: String,
    pub count: usize,
    pub avg_score: f64,
    pub actionable_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternMetrics {
    pub pattern_type: String,
    pub count: usize,
    pub avg_score: f64,
}

/// Aggregate precision/recall/F1/accuracy plus per-window, per-confidence,
/// and per-pattern breakdowns, mirroring `calculate_metrics`'s four-way
/// report shape.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestMetrics {
    pub overall: OverallMetrics,
    pub by_time_window: Vec<WindowMetrics>,
    pub by_confidence: Vec<ConfidenceMetrics>,
    pub by_pattern: Vec<PatternMetrics>,
}

/// Aggregates a full set of replay results into the same four-way report
/// the original backtester computed with SQL `GROUP BY` queries over the
/// written table; here it runs in-process over the rows this run produced.
pub fn compute_metrics(results: &[BacktestResult]) -> BacktestMetrics {
    let tp = results.iter().filter(|r| r.classification == Classification::Tp).count();
    let fp = results.iter().filter(|r| r.classification == Classification::Fp).count();
    let fn_ = results.iter().filter(|r| r.classification == Classification::Fn_).count();
    let tn = results.iter().filter(|r| r.classification == Classification::Tn).count();

    let precision = if tp + fp > 0 { tp as f64 / (tp + fp) as f64 } else { 0.0 };
    let recall = if tp + fn_ > 0 { tp as f64 / (tp + fn_) as f64 } else { 0.0 };
    let f1_score = if precision + recall > 0.0 {
        2.0 * (precision * recall) / (precision + recall)
    } else {
        0.0
    };
    let accuracy = if tp + tn + fp + fn_ > 0 {
        (tp + tn) as f64 / (tp + tn + fp + fn_) as f64
    } else {
        0.0
    };

    let mut by_window: BTreeMap<i32, (usize, usize, usize)> = BTreeMap::new();
    for r in results {
        let entry = by_window.entry(r.hours_before_pump).or_insert((0, 0, 0));
        entry.0 += 1;
        if r.was_detected {
            entry.1 += 1;
        }
        if r.is_actionable {
            entry.2 += 1;
        }
    }
    let mut by_time_window: Vec<WindowMetrics> = by_window
        .into_iter()
        .map(|(hours_before, (total, detected, actionable))| WindowMetrics {
            hours_before,
            total,
            detected,
            actionable,
            detection_rate: if total > 0 { detected as f64 / total as f64 } else { 0.0 },
        })
        .collect();
    by_time_window.sort_unstable_by(|a, b| b.hours_before.cmp(&a.hours_before));

    let detected: Vec<&BacktestResult> = results.iter().filter(|r| r.was_detected).collect();

    let mut by_confidence_map: BTreeMap<String, (usize, f64, usize)> = BTreeMap::new();
    for r in &detected {
        let Some(confidence) = r.confidence else { continue };
        let score = r.score.and_then(|s| s.to_f64()).unwrap_or(0.0);
        let entry = by_confidence_map
            .entry(confidence.to_string())
            .or_insert((0, 0.0, 0));
        entry.0 += 1;
        entry.1 += score;
        if r.is_actionable {
            entry.2 += 1;
        }
    }
    let mut by_confidence: Vec<ConfidenceMetrics> = by_confidence_map
        .into_iter()
        .map(|(confidence, (count, score_sum, actionable_count))| ConfidenceMetrics {
            confidence,
            count,
            avg_score: if count > 0 { score_sum / count as f64 } else { 0.0 },
            actionable_count,
        })
        .collect();
    by_confidence.sort_unstable_by_key(|c| match c.confidence.as_str() {
        "HIGH" => 0,
        "MEDIUM" => 1,
        _ => 2,
    });

    let mut by_pattern_map: BTreeMap<String, (usize, f64)> = BTreeMap::new();
    for r in &detected {
        let Some(pattern_type) = r.pattern_type else { continue };
        let score = r.score.and_then(|s| s.to_f64()).unwrap_or(0.0);
        let entry = by_pattern_map.entry(pattern_type.to_string()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += score;
    }
    let mut by_pattern: Vec<PatternMetrics> = by_pattern_map
        .into_iter()
        .map(|(pattern_type, (count, score_sum))| PatternMetrics {
            pattern_type,
            count,
            avg_score: if count > 0 { score_sum / count as f64 } else { 0.0 },
        })
        .collect();
    by_pattern.sort_unstable_by(|a, b| b.count.cmp(&a.count));

    BacktestMetrics {
        overall: OverallMetrics {
            tp,
            fp,
            fn_,
            tn,
            precision,
            recall,
            f1_score,
            accuracy,
        },
        by_time_window,
        by_confidence,
        by_pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_windows_are_descending() {
        let mut sorted = TEST_WINDOWS_HOURS;
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(TEST_WINDOWS_HOURS, sorted);
    }

    fn sample(hours_before_pump: i32, classification: Classification, was_detected: bool) -> BacktestResult {
        BacktestResult {
            known_pump_id: Uuid::new_v4(),
            hours_before_pump,
            analysis_time: Utc::now(),
            was_detected,
            confidence: None,
            score: None,
            pattern_type: None,
            is_actionable: false,
            total_signals: 0,
            extreme_signals: 0,
            critical_window_signals: 0,
            classification,
            config_snapshot: serde_json::json!({}),
        }
    }

    #[test]
    fn metrics_precision_recall_from_tp_fn_only() {
        let results = vec![
            sample(72, Classification::Tp, true),
            sample(72, Classification::Tp, true),
            sample(72, Classification::Fn_, false),
        ];
        let metrics = compute_metrics(&results);
        assert_eq!(metrics.overall.tp, 2);
        assert_eq!(metrics.overall.fn_, 1);
        assert_eq!(metrics.overall.precision, 1.0);
        assert!((metrics.overall.recall - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn window_detection_rate_matches_detected_over_total() {
        let results = vec![
            sample(48, Classification::Tp, true),
            sample(48, Classification::Fn_, false),
        ];
        let metrics = compute_metrics(&results);
        let window = metrics
            .by_time_window
            .iter()
            .find(|w| w.hours_before == 48)
            .unwrap();
        assert_eq!(window.total, 2);
        assert_eq!(window.detected, 1);
        assert_eq!(window.detection_rate, 0.5);
    }
}
