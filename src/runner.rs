// =============================================================================
// Analysis runner — turns accumulated raw signals into scored candidates
// =============================================================================
//
// Pulls the symbols with enough recent signal volume, runs each through the
// detection engine, persists the resulting candidate plus its audit
// snapshot, and re-links `candidate_signals`. Expires stale ACTIVE
// candidates before each cycle.
// =============================================================================

use chrono::{DateTime, Utc};

use crate::alerts::Alerter;
use crate::engine::DetectionEngine;
use crate::error::PumpError;
use crate::store::Store;

/// One pass over the eligible universe.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleSummary {
    pub symbols_considered: usize,
    pub candidates_detected: usize,
    pub actionable_alerts_sent: usize,
    pub expired_candidates: u64,
}

pub struct AnalysisRunner {
    store: Store,
    engine: DetectionEngine,
    alerter: Alerter,
    exchange_id: i64,
    min_signal_count: i64,
}

impl AnalysisRunner {
    pub fn new(
        store: Store,
        engine: DetectionEngine,
        alerter: Alerter,
        exchange_id: i64,
        min_signal_count: i64,
    ) -> Self {
        Self {
            store,
            engine,
            alerter,
            exchange_id,
            min_signal_count,
        }
    }

    /// Expire stale candidates, then score every eligible symbol and
    /// persist a candidate + snapshot for each one the engine accepts.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleSummary, PumpError> {
        let expired = self.store.expire_stale_candidates(now).await?;

        let symbols = self
            .store
            .select_symbols_for_analysis(now, self.min_signal_count, self.exchange_id)
            .await?;

        let mut summary = CycleSummary {
            symbols_considered: symbols.len(),
            expired_candidates: expired,
            ..Default::default()
        };

        for (symbol, trading_pair_id) in symbols {
            if let Some(detected) = self.process_symbol(&symbol, trading_pair_id, now).await? {
                summary.candidates_detected += 1;
                if detected {
                    summary.actionable_alerts_sent += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Returns `Some(is_actionable)` when the engine produced a candidate,
    /// `None` when the symbol didn't clear the minimum signal count.
    async fn process_symbol(
        &self,
        symbol: &str,
        trading_pair_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<bool>, PumpError> {
        let lookback_start = now - chrono::Duration::days(7);
        let signals = self
            .store
            .list_signals_for_symbol(symbol, lookback_start, now)
            .await?;

        let last_pump = self
            .store
            .last_known_pump_before(symbol, now)
            .await?
            .map(|p| (p.pump_start, p.start_price));

        let Some(output) = self.engine.analyze(symbol, trading_pair_id, &signals, last_pump, now)
        else {
            return Ok(None);
        };

        let candidate_id = self.store.upsert_candidate(&output.candidate).await?;

        let snapshot = serde_json::to_value(&output.detail)
            .map_err(|e| PumpError::DataInsufficient(format!("snapshot serialize failed: {e}")))?;
        self.store.write_snapshot(candidate_id, &snapshot).await?;

        let links: Vec<(uuid::Uuid, f64)> = signals
            .iter()
            .map(|s| (s.id, s.signal_strength.relevance()))
            .collect();
        self.store.replace_candidate_signals(candidate_id, &links).await?;

        if output.candidate.is_actionable {
            self.alerter.send_candidate_alert(&output.candidate).await;
        }

        Ok(Some(output.candidate.is_actionable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_summary_defaults_to_zero() {
        let s = CycleSummary::default();
        assert_eq!(s.symbols_considered, 0);
        assert_eq!(s.candidates_detected, 0);
        assert_eq!(s.actionable_alerts_sent, 0);
        assert_eq!(s.expired_candidates, 0);
    }
}
