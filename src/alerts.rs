// =============================================================================
// Alerter — Telegram dispatch for actionable candidates and breakouts
// =============================================================================
//
// Mirrors the source's "enabled flag gates everything, failures are logged
// and swallowed, never block a caller on a dispatch error" contract. A
// disabled alerter (missing bot token or chat id) is a valid, common
// configuration — every public method becomes a no-op rather than an error.
// =============================================================================

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::MessagingConfig;
use crate::models::{PumpCandidate, RawSignal};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Telegram bot client for outbound alerts. Cheap to clone — shared across
/// tasks via an internal `reqwest::Client`.
#[derive(Clone)]
pub struct Alerter {
    bot_token: String,
    chat_id: String,
    enabled: bool,
    client: reqwest::Client,
}

impl Alerter {
    pub fn new(config: &MessagingConfig) -> Self {
        let enabled = config.enabled();
        if !enabled {
            warn!("alerter disabled: missing bot token or chat id");
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");
        Self {
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            enabled,
            client,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Send a plain HTML-formatted message. Returns `false` (never errors)
    /// on any failure so callers never need to branch on alert delivery.
    pub async fn send_message(&self, text: &str) -> bool {
        if !self.enabled {
            return false;
        }

        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        match self.client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("telegram message sent");
                true
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "telegram send returned non-success status");
                false
            }
            Err(err) => {
                warn!(error = %err, "telegram send failed");
                false
            }
        }
    }

    /// Formats and sends an alert for a candidate the runner just marked
    /// actionable.
    pub async fn send_candidate_alert(&self, candidate: &PumpCandidate) -> bool {
        let text = format!(
            "Pump candidate: {}\nConfidence: {}\nScore: {}\nPattern: {}\nPhase: {}\nSignals: {} (extreme {})",
            candidate.symbol,
            candidate.confidence,
            candidate.score,
            candidate.pattern_type,
            candidate.pump_phase,
            candidate.total_signals,
            candidate.extreme_signals,
        );
        self.send_message(&text).await
    }

    /// Formats and sends an alert when the breakout watcher observes a
    /// dual-market volume surge on an active candidate.
    pub async fn send_breakout_alert(
        &self,
        symbol: &str,
        spot_ratio: f64,
        futures_ratio: f64,
        candidate: &PumpCandidate,
    ) -> bool {
        let text = format!(
            "Pump start detected: {symbol}\nSpot volume ratio: {spot_ratio:.2}\nFutures volume ratio: {futures_ratio:.2}\nCandidate confidence: {}\nScore: {}",
            candidate.confidence, candidate.score,
        );
        self.send_message(&text).await
    }

    /// Formats and sends an alert when the co-occurrence monitor finds a
    /// same-timestamp EXTREME spot/futures pair, including both sides'
    /// spike ratios and volumes.
    pub async fn send_co_occurrence_alert(&self, spot: &RawSignal, futures: &RawSignal) -> bool {
        let text = format!(
            "Extreme co-occurrence: {}\nTimestamp: {}\nSpot volume: {} (ratio 7d {:.2}, 14d {:.2}, 30d {:.2})\nFutures volume: {} (ratio 7d {:.2}, 14d {:.2}, 30d {:.2})",
            spot.symbol,
            spot.signal_timestamp,
            spot.volume,
            spot.spike_ratio_7d,
            spot.spike_ratio_14d,
            spot.spike_ratio_30d,
            futures.volume,
            futures.spike_ratio_7d,
            futures.spike_ratio_14d,
            futures.spike_ratio_30d,
        );
        self.send_message(&text).await
    }

    /// GET `/getMe` — used by binaries at startup to fail fast on a bad token.
    pub async fn test_connection(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let url = format!("https://api.telegram.org/bot{}/getMe", self.bot_token);
        matches!(self.client.get(&url).send().await, Ok(resp) if resp.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_alerter_reports_disabled() {
        let cfg = MessagingConfig::default();
        let alerter = Alerter::new(&cfg);
        assert!(!alerter.is_enabled());
    }
}
