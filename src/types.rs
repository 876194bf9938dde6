// =============================================================================
// Shared enums for the pump detection pipeline
// =============================================================================

use serde::{Deserialize, Serialize};
use sqlx::Type;

/// Which market a raw signal or candle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum MarketSide {
    Spot,
    Futures,
}

impl std::fmt::Display for MarketSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spot => write!(f, "SPOT"),
            Self::Futures => write!(f, "FUTURES"),
        }
    }
}

/// Coarse categorical label for a single raw signal's dominant spike ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum SignalStrength {
    Weak,
    Medium,
    Strong,
    VeryStrong,
    Extreme,
}

impl SignalStrength {
    /// Classify strength from `m = max(spike_ratio_7d, spike_ratio_14d)`,
    /// per the detector's strength table. Thresholds are passed in
    /// explicitly rather than hard-coded so callers can honor
    /// `DetectorConfig` overrides.
    pub fn classify(m: f64, extreme: f64, very_strong: f64, strong: f64, medium: f64) -> Self {
        if m >= extreme {
            Self::Extreme
        } else if m >= very_strong {
            Self::VeryStrong
        } else if m >= strong {
            Self::Strong
        } else if m >= medium {
            Self::Medium
        } else {
            Self::Weak
        }
    }

    /// Relevance weight used when linking a signal to a candidate.
    pub fn relevance(self) -> f64 {
        match self {
            Self::Extreme => 1.0,
            Self::VeryStrong => 0.8,
            Self::Strong => 0.6,
            Self::Medium => 0.4,
            Self::Weak => 0.2,
        }
    }
}

impl std::fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Extreme => "EXTREME",
            Self::VeryStrong => "VERY_STRONG",
            Self::Strong => "STRONG",
            Self::Medium => "MEDIUM",
            Self::Weak => "WEAK",
        };
        write!(f, "{s}")
    }
}

/// Confidence tiering of a candidate's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

/// Qualitative label describing a candidate's precursor mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum PatternType {
    ExtremePrecursor,
    StrongPrecursor,
    MediumPrecursor,
    EarlyPattern,
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ExtremePrecursor => "EXTREME_PRECURSOR",
            Self::StrongPrecursor => "STRONG_PRECURSOR",
            Self::MediumPrecursor => "MEDIUM_PRECURSOR",
            Self::EarlyPattern => "EARLY_PATTERN",
        };
        write!(f, "{s}")
    }
}

/// Pump lifecycle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum PumpPhase {
    EarlySignal,
    PostPumpCooling,
    SecondWavePotential,
}

impl std::fmt::Display for PumpPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::EarlySignal => "EARLY_SIGNAL",
            Self::PostPumpCooling => "POST_PUMP_COOLING",
            Self::SecondWavePotential => "SECOND_WAVE_POTENTIAL",
        };
        write!(f, "{s}")
    }
}

/// Candidate lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum CandidateStatus {
    Active,
    Expired,
}

impl std::fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Backtest classification against the known-pump corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum Classification {
    Tp,
    Fp,
    Fn_,
    Tn,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tp => write!(f, "TP"),
            Self::Fp => write!(f, "FP"),
            Self::Fn_ => write!(f, "FN"),
            Self::Tn => write!(f, "TN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_boundaries() {
        assert_eq!(
            SignalStrength::classify(5.0, 5.0, 3.0, 2.0, 1.5),
            SignalStrength::Extreme
        );
        assert_eq!(
            SignalStrength::classify(4.999, 5.0, 3.0, 2.0, 1.5),
            SignalStrength::VeryStrong
        );
        assert_eq!(
            SignalStrength::classify(3.0, 5.0, 3.0, 2.0, 1.5),
            SignalStrength::VeryStrong
        );
        assert_eq!(
            SignalStrength::classify(2.0, 5.0, 3.0, 2.0, 1.5),
            SignalStrength::Strong
        );
        assert_eq!(
            SignalStrength::classify(1.5, 5.0, 3.0, 2.0, 1.5),
            SignalStrength::Medium
        );
        assert_eq!(
            SignalStrength::classify(1.49, 5.0, 3.0, 2.0, 1.5),
            SignalStrength::Weak
        );
    }

    #[test]
    fn relevance_mapping() {
        assert_eq!(SignalStrength::Extreme.relevance(), 1.0);
        assert_eq!(SignalStrength::VeryStrong.relevance(), 0.8);
        assert_eq!(SignalStrength::Strong.relevance(), 0.6);
        assert_eq!(SignalStrength::Medium.relevance(), 0.4);
        assert_eq!(SignalStrength::Weak.relevance(), 0.2);
    }

    #[test]
    fn display_round_trips_expected_strings() {
        assert_eq!(MarketSide::Spot.to_string(), "SPOT");
        assert_eq!(Confidence::High.to_string(), "HIGH");
        assert_eq!(PatternType::ExtremePrecursor.to_string(), "EXTREME_PRECURSOR");
        assert_eq!(PumpPhase::PostPumpCooling.to_string(), "POST_PUMP_COOLING");
        assert_eq!(CandidateStatus::Active.to_string(), "ACTIVE");
        assert_eq!(Classification::Fn_.to_string(), "FN");
    }
}
