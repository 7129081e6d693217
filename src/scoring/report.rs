//! Score report types embedded in a finished job's result payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::jobs::AnalysisMode;

use super::profile::CategoryWeights;

/// Discrete quality tier derived from the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Excellent,
    Good,
    Fair,
    Poor,
    Unacceptable,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Excellent => "excellent",
            Classification::Good => "good",
            Classification::Fair => "fair",
            Classification::Poor => "poor",
            Classification::Unacceptable => "unacceptable",
        }
    }
}

/// Hard override rule that fired during scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateFlag {
    /// True peak above 0 dBTP: digital clipping, never acceptable.
    TruePeakCritical,
    /// True peak within 0.1 dB of full scale.
    TruePeakWarning,
    /// More than 5% clipped samples.
    ClippingSevere,
    /// DC offset above 5%.
    DcOffsetHigh,
}

impl GateFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateFlag::TruePeakCritical => "TRUE_PEAK_CRITICAL",
            GateFlag::TruePeakWarning => "TRUE_PEAK_WARNING",
            GateFlag::ClippingSevere => "CLIPPING_SEVERE",
            GateFlag::DcOffsetHigh => "DC_OFFSET_HIGH",
        }
    }
}

/// One range-scored metric: the measured value, the profile band it was
/// scored against, and the resulting subscore.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
    pub value: f64,
    pub target: f64,
    pub min: f64,
    pub max: f64,
    pub subscore: f64,
}

/// Per-category subscores after gates were applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub peaks: f64,
    pub loudness: f64,
    pub tonal: f64,
    pub dynamics: f64,
    pub stereo: f64,
    pub technical: f64,
}

/// Output of the scoring engine. Written exactly once, on a job's
/// transition to DONE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    /// Overall score in [0, 100], rounded to 0.1.
    pub score: f64,
    pub classification: Classification,
    /// Profile identifier the score was computed against.
    pub genre_id: String,
    pub mode: AnalysisMode,
    pub categories: CategoryBreakdown,
    /// Range-scored metrics keyed by metric name. BTreeMap keeps the
    /// serialized form stable across runs.
    pub metrics: BTreeMap<String, MetricScore>,
    pub gates: Vec<GateFlag>,
    /// Effective category weights used for the final aggregate, kept so a
    /// score can be reproduced from its inputs.
    pub weights: CategoryWeights,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_as_str() {
        assert_eq!(Classification::Excellent.as_str(), "excellent");
        assert_eq!(Classification::Unacceptable.as_str(), "unacceptable");
    }

    #[test]
    fn test_classification_serialization() {
        let json = serde_json::to_string(&Classification::Excellent).unwrap();
        assert_eq!(json, "\"excellent\"");

        let parsed: Classification = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Classification::Excellent);
    }

    #[test]
    fn test_gate_flag_serialization() {
        let json = serde_json::to_string(&GateFlag::TruePeakCritical).unwrap();
        assert_eq!(json, "\"TRUE_PEAK_CRITICAL\"");

        let parsed: GateFlag = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, GateFlag::TruePeakCritical);
    }
}
