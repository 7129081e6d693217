//! Score computation.
//!
//! `score` is a pure function: identical inputs always produce an identical
//! report, which is what makes worker retries safe to re-score.

use std::collections::BTreeMap;

use super::features::FeatureSet;
use super::profile::{CategoryWeights, ModeMultipliers, Profile, ScoreError, TargetRange};
use super::report::{
    CategoryBreakdown, Classification, GateFlag, MetricScore, ScoreReport,
};
use crate::jobs::AnalysisMode;

/// Final score cap when the true-peak critical gate fires.
const TRUE_PEAK_CRITICAL_CAP: f64 = 35.0;
/// Loudness subscore cap under the critical gate.
const TRUE_PEAK_CRITICAL_LOUDNESS_CAP: f64 = 20.0;
/// True peak within this distance of full scale triggers the warning gate.
const TRUE_PEAK_WARNING_MARGIN_DBTP: f64 = -0.1;
const TRUE_PEAK_WARNING_PEAKS_CAP: f64 = 30.0;
const TRUE_PEAK_WARNING_FINAL_CAP: f64 = 70.0;
/// Clipped-sample percentage above which the severe clipping gate fires.
const CLIPPING_SEVERE_THRESHOLD_PCT: f64 = 5.0;
const CLIPPING_SEVERE_PEAKS_CAP: f64 = 30.0;
const CLIPPING_SEVERE_TECHNICAL_CAP: f64 = 40.0;
const CLIPPING_SEVERE_FINAL_CAP: f64 = 50.0;
/// Absolute DC offset above which the DC gate fires.
const DC_OFFSET_GATE_THRESHOLD: f64 = 0.05;
const DC_OFFSET_TECHNICAL_PENALTY: f64 = 20.0;
const DC_OFFSET_FINAL_PENALTY: f64 = 10.0;

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Target+range subscore.
///
/// 100 at the target, decaying along `t^exponent` to `edge_score` at the
/// tolerance edge, hard zero outside [min, max].
fn score_target_range(value: f64, range: &TargetRange, exponent: f64, edge_score: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    if value < range.min || value > range.max {
        return 0.0;
    }
    if value == range.target {
        return 100.0;
    }

    let (distance, max_distance) = if value < range.target {
        (range.target - value, range.target - range.min)
    } else {
        (value - range.target, range.max - range.target)
    };
    if max_distance == 0.0 {
        return 100.0;
    }

    let normalized = (distance / max_distance).min(1.0);
    let penalty = normalized.powf(exponent);
    round1((100.0 - (100.0 - edge_score) * penalty).clamp(0.0, 100.0))
}

/// Optional metric: unmeasured values score a neutral 50.
fn score_optional(value: Option<f64>, range: &TargetRange, exponent: f64, edge_score: f64) -> f64 {
    match value {
        Some(v) => score_target_range(v, range, exponent, edge_score),
        None => 50.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TruePeakGate {
    Clear,
    Warning,
    Critical,
}

/// True-peak subscore with the critical gate folded in. Anything above
/// 0 dBTP is digital clipping and scores zero regardless of the profile.
fn score_true_peak(
    true_peak: f64,
    range: &TargetRange,
    exponent: f64,
    edge_score: f64,
) -> (f64, TruePeakGate) {
    if !true_peak.is_finite() {
        return (0.0, TruePeakGate::Critical);
    }
    if true_peak > 0.0 {
        return (0.0, TruePeakGate::Critical);
    }

    let score = score_target_range(true_peak, range, exponent, edge_score);
    if true_peak > TRUE_PEAK_WARNING_MARGIN_DBTP {
        (score.min(TRUE_PEAK_WARNING_PEAKS_CAP), TruePeakGate::Warning)
    } else {
        (score, TruePeakGate::Clear)
    }
}

/// Clipping subscore ladder: 0% clipping is perfect, 5%+ scores zero.
fn score_clipping(clipping_pct: f64) -> f64 {
    if clipping_pct <= 0.0 {
        100.0
    } else if clipping_pct > 5.0 {
        0.0
    } else if clipping_pct > 2.0 {
        20.0
    } else if clipping_pct > 1.0 {
        40.0
    } else if clipping_pct > 0.5 {
        60.0
    } else {
        80.0
    }
}

/// Channel balance ladder: 0 is centered.
fn score_balance(balance: f64) -> f64 {
    let b = balance.abs();
    if b < 0.05 {
        100.0
    } else if b < 0.1 {
        85.0
    } else if b < 0.2 {
        60.0
    } else if b < 0.3 {
        40.0
    } else {
        20.0
    }
}

/// DC offset ladder.
fn score_dc_offset(dc: f64) -> f64 {
    let d = dc.abs();
    if d < 0.001 {
        100.0
    } else if d < 0.01 {
        90.0
    } else if d < 0.03 {
        70.0
    } else if d < 0.05 {
        50.0
    } else {
        20.0
    }
}

/// Apply mode multipliers and renormalize back to a sum of 100.
fn effective_weights(base: &CategoryWeights, multipliers: &ModeMultipliers) -> CategoryWeights {
    let adjusted = CategoryWeights {
        peaks: base.peaks * multipliers.peaks,
        loudness: base.loudness * multipliers.loudness,
        tonal: base.tonal * multipliers.tonal,
        dynamics: base.dynamics * multipliers.dynamics,
        stereo: base.stereo * multipliers.stereo,
        technical: base.technical * multipliers.technical,
    };
    let total = adjusted.sum();
    if total <= 0.0 {
        return *base;
    }
    CategoryWeights {
        peaks: adjusted.peaks * 100.0 / total,
        loudness: adjusted.loudness * 100.0 / total,
        tonal: adjusted.tonal * 100.0 / total,
        dynamics: adjusted.dynamics * 100.0 / total,
        stereo: adjusted.stereo * 100.0 / total,
        technical: adjusted.technical * 100.0 / total,
    }
}

/// Score a feature set against a profile for the given analysis mode.
///
/// Fails with `ScoreError::ProfileConfig` when the profile itself is
/// defective (an implementer bug, not a property of the audio).
pub fn score(
    features: &FeatureSet,
    profile: &Profile,
    mode: AnalysisMode,
) -> Result<ScoreReport, ScoreError> {
    profile.validate()?;

    let exponents = &profile.exponents;
    let edge = profile.tolerance_edge_score;
    let weights = effective_weights(&profile.weights, profile.mode_adjustments.for_mode(mode));

    let mut metrics: BTreeMap<String, MetricScore> = BTreeMap::new();
    let mut record = |name: &str, value: f64, range: &TargetRange, subscore: f64| {
        metrics.insert(
            name.to_string(),
            MetricScore {
                value,
                target: range.target,
                min: range.min,
                max: range.max,
                subscore,
            },
        );
    };

    // Peaks: true peak (70%) + clipping (30%)
    let (true_peak_score, true_peak_gate) = score_true_peak(
        features.true_peak_dbtp,
        &profile.true_peak,
        exponents.true_peak,
        edge,
    );
    record(
        "true_peak",
        features.true_peak_dbtp,
        &profile.true_peak,
        true_peak_score,
    );
    let clipping_score = score_clipping(features.clipping_pct);
    let mut peaks = round1(true_peak_score * 0.7 + clipping_score * 0.3);

    // Loudness: LUFS (80%) + LRA (20%)
    let lufs_score =
        score_target_range(features.lufs_integrated, &profile.lufs, exponents.lufs, edge);
    record("lufs", features.lufs_integrated, &profile.lufs, lufs_score);
    let lra_score = score_target_range(
        features.loudness_range,
        &profile.loudness_range,
        exponents.loudness_range,
        edge,
    );
    record(
        "loudness_range",
        features.loudness_range,
        &profile.loudness_range,
        lra_score,
    );
    let mut loudness = round1(lufs_score * 0.8 + lra_score * 0.2);

    // Tonal: weighted mean over the measured bands
    let mut band_weight_total = 0.0;
    let mut band_weighted_sum = 0.0;
    for (band, level) in features.bands.iter() {
        let Some(level) = level else { continue };
        let Some(band_profile) = profile.bands.get(&band) else {
            continue;
        };
        if band_profile.weight == 0.0 {
            continue;
        }
        let range = band_profile.target.range();
        let band_score = score_target_range(level, &range, exponents.bands, edge);
        record(&format!("band_{}", band.as_str()), level, &range, band_score);
        band_weighted_sum += band_score * band_profile.weight;
        band_weight_total += band_profile.weight;
    }
    let tonal = if band_weight_total > 0.0 {
        round1(band_weighted_sum / band_weight_total)
    } else {
        // No measurable bands (e.g. very short clip): neutral
        50.0
    };

    // Dynamics: DR (60%) + crest factor (40%)
    let dr_score = score_target_range(
        features.dynamic_range,
        &profile.dynamic_range,
        exponents.dynamics,
        edge,
    );
    record(
        "dynamic_range",
        features.dynamic_range,
        &profile.dynamic_range,
        dr_score,
    );
    let crest_score = score_target_range(
        features.crest_factor,
        &profile.crest_factor,
        exponents.crest,
        edge,
    );
    record(
        "crest_factor",
        features.crest_factor,
        &profile.crest_factor,
        crest_score,
    );
    let dynamics = round1(dr_score * 0.6 + crest_score * 0.4);

    // Stereo: width (40%) + correlation (40%) + balance (20%)
    let width_score = score_target_range(
        features.stereo_width,
        &profile.stereo_width,
        exponents.stereo,
        edge,
    );
    record(
        "stereo_width",
        features.stereo_width,
        &profile.stereo_width,
        width_score,
    );
    let correlation_score = score_target_range(
        features.stereo_correlation,
        &profile.stereo_correlation,
        exponents.stereo,
        edge,
    );
    record(
        "stereo_correlation",
        features.stereo_correlation,
        &profile.stereo_correlation,
        correlation_score,
    );
    let balance_score = score_balance(features.balance_lr);
    let stereo = round1(width_score * 0.4 + correlation_score * 0.4 + balance_score * 0.2);

    // Technical: DC offset (50%) + centroid (25%) + flatness (25%)
    let dc_score = score_dc_offset(features.dc_offset);
    let centroid_score = score_optional(
        features.spectral_centroid_hz,
        &profile.spectral_centroid_hz,
        exponents.technical,
        edge,
    );
    if let Some(centroid) = features.spectral_centroid_hz {
        record(
            "spectral_centroid",
            centroid,
            &profile.spectral_centroid_hz,
            centroid_score,
        );
    }
    let flatness_score = score_optional(
        features.spectral_flatness,
        &profile.spectral_flatness,
        exponents.technical,
        edge,
    );
    if let Some(flatness) = features.spectral_flatness {
        record(
            "spectral_flatness",
            flatness,
            &profile.spectral_flatness,
            flatness_score,
        );
    }
    let mut technical = round1(dc_score * 0.5 + centroid_score * 0.25 + flatness_score * 0.25);

    // Gates. The critical true-peak gate models a hard engineering
    // constraint: inter-sample overs are never acceptable no matter how
    // good every other metric is.
    let mut gates = Vec::new();
    let mut final_cap = 100.0_f64;
    let mut final_penalty = 0.0_f64;

    match true_peak_gate {
        TruePeakGate::Critical => {
            gates.push(GateFlag::TruePeakCritical);
            peaks = 0.0;
            technical = 0.0;
            loudness = loudness.min(TRUE_PEAK_CRITICAL_LOUDNESS_CAP);
            final_cap = TRUE_PEAK_CRITICAL_CAP;
        }
        TruePeakGate::Warning => {
            gates.push(GateFlag::TruePeakWarning);
            peaks = peaks.min(TRUE_PEAK_WARNING_PEAKS_CAP);
            final_cap = TRUE_PEAK_WARNING_FINAL_CAP;
        }
        TruePeakGate::Clear => {}
    }

    if features.clipping_pct > CLIPPING_SEVERE_THRESHOLD_PCT {
        gates.push(GateFlag::ClippingSevere);
        peaks = peaks.min(CLIPPING_SEVERE_PEAKS_CAP);
        technical = technical.min(CLIPPING_SEVERE_TECHNICAL_CAP);
        final_cap = final_cap.min(CLIPPING_SEVERE_FINAL_CAP);
    }

    if features.dc_offset.abs() > DC_OFFSET_GATE_THRESHOLD {
        gates.push(GateFlag::DcOffsetHigh);
        technical = (technical - DC_OFFSET_TECHNICAL_PENALTY).max(0.0);
        final_penalty += DC_OFFSET_FINAL_PENALTY;
    }

    let categories = CategoryBreakdown {
        peaks,
        loudness,
        tonal,
        dynamics,
        stereo,
        technical,
    };

    let weighted_sum = peaks * weights.peaks
        + loudness * weights.loudness
        + tonal * weights.tonal
        + dynamics * weights.dynamics
        + stereo * weights.stereo
        + technical * weights.technical;
    let mut final_score = weighted_sum / 100.0;
    final_score = final_score.min(final_cap);
    final_score = (final_score - final_penalty).max(0.0);
    let final_score = round1(final_score);

    let classification = if gates.contains(&GateFlag::TruePeakCritical) {
        Classification::Unacceptable
    } else if gates.contains(&GateFlag::ClippingSevere) {
        Classification::Poor
    } else {
        profile.classification.classify(final_score)
    };

    Ok(ScoreReport {
        score: final_score,
        classification,
        genre_id: profile.id.clone(),
        mode,
        categories,
        metrics,
        gates,
        weights,
    })
}
