//! Genre and mode scoring profiles.
//!
//! A profile bundles everything the engine needs to turn a feature set into
//! a score: target bands per metric, per-category weights, mode multipliers,
//! decay curve parameters and classification boundaries. Profiles are
//! validated at construction so a misconfigured profile fails loudly instead
//! of silently producing out-of-range scores.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jobs::AnalysisMode;

use super::features::SpectralBand;

/// Scoring configuration defects and lookup failures.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("no scoring profile registered for genre '{0}'")]
    UnknownProfile(String),
    #[error("profile configuration defect: {0}")]
    ProfileConfig(String),
}

/// Ideal value plus the acceptable band around it. Values outside
/// [min, max] score zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetRange {
    pub target: f64,
    pub min: f64,
    pub max: f64,
}

impl TargetRange {
    pub const fn new(target: f64, min: f64, max: f64) -> Self {
        Self { target, min, max }
    }

    fn validate(&self, metric: &str) -> Result<(), ScoreError> {
        if !(self.min < self.max) {
            return Err(ScoreError::ProfileConfig(format!(
                "{}: min {} must be below max {}",
                metric, self.min, self.max
            )));
        }
        if self.target < self.min || self.target > self.max {
            return Err(ScoreError::ProfileConfig(format!(
                "{}: target {} outside [{}, {}]",
                metric, self.target, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Symmetric target for one spectral band, in dB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandTarget {
    pub target_db: f64,
    pub tol_db: f64,
}

impl BandTarget {
    pub const fn new(target_db: f64, tol_db: f64) -> Self {
        Self { target_db, tol_db }
    }

    pub fn range(&self) -> TargetRange {
        TargetRange::new(
            self.target_db,
            self.target_db - self.tol_db,
            self.target_db + self.tol_db,
        )
    }
}

/// Per-band targets and aggregation weights for the tonal category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandProfile {
    pub target: BandTarget,
    pub weight: f64,
}

/// Category weights. Must sum to 100 before mode adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights {
    pub peaks: f64,
    pub loudness: f64,
    pub tonal: f64,
    pub dynamics: f64,
    pub stereo: f64,
    pub technical: f64,
}

impl CategoryWeights {
    pub fn sum(&self) -> f64 {
        self.peaks + self.loudness + self.tonal + self.dynamics + self.stereo + self.technical
    }
}

/// Per-category multipliers applied for an analysis mode before the weights
/// are renormalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeMultipliers {
    pub peaks: f64,
    pub loudness: f64,
    pub tonal: f64,
    pub dynamics: f64,
    pub stereo: f64,
    pub technical: f64,
}

impl ModeMultipliers {
    pub const NEUTRAL: ModeMultipliers = ModeMultipliers {
        peaks: 1.0,
        loudness: 1.0,
        tonal: 1.0,
        dynamics: 1.0,
        stereo: 1.0,
        technical: 1.0,
    };
}

/// Multipliers per analysis mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeAdjustments {
    pub genre: ModeMultipliers,
    pub reference: ModeMultipliers,
    pub quick: ModeMultipliers,
}

impl ModeAdjustments {
    pub fn for_mode(&self, mode: AnalysisMode) -> &ModeMultipliers {
        match mode {
            AnalysisMode::Genre => &self.genre,
            AnalysisMode::Reference => &self.reference,
            AnalysisMode::Quick => &self.quick,
        }
    }
}

/// Exponents of the subscore decay curve, per metric family. Higher values
/// are more forgiving near the target and steeper toward the edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayExponents {
    pub true_peak: f64,
    pub lufs: f64,
    pub loudness_range: f64,
    pub bands: f64,
    pub dynamics: f64,
    pub crest: f64,
    pub stereo: f64,
    pub technical: f64,
}

impl Default for DecayExponents {
    fn default() -> Self {
        Self {
            true_peak: 2.0,
            lufs: 1.5,
            loudness_range: 1.2,
            bands: 1.3,
            dynamics: 1.5,
            crest: 1.3,
            stereo: 1.2,
            technical: 1.8,
        }
    }
}

/// Score thresholds for the discrete classification tiers. Anything below
/// `poor` is unacceptable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationBoundaries {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
    pub poor: f64,
}

impl Default for ClassificationBoundaries {
    fn default() -> Self {
        Self {
            excellent: 90.0,
            good: 75.0,
            fair: 60.0,
            poor: 40.0,
        }
    }
}

impl ClassificationBoundaries {
    pub fn classify(&self, score: f64) -> super::Classification {
        use super::Classification::*;
        if score >= self.excellent {
            Excellent
        } else if score >= self.good {
            Good
        } else if score >= self.fair {
            Fair
        } else if score >= self.poor {
            Poor
        } else {
            Unacceptable
        }
    }

    fn validate(&self) -> Result<(), ScoreError> {
        if !(self.excellent > self.good && self.good > self.fair && self.fair > self.poor) {
            return Err(ScoreError::ProfileConfig(format!(
                "classification boundaries must be strictly descending, got {} {} {} {}",
                self.excellent, self.good, self.fair, self.poor
            )));
        }
        Ok(())
    }
}

/// Complete scoring configuration for one genre (or the neutral default).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub true_peak: TargetRange,
    pub lufs: TargetRange,
    pub loudness_range: TargetRange,
    pub dynamic_range: TargetRange,
    pub crest_factor: TargetRange,
    pub stereo_width: TargetRange,
    pub stereo_correlation: TargetRange,
    pub spectral_centroid_hz: TargetRange,
    pub spectral_flatness: TargetRange,
    pub bands: BTreeMap<SpectralBand, BandProfile>,
    pub weights: CategoryWeights,
    pub mode_adjustments: ModeAdjustments,
    pub exponents: DecayExponents,
    pub classification: ClassificationBoundaries,
    /// Subscore a value sitting exactly on the tolerance edge receives.
    /// Outside the edge the subscore drops to zero.
    pub tolerance_edge_score: f64,
}

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

impl Profile {
    /// Check the profile for configuration defects.
    ///
    /// An unnormalized weight set would push the aggregate outside the
    /// documented [0, 100] range, so it is rejected here rather than
    /// silently rescaled.
    pub fn validate(&self) -> Result<(), ScoreError> {
        let sum = self.weights.sum();
        if (sum - 100.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ScoreError::ProfileConfig(format!(
                "profile '{}': category weights sum to {}, expected 100",
                self.id, sum
            )));
        }

        self.true_peak.validate("true_peak")?;
        self.lufs.validate("lufs")?;
        self.loudness_range.validate("loudness_range")?;
        self.dynamic_range.validate("dynamic_range")?;
        self.crest_factor.validate("crest_factor")?;
        self.stereo_width.validate("stereo_width")?;
        self.stereo_correlation.validate("stereo_correlation")?;
        self.spectral_centroid_hz.validate("spectral_centroid_hz")?;
        self.spectral_flatness.validate("spectral_flatness")?;
        for (band, band_profile) in &self.bands {
            if band_profile.target.tol_db <= 0.0 {
                return Err(ScoreError::ProfileConfig(format!(
                    "profile '{}': band {} tolerance must be positive",
                    self.id,
                    band.as_str()
                )));
            }
            if band_profile.weight < 0.0 {
                return Err(ScoreError::ProfileConfig(format!(
                    "profile '{}': band {} weight must not be negative",
                    self.id,
                    band.as_str()
                )));
            }
        }
        if !(self.tolerance_edge_score > 0.0 && self.tolerance_edge_score < 100.0) {
            return Err(ScoreError::ProfileConfig(format!(
                "profile '{}': tolerance edge score {} must be within (0, 100)",
                self.id, self.tolerance_edge_score
            )));
        }
        self.classification.validate()?;
        Ok(())
    }
}

fn default_bands() -> BTreeMap<SpectralBand, BandProfile> {
    [
        (SpectralBand::Sub, BandTarget::new(-17.0, 4.0), 20.0),
        (SpectralBand::LowBass, BandTarget::new(-15.0, 3.0), 20.0),
        (SpectralBand::UpperBass, BandTarget::new(-16.0, 3.0), 15.0),
        (SpectralBand::LowMid, BandTarget::new(-18.0, 2.5), 15.0),
        (SpectralBand::Mid, BandTarget::new(-16.0, 2.5), 15.0),
        (SpectralBand::HighMid, BandTarget::new(-19.0, 2.5), 10.0),
        (SpectralBand::Brightness, BandTarget::new(-21.0, 3.0), 3.0),
        (SpectralBand::Presence, BandTarget::new(-23.0, 4.0), 2.0),
    ]
    .into_iter()
    .map(|(band, target, weight)| (band, BandProfile { target, weight }))
    .collect()
}

fn default_mode_adjustments() -> ModeAdjustments {
    ModeAdjustments {
        genre: ModeMultipliers {
            peaks: 0.9,
            loudness: 1.1,
            tonal: 1.2,
            dynamics: 0.9,
            stereo: 1.0,
            technical: 1.0,
        },
        reference: ModeMultipliers::NEUTRAL,
        // Quick pass scores the core categories only; tonal, stereo and
        // technical subscores are reported but carry no weight.
        quick: ModeMultipliers {
            peaks: 1.2,
            loudness: 1.2,
            tonal: 0.0,
            dynamics: 1.0,
            stereo: 0.0,
            technical: 0.0,
        },
    }
}

/// Neutral streaming-oriented profile used when no genre applies.
fn default_profile() -> Profile {
    Profile {
        id: "default".to_string(),
        true_peak: TargetRange::new(-1.0, -3.0, 0.0),
        lufs: TargetRange::new(-14.0, -18.0, -8.0),
        loudness_range: TargetRange::new(7.0, 3.0, 15.0),
        dynamic_range: TargetRange::new(8.0, 4.0, 14.0),
        crest_factor: TargetRange::new(12.0, 6.0, 20.0),
        stereo_width: TargetRange::new(0.55, 0.2, 0.9),
        stereo_correlation: TargetRange::new(0.6, 0.1, 1.0),
        spectral_centroid_hz: TargetRange::new(3000.0, 1000.0, 6000.0),
        spectral_flatness: TargetRange::new(0.2, 0.05, 0.5),
        bands: default_bands(),
        weights: CategoryWeights {
            peaks: 25.0,
            loudness: 20.0,
            tonal: 25.0,
            dynamics: 15.0,
            stereo: 10.0,
            technical: 5.0,
        },
        mode_adjustments: default_mode_adjustments(),
        exponents: DecayExponents::default(),
        classification: ClassificationBoundaries::default(),
        tolerance_edge_score: 10.0,
    }
}

/// Club-oriented genre profile builder: louder targets, tighter peaks.
fn club_profile(id: &str, lufs: TargetRange, weights: CategoryWeights) -> Profile {
    Profile {
        id: id.to_string(),
        true_peak: TargetRange::new(-1.0, -3.0, -0.2),
        lufs,
        dynamic_range: TargetRange::new(7.0, 4.0, 12.0),
        weights,
        ..default_profile()
    }
}

/// Registry of built-in genre profiles plus the neutral default.
pub struct ProfileRegistry {
    default_profile: Profile,
    profiles: BTreeMap<String, Profile>,
}

impl ProfileRegistry {
    /// Build and validate the built-in profile set.
    pub fn builtin() -> Result<Self, ScoreError> {
        let mut profiles = BTreeMap::new();

        let house = club_profile(
            "house",
            TargetRange::new(-9.0, -12.0, -6.0),
            CategoryWeights {
                peaks: 20.0,
                loudness: 25.0,
                tonal: 25.0,
                dynamics: 10.0,
                stereo: 15.0,
                technical: 5.0,
            },
        );

        let mut tech_house = club_profile(
            "tech_house",
            TargetRange::new(-8.5, -11.0, -6.0),
            CategoryWeights {
                peaks: 20.0,
                loudness: 25.0,
                tonal: 25.0,
                dynamics: 10.0,
                stereo: 15.0,
                technical: 5.0,
            },
        );
        if let Some(sub) = tech_house.bands.get_mut(&SpectralBand::Sub) {
            sub.target = BandTarget::new(-15.0, 3.5);
        }

        let techno = club_profile(
            "techno",
            TargetRange::new(-8.0, -11.0, -5.0),
            CategoryWeights {
                peaks: 20.0,
                loudness: 30.0,
                tonal: 20.0,
                dynamics: 10.0,
                stereo: 15.0,
                technical: 5.0,
            },
        );

        let trance = club_profile(
            "trance",
            TargetRange::new(-9.0, -12.0, -6.0),
            CategoryWeights {
                peaks: 20.0,
                loudness: 25.0,
                tonal: 30.0,
                dynamics: 10.0,
                stereo: 10.0,
                technical: 5.0,
            },
        );

        let drum_and_bass = club_profile(
            "drum_and_bass",
            TargetRange::new(-8.0, -11.0, -5.0),
            CategoryWeights {
                peaks: 25.0,
                loudness: 25.0,
                tonal: 20.0,
                dynamics: 15.0,
                stereo: 10.0,
                technical: 5.0,
            },
        );

        let mut funk = club_profile(
            "funk",
            TargetRange::new(-8.0, -10.0, -5.0),
            CategoryWeights {
                peaks: 20.0,
                loudness: 30.0,
                tonal: 25.0,
                dynamics: 10.0,
                stereo: 10.0,
                technical: 5.0,
            },
        );
        if let Some(sub) = funk.bands.get_mut(&SpectralBand::Sub) {
            sub.target = BandTarget::new(-14.0, 3.0);
        }

        let mut hip_hop = default_profile();
        hip_hop.id = "hip_hop".to_string();
        hip_hop.lufs = TargetRange::new(-10.0, -14.0, -7.0);
        hip_hop.weights = CategoryWeights {
            peaks: 20.0,
            loudness: 25.0,
            tonal: 30.0,
            dynamics: 15.0,
            stereo: 5.0,
            technical: 5.0,
        };

        let mut pop = default_profile();
        pop.id = "pop".to_string();
        pop.lufs = TargetRange::new(-11.0, -14.0, -8.0);

        for profile in [
            house,
            tech_house,
            techno,
            trance,
            drum_and_bass,
            funk,
            hip_hop,
            pop,
        ] {
            profile.validate()?;
            profiles.insert(profile.id.clone(), profile);
        }

        let default = default_profile();
        default.validate()?;

        Ok(Self {
            default_profile: default,
            profiles,
        })
    }

    /// Look up the profile for a submission.
    ///
    /// Genre mode requires a registered genre. Reference and quick analyses
    /// score against the neutral default; a supplied genre rides along as
    /// metadata only.
    pub fn resolve(
        &self,
        genre: Option<&str>,
        mode: AnalysisMode,
    ) -> Result<&Profile, ScoreError> {
        match mode {
            AnalysisMode::Genre => {
                let genre =
                    genre.ok_or_else(|| ScoreError::UnknownProfile("<missing>".to_string()))?;
                self.profiles
                    .get(genre)
                    .ok_or_else(|| ScoreError::UnknownProfile(genre.to_string()))
            }
            AnalysisMode::Reference | AnalysisMode::Quick => Ok(&self.default_profile),
        }
    }

    /// Registered genre identifiers, sorted.
    pub fn genre_ids(&self) -> Vec<&str> {
        self.profiles.keys().map(|k| k.as_str()).collect()
    }
}
