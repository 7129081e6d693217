//! Fixed feature schema consumed by the scoring engine.
//!
//! The feature extractor collaborator produces exactly this shape; the
//! engine never discovers metric names at run time.

use serde::{Deserialize, Serialize};

/// Scalar and banded metrics extracted from one decoded audio file.
///
/// Loudness values are LUFS/dB, peaks are dBTP, stereo metrics are
/// dimensionless in [-1, 1] (correlation/balance) or [0, 1] (width).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Integrated loudness (LUFS).
    pub lufs_integrated: f64,
    /// Loudness range (LU).
    pub loudness_range: f64,
    /// Reconstructed inter-sample peak (dBTP).
    pub true_peak_dbtp: f64,
    /// Percentage of clipped samples.
    #[serde(default)]
    pub clipping_pct: f64,
    /// Dynamic range statistic (dB).
    pub dynamic_range: f64,
    /// Peak-to-RMS crest factor (dB).
    pub crest_factor: f64,
    /// Stereo width estimate.
    pub stereo_width: f64,
    /// Inter-channel correlation.
    pub stereo_correlation: f64,
    /// Left/right energy balance, 0 = centered.
    #[serde(default)]
    pub balance_lr: f64,
    /// DC offset of the normalized signal.
    #[serde(default)]
    pub dc_offset: f64,
    /// Spectral centroid (Hz), when the extractor computed one.
    #[serde(default)]
    pub spectral_centroid_hz: Option<f64>,
    /// Spectral flatness in [0, 1], when the extractor computed one.
    #[serde(default)]
    pub spectral_flatness: Option<f64>,
    /// Average level per spectral band.
    #[serde(default)]
    pub bands: SpectralBands,
}

/// Average dB level per named spectral band. Bands the extractor could not
/// measure (e.g. mono sources, short clips) are left unset and carry no
/// weight in the tonal subscore.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpectralBands {
    pub sub: Option<f64>,
    pub low_bass: Option<f64>,
    pub upper_bass: Option<f64>,
    pub low_mid: Option<f64>,
    pub mid: Option<f64>,
    pub high_mid: Option<f64>,
    pub brightness: Option<f64>,
    pub presence: Option<f64>,
}

/// Identifier for one spectral band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectralBand {
    Sub,
    LowBass,
    UpperBass,
    LowMid,
    Mid,
    HighMid,
    Brightness,
    Presence,
}

impl SpectralBand {
    pub const ALL: [SpectralBand; 8] = [
        SpectralBand::Sub,
        SpectralBand::LowBass,
        SpectralBand::UpperBass,
        SpectralBand::LowMid,
        SpectralBand::Mid,
        SpectralBand::HighMid,
        SpectralBand::Brightness,
        SpectralBand::Presence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpectralBand::Sub => "sub",
            SpectralBand::LowBass => "low_bass",
            SpectralBand::UpperBass => "upper_bass",
            SpectralBand::LowMid => "low_mid",
            SpectralBand::Mid => "mid",
            SpectralBand::HighMid => "high_mid",
            SpectralBand::Brightness => "brightness",
            SpectralBand::Presence => "presence",
        }
    }
}

impl SpectralBands {
    /// Measured level for a band, if the extractor produced one.
    pub fn level(&self, band: SpectralBand) -> Option<f64> {
        match band {
            SpectralBand::Sub => self.sub,
            SpectralBand::LowBass => self.low_bass,
            SpectralBand::UpperBass => self.upper_bass,
            SpectralBand::LowMid => self.low_mid,
            SpectralBand::Mid => self.mid,
            SpectralBand::HighMid => self.high_mid,
            SpectralBand::Brightness => self.brightness,
            SpectralBand::Presence => self.presence,
        }
    }

    /// Iterate all bands with their measured levels.
    pub fn iter(&self) -> impl Iterator<Item = (SpectralBand, Option<f64>)> + '_ {
        SpectralBand::ALL.into_iter().map(|b| (b, self.level(b)))
    }
}
