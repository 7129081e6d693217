//! Fixed collaborator doubles and feature fixtures.

use std::collections::HashMap;

use async_trait::async_trait;

use mixgauge_analysis_server::extract::{ExtractError, FeatureExtractor};
use mixgauge_analysis_server::scoring::{FeatureSet, SpectralBands};
use mixgauge_analysis_server::storage::{BlobStore, StorageError};

/// A clean house master sitting on every profile target.
pub const CLIP_REF: &str = "uploads/clip.wav";
/// Same master pushed over full scale.
pub const CLIPPED_REF: &str = "uploads/clipped.wav";
/// A payload too small to be audio.
pub const TINY_REF: &str = "uploads/tiny.wav";

fn house_master_features() -> FeatureSet {
    FeatureSet {
        lufs_integrated: -9.0,
        loudness_range: 7.0,
        true_peak_dbtp: -1.0,
        clipping_pct: 0.0,
        dynamic_range: 7.0,
        crest_factor: 12.0,
        stereo_width: 0.55,
        stereo_correlation: 0.6,
        balance_lr: 0.0,
        dc_offset: 0.0,
        spectral_centroid_hz: Some(3000.0),
        spectral_flatness: Some(0.2),
        bands: SpectralBands {
            sub: Some(-17.0),
            low_bass: Some(-15.0),
            upper_bass: Some(-16.0),
            low_mid: Some(-18.0),
            mid: Some(-16.0),
            high_mid: Some(-19.0),
            brightness: Some(-21.0),
            presence: Some(-23.0),
        },
    }
}

fn over_peak_features() -> FeatureSet {
    FeatureSet {
        true_peak_dbtp: 0.5,
        ..house_master_features()
    }
}

/// Blob store double backed by a fixed object map.
pub struct FixedBlobStore {
    objects: HashMap<String, Vec<u8>>,
}

impl FixedBlobStore {
    pub fn with_standard_objects() -> Self {
        let mut objects = HashMap::new();
        objects.insert(CLIP_REF.to_string(), vec![0u8; 8192]);
        objects.insert(CLIPPED_REF.to_string(), vec![0u8; 8192]);
        objects.insert(TINY_REF.to_string(), vec![0u8; 8]);
        Self { objects }
    }
}

#[async_trait]
impl BlobStore for FixedBlobStore {
    async fn fetch_bytes(&self, input_ref: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .get(input_ref)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(input_ref.to_string()))
    }
}

/// Extractor double returning canned features per input reference.
pub struct FixedFeatureExtractor {
    features: HashMap<String, FeatureSet>,
}

impl FixedFeatureExtractor {
    pub fn with_standard_features() -> Self {
        let mut features = HashMap::new();
        features.insert(CLIP_REF.to_string(), house_master_features());
        features.insert(CLIPPED_REF.to_string(), over_peak_features());
        Self { features }
    }
}

#[async_trait]
impl FeatureExtractor for FixedFeatureExtractor {
    async fn extract(&self, input_ref: &str, _bytes: Vec<u8>) -> Result<FeatureSet, ExtractError> {
        self.features
            .get(input_ref)
            .cloned()
            .ok_or_else(|| ExtractError::Decode(format!("not an audio payload: {}", input_ref)))
    }
}
