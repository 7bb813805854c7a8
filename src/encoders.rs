use crate::fingerprint::Fingerprint;
use anyhow::Result;
use image::RgbImage;

/// Learned embedding strategy: preprocessing and the black-box feature extractor
pub mod embedding;

/// Perceptual hash ensemble strategy
pub mod hash;

/// Common interface of the fingerprinting strategies. The rest of the pipeline only sees
/// this trait, so the strategies can be swapped without touching it.
///
/// Implementations must be deterministic: the same image always produces the same
/// fingerprint.
///
pub trait FingerprintEncoder: Send + Sync {
    fn encode(&self, image: &RgbImage) -> Result<Fingerprint>;
}
