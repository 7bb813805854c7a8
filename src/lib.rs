//! Trading card identification engine.
//!
//! The crate takes the output of an external detector/tracker (mask, center-form box and a
//! stable track id per object), cuts the card out of the frame, fingerprints it with either a
//! learned embedding or an ensemble of perceptual hashes, ranks reference catalog entries by
//! similarity and memoizes the result per track so that repeated frames of the same physical
//! card are not identified again.
//!

/// Frame annotation for resolved tracks
pub mod annotate;

/// Bounded per-track memoization with first-in-first-out eviction
pub mod cache;

/// Distance functions for embeddings and hash codes
pub mod distance;

/// Fingerprint encoders (embedding and perceptual hash ensemble)
pub mod encoders;

/// Card region extraction from detector masks and boxes
pub mod extract;

/// Fingerprint representations
pub mod fingerprint;

/// Weighted score fusion of the perceptual hash signals
pub mod fusion;

/// Per-frame identification orchestration
pub mod identify;

/// Frequently used types
pub mod prelude;

/// Reference databases and their persistence
pub mod reference;

/// Nearest neighbour search over reference databases
pub mod search;

/// Synthetic data generators for tests, benches and demos
pub mod test_stuff;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Errors {
    #[error("The extracted card region is empty.")]
    EmptyRegion,
    #[error("Hash codes of different sizes cannot be compared: {0} bits vs {1} bits.")]
    HashSizeMismatch(usize, usize),
    #[error("Hash string `{0}` is not a valid hexadecimal hash code.")]
    MalformedHash(String),
    #[error("Cache capacity must be a positive number, got {0}.")]
    InvalidCacheCapacity(usize),
    #[error("Invalid configuration value for `{0}`: {1}")]
    InvalidConfiguration(&'static str, String),
    #[error("The component `{0}` must be set before the object is built.")]
    MissingComponent(&'static str),
    #[error("Fingerprint of kind `{0}` cannot be matched by `{1}`.")]
    FingerprintKindMismatch(&'static str, &'static str),
    #[error("The feature extractor returned an empty vector.")]
    EmptyFeature,
    #[error("Embedding dimensions differ: {0} vs {1}.")]
    DimensionMismatch(usize, usize),
    #[error("Reference file `{0}` has unexpected format: {1}")]
    ReferenceFormat(String, String),
}

pub(crate) const EPS: f32 = 0.00001;

/// Approximate comparison for float-carrying values
///
pub trait EstimateClose {
    fn almost_same(&self, other: &Self, eps: f32) -> bool;
}

impl EstimateClose for f32 {
    fn almost_same(&self, other: &Self, eps: f32) -> bool {
        (self - other).abs() < eps
    }
}
