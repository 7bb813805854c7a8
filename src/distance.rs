use crate::fingerprint::{Feature, ImageHash};
use crate::Errors;
use anyhow::Result;

/// Cosine similarity between two vectors
///
/// When the features lengths don't match, the longer feature vector is truncated to
/// shorter one when the similarity is calculated. A zero vector has similarity `0.0` with
/// everything.
///
pub fn cosine(f1: &Feature, f2: &Feature) -> f32 {
    let len = f1.len().min(f2.len());
    let divided = f1
        .iter()
        .zip(f2.iter())
        .fold(0.0_f32, |acc, (a, b)| acc + (*a * *b).reduce_add());

    let f1_divisor = f1
        .iter()
        .take(len)
        .fold(0.0_f32, |acc, a| acc + (*a * *a).reduce_add());

    let f2_divisor = f2
        .iter()
        .take(len)
        .fold(0.0_f32, |acc, a| acc + (*a * *a).reduce_add());

    let divisor = (f1_divisor * f2_divisor).sqrt();
    if divisor <= 0.0 || !divisor.is_finite() {
        return 0.0;
    }
    divided / divisor
}

/// Hamming distance between two hash codes of the same size
///
pub fn hamming(h1: &ImageHash, h2: &ImageHash) -> Result<u32> {
    if h1.len() != h2.len() {
        return Err(Errors::HashSizeMismatch(h1.len(), h2.len()).into());
    }
    Ok(h1
        .words()
        .iter()
        .zip(h2.words())
        .map(|(a, b)| (a ^ b).count_ones())
        .sum())
}
