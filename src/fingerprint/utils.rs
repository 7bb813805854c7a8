use crate::fingerprint::{Feature, FEATURE_LANES_SIZE};
use ultraviolet::f32x8;

impl FromVec<&Feature, Vec<f32>> for Vec<f32> {
    fn from_vec(vec: &Feature) -> Vec<f32> {
        let mut res = Vec::with_capacity(vec.len() * FEATURE_LANES_SIZE);
        for e in vec {
            res.extend_from_slice(e.as_array_ref());
        }
        res
    }
}

/// Feature from Vec<f32>
///
impl FromVec<Vec<f32>, Feature> for Feature {
    fn from_vec(vec: Vec<f32>) -> Feature {
        Feature::from_vec(vec.as_slice())
    }
}

/// Feature from &[f32]
///
impl FromVec<&[f32], Feature> for Feature {
    fn from_vec(vec: &[f32]) -> Feature {
        let mut feature = Feature::with_capacity(vec.len().div_ceil(FEATURE_LANES_SIZE));
        for chunk in vec.chunks(FEATURE_LANES_SIZE) {
            let mut acc = [0.0f32; FEATURE_LANES_SIZE];
            acc[..chunk.len()].copy_from_slice(chunk);
            feature.push(f32x8::new(acc));
        }
        feature
    }
}

/// Utility trait to get conversion between feature vector representations
///
pub trait FromVec<V, R> {
    fn from_vec(vec: V) -> R;
}
