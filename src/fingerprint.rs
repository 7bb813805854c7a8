use crate::fingerprint::utils::FromVec;
use crate::Errors;
use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ultraviolet::f32x8;

pub mod utils;

/// Embedding vector representation. The vector is split into SIMD lanes, the last lane is
/// padded with zeros which does not affect dot products.
pub type Feature = Vec<f32x8>;

/// Number of SIMD lanes used to store embedding parts internally
pub const FEATURE_LANES_SIZE: usize = 8;

/// Perceptual hash methods of the ensemble. The declaration order is the canonical order used
/// for iteration, nomination and persistence.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashMethod {
    /// Mean-thresholded luminance thumbnail
    Average,
    /// Horizontal gradient signs
    Difference,
    /// Low-frequency DCT coefficients against their median
    Perceptual,
    /// Haar wavelet approximation against its median
    Wavelet,
}

impl HashMethod {
    pub const ALL: [HashMethod; 4] = [
        HashMethod::Average,
        HashMethod::Difference,
        HashMethod::Perceptual,
        HashMethod::Wavelet,
    ];

    /// Name of the method as used in reference file names
    ///
    pub fn name(&self) -> &'static str {
        match self {
            HashMethod::Average => "average_hash",
            HashMethod::Difference => "dhash",
            HashMethod::Perceptual => "phash",
            HashMethod::Wavelet => "whash",
        }
    }
}

impl fmt::Display for HashMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-length bit pattern produced by a perceptual hash method.
///
/// Bits are kept in row-major order of the hashed thumbnail, the first bit is the most
/// significant one of the first word.
///
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageHash {
    bits: usize,
    words: Vec<u64>,
}

impl ImageHash {
    pub fn from_bits(bits: &[bool]) -> Self {
        let mut words = vec![0u64; bits.len().div_ceil(64)];
        for (i, _) in bits.iter().enumerate().filter(|(_, b)| **b) {
            words[i / 64] |= 1u64 << (63 - i % 64);
        }
        Self {
            bits: bits.len(),
            words,
        }
    }

    /// Number of bits in the code
    ///
    pub fn len(&self) -> usize {
        self.bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn bit(&self, i: usize) -> bool {
        i < self.bits && self.words[i / 64] & (1u64 << (63 - i % 64)) != 0
    }

    pub(crate) fn words(&self) -> &[u64] {
        &self.words
    }

    /// Canonical string form: lowercase hex of the bit array, most significant bit first,
    /// zero-padded on the left to `ceil(bits / 4)` digits.
    ///
    pub fn to_hex(&self) -> String {
        let width = self.bits.div_ceil(4);
        let pad = width * 4 - self.bits;
        let mut out = String::with_capacity(width);
        for digit in 0..width {
            let mut nibble = 0u32;
            for k in 0..4 {
                let pos = digit * 4 + k;
                let set = pos >= pad && self.bit(pos - pad);
                nibble = (nibble << 1) | u32::from(set);
            }
            out.push(char::from_digit(nibble, 16).unwrap_or('0'));
        }
        out
    }

    /// Parses a canonical hex string holding exactly `bits` bits. Padding bits on the left
    /// must be zero.
    ///
    pub fn from_hex(hex: &str, bits: usize) -> Result<Self> {
        let hex = hex.trim();
        if hex.is_empty() || hex.len() != bits.div_ceil(4) {
            return Err(Errors::MalformedHash(hex.to_string()).into());
        }
        let pad = hex.len() * 4 - bits;
        let mut all = Vec::with_capacity(hex.len() * 4);
        for c in hex.chars() {
            let v = c
                .to_digit(16)
                .ok_or_else(|| Errors::MalformedHash(hex.to_string()))?;
            for k in (0..4).rev() {
                all.push((v >> k) & 1 == 1);
            }
        }
        if all[..pad].iter().any(|b| *b) {
            return Err(Errors::MalformedHash(hex.to_string()).into());
        }
        Ok(Self::from_bits(&all[pad..]))
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Parses a hex string as a code of `4 * len` bits
///
impl FromStr for ImageHash {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        ImageHash::from_hex(s, s.len() * 4)
    }
}

/// Hash codes of one image, one per method
pub type HashEnsemble = BTreeMap<HashMethod, ImageHash>;

/// Comparable representation of a card image
///
#[derive(Debug, Clone)]
pub enum Fingerprint {
    /// `dim` is the length of the vector before it was split into lanes
    Embedding { dim: usize, feature: Feature },
    Hashes(HashEnsemble),
}

impl Fingerprint {
    pub fn embedding(vector: &[f32]) -> Self {
        Fingerprint::Embedding {
            dim: vector.len(),
            feature: Feature::from_vec(vector),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Fingerprint::Embedding { .. } => "embedding",
            Fingerprint::Hashes(_) => "hashes",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::fingerprint::{HashMethod, ImageHash};
    use anyhow::Result;

    #[test]
    fn hex_is_msb_first() -> Result<()> {
        let mut bits = vec![false; 64];
        bits[0] = true;
        bits[63] = true;
        let h = ImageHash::from_bits(&bits);
        assert_eq!(h.to_hex(), "8000000000000001");
        assert_eq!("8000000000000001".parse::<ImageHash>()?, h);
        Ok(())
    }

    #[test]
    fn hex_padding_for_odd_sizes() -> Result<()> {
        let h = ImageHash::from_bits(&[true, false, true, true, false, true]);
        assert_eq!(h.to_hex(), "2d");
        let back = ImageHash::from_hex("2d", 6)?;
        assert_eq!(back, h);
        assert!(ImageHash::from_hex("ed", 6).is_err());
        Ok(())
    }

    #[test]
    fn malformed_hex() {
        assert!("zz".parse::<ImageHash>().is_err());
        assert!("".parse::<ImageHash>().is_err());
        assert!(ImageHash::from_hex("ff", 12).is_err());
    }

    #[test]
    fn method_order_and_names() {
        let names = HashMethod::ALL.iter().map(|m| m.name()).collect::<Vec<_>>();
        assert_eq!(names, vec!["average_hash", "dhash", "phash", "whash"]);
        assert!(HashMethod::Average < HashMethod::Wavelet);
    }
}
