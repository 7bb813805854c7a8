use crate::encoders::FingerprintEncoder;
use crate::extract::is_empty_region;
use crate::fingerprint::{Fingerprint, HashEnsemble, HashMethod, ImageHash};
use crate::Errors;
use anyhow::Result;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use nalgebra::DMatrix;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// DCT-II basis for the default perceptual hash thumbnail (8 x 4)
static DCT_32: Lazy<DMatrix<f64>> = Lazy::new(|| dct_basis(32));

/// Largest supported `hash_size`, codes have at most `256^2` bits
pub const MAX_HASH_SIZE: u32 = 256;

/// Largest side of the perceptual hash thumbnail
pub const MAX_THUMBNAIL_SIDE: u32 = 4096;

/// Parameters of the hash methods. Reference tables are only comparable with queries hashed
/// with the same parameters.
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashOptions {
    hash_size: u32,
    highfreq_factor: u32,
}

impl Default for HashOptions {
    fn default() -> Self {
        Self {
            hash_size: 8,
            highfreq_factor: 4,
        }
    }
}

impl HashOptions {
    /// Side of the hashed thumbnail, every code has `hash_size^2` bits
    ///
    pub fn hash_size(mut self, n: u32) -> Self {
        self.hash_size = n;
        self
    }

    /// Perceptual hash works on a `hash_size * highfreq_factor` square before keeping the
    /// lowest `hash_size x hash_size` frequencies
    ///
    pub fn highfreq_factor(mut self, n: u32) -> Self {
        self.highfreq_factor = n;
        self
    }

    pub fn bits(&self) -> usize {
        self.hash_size as usize * self.hash_size as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.hash_size < 2 || !self.hash_size.is_power_of_two() {
            return Err(Errors::InvalidConfiguration(
                "hash_size",
                format!("{} must be a power of two not less than 2", self.hash_size),
            )
            .into());
        }
        if self.hash_size > MAX_HASH_SIZE {
            return Err(Errors::InvalidConfiguration(
                "hash_size",
                format!("{} exceeds {}", self.hash_size, MAX_HASH_SIZE),
            )
            .into());
        }
        if self.highfreq_factor == 0 {
            return Err(
                Errors::InvalidConfiguration("highfreq_factor", "must be positive".into()).into(),
            );
        }
        if self
            .hash_size
            .checked_mul(self.highfreq_factor)
            .map_or(true, |side| side > MAX_THUMBNAIL_SIDE)
        {
            return Err(Errors::InvalidConfiguration(
                "highfreq_factor",
                format!(
                    "{} x {} exceeds the {} pixel thumbnail side",
                    self.hash_size, self.highfreq_factor, MAX_THUMBNAIL_SIDE
                ),
            )
            .into());
        }
        Ok(())
    }
}

/// ITU-R 601-2 luma transform in 16-bit fixed point:
/// `L = R * 299/1000 + G * 587/1000 + B * 114/1000`
///
pub fn luma(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let l = (u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471 + 0x8000) >> 16;
        Luma([l as u8])
    })
}

fn thumbnail(gray: &GrayImage, width: u32, height: u32) -> GrayImage {
    if gray.dimensions() == (width, height) {
        gray.clone()
    } else {
        imageops::resize(gray, width, height, FilterType::Lanczos3)
    }
}

fn to_matrix(gray: &GrayImage) -> DMatrix<f64> {
    DMatrix::from_fn(gray.height() as usize, gray.width() as usize, |r, c| {
        f64::from(gray.get_pixel(c as u32, r as u32).0[0])
    })
}

/// Median with the even-length convention of averaging the two middle values
///
fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Unnormalized DCT-II basis: `C[k][n] = 2 cos(pi k (2n + 1) / 2N)`
///
fn dct_basis(n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(n, n, |k, i| {
        2.0 * (PI * k as f64 * (2 * i + 1) as f64 / (2 * n) as f64).cos()
    })
}

/// One level of the Haar approximation: every 2x2 block becomes `(a + b + c + d) / 2`
///
fn haar_lowpass(m: &DMatrix<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(m.nrows() / 2, m.ncols() / 2, |r, c| {
        (m[(2 * r, 2 * c)] + m[(2 * r, 2 * c + 1)] + m[(2 * r + 1, 2 * c)] + m[(2 * r + 1, 2 * c + 1)])
            / 2.0
    })
}

fn check_input(image: &RgbImage) -> Result<GrayImage> {
    if is_empty_region(image) {
        return Err(Errors::EmptyRegion.into());
    }
    Ok(luma(image))
}

/// Average hash: luminance thumbnail thresholded by its mean
///
pub fn average_hash(image: &RgbImage, opts: &HashOptions) -> Result<ImageHash> {
    let gray = check_input(image)?;
    let small = thumbnail(&gray, opts.hash_size, opts.hash_size);
    let values = small.pixels().map(|p| f64::from(p.0[0])).collect::<Vec<_>>();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Ok(ImageHash::from_bits(
        &values.iter().map(|v| *v > mean).collect::<Vec<_>>(),
    ))
}

/// Difference hash: sign of the horizontal gradient of a `(hash_size + 1) x hash_size`
/// thumbnail
///
pub fn difference_hash(image: &RgbImage, opts: &HashOptions) -> Result<ImageHash> {
    let gray = check_input(image)?;
    let n = opts.hash_size;
    let small = thumbnail(&gray, n + 1, n);
    let mut bits = Vec::with_capacity(opts.bits());
    for y in 0..n {
        for x in 0..n {
            bits.push(small.get_pixel(x + 1, y).0[0] > small.get_pixel(x, y).0[0]);
        }
    }
    Ok(ImageHash::from_bits(&bits))
}

/// Perceptual hash: the lowest `hash_size x hash_size` coefficients of the 2D DCT-II of a
/// `hash_size * highfreq_factor` thumbnail, thresholded by their median
///
pub fn perceptual_hash(image: &RgbImage, opts: &HashOptions) -> Result<ImageHash> {
    let gray = check_input(image)?;
    let side = opts.hash_size * opts.highfreq_factor;
    let pixels = to_matrix(&thumbnail(&gray, side, side));
    let basis = if side == 32 {
        DCT_32.clone()
    } else {
        dct_basis(side as usize)
    };
    let dct = &basis * pixels * basis.transpose();
    let n = opts.hash_size as usize;
    let low = dct.view((0, 0), (n, n));
    let values = (0..n)
        .flat_map(|r| (0..n).map(move |c| (r, c)))
        .map(|(r, c)| low[(r, c)])
        .collect::<Vec<_>>();
    let med = median(&values);
    Ok(ImageHash::from_bits(
        &values.iter().map(|v| *v > med).collect::<Vec<_>>(),
    ))
}

/// Wavelet hash: Haar approximation of the card thresholded by its median.
///
/// The card is resized to the largest power of two not exceeding its shorter side (but not
/// smaller than `hash_size`), the constant component (the deepest Haar approximation) is
/// removed, and the approximation is taken at the level that leaves `hash_size x hash_size`
/// coefficients.
///
pub fn wavelet_hash(image: &RgbImage, opts: &HashOptions) -> Result<ImageHash> {
    let gray = check_input(image)?;
    let shorter = gray.width().min(gray.height());
    let natural = 1u32 << (31 - shorter.leading_zeros());
    let scale = natural.max(opts.hash_size);
    let dwt_level = scale.trailing_zeros() - opts.hash_size.trailing_zeros();

    let mut pixels = to_matrix(&thumbnail(&gray, scale, scale)) / 255.0;
    let mean = pixels.mean();
    pixels.add_scalar_mut(-mean);
    for _ in 0..dwt_level {
        pixels = haar_lowpass(&pixels);
    }
    let values = pixels.transpose().iter().copied().collect::<Vec<_>>();
    let med = median(&values);
    Ok(ImageHash::from_bits(
        &values.iter().map(|v| *v > med).collect::<Vec<_>>(),
    ))
}

/// Perceptual hash ensemble strategy
///
#[derive(Debug, Clone, Default)]
pub struct HashEncoder {
    opts: HashOptions,
}

impl HashEncoder {
    pub fn new(opts: HashOptions) -> Result<Self> {
        opts.validate()?;
        Ok(Self { opts })
    }

    pub fn options(&self) -> &HashOptions {
        &self.opts
    }

    pub fn hash(&self, method: HashMethod, image: &RgbImage) -> Result<ImageHash> {
        match method {
            HashMethod::Average => average_hash(image, &self.opts),
            HashMethod::Difference => difference_hash(image, &self.opts),
            HashMethod::Perceptual => perceptual_hash(image, &self.opts),
            HashMethod::Wavelet => wavelet_hash(image, &self.opts),
        }
    }

    /// All four codes of the image
    ///
    pub fn ensemble(&self, image: &RgbImage) -> Result<HashEnsemble> {
        HashMethod::ALL
            .iter()
            .map(|m| -> Result<(HashMethod, ImageHash)> { Ok((*m, self.hash(*m, image)?)) })
            .collect()
    }
}

impl FingerprintEncoder for HashEncoder {
    fn encode(&self, image: &RgbImage) -> Result<Fingerprint> {
        Ok(Fingerprint::Hashes(self.ensemble(image)?))
    }
}
