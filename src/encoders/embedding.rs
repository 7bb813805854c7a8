use crate::encoders::FingerprintEncoder;
use crate::extract::is_empty_region;
use crate::fingerprint::Fingerprint;
use crate::Errors;
use anyhow::Result;
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};

const RGB_CHANNELS: usize = 3;

/// ImageNet channel statistics used by the stock torchvision backbones
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Preprocessing parameters of the embedding strategy.
///
/// The parameters must match the ones used when the reference embeddings were built,
/// vectors produced with different preprocessing are not comparable.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessOptions {
    size: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            size: 224,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

impl PreprocessOptions {
    /// Side of the square the card is resized to
    ///
    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Per-channel mean subtracted after scaling pixels to `[0, 1]`
    ///
    pub fn mean(mut self, mean: [f32; 3]) -> Self {
        self.mean = mean;
        self
    }

    /// Per-channel standard deviation the centered values are divided by
    ///
    pub fn std(mut self, std: [f32; 3]) -> Self {
        self.std = std;
        self
    }

    pub fn target_size(&self) -> u32 {
        self.size
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Errors::InvalidConfiguration("size", "must be positive".into()).into());
        }
        if self.std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(Errors::InvalidConfiguration(
                "std",
                format!("{:?} must be finite and positive", self.std),
            )
            .into());
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err(
                Errors::InvalidConfiguration("mean", format!("{:?} must be finite", self.mean))
                    .into(),
            );
        }
        Ok(())
    }
}

/// Normalized CHW tensor fed to the feature extractor
///
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedImage {
    size: usize,
    data: Vec<f32>,
}

impl PreparedImage {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn channels(&self) -> usize {
        RGB_CHANNELS
    }

    /// Channel-major (`C x H x W`) values
    ///
    pub fn as_chw(&self) -> &[f32] {
        &self.data
    }

    pub fn at(&self, c: usize, y: usize, x: usize) -> f32 {
        self.data[c * self.size * self.size + y * self.size + x]
    }
}

/// Resizes the card to the target square, scales pixels to `[0, 1]` and normalizes every
/// channel with the configured mean and standard deviation.
///
pub fn preprocess(image: &RgbImage, opts: &PreprocessOptions) -> Result<PreparedImage> {
    if is_empty_region(image) {
        return Err(Errors::EmptyRegion.into());
    }
    let size = opts.size as usize;
    let resized = if image.dimensions() == (opts.size, opts.size) {
        image.clone()
    } else {
        imageops::resize(image, opts.size, opts.size, FilterType::Triangle)
    };

    let mut data = vec![0.0f32; RGB_CHANNELS * size * size];
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..RGB_CHANNELS {
            let v = f32::from(pixel.0[c]) / 255.0;
            data[c * size * size + y as usize * size + x as usize] =
                (v - opts.mean[c]) / opts.std[c];
        }
    }
    Ok(PreparedImage { size, data })
}

/// Black-box feature extractor (a backbone with its classification head removed).
///
/// The crate never looks inside: it only requires the output to be a flat, fixed-length
/// vector for a given preprocessing.
///
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, input: &PreparedImage) -> Result<Vec<f32>>;
}

/// Deterministic non-learned extractor: every channel is average-pooled over a
/// `grid x grid` lattice of cells. Handy for small catalogs, tests and as a stand-in until a
/// learned backbone is plugged in.
///
#[derive(Debug, Clone)]
pub struct GridPoolExtractor {
    grid: usize,
}

impl Default for GridPoolExtractor {
    fn default() -> Self {
        Self { grid: 4 }
    }
}

impl GridPoolExtractor {
    pub fn new(grid: usize) -> Result<Self> {
        if grid == 0 {
            return Err(Errors::InvalidConfiguration("grid", "must be positive".into()).into());
        }
        Ok(Self { grid })
    }
}

impl FeatureExtractor for GridPoolExtractor {
    fn extract(&self, input: &PreparedImage) -> Result<Vec<f32>> {
        let size = input.size();
        if size < self.grid {
            return Err(Errors::InvalidConfiguration(
                "grid",
                format!("{} cells do not fit into {} pixels", self.grid, size),
            )
            .into());
        }
        let mut res = Vec::with_capacity(input.channels() * self.grid * self.grid);
        for c in 0..input.channels() {
            for gy in 0..self.grid {
                let (y0, y1) = (gy * size / self.grid, (gy + 1) * size / self.grid);
                for gx in 0..self.grid {
                    let (x0, x1) = (gx * size / self.grid, (gx + 1) * size / self.grid);
                    let mut acc = 0.0f32;
                    for y in y0..y1 {
                        for x in x0..x1 {
                            acc += input.at(c, y, x);
                        }
                    }
                    res.push(acc / ((y1 - y0) * (x1 - x0)) as f32);
                }
            }
        }
        Ok(res)
    }
}

/// Embedding strategy: preprocessing followed by the feature extractor
///
pub struct EmbeddingEncoder<X: FeatureExtractor> {
    opts: PreprocessOptions,
    extractor: X,
}

impl<X: FeatureExtractor> EmbeddingEncoder<X> {
    pub fn new(opts: PreprocessOptions, extractor: X) -> Result<Self> {
        opts.validate()?;
        Ok(Self { opts, extractor })
    }

    pub fn options(&self) -> &PreprocessOptions {
        &self.opts
    }

    /// Flat embedding of a card image
    ///
    pub fn embed(&self, image: &RgbImage) -> Result<Vec<f32>> {
        let prepared = preprocess(image, &self.opts)?;
        let vector = self.extractor.extract(&prepared)?;
        if vector.is_empty() {
            return Err(Errors::EmptyFeature.into());
        }
        Ok(vector)
    }
}

impl<X: FeatureExtractor> FingerprintEncoder for EmbeddingEncoder<X> {
    fn encode(&self, image: &RgbImage) -> Result<Fingerprint> {
        Ok(Fingerprint::embedding(&self.embed(image)?))
    }
}
