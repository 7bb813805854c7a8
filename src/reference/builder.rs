use crate::encoders::embedding::{EmbeddingEncoder, FeatureExtractor};
use crate::encoders::hash::HashEncoder;
use crate::fingerprint::HashEnsemble;
use crate::identify::load_frame;
use crate::reference::{is_reference_image, EmbeddingIndex, HashIndex};
use anyhow::{Context, Result};
use image::RgbImage;
use log::{info, warn};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Reference images of a directory (`png`, `jpg`, `jpeg`) sorted by path
///
pub fn reference_images(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut paths = fs::read_dir(dir)
        .with_context(|| format!("Unable to list reference directory {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_reference_image(p))
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
}

/// Fingerprints every reference image of `dir` keyed by its file stem. Images that cannot
/// be read or fingerprinted are skipped.
///
fn fingerprint_dir<T, F>(dir: &Path, fingerprint: F) -> Result<Vec<(String, T)>>
where
    T: Send,
    F: Fn(&RgbImage) -> Result<T> + Sync,
{
    let paths = reference_images(dir)?;
    let res = paths
        .par_iter()
        .filter_map(|path| {
            let id = path.file_stem()?.to_string_lossy().to_string();
            match load_frame(path).and_then(|img| fingerprint(&img)) {
                Ok(v) => Some((id, v)),
                Err(e) => {
                    warn!("Reference image {} is skipped: {:#}", path.display(), e);
                    None
                }
            }
        })
        .collect::<Vec<_>>();
    info!(
        "Fingerprinted {} of {} reference images in {}",
        res.len(),
        paths.len(),
        dir.display()
    );
    Ok(res)
}

/// Builds the four hash tables of a catalog
///
#[derive(Debug, Clone, Default)]
pub struct HashIndexBuilder {
    encoder: HashEncoder,
}

impl HashIndexBuilder {
    pub fn new(encoder: HashEncoder) -> Self {
        Self { encoder }
    }

    fn collect(&self, hashed: Vec<(String, HashEnsemble)>) -> Result<HashIndex> {
        let mut index = HashIndex::new(self.encoder.options().bits());
        for (id, ensemble) in hashed {
            for (method, code) in ensemble {
                index.insert(method, code, id.as_str())?;
            }
        }
        Ok(index)
    }

    /// Hashes `(catalog_id, image)` pairs. Table order follows the input order.
    ///
    pub fn build_from_images(&self, images: Vec<(String, RgbImage)>) -> Result<HashIndex> {
        let hashed = images
            .into_par_iter()
            .map(|(id, img)| -> Result<(String, HashEnsemble)> {
                Ok((id, self.encoder.ensemble(&img)?))
            })
            .collect::<Result<Vec<_>>>()?;
        self.collect(hashed)
    }

    /// Hashes every reference image of `dir`, the catalog id is the file stem
    ///
    pub fn build_from_dir(&self, dir: impl AsRef<Path>) -> Result<HashIndex> {
        let hashed = fingerprint_dir(dir.as_ref(), |img| self.encoder.ensemble(img))?;
        self.collect(hashed)
    }
}

/// Builds the embedding reference of a catalog with a feature extractor
///
pub struct EmbeddingIndexBuilder<X: FeatureExtractor> {
    encoder: EmbeddingEncoder<X>,
}

impl<X: FeatureExtractor> EmbeddingIndexBuilder<X> {
    pub fn new(encoder: EmbeddingEncoder<X>) -> Self {
        Self { encoder }
    }

    pub fn build_from_images(&self, images: Vec<(String, RgbImage)>) -> Result<EmbeddingIndex> {
        let embedded = images
            .into_par_iter()
            .map(|(id, img)| -> Result<(String, Vec<f32>)> {
                Ok((id, self.encoder.embed(&img)?))
            })
            .collect::<Result<Vec<_>>>()?;
        EmbeddingIndex::from_pairs(embedded)
    }

    pub fn build_from_dir(&self, dir: impl AsRef<Path>) -> Result<EmbeddingIndex> {
        EmbeddingIndex::from_pairs(fingerprint_dir(dir.as_ref(), |img| {
            self.encoder.embed(img)
        })?)
    }
}

#[cfg(test)]
mod tests {
    use crate::encoders::embedding::{EmbeddingEncoder, GridPoolExtractor, PreprocessOptions};
    use crate::encoders::hash::HashEncoder;
    use crate::fingerprint::HashMethod;
    use crate::reference::builder::{
        reference_images, EmbeddingIndexBuilder, HashIndexBuilder,
    };
    use crate::test_stuff::{random_frame, solid_frame};
    use anyhow::Result;
    use image::ImageFormat;
    use std::fs;

    #[test]
    fn directory_listing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        random_frame(8, 8, 1).save(dir.path().join("b.png"))?;
        random_frame(8, 8, 2).save_with_format(dir.path().join("a.JPG"), ImageFormat::Jpeg)?;
        fs::write(dir.path().join("notes.txt"), "x")?;
        let names = reference_images(dir.path())?
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a.JPG", "b.png"]);
        Ok(())
    }

    #[test]
    fn hash_tables_from_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        random_frame(40, 56, 1).save(dir.path().join("xy1-1.png"))?;
        random_frame(40, 56, 2).save(dir.path().join("xy1-2.png"))?;
        fs::write(dir.path().join("broken.png"), "not an image")?;

        let index = HashIndexBuilder::default().build_from_dir(dir.path())?;
        assert_eq!(index.bits(), 64);
        for m in HashMethod::ALL {
            let ids = index
                .table(m)
                .iter()
                .map(|(_, id)| id.as_str())
                .collect::<Vec<_>>();
            assert_eq!(ids, vec!["xy1-1", "xy1-2"], "{}", m);
        }
        Ok(())
    }

    #[test]
    fn identical_images_share_codes() -> Result<()> {
        let builder = HashIndexBuilder::new(HashEncoder::default());
        let index = builder.build_from_images(vec![
            ("first".to_string(), solid_frame(10, 10, [9, 9, 9])),
            ("second".to_string(), solid_frame(10, 10, [9, 9, 9])),
        ])?;
        // the later id takes the shared code
        for m in HashMethod::ALL {
            assert_eq!(index.len(m), 1);
            assert_eq!(index.table(m)[0].1, "second");
        }
        Ok(())
    }

    #[test]
    fn embeddings_from_images() -> Result<()> {
        let encoder = EmbeddingEncoder::new(
            PreprocessOptions::default().size(16),
            GridPoolExtractor::default(),
        )?;
        let index = EmbeddingIndexBuilder::new(encoder).build_from_images(vec![
            ("a".to_string(), random_frame(20, 30, 1)),
            ("b".to_string(), random_frame(20, 30, 2)),
        ])?;
        assert_eq!(index.len(), 2);
        assert_eq!(index.dim(), 48);
        assert!(EmbeddingIndexBuilder::new(EmbeddingEncoder::new(
            PreprocessOptions::default().size(16),
            GridPoolExtractor::default(),
        )?)
        .build_from_images(vec![("e".to_string(), image::RgbImage::new(0, 0))])
        .is_err());
        Ok(())
    }
}
