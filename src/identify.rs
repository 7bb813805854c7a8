use crate::cache::FifoCache;
use crate::encoders::FingerprintEncoder;
use crate::extract::{extract_card, is_empty_region, Detection};
use crate::search::{Ranking, ReferenceMatcher};
use anyhow::{Context, Result};
use image::RgbImage;
use log::{debug, warn};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Builder for the identifier
pub mod builder;


/// Default number of tracks the identifier remembers
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Catalog metadata service. Only the best candidate of a track is looked up.
///
pub trait CatalogLookup: Send + Sync {
    type Metadata: Clone + Send;

    /// `Ok(None)` when the catalog has no entry for the id, `Err` when the service failed
    ///
    fn lookup(&self, catalog_id: &str) -> Result<Option<Self::Metadata>>;
}

/// Lookup that accepts every id and returns it as the metadata
///
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLookup;

impl CatalogLookup for NoopLookup {
    type Metadata = String;

    fn lookup(&self, catalog_id: &str) -> Result<Option<String>> {
        Ok(Some(catalog_id.to_string()))
    }
}

impl<M> CatalogLookup for HashMap<String, M>
where
    M: Clone + Send + Sync,
{
    type Metadata = M;

    fn lookup(&self, catalog_id: &str) -> Result<Option<M>> {
        Ok(self.get(catalog_id).cloned())
    }
}

/// Identified track
///
#[derive(Debug, Clone, PartialEq)]
pub struct Identification<M> {
    pub track_id: u64,
    pub ranking: Ranking,
    pub metadata: M,
    /// The ranking was taken from the cache
    pub cached: bool,
}

impl<M> Identification<M> {
    /// Best matching catalog id
    ///
    pub fn catalog_id(&self) -> &str {
        self.ranking
            .best()
            .map(|c| c.catalog_id.as_str())
            .unwrap_or_default()
    }
}

/// Why a track produced no identification in a frame
///
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Unresolved {
    #[error("the card region is empty")]
    EmptyRegion,
    #[error("the reference produced no candidates")]
    NoCandidates,
    #[error("the catalog has no entry `{0}`")]
    CatalogMiss(String),
    #[error("identification failed: {0}")]
    Failed(String),
}

/// Outcome of one frame, both lists follow the detection order
///
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult<M> {
    pub identified: Vec<Identification<M>>,
    pub unresolved: Vec<(u64, Unresolved)>,
}

impl<M> Default for FrameResult<M> {
    fn default() -> Self {
        Self {
            identified: Vec::new(),
            unresolved: Vec::new(),
        }
    }
}

impl<M> FrameResult<M> {
    pub fn get(&self, track_id: u64) -> Option<&Identification<M>> {
        self.identified.iter().find(|i| i.track_id == track_id)
    }
}

/// Reads an image file as an RGB frame
///
pub fn load_frame(path: impl AsRef<Path>) -> Result<RgbImage> {
    let path = path.as_ref();
    Ok(image::open(path)
        .with_context(|| format!("Unable to read image {}", path.display()))?
        .to_rgb8())
}

/// Per-frame identification of tracked cards.
///
/// For every detection a cached ranking of the track is reused, otherwise the card is
/// extracted, fingerprinted and ranked against the reference, and the ranking is cached by
/// the track id. The best candidate is then looked up in the catalog. A failure of one
/// track never affects the other tracks of the frame.
///
/// Reference data is only read, the cache is the single shared mutable structure and all
/// its updates are serialized.
///
pub struct Identifier<E, M, L>
where
    E: FingerprintEncoder,
    M: ReferenceMatcher,
    L: CatalogLookup,
{
    encoder: E,
    matcher: M,
    lookup: L,
    cache: Mutex<FifoCache<u64, Ranking>>,
    pool: Option<ThreadPool>,
}

impl<E, M, L> Identifier<E, M, L>
where
    E: FingerprintEncoder,
    M: ReferenceMatcher,
    L: CatalogLookup,
{
    pub(crate) fn new(
        encoder: E,
        matcher: M,
        lookup: L,
        cache: FifoCache<u64, Ranking>,
        pool: Option<ThreadPool>,
    ) -> Self {
        Self {
            encoder,
            matcher,
            lookup,
            cache: Mutex::new(cache),
            pool,
        }
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    /// Cached ranking of a track
    ///
    pub fn cached(&self, track_id: u64) -> Option<Ranking> {
        self.cache.lock().unwrap().get(&track_id).cloned()
    }

    /// Number of tracks currently remembered
    ///
    pub fn cached_tracks(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    /// Forgets every remembered track
    ///
    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }

    fn rank(&self, frame: &RgbImage, detection: &Detection) -> Result<Ranking, Unresolved> {
        let card = extract_card(detection, frame);
        if is_empty_region(&card) {
            return Err(Unresolved::EmptyRegion);
        }
        let fingerprint = self
            .encoder
            .encode(&card)
            .map_err(|e| Unresolved::Failed(format!("{:#}", e)))?;
        let ranking = self
            .matcher
            .rank(&fingerprint)
            .map_err(|e| Unresolved::Failed(format!("{:#}", e)))?;
        if ranking.is_empty() {
            return Err(Unresolved::NoCandidates);
        }
        Ok(ranking)
    }

    /// Identifies one tracked card of a frame
    ///
    pub fn identify(
        &self,
        frame: &RgbImage,
        detection: &Detection,
    ) -> Result<Identification<L::Metadata>, Unresolved> {
        let track_id = detection.track_id;
        let (ranking, cached) = match self.cached(track_id) {
            Some(ranking) => {
                debug!("Track {} is served from the cache", track_id);
                (ranking, true)
            }
            None => {
                let ranking = self.rank(frame, detection)?;
                let evicted = self.cache.lock().unwrap().put(track_id, ranking.clone());
                if let Some((evicted, _)) = evicted {
                    debug!("Track {} is evicted from the cache", evicted);
                }
                (ranking, false)
            }
        };

        let best = match ranking.best() {
            Some(best) => best.catalog_id.clone(),
            None => return Err(Unresolved::NoCandidates),
        };
        match self.lookup.lookup(&best) {
            Ok(Some(metadata)) => Ok(Identification {
                track_id,
                ranking,
                metadata,
                cached,
            }),
            Ok(None) => Err(Unresolved::CatalogMiss(best)),
            Err(e) => Err(Unresolved::Failed(format!(
                "catalog lookup of `{}`: {:#}",
                best, e
            ))),
        }
    }

    /// Identifies every tracked card of a frame. Detections run on the identifier's worker
    /// pool when it has one, sequentially otherwise.
    ///
    pub fn identify_frame(
        &self,
        frame: &RgbImage,
        detections: &[Detection],
    ) -> FrameResult<L::Metadata> {
        let outcomes = match &self.pool {
            Some(pool) => pool.install(|| {
                detections
                    .par_iter()
                    .map(|d| (d.track_id, self.identify(frame, d)))
                    .collect::<Vec<_>>()
            }),
            None => detections
                .iter()
                .map(|d| (d.track_id, self.identify(frame, d)))
                .collect::<Vec<_>>(),
        };

        let mut res = FrameResult::default();
        for (track_id, outcome) in outcomes {
            match outcome {
                Ok(identification) => res.identified.push(identification),
                Err(reason) => {
                    warn!("Track {} is unresolved: {}", track_id, reason);
                    res.unresolved.push((track_id, reason));
                }
            }
        }
        res
    }
}
