use crate::distance::{cosine, hamming};
use crate::fingerprint::{Feature, Fingerprint, HashEnsemble, HashMethod, ImageHash};
use crate::fusion::WeightedFusion;
use crate::reference::{EmbeddingIndex, HashIndex};
use crate::Errors;
use anyhow::Result;
use log::debug;
use rayon::prelude::*;
use std::sync::Arc;

/// Number of candidates the embedding matcher keeps by default
pub const DEFAULT_TOP_N: usize = 5;

/// How well a candidate matches the query
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchMetric {
    /// Cosine similarity of embeddings, `1.0` is a perfect match
    Cosine { similarity: f32 },
    /// Fused Hamming distance of the hash ensemble (`0.0` is a perfect match) and its
    /// `[0, 100]` similarity score
    Fused { distance: f32, score: f32 },
}

impl MatchMetric {
    /// Smaller is better for every metric
    ///
    pub fn distance(&self) -> f32 {
        match self {
            MatchMetric::Cosine { similarity } => 1.0 - similarity,
            MatchMetric::Fused { distance, .. } => *distance,
        }
    }
}

/// Catalog entry proposed for a query
///
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub catalog_id: String,
    pub metric: MatchMetric,
}

impl MatchCandidate {
    pub fn new(catalog_id: impl Into<String>, metric: MatchMetric) -> Self {
        Self {
            catalog_id: catalog_id.into(),
            metric,
        }
    }
}

/// Candidates ordered from the best to the worst match
///
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ranking {
    candidates: Vec<MatchCandidate>,
}

impl Ranking {
    pub fn new(candidates: Vec<MatchCandidate>) -> Self {
        Self { candidates }
    }

    pub fn best(&self) -> Option<&MatchCandidate> {
        self.candidates.first()
    }

    pub fn candidates(&self) -> &[MatchCandidate] {
        &self.candidates
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchCandidate> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Nearest reference entry of one hash method
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodMatch {
    pub method: HashMethod,
    pub catalog_id: String,
    pub distance: u32,
}

impl MethodMatch {
    pub fn new(method: HashMethod, catalog_id: impl Into<String>, distance: u32) -> Self {
        Self {
            method,
            catalog_id: catalog_id.into(),
            distance,
        }
    }
}

/// Ranks reference entries against a fingerprint. Implementations only read the reference
/// data, so one matcher may serve several workers at once.
///
pub trait ReferenceMatcher: Send + Sync {
    fn rank(&self, fingerprint: &Fingerprint) -> Result<Ranking>;
}

/// Cosine similarity against every reference vector, the `n` most similar first.
///
/// The sort is stable: entries with equal similarity keep the reference order.
///
pub fn top_n_cosine(
    query: &Feature,
    entries: &[(String, Feature)],
    n: usize,
) -> Vec<MatchCandidate> {
    let mut scored = entries
        .par_iter()
        .map(|(id, feature)| (id, cosine(query, feature)))
        .collect::<Vec<_>>();
    scored.sort_by(|(_, l), (_, r)| r.total_cmp(l));
    scored
        .into_iter()
        .take(n)
        .map(|(id, similarity)| {
            MatchCandidate::new(id.as_str(), MatchMetric::Cosine { similarity })
        })
        .collect()
}

/// Entry with the minimum Hamming distance to `query`. The scan keeps the first encountered
/// entry among equally distant ones.
///
pub fn nearest_hash<'a>(
    query: &ImageHash,
    table: &'a [(ImageHash, String)],
) -> Result<Option<(&'a str, u32)>> {
    let mut best: Option<(&'a str, u32)> = None;
    for (code, id) in table {
        let d = hamming(query, code)?;
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((id.as_str(), d)),
        }
    }
    Ok(best)
}

/// Top-N cosine search over an embedding reference
///
pub struct EmbeddingMatcher {
    index: Arc<EmbeddingIndex>,
    top_n: usize,
}

impl EmbeddingMatcher {
    pub fn new(index: Arc<EmbeddingIndex>, top_n: usize) -> Result<Self> {
        if top_n == 0 {
            return Err(Errors::InvalidConfiguration("top_n", "must be positive".into()).into());
        }
        Ok(Self { index, top_n })
    }

    pub fn with_default_top_n(index: Arc<EmbeddingIndex>) -> Self {
        Self {
            index,
            top_n: DEFAULT_TOP_N,
        }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    /// Ranks the reference against `query`, a vector of `dim` values split into lanes
    ///
    pub fn search(&self, query: &Feature, dim: usize) -> Result<Ranking> {
        if self.index.is_empty() {
            debug!("Embedding reference is empty, nothing to match");
            return Ok(Ranking::default());
        }
        if dim != self.index.dim() || query.len() != self.index.lanes() {
            return Err(Errors::DimensionMismatch(dim, self.index.dim()).into());
        }
        Ok(Ranking::new(top_n_cosine(
            query,
            self.index.entries(),
            self.top_n,
        )))
    }
}

impl ReferenceMatcher for EmbeddingMatcher {
    fn rank(&self, fingerprint: &Fingerprint) -> Result<Ranking> {
        match fingerprint {
            Fingerprint::Embedding { dim, feature } => self.search(feature, *dim),
            other => Err(Errors::FingerprintKindMismatch(other.kind(), "embedding").into()),
        }
    }
}

/// Per-method nearest hash search followed by weighted fusion
///
pub struct HashMatcher {
    index: Arc<HashIndex>,
    fusion: WeightedFusion,
}

impl HashMatcher {
    pub fn new(index: Arc<HashIndex>, fusion: WeightedFusion) -> Self {
        Self { index, fusion }
    }

    pub fn index(&self) -> &HashIndex {
        &self.index
    }

    pub fn fusion(&self) -> &WeightedFusion {
        &self.fusion
    }

    /// Nearest entry of every method that has both a query code and a non-empty table, in
    /// the canonical method order
    ///
    pub fn nearest(&self, query: &HashEnsemble) -> Result<Vec<MethodMatch>> {
        let mut res = Vec::with_capacity(HashMethod::ALL.len());
        for method in HashMethod::ALL {
            let code = match query.get(&method) {
                Some(c) => c,
                None => continue,
            };
            match nearest_hash(code, self.index.table(method))? {
                Some((id, distance)) => {
                    debug!("{}: nearest {} at {}", method, id, distance);
                    res.push(MethodMatch::new(method, id, distance));
                }
                None => debug!("{}: reference table is empty", method),
            }
        }
        Ok(res)
    }
}

impl ReferenceMatcher for HashMatcher {
    fn rank(&self, fingerprint: &Fingerprint) -> Result<Ranking> {
        match fingerprint {
            Fingerprint::Hashes(h) => Ok(self.fusion.fuse(&self.nearest(h)?)),
            other => Err(Errors::FingerprintKindMismatch(other.kind(), "hashes").into()),
        }
    }
}
