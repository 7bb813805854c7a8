use crate::cache::FifoCache;
use crate::encoders::FingerprintEncoder;
use crate::identify::{CatalogLookup, Identifier, NoopLookup, DEFAULT_CACHE_CAPACITY};
use crate::search::ReferenceMatcher;
use crate::Errors;
use anyhow::{Context, Result};
use rayon::ThreadPoolBuilder;

/// Builder for [`Identifier`]
///
pub struct IdentifierBuilder<E, M, L = NoopLookup>
where
    E: FingerprintEncoder,
    M: ReferenceMatcher,
    L: CatalogLookup,
{
    encoder: Option<E>,
    matcher: Option<M>,
    lookup: Option<L>,
    cache_capacity: usize,
    shards: usize,
}

/// Default builder
/// shards count is set to number cpu cores (threads)
///
impl<E, M, L> Default for IdentifierBuilder<E, M, L>
where
    E: FingerprintEncoder,
    M: ReferenceMatcher,
    L: CatalogLookup,
{
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl<E, M, L> IdentifierBuilder<E, M, L>
where
    E: FingerprintEncoder,
    M: ReferenceMatcher,
    L: CatalogLookup,
{
    /// Creates a new builder
    ///
    /// # Parameters
    /// * `shards` - number of workers identifying the detections of a frame; `1` processes
    ///   them sequentially on the calling thread.
    ///
    pub fn new(shards: usize) -> Self {
        Self {
            encoder: None,
            matcher: None,
            lookup: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            shards,
        }
    }

    /// Sets the fingerprint encoder
    ///
    pub fn encoder(mut self, encoder: E) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Sets the reference matcher, it must work with the fingerprints of the encoder
    ///
    pub fn matcher(mut self, matcher: M) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Sets the catalog lookup
    ///
    pub fn lookup(mut self, lookup: L) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Number of tracks remembered
    ///
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Builds the identifier
    ///
    pub fn build(self) -> Result<Identifier<E, M, L>> {
        let encoder = self.encoder.ok_or(Errors::MissingComponent("encoder"))?;
        let matcher = self.matcher.ok_or(Errors::MissingComponent("matcher"))?;
        let lookup = self.lookup.ok_or(Errors::MissingComponent("lookup"))?;
        if self.shards == 0 {
            return Err(Errors::InvalidConfiguration("shards", "must be positive".into()).into());
        }
        let cache = FifoCache::new(self.cache_capacity)?;
        let pool = if self.shards > 1 {
            Some(
                ThreadPoolBuilder::new()
                    .num_threads(self.shards)
                    .thread_name(|i| format!("identify-{}", i))
                    .build()
                    .context("Unable to start the identification workers")?,
            )
        } else {
            None
        };
        Ok(Identifier::new(encoder, matcher, lookup, cache, pool))
    }
}

impl<E, M> IdentifierBuilder<E, M, NoopLookup>
where
    E: FingerprintEncoder,
    M: ReferenceMatcher,
{
    /// Builder whose lookup accepts every catalog id
    ///
    pub fn without_catalog(shards: usize) -> Self {
        Self::new(shards).lookup(NoopLookup)
    }
}
