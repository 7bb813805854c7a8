pub use crate::annotate::annotate_frame;
pub use crate::cache::FifoCache;
pub use crate::encoders::embedding::{
    EmbeddingEncoder, FeatureExtractor, GridPoolExtractor, PreprocessOptions,
};
pub use crate::encoders::hash::{HashEncoder, HashOptions};
pub use crate::encoders::FingerprintEncoder;
pub use crate::extract::{extract_card, segment_card, CenterBox, Detection, Mask};
pub use crate::fingerprint::utils::FromVec;
pub use crate::fingerprint::{Feature, Fingerprint, HashEnsemble, HashMethod, ImageHash};
pub use crate::fusion::{FusionOptions, FusionWeights, WeightedFusion};
pub use crate::identify::builder::IdentifierBuilder;
pub use crate::identify::{
    load_frame, CatalogLookup, FrameResult, Identification, Identifier, NoopLookup, Unresolved,
};
pub use crate::reference::builder::{EmbeddingIndexBuilder, HashIndexBuilder};
pub use crate::reference::{EmbeddingIndex, HashIndex};
pub use crate::search::{
    EmbeddingMatcher, HashMatcher, MatchCandidate, MatchMetric, Ranking, ReferenceMatcher,
};
