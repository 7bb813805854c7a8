use crate::fingerprint::HashMethod;
use crate::search::{MatchCandidate, MatchMetric, MethodMatch, Ranking};
use crate::Errors;
use anyhow::Result;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Relative importance of the hash methods in the fused distance. Weights missing from a
/// deserialized configuration keep their defaults.
///
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub average: f32,
    pub difference: f32,
    pub perceptual: f32,
    pub wavelet: f32,
}

/// Perceptual hash first, then average, difference and wavelet hashes
///
impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            average: 0.6,
            difference: 0.3,
            perceptual: 1.0,
            wavelet: 0.2,
        }
    }
}

impl FusionWeights {
    /// Scheme that trusts the average hash most
    ///
    pub fn average_favoured() -> Self {
        Self {
            average: 1.0,
            difference: 0.5,
            perceptual: 0.8,
            wavelet: 0.3,
        }
    }

    pub fn weight(&self, method: HashMethod) -> f32 {
        match method {
            HashMethod::Average => self.average,
            HashMethod::Difference => self.difference,
            HashMethod::Perceptual => self.perceptual,
            HashMethod::Wavelet => self.wavelet,
        }
    }

    /// Returns the weights with the weight of `method` replaced
    ///
    pub fn with(mut self, method: HashMethod, weight: f32) -> Self {
        match method {
            HashMethod::Average => self.average = weight,
            HashMethod::Difference => self.difference = weight,
            HashMethod::Perceptual => self.perceptual = weight,
            HashMethod::Wavelet => self.wavelet = weight,
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        for m in HashMethod::ALL {
            let w = self.weight(m);
            if !w.is_finite() || w <= 0.0 {
                return Err(Errors::InvalidConfiguration(
                    "weights",
                    format!("weight of {} must be finite and positive, got {}", m, w),
                )
                .into());
            }
        }
        Ok(())
    }
}

/// Fusion parameters. Missing fields of a deserialized configuration take the defaults.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionOptions {
    weights: FusionWeights,
    sentinel: f32,
    max_distance: f32,
}

impl Default for FusionOptions {
    fn default() -> Self {
        Self {
            weights: FusionWeights::default(),
            sentinel: 30.0,
            max_distance: 30.0,
        }
    }
}

impl FusionOptions {
    pub fn weights(mut self, weights: FusionWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Distance assumed for a method that did not nominate the candidate
    ///
    pub fn sentinel(mut self, sentinel: f32) -> Self {
        self.sentinel = sentinel;
        self
    }

    /// Distance mapped to the zero similarity score
    ///
    pub fn max_distance(mut self, max_distance: f32) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn get_weights(&self) -> &FusionWeights {
        &self.weights
    }

    pub fn get_sentinel(&self) -> f32 {
        self.sentinel
    }

    pub fn get_max_distance(&self) -> f32 {
        self.max_distance
    }

    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if !self.sentinel.is_finite() || self.sentinel < 0.0 {
            return Err(Errors::InvalidConfiguration(
                "sentinel",
                format!("{} must be finite and non-negative", self.sentinel),
            )
            .into());
        }
        if !self.max_distance.is_finite() || self.max_distance <= 0.0 {
            return Err(Errors::InvalidConfiguration(
                "max_distance",
                format!("{} must be finite and positive", self.max_distance),
            )
            .into());
        }
        Ok(())
    }
}

/// Maps a distance into `[0, 100]`, where `0` distance scores `100` and distances at or
/// beyond `max_distance` score `0`
///
pub fn similarity_score(distance: f32, max_distance: f32) -> f32 {
    if max_distance <= 0.0 || distance.is_nan() {
        return 0.0;
    }
    (100.0 * (1.0 - distance.max(0.0).min(max_distance) / max_distance)).max(0.0)
}

/// Combines the per-method nearest matches into one ranking.
///
/// Every catalog id nominated by at least one method is scored with
/// `sum(d_i * w_i) / sum(w_i)` over the methods that produced a match, where `d_i` is the
/// method's distance when the method nominated the id and the sentinel otherwise. Methods
/// without a match (empty reference table) take part in neither sum.
///
#[derive(Debug, Clone, Default)]
pub struct WeightedFusion {
    opts: FusionOptions,
}

impl WeightedFusion {
    pub fn new(opts: FusionOptions) -> Result<Self> {
        opts.validate()?;
        Ok(Self { opts })
    }

    pub fn options(&self) -> &FusionOptions {
        &self.opts
    }

    /// Candidates ordered by the fused distance, the best match first. Candidates with equal
    /// distances keep the nomination order (methods in their canonical order).
    ///
    pub fn fuse(&self, matches: &[MethodMatch]) -> Ranking {
        let matches = matches
            .iter()
            .sorted_by_key(|m| m.method)
            .unique_by(|m| m.method)
            .collect::<Vec<_>>();

        let total_weight = matches
            .iter()
            .map(|m| self.opts.weights.weight(m.method))
            .sum::<f32>();
        if matches.is_empty() || total_weight <= 0.0 {
            return Ranking::default();
        }

        let mut candidates = matches
            .iter()
            .map(|m| m.catalog_id.as_str())
            .unique()
            .map(|id| {
                let weighted = matches
                    .iter()
                    .map(|m| {
                        let d = if m.catalog_id == id {
                            m.distance as f32
                        } else {
                            self.opts.sentinel
                        };
                        d * self.opts.weights.weight(m.method)
                    })
                    .sum::<f32>();
                let distance = weighted / total_weight;
                MatchCandidate::new(
                    id,
                    MatchMetric::Fused {
                        distance,
                        score: similarity_score(distance, self.opts.max_distance),
                    },
                )
            })
            .collect::<Vec<_>>();

        candidates.sort_by(|l, r| l.metric.distance().total_cmp(&r.metric.distance()));
        Ranking::new(candidates)
    }
}

#[cfg(test)]
mod tests {
    use crate::fingerprint::HashMethod;
    use crate::fusion::{similarity_score, FusionOptions, FusionWeights, WeightedFusion};
    use crate::search::{MatchMetric, MethodMatch};
    use crate::{EstimateClose, EPS};
    use anyhow::Result;

    fn m(method: HashMethod, id: &str, distance: u32) -> MethodMatch {
        MethodMatch::new(method, id, distance)
    }

    #[test]
    fn default_weight_order() {
        let w = FusionWeights::default();
        assert!(w.perceptual > w.average);
        assert!(w.average > w.difference);
        assert!(w.difference > w.wavelet);
        let w = FusionWeights::average_favoured();
        assert!(w.average > w.perceptual);
    }

    #[test]
    fn unanimous_nomination_is_weighted_mean() -> Result<()> {
        let f = WeightedFusion::default();
        let r = f.fuse(&[
            m(HashMethod::Average, "xy1-1", 10),
            m(HashMethod::Difference, "xy1-1", 6),
            m(HashMethod::Perceptual, "xy1-1", 2),
            m(HashMethod::Wavelet, "xy1-1", 12),
        ]);
        assert_eq!(r.len(), 1);
        let best = r.best().unwrap();
        assert_eq!(best.catalog_id, "xy1-1");
        let expected = (10.0 * 0.6 + 6.0 * 0.3 + 2.0 * 1.0 + 12.0 * 0.2) / 2.1;
        assert!(best.metric.distance().almost_same(&expected, EPS));
        Ok(())
    }

    #[test]
    fn single_strong_nominator_loses_to_broad_agreement() -> Result<()> {
        let f = WeightedFusion::new(FusionOptions::default())?;
        let r = f.fuse(&[
            m(HashMethod::Average, "B", 4),
            m(HashMethod::Difference, "B", 4),
            m(HashMethod::Perceptual, "A", 2),
            m(HashMethod::Wavelet, "B", 4),
        ]);
        let ids = r.iter().map(|c| c.catalog_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["B", "A"]);

        let a = (2.0 * 1.0 + 30.0 * (0.6 + 0.3 + 0.2)) / 2.1;
        let b = (30.0 * 1.0 + 4.0 * (0.6 + 0.3 + 0.2)) / 2.1;
        assert!(r.candidates()[0].metric.distance().almost_same(&b, EPS));
        assert!(r.candidates()[1].metric.distance().almost_same(&a, EPS));
        Ok(())
    }

    #[test]
    fn absent_methods_excluded() {
        let f = WeightedFusion::default();
        let r = f.fuse(&[
            m(HashMethod::Perceptual, "A", 3),
            m(HashMethod::Average, "B", 0),
        ]);
        let a = (3.0 * 1.0 + 30.0 * 0.6) / 1.6;
        let b = (30.0 * 1.0 + 0.0 * 0.6) / 1.6;
        assert_eq!(r.best().unwrap().catalog_id, "A");
        assert!(r.candidates()[0].metric.distance().almost_same(&a, EPS));
        assert!(r.candidates()[1].metric.distance().almost_same(&b, EPS));
    }

    #[test]
    fn nothing_to_fuse() {
        assert!(WeightedFusion::default().fuse(&[]).is_empty());
    }

    #[test]
    fn equal_distances_keep_method_order() {
        let f = WeightedFusion::new(
            FusionOptions::default().weights(FusionWeights {
                average: 1.0,
                difference: 1.0,
                perceptual: 1.0,
                wavelet: 1.0,
            }),
        )
        .unwrap();
        let r = f.fuse(&[
            m(HashMethod::Wavelet, "W", 5),
            m(HashMethod::Average, "A", 5),
        ]);
        let ids = r.iter().map(|c| c.catalog_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["A", "W"]);
    }

    #[test]
    fn scores() {
        assert!(similarity_score(0.0, 30.0).almost_same(&100.0, EPS));
        assert!(similarity_score(15.0, 30.0).almost_same(&50.0, EPS));
        assert!(similarity_score(30.0, 30.0).almost_same(&0.0, EPS));
        assert!(similarity_score(45.0, 30.0).almost_same(&0.0, EPS));

        let r = WeightedFusion::default().fuse(&[m(HashMethod::Perceptual, "A", 0)]);
        match r.best().unwrap().metric {
            MatchMetric::Fused { distance, score } => {
                assert!(distance.almost_same(&0.0, EPS));
                assert!(score.almost_same(&100.0, EPS));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn options_from_json() -> Result<()> {
        let opts: FusionOptions = serde_json::from_str(
            r#"{"weights": {"average": 1.0, "difference": 0.5, "perceptual": 0.8, "wavelet": 0.3}}"#,
        )?;
        assert_eq!(*opts.get_weights(), FusionWeights::average_favoured());
        assert_eq!(opts.get_sentinel(), 30.0);
        assert!(WeightedFusion::new(opts).is_ok());

        let opts: FusionOptions = serde_json::from_str(r#"{"weights": {"perceptual": 0.9}}"#)?;
        assert_eq!(
            *opts.get_weights(),
            FusionWeights::default().with(HashMethod::Perceptual, 0.9)
        );

        let opts: FusionOptions = serde_json::from_str(r#"{"sentinel": -4.0}"#)?;
        assert!(WeightedFusion::new(opts).is_err());
        Ok(())
    }

    #[test]
    fn invalid_options() {
        assert!(WeightedFusion::new(FusionOptions::default().sentinel(-1.0)).is_err());
        assert!(WeightedFusion::new(FusionOptions::default().max_distance(0.0)).is_err());
        assert!(WeightedFusion::new(
            FusionOptions::default()
                .weights(FusionWeights::default().with(HashMethod::Wavelet, 0.0))
        )
        .is_err());
    }
}
