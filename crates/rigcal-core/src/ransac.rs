//! Model-agnostic RANSAC.
//!
//! Implement [`Estimator`] for a model and call [`ransac_fit`]. The engine
//! never panics on bad data: when no consensus is found the returned
//! [`RansacResult`] has `model == None`.

use rand::prelude::IndexedRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration for one RANSAC run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacOptions {
    /// Upper bound on hypotheses drawn.
    pub max_iters: usize,
    /// Inlier residual threshold, in the estimator's residual units.
    pub thresh: f64,
    /// Minimum consensus size for a model to be accepted.
    pub min_inliers: usize,
    /// Target probability of drawing at least one all-inlier sample.
    pub confidence: f64,
    /// RNG seed, fixed for reproducibility.
    pub seed: u64,
    /// Refit on the consensus set before scoring.
    pub refit_on_inliers: bool,
}

impl Default for RansacOptions {
    fn default() -> Self {
        Self {
            max_iters: 1000,
            thresh: 2.0,
            min_inliers: 4,
            confidence: 0.99,
            seed: 1_234_567,
            refit_on_inliers: true,
        }
    }
}

/// Outcome of a RANSAC run.
#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    /// Best model, `None` when no hypothesis reached `min_inliers`.
    pub model: Option<M>,
    /// Indices of the inliers of `model`.
    pub inliers: Vec<usize>,
    /// RMS residual over the inliers.
    pub inlier_rms: f64,
    /// Hypotheses drawn.
    pub iters: usize,
    /// Number of data points the run was given.
    pub total: usize,
}

impl<M> RansacResult<M> {
    fn empty(total: usize) -> Self {
        Self {
            model: None,
            inliers: Vec::new(),
            inlier_rms: f64::INFINITY,
            iters: 0,
            total,
        }
    }

    pub fn success(&self) -> bool {
        self.model.is_some()
    }

    /// Fraction of the input that supports the model (0 on failure).
    pub fn inlier_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.inliers.len() as f64 / self.total as f64
        }
    }
}

/// A model that RANSAC can hypothesise from minimal samples.
pub trait Estimator {
    type Datum;
    type Model;

    /// Minimal sample size.
    const MIN_SAMPLES: usize;

    /// Fit from the data at `sample_indices`; `None` when the fit fails.
    fn fit(data: &[Self::Datum], sample_indices: &[usize]) -> Option<Self::Model>;

    /// Non-negative residual of one datum under `model`.
    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64;

    fn is_degenerate(_data: &[Self::Datum], _sample_indices: &[usize]) -> bool {
        false
    }

    /// Refit on a full inlier set. Default: keep the hypothesis.
    fn refit(_data: &[Self::Datum], _inliers: &[usize]) -> Option<Self::Model> {
        None
    }
}

fn rms(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::INFINITY;
    }
    let ss: f64 = vals.iter().map(|&v| v * v).sum();
    (ss / vals.len() as f64).sqrt()
}

/// Adaptive bound `log(1 - p) / log(1 - w^m)` on the number of hypotheses.
fn adaptive_iterations(
    confidence: f64,
    inlier_ratio: f64,
    min_samples: usize,
    iters_so_far: usize,
    max_iters: usize,
) -> usize {
    if confidence <= 0.0 || inlier_ratio <= 0.0 {
        return max_iters;
    }
    let denom = (1.0 - inlier_ratio.powi(min_samples as i32)).max(1e-12).ln();
    if denom >= 0.0 {
        return max_iters;
    }
    let n = ((1.0 - confidence).ln() / denom).ceil() as usize;
    n.clamp(iters_so_far, max_iters)
}

fn consensus<E: Estimator>(
    data: &[E::Datum],
    model: &E::Model,
    thresh: f64,
) -> (Vec<usize>, Vec<f64>) {
    data.iter()
        .enumerate()
        .filter_map(|(i, d)| {
            let r = E::residual(model, d);
            (r <= thresh).then_some((i, r))
        })
        .unzip()
}

/// Run RANSAC for estimator `E` over `data`.
pub fn ransac_fit<E: Estimator>(data: &[E::Datum], opts: &RansacOptions) -> RansacResult<E::Model> {
    let mut best = RansacResult::empty(data.len());
    if data.len() < E::MIN_SAMPLES {
        return best;
    }

    let all_indices: Vec<usize> = (0..data.len()).collect();
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut sample = vec![0usize; E::MIN_SAMPLES];
    let mut budget = opts.max_iters;
    let mut iters = 0;

    while iters < budget {
        iters += 1;
        for (k, &idx) in all_indices
            .as_slice()
            .choose_multiple(&mut rng, E::MIN_SAMPLES)
            .enumerate()
        {
            sample[k] = idx;
        }
        if E::is_degenerate(data, &sample) {
            continue;
        }
        let Some(mut model) = E::fit(data, &sample) else {
            continue;
        };

        let (mut inliers, mut residuals) = consensus::<E>(data, &model, opts.thresh);
        if inliers.len() < opts.min_inliers {
            continue;
        }

        if opts.refit_on_inliers {
            if let Some(refit) = E::refit(data, &inliers) {
                let (refit_inliers, refit_residuals) = consensus::<E>(data, &refit, opts.thresh);
                if refit_inliers.len() >= inliers.len() {
                    model = refit;
                    inliers = refit_inliers;
                    residuals = refit_residuals;
                }
            }
        }

        let candidate_rms = rms(&residuals);
        let better = best.model.is_none()
            || inliers.len() > best.inliers.len()
            || (inliers.len() == best.inliers.len() && candidate_rms < best.inlier_rms);
        if better {
            let ratio = inliers.len() as f64 / data.len() as f64;
            best.model = Some(model);
            best.inliers = inliers;
            best.inlier_rms = candidate_rms;
            budget = adaptive_iterations(opts.confidence, ratio, E::MIN_SAMPLES, iters, budget);
        }
    }

    best.iters = iters;
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `y = a x + b` through two points.
    struct LineEstimator;

    impl Estimator for LineEstimator {
        type Datum = (f64, f64);
        type Model = (f64, f64);
        const MIN_SAMPLES: usize = 2;

        fn fit(data: &[(f64, f64)], idx: &[usize]) -> Option<(f64, f64)> {
            let (x0, y0) = data[idx[0]];
            let (x1, y1) = data[idx[1]];
            if (x1 - x0).abs() < 1e-12 {
                return None;
            }
            let a = (y1 - y0) / (x1 - x0);
            Some((a, y0 - a * x0))
        }

        fn residual(model: &(f64, f64), d: &(f64, f64)) -> f64 {
            (model.0 * d.0 + model.1 - d.1).abs()
        }
    }

    #[test]
    fn recovers_line_with_outliers() {
        let mut data: Vec<(f64, f64)> = (0..40).map(|i| (i as f64, 2.0 * i as f64 + 1.0)).collect();
        data.extend([(3.0, 50.0), (7.0, -20.0), (11.0, 100.0), (20.0, 0.0)]);

        let opts = RansacOptions {
            thresh: 0.5,
            min_inliers: 10,
            ..Default::default()
        };
        let res = ransac_fit::<LineEstimator>(&data, &opts);
        let (a, b) = res.model.expect("line should be found");
        assert!((a - 2.0).abs() < 1e-9 && (b - 1.0).abs() < 1e-9);
        assert_eq!(res.inliers.len(), 40);
        assert!((res.inlier_fraction() - 40.0 / 44.0).abs() < 1e-12);
    }

    #[test]
    fn too_little_data_fails_softly() {
        let res = ransac_fit::<LineEstimator>(&[(0.0, 0.0)], &RansacOptions::default());
        assert!(!res.success());
        assert_eq!(res.inlier_fraction(), 0.0);
    }
}
