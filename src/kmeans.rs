use ndarray::{Array2, ArrayView2, Axis};
use rand::{seq::index, Rng};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::*;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
/// Parameters for a k-means run.
pub struct KMeansConfig {
    /// Number of centroids to produce.
    pub k: usize,
    /// Number of assign/update rounds. Always run in full; there is no convergence check.
    pub max_iter: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self { k: 50, max_iter: 100 }
    }
}

/// Lloyd's k-means over dense `f32` point sets.
///
/// Centroids start at `k` distinct input points chosen uniformly at random. A cluster
/// left without members after an assignment step is reseeded with a random input point,
/// so the result always has exactly `k` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMeans {
    config: KMeansConfig,
}

impl KMeans {
    pub fn new(config: KMeansConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }

    /// Cluster the rows of `points` and return the final `k x d` centroid matrix.
    pub fn fit<R: Rng>(&self, points: ArrayView2<f32>, rng: &mut R) -> BowResult<Array2<f32>> {
        let KMeansConfig { k, max_iter } = self.config;
        let n = points.nrows();
        if k == 0 {
            return Err(BowErr::InvalidParameter("k must be positive"));
        }
        if n < k {
            return Err(BowErr::InsufficientData {
                required: k,
                available: n,
            });
        }
        debug!(points = n, dim = points.ncols(), k, max_iter, "KMeans fit");

        let mut centroids = Self::initialize_centroids(points, k, rng);
        for iter in 0..max_iter {
            let assignments = Self::assign(points, centroids.view())?;
            let reseeded = Self::update_centroids(points, &assignments, &mut centroids, rng);
            if reseeded > 0 {
                debug!(iter, reseeded, "Reseeded empty clusters");
            } else {
                trace!(iter, "KMeans step");
            }
        }
        Ok(centroids)
    }

    /// Pick `k` distinct rows uniformly at random, without replacement.
    fn initialize_centroids<R: Rng>(points: ArrayView2<f32>, k: usize, rng: &mut R) -> Array2<f32> {
        let picked = index::sample(rng, points.nrows(), k).into_vec();
        points.select(Axis(0), &picked)
    }

    /// Index of the nearest centroid for every point. Ties go to the lowest index.
    pub(crate) fn assign(
        points: ArrayView2<f32>,
        centroids: ArrayView2<f32>,
    ) -> BowResult<Vec<usize>> {
        let d = pairwise_distances(points, centroids)?;
        Ok(d.outer_iter().map(|row| argmin(row.iter().copied())).collect())
    }

    /// Replace every centroid by the mean of its members. Empty clusters get a random
    /// input point instead. Returns the number of reseeded clusters.
    fn update_centroids<R: Rng>(
        points: ArrayView2<f32>,
        assignments: &[usize],
        centroids: &mut Array2<f32>,
        rng: &mut R,
    ) -> usize {
        let mut counts = vec![0usize; centroids.nrows()];
        centroids.fill(0.);
        for (point, &c) in points.outer_iter().zip(assignments) {
            counts[c] += 1;
            let mut row = centroids.row_mut(c);
            row += &point;
        }

        let mut reseeded = 0;
        for (c, &count) in counts.iter().enumerate() {
            let mut row = centroids.row_mut(c);
            if count > 0 {
                row /= count as f32;
            } else {
                let i = rng.gen_range(0..points.nrows());
                row.assign(&points.row(i));
                reseeded += 1;
            }
        }
        reseeded
    }
}

#[inline]
/// Position of the smallest value, first one wins on ties.
pub(crate) fn argmin<I: IntoIterator<Item = f32>>(values: I) -> usize {
    let mut best: (usize, f32) = (0, f32::INFINITY);
    for (i, v) in values.into_iter().enumerate() {
        if v < best.1 {
            best = (i, v);
        }
    }
    best.0
}
