use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::*;

/// Compute the `N x M` matrix of Euclidean distances between the rows of `x` (`N x d`)
/// and the rows of `y` (`M x d`). Entry `(i, j)` is `||y[j] - x[i]||`.
pub fn pairwise_distances(x: ArrayView2<f32>, y: ArrayView2<f32>) -> BowResult<Array2<f32>> {
    if x.ncols() != y.ncols() {
        return Err(BowErr::DimensionMismatch {
            expected: x.ncols(),
            found: y.ncols(),
        });
    }
    let mut d = Array2::zeros((x.nrows(), y.nrows()));
    for (i, xi) in x.outer_iter().enumerate() {
        for (j, yj) in y.outer_iter().enumerate() {
            d[[i, j]] = euclidean(xi, yj);
        }
    }
    Ok(d)
}

#[inline]
/// Euclidean distance between two equal-length vectors.
pub(crate) fn euclidean(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    b.iter()
        .zip(a.iter())
        .fold(0., |acc, (q, p)| acc + (q - p) * (q - p))
        .sqrt()
}
