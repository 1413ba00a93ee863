use ndarray::{concatenate, Array2, ArrayBase, ArrayView2, Axis, Data, Ix2};
use rand::{seq::index, Rng};
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt};
use tracing::debug;

use crate::extractor::grid_descriptors;
use crate::kmeans::argmin;
use crate::*;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
/// How a vocabulary is sampled and clustered.
pub struct VocabularyConfig {
    /// Number of visual words (k-means clusters).
    pub vocab_size: usize,
    /// Spacing of the sampling grid, in pixels.
    pub stride: usize,
    /// k-means iterations.
    pub max_iter: usize,
    /// Cluster at most this many descriptors, drawn uniformly without replacement
    /// from the pooled set. `None` clusters everything.
    pub max_descriptors: Option<usize>,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            vocab_size: 50,
            stride: 20,
            max_iter: 100,
            max_descriptors: None,
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Clone)]
#[serde(try_from = "Array2<f32>", into = "Array2<f32>")]
/// Visual vocabulary built from a collection of local image descriptors. Can be:
/// 1. Created from training images with an injected descriptor extractor.
/// 2. Used to quantize a new set of descriptors into word indices.
/// 3. Used to transform a descriptor set into its BoW representation (see [`crate::bow`]).
///
/// Each row of the centroid matrix is one visual word. Once built it is never modified.
/// It (de)serializes as the bare centroid matrix; deserialization rejects zero words.
pub struct Vocabulary {
    centroids: Array2<f32>,
}

impl TryFrom<Array2<f32>> for Vocabulary {
    type Error = BowErr;

    fn try_from(centroids: Array2<f32>) -> BowResult<Self> {
        Self::from_centroids(centroids)
    }
}

impl From<Vocabulary> for Array2<f32> {
    fn from(vocab: Vocabulary) -> Self {
        vocab.centroids
    }
}

/// Vocabulary API
impl Vocabulary {
    /// Build a vocabulary from training images.
    ///
    /// Descriptors are sampled on a margin-inset grid of every image, pooled, and
    /// clustered with k-means into `config.vocab_size` words.
    pub fn build<S, A, E, R>(
        images: &[ArrayBase<S, Ix2>],
        extractor: &E,
        config: &VocabularyConfig,
        rng: &mut R,
    ) -> BowResult<Self>
    where
        S: Data<Elem = A>,
        A: Copy + Into<f32>,
        E: DescriptorExtractor + ?Sized,
        R: Rng,
    {
        if config.vocab_size == 0 {
            return Err(BowErr::InvalidParameter("vocabulary size must be positive"));
        }
        let mut pooled: Vec<Array2<f32>> = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            let descriptors = match grid_descriptors(image, config.stride, extractor)? {
                Some(d) => d,
                None => {
                    debug!(image = i, dim = ?image.dim(), "Image too small to sample");
                    continue;
                }
            };
            if let Some(first) = pooled.first() {
                if first.ncols() != descriptors.ncols() {
                    return Err(BowErr::DimensionMismatch {
                        expected: first.ncols(),
                        found: descriptors.ncols(),
                    });
                }
            }
            pooled.push(descriptors);
        }

        let features = Self::pool(&pooled, config.vocab_size)?;
        debug!(
            images = images.len(),
            descriptors = features.nrows(),
            "Extracted training descriptors"
        );
        let features = match config.max_descriptors {
            Some(m) if m < features.nrows() => {
                let picked = index::sample(rng, features.nrows(), m).into_vec();
                debug!(kept = m, "Subsampled training descriptors");
                features.select(Axis(0), &picked)
            }
            _ => features,
        };

        let kmeans = KMeans::new(KMeansConfig {
            k: config.vocab_size,
            max_iter: config.max_iter,
        });
        Self::from_centroids(kmeans.fit(features.view(), rng)?)
    }

    /// Wrap an existing `k x d` centroid matrix.
    pub fn from_centroids(centroids: Array2<f32>) -> BowResult<Self> {
        if centroids.nrows() == 0 {
            return Err(BowErr::InvalidParameter("vocabulary must contain at least one word"));
        }
        Ok(Self { centroids })
    }

    /// Index of the nearest word for each row of `descriptors`.
    pub fn quantize(&self, descriptors: ArrayView2<f32>) -> BowResult<Vec<usize>> {
        kmeans_quantize(descriptors, self.centroids.view())
    }

    /// Number of words.
    pub fn len(&self) -> usize {
        self.centroids.nrows()
    }

    /// Always false for a constructed vocabulary; kept alongside `len`.
    pub fn is_empty(&self) -> bool {
        self.centroids.nrows() == 0
    }

    /// Descriptor dimension.
    pub fn dim(&self) -> usize {
        self.centroids.ncols()
    }

    /// The `k x d` word matrix.
    pub fn centroids(&self) -> ArrayView2<f32> {
        self.centroids.view()
    }

    pub fn into_centroids(self) -> Array2<f32> {
        self.centroids
    }
}

/// Assign each row of `points` (`N x d`) to its nearest row of `centroids` (`k x d`).
///
/// Returns `N` indices in `[0, k)`. Equidistant centroids resolve to the lowest index.
pub fn kmeans_quantize(
    points: ArrayView2<f32>,
    centroids: ArrayView2<f32>,
) -> BowResult<Vec<usize>> {
    if centroids.nrows() == 0 {
        return Err(BowErr::InvalidParameter("cannot quantize against zero centroids"));
    }
    let d = pairwise_distances(centroids, points)?;
    Ok(d.axis_iter(Axis(1))
        .map(|col| argmin(col.iter().copied()))
        .collect())
}

/////////////////////                Helpers                 ////////////////////////
/////////////////////////////////////////////////////////////////////////////////////

impl Vocabulary {
    /// Stack per-image descriptor blocks, failing when there are fewer than `k` rows.
    fn pool(blocks: &[Array2<f32>], k: usize) -> BowResult<Array2<f32>> {
        let available: usize = blocks.iter().map(|b| b.nrows()).sum();
        if available < k || blocks.is_empty() {
            return Err(BowErr::InsufficientData {
                required: k,
                available,
            });
        }
        let views: Vec<ArrayView2<f32>> = blocks.iter().map(|b| b.view()).collect();
        concatenate(Axis(0), &views).map_err(|_| BowErr::DimensionMismatch {
            expected: blocks[0].ncols(),
            found: blocks.iter().map(|b| b.ncols()).max().unwrap_or(0),
        })
    }
}

impl fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vocabulary")
            .field("Words", &self.len())
            .field("Descriptor Dim", &self.dim())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::tests::PixelExtractor;
    use ndarray::{array, Array2};
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    /// 40x40 image whose sampled pixels (stride 10: rows/cols 10 and 20) are all `v`.
    fn flat(v: f32) -> Array2<f32> {
        Array2::from_elem((40, 40), v)
    }

    #[test]
    fn quantize_picks_nearest() {
        let centroids = array![[0f32, 0.], [10., 10.], [-5., 5.]];
        let points = array![[1f32, 1.], [9., 8.], [-4., 6.], [100., 100.]];
        assert_eq!(
            kmeans_quantize(points.view(), centroids.view()).unwrap(),
            vec![0, 1, 2, 1]
        );
    }

    #[test]
    fn quantize_ties_go_to_lowest_index() {
        let centroids = array![[1f32], [-1.], [1.]];
        let points = array![[0f32], [1.]];
        assert_eq!(
            kmeans_quantize(points.view(), centroids.view()).unwrap(),
            vec![0, 0]
        );
    }

    #[test]
    fn quantize_rejects_bad_shapes() {
        let centroids = array![[0f32, 0.]];
        let points = array![[0f32, 0., 0.]];
        assert!(matches!(
            kmeans_quantize(points.view(), centroids.view()),
            Err(BowErr::DimensionMismatch { .. })
        ));
        let none = Array2::<f32>::zeros((0, 2));
        assert!(kmeans_quantize(centroids.view(), none.view()).is_err());
    }

    #[test]
    fn build_clusters_pooled_descriptors() {
        let images = vec![flat(0.), flat(0.), flat(100.), flat(100.)];
        let config = VocabularyConfig {
            vocab_size: 2,
            stride: 10,
            max_iter: 10,
            max_descriptors: None,
        };
        let mut rng = StdRng::seed_from_u64(5);
        let extractor = PixelExtractor { dim: 4 };
        let voc = Vocabulary::build(&images, &extractor, &config, &mut rng).unwrap();
        assert_eq!(voc.len(), 2);
        assert_eq!(voc.dim(), 4);

        let mut words: Vec<f32> = voc.centroids().column(0).to_vec();
        words.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(words, vec![0., 100.]);
    }

    #[test]
    fn build_skips_tiny_images_and_subsamples() {
        // 4 descriptors per 40x40 image; the 12x12 image contributes none.
        let images = vec![flat(1.), Array2::from_elem((12, 12), 9.), flat(2.)];
        let config = VocabularyConfig {
            vocab_size: 3,
            stride: 10,
            max_iter: 3,
            max_descriptors: Some(5),
        };
        let mut rng = StdRng::seed_from_u64(1);
        let extractor = PixelExtractor { dim: 2 };
        let voc = Vocabulary::build(&images, &extractor, &config, &mut rng).unwrap();
        assert_eq!(voc.len(), 3);
        assert!(voc.centroids().iter().all(|&v| (1. ..=2.).contains(&v)));
    }

    #[test]
    fn build_needs_enough_descriptors() {
        let images = vec![flat(1.), Array2::from_elem((5, 5), 0.)];
        let config = VocabularyConfig {
            vocab_size: 5,
            stride: 10,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        let extractor = PixelExtractor { dim: 2 };
        let err = Vocabulary::build(&images, &extractor, &config, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            BowErr::InsufficientData {
                required: 5,
                available: 4
            }
        ));
    }

    fn failing(_: ArrayView2<f32>, _: &[usize], _: &[usize]) -> BowResult<Array2<f32>> {
        Err(BowErr::extractor("no gpu"))
    }

    #[test]
    fn build_propagates_extractor_failure() {
        let mut rng = StdRng::seed_from_u64(0);
        let images = vec![flat(0.)];
        let config = VocabularyConfig::default();
        let err = Vocabulary::build(&images, &failing, &config, &mut rng).unwrap_err();
        assert!(matches!(err, BowErr::Extractor(_)));
    }

    #[test]
    fn debug_summary() {
        let voc = Vocabulary::from_centroids(Array2::zeros((3, 128))).unwrap();
        assert_eq!(
            format!("{:?}", voc),
            "Vocabulary { Words: 3, Descriptor Dim: 128 }"
        );
        assert!(Vocabulary::from_centroids(Array2::zeros((0, 128))).is_err());
    }

    #[test]
    fn serde_goes_through_from_centroids() {
        let voc = Vocabulary::from_centroids(array![[1f32, 2.], [3., 4.]]).unwrap();
        let json = serde_json::to_string(&voc).unwrap();
        let loaded: Vocabulary = serde_json::from_str(&json).unwrap();
        assert_eq!(voc, loaded);
        assert!(!loaded.is_empty());

        let empty = serde_json::to_string(&Array2::<f32>::zeros((0, 2))).unwrap();
        assert!(serde_json::from_str::<Vocabulary>(&empty).is_err());
    }

    proptest! {
        #[test]
        fn prop_quantize_in_range_and_idempotent(
            centroids in proptest::collection::vec(-5.0f32..5.0, 3 * 4),
            points in proptest::collection::vec(-5.0f32..5.0, 7 * 4),
        ) {
            let centroids = Array2::from_shape_vec((3, 4), centroids).unwrap();
            let voc = Vocabulary::from_centroids(centroids).unwrap();
            let points = Array2::from_shape_vec((7, 4), points).unwrap();
            let first = voc.quantize(points.view()).unwrap();
            prop_assert!(first.iter().all(|&i| i < voc.len()));
            prop_assert_eq!(&first, &voc.quantize(points.view()).unwrap());

            // A centroid quantizes to itself whenever it is the unique closest row.
            for (c, row) in voc.centroids().outer_iter().enumerate() {
                let unique = voc
                    .centroids()
                    .outer_iter()
                    .enumerate()
                    .all(|(o, other)| o == c || other != row);
                if unique {
                    let q = voc.quantize(row.insert_axis(Axis(0))).unwrap();
                    prop_assert_eq!(q, vec![c]);
                }
            }
        }
    }
}
