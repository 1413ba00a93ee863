use ndarray::{Array1, Array2, ArrayBase, ArrayView2, Data, Ix2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::extractor::grid_descriptors;
use crate::*;

/// What to do with an image that yields no descriptors (too small for any sample point).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyImagePolicy {
    /// Emit an all-zero histogram row.
    Zeros,
    /// Abort with [`BowErr::EmptyImage`].
    Fail,
}

impl Default for EmptyImagePolicy {
    fn default() -> Self {
        EmptyImagePolicy::Zeros
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BagOfWordsConfig {
    /// Spacing of the sampling grid. Usually denser than the vocabulary stride.
    pub step_size: usize,
    pub empty_policy: EmptyImagePolicy,
}

impl Default for BagOfWordsConfig {
    fn default() -> Self {
        Self {
            step_size: 10,
            empty_policy: EmptyImagePolicy::Zeros,
        }
    }
}

/// Provides method(s) for computing the similarity score between bow vectors.
pub trait BoWTrait {
    /// L1 similarity in `[0, 1]` between two normalized BoW (Galvez, Eq 2). Identical
    /// histograms score 1, disjoint ones 0.
    fn l1(&self, other: &Self) -> f32;
}

impl BoWTrait for BoW {
    fn l1(&self, other: &Self) -> f32 {
        1. - 0.5
            * (self
                .iter()
                .zip(other)
                .fold(0., |a, (b, c)| a + (b - c).abs()))
    }
}

/// Histogram of word indices over `k` bins, scaled to sum to 1.
/// An empty index list gives the all-zero histogram. Fails on any index `>= k`.
pub fn normalized_histogram(indices: &[usize], k: usize) -> BowResult<Array1<f32>> {
    let mut hist = Array1::zeros(k);
    for &i in indices {
        match hist.get_mut(i) {
            Some(w) => *w += 1.,
            None => return Err(BowErr::WordOutOfRange { index: i, words: k }),
        }
    }
    let sum: f32 = hist.sum();
    if sum > 0. {
        let inv_sum = 1. / sum;
        hist.mapv_inplace(|w| w * inv_sum);
    }
    Ok(hist)
}

impl Vocabulary {
    /// Transform a set of descriptors (`n x d`) into its bag of words representation
    /// with respect to the Vocabulary. The result is l1 normalized.
    pub fn transform(&self, descriptors: ArrayView2<f32>) -> BowResult<BoW> {
        let words = self.quantize(descriptors)?;
        Ok(normalized_histogram(&words, self.len())?.to_vec())
    }
}

/// Build the `N x k` bag-of-words feature matrix for `images`.
///
/// Each image is sampled on a margin-inset grid with `config.step_size`, its descriptors
/// quantized against `vocab`, and the word counts normalized to sum to 1. Images without
/// any sample point are handled according to `config.empty_policy`.
pub fn get_bags_of_words<S, A, E>(
    images: &[ArrayBase<S, Ix2>],
    vocab: &Vocabulary,
    extractor: &E,
    config: &BagOfWordsConfig,
) -> BowResult<Array2<f32>>
where
    S: Data<Elem = A>,
    A: Copy + Into<f32>,
    E: DescriptorExtractor + ?Sized,
{
    let mut feats = Array2::zeros((images.len(), vocab.len()));
    for (i, image) in images.iter().enumerate() {
        match grid_descriptors(image, config.step_size, extractor)? {
            Some(descriptors) => {
                let words = vocab.quantize(descriptors.view())?;
                feats.row_mut(i).assign(&normalized_histogram(&words, vocab.len())?);
            }
            None => match config.empty_policy {
                EmptyImagePolicy::Zeros => {
                    warn!(image = i, dim = ?image.dim(), "No descriptors, using zero histogram");
                }
                EmptyImagePolicy::Fail => return Err(BowErr::EmptyImage { index: i }),
            },
        }
    }
    debug!(images = images.len(), words = vocab.len(), "Computed bags of words");
    Ok(feats)
}
