use ndarray::Array2;
use thiserror::Error;

/// Dense pairwise Euclidean distances between two point sets.
pub mod distance;
pub use distance::pairwise_distances;

/// Lloyd's k-means with random reseeding of empty clusters.
pub mod kmeans;
pub use kmeans::{KMeans, KMeansConfig};

/// The injected descriptor extractor and the margin-inset sampling grid.
pub mod extractor;
pub use extractor::{sample_grid, to_float_image, DescriptorExtractor, SAMPLE_MARGIN};

/// Implementation of a visual bag-of-words vocabulary,
/// which provides the main functionality of this crate.
pub mod vocab;
pub use vocab::{kmeans_quantize, Vocabulary, VocabularyConfig};

/// Bag-of-words histogram features.
pub mod bow;
pub use bow::{
    get_bags_of_words, normalized_histogram, BagOfWordsConfig, BoWTrait, EmptyImagePolicy,
};

/// k-nearest-neighbor classification of feature vectors.
pub mod knn;
pub use knn::nearest_neighbor_classify;

/// Downsampled "tiny image" baseline features.
pub mod tiny;
pub use tiny::{get_tiny_images, tiny_image, TinyImageConfig};

/// Length of a local descriptor produced by the supported extractor (SIFT-like).
pub const DESCRIPTOR_DIM: usize = 128;

/// Grayscale image as consumed by the extractor: rows x columns, row-major.
pub type Image = Array2<f32>;

/// Bag-of-Words representation of an image or descriptor set.
///
/// Index: word id in the vocabulary.
///
/// Value: fraction of the image's descriptors quantized to that word.
pub type BoW = Vec<f32>;

pub type BowResult<T> = std::result::Result<T, BowErr>;

#[derive(Error, Debug)]
pub enum BowErr {
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("Insufficient data: {required} points required, {available} available")]
    InsufficientData { required: usize, available: usize },
    #[error("Invalid parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("Word index {index} out of range for a {words}-word vocabulary")]
    WordOutOfRange { index: usize, words: usize },
    #[error("Image {index} produced no descriptors")]
    EmptyImage { index: usize },
    #[error("Descriptor extractor error")]
    Extractor(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl BowErr {
    /// Wrap an arbitrary extractor failure.
    pub fn extractor<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        BowErr::Extractor(err.into())
    }
}
