use ndarray::{Array2, ArrayBase, ArrayView2, Data, Ix2};

use crate::*;

/// Distance kept between sample points and every image edge.
pub const SAMPLE_MARGIN: usize = 10;

/// Source of local descriptors, e.g. a SIFT implementation.
///
/// Given a grayscale image and two equal-length coordinate lists (`xs` are columns,
/// `ys` are rows), return one descriptor row per coordinate, in the order given.
/// Any closure with the same signature is an extractor.
pub trait DescriptorExtractor {
    fn extract(
        &self,
        image: ArrayView2<f32>,
        xs: &[usize],
        ys: &[usize],
    ) -> BowResult<Array2<f32>>;
}

impl<F> DescriptorExtractor for F
where
    F: Fn(ArrayView2<f32>, &[usize], &[usize]) -> BowResult<Array2<f32>>,
{
    fn extract(
        &self,
        image: ArrayView2<f32>,
        xs: &[usize],
        ys: &[usize],
    ) -> BowResult<Array2<f32>> {
        self(image, xs, ys)
    }
}

/// Regular grid of sample coordinates for an image with `height` rows and `width` columns.
///
/// Coordinates run from [`SAMPLE_MARGIN`] up to (excluding) `dim - SAMPLE_MARGIN` in steps
/// of `stride`, row by row. Images no larger than twice the margin yield no coordinates.
pub fn sample_grid(
    height: usize,
    width: usize,
    stride: usize,
) -> BowResult<(Vec<usize>, Vec<usize>)> {
    if stride == 0 {
        return Err(BowErr::InvalidParameter("sampling stride must be positive"));
    }
    let axis = |len: usize| -> Vec<usize> {
        (SAMPLE_MARGIN..len.saturating_sub(SAMPLE_MARGIN))
            .step_by(stride)
            .collect()
    };
    let (cols, rows) = (axis(width), axis(height));

    let mut xs = Vec::with_capacity(cols.len() * rows.len());
    let mut ys = Vec::with_capacity(cols.len() * rows.len());
    for &y in &rows {
        for &x in &cols {
            xs.push(x);
            ys.push(y);
        }
    }
    Ok((xs, ys))
}

/// Cast an image to the `f32` representation the extractor works on.
pub fn to_float_image<S, A>(image: &ArrayBase<S, Ix2>) -> Image
where
    S: Data<Elem = A>,
    A: Copy + Into<f32>,
{
    image.mapv(Into::into)
}

/// Sample `image` on its grid and extract descriptors, checking the extractor's output shape.
/// Returns `None` when the grid is empty; the extractor is not called in that case.
pub(crate) fn grid_descriptors<S, A, E>(
    image: &ArrayBase<S, Ix2>,
    stride: usize,
    extractor: &E,
) -> BowResult<Option<Array2<f32>>>
where
    S: Data<Elem = A>,
    A: Copy + Into<f32>,
    E: DescriptorExtractor + ?Sized,
{
    let (height, width) = image.dim();
    let (xs, ys) = sample_grid(height, width, stride)?;
    if xs.is_empty() {
        return Ok(None);
    }
    let image = to_float_image(image);
    let descriptors = extractor.extract(image.view(), &xs, &ys)?;
    if descriptors.nrows() != xs.len() {
        return Err(BowErr::LengthMismatch {
            expected: xs.len(),
            found: descriptors.nrows(),
        });
    }
    Ok(Some(descriptors))
}
