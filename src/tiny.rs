use ndarray::{s, Array1, Array2, ArrayBase, ArrayView2, Data, Ix2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::*;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TinyImageConfig {
    /// Side of the square thumbnail; features have `size * size` entries.
    pub size: usize,
    /// Make each feature zero mean and unit length.
    pub normalize: bool,
    /// Crop the central square before resizing instead of ignoring the aspect ratio.
    pub crop_center: bool,
}

impl Default for TinyImageConfig {
    fn default() -> Self {
        Self {
            size: 16,
            normalize: false,
            crop_center: false,
        }
    }
}

/// Stack the tiny-image feature of every image into an `N x size²` matrix.
pub fn get_tiny_images<S, A>(
    images: &[ArrayBase<S, Ix2>],
    config: &TinyImageConfig,
) -> BowResult<Array2<f32>>
where
    S: Data<Elem = A>,
    A: Copy + Into<f32>,
{
    let len = config.size * config.size;
    let mut feats = Array2::zeros((images.len(), len));
    for (i, image) in images.iter().enumerate() {
        feats.row_mut(i).assign(&tiny_image(image, config)?);
    }
    debug!(images = images.len(), len, "Computed tiny images");
    Ok(feats)
}

/// Resize `image` to `size x size` with bilinear interpolation and flatten it row by row.
pub fn tiny_image<S, A>(
    image: &ArrayBase<S, Ix2>,
    config: &TinyImageConfig,
) -> BowResult<Array1<f32>>
where
    S: Data<Elem = A>,
    A: Copy + Into<f32>,
{
    if config.size == 0 {
        return Err(BowErr::InvalidParameter("tiny image size must be positive"));
    }
    let (h, w) = image.dim();
    if h == 0 || w == 0 {
        return Err(BowErr::InvalidParameter("cannot resize an empty image"));
    }
    let image = to_float_image(image);
    let view = if config.crop_center {
        let side = h.min(w);
        let (top, left) = ((h - side) / 2, (w - side) / 2);
        image.slice(s![top..top + side, left..left + side])
    } else {
        image.view()
    };

    let resized = resize_bilinear(view, config.size, config.size);
    let mut feat = Array1::from_iter(resized.iter().copied());
    if config.normalize {
        let mean = feat.mean().unwrap_or(0.);
        feat -= mean;
        let norm = feat.dot(&feat).sqrt();
        if norm > 0. {
            feat /= norm;
        }
    }
    Ok(feat)
}

/// Bilinear resize with pixel centers aligned (`src = (dst + 0.5) * scale - 0.5`),
/// clamping at the borders.
fn resize_bilinear(image: ArrayView2<f32>, out_h: usize, out_w: usize) -> Array2<f32> {
    let (h, w) = image.dim();
    let rows: Vec<(usize, usize, f32)> = (0..out_h).map(|i| source_taps(i, h, out_h)).collect();
    let cols: Vec<(usize, usize, f32)> = (0..out_w).map(|j| source_taps(j, w, out_w)).collect();

    Array2::from_shape_fn((out_h, out_w), |(i, j)| {
        let (y0, y1, fy) = rows[i];
        let (x0, x1, fx) = cols[j];
        let top = image[[y0, x0]] * (1. - fx) + image[[y0, x1]] * fx;
        let bottom = image[[y1, x0]] * (1. - fx) + image[[y1, x1]] * fx;
        top * (1. - fy) + bottom * fy
    })
}

#[inline]
/// Neighboring source indices and interpolation weight for output index `dst`.
fn source_taps(dst: usize, src_len: usize, dst_len: usize) -> (usize, usize, f32) {
    let scale = src_len as f32 / dst_len as f32;
    let pos = ((dst as f32 + 0.5) * scale - 0.5).max(0.);
    let i0 = (pos.floor() as usize).min(src_len - 1);
    let i1 = (i0 + 1).min(src_len - 1);
    (i0, i1, pos - i0 as f32)
}
