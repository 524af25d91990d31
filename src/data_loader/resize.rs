// src/data_loader/resize.rs
//
// The resize stage: a per-manager policy deciding the target size of each
// image, plus the resampling helpers used by the task implementations.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};
use ndarray::{Array2, Array3, ArrayView3, Axis};

use crate::config::ImageSize;
use crate::constants::{AUTO_RESIZE_MAX_SIDE, AUTO_RESIZE_MIN_SIDE, AUTO_RESIZE_MULTIPLE};
use crate::data_loader::dataset::{DataError, Sample};
use crate::data_loader::task::TaskOps;

/// Applies the assigned [`ImageSize`] policy to samples.
#[derive(Debug, Clone)]
pub struct ResizeManager {
    policy: ImageSize,
    ops: &'static dyn TaskOps,
}

impl ResizeManager {
    pub fn new(ops: &'static dyn TaskOps) -> Self {
        Self {
            policy: ImageSize::Default,
            ops,
        }
    }

    /// Replace the policy; takes effect on the next `apply`.
    pub fn assign(&mut self, size: ImageSize) {
        tracing::debug!("Resize policy {:?} -> {:?}", self.policy, size);
        self.policy = size;
    }

    pub fn policy(&self) -> ImageSize {
        self.policy
    }

    /// Target `(height, width)` for an image of the given size, or `None`
    /// when the image is left untouched.
    pub fn target_for(&self, height: usize, width: usize) -> Option<(usize, usize)> {
        let target = match self.policy {
            ImageSize::Default => return None,
            ImageSize::Fixed { height, width } => (height, width),
            ImageSize::Auto => {
                let side = auto_side(height.max(width));
                (side, side)
            }
        };
        (target != (height, width)).then_some(target)
    }

    pub fn apply(&self, sample: Sample) -> Result<Sample, DataError> {
        if self.policy == ImageSize::Default {
            return Ok(sample);
        }
        let (h, w) = sample.spatial_size()?;
        match self.target_for(h, w) {
            Some((th, tw)) => self.ops.resize(sample, th, tw),
            None => Ok(sample),
        }
    }
}

/// Nearest multiple of `AUTO_RESIZE_MULTIPLE`, clamped to the auto range.
fn auto_side(longest: usize) -> usize {
    let m = AUTO_RESIZE_MULTIPLE;
    let rounded = (longest + m / 2) / m * m;
    rounded.clamp(AUTO_RESIZE_MIN_SIDE, AUTO_RESIZE_MAX_SIDE)
}

/// Bilinear resize of an `(H, W, C)` image to `(height, width, C)`.
///
/// Each channel is mapped into `[0, 1]` for resampling and mapped back
/// afterwards, so arbitrary value ranges survive the round trip.
pub fn resize_image(image: ArrayView3<'_, f32>, height: usize, width: usize) -> Result<Array3<f32>, DataError> {
    let (h, w, c) = image.dim();
    if height == 0 || width == 0 {
        return Err(DataError::Configuration(format!(
            "cannot resize to {height}x{width}"
        )));
    }
    let mut out = Array3::<f32>::zeros((height, width, c));
    for ch in 0..c {
        let channel = image.index_axis(Axis(2), ch);
        let lo = channel.iter().copied().fold(f32::INFINITY, f32::min);
        let hi = channel.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let span = (hi - lo).max(f32::EPSILON);

        let raw: Vec<f32> = channel.iter().map(|v| (v - lo) / span).collect();
        let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(w as u32, h as u32, raw)
                .ok_or_else(|| DataError::from("image buffer size mismatch"))?;
        let resized = imageops::resize(&buffer, width as u32, height as u32, FilterType::Triangle);
        let plane = Array2::from_shape_vec((height, width), resized.into_raw())?;
        out.index_axis_mut(Axis(2), ch)
            .assign(&plane.mapv(|v| v * span + lo));
    }
    Ok(out)
}

/// Nearest-neighbour resize of a label mask; label values are never blended.
pub fn resize_mask(mask: &Array2<u8>, height: usize, width: usize) -> Result<Array2<u8>, DataError> {
    let (h, w) = mask.dim();
    if height == 0 || width == 0 || h == 0 || w == 0 {
        return Err(DataError::Configuration(format!(
            "cannot resize a {h}x{w} mask to {height}x{width}"
        )));
    }
    Ok(Array2::from_shape_fn((height, width), |(y, x)| {
        let sy = ((2 * y + 1) * h / (2 * height)).min(h - 1);
        let sx = ((2 * x + 1) * w / (2 * width)).min(w - 1);
        mask[[sy, sx]]
    }))
}
