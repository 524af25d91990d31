//! Transform stage: user-assignable image, target and dual transforms.
//!
//! Three independent slots are kept, each an ordered list:
//!  * `transform`        – applied to the image only.
//!  * `target_transform` – applied to the annotation only.
//!  * `dual_transform`   – applied to the `(image, annotation)` pair.
//!
//! Closures with the right signature are transforms too; annotate the
//! closure's return type as `Result<_, DataError>`.

use ndarray::{s, Array3, Axis, Ix3};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::data_loader::dataset::{Annotation, DataError, Intensity, Sample};

/// Transform applied to the image of a sample.
pub trait ImageTransform: Send + Sync {
    fn apply(&self, image: Array3<f32>) -> Result<Array3<f32>, DataError>;

    /// Whether the output leaves the 8-bit pixel range, so that backend
    /// conversion must not rescale it again.
    fn rescales(&self) -> bool {
        false
    }
}

impl<F> ImageTransform for F
where
    F: Fn(Array3<f32>) -> Result<Array3<f32>, DataError> + Send + Sync,
{
    fn apply(&self, image: Array3<f32>) -> Result<Array3<f32>, DataError> {
        self(image)
    }
}

/// Transform applied to the annotation of a sample.
pub trait TargetTransform: Send + Sync {
    fn apply(&self, annotation: Annotation) -> Result<Annotation, DataError>;
}

impl<F> TargetTransform for F
where
    F: Fn(Annotation) -> Result<Annotation, DataError> + Send + Sync,
{
    fn apply(&self, annotation: Annotation) -> Result<Annotation, DataError> {
        self(annotation)
    }
}

/// Transform applied jointly; must keep image and annotation aligned.
pub trait DualTransform: Send + Sync {
    fn apply(&self, sample: Sample) -> Result<Sample, DataError>;
}

impl<F> DualTransform for F
where
    F: Fn(Sample) -> Result<Sample, DataError> + Send + Sync,
{
    fn apply(&self, sample: Sample) -> Result<Sample, DataError> {
        self(sample)
    }
}

/// What to do with one slot when pushing transforms.
pub enum TransformUpdate<T: ?Sized> {
    /// Leave the slot as it is.
    Keep,
    /// Clear the slot.
    Reset,
    /// Append a transform to the slot.
    Set(Arc<T>),
}

impl<T: ?Sized> Default for TransformUpdate<T> {
    fn default() -> Self {
        TransformUpdate::Keep
    }
}

impl<T: ?Sized> TransformUpdate<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, TransformUpdate::Keep)
    }
}

/// One push request covering all three slots.
#[derive(Default)]
pub struct TransformUpdates {
    pub transform: TransformUpdate<dyn ImageTransform>,
    pub target_transform: TransformUpdate<dyn TargetTransform>,
    pub dual_transform: TransformUpdate<dyn DualTransform>,
}

impl TransformUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every slot.
    pub fn reset_all() -> Self {
        Self {
            transform: TransformUpdate::Reset,
            target_transform: TransformUpdate::Reset,
            dual_transform: TransformUpdate::Reset,
        }
    }

    pub fn transform<T: ImageTransform + 'static>(mut self, t: T) -> Self {
        let t: Arc<dyn ImageTransform> = Arc::new(t);
        self.transform = TransformUpdate::Set(t);
        self
    }

    pub fn target_transform<T: TargetTransform + 'static>(mut self, t: T) -> Self {
        let t: Arc<dyn TargetTransform> = Arc::new(t);
        self.target_transform = TransformUpdate::Set(t);
        self
    }

    pub fn dual_transform<T: DualTransform + 'static>(mut self, t: T) -> Self {
        let t: Arc<dyn DualTransform> = Arc::new(t);
        self.dual_transform = TransformUpdate::Set(t);
        self
    }

    pub fn reset_transform(mut self) -> Self {
        self.transform = TransformUpdate::Reset;
        self
    }

    pub fn reset_target_transform(mut self) -> Self {
        self.target_transform = TransformUpdate::Reset;
        self
    }

    pub fn reset_dual_transform(mut self) -> Self {
        self.dual_transform = TransformUpdate::Reset;
        self
    }
}

fn update_slot<T: ?Sized>(slot: &mut Vec<Arc<T>>, update: TransformUpdate<T>) {
    match update {
        TransformUpdate::Keep => {}
        TransformUpdate::Reset => slot.clear(),
        TransformUpdate::Set(t) => slot.push(t),
    }
}

/// Holds the assigned transforms and applies them in order:
/// dual transforms, then image transforms, then target transforms.
#[derive(Clone, Default)]
pub struct TransformManager {
    transforms: Vec<Arc<dyn ImageTransform>>,
    target_transforms: Vec<Arc<dyn TargetTransform>>,
    dual_transforms: Vec<Arc<dyn DualTransform>>,
}

impl TransformManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, updates: TransformUpdates) {
        update_slot(&mut self.transforms, updates.transform);
        update_slot(&mut self.target_transforms, updates.target_transform);
        update_slot(&mut self.dual_transforms, updates.dual_transform);
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty() && self.target_transforms.is_empty() && self.dual_transforms.is_empty()
    }

    /// `(image, target, dual)` transform counts.
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.transforms.len(),
            self.target_transforms.len(),
            self.dual_transforms.len(),
        )
    }

    pub fn apply(&self, mut sample: Sample) -> Result<Sample, DataError> {
        if self.is_empty() {
            return Ok(sample);
        }
        for t in &self.dual_transforms {
            sample = t.apply(sample)?;
        }
        if !self.transforms.is_empty() {
            let mut image = sample.image.into_dimensionality::<Ix3>()?;
            for t in &self.transforms {
                image = t.apply(image)?;
                if t.rescales() {
                    sample.intensity = Intensity::Scaled;
                }
            }
            sample.image = image.into_dyn();
        }
        for t in &self.target_transforms {
            sample.annotation = t.apply(sample.annotation)?;
        }
        Ok(sample)
    }
}

impl fmt::Debug for TransformManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformManager")
            .field("transforms", &self.transforms.len())
            .field("target_transforms", &self.target_transforms.len())
            .field("dual_transforms", &self.dual_transforms.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Built-in transforms
// ----------------------------------------------------------------------------

/// Per-channel `(x - mean) / std`. Single-element vectors apply to every channel.
#[derive(Debug, Clone)]
pub struct Normalize {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl Normalize {
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> Self {
        Self { mean, std }
    }

    fn channel_value(values: &[f32], ch: usize, channels: usize) -> Result<f32, DataError> {
        match values.len() {
            1 => Ok(values[0]),
            n if n == channels => Ok(values[ch]),
            n => Err(DataError::Configuration(format!(
                "Normalize has {n} values for an image with {channels} channels"
            ))),
        }
    }
}

impl ImageTransform for Normalize {
    fn apply(&self, mut image: Array3<f32>) -> Result<Array3<f32>, DataError> {
        let channels = image.dim().2;
        for (ch, mut plane) in image.axis_iter_mut(Axis(2)).enumerate() {
            let mean = Self::channel_value(&self.mean, ch, channels)?;
            let std = Self::channel_value(&self.std, ch, channels)?;
            plane.mapv_inplace(|v| (v - mean) / std);
        }
        Ok(image)
    }

    fn rescales(&self) -> bool {
        true
    }
}

/// Multiply every pixel by `factor` (e.g. `1.0 / 255.0`).
#[derive(Debug, Clone, Copy)]
pub struct ScaleIntensity {
    pub factor: f32,
}

impl ScaleIntensity {
    pub fn new(factor: f32) -> Self {
        Self { factor }
    }
}

impl ImageTransform for ScaleIntensity {
    fn apply(&self, image: Array3<f32>) -> Result<Array3<f32>, DataError> {
        Ok(image * self.factor)
    }

    fn rescales(&self) -> bool {
        true
    }
}

/// Replace classification labels and detection category ids; unmapped ids pass through.
#[derive(Debug, Clone)]
pub struct RemapLabels {
    pub mapping: HashMap<i64, i64>,
}

impl RemapLabels {
    pub fn new(mapping: HashMap<i64, i64>) -> Self {
        Self { mapping }
    }

    fn map(&self, id: i64) -> i64 {
        self.mapping.get(&id).copied().unwrap_or(id)
    }
}

impl TargetTransform for RemapLabels {
    fn apply(&self, annotation: Annotation) -> Result<Annotation, DataError> {
        Ok(match annotation {
            Annotation::Label(l) => Annotation::Label(self.map(l)),
            Annotation::Coco(mut record) => {
                for id in &mut record.category_ids {
                    *id = self.map(*id);
                }
                Annotation::Coco(record)
            }
            mask @ Annotation::Mask(_) => mask,
        })
    }
}

/// Mirror the image left-to-right, along with boxes or masks.
#[derive(Debug, Clone, Copy, Default)]
pub struct HorizontalFlip;

impl DualTransform for HorizontalFlip {
    fn apply(&self, sample: Sample) -> Result<Sample, DataError> {
        let image = sample.image.into_dimensionality::<Ix3>()?;
        let image = image.slice(s![.., ..;-1, ..]).to_owned();
        let width = image.dim().1 as f32;
        let annotation = match sample.annotation {
            Annotation::Coco(mut record) => {
                record.flip_horizontal(width);
                Annotation::Coco(record)
            }
            Annotation::Mask(mask) => Annotation::Mask(mask.slice(s![.., ..;-1]).to_owned()),
            label @ Annotation::Label(_) => label,
        };
        Ok(Sample {
            image: image.into_dyn(),
            annotation,
            backend: sample.backend,
            intensity: sample.intensity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loader::coco::CocoAnnotation;
    use ndarray::{Array2, Array3};

    fn ramp() -> Sample {
        let image = Array3::from_shape_fn((2, 3, 1), |(_, w, _)| w as f32);
        Sample::new(image, Annotation::Label(1))
    }

    #[test]
    fn slots_push_reset_and_keep() {
        let mut tm = TransformManager::new();
        tm.assign(TransformUpdates::new().transform(ScaleIntensity::new(2.0)));
        tm.assign(TransformUpdates::new().transform(ScaleIntensity::new(3.0)));
        assert_eq!(tm.counts(), (2, 0, 0));

        let out = tm.apply(ramp()).unwrap();
        assert_eq!(out.image[[0, 2, 0]], 12.0);

        // Keep leaves the image slot alone while the target slot is set
        tm.assign(TransformUpdates::new().target_transform(RemapLabels::new(HashMap::from([(1, 5)]))));
        assert_eq!(tm.counts(), (2, 1, 0));
        assert_eq!(tm.apply(ramp()).unwrap().annotation, Annotation::Label(5));

        tm.assign(TransformUpdates::new().reset_transform());
        assert_eq!(tm.counts(), (0, 1, 0));
        tm.assign(TransformUpdates::reset_all());
        assert!(tm.is_empty());
    }

    #[test]
    fn closures_are_transforms() {
        let mut tm = TransformManager::new();
        tm.assign(
            TransformUpdates::new()
                .transform(|img: Array3<f32>| -> Result<Array3<f32>, DataError> { Ok(img + 1.0) })
                .target_transform(|_: Annotation| -> Result<Annotation, DataError> {
                    Ok(Annotation::Label(9))
                }),
        );
        let out = tm.apply(ramp()).unwrap();
        assert_eq!(out.image[[0, 0, 0]], 1.0);
        assert_eq!(out.annotation, Annotation::Label(9));
    }

    #[test]
    fn rescaling_transforms_tag_the_sample() {
        let mut tm = TransformManager::new();
        tm.assign(
            TransformUpdates::new()
                .transform(|img: Array3<f32>| -> Result<Array3<f32>, DataError> { Ok(img + 1.0) }),
        );
        assert_eq!(tm.apply(ramp()).unwrap().intensity, Intensity::Pixel);

        tm.assign(TransformUpdates::new().transform(Normalize::new(vec![1.0], vec![2.0])));
        assert_eq!(tm.apply(ramp()).unwrap().intensity, Intensity::Scaled);
    }

    #[test]
    fn transform_errors_propagate() {
        let mut tm = TransformManager::new();
        tm.assign(TransformUpdates::new().transform(|_: Array3<f32>| -> Result<Array3<f32>, DataError> {
            Err(DataError::from("boom"))
        }));
        let err = tm.apply(ramp()).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn normalize_per_channel() {
        let image = Array3::from_elem((1, 1, 2), 10.0f32);
        let out = Normalize::new(vec![2.0, 4.0], vec![2.0, 3.0]).apply(image).unwrap();
        assert_eq!(out[[0, 0, 0]], 4.0);
        assert_eq!(out[[0, 0, 1]], 2.0);

        let bad = Normalize::new(vec![0.0; 3], vec![1.0]).apply(Array3::zeros((1, 1, 2)));
        assert!(matches!(bad, Err(DataError::Configuration(_))));
    }

    #[test]
    fn horizontal_flip_moves_boxes_and_masks() {
        let record = CocoAnnotation::from_boxes(1, vec![[0.0, 0.0, 1.0, 2.0]], vec![1]);
        let flipped = HorizontalFlip.apply(Sample::new(Array3::zeros((2, 3, 1)), Annotation::Coco(record))).unwrap();
        assert_eq!(flipped.annotation.as_coco().unwrap().bboxes[0], [2.0, 0.0, 1.0, 2.0]);

        let mask = Array2::from_shape_vec((1, 3), vec![1u8, 2, 3]).unwrap();
        let flipped = HorizontalFlip.apply(Sample::new(Array3::zeros((1, 3, 1)), Annotation::Mask(mask))).unwrap();
        assert_eq!(flipped.annotation.as_mask().unwrap().as_slice().unwrap(), &[3, 2, 1]);

        let flipped = HorizontalFlip.apply(ramp()).unwrap();
        assert_eq!(flipped.image[[1, 0, 0]], 2.0);
    }
}
