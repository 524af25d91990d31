// src/data_loader/training.rs
//
// Training-state controller: decides per access whether transforms run,
// whether a tensor backend converts the result, and how batches are stacked.

use ndarray::ArrayD;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::ImageSize;
use crate::data_loader::backend::{Backend, BackendSelection};
use crate::data_loader::batch::{Batch, Stacked};
use crate::data_loader::dataset::{Annotation, DataError, Sample};
use crate::data_loader::resize::ResizeManager;
use crate::data_loader::task::TaskOps;
use crate::data_loader::transform::TransformManager;

/// Processing mode of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrainState {
    /// Samples are returned exactly as stored.
    Disabled,
    /// Resize and transforms, no tensor conversion.
    #[default]
    Default,
    /// Resize, transforms and conversion for the backend.
    Train(Backend),
    /// Resize only; keeps the backend conversion when entered from a backend mode.
    Eval(Option<Backend>),
}

impl TrainState {
    /// Backend whose conversion applies in this state.
    pub fn backend(&self) -> Option<Backend> {
        match self {
            TrainState::Train(b) | TrainState::Eval(Some(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn is_eval(&self) -> bool {
        matches!(self, TrainState::Eval(_))
    }
}

impl fmt::Display for TrainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainState::Disabled => f.write_str("disabled"),
            TrainState::Default => f.write_str("none"),
            TrainState::Train(b) => write!(f, "{b}"),
            TrainState::Eval(None) => f.write_str("eval"),
            TrainState::Eval(Some(b)) => write!(f, "eval-{b}"),
        }
    }
}

/// A requested transition, as accepted by [`TrainingManager::update_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateRequest {
    Disabled,
    Default,
    Eval,
    Train(Backend),
}

impl FromStr for StateRequest {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" | "false" => Ok(StateRequest::Disabled),
            "none" | "default" => Ok(StateRequest::Default),
            "eval" => Ok(StateRequest::Eval),
            other => other
                .parse::<Backend>()
                .map(StateRequest::Train)
                .map_err(|_| DataError::Configuration(format!("unknown training state: {s}"))),
        }
    }
}

impl From<Backend> for StateRequest {
    fn from(backend: Backend) -> Self {
        StateRequest::Train(backend)
    }
}

/// Owns the resize and transform stages and runs samples through them
/// according to the current [`TrainState`].
#[derive(Debug, Clone)]
pub struct TrainingManager {
    state: TrainState,
    ops: &'static dyn TaskOps,
    resize: ResizeManager,
    transforms: TransformManager,
    selection: Arc<BackendSelection>,
}

impl TrainingManager {
    pub fn new(ops: &'static dyn TaskOps, selection: Arc<BackendSelection>) -> Self {
        Self {
            state: TrainState::Default,
            ops,
            resize: ResizeManager::new(ops),
            transforms: TransformManager::new(),
            selection,
        }
    }

    pub fn state(&self) -> TrainState {
        self.state
    }

    pub fn selection(&self) -> &Arc<BackendSelection> {
        &self.selection
    }

    pub fn resize(&self) -> &ResizeManager {
        &self.resize
    }

    pub fn resize_mut(&mut self) -> &mut ResizeManager {
        &mut self.resize
    }

    pub fn transforms(&self) -> &TransformManager {
        &self.transforms
    }

    pub fn transforms_mut(&mut self) -> &mut TransformManager {
        &mut self.transforms
    }

    /// Transition to `request`.
    ///
    /// A backend request fails with [`DataError::BackendConflict`] when the
    /// other backend is pinned; the state is left untouched in that case.
    pub fn update_state(&mut self, request: StateRequest) -> Result<TrainState, DataError> {
        let next = match request {
            StateRequest::Disabled => TrainState::Disabled,
            StateRequest::Default => TrainState::Default,
            StateRequest::Eval => TrainState::Eval(self.state.backend()),
            StateRequest::Train(backend) => {
                self.selection.try_pin(backend)?;
                self.resize.assign(ImageSize::Auto);
                TrainState::Train(backend)
            }
        };
        tracing::debug!("Training state {} -> {}", self.state, next);
        self.state = next;
        Ok(next)
    }

    /// Run one sample through the pipeline.
    ///
    /// Intensity scaling for the active backend happens here, per sample.
    /// When `batched` is set the layout conversion is left to [`Self::make_batch`].
    pub fn apply(&self, sample: Sample, batched: bool) -> Result<Sample, DataError> {
        if self.state == TrainState::Disabled {
            return Ok(sample);
        }
        let mut sample = self.resize.apply(sample)?;
        if !self.state.is_eval() {
            sample = self.transforms.apply(sample)?;
        }
        let Some(backend) = self.state.backend() else {
            return Ok(sample);
        };
        let sample = backend.scale_sample(sample);
        if batched {
            return Ok(sample);
        }
        self.convert(sample, backend)
    }

    fn convert(&self, sample: Sample, backend: Backend) -> Result<Sample, DataError> {
        let intensity = sample.intensity;
        let (image, annotation) = sample.into_parts();
        Ok(Sample {
            image: backend.convert_image(image)?,
            annotation: self.ops.convert_annotation(annotation, backend),
            backend: Some(backend),
            intensity,
        })
    }

    /// Stack processed members into one batch.
    ///
    /// Images with differing shapes are kept as a sequence rather than failing.
    pub fn make_batch(
        &self,
        images: Vec<ArrayD<f32>>,
        annotations: Vec<Annotation>,
    ) -> Result<Batch, DataError> {
        let count = images.len();
        let mut stacked = Stacked::stack(images);
        if !stacked.is_uniform() {
            tracing::warn!(
                "Batch of {} images has differing shapes; returning them as a sequence",
                count
            );
        }

        let backend = self.state.backend();
        let annotations = match backend {
            Some(b) => {
                stacked = b.convert_batch_images(stacked)?;
                annotations
                    .into_iter()
                    .map(|a| self.ops.convert_annotation(a, b))
                    .collect()
            }
            None => annotations,
        };

        Ok(Batch {
            images: stacked,
            annotations: self.ops.stack_annotations(annotations)?,
            backend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Task;
    use crate::data_loader::transform::{Normalize, TransformUpdates};
    use ndarray::{Array3, Array2};

    fn manager(task: Task) -> TrainingManager {
        TrainingManager::new(task.ops(), Arc::new(BackendSelection::new()))
    }

    fn sample(h: usize, w: usize, label: i64) -> Sample {
        Sample::new(Array3::from_elem((h, w, 3), 100.0), Annotation::Label(label))
    }

    #[test]
    fn starts_in_default() {
        let tm = manager(Task::ImageClassification);
        assert_eq!(tm.state(), TrainState::Default);
        assert_eq!(tm.state().to_string(), "none");
    }

    #[test]
    fn conflicting_backend_leaves_state_unchanged() {
        let mut tm = manager(Task::ImageClassification);
        tm.update_state(StateRequest::Train(Backend::TensorFlow)).unwrap();
        let err = tm.update_state(StateRequest::Train(Backend::Torch)).unwrap_err();
        assert!(matches!(err, DataError::BackendConflict { .. }));
        assert_eq!(tm.state(), TrainState::Train(Backend::TensorFlow));
    }

    #[test]
    fn eval_keeps_backend_and_pin_is_sticky() {
        let mut tm = manager(Task::ImageClassification);
        tm.update_state(StateRequest::Train(Backend::TensorFlow)).unwrap();
        assert_eq!(tm.update_state(StateRequest::Eval).unwrap(), TrainState::Eval(Some(Backend::TensorFlow)));
        assert_eq!(tm.state().to_string(), "eval-tf");

        assert_eq!(tm.update_state(StateRequest::Default).unwrap(), TrainState::Default);
        tm.update_state(StateRequest::Train(Backend::TensorFlow)).unwrap();
        assert!(tm.update_state(StateRequest::Train(Backend::Torch)).is_err());
    }

    #[test]
    fn plain_eval_does_not_pin() {
        let mut tm = manager(Task::ImageClassification);
        assert_eq!(tm.update_state(StateRequest::Eval).unwrap(), TrainState::Eval(None));
        assert_eq!(tm.selection().pinned(), None);
        tm.update_state(StateRequest::Train(Backend::Torch)).unwrap();
        assert_eq!(tm.state().to_string(), "torch");
    }

    #[test]
    fn backend_mode_switches_resize_to_auto() {
        let mut tm = manager(Task::ImageClassification);
        tm.update_state(StateRequest::Train(Backend::Torch)).unwrap();
        assert_eq!(tm.resize().policy(), ImageSize::Auto);
    }

    #[test]
    fn disabled_returns_raw_sample() {
        let mut tm = manager(Task::ImageClassification);
        tm.resize_mut().assign(ImageSize::Fixed { height: 4, width: 4 });
        tm.transforms_mut().assign(
            TransformUpdates::new()
                .transform(|img: Array3<f32>| -> Result<Array3<f32>, DataError> { Ok(img * 0.0) }),
        );
        tm.update_state(StateRequest::Disabled).unwrap();

        let raw = sample(10, 12, 3);
        assert_eq!(tm.apply(raw.clone(), false).unwrap(), raw);
    }

    #[test]
    fn eval_skips_transforms() {
        let mut tm = manager(Task::ImageClassification);
        tm.transforms_mut().assign(
            TransformUpdates::new()
                .transform(|img: Array3<f32>| -> Result<Array3<f32>, DataError> { Ok(img + 1.0) }),
        );
        let trained = tm.apply(sample(2, 2, 0), false).unwrap();
        assert_eq!(trained.image[[0, 0, 0]], 101.0);

        tm.update_state(StateRequest::Eval).unwrap();
        let evaluated = tm.apply(sample(2, 2, 0), false).unwrap();
        assert_eq!(evaluated.image[[0, 0, 0]], 100.0);
    }

    #[test]
    fn conversion_is_deferred_when_batched() {
        let mut tm = manager(Task::ImageClassification);
        tm.update_state(StateRequest::Train(Backend::Torch)).unwrap();

        let single = tm.apply(sample(32, 32, 0), false).unwrap();
        assert_eq!(single.image.shape(), &[3, 32, 32]);
        assert_eq!(single.backend, Some(Backend::Torch));

        let deferred = tm.apply(sample(32, 32, 0), true).unwrap();
        assert_eq!(deferred.image.shape(), &[32, 32, 3]);
        assert_eq!(deferred.backend, None);
    }

    #[test]
    fn batch_under_torch_is_nchw() {
        let mut tm = manager(Task::ImageClassification);
        tm.update_state(StateRequest::Train(Backend::Torch)).unwrap();
        let members: Vec<_> = (0..2).map(|i| tm.apply(sample(32, 32, i), true).unwrap()).collect();
        let (images, anns): (Vec<_>, Vec<_>) = members.into_iter().map(Sample::into_parts).unzip();

        let batch = tm.make_batch(images, anns).unwrap();
        assert_eq!(batch.images.shape(), Some(&[2, 3, 32, 32][..]));
        assert_eq!(batch.backend, Some(Backend::Torch));
        assert_eq!(batch.annotations.as_labels().unwrap().to_vec(), vec![0, 1]);
    }

    fn filled(value: f32, label: i64) -> Sample {
        Sample::new(Array3::from_elem((32, 32, 3), value), Annotation::Label(label))
    }

    #[test]
    fn torch_values_match_alone_and_in_batch() {
        let mut tm = manager(Task::ImageClassification);
        tm.update_state(StateRequest::Train(Backend::Torch)).unwrap();

        let alone = tm.apply(filled(1.0, 0), false).unwrap();
        let members: Vec<_> = [filled(1.0, 0), filled(200.0, 1)]
            .into_iter()
            .map(|s| tm.apply(s, true).unwrap())
            .collect();
        let (images, anns): (Vec<_>, Vec<_>) = members.into_iter().map(Sample::into_parts).unzip();
        let batch = tm.make_batch(images, anns).unwrap();

        let stacked = batch.images.as_uniform().unwrap();
        let in_batch = stacked.index_axis(ndarray::Axis(0), 0);
        assert_eq!(in_batch, alone.image.view());
        assert!((alone.image[[0, 0, 0]] - 1.0 / 255.0).abs() < 1e-7);
        assert!((stacked[[1, 0, 0, 0]] - 200.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn torch_keeps_normalized_values() {
        let mut tm = manager(Task::ImageClassification);
        tm.transforms_mut()
            .assign(TransformUpdates::new().transform(Normalize::new(vec![100.0], vec![50.0])));
        tm.update_state(StateRequest::Train(Backend::Torch)).unwrap();

        let single = tm.apply(filled(200.0, 0), false).unwrap();
        assert!(single.image.iter().all(|&v| v == 2.0));

        let member = tm.apply(filled(200.0, 0), true).unwrap();
        let (image, ann) = member.into_parts();
        let batch = tm.make_batch(vec![image], vec![ann]).unwrap();
        assert!(batch.images.as_uniform().unwrap().iter().all(|&v| v == 2.0));
    }

    #[test]
    fn mismatched_images_fall_back_to_sequence() {
        let tm = manager(Task::SemanticSegmentation);
        let images = vec![
            Array3::<f32>::zeros((4, 4, 3)).into_dyn(),
            Array3::<f32>::zeros((5, 4, 3)).into_dyn(),
        ];
        let anns = vec![
            Annotation::Mask(Array2::zeros((4, 4))),
            Annotation::Mask(Array2::zeros((5, 4))),
        ];
        let batch = tm.make_batch(images, anns).unwrap();
        assert!(!batch.images.is_uniform());
        assert!(!batch.annotations.as_masks().unwrap().is_uniform());
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn parses_state_requests() {
        assert_eq!("false".parse::<StateRequest>().unwrap(), StateRequest::Disabled);
        assert_eq!("none".parse::<StateRequest>().unwrap(), StateRequest::Default);
        assert_eq!("eval".parse::<StateRequest>().unwrap(), StateRequest::Eval);
        assert_eq!("torch".parse::<StateRequest>().unwrap(), StateRequest::Train(Backend::Torch));
        assert!("train".parse::<StateRequest>().is_err());
    }
}
