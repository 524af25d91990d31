// src/data_loader/task.rs
//
// Task-specific behaviour, selected once per manager: how a sample's
// annotation follows a resize, how it converts for a backend, and how a
// batch of annotations is assembled.

use std::fmt;

use crate::config::Task;
use crate::data_loader::backend::Backend;
use crate::data_loader::batch::{BatchAnnotations, Stacked};
use crate::data_loader::dataset::{Annotation, AnnotationRef, DataError, Sample};
use crate::data_loader::resize::{resize_image, resize_mask};

/// Capabilities every task variant provides to the pipeline.
pub trait TaskOps: Send + Sync + fmt::Debug {
    fn task(&self) -> Task;

    /// Whether a stored annotation has the shape this task expects.
    fn accepts(&self, annotation: &AnnotationRef) -> bool {
        annotation.task() == self.task()
    }

    /// Resize the image to `height x width` and keep the annotation aligned.
    fn resize(&self, sample: Sample, height: usize, width: usize) -> Result<Sample, DataError>;

    /// Convert an annotation for `backend`.
    fn convert_annotation(&self, annotation: Annotation, _backend: Backend) -> Annotation {
        annotation
    }

    /// Assemble the annotations of one batch.
    fn stack_annotations(&self, annotations: Vec<Annotation>) -> Result<BatchAnnotations, DataError>;
}

impl Task {
    /// The shared implementation for this task.
    pub fn ops(self) -> &'static dyn TaskOps {
        match self {
            Task::ImageClassification => &Classification,
            Task::ObjectDetection => &Detection,
            Task::SemanticSegmentation => &Segmentation,
        }
    }
}

fn mismatch(task: Task, annotation: &Annotation) -> DataError {
    DataError::Configuration(format!("{task} pipeline received annotation {annotation:?}"))
}

#[derive(Debug, Clone, Copy)]
pub struct Classification;

impl TaskOps for Classification {
    fn task(&self) -> Task {
        Task::ImageClassification
    }

    fn resize(&self, sample: Sample, height: usize, width: usize) -> Result<Sample, DataError> {
        let image = resize_image(sample.image_hwc()?, height, width)?;
        Ok(Sample::new(image, sample.annotation))
    }

    fn stack_annotations(&self, annotations: Vec<Annotation>) -> Result<BatchAnnotations, DataError> {
        let labels = annotations
            .into_iter()
            .map(|a| a.as_label().ok_or_else(|| mismatch(self.task(), &a)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BatchAnnotations::Labels(labels.into()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Detection;

impl TaskOps for Detection {
    fn task(&self) -> Task {
        Task::ObjectDetection
    }

    fn resize(&self, sample: Sample, height: usize, width: usize) -> Result<Sample, DataError> {
        let (h, w) = sample.spatial_size()?;
        let image = resize_image(sample.image_hwc()?, height, width)?;
        let annotation = match sample.annotation {
            Annotation::Coco(mut record) => {
                record.scale(width as f32 / w as f32, height as f32 / h as f32);
                Annotation::Coco(record)
            }
            other => return Err(mismatch(self.task(), &other)),
        };
        Ok(Sample::new(image, annotation))
    }

    fn convert_annotation(&self, annotation: Annotation, backend: Backend) -> Annotation {
        match (annotation, backend) {
            // Polygons are ragged; the channels-first backend carries boxes only.
            (Annotation::Coco(mut record), Backend::Torch) => {
                record.segmentation.clear();
                Annotation::Coco(record)
            }
            (other, _) => other,
        }
    }

    fn stack_annotations(&self, annotations: Vec<Annotation>) -> Result<BatchAnnotations, DataError> {
        let records = annotations
            .into_iter()
            .map(|a| match a {
                Annotation::Coco(record) => Ok(record),
                other => Err(mismatch(self.task(), &other)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BatchAnnotations::Coco(records))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Segmentation;

impl TaskOps for Segmentation {
    fn task(&self) -> Task {
        Task::SemanticSegmentation
    }

    fn resize(&self, sample: Sample, height: usize, width: usize) -> Result<Sample, DataError> {
        let image = resize_image(sample.image_hwc()?, height, width)?;
        let annotation = match sample.annotation {
            Annotation::Mask(mask) => Annotation::Mask(resize_mask(&mask, height, width)?),
            other => return Err(mismatch(self.task(), &other)),
        };
        Ok(Sample::new(image, annotation))
    }

    fn stack_annotations(&self, annotations: Vec<Annotation>) -> Result<BatchAnnotations, DataError> {
        let masks = annotations
            .into_iter()
            .map(|a| match a {
                Annotation::Mask(mask) => Ok(mask),
                other => Err(mismatch(self.task(), &other)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let count = masks.len();
        let stacked = Stacked::stack(masks);
        if !stacked.is_uniform() {
            tracing::warn!(
                "Batch of {} masks has differing shapes; returning them as a sequence",
                count
            );
        }
        Ok(BatchAnnotations::Masks(stacked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loader::coco::CocoAnnotation;
    use ndarray::{Array2, Array3};

    #[test]
    fn ops_are_selected_per_task() {
        for task in [
            Task::ImageClassification,
            Task::ObjectDetection,
            Task::SemanticSegmentation,
        ] {
            assert_eq!(task.ops().task(), task);
        }
        assert!(Task::ObjectDetection.ops().accepts(&AnnotationRef::Coco(CocoAnnotation::default())));
        assert!(!Task::ObjectDetection.ops().accepts(&AnnotationRef::Label(1)));
    }

    #[test]
    fn detection_resize_rescales_boxes() {
        let record = CocoAnnotation::from_boxes(7, vec![[10.0, 20.0, 30.0, 40.0]], vec![2]);
        let sample = Sample::new(Array3::zeros((100, 200, 3)), Annotation::Coco(record));

        let out = Detection.resize(sample, 50, 100).unwrap();
        assert_eq!(out.image.shape(), &[50, 100, 3]);
        let rec = out.annotation.as_coco().unwrap();
        assert_eq!(rec.bboxes[0], [5.0, 10.0, 15.0, 20.0]);
        assert_eq!(rec.areas[0], 300.0);
    }

    #[test]
    fn segmentation_resize_keeps_mask_aligned() {
        let mut mask = Array2::<u8>::zeros((4, 4));
        mask[[0, 0]] = 3;
        let sample = Sample::new(Array3::zeros((4, 4, 3)), Annotation::Mask(mask));

        let out = Segmentation.resize(sample, 8, 8).unwrap();
        let mask = out.annotation.as_mask().unwrap();
        assert_eq!(mask.dim(), (8, 8));
        assert_eq!(mask[[0, 0]], 3);
        assert_eq!(mask[[1, 1]], 3);
        assert_eq!(mask[[7, 7]], 0);
    }

    #[test]
    fn mismatched_masks_fall_back_to_sequence() {
        let masks = vec![
            Annotation::Mask(Array2::zeros((4, 4))),
            Annotation::Mask(Array2::zeros((6, 4))),
        ];
        let stacked = Segmentation.stack_annotations(masks).unwrap();
        let masks = stacked.as_masks().unwrap();
        assert!(!masks.is_uniform());
        assert_eq!(masks.shape(), None);

        let same = vec![Annotation::Mask(Array2::zeros((4, 4))); 2];
        let stacked = Segmentation.stack_annotations(same).unwrap();
        assert_eq!(stacked.as_masks().unwrap().shape(), Some(&[2, 4, 4][..]));
    }

    #[test]
    fn torch_drops_polygons_from_detection_records() {
        let mut record = CocoAnnotation::from_boxes(1, vec![[0.0, 0.0, 1.0, 1.0]], vec![1]);
        record.segmentation = vec![vec![0.0, 0.0, 1.0, 1.0]];
        let ann = Detection.convert_annotation(Annotation::Coco(record.clone()), Backend::Torch);
        assert!(ann.as_coco().unwrap().segmentation.is_empty());

        let ann = Detection.convert_annotation(Annotation::Coco(record), Backend::TensorFlow);
        assert_eq!(ann.as_coco().unwrap().segmentation.len(), 1);
    }

    #[test]
    fn classification_rejects_foreign_annotations() {
        let err = Classification
            .stack_annotations(vec![Annotation::Label(0), Annotation::Mask(Array2::zeros((1, 1)))])
            .unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)));
    }
}
