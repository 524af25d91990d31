// src/data_loader/batch.rs
//
// Batched results: images and annotations stacked along a new leading axis
// when their shapes agree, or kept as a sequence when they do not.

use ndarray::{Array, Array1, ArrayD, Axis, Dimension, RemoveAxis};

use crate::data_loader::backend::Backend;
use crate::data_loader::coco::CocoAnnotation;

/// Arrays stacked into one, or left as a sequence of differing shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Stacked<A> {
    Uniform(ArrayD<A>),
    Heterogeneous(Vec<ArrayD<A>>),
}

impl<A: Clone> Stacked<A> {
    /// Stack `items` along a new first axis, falling back to a sequence
    /// when their shapes disagree.
    pub fn stack<D>(items: Vec<Array<A, D>>) -> Self
    where
        D: Dimension,
        D::Larger: RemoveAxis,
    {
        let views: Vec<_> = items.iter().map(|a| a.view()).collect();
        match ndarray::stack(Axis(0), &views) {
            Ok(batch) => Stacked::Uniform(batch.into_dyn()),
            Err(_) => Stacked::Heterogeneous(items.into_iter().map(|a| a.into_dyn()).collect()),
        }
    }
}

impl<A> Stacked<A> {
    /// Number of batch members.
    pub fn len(&self) -> usize {
        match self {
            Stacked::Uniform(batch) => batch.shape().first().copied().unwrap_or(0),
            Stacked::Heterogeneous(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_uniform(&self) -> bool {
        matches!(self, Stacked::Uniform(_))
    }

    /// Shape of the stacked array, if uniform.
    pub fn shape(&self) -> Option<&[usize]> {
        match self {
            Stacked::Uniform(batch) => Some(batch.shape()),
            Stacked::Heterogeneous(_) => None,
        }
    }

    pub fn as_uniform(&self) -> Option<&ArrayD<A>> {
        match self {
            Stacked::Uniform(batch) => Some(batch),
            Stacked::Heterogeneous(_) => None,
        }
    }
}

/// Annotations of a batch, grouped according to the task.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchAnnotations {
    /// Classification labels, one per member.
    Labels(Array1<i64>),
    /// Segmentation masks.
    Masks(Stacked<u8>),
    /// Detection records; box counts differ, so these are never stacked.
    Coco(Vec<CocoAnnotation>),
}

impl BatchAnnotations {
    pub fn len(&self) -> usize {
        match self {
            BatchAnnotations::Labels(labels) => labels.len(),
            BatchAnnotations::Masks(masks) => masks.len(),
            BatchAnnotations::Coco(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_labels(&self) -> Option<&Array1<i64>> {
        match self {
            BatchAnnotations::Labels(labels) => Some(labels),
            _ => None,
        }
    }

    pub fn as_coco(&self) -> Option<&[CocoAnnotation]> {
        match self {
            BatchAnnotations::Coco(records) => Some(records),
            _ => None,
        }
    }

    pub fn as_masks(&self) -> Option<&Stacked<u8>> {
        match self {
            BatchAnnotations::Masks(masks) => Some(masks),
            _ => None,
        }
    }
}

/// One assembled batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub images: Stacked<f32>,
    pub annotations: BatchAnnotations,
    /// Backend whose tensor layout the batch is in, if any.
    pub backend: Option<Backend>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
