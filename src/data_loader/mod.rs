// src/data_loader/mod.rs

//! Public API surface for the agloader data layer.

/// Sample types, on-disk readers and the crate error.
pub mod dataset;

pub mod backend;
pub mod batch;
pub mod builder;
pub mod coco;
pub mod manager;
pub mod options;
pub mod resize;
pub mod sampler;
pub mod split;
pub mod store;
pub mod task;
pub mod training;
pub mod transform;

// Re‐export the key types at this level:
pub use backend::{Backend, BackendSelection};
pub use batch::{Batch, BatchAnnotations, Stacked};
pub use builder::{DataBuilder, DatasetMetadata};
pub use coco::CocoAnnotation;
pub use dataset::{Annotation, AnnotationRef, DataError, InputRef, Intensity, Sample};
pub use manager::{DataManager, Loaded, SplitContents};
pub use options::LoaderOptions;
pub use sampler::{AccessorArray, Resolved};
pub use split::{generate_split_indexes, SplitSpec};
pub use training::{StateRequest, TrainState, TrainingManager};
pub use transform::{
    DualTransform, HorizontalFlip, ImageTransform, Normalize, RemapLabels, ScaleIntensity,
    TargetTransform, TransformUpdate, TransformUpdates,
};
