// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root: public re-exports.

pub mod config;
pub mod constants;
pub mod data_loader;

pub use config::{ImageSize, Task};
pub use data_loader::{
    Annotation, AnnotationRef, Backend, BackendSelection, Batch, BatchAnnotations, CocoAnnotation,
    DataBuilder, DataError, DataManager, DatasetMetadata, InputRef, Intensity, Loaded, LoaderOptions, Sample,
    SplitSpec, Stacked, StateRequest, TrainState, TransformUpdates,
};
