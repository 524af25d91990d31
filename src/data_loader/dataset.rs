//! Core sample abstractions for agloader's data manager.
//!
//! A dataset is an ordered list of [`DataObject`]s: one input reference
//! (an image path or an in-memory array) paired with its annotation.
//! Loading a `DataObject` produces a [`Sample`], which is what the
//! pipeline stages operate on.

use anyhow::Error as AnyError;
use ndarray::{Array2, Array3, ArrayD, ArrayView3, Ix3};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::Task;
use crate::data_loader::backend::Backend;
use crate::data_loader::coco::CocoAnnotation;

/// Error type for every dataset, pipeline and manager operation.
#[derive(Error, Debug)]
pub enum DataError {
    /// Malformed or empty input at construction time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A tensor backend was requested while the other one is pinned.
    #[error("cannot switch to the `{requested}` backend: `{pinned}` is pinned")]
    BackendConflict { requested: Backend, pinned: Backend },

    #[error("index {index} out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("invalid annotation file {}: {source}", .path.display())]
    Annotation {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    /// Errors raised inside user-supplied transforms.
    #[error(transparent)]
    Other(#[from] AnyError),
}

// Mapping from string to error
impl From<String> for DataError {
    fn from(s: String) -> Self {
        DataError::Other(AnyError::msg(s))
    }
}

impl From<&str> for DataError {
    fn from(s: &str) -> Self {
        DataError::Other(AnyError::msg(s.to_string()))
    }
}

/// Where the input image of a sample comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum InputRef {
    /// Image file; relative paths are resolved against the dataset root.
    Path(PathBuf),
    /// Already-decoded image in `(height, width, channels)` layout.
    Array(Array3<f32>),
}

impl From<&str> for InputRef {
    fn from(path: &str) -> Self {
        InputRef::Path(PathBuf::from(path))
    }
}

impl From<PathBuf> for InputRef {
    fn from(path: PathBuf) -> Self {
        InputRef::Path(path)
    }
}

impl From<Array3<f32>> for InputRef {
    fn from(image: Array3<f32>) -> Self {
        InputRef::Array(image)
    }
}

/// Annotation as stored in a content mapping, before loading.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationRef {
    /// Classification label id.
    Label(i64),
    /// Classification label name, resolved to an id by the `DataBuilder`.
    LabelName(String),
    /// Per-image COCO detection record.
    Coco(CocoAnnotation),
    /// In-memory segmentation mask.
    Mask(Array2<u8>),
    /// Segmentation mask image file.
    MaskPath(PathBuf),
}

impl AnnotationRef {
    /// The task this kind of annotation belongs to.
    pub fn task(&self) -> Task {
        match self {
            AnnotationRef::Label(_) | AnnotationRef::LabelName(_) => Task::ImageClassification,
            AnnotationRef::Coco(_) => Task::ObjectDetection,
            AnnotationRef::Mask(_) | AnnotationRef::MaskPath(_) => Task::SemanticSegmentation,
        }
    }
}

impl From<i64> for AnnotationRef {
    fn from(label: i64) -> Self {
        AnnotationRef::Label(label)
    }
}

impl From<CocoAnnotation> for AnnotationRef {
    fn from(record: CocoAnnotation) -> Self {
        AnnotationRef::Coco(record)
    }
}

impl From<Array2<u8>> for AnnotationRef {
    fn from(mask: Array2<u8>) -> Self {
        AnnotationRef::Mask(mask)
    }
}

/// Loaded annotation carried by a [`Sample`].
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Label(i64),
    Coco(CocoAnnotation),
    Mask(Array2<u8>),
}

impl Annotation {
    pub fn as_label(&self) -> Option<i64> {
        match self {
            Annotation::Label(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_coco(&self) -> Option<&CocoAnnotation> {
        match self {
            Annotation::Coco(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_mask(&self) -> Option<&Array2<u8>> {
        match self {
            Annotation::Mask(m) => Some(m),
            _ => None,
        }
    }
}

/// Value range of a sample's image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Intensity {
    /// Decoded 8-bit values in `[0, 255]`.
    #[default]
    Pixel,
    /// Rescaled by a transform or a backend; conversion leaves it alone.
    Scaled,
}

/// One loaded `(image, annotation)` pair.
///
/// The image is kept in `(height, width, channels)` layout until a tensor
/// backend converts it; `backend` records which conversion, if any, has
/// been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub image: ArrayD<f32>,
    pub annotation: Annotation,
    pub backend: Option<Backend>,
    pub intensity: Intensity,
}

impl Sample {
    pub fn new(image: Array3<f32>, annotation: Annotation) -> Self {
        Self {
            image: image.into_dyn(),
            annotation,
            backend: None,
            intensity: Intensity::Pixel,
        }
    }

    /// Borrow the image as `(height, width, channels)`.
    ///
    /// Fails once a backend has reshaped the image into another layout.
    pub fn image_hwc(&self) -> Result<ArrayView3<'_, f32>, DataError> {
        Ok(self.image.view().into_dimensionality::<Ix3>()?)
    }

    /// `(height, width)` of an HWC image.
    pub fn spatial_size(&self) -> Result<(usize, usize), DataError> {
        let view = self.image_hwc()?;
        let (h, w, _) = view.dim();
        Ok((h, w))
    }

    pub fn is_tensor(&self) -> bool {
        self.backend.is_some()
    }

    pub fn into_parts(self) -> (ArrayD<f32>, Annotation) {
        (self.image, self.annotation)
    }
}

/// A single dataset entry as held by the sample store.
#[derive(Debug, Clone, PartialEq)]
pub struct DataObject {
    input: InputRef,
    annotation: AnnotationRef,
}

impl DataObject {
    /// Create an object, resolving relative paths against `root`.
    pub fn new(input: InputRef, annotation: AnnotationRef, root: &Path) -> Self {
        let input = match input {
            InputRef::Path(p) => InputRef::Path(resolve(root, p)),
            other => other,
        };
        let annotation = match annotation {
            AnnotationRef::MaskPath(p) => AnnotationRef::MaskPath(resolve(root, p)),
            other => other,
        };
        Self { input, annotation }
    }

    pub fn input(&self) -> &InputRef {
        &self.input
    }

    pub fn annotation(&self) -> &AnnotationRef {
        &self.annotation
    }

    /// Read the image (and mask, if stored as a file) and build a `Sample`.
    pub fn load(&self) -> Result<Sample, DataError> {
        let image = match &self.input {
            InputRef::Path(path) => read_image(path)?,
            InputRef::Array(array) => array.clone(),
        };
        let annotation = match &self.annotation {
            AnnotationRef::Label(label) => Annotation::Label(*label),
            AnnotationRef::LabelName(name) => {
                return Err(DataError::Configuration(format!(
                    "unresolved label name `{name}`; build contents through a DataBuilder"
                )));
            }
            AnnotationRef::Coco(record) => Annotation::Coco(record.clone()),
            AnnotationRef::Mask(mask) => Annotation::Mask(mask.clone()),
            AnnotationRef::MaskPath(path) => Annotation::Mask(read_mask(path)?),
        };
        Ok(Sample::new(image, annotation))
    }
}

fn resolve(root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}

/// Decode an image file into an RGB `(height, width, 3)` array.
pub fn read_image(path: &Path) -> Result<Array3<f32>, DataError> {
    let img = image::open(path)
        .map_err(|source| DataError::Image {
            path: path.to_owned(),
            source,
        })?
        .to_rgb8();
    let (w, h) = img.dimensions();
    let data: Vec<f32> = img.into_raw().into_iter().map(f32::from).collect();
    Ok(Array3::from_shape_vec((h as usize, w as usize, 3), data)?)
}

/// Decode a mask image into a single-channel `(height, width)` array.
pub fn read_mask(path: &Path) -> Result<Array2<u8>, DataError> {
    let img = image::open(path)
        .map_err(|source| DataError::Image {
            path: path.to_owned(),
            source,
        })?
        .to_luma8();
    let (w, h) = img.dimensions();
    Ok(Array2::from_shape_vec((h as usize, w as usize), img.into_raw())?)
}
