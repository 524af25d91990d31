// src/config.rs
//
// Task and image-size selectors shared by the library and the CLI.

use clap::ValueEnum;
use std::fmt;
use std::str::FromStr;

use crate::data_loader::DataError;

/// Machine-learning problem a dataset is annotated for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum)]
#[value(rename_all = "snake_case")] // CLI shows image_classification, object_detection, ...
pub enum Task {
    #[value(alias = "classification")]
    ImageClassification,
    #[value(alias = "detection")]
    ObjectDetection,
    #[value(alias = "segmentation")]
    SemanticSegmentation,
}

impl Task {
    /// Canonical name of the task, as used in dataset metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::ImageClassification => "image_classification",
            Task::ObjectDetection => "object_detection",
            Task::SemanticSegmentation => "semantic_segmentation",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image_classification" | "classification" => Ok(Task::ImageClassification),
            "object_detection" | "detection" => Ok(Task::ObjectDetection),
            "semantic_segmentation" | "segmentation" => Ok(Task::SemanticSegmentation),
            other => Err(DataError::Configuration(format!("unknown task: {other}"))),
        }
    }
}

/// Image size assignment for the resize stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageSize {
    /// Reset to the default policy (images are left at their stored size).
    #[default]
    Default,
    /// Infer a square target per call from the image shape.
    Auto,
    /// Resize every image to `height x width`.
    Fixed { height: usize, width: usize },
}

impl FromStr for ImageSize {
    type Err = DataError;

    /// Parses `default`, `auto` or `HxW` (e.g. `256x512`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "default" | "none" => return Ok(ImageSize::Default),
            "auto" => return Ok(ImageSize::Auto),
            _ => {}
        }
        let (h, w) = s
            .split_once('x')
            .ok_or_else(|| DataError::Configuration(format!("invalid image size: {s}")))?;
        let height: usize = h
            .parse()
            .map_err(|_| DataError::Configuration(format!("invalid image height: {h}")))?;
        let width: usize = w
            .parse()
            .map_err(|_| DataError::Configuration(format!("invalid image width: {w}")))?;
        if height == 0 || width == 0 {
            return Err(DataError::Configuration(format!(
                "image size must be non-zero, got {height}x{width}"
            )));
        }
        Ok(ImageSize::Fixed { height, width })
    }
}
