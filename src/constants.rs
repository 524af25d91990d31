// src/constants.rs
//
// Centralized constants for agloader to avoid hardcoded values throughout the codebase

/// Image file extensions recognised when scanning a dataset layout (lowercase).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];

/// Folder holding the input images of a canonical dataset layout.
pub const IMAGES_DIR: &str = "images";

/// Folder holding annotation files (COCO JSON or mask images).
pub const ANNOTATIONS_DIR: &str = "annotations";

/// COCO instances file for object detection datasets, relative to `ANNOTATIONS_DIR`.
pub const COCO_INSTANCES_FILE: &str = "instances.json";

// =============================================================================
// Resize Constants
// =============================================================================
//
// The `auto` resize policy rounds the longer image side to a multiple of
// `AUTO_RESIZE_MULTIPLE` and clamps it into
// [`AUTO_RESIZE_MIN_SIDE`, `AUTO_RESIZE_MAX_SIDE`], producing a square target.
// Datasets of large photographs therefore all land on 512 x 512.

/// Granularity of the `auto` resize target (pixels).
pub const AUTO_RESIZE_MULTIPLE: usize = 32;

/// Smallest side produced by the `auto` resize policy.
pub const AUTO_RESIZE_MIN_SIDE: usize = 32;

/// Largest side produced by the `auto` resize policy.
pub const AUTO_RESIZE_MAX_SIDE: usize = 512;

/// Intensity ceiling of 8-bit image data, used when scaling to `[0, 1]`.
pub const MAX_PIXEL_VALUE: f32 = 255.0;

// =============================================================================
// Environment Variables
// =============================================================================

/// Enable (`1`, `true`, `yes`) or disable the construction-time shuffle.
pub const ENV_SHUFFLE: &str = "AGLOADER_SHUFFLE";

/// Seed for the construction-time shuffle.
pub const ENV_SEED: &str = "AGLOADER_SEED";

/// Initial batch size (`0` keeps the data unbatched).
pub const ENV_BATCH_SIZE: &str = "AGLOADER_BATCH_SIZE";

/// Initial image size: `HxW`, `auto` or `default`.
pub const ENV_IMAGE_SIZE: &str = "AGLOADER_IMAGE_SIZE";
