// src/data_loader/backend.rs
//
// The two tensor layout ecosystems a manager can convert into, and the
// process-wide selection that allows only one of them at a time.

use ndarray::{ArrayD, Axis, IxDyn};
use once_cell::sync::Lazy;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use crate::constants::MAX_PIXEL_VALUE;
use crate::data_loader::batch::Stacked;
use crate::data_loader::dataset::{DataError, Intensity, Sample};

/// Tensor backend targeted by tensor conversion and batch stacking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Channels-last layout; single images gain a leading batch axis.
    TensorFlow,
    /// Channels-first layout; 8-bit intensities are scaled into `[0, 1]`.
    Torch,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::TensorFlow => "tf",
            Backend::Torch => "torch",
        }
    }

    /// Bring a sample's intensities into the range the backend expects.
    ///
    /// Torch divides 8-bit pixel data by [`MAX_PIXEL_VALUE`]; samples already
    /// tagged [`Intensity::Scaled`] pass through. TensorFlow keeps values.
    pub fn scale_sample(self, mut sample: Sample) -> Sample {
        if self == Backend::Torch && sample.intensity == Intensity::Pixel {
            sample.image.mapv_inplace(|v| v / MAX_PIXEL_VALUE);
            sample.intensity = Intensity::Scaled;
        }
        sample
    }

    /// Lay out one `(H, W, C)` image.
    ///
    /// TensorFlow yields `(1, H, W, C)`; Torch yields `(C, H, W)`. Values are
    /// not touched; see [`Backend::scale_sample`].
    pub fn convert_image(self, image: ArrayD<f32>) -> Result<ArrayD<f32>, DataError> {
        match self {
            Backend::TensorFlow => {
                if image.ndim() == 3 {
                    Ok(image.insert_axis(Axis(0)))
                } else {
                    Ok(image)
                }
            }
            Backend::Torch => {
                if image.ndim() == 3 {
                    Ok(channels_first(image, &[2, 0, 1]))
                } else {
                    Ok(image)
                }
            }
        }
    }

    /// Lay out a batch of images stacked (or not) along the first axis.
    pub fn convert_batch_images(self, images: Stacked<f32>) -> Result<Stacked<f32>, DataError> {
        match (self, images) {
            (Backend::TensorFlow, images) => Ok(images),
            (Backend::Torch, Stacked::Uniform(batch)) => {
                if batch.ndim() == 4 {
                    Ok(Stacked::Uniform(channels_first(batch, &[0, 3, 1, 2])))
                } else {
                    Ok(Stacked::Uniform(batch))
                }
            }
            (Backend::Torch, Stacked::Heterogeneous(items)) => {
                let items = items
                    .into_iter()
                    .map(|img| self.convert_image(img))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Stacked::Heterogeneous(items))
            }
        }
    }
}

fn channels_first(array: ArrayD<f32>, order: &[usize]) -> ArrayD<f32> {
    array
        .permuted_axes(IxDyn(order))
        .as_standard_layout()
        .into_owned()
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tf" | "tensorflow" => Ok(Backend::TensorFlow),
            "torch" | "pytorch" => Ok(Backend::Torch),
            other => Err(DataError::Configuration(format!("unknown backend: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SelectionState {
    active: Backend,
    pinned: bool,
}

/// Which backend is active, and whether the caller has committed to it.
///
/// Every training-state controller holds an `Arc` to one of these. The
/// process-wide instance is [`BackendSelection::global`]; tests and
/// embedders that need isolation can create their own.
#[derive(Debug)]
pub struct BackendSelection {
    state: Mutex<SelectionState>,
}

static GLOBAL_SELECTION: Lazy<Arc<BackendSelection>> =
    Lazy::new(|| Arc::new(BackendSelection::new()));

impl Default for BackendSelection {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendSelection {
    /// Unpinned selection with TensorFlow active.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SelectionState {
                active: Backend::TensorFlow,
                pinned: false,
            }),
        }
    }

    /// The process-wide selection.
    pub fn global() -> Arc<BackendSelection> {
        Arc::clone(&GLOBAL_SELECTION)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SelectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn active(&self) -> Backend {
        self.lock().active
    }

    /// The pinned backend, if any.
    pub fn pinned(&self) -> Option<Backend> {
        let state = self.lock();
        state.pinned.then_some(state.active)
    }

    /// Pin `backend` unconditionally, replacing any earlier pin.
    pub fn pin(&self, backend: Backend) {
        let mut state = self.lock();
        state.active = backend;
        state.pinned = true;
    }

    /// Pin `backend` unless a different one is already pinned.
    pub fn try_pin(&self, backend: Backend) -> Result<(), DataError> {
        let mut state = self.lock();
        if state.pinned && state.active != backend {
            return Err(DataError::BackendConflict {
                requested: backend,
                pinned: state.active,
            });
        }
        state.active = backend;
        state.pinned = true;
        Ok(())
    }

    /// Release the pin; the active backend is kept.
    pub fn unpin(&self) {
        self.lock().pinned = false;
    }
}
