// src/data_loader/options.rs
//!
//! Construction-time options for a `DataManager`.
//!
//! Builder helpers are provided so callers can write a fluent style:
//!
//! let opts = LoaderOptions::default()
//!     .shuffle(true, Some(42))
//!     .with_batch_size(16)
//!     .with_image_size(ImageSize::Auto);
//!
//! Defaults: shuffled with a random seed, unbatched, images left at their
//! stored size, backend selection shared process-wide.

use std::sync::Arc;

use crate::config::ImageSize;
use crate::constants::{ENV_BATCH_SIZE, ENV_IMAGE_SIZE, ENV_SEED, ENV_SHUFFLE};
use crate::data_loader::backend::BackendSelection;
use crate::data_loader::dataset::DataError;

#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Shuffle the accessor order once at construction.
    pub shuffle: bool,
    /// Seed for that shuffle; `None` draws one from OS entropy.
    pub seed: Option<u64>,
    /// Initial batch size. `None` keeps the data unbatched.
    pub batch_size: Option<usize>,
    /// Initial resize policy.
    pub image_size: ImageSize,
    /// Backend pin shared with other managers.
    pub backend_selection: Arc<BackendSelection>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            shuffle: true,
            seed: None,
            batch_size: None,
            image_size: ImageSize::Default,
            backend_selection: BackendSelection::global(),
        }
    }
}

impl LoaderOptions {
    /// Enable/disable the construction-time shuffle and set its seed.
    pub fn shuffle(mut self, on: bool, seed: Option<u64>) -> Self {
        self.shuffle = on;
        self.seed = seed;
        self
    }

    /// Builder-style helper: batch the data from the start.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn with_image_size(mut self, size: ImageSize) -> Self {
        self.image_size = size;
        self
    }

    /// Use a private backend selection instead of the process-wide one.
    pub fn with_backend_selection(mut self, selection: Arc<BackendSelection>) -> Self {
        self.backend_selection = selection;
        self
    }

    /// Defaults overridden by the `AGLOADER_*` environment variables.
    pub fn from_env() -> Result<Self, DataError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Self::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DataError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = Self::default();

        if let Some(v) = lookup(ENV_SHUFFLE) {
            opts.shuffle = parse_bool(ENV_SHUFFLE, &v)?;
        }
        if let Some(v) = lookup(ENV_SEED) {
            opts.seed = Some(parse_number(ENV_SEED, &v)?);
        }
        if let Some(v) = lookup(ENV_BATCH_SIZE) {
            let size: usize = parse_number(ENV_BATCH_SIZE, &v)?;
            opts.batch_size = (size > 0).then_some(size);
        }
        if let Some(v) = lookup(ENV_IMAGE_SIZE) {
            opts.image_size = v.parse()?;
        }

        tracing::debug!("Loader options from environment: {:?}", opts);
        Ok(opts)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, DataError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(DataError::Configuration(format!("{key}: expected a boolean, got `{other}`"))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, DataError> {
    value
        .trim()
        .parse()
        .map_err(|_| DataError::Configuration(format!("{key}: expected a number, got `{value}`")))
}
