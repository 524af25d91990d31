// src/data_loader/split.rs
//
// Partitioning a dataset into named subsets (train / val / test, or any
// other names) by fraction.

use std::collections::HashSet;

use crate::data_loader::dataset::DataError;
use crate::data_loader::sampler::permutation;

const FRACTION_EPSILON: f64 = 1e-6;

/// Named fractions of a dataset, in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SplitSpec {
    parts: Vec<(String, f64)>,
    shuffle: bool,
    seed: Option<u64>,
}

impl SplitSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn train_val_test(train: f64, val: f64, test: f64) -> Self {
        Self::new()
            .with("train", train)
            .with("val", val)
            .with("test", test)
    }

    /// Add a named part.
    pub fn with(mut self, name: impl Into<String>, fraction: f64) -> Self {
        self.parts.push((name.into(), fraction));
        self
    }

    /// Draw positions in random order before partitioning.
    pub fn shuffled(mut self, seed: Option<u64>) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    pub fn parts(&self) -> &[(String, f64)] {
        &self.parts
    }

    fn validate(&self) -> Result<(), DataError> {
        if self.parts.is_empty() {
            return Err(DataError::Configuration("no split parts given".into()));
        }
        let mut names = HashSet::new();
        for (name, fraction) in &self.parts {
            if name.is_empty() || !names.insert(name.as_str()) {
                return Err(DataError::Configuration(format!(
                    "split names must be unique and non-empty, got `{name}`"
                )));
            }
            if !(0.0..=1.0).contains(fraction) {
                return Err(DataError::Configuration(format!(
                    "split `{name}` has fraction {fraction} outside [0, 1]"
                )));
            }
        }
        let total: f64 = self.parts.iter().map(|(_, f)| f).sum();
        if total > 1.0 + FRACTION_EPSILON {
            return Err(DataError::Configuration(format!(
                "split fractions sum to {total}, more than 1"
            )));
        }
        Ok(())
    }
}

/// Store positions for each part of `spec`, over a dataset of `len` samples.
///
/// Each part receives `floor(len * fraction)` positions. When the fractions
/// sum to one, the leftover positions go to the first part so every sample
/// is used.
pub fn generate_split_indexes(len: usize, spec: &SplitSpec) -> Result<Vec<(String, Vec<usize>)>, DataError> {
    spec.validate()?;

    let order = if spec.shuffle {
        permutation(len, spec.seed)
    } else {
        (0..len).collect()
    };

    let mut counts: Vec<usize> = spec
        .parts
        .iter()
        .map(|(_, f)| (len as f64 * f).floor() as usize)
        .collect();
    let total: f64 = spec.parts.iter().map(|(_, f)| f).sum();
    if (total - 1.0).abs() <= FRACTION_EPSILON {
        let assigned: usize = counts.iter().sum();
        counts[0] += len.saturating_sub(assigned);
    }

    let mut start = 0;
    let splits = spec
        .parts
        .iter()
        .zip(counts)
        .map(|((name, _), count)| {
            let end = (start + count).min(len);
            let positions = order[start..end].to_vec();
            start = end;
            (name.clone(), positions)
        })
        .collect();
    Ok(splits)
}

/// Check that every part lies within `0..len` and that no position is shared.
pub fn validate_split_indexes(len: usize, splits: &[(String, Vec<usize>)]) -> Result<(), DataError> {
    let mut seen = HashSet::new();
    for (name, positions) in splits {
        for &p in positions {
            if p >= len {
                return Err(DataError::Configuration(format!(
                    "split `{name}` refers to position {p}, dataset has {len}"
                )));
            }
            if !seen.insert(p) {
                return Err(DataError::Configuration(format!(
                    "position {p} appears in more than one split (again in `{name}`)"
                )));
            }
        }
    }
    Ok(())
}
