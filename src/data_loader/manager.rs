// src/data_loader/manager.rs
//
// `DataManager` ties the sample store, the accessor array and the training
// controller together and is the object callers index into.

use std::path::Path;

use crate::config::{ImageSize, Task};
use crate::data_loader::batch::Batch;
use crate::data_loader::builder::{DataBuilder, DatasetMetadata};
use crate::data_loader::dataset::{AnnotationRef, DataError, InputRef, Sample};
use crate::data_loader::options::LoaderOptions;
use crate::data_loader::sampler::{AccessorArray, Resolved};
use crate::data_loader::split::{generate_split_indexes, validate_split_indexes, SplitSpec};
use crate::data_loader::store::SampleStore;
use crate::data_loader::training::{StateRequest, TrainState, TrainingManager};
use crate::data_loader::transform::{TransformUpdate, TransformUpdates};

/// What one logical index yields.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    Sample(Sample),
    Batch(Batch),
}

impl Loaded {
    pub fn as_sample(&self) -> Option<&Sample> {
        match self {
            Loaded::Sample(s) => Some(s),
            Loaded::Batch(_) => None,
        }
    }

    pub fn as_batch(&self) -> Option<&Batch> {
        match self {
            Loaded::Batch(b) => Some(b),
            Loaded::Sample(_) => None,
        }
    }

    pub fn into_sample(self) -> Option<Sample> {
        match self {
            Loaded::Sample(s) => Some(s),
            Loaded::Batch(_) => None,
        }
    }

    pub fn into_batch(self) -> Option<Batch> {
        match self {
            Loaded::Batch(b) => Some(b),
            Loaded::Sample(_) => None,
        }
    }
}

/// Split contents keyed by split name.
pub type SplitContents = Vec<(String, Vec<(InputRef, AnnotationRef)>)>;

#[derive(Debug)]
pub struct DataManager {
    metadata: DatasetMetadata,
    store: SampleStore,
    accessors: AccessorArray,
    training: TrainingManager,
}

impl DataManager {
    /// Build a manager from `builder`, applying the construction-time
    /// shuffle, batch size and resize policy from `options`.
    pub fn new(builder: DataBuilder, options: LoaderOptions) -> Result<Self, DataError> {
        let (metadata, root, contents) = builder.into_parts();
        let store = SampleStore::new(contents, metadata.task, &root)?;

        let mut accessors = AccessorArray::new(store.len());
        if options.shuffle {
            accessors.shuffle(options.seed);
        }
        accessors.set_batch(options.batch_size);

        let mut training = TrainingManager::new(metadata.task.ops(), options.backend_selection);
        training.resize_mut().assign(options.image_size);

        tracing::debug!(
            "DataManager `{}`: {} samples, task {}, batch size {:?}",
            metadata.name,
            store.len(),
            metadata.task,
            accessors.batch_size()
        );
        Ok(Self {
            metadata,
            store,
            accessors,
            training,
        })
    }

    /// Scan `root` with the layout for `task` and build a manager.
    pub fn from_layout(root: impl AsRef<Path>, task: Task, options: LoaderOptions) -> Result<Self, DataError> {
        Self::new(DataBuilder::from_layout(root, task)?, options)
    }

    /// The sample (unbatched) or batch (batched) at logical `index`.
    pub fn get(&self, index: usize) -> Result<Loaded, DataError> {
        match self.accessors.resolve(index)? {
            Resolved::Single(position) => {
                let sample = self.store.get_at(position)?;
                Ok(Loaded::Sample(self.training.apply(sample, false)?))
            }
            Resolved::Group(positions) => self.load_batch(positions).map(Loaded::Batch),
        }
    }

    /// One result per index, in order. Every index is checked before any
    /// sample is loaded.
    pub fn get_many(&self, indexes: &[usize]) -> Result<Vec<Loaded>, DataError> {
        for &index in indexes {
            self.accessors.resolve(index)?;
        }
        indexes.iter().map(|&i| self.get(i)).collect()
    }

    fn load_batch(&self, positions: &[usize]) -> Result<Batch, DataError> {
        let mut images = Vec::with_capacity(positions.len());
        let mut annotations = Vec::with_capacity(positions.len());
        for &position in positions {
            let sample = self.training.apply(self.store.get_at(position)?, true)?;
            let (image, annotation) = sample.into_parts();
            images.push(image);
            annotations.push(annotation);
        }
        self.training.make_batch(images, annotations)
    }

    /// Every logical item in order.
    pub fn iter(&self) -> impl Iterator<Item = Result<Loaded, DataError>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    pub fn shuffle(&mut self, seed: Option<u64>) {
        self.accessors.shuffle(seed);
    }

    /// Group the data into batches of `size`; `None` or `0` unbatches and
    /// `1` leaves the current batching unchanged.
    pub fn batch_data(&mut self, size: Option<usize>) {
        self.accessors.set_batch(size);
        tracing::debug!("Batch size now {:?}", self.accessors.batch_size());
    }

    pub fn assign_resize(&mut self, size: ImageSize) {
        self.training.resize_mut().assign(size);
    }

    pub fn push_transforms(&mut self, mut updates: TransformUpdates) {
        if self.task() == Task::ImageClassification && updates.dual_transform.is_keep() {
            updates.dual_transform = TransformUpdate::Reset;
        }
        self.training.transforms_mut().assign(updates);
    }

    pub fn update_train_state(&mut self, request: StateRequest) -> Result<TrainState, DataError> {
        self.training.update_state(request)
    }

    /// Content sub-mappings for each named set of store positions.
    pub fn generate_split_contents(&self, splits: &[(String, Vec<usize>)]) -> Result<SplitContents, DataError> {
        validate_split_indexes(self.store.len(), splits)?;
        let objects = self.store.objects();
        Ok(splits
            .iter()
            .map(|(name, positions)| {
                let contents = positions
                    .iter()
                    .map(|&p| (objects[p].input().clone(), objects[p].annotation().clone()))
                    .collect();
                (name.clone(), contents)
            })
            .collect())
    }

    /// Independent managers for each non-empty part of `spec`.
    ///
    /// Each inherits this manager's resize policy, transforms, training
    /// state, batch size and backend selection.
    pub fn split(&self, spec: &SplitSpec) -> Result<Vec<(String, DataManager)>, DataError> {
        let indexes = generate_split_indexes(self.store.len(), spec)?;
        let mut managers = Vec::new();
        for (name, contents) in self.generate_split_contents(&indexes)? {
            if contents.is_empty() {
                tracing::debug!("Split `{}` is empty; skipping", name);
                continue;
            }
            let metadata = DatasetMetadata {
                name: format!("{}-{}", self.metadata.name, name),
                ..self.metadata.clone()
            };
            let store = SampleStore::new(contents, metadata.task, self.store.root())?;
            let mut accessors = AccessorArray::new(store.len());
            accessors.set_batch(self.accessors.batch_size());
            managers.push((
                name,
                DataManager {
                    metadata,
                    store,
                    accessors,
                    training: self.training.clone(),
                },
            ));
        }
        Ok(managers)
    }

    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    pub fn task(&self) -> Task {
        self.metadata.task
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    pub fn num_classes(&self) -> usize {
        self.metadata.num_classes()
    }

    pub fn class_names(&self) -> &[String] {
        &self.metadata.class_names
    }

    pub fn train_state(&self) -> TrainState {
        self.training.state()
    }

    pub fn training(&self) -> &TrainingManager {
        &self.training
    }

    pub fn batch_size(&self) -> Option<usize> {
        self.accessors.batch_size()
    }

    /// Number of samples in the store, regardless of batching.
    pub fn num_samples(&self) -> usize {
        self.store.len()
    }

    /// Number of logical items: samples when unbatched, batches when batched.
    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}
