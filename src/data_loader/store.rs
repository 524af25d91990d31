// src/data_loader/store.rs
//
// The immutable, ordered collection of data objects a manager reads from.

use std::path::{Path, PathBuf};

use crate::config::Task;
use crate::data_loader::dataset::{AnnotationRef, DataError, DataObject, InputRef, Sample};

#[derive(Debug, Clone)]
pub struct SampleStore {
    task: Task,
    root: PathBuf,
    objects: Vec<DataObject>,
}

impl SampleStore {
    /// Build a store from ordered `(input, annotation)` entries.
    ///
    /// Relative paths are resolved against `root`. Every annotation must
    /// belong to `task`.
    pub fn new(
        contents: Vec<(InputRef, AnnotationRef)>,
        task: Task,
        root: &Path,
    ) -> Result<Self, DataError> {
        if contents.is_empty() {
            return Err(DataError::Configuration(format!(
                "no samples for {task} dataset at {}",
                root.display()
            )));
        }
        let ops = task.ops();
        let objects = contents
            .into_iter()
            .enumerate()
            .map(|(i, (input, annotation))| {
                if let AnnotationRef::LabelName(name) = &annotation {
                    return Err(DataError::Configuration(format!(
                        "entry {i}: label `{name}` has not been mapped to an id"
                    )));
                }
                if !ops.accepts(&annotation) {
                    return Err(DataError::Configuration(format!(
                        "entry {i}: {} annotation in a {task} dataset",
                        annotation.task()
                    )));
                }
                Ok(DataObject::new(input, annotation, root))
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Built {} store with {} samples", task, objects.len());
        Ok(Self {
            task,
            root: root.to_owned(),
            objects,
        })
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn object(&self, position: usize) -> Result<&DataObject, DataError> {
        self.objects.get(position).ok_or(DataError::IndexOutOfRange {
            index: position,
            len: self.objects.len(),
        })
    }

    /// Load the sample stored at `position`.
    pub fn get_at(&self, position: usize) -> Result<Sample, DataError> {
        self.object(position)?.load()
    }

    pub fn objects(&self) -> &[DataObject] {
        &self.objects
    }
}
