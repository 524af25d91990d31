// src/data_loader/builder.rs
//
// Turns a dataset root into the ordered content mapping the manager is
// built from. Three canonical layouts are understood:
//
//   classification   <root>/images/<class>/<file>   (or <root>/<class>/<file>)
//   detection        <root>/images/<file> + <root>/annotations/instances.json
//   segmentation     <root>/images/<file> + <root>/annotations/<stem>.<ext>

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::Task;
use crate::constants::{ANNOTATIONS_DIR, COCO_INSTANCES_FILE, IMAGES_DIR, IMAGE_EXTENSIONS};
use crate::data_loader::coco::load_instances;
use crate::data_loader::dataset::{AnnotationRef, DataError, InputRef};

/// Descriptive information carried alongside the contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetMetadata {
    pub name: String,
    pub task: Task,
    /// Class names ordered by id; empty when unknown.
    pub class_names: Vec<String>,
}

impl DatasetMetadata {
    pub fn new(name: impl Into<String>, task: Task) -> Self {
        Self {
            name: name.into(),
            task,
            class_names: Vec::new(),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }
}

/// Ordered `(input, annotation)` entries plus the root they are relative to.
#[derive(Debug, Clone)]
pub struct DataBuilder {
    metadata: DatasetMetadata,
    root: PathBuf,
    contents: Vec<(InputRef, AnnotationRef)>,
}

impl DataBuilder {
    /// Build from explicit contents.
    ///
    /// String labels are mapped to ids through the sorted set of names; the
    /// sorted names become the class names.
    pub fn from_contents(
        metadata: DatasetMetadata,
        root: impl Into<PathBuf>,
        contents: Vec<(InputRef, AnnotationRef)>,
    ) -> Self {
        let mut metadata = metadata;
        let names: BTreeSet<String> = contents
            .iter()
            .filter_map(|(_, a)| match a {
                AnnotationRef::LabelName(name) => Some(name.clone()),
                _ => None,
            })
            .collect();

        let contents = if names.is_empty() {
            contents
        } else {
            let label2id: HashMap<&str, i64> = names
                .iter()
                .enumerate()
                .map(|(i, n)| (n.as_str(), i as i64))
                .collect();
            let mapped = contents
                .into_iter()
                .map(|(input, ann)| match ann {
                    AnnotationRef::LabelName(name) => {
                        let id = label2id[name.as_str()];
                        (input, AnnotationRef::Label(id))
                    }
                    other => (input, other),
                })
                .collect();
            if metadata.class_names.is_empty() {
                metadata.class_names = names.iter().cloned().collect();
            }
            mapped
        };

        Self {
            metadata,
            root: root.into(),
            contents,
        }
    }

    /// Scan `root` according to the layout of `task`.
    pub fn from_layout(root: impl AsRef<Path>, task: Task) -> Result<Self, DataError> {
        match task {
            Task::ImageClassification => Self::classification_folder(root),
            Task::ObjectDetection => Self::coco_detection(root),
            Task::SemanticSegmentation => Self::segmentation_masks(root),
        }
    }

    /// One subfolder per class; class ids follow the sorted folder names.
    pub fn classification_folder(root: impl AsRef<Path>) -> Result<Self, DataError> {
        let root = root.as_ref();
        let prefix = if root.join(IMAGES_DIR).is_dir() {
            PathBuf::from(IMAGES_DIR)
        } else {
            PathBuf::new()
        };

        let mut classes: Vec<String> = read_dir(&root.join(&prefix))?
            .into_iter()
            .filter(|p| p.is_dir())
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_owned))
            .collect();
        classes.sort();

        let mut contents = Vec::new();
        for (id, class) in classes.iter().enumerate() {
            for file in list_images(&root.join(&prefix).join(class))? {
                let rel = prefix.join(class).join(file_name(&file)?);
                contents.push((InputRef::Path(rel), AnnotationRef::Label(id as i64)));
            }
        }

        let mut metadata = DatasetMetadata::new(dataset_name(root), Task::ImageClassification);
        metadata.class_names = classes;
        info!(
            "Found {} images in {} classes under {}",
            contents.len(),
            metadata.num_classes(),
            root.display()
        );
        Ok(Self::from_contents(metadata, root, contents))
    }

    /// Images plus a COCO instances file.
    pub fn coco_detection(root: impl AsRef<Path>) -> Result<Self, DataError> {
        let root = root.as_ref();
        let instances = load_instances(&root.join(ANNOTATIONS_DIR).join(COCO_INSTANCES_FILE))?;

        let contents: Vec<_> = instances
            .entries
            .into_iter()
            .map(|(file, record)| {
                (
                    InputRef::Path(Path::new(IMAGES_DIR).join(file)),
                    AnnotationRef::Coco(record),
                )
            })
            .collect();

        let mut categories = instances.categories;
        categories.sort_by_key(|c| c.id);
        let mut metadata = DatasetMetadata::new(dataset_name(root), Task::ObjectDetection);
        metadata.class_names = categories.into_iter().map(|c| c.name).collect();
        info!(
            "Found {} annotated images with {} categories under {}",
            contents.len(),
            metadata.num_classes(),
            root.display()
        );
        Ok(Self::from_contents(metadata, root, contents))
    }

    /// Images paired with mask files by stem.
    pub fn segmentation_masks(root: impl AsRef<Path>) -> Result<Self, DataError> {
        let root = root.as_ref();
        let masks: HashMap<String, PathBuf> = list_images(&root.join(ANNOTATIONS_DIR))?
            .into_iter()
            .filter_map(|p| stem(&p).map(|s| (s, p)))
            .collect();

        let mut contents = Vec::new();
        for image in list_images(&root.join(IMAGES_DIR))? {
            let Some(mask) = stem(&image).and_then(|s| masks.get(&s)) else {
                warn!("No mask for {}; skipping", image.display());
                continue;
            };
            contents.push((
                InputRef::Path(Path::new(IMAGES_DIR).join(file_name(&image)?)),
                AnnotationRef::MaskPath(Path::new(ANNOTATIONS_DIR).join(file_name(mask)?)),
            ));
        }

        info!("Found {} image/mask pairs under {}", contents.len(), root.display());
        let metadata = DatasetMetadata::new(dataset_name(root), Task::SemanticSegmentation);
        Ok(Self::from_contents(metadata, root, contents))
    }

    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    pub fn get_contents(&self) -> &[(InputRef, AnnotationRef)] {
        &self.contents
    }

    pub fn into_parts(self) -> (DatasetMetadata, PathBuf, Vec<(InputRef, AnnotationRef)>) {
        (self.metadata, self.root, self.contents)
    }
}

fn dataset_name(root: &Path) -> String {
    root.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("dataset")
        .to_owned()
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, DataError> {
    let io_err = |source: std::io::Error| DataError::Io {
        path: dir.to_owned(),
        source,
    };
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        paths.push(entry.map_err(io_err)?.path());
    }
    Ok(paths)
}

/// Image files directly inside `dir`, sorted by name.
fn list_images(dir: &Path) -> Result<Vec<PathBuf>, DataError> {
    let mut files: Vec<PathBuf> = read_dir(dir)?
        .into_iter()
        .filter(|p| p.is_file() && is_image(p))
        .collect();
    files.sort();
    Ok(files)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn stem(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(str::to_owned)
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr, DataError> {
    path.file_name()
        .ok_or_else(|| DataError::Configuration(format!("not a file: {}", path.display())))
}
