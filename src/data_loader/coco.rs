// src/data_loader/coco.rs
//
// COCO-style object detection annotations: the per-image record carried by
// detection samples, and the reader for `annotations/instances.json`.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::data_loader::dataset::DataError;

/// All boxes of one image, in COCO `[x_min, y_min, width, height]` form.
///
/// The per-box vectors are parallel: entry `i` of each describes box `i`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CocoAnnotation {
    pub image_id: i64,
    pub bboxes: Vec<[f32; 4]>,
    pub category_ids: Vec<i64>,
    pub areas: Vec<f32>,
    pub iscrowd: Vec<u8>,
    /// Polygon outlines (`x0, y0, x1, y1, ...`); empty when not provided.
    #[serde(default)]
    pub segmentation: Vec<Vec<f32>>,
}

impl CocoAnnotation {
    /// Build a record from boxes and categories, deriving areas from box sizes.
    pub fn from_boxes(image_id: i64, bboxes: Vec<[f32; 4]>, category_ids: Vec<i64>) -> Self {
        let areas = bboxes.iter().map(|b| b[2] * b[3]).collect();
        let iscrowd = vec![0; bboxes.len()];
        Self {
            image_id,
            bboxes,
            category_ids,
            areas,
            iscrowd,
            segmentation: Vec::new(),
        }
    }

    /// Number of boxes.
    pub fn len(&self) -> usize {
        self.bboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bboxes.is_empty()
    }

    /// Boxes as an `(n, 4)` array.
    pub fn bbox_array(&self) -> Array2<f32> {
        let flat: Vec<f32> = self.bboxes.iter().flatten().copied().collect();
        Array2::from_shape_vec((self.bboxes.len(), 4), flat)
            .unwrap_or_else(|_| Array2::zeros((0, 4)))
    }

    pub fn category_array(&self) -> Array1<i64> {
        Array1::from_vec(self.category_ids.clone())
    }

    /// Rescale boxes, areas and polygons by `sx` horizontally and `sy` vertically.
    pub fn scale(&mut self, sx: f32, sy: f32) {
        for b in &mut self.bboxes {
            b[0] *= sx;
            b[1] *= sy;
            b[2] *= sx;
            b[3] *= sy;
        }
        for a in &mut self.areas {
            *a *= sx * sy;
        }
        for poly in &mut self.segmentation {
            for (i, v) in poly.iter_mut().enumerate() {
                *v *= if i % 2 == 0 { sx } else { sy };
            }
        }
    }

    /// Mirror boxes and polygons across the vertical axis of an image `width` wide.
    pub fn flip_horizontal(&mut self, width: f32) {
        for b in &mut self.bboxes {
            b[0] = width - b[0] - b[2];
        }
        for poly in &mut self.segmentation {
            for v in poly.iter_mut().step_by(2) {
                *v = width - *v;
            }
        }
    }
}

/// A category entry of a COCO file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CocoCategory {
    pub id: i64,
    pub name: String,
}

#[derive(Deserialize)]
struct CocoFile {
    images: Vec<CocoImage>,
    #[serde(default)]
    annotations: Vec<CocoObject>,
    #[serde(default)]
    categories: Vec<CocoCategory>,
}

#[derive(Deserialize)]
struct CocoImage {
    id: i64,
    file_name: String,
}

#[derive(Deserialize)]
struct CocoObject {
    image_id: i64,
    category_id: i64,
    bbox: [f32; 4],
    #[serde(default)]
    area: Option<f32>,
    #[serde(default)]
    iscrowd: u8,
    #[serde(default)]
    segmentation: serde_json::Value,
}

/// Contents of a COCO instances file, grouped per image in file order.
#[derive(Debug, Clone)]
pub struct CocoInstances {
    pub entries: Vec<(String, CocoAnnotation)>,
    pub categories: Vec<CocoCategory>,
}

/// Read and group a COCO `instances.json` file.
pub fn load_instances(path: &Path) -> Result<CocoInstances, DataError> {
    let bytes = std::fs::read(path).map_err(|source| DataError::Io {
        path: path.to_owned(),
        source,
    })?;
    let file: CocoFile = serde_json::from_slice(&bytes).map_err(|source| DataError::Annotation {
        path: path.to_owned(),
        source,
    })?;
    Ok(group_by_image(file))
}

fn group_by_image(file: CocoFile) -> CocoInstances {
    let mut records: HashMap<i64, CocoAnnotation> = file
        .images
        .iter()
        .map(|img| {
            (
                img.id,
                CocoAnnotation {
                    image_id: img.id,
                    ..Default::default()
                },
            )
        })
        .collect();

    for obj in file.annotations {
        let Some(record) = records.get_mut(&obj.image_id) else {
            tracing::debug!("Skipping annotation for unknown image id {}", obj.image_id);
            continue;
        };
        record.bboxes.push(obj.bbox);
        record.category_ids.push(obj.category_id);
        record.areas.push(obj.area.unwrap_or(obj.bbox[2] * obj.bbox[3]));
        record.iscrowd.push(obj.iscrowd);
        record.segmentation.extend(polygons(&obj.segmentation));
    }

    let entries = file
        .images
        .into_iter()
        .filter_map(|img| records.remove(&img.id).map(|r| (img.file_name, r)))
        .collect();

    CocoInstances {
        entries,
        categories: file.categories,
    }
}

// Only polygon segmentations are kept; RLE objects are dropped.
fn polygons(value: &serde_json::Value) -> Vec<Vec<f32>> {
    let Some(list) = value.as_array() else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|poly| {
            poly.as_array().map(|coords| {
                coords
                    .iter()
                    .filter_map(|c| c.as_f64().map(|v| v as f32))
                    .collect()
            })
        })
        .collect()
}
