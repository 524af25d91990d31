// tests/common/mod.rs
//
// Common test utilities: small on-disk datasets in the canonical layouts,
// written into temporary directories.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use agloader::{BackendSelection, LoaderOptions};
use image::{GrayImage, Luma, Rgb, RgbImage};
use tempfile::TempDir;

/// Options with a private backend selection so tests don't share the pin.
pub fn isolated_options() -> LoaderOptions {
    LoaderOptions::default()
        .shuffle(false, None)
        .with_backend_selection(Arc::new(BackendSelection::new()))
}

/// Write a solid-colour RGB PNG.
pub fn write_png(path: &Path, width: u32, height: u32, value: u8) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    RgbImage::from_pixel(width, height, Rgb([value, value, value]))
        .save(path)
        .unwrap();
}

/// Write a mask whose left half is `0` and right half is `label`.
pub fn write_mask(path: &Path, width: u32, height: u32, label: u8) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    GrayImage::from_fn(width, height, |x, _| Luma([if x < width / 2 { 0 } else { label }]))
        .save(path)
        .unwrap();
}

/// `images/<class>/<n>.png` for each `(class, count)`.
pub fn classification_dataset(classes: &[(&str, usize)], size: u32) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (c, (class, count)) in classes.iter().enumerate() {
        for n in 0..*count {
            let path = dir.path().join("images").join(class).join(format!("{n}.png"));
            write_png(&path, size, size, (c * 40 + n) as u8);
        }
    }
    dir
}

/// `images/img<i>.png` plus `annotations/instances.json` with `boxes[i]`
/// boxes on image `i`.
pub fn detection_dataset(boxes: &[usize], width: u32, height: u32) -> TempDir {
    let dir = TempDir::new().unwrap();
    let mut images = Vec::new();
    let mut annotations = Vec::new();
    let mut next_id = 1;
    for (i, &count) in boxes.iter().enumerate() {
        let file = format!("img{i}.png");
        write_png(&dir.path().join("images").join(&file), width, height, 120);
        images.push(serde_json::json!({ "id": i + 1, "file_name": file, "width": width, "height": height }));
        for b in 0..count {
            annotations.push(serde_json::json!({
                "id": next_id,
                "image_id": i + 1,
                "category_id": (b % 2) + 1,
                "bbox": [b as f32 * 2.0, 1.0, 4.0, 3.0],
                "iscrowd": 0,
                "segmentation": [[0.0, 0.0, 4.0, 0.0, 4.0, 3.0]]
            }));
            next_id += 1;
        }
    }
    let coco = serde_json::json!({
        "images": images,
        "annotations": annotations,
        "categories": [ { "id": 2, "name": "leaf" }, { "id": 1, "name": "fruit" } ]
    });
    let ann_dir = dir.path().join("annotations");
    fs::create_dir_all(&ann_dir).unwrap();
    fs::write(ann_dir.join("instances.json"), serde_json::to_vec(&coco).unwrap()).unwrap();
    dir
}

/// `images/<n>.png` with matching `annotations/<n>.png` masks.
pub fn segmentation_dataset(count: usize, width: u32, height: u32) -> TempDir {
    let dir = TempDir::new().unwrap();
    for n in 0..count {
        write_png(&dir.path().join("images").join(format!("{n}.png")), width, height, 60);
        write_mask(&dir.path().join("annotations").join(format!("{n}.png")), width, height, (n + 1) as u8);
    }
    dir
}
