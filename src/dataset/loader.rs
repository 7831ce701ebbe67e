//! Raw file enumeration and image decoding.
//!
//! Training images live in one sub-directory per class, named by the integer
//! class id (`train/17/leaf_001.jpg`). Test images are a flat, unlabelled set.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::ImageReader;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::utils::error::{CropError, Result};

/// Extensions treated as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// One labelled or unlabelled record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub path: PathBuf,
    /// Present for train/validation, absent for test
    pub label: Option<usize>,
}

impl Sample {
    pub fn labelled(path: impl Into<PathBuf>, label: usize) -> Self {
        Self {
            path: path.into(),
            label: Some(label),
        }
    }

    pub fn unlabelled(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            label: None,
        }
    }

    /// File name used as the identifier in the submission report
    pub fn identifier(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn image_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(CropError::Dataset(format!(
            "Image directory not found: {}",
            root.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(|e| CropError::Dataset(format!("Failed to walk {}: {e}", root.display())))?;
        if entry.file_type().is_file() && is_image(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Enumerate labelled training images under `root`
///
/// Files whose parent directory is not an integer are skipped with a warning;
/// a class id outside `0..num_classes` is an error.
pub fn list_train_samples(root: &Path, num_classes: usize) -> Result<Vec<Sample>> {
    let mut samples = Vec::new();
    let mut skipped = 0usize;

    for path in image_files(root)? {
        let class_dir = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let label = match class_dir.parse::<usize>() {
            Ok(label) => label,
            Err(_) => {
                skipped += 1;
                debug!("Skipping {} (directory '{}' is not a class id)", path.display(), class_dir);
                continue;
            }
        };

        if label >= num_classes {
            return Err(CropError::Dataset(format!(
                "Label {} of {} is outside 0..{}",
                label,
                path.display(),
                num_classes
            )));
        }
        samples.push(Sample::labelled(path, label));
    }

    if skipped > 0 {
        warn!("Skipped {} images outside integer class directories", skipped);
    }
    info!("Found {} training images in {}", samples.len(), root.display());
    Ok(samples)
}

/// Enumerate unlabelled test images under `root`, sorted by path
pub fn list_test_samples(root: &Path) -> Result<Vec<Sample>> {
    let samples: Vec<Sample> = image_files(root)?
        .into_iter()
        .map(Sample::unlabelled)
        .collect();
    info!("Found {} test images in {}", samples.len(), root.display());
    Ok(samples)
}

/// Decode, resize and convert an image to CHW floats in [0, 1]
pub fn load_image_chw(path: &Path, image_size: usize) -> Result<Vec<f32>> {
    let img = ImageReader::open(path)
        .map_err(|e| CropError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| CropError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .resize_exact(image_size as u32, image_size as u32, FilterType::Triangle)
        .to_rgb8();

    let plane = image_size * image_size;
    let mut chw = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = y as usize * image_size + x as usize;
        chw[offset] = pixel[0] as f32 / 255.0;
        chw[plane + offset] = pixel[1] as f32 / 255.0;
        chw[2 * plane + offset] = pixel[2] as f32 / 255.0;
    }

    Ok(chw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_png(path: &Path, color: [u8; 3]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(4, 4, Rgb(color)).save(path).unwrap();
    }

    #[test]
    fn test_identifier_is_basename() {
        let sample = Sample::unlabelled("/data/test/abc.jpg");
        assert_eq!(sample.identifier(), "abc.jpg");
    }

    #[test]
    fn test_list_train_samples_reads_labels_from_dirs() {
        let dir = TempDir::new().unwrap();
        write_png(&dir.path().join("0/a.png"), [255, 0, 0]);
        write_png(&dir.path().join("3/b.PNG"), [0, 255, 0]);
        write_png(&dir.path().join("notes/c.png"), [0, 0, 255]);
        std::fs::write(dir.path().join("3/readme.txt"), "x").unwrap();

        let samples = list_train_samples(dir.path(), 5).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].label, Some(0));
        assert_eq!(samples[1].label, Some(3));
        assert_eq!(samples[1].identifier(), "b.PNG");
    }

    #[test]
    fn test_out_of_range_label_is_error() {
        let dir = TempDir::new().unwrap();
        write_png(&dir.path().join("7/a.png"), [1, 2, 3]);
        let err = list_train_samples(dir.path(), 5).unwrap_err();
        assert!(matches!(err, CropError::Dataset(_)));
    }

    #[test]
    fn test_list_test_samples_sorted_and_unlabelled() {
        let dir = TempDir::new().unwrap();
        write_png(&dir.path().join("b.png"), [0, 0, 0]);
        write_png(&dir.path().join("a.png"), [0, 0, 0]);

        let samples = list_test_samples(dir.path()).unwrap();
        let ids: Vec<String> = samples.iter().map(Sample::identifier).collect();
        assert_eq!(ids, vec!["a.png", "b.png"]);
        assert!(samples.iter().all(|s| s.label.is_none()));
    }

    #[test]
    fn test_missing_directory_is_error() {
        assert!(list_test_samples(Path::new("/nonexistent/images")).is_err());
    }

    #[test]
    fn test_load_image_chw_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("red.png");
        write_png(&path, [255, 0, 51]);

        let chw = load_image_chw(&path, 2).unwrap();
        assert_eq!(chw.len(), 12);
        assert!(chw[..4].iter().all(|&v| (v - 1.0).abs() < 1e-6));
        assert!(chw[4..8].iter().all(|&v| v.abs() < 1e-6));
        assert!(chw[8..].iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_load_image_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(matches!(load_image_chw(&path, 2), Err(CropError::ImageLoad(_, _))));
    }
}
