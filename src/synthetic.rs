//! # Synthetic Training Images
//!
//! Builds detector training data by blending speck crops onto a clean base
//! sheet at random positions and recording each placement as a COCO
//! annotation. Placements landing on mostly black background are re-drawn.

use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::discovery::{file_name, list_files, SHEET_EXTENSIONS};
use crate::errors::{SpeckError, SpeckResult};
use crate::measurer::load_sheet;

/// Folder under the dataset root holding generated images
pub const IMAGE_DIR: &str = "images";

/// Dataset-relative name of the `index`-th composite, as recorded in COCO
pub fn composite_name(index: usize) -> String {
    format!("{}/blended_0{}.jpg", IMAGE_DIR, index)
}

/// COCO image entry; unknown fields are kept as they are
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoImage {
    pub id: u64,
    pub file_name: String,
    pub height: u32,
    pub width: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// COCO annotation entry; unknown fields are kept as they are
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoAnnotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    /// `[x, y, width, height]`
    pub bbox: Vec<f64>,
    pub area: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// COCO document with images and annotations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CocoDataset {
    #[serde(default)]
    pub images: Vec<CocoImage>,
    #[serde(default)]
    pub annotations: Vec<CocoAnnotation>,
    /// Categories, info, licenses and anything else
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CocoDataset {
    pub fn from_path(path: &Path) -> SpeckResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            SpeckError::FileSystem(format!("Failed to read COCO file '{}': {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            SpeckError::AnnotationParse(format!("Invalid COCO file '{}': {}", path.display(), e))
        })
    }

    pub fn save(&self, path: &Path) -> SpeckResult<()> {
        let text = serde_json::to_string(self)?;
        fs::write(path, text).map_err(|e| {
            SpeckError::FileSystem(format!("Failed to write COCO file '{}': {}", path.display(), e))
        })
    }

    pub fn next_image_id(&self) -> u64 {
        self.images.iter().map(|i| i.id).max().map_or(1, |id| id + 1)
    }

    pub fn next_annotation_id(&self) -> u64 {
        self.annotations.iter().map(|a| a.id).max().map_or(1, |id| id + 1)
    }
}

/// Knobs of the compositing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Number of images to generate
    pub images: usize,
    /// Range of crops pasted per image, inclusive
    pub min_crops: usize,
    pub max_crops: usize,
    /// Weight of the base pixels in the blend; the crop gets the rest
    pub base_weight: f32,
    /// Channel level at or below which a pixel counts as black
    pub black_level: u8,
    /// Share of black pixels above which a region is rejected
    pub black_ratio: f64,
    /// Random positions tried per crop before giving up on it
    pub max_attempts: usize,
    /// Category assigned to every pasted crop
    pub category_id: u64,
    /// Fixed seed for reproducible output
    pub seed: Option<u64>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            images: 750,
            min_crops: 7,
            max_crops: 150,
            base_weight: 0.6,
            black_level: 15,
            black_ratio: 0.7,
            max_attempts: 100,
            category_id: 0,
            seed: None,
        }
    }
}

impl SynthesisConfig {
    pub fn validate(&self) -> SpeckResult<()> {
        if self.min_crops > self.max_crops {
            return Err(SpeckError::Config(format!(
                "min_crops ({}) cannot exceed max_crops ({})",
                self.min_crops, self.max_crops
            )));
        }
        if !(0.0..=1.0).contains(&self.base_weight) {
            return Err(SpeckError::Config(format!(
                "Base weight must be in [0, 1], got {}",
                self.base_weight
            )));
        }
        if !(0.0..=1.0).contains(&self.black_ratio) {
            return Err(SpeckError::Config(format!(
                "Black ratio must be in [0, 1], got {}",
                self.black_ratio
            )));
        }
        if self.max_attempts == 0 {
            return Err(SpeckError::Config("max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// True when more than `ratio` of the region's pixels have every channel at
/// or below `level`.
pub fn is_mostly_black(
    image: &RgbImage,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    level: u8,
    ratio: f64,
) -> bool {
    let total = width as u64 * height as u64;
    if total == 0 {
        return false;
    }
    let mut black = 0u64;
    for py in y..y + height {
        for px in x..x + width {
            if image.get_pixel(px, py).0.iter().all(|&c| c <= level) {
                black += 1;
            }
        }
    }
    black as f64 / total as f64 > ratio
}

/// Blends `crop` into `base` at `(x, y)`: `base * base_weight + crop * (1 - base_weight)`.
///
/// The crop must fit inside `base`.
pub fn blend_crop(base: &mut RgbImage, crop: &RgbImage, x: u32, y: u32, base_weight: f32) {
    let crop_weight = 1.0 - base_weight;
    for (cx, cy, crop_pixel) in crop.enumerate_pixels() {
        let target = base.get_pixel_mut(x + cx, y + cy);
        let mut out = [0u8; 3];
        for (c, value) in out.iter_mut().enumerate() {
            let mixed = target[c] as f32 * base_weight + crop_pixel[c] as f32 * crop_weight;
            *value = mixed.round().clamp(0.0, 255.0) as u8;
        }
        *target = Rgb(out);
    }
}

/// Loads every crop image in `dir`, sorted by name; unreadable files are skipped.
pub fn load_crops(dir: &Path) -> SpeckResult<Vec<(String, RgbImage)>> {
    let mut crops = Vec::new();
    for path in list_files(dir, SHEET_EXTENSIONS)? {
        match load_sheet(&path) {
            Ok(crop) => crops.push((file_name(&path), crop)),
            Err(e) => warn!(crop = %path.display(), error = %e, "Crop skipped"),
        }
    }
    Ok(crops)
}

/// Composites synthetic sheets and keeps the COCO id counters
pub struct Synthesizer {
    config: SynthesisConfig,
    rng: StdRng,
}

impl Synthesizer {
    pub fn new(config: SynthesisConfig) -> SpeckResult<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self { config, rng })
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Produces one composite of `base` and registers it in `dataset` as
    /// `file_name`, with one annotation per pasted crop.
    pub fn compose(
        &mut self,
        base: &RgbImage,
        crops: &[RgbImage],
        dataset: &mut CocoDataset,
        file_name: &str,
    ) -> RgbImage {
        let mut canvas = base.clone();
        let (base_w, base_h) = base.dimensions();
        let image_id = dataset.next_image_id();
        let mut annotation_id = dataset.next_annotation_id();

        dataset.images.push(CocoImage {
            id: image_id,
            file_name: file_name.to_string(),
            height: base_h,
            width: base_w,
            extra: Map::new(),
        });

        let mut order: Vec<usize> = (0..crops.len()).collect();
        order.shuffle(&mut self.rng);
        let count = self
            .rng
            .random_range(self.config.min_crops..=self.config.max_crops)
            .min(crops.len());

        let mut pasted = 0;
        for &index in order.iter().take(count) {
            let crop = &crops[index];
            let (cw, ch) = crop.dimensions();
            if cw == 0 || ch == 0 || cw >= base_w || ch >= base_h {
                debug!(crop = index, width = cw, height = ch, "Crop does not fit base image");
                continue;
            }

            let Some((x, y)) = self.find_position(base, cw, ch) else {
                debug!(crop = index, "No non-black position found for crop");
                continue;
            };

            blend_crop(&mut canvas, crop, x, y, self.config.base_weight);
            dataset.annotations.push(CocoAnnotation {
                id: annotation_id,
                image_id,
                category_id: self.config.category_id,
                bbox: vec![x as f64, y as f64, cw as f64, ch as f64],
                area: cw as f64 * ch as f64,
                extra: Map::new(),
            });
            annotation_id += 1;
            pasted += 1;
        }

        debug!(image = %file_name, image_id, pasted, "Composite generated");
        canvas
    }

    /// Composes the `index`-th image, saves it under `dataset_root` and
    /// registers it in `dataset` by its path relative to that root.
    pub fn write_composite(
        &mut self,
        base: &RgbImage,
        crops: &[RgbImage],
        dataset: &mut CocoDataset,
        dataset_root: &Path,
        index: usize,
    ) -> SpeckResult<PathBuf> {
        let name = composite_name(index);
        let path = dataset_root.join(&name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SpeckError::FileSystem(format!("Failed to create '{}': {}", parent.display(), e))
            })?;
        }

        let composite = self.compose(base, crops, dataset, &name);
        composite.save(&path).map_err(|e| {
            SpeckError::FileSystem(format!("Failed to save '{}': {}", path.display(), e))
        })?;
        Ok(path)
    }

    fn find_position(&mut self, base: &RgbImage, cw: u32, ch: u32) -> Option<(u32, u32)> {
        let max_x = base.width() - cw;
        let max_y = base.height() - ch;
        for _ in 0..self.config.max_attempts {
            let x = self.rng.random_range(0..=max_x);
            let y = self.rng.random_range(0..=max_y);
            if !is_mostly_black(
                base,
                x,
                y,
                cw,
                ch,
                self.config.black_level,
                self.config.black_ratio,
            ) {
                return Some((x, y));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half_black_base() -> RgbImage {
        let mut base = RgbImage::from_pixel(60, 40, Rgb([200, 190, 180]));
        for y in 0..40 {
            for x in 0..30 {
                base.put_pixel(x, y, Rgb([5, 5, 5]));
            }
        }
        base
    }

    fn seeded(min: usize, max: usize) -> Synthesizer {
        Synthesizer::new(SynthesisConfig {
            min_crops: min,
            max_crops: max,
            seed: Some(7),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_is_mostly_black() {
        let base = half_black_base();
        assert!(is_mostly_black(&base, 0, 0, 10, 10, 15, 0.7));
        assert!(!is_mostly_black(&base, 35, 0, 10, 10, 15, 0.7));
        // 20 of 30 columns black is below the 70% limit
        assert!(!is_mostly_black(&base, 10, 0, 30, 10, 15, 0.7));
    }

    #[test]
    fn test_blend_weights() {
        let mut base = RgbImage::from_pixel(4, 4, Rgb([100, 100, 100]));
        let crop = RgbImage::from_pixel(2, 2, Rgb([200, 0, 50]));

        blend_crop(&mut base, &crop, 1, 1, 0.6);

        assert_eq!(base.get_pixel(1, 1), &Rgb([140, 60, 80]));
        assert_eq!(base.get_pixel(0, 0), &Rgb([100, 100, 100]));
    }

    #[test]
    fn test_compose_records_annotations() {
        let base = half_black_base();
        let crops = vec![RgbImage::from_pixel(5, 4, Rgb([30, 30, 30])); 3];
        let mut dataset = CocoDataset {
            images: vec![CocoImage {
                id: 41,
                file_name: "images/real.jpg".to_string(),
                height: 40,
                width: 60,
                extra: Map::new(),
            }],
            ..Default::default()
        };

        let composite = seeded(3, 3).compose(&base, &crops, &mut dataset, "images/blended_00.jpg");

        assert_eq!(composite.dimensions(), base.dimensions());
        assert_eq!(dataset.images.len(), 2);
        assert_eq!(dataset.images[1].id, 42);
        assert_eq!(dataset.annotations.len(), 3);
        let ids: Vec<u64> = dataset.annotations.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        for annotation in &dataset.annotations {
            assert_eq!(annotation.image_id, 42);
            assert_eq!(annotation.category_id, 0);
            assert_eq!(annotation.area, 20.0);
            assert_eq!(&annotation.bbox[2..], &[5.0, 4.0]);
            // Never placed on the black half
            let x = annotation.bbox[0] as u32;
            assert!(!is_mostly_black(&base, x, annotation.bbox[1] as u32, 5, 4, 15, 0.7));
        }
    }

    #[test]
    fn test_oversized_crops_are_skipped() {
        let base = RgbImage::from_pixel(10, 10, Rgb([200, 200, 200]));
        let crops = vec![RgbImage::new(10, 3), RgbImage::new(3, 12)];
        let mut dataset = CocoDataset::default();

        seeded(2, 2).compose(&base, &crops, &mut dataset, "images/x.jpg");

        assert_eq!(dataset.images.len(), 1);
        assert!(dataset.annotations.is_empty());
    }

    #[test]
    fn test_same_seed_same_output() {
        let base = half_black_base();
        let crops = vec![RgbImage::from_pixel(4, 4, Rgb([0, 0, 90])); 5];

        let mut first = CocoDataset::default();
        let mut second = CocoDataset::default();
        let a = seeded(1, 5).compose(&base, &crops, &mut first, "a.jpg");
        let b = seeded(1, 5).compose(&base, &crops, &mut second, "a.jpg");

        assert_eq!(a, b);
        assert_eq!(first, second);
    }

    #[test]
    fn test_written_composites_resolve_from_dataset_root() {
        let root = tempfile::TempDir::new().unwrap();
        let base = half_black_base();
        let crops = vec![RgbImage::from_pixel(5, 4, Rgb([30, 30, 30])); 2];
        let mut dataset = CocoDataset::default();
        let mut synthesizer = seeded(1, 2);

        let first = synthesizer
            .write_composite(&base, &crops, &mut dataset, root.path(), 0)
            .unwrap();
        synthesizer
            .write_composite(&base, &crops, &mut dataset, root.path(), 1)
            .unwrap();

        assert_eq!(first, root.path().join("images").join("blended_00.jpg"));
        let names: Vec<&str> = dataset.images.iter().map(|i| i.file_name.as_str()).collect();
        assert_eq!(names, vec!["images/blended_00.jpg", "images/blended_01.jpg"]);
        for entry in &dataset.images {
            assert!(root.path().join(&entry.file_name).is_file());
        }
    }

    #[test]
    fn test_coco_round_trip_keeps_unknown_fields() {
        let text = r#"{"images":[],"annotations":[],"categories":[{"id":0,"name":"speck"}]}"#;
        let dataset: CocoDataset = serde_json::from_str(text).unwrap();

        assert!(dataset.extra.contains_key("categories"));
        assert_eq!(dataset.next_image_id(), 1);
        let back = serde_json::to_string(&dataset).unwrap();
        assert!(back.contains("\"categories\""));
    }

    #[test]
    fn test_config_validation() {
        let config = SynthesisConfig {
            min_crops: 10,
            max_crops: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(SynthesisConfig::default().validate().is_ok());
    }
}
