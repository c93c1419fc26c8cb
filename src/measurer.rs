//! # Speck Measurer
//!
//! Turns a decoded sheet image and its ROIs into one [`SpeckMeasurement`] per
//! ROI: the ROI's pixel and mm² area, and the pixel and mm² area of the dark
//! speck Otsu finds inside it.
//!
//! Measuring has no side effects. Writing crops or masks is the caller's job
//! (see [`crate::export`]), using [`SpeckMeasurer::measure_detailed`].

use image::{imageops, DynamicImage, ImageDecoder, ImageReader, ImageResult, RgbImage};
use serde::Serialize;
use std::io::{BufRead, Cursor, Seek};
use std::path::Path;
use std::time::Instant;

use crate::config::MeasurementConfig;
use crate::errors::{SpeckError, SpeckResult};
use crate::roi::{PixelRect, Roi};
use crate::segmentation::{segment_speck, SegmentationResult};

/// Measurement of one ROI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeckMeasurement {
    /// Sheet identifier (image file name)
    pub image: String,
    pub label: String,
    /// 1-based position among the sheet's measured ROIs
    pub ordinal: usize,
    /// Clamped rectangle actually measured
    #[serde(skip)]
    pub rect: PixelRect,
    pub roi_px: u64,
    pub roi_mm2: f64,
    pub dark_px: u64,
    pub dark_mm2: f64,
    /// Otsu threshold used for this ROI
    pub threshold: u8,
}

impl SpeckMeasurement {
    /// Unique file stem for crops of this ROI: `<sheet stem>_<label>_<ordinal>`.
    pub fn crop_stem(&self) -> String {
        crop_stem(&self.image, &self.label, self.ordinal)
    }
}

/// `<image stem>_<label>_<ordinal>`, the base name of exported crop files.
///
/// Path separators in the label become `_`, so the stem is always a single
/// file name component.
pub fn crop_stem(image: &str, label: &str, ordinal: usize) -> String {
    let stem = Path::new(image)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(image);
    let label: String = label
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    format!("{}_{}_{}", stem, label, ordinal)
}

/// A measurement together with the pixels it was computed from.
#[derive(Debug, Clone)]
pub struct DetailedMeasurement {
    pub measurement: SpeckMeasurement,
    pub crop: RgbImage,
    pub segmentation: SegmentationResult,
}

/// Rounds `value` to `decimals` decimal places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Decodes an in-memory sheet image into 8-bit RGB, upright per its EXIF
/// orientation.
///
/// # Errors
///
/// Returns `SpeckError::ImageDecode` for an empty buffer, undecodable data, or
/// an image without pixels.
pub fn decode_sheet(bytes: &[u8]) -> SpeckResult<RgbImage> {
    if bytes.is_empty() {
        return Err(SpeckError::ImageDecode("Image buffer is empty".to_string()));
    }
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| SpeckError::ImageDecode(format!("Failed to read image: {}", e)))?;
    let decoded = decode_upright(reader)
        .map_err(|e| SpeckError::ImageDecode(format!("Failed to decode image: {}", e)))?;
    non_empty_rgb(decoded, "in-memory image")
}

/// Opens and decodes a sheet image from disk into 8-bit RGB, upright per its
/// EXIF orientation.
///
/// LabelMe coordinates refer to these upright pixels.
pub fn load_sheet(path: &Path) -> SpeckResult<RgbImage> {
    let reader = ImageReader::open(path)
        .map_err(|e| {
            SpeckError::ImageDecode(format!("Failed to open '{}': {}", path.display(), e))
        })?
        .with_guessed_format()
        .map_err(|e| {
            SpeckError::ImageDecode(format!("Failed to read '{}': {}", path.display(), e))
        })?;
    let decoded = decode_upright(reader).map_err(|e| {
        SpeckError::ImageDecode(format!("Failed to decode '{}': {}", path.display(), e))
    })?;
    non_empty_rgb(decoded, &path.display().to_string())
}

fn decode_upright<R: BufRead + Seek>(reader: ImageReader<R>) -> ImageResult<DynamicImage> {
    let mut decoder = reader.into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut decoded = DynamicImage::from_decoder(decoder)?;
    decoded.apply_orientation(orientation);
    Ok(decoded)
}

fn non_empty_rgb(decoded: DynamicImage, source: &str) -> SpeckResult<RgbImage> {
    let rgb = decoded.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(SpeckError::ImageDecode(format!(
            "Image {} has no pixels",
            source
        )));
    }
    Ok(rgb)
}

/// Configurable speck measurer. Holds no per-call state, so one instance
/// can serve any number of sheets, from any number of threads.
#[derive(Debug, Clone)]
pub struct SpeckMeasurer {
    config: MeasurementConfig,
}

impl SpeckMeasurer {
    /// Creates a measurer after validating `config`.
    pub fn new(config: MeasurementConfig) -> SpeckResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MeasurementConfig {
        &self.config
    }

    /// Segments one crop with the configured pre-filter and cleanup.
    ///
    /// The mask has the crop's dimensions, 255 on speck pixels.
    pub fn segment(&self, crop: &RgbImage) -> SegmentationResult {
        segment_speck(crop, &self.config.pre_filter, self.config.cleanup)
    }

    /// Measures every ROI of a sheet.
    ///
    /// The output has exactly one record per ROI, in input order, including
    /// degenerate and out-of-bounds rectangles (reported with zero areas).
    ///
    /// # Errors
    ///
    /// * `SpeckError::ImageDecode` if `sheet_image` has no pixels
    /// * `SpeckError::Config` if `scale_mm2_per_px2` is not a positive finite number
    pub fn measure(
        &self,
        image_id: &str,
        sheet_image: &RgbImage,
        rois: &[Roi],
        scale_mm2_per_px2: f64,
    ) -> SpeckResult<Vec<SpeckMeasurement>> {
        Ok(self
            .measure_detailed(image_id, sheet_image, rois, scale_mm2_per_px2)?
            .into_iter()
            .map(|d| d.measurement)
            .collect())
    }

    /// Same as [`measure`](Self::measure), also returning each crop and mask.
    pub fn measure_detailed(
        &self,
        image_id: &str,
        sheet_image: &RgbImage,
        rois: &[Roi],
        scale_mm2_per_px2: f64,
    ) -> SpeckResult<Vec<DetailedMeasurement>> {
        if sheet_image.width() == 0 || sheet_image.height() == 0 {
            return Err(SpeckError::ImageDecode(format!(
                "Sheet image '{}' has no pixels",
                image_id
            )));
        }
        if !scale_mm2_per_px2.is_finite() || scale_mm2_per_px2 <= 0.0 {
            return Err(SpeckError::Config(format!(
                "Scale factor must be a positive number, got {}",
                scale_mm2_per_px2
            )));
        }

        let start_time = Instant::now();
        let results: Vec<DetailedMeasurement> = rois
            .iter()
            .enumerate()
            .map(|(index, roi)| {
                self.measure_roi(image_id, sheet_image, roi, index + 1, scale_mm2_per_px2)
            })
            .collect();

        tracing::debug!(
            image = %image_id,
            rois = results.len(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Measured sheet ROIs"
        );

        Ok(results)
    }

    fn measure_roi(
        &self,
        image_id: &str,
        sheet_image: &RgbImage,
        roi: &Roi,
        ordinal: usize,
        scale: f64,
    ) -> DetailedMeasurement {
        let rect = roi.clamp_to(sheet_image.width(), sheet_image.height());

        let crop = if rect.is_empty() {
            RgbImage::new(rect.width(), rect.height())
        } else {
            imageops::crop_imm(sheet_image, rect.x1, rect.y1, rect.width(), rect.height())
                .to_image()
        };

        let segmentation = if rect.is_empty() {
            SegmentationResult::empty(rect.width(), rect.height())
        } else {
            self.segment(&crop)
        };

        let roi_px = rect.area();
        let dark_px = segmentation.speck_pixels;
        let decimals = self.config.decimals;

        DetailedMeasurement {
            measurement: SpeckMeasurement {
                image: image_id.to_string(),
                label: roi.label.clone(),
                ordinal,
                rect,
                roi_px,
                roi_mm2: round_to(roi_px as f64 * scale, decimals),
                dark_px,
                dark_mm2: round_to(dark_px as f64 * scale, decimals),
                threshold: segmentation.threshold,
            },
            crop,
            segmentation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::CleanupMode;
    use image::Rgb;

    fn sheet_with_speck() -> RgbImage {
        let mut img = RgbImage::from_pixel(100, 80, Rgb([230, 225, 215]));
        for y in 30..40 {
            for x in 20..32 {
                img.put_pixel(x, y, Rgb([40, 35, 30]));
            }
        }
        img
    }

    fn measurer() -> SpeckMeasurer {
        SpeckMeasurer::new(MeasurementConfig::default()).unwrap()
    }

    #[test]
    fn test_measures_speck_inside_roi() {
        let rois = vec![Roi::new("S1", (10.0, 20.0), (50.0, 60.0))];
        let records = measurer()
            .measure("sheet.png", &sheet_with_speck(), &rois, 0.01)
            .unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.roi_px, 40 * 40);
        assert_eq!(record.dark_px, 120);
        assert_eq!(record.roi_mm2, 16.0);
        assert_eq!(record.dark_mm2, 1.2);
        assert_eq!(record.ordinal, 1);
        assert_eq!(record.crop_stem(), "sheet_S1_1");
    }

    #[test]
    fn test_one_record_per_roi_even_when_degenerate() {
        let rois = vec![
            Roi::new("S0", (0.0, 0.0), (0.0, 0.0)),
            Roi::new("S1", (500.0, 500.0), (600.0, 600.0)),
            Roi::new("S2", (10.0, 20.0), (50.0, 60.0)),
        ];
        let records = measurer()
            .measure("sheet.png", &sheet_with_speck(), &rois, 0.01)
            .unwrap();

        assert_eq!(records.len(), 3);
        for record in &records[..2] {
            assert_eq!(record.roi_px, 0);
            assert_eq!(record.dark_px, 0);
            assert_eq!(record.roi_mm2, 0.0);
            assert_eq!(record.dark_mm2, 0.0);
        }
        assert_eq!(records[2].ordinal, 3);
    }

    #[test]
    fn test_empty_roi_list() {
        let records = measurer()
            .measure("sheet.png", &sheet_with_speck(), &[], 0.01)
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_rejects_empty_sheet() {
        let result = measurer().measure("empty.png", &RgbImage::new(0, 0), &[], 0.01);
        assert!(matches!(result, Err(SpeckError::ImageDecode(_))));
    }

    #[test]
    fn test_rejects_bad_scale() {
        let result = measurer().measure("sheet.png", &sheet_with_speck(), &[], 0.0);
        assert!(matches!(result, Err(SpeckError::Config(_))));

        let result = measurer().measure("sheet.png", &sheet_with_speck(), &[], f64::INFINITY);
        assert!(matches!(result, Err(SpeckError::Config(_))));
    }

    #[test]
    fn test_morphological_mode() {
        let mut img = sheet_with_speck();
        img.put_pixel(45, 55, Rgb([40, 35, 30]));

        let config = MeasurementConfig {
            cleanup: CleanupMode::Morphological,
            ..Default::default()
        };
        let rois = vec![Roi::new("S1", (10.0, 20.0), (50.0, 60.0))];
        let records = SpeckMeasurer::new(config)
            .unwrap()
            .measure("sheet.png", &img, &rois, 0.01)
            .unwrap();

        assert_eq!(records[0].dark_px, 120);
    }

    #[test]
    fn test_detailed_returns_crop_and_mask() {
        let rois = vec![Roi::new("p4", (10.0, 20.0), (50.0, 60.0))];
        let detailed = measurer()
            .measure_detailed("sheet.png", &sheet_with_speck(), &rois, 0.01)
            .unwrap();

        assert_eq!(detailed[0].crop.dimensions(), (40, 40));
        assert_eq!(detailed[0].segmentation.mask.dimensions(), (40, 40));
    }

    #[test]
    fn test_segment_matches_measured_mask() {
        let rois = vec![Roi::new("S1", (10.0, 20.0), (50.0, 60.0))];
        let measurer = measurer();
        let detailed = measurer
            .measure_detailed("sheet.png", &sheet_with_speck(), &rois, 0.01)
            .unwrap();

        let segmentation = measurer.segment(&detailed[0].crop);
        assert_eq!(segmentation, detailed[0].segmentation);
        assert_eq!(segmentation.speck_pixels, 120);
    }

    #[test]
    fn test_crop_stem_is_one_path_component() {
        assert_eq!(crop_stem("dir/sheet.jpg", "S1", 2), "sheet_S1_2");
        assert_eq!(crop_stem("sheet.jpg", "../../etc/S1", 1), "sheet_.._.._etc_S1_1");
        assert_eq!(crop_stem("sheet.jpg", "p\\..\\x", 3), "sheet_p_.._x_3");

        let stem = crop_stem("sheet.jpg", "S/../../x", 4);
        let joined = Path::new("crops").join(format!("{}.png", stem));
        assert_eq!(joined.parent(), Some(Path::new("crops")));
    }

    #[test]
    fn test_decode_sheet_rejects_empty_and_garbage() {
        assert!(matches!(decode_sheet(&[]), Err(SpeckError::ImageDecode(_))));
        assert!(matches!(
            decode_sheet(b"definitely not an image"),
            Err(SpeckError::ImageDecode(_))
        ));
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.2500000001, 2), 0.25);
        assert_eq!(round_to(1.005, 1), 1.0);
        assert_eq!(round_to(12.3456, 3), 12.346);
    }
}
