//! # Measurement Tests
//!
//! End-to-end checks of the speck measurer through the public API, on
//! synthetic sheets whose speck areas are known in advance.

use image::{Rgb, RgbImage};
use speck_meter::measurer::{decode_sheet, load_sheet};
use speck_meter::segmentation::{CleanupMode, PreFilter};
use speck_meter::sheet::circle_area;
use speck_meter::{MeasurementConfig, PixelAreaConvention, Roi, Sheet, SpeckError, SpeckMeasurer};
use std::io::Cursor;
use tempfile::TempDir;

const PAPER: Rgb<u8> = Rgb([232, 226, 214]);
const SPECK: Rgb<u8> = Rgb([30, 24, 20]);

fn sheet_with_square(width: u32, height: u32, x: u32, y: u32, side: u32) -> RgbImage {
    let mut img = RgbImage::from_pixel(width, height, PAPER);
    for py in y..y + side {
        for px in x..x + side {
            img.put_pixel(px, py, SPECK);
        }
    }
    img
}

fn measurer() -> SpeckMeasurer {
    SpeckMeasurer::new(MeasurementConfig::default()).unwrap()
}

/// Encodes `img` as JPEG with an APP1 segment carrying the EXIF `orientation` tag
fn jpeg_with_orientation(img: &RgbImage, orientation: u8) -> Vec<u8> {
    let mut jpeg = Vec::new();
    img.write_to(&mut Cursor::new(&mut jpeg), image::ImageFormat::Jpeg).unwrap();

    // Big-endian TIFF header, one IFD entry: tag 0x0112, SHORT, count 1
    let mut app1 = vec![0xFF, 0xE1, 0x00, 0x22];
    app1.extend_from_slice(b"Exif\0\0MM\0\x2a\0\0\0\x08");
    app1.extend_from_slice(&[0x00, 0x01, 0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
    app1.extend_from_slice(&[0x00, orientation, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(app1.len(), 0x22 + 2);

    jpeg.splice(2..2, app1);
    jpeg
}

/// Diameter of a disc covering exactly `area` mm²
fn diameter_for_area(area: f64) -> f64 {
    2.0 * (area / std::f64::consts::PI).sqrt()
}

#[test]
fn test_hundred_mm2_sheet_converts_square_to_quarter_mm2() {
    let img = sheet_with_square(1000, 1000, 400, 400, 50);
    let sheet = Sheet::new(1000, 1000, diameter_for_area(100.0), PixelAreaConvention::RawRectangle)
        .unwrap();
    assert!((sheet.scale_mm2_per_px2() - 0.0001).abs() < 1e-12);

    let rois = vec![Roi::new("S1", (375.0, 375.0), (475.0, 475.0))];
    let results = measurer()
        .measure("sheet.png", &img, &rois, sheet.scale_mm2_per_px2())
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].roi_px, 10_000);
    assert_eq!(results[0].dark_px, 2500);
    assert_eq!(results[0].dark_mm2, 0.25);
    assert_eq!(results[0].roi_mm2, 1.0);
}

#[test]
fn test_one_record_per_roi_in_input_order() {
    let img = sheet_with_square(200, 100, 20, 20, 10);
    let rois = vec![
        Roi::new("S1", (10.0, 10.0), (40.0, 40.0)),
        Roi::new("p2", (-50.0, -50.0), (-10.0, -10.0)),
        Roi::new("r3", (60.0, 60.0), (60.0, 90.0)),
        Roi::new("S4", (300.0, 80.0), (150.0, 120.0)),
    ];

    let results = measurer().measure("a.jpg", &img, &rois, 0.01).unwrap();

    let labels: Vec<&str> = results.iter().map(|m| m.label.as_str()).collect();
    assert_eq!(labels, vec!["S1", "p2", "r3", "S4"]);
    assert_eq!(results[1].roi_px, 0);
    assert_eq!(results[1].dark_px, 0);
    assert_eq!(results[2].roi_px, 0);
    // Clamped to [150, 200) x [80, 100)
    assert_eq!(results[3].roi_px, 50 * 20);
}

#[test]
fn test_areas_are_consistent() {
    let img = sheet_with_square(300, 300, 100, 120, 17);
    let rois = vec![
        Roi::new("S1", (90.0, 110.0), (140.0, 160.0)),
        Roi::new("S2", (0.0, 0.0), (300.0, 300.0)),
        Roi::new("S3", (100.5, 120.9), (111.2, 125.0)),
    ];
    let scale = 0.00317;

    for m in measurer().measure("a.png", &img, &rois, scale).unwrap() {
        assert_eq!(m.roi_px, m.rect.area());
        assert!(m.dark_px <= m.roi_px);
        assert_eq!(m.dark_mm2, (m.dark_px as f64 * scale * 100.0).round() / 100.0);
        assert_eq!(m.roi_mm2, (m.roi_px as f64 * scale * 100.0).round() / 100.0);
    }
}

#[test]
fn test_uniform_roi_is_all_or_nothing() {
    let img = RgbImage::from_pixel(64, 64, PAPER);
    let rois = vec![Roi::new("S1", (8.0, 8.0), (40.0, 40.0))];

    let results = measurer().measure("blank.png", &img, &rois, 0.01).unwrap();

    let m = &results[0];
    assert!(m.dark_px == 0 || m.dark_px == m.roi_px);
}

#[test]
fn test_measurement_is_deterministic() {
    let mut img = sheet_with_square(120, 120, 30, 30, 9);
    img.put_pixel(80, 80, SPECK);
    img.put_pixel(81, 80, Rgb([90, 90, 90]));
    let rois = vec![
        Roi::new("S1", (20.0, 20.0), (100.0, 100.0)),
        Roi::new("S2", (75.0, 75.0), (90.0, 90.0)),
    ];

    for config in [
        MeasurementConfig::default(),
        MeasurementConfig {
            cleanup: CleanupMode::Morphological,
            pre_filter: PreFilter::gaussian_5x5(),
            ..Default::default()
        },
    ] {
        let measurer = SpeckMeasurer::new(config).unwrap();
        let first = measurer.measure("a.png", &img, &rois, 0.02).unwrap();
        let second = measurer.measure("a.png", &img, &rois, 0.02).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn test_morphological_cleanup_keeps_largest_speck() {
    let mut img = sheet_with_square(100, 100, 20, 20, 20);
    // Isolated dust pixels
    img.put_pixel(70, 70, SPECK);
    img.put_pixel(80, 30, SPECK);
    let rois = vec![Roi::new("S1", (0.0, 0.0), (100.0, 100.0))];

    let raw = measurer().measure("a.png", &img, &rois, 1.0).unwrap();
    let cleaned = SpeckMeasurer::new(MeasurementConfig {
        cleanup: CleanupMode::Morphological,
        ..Default::default()
    })
    .unwrap()
    .measure("a.png", &img, &rois, 1.0)
    .unwrap();

    assert_eq!(raw[0].dark_px, 402);
    assert_eq!(cleaned[0].dark_px, 400);
}

#[test]
fn test_sheet_conventions() {
    let d = 164.4;
    let physical = circle_area(d);

    let raw = Sheet::new(400, 300, d, PixelAreaConvention::RawRectangle).unwrap();
    assert_eq!(raw.pixel_area(), 120_000.0);

    let average = Sheet::new(400, 300, d, PixelAreaConvention::CircleFromAverage).unwrap();
    assert!((average.pixel_area() - circle_area(350.0)).abs() < 1e-9);

    let min = Sheet::new(400, 300, d, PixelAreaConvention::CircleFromMin).unwrap();
    assert!((min.pixel_area() - circle_area(300.0)).abs() < 1e-9);

    for sheet in [raw, average, min] {
        assert!((sheet.scale_mm2_per_px2() * sheet.pixel_area() - physical).abs() < 1e-6);
    }
}

#[test]
fn test_invalid_inputs() {
    let img = RgbImage::new(0, 0);
    let rois = vec![Roi::new("S1", (0.0, 0.0), (5.0, 5.0))];
    assert!(matches!(
        measurer().measure("empty.png", &img, &rois, 0.1),
        Err(SpeckError::ImageDecode(_))
    ));

    let img = RgbImage::from_pixel(10, 10, PAPER);
    assert!(matches!(
        measurer().measure("a.png", &img, &rois, 0.0),
        Err(SpeckError::Config(_))
    ));
    assert!(matches!(
        decode_sheet(b"definitely not an image"),
        Err(SpeckError::ImageDecode(_))
    ));
    assert!(Sheet::new(10, 10, -1.0, PixelAreaConvention::RawRectangle).is_err());
}

#[test]
fn test_sheets_are_decoded_upright() {
    // Stored 40x20 with a black left half; orientation 6 displays it rotated
    // 90 degrees clockwise, so the black half ends up on top
    let mut stored = RgbImage::from_pixel(40, 20, Rgb([255, 255, 255]));
    for y in 0..20 {
        for x in 0..20 {
            stored.put_pixel(x, y, Rgb([0, 0, 0]));
        }
    }
    let bytes = jpeg_with_orientation(&stored, 6);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("phone.jpg");
    std::fs::write(&path, &bytes).unwrap();

    for upright in [load_sheet(&path).unwrap(), decode_sheet(&bytes).unwrap()] {
        assert_eq!(upright.dimensions(), (20, 40));
        assert!(upright.get_pixel(10, 8)[0] < 64);
        assert!(upright.get_pixel(10, 32)[0] > 192);
    }

    // Without the tag the stored layout is kept
    let plain = jpeg_with_orientation(&stored, 1);
    assert_eq!(decode_sheet(&plain).unwrap().dimensions(), (40, 20));
}
