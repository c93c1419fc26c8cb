//! # Sheet Discovery
//!
//! Walks a folder and pairs each sheet image with its LabelMe annotation file.
//! Three pairing rules are supported, matching the naming habits found in the
//! scanned handsheet folders:
//!
//! - **stem-prefix**: the annotation's file name starts with the image stem
//! - **components:N**: the first N words of both stems (split on spaces and
//!   underscores) agree, case-insensitively
//! - **image-path**: the annotation's `imagePath` names the image

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::annotation::Annotation;
use crate::errors::{SpeckError, SpeckResult};
use crate::observability::metrics::record_sheet_skipped;

/// Image extensions measured by the speck report
pub const SHEET_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Image extensions scanned by the rectangle report
pub const RECT_REPORT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "gif"];

/// Default number of stem components compared by `LeadingComponents`
pub const DEFAULT_KEY_COMPONENTS: usize = 4;

lazy_static! {
    static ref STEM_SEPARATORS: Regex = Regex::new(r"[ _]+").expect("valid separator regex");
}

/// How sheet images are matched with annotation files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PairingStrategy {
    /// First annotation (by name) whose file name starts with the image stem
    #[default]
    StemPrefix,
    /// Annotation whose first N stem components equal the image's
    LeadingComponents(usize),
    /// Annotation whose `imagePath` basename equals the image file name
    ImagePath,
}

impl PairingStrategy {
    pub fn validate(&self) -> Result<(), String> {
        if let PairingStrategy::LeadingComponents(0) = self {
            return Err("Pairing by leading components needs at least one component".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for PairingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingStrategy::StemPrefix => write!(f, "stem-prefix"),
            PairingStrategy::LeadingComponents(n) => write!(f, "components:{}", n),
            PairingStrategy::ImagePath => write!(f, "image-path"),
        }
    }
}

impl FromStr for PairingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_lowercase();
        match value.as_str() {
            "stem-prefix" | "prefix" => Ok(PairingStrategy::StemPrefix),
            "image-path" | "imagepath" => Ok(PairingStrategy::ImagePath),
            "components" => Ok(PairingStrategy::LeadingComponents(DEFAULT_KEY_COMPONENTS)),
            other => match other.strip_prefix("components:") {
                Some(n) => n
                    .parse::<usize>()
                    .map(PairingStrategy::LeadingComponents)
                    .map_err(|_| format!("Invalid component count in '{}'", s)),
                None => Err(format!(
                    "Unknown pairing strategy '{}' (expected stem-prefix, components[:N] or image-path)",
                    s
                )),
            },
        }
    }
}

/// A sheet image and the annotation file describing its ROIs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetPair {
    pub image: PathBuf,
    pub annotation: PathBuf,
}

impl SheetPair {
    /// Image file name, used as the sheet identifier in reports
    pub fn image_name(&self) -> String {
        file_name(&self.image)
    }
}

/// Comparison key built from the first `n` components of a file stem.
///
/// `"Sample 12_A scan_left.jpg"` with `n = 3` gives `"sample_12_a"`.
pub fn stem_key(stem: &str, n: usize) -> String {
    STEM_SEPARATORS
        .split(stem.trim())
        .filter(|part| !part.is_empty())
        .take(n)
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Lists files in `dir` whose lowercase extension is in `extensions`, sorted
/// by file name.
pub fn list_files(dir: &Path, extensions: &[&str]) -> SpeckResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        SpeckError::FileSystem(format!("Failed to read directory '{}': {}", dir.display(), e))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }

    files.sort_by_key(|p| file_name(p));
    Ok(files)
}

/// Pairs every image in `dir` with an annotation file.
///
/// Images without a matching annotation are logged and left out. The result
/// is sorted by image file name.
pub fn discover_sheets(
    dir: &Path,
    strategy: PairingStrategy,
    extensions: &[&str],
) -> SpeckResult<Vec<SheetPair>> {
    strategy.validate().map_err(SpeckError::Config)?;

    let images = list_files(dir, extensions)?;
    let annotations = list_files(dir, &["json"])?;

    // Only ImagePath needs to look inside the annotation files
    let image_paths: Vec<Option<String>> = match strategy {
        PairingStrategy::ImagePath => annotations
            .iter()
            .map(|path| match Annotation::from_path(path) {
                Ok(doc) => doc.image_file_name().map(str::to_string),
                Err(e) => {
                    warn!(
                        annotation = %path.display(),
                        error = %e,
                        "Unreadable annotation ignored during pairing"
                    );
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    };

    let mut pairs = Vec::new();
    for image in images {
        let name = file_name(&image);
        let stem = file_stem(&image);

        let found = match strategy {
            PairingStrategy::StemPrefix => annotations
                .iter()
                .find(|json| file_name(json).starts_with(&stem)),
            PairingStrategy::LeadingComponents(n) => {
                let key = stem_key(&stem, n);
                annotations
                    .iter()
                    .find(|json| stem_key(&file_stem(json), n) == key)
            }
            PairingStrategy::ImagePath => annotations
                .iter()
                .zip(image_paths.iter())
                .find(|(_, referenced)| referenced.as_deref() == Some(name.as_str()))
                .map(|(json, _)| json),
        };

        match found {
            Some(annotation) => {
                debug!(image = %name, annotation = %annotation.display(), "Paired sheet");
                pairs.push(SheetPair {
                    image,
                    annotation: annotation.clone(),
                });
            }
            None => {
                warn!(
                    image = %name,
                    strategy = %strategy,
                    "No annotation found for image, skipping"
                );
                record_sheet_skipped("unpaired");
            }
        }
    }

    Ok(pairs)
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
