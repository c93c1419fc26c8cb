//! # Annotation Parsing
//!
//! Reads LabelMe documents (`{"shapes": [...], "imagePath": ...}`) and turns
//! their rectangle shapes into [`Roi`]s. A bare top-level array of shapes is
//! accepted as well.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::errors::{SpeckError, SpeckResult};
use crate::roi::Roi;

/// Label prefixes that mark a rectangle as a speck ROI.
pub const DEFAULT_MARKERS: &[char] = &['S', 'p', 'r'];

/// Label used by the rectangle report for shapes without one.
pub const DEFAULT_RECT_LABEL: &str = "rect";

/// One LabelMe shape. Only rectangles are of interest.
#[derive(Debug, Clone, Deserialize)]
pub struct Shape {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub points: Vec<[f64; 2]>,
    #[serde(default)]
    pub shape_type: Option<String>,
}

impl Shape {
    pub fn is_rectangle(&self) -> bool {
        self.shape_type.as_deref() == Some("rectangle") && self.points.len() >= 2
    }

    fn to_roi(&self, label: &str) -> Roi {
        let [x1, y1] = self.points[0];
        let [x2, y2] = self.points[1];
        Roi::new(label, (x1, y1), (x2, y2))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnnotationDocument {
    Labelme {
        shapes: Vec<Shape>,
        #[serde(rename = "imagePath", default)]
        image_path: Option<String>,
    },
    Shapes(Vec<Shape>),
}

/// A parsed annotation file.
#[derive(Debug, Clone, Default)]
pub struct Annotation {
    pub shapes: Vec<Shape>,
    /// `imagePath` as written by LabelMe, if present
    pub image_path: Option<String>,
}

impl Annotation {
    /// Parses an annotation from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `SpeckError::AnnotationParse` for malformed JSON or a document
    /// without a `shapes` list.
    pub fn from_json(text: &str) -> SpeckResult<Self> {
        let document: AnnotationDocument = serde_json::from_str(text).map_err(|e| {
            SpeckError::AnnotationParse(format!("Invalid annotation document: {}", e))
        })?;

        Ok(match document {
            AnnotationDocument::Labelme { shapes, image_path } => Self { shapes, image_path },
            AnnotationDocument::Shapes(shapes) => Self {
                shapes,
                image_path: None,
            },
        })
    }

    /// Reads and parses an annotation file.
    pub fn from_path(path: &Path) -> SpeckResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            SpeckError::AnnotationParse(format!(
                "Failed to read annotation '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_json(&text).map_err(|e| match e {
            SpeckError::AnnotationParse(msg) => {
                SpeckError::AnnotationParse(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Basename of `imagePath`, handling both `/` and `\` separators.
    pub fn image_file_name(&self) -> Option<&str> {
        self.image_path
            .as_deref()
            .map(|p| p.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(p))
            .filter(|name| !name.is_empty())
    }

    /// Every rectangle, whatever its label. Unlabelled rectangles get
    /// [`DEFAULT_RECT_LABEL`].
    pub fn rectangles(&self) -> Vec<Roi> {
        self.shapes
            .iter()
            .filter(|s| s.is_rectangle())
            .map(|s| s.to_roi(s.label.as_deref().unwrap_or(DEFAULT_RECT_LABEL)))
            .collect()
    }

    /// Rectangles whose label starts with an allow-listed marker, in file order.
    pub fn speck_rois(&self, filter: &MarkerFilter) -> Vec<Roi> {
        self.shapes
            .iter()
            .filter(|s| s.is_rectangle())
            .filter_map(|s| {
                let label = s.label.as_deref()?;
                filter.accepts(label).then(|| s.to_roi(label))
            })
            .collect()
    }
}

/// Allow-list of label prefixes.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerFilter {
    markers: Vec<char>,
}

impl MarkerFilter {
    pub fn new(markers: impl IntoIterator<Item = char>) -> Self {
        Self {
            markers: markers.into_iter().collect(),
        }
    }

    pub fn markers(&self) -> &[char] {
        &self.markers
    }

    /// True when `label` is non-empty and starts with one of the markers.
    pub fn accepts(&self, label: &str) -> bool {
        label
            .chars()
            .next()
            .is_some_and(|first| self.markers.contains(&first))
    }
}

impl Default for MarkerFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MARKERS.iter().copied())
    }
}
