//! Per-label totals of dark speck area, in a caller-chosen label order.

use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::errors::{SpeckError, SpeckResult};
use crate::measurer::round_to;
use crate::report::{create_report_file, SpeckRow};

/// Summed dark area of one label; `None` when the label never occurs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelTotal {
    pub label: String,
    pub dark_mm2: Option<f64>,
}

/// Sums `dark_mm2` per label for the labels of interest.
///
/// The output has one entry per requested label, in the requested order.
/// Rows with other labels are ignored.
pub fn aggregate_by_label(rows: &[SpeckRow], labels: &[String], decimals: u32) -> Vec<LabelTotal> {
    let mut sums: HashMap<&str, f64> = HashMap::new();
    for row in rows {
        *sums.entry(row.label.as_str()).or_insert(0.0) += row.dark_mm2;
    }

    labels
        .iter()
        .map(|label| LabelTotal {
            label: label.clone(),
            dark_mm2: sums.get(label.as_str()).map(|sum| round_to(*sum, decimals)),
        })
        .collect()
}

/// Parses a label list: one label per line or comma-separated, blank
/// entries and `#` comment lines ignored.
pub fn parse_label_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .flat_map(|line| line.split(','))
        .map(|label| label.trim().trim_matches('"').to_string())
        .filter(|label| !label.is_empty())
        .collect()
}

pub fn read_label_list(path: &Path) -> SpeckResult<Vec<String>> {
    let text = fs::read_to_string(path).map_err(|e| {
        SpeckError::FileSystem(format!("Failed to read label list '{}': {}", path.display(), e))
    })?;
    let labels = parse_label_list(&text);
    if labels.is_empty() {
        return Err(SpeckError::Validation(format!(
            "Label list '{}' is empty",
            path.display()
        )));
    }
    Ok(labels)
}

/// Writes `label,dark_mm2` rows; missing labels get an empty value.
pub fn write_label_totals(path: &Path, totals: &[LabelTotal]) -> SpeckResult<()> {
    let mut writer = csv::Writer::from_writer(create_report_file(path)?);
    for total in totals {
        writer.serialize(total)?;
    }
    writer.flush()?;
    tracing::info!(path = %path.display(), labels = totals.len(), "Label totals written");
    Ok(())
}
