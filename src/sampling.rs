//! Reproducible random subsets of report rows for manual checking.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::Path;

use crate::errors::{SpeckError, SpeckResult};
use crate::report::create_report_file;

pub const DEFAULT_SAMPLE_SIZE: usize = 200;
pub const DEFAULT_SAMPLE_SEED: u64 = 42;

/// Draws `n` distinct rows using a generator seeded with `seed`.
///
/// The same `rows`, `n` and `seed` always give the same rows in the same
/// order.
///
/// # Errors
///
/// Returns `SpeckError::Validation` when `n` exceeds the number of rows.
pub fn sample_rows<T: Clone>(rows: &[T], n: usize, seed: u64) -> SpeckResult<Vec<T>> {
    if n > rows.len() {
        return Err(SpeckError::Validation(format!(
            "Cannot sample {} rows from {} available",
            n,
            rows.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    Ok(rand::seq::index::sample(&mut rng, rows.len(), n)
        .into_iter()
        .map(|index| rows[index].clone())
        .collect())
}

/// Samples rows of any CSV file, keeping its header and its columns.
///
/// When `columns` is non-empty only those columns are written, in that order.
pub fn sample_csv_file(
    input: &Path,
    output: &Path,
    n: usize,
    seed: u64,
    columns: &[String],
) -> SpeckResult<usize> {
    let file = fs::File::open(input).map_err(|e| {
        SpeckError::FileSystem(format!("Failed to open '{}': {}", input.display(), e))
    })?;
    let mut reader = csv::Reader::from_reader(file);
    let header = reader.headers()?.clone();

    let selected: Vec<usize> = if columns.is_empty() {
        (0..header.len()).collect()
    } else {
        columns
            .iter()
            .map(|column| {
                header.iter().position(|h| h == column).ok_or_else(|| {
                    SpeckError::Validation(format!(
                        "Column '{}' not found. Available columns: {}",
                        column,
                        header.iter().collect::<Vec<_>>().join(", ")
                    ))
                })
            })
            .collect::<SpeckResult<_>>()?
    };

    let records: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;
    let sampled = sample_rows(&records, n, seed)?;

    let mut writer = csv::Writer::from_writer(create_report_file(output)?);
    writer.write_record(selected.iter().map(|&i| &header[i]))?;
    for record in &sampled {
        writer.write_record(selected.iter().map(|&i| record.get(i).unwrap_or("")))?;
    }
    writer.flush()?;

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        sampled = sampled.len(),
        seed,
        "Sampled report rows"
    );
    Ok(sampled.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_is_deterministic_and_distinct() {
        let rows: Vec<u32> = (0..50).collect();

        let first = sample_rows(&rows, 10, 7).unwrap();
        let second = sample_rows(&rows, 10, 7).unwrap();
        assert_eq!(first, second);

        let mut unique = first.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn test_sample_everything() {
        let rows = vec!["a", "b", "c"];
        let mut all = sample_rows(&rows, 3, 1).unwrap();
        all.sort_unstable();
        assert_eq!(all, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_too_many_requested() {
        let rows = vec![1, 2, 3];
        assert!(matches!(
            sample_rows(&rows, 4, 1),
            Err(SpeckError::Validation(_))
        ));
    }

    #[test]
    fn test_sample_csv_file_selects_columns() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("report.csv");
        let output = dir.path().join("sample.csv");
        fs::write(&input, "image,label,dark_px\na.jpg,S1,3\nb.jpg,S2,5\nc.jpg,p1,7\n").unwrap();

        let count = sample_csv_file(
            &input,
            &output,
            2,
            42,
            &["label".to_string(), "dark_px".to_string()],
        )
        .unwrap();

        assert_eq!(count, 2);
        let text = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "label,dark_px");
        assert_eq!(lines.len(), 3);

        let missing = sample_csv_file(&input, &output, 1, 42, &["mm2_per_px".to_string()]);
        assert!(matches!(missing, Err(SpeckError::Validation(_))));
    }
}
