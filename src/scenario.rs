use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::constants::files;
use crate::errors::FactoryError;
use crate::row::FixtureRow;
use crate::types::ObjectName;

/// Sort direction for scenario file listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Seeding order: `01_` runs before `02_`.
    Ascending,
    /// Teardown order: dependents go before their dependencies.
    Descending,
}

/// Lists the CSV files directly inside `dir`, sorted by filename.
pub fn scenario_files(dir: &Path, order: SortOrder) -> Result<Vec<PathBuf>, FactoryError> {
    if !dir.is_dir() {
        return Err(FactoryError::ScenarioUnavailable {
            path: dir.display().to_string(),
            reason: "not a directory".to_string(),
        });
    }
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|err| FactoryError::ScenarioUnavailable {
            path: dir.display().to_string(),
            reason: err.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_csv = entry
            .path()
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case(files::CSV_EXTENSION))
            .unwrap_or(false);
        if is_csv {
            files.push(entry.into_path());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    if order == SortOrder::Descending {
        files.reverse();
    }
    Ok(files)
}

/// Extracts the remote object name from a scenario file path.
///
/// `01_Account.csv` -> `Account`; `Account.csv` -> `Account`;
/// `Prefix - 02_Product2.csv` -> `Product2`;
/// `06_BranchUnit_update.csv` -> `BranchUnit`.
pub fn object_name_from_file(path: &Path) -> ObjectName {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    let segment = stem.rsplit(files::DISPLAY_SEPARATOR).next().unwrap_or(stem);
    let segment = segment.trim_start_matches(|c: char| c.is_ascii_digit() || c == '_');
    strip_update_suffix(segment).to_string()
}

/// True when the file's stem marks it for upsert processing.
pub fn is_update_file(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.to_ascii_lowercase().ends_with(files::UPDATE_SUFFIX))
        .unwrap_or(false)
}

fn strip_update_suffix(stem: &str) -> &str {
    if stem.to_ascii_lowercase().ends_with(files::UPDATE_SUFFIX) {
        &stem[..stem.len() - files::UPDATE_SUFFIX.len()]
    } else {
        stem
    }
}

/// Reads one scenario CSV into header-keyed rows.
///
/// Tolerates a UTF-8 byte-order mark on the first header and rows shorter
/// than the header; missing trailing cells read as empty.
pub fn read_rows(path: &Path) -> Result<Vec<FixtureRow>, FactoryError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let column = if index == 0 {
                column.trim_start_matches('\u{feff}')
            } else {
                column
            };
            column.to_string()
        })
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: FixtureRow = columns
            .iter()
            .enumerate()
            .map(|(index, column)| (column.clone(), record.get(index).unwrap_or("").to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}
