use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use tracing::{info, warn};

use crate::errors::FactoryError;

/// One object section of a combined sheet: the columns after its marker
/// up to the next marker.
#[derive(Debug)]
struct Section {
    object: String,
    start: usize,
    end: usize,
    headers: Vec<String>,
}

/// Splits one combined scenario sheet into per-object CSV files.
///
/// A marker header cell `NN_Object` (leading digits, underscore, object
/// name) opens a section; the cells after it up to the next marker are
/// that section's headers. Output files are renumbered sequentially in
/// marker order, so `07_Vehicle` in the sheet can land as
/// `02_Vehicle.csv` on disk. Rows are padded to the section width and
/// skipped when their slice is entirely blank. Returns the written paths
/// in section order.
pub fn split_sheet(input: &Path, target: &Path) -> Result<Vec<PathBuf>, FactoryError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(input)?;
    let mut records = reader.records();
    let Some(header) = records.next() else {
        warn!(input = %input.display(), "sheet is empty");
        return Ok(Vec::new());
    };
    let header = header?;
    let header: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(index, cell)| {
            if index == 0 {
                cell.trim_start_matches('\u{feff}').to_string()
            } else {
                cell.to_string()
            }
        })
        .collect();

    let sections = find_sections(&header);
    if sections.is_empty() {
        warn!(input = %input.display(), "no section markers found");
        return Ok(Vec::new());
    }

    fs::create_dir_all(target)?;

    let mut written = Vec::with_capacity(sections.len());
    let mut writers = Vec::with_capacity(sections.len());
    for (index, section) in sections.iter().enumerate() {
        let path = target.join(format!("{:02}_{}.csv", index + 1, section.object));
        let mut writer = WriterBuilder::new().from_path(&path)?;
        writer.write_record(&section.headers)?;
        writers.push(writer);
        written.push(path);
    }

    for record in records {
        let record = record?;
        let cells: Vec<&str> = record.iter().collect();
        for (section, writer) in sections.iter().zip(writers.iter_mut()) {
            let end = section.end.min(cells.len());
            let mut slice: Vec<&str> = if section.start < end {
                cells[section.start..end].to_vec()
            } else {
                Vec::new()
            };
            while slice.len() < section.headers.len() {
                slice.push("");
            }
            if slice.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            writer.write_record(&slice)?;
        }
    }

    for mut writer in writers {
        writer.flush()?;
    }
    info!(
        sections = written.len(),
        target = %target.display(),
        "sheet split"
    );
    Ok(written)
}

fn find_sections(header: &[String]) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    for (index, cell) in header.iter().enumerate() {
        if let Some(object) = marker_object(cell) {
            if let Some(open) = sections.last_mut() {
                open.end = index;
            }
            sections.push(Section {
                object: object.to_string(),
                start: index + 1,
                end: header.len(),
                headers: Vec::new(),
            });
        } else if let Some(open) = sections.last_mut() {
            open.headers.push(cell.clone());
        }
    }
    sections
}

/// `01_Account` yields `Account`; the object keeps any inner underscores,
/// so `03_Vehicle_Definition` yields `Vehicle_Definition`.
fn marker_object(cell: &str) -> Option<&str> {
    let (digits, object) = cell.split_once('_')?;
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    if object.is_empty()
        || !object
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_')
    {
        return None;
    }
    Some(object)
}
