use tracing::{info, warn};

use crate::analytics::{AnalyticsRow, AnalyticsStore};
use crate::constants::fields;
use crate::keymap::KeyMap;
use crate::row::ParsedRow;

/// Outcome of one verification sweep over an analytics extension.
///
/// `checked` counts rows whose lookup actually ran; rows that never
/// resolved to a stored id are skipped with a warning.
#[derive(Debug, Default)]
pub struct VerifyReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub checked: usize,
}

impl VerifyReport {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Cross-checks seeded scenario rows against an analytics data extension.
///
/// Each aliased row resolves to its captured contact id when enrichment
/// stored one, falling back to the plain record id; the matching analytics
/// row is then fetched by `key_column`. Backend failures land in the
/// report, they never panic.
pub struct Verifier<'a, A: AnalyticsStore + ?Sized> {
    analytics: &'a A,
    keys: &'a KeyMap,
}

impl<'a, A: AnalyticsStore + ?Sized> Verifier<'a, A> {
    pub fn new(analytics: &'a A, keys: &'a KeyMap) -> Self {
        Self { analytics, keys }
    }

    pub fn verify_extension(
        &self,
        rows: &[ParsedRow],
        extension: &str,
        key_column: &str,
    ) -> VerifyReport {
        let mut report = VerifyReport::default();
        for row in rows {
            let Some(alias) = row.alias.as_deref() else {
                continue;
            };
            let Some(target) = self
                .keys
                .get_field(alias, fields::PERSON_CONTACT_ID)
                .or_else(|| self.keys.get(alias))
            else {
                warn!(alias, "no stored id; record may not have been created");
                report
                    .warnings
                    .push(format!("{alias}: no stored id, skipped"));
                continue;
            };

            report.checked += 1;
            match self.analytics.fetch_rows(extension, key_column, target) {
                Ok(found) if found.is_empty() => {
                    report
                        .errors
                        .push(format!("{alias} ({target}) missing from {extension}"));
                }
                Ok(found) => {
                    info!(alias, target, rows = found.len(), extension, "rows found");
                    for analytics_row in &found {
                        inspect_row(&mut report, alias, analytics_row);
                    }
                }
                Err(error) => {
                    report.errors.push(format!(
                        "{alias} ({target}): analytics lookup failed: {error}"
                    ));
                }
            }
        }
        report
    }
}

fn inspect_row(report: &mut VerifyReport, alias: &str, row: &AnalyticsRow) {
    let empty: Vec<&str> = row
        .iter()
        .filter(|(_, value)| value.is_null() || value.as_str() == Some(""))
        .map(|(column, _)| column.as_str())
        .collect();
    if empty.is_empty() {
        return;
    }
    let columns = empty.join(", ");
    warn!(alias, columns = %columns, "analytics row has empty columns");
    report
        .warnings
        .push(format!("{alias}: empty columns: {columns}"));
}
