use chrono::{Duration, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::constants::directives;
use crate::keymap::KeyMap;
use crate::types::{Alias, CellValue, FieldName, IsoDate};

/// One CSV data row as read from disk: column name -> raw cell text, in
/// column order.
pub type FixtureRow = IndexMap<FieldName, CellValue>;

/// Ordered remote payload: field name -> value, in source-column order.
pub type RecordPayload = IndexMap<FieldName, FieldValue>;

/// A single remote field value.
///
/// The parser emits `Text` and `Bool` only. `Null` exists for handler-built
/// update payloads that clear a field explicitly; it serializes as JSON null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Bool(bool),
    Null,
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Text rendering for query projection; `Null` renders as absent.
    pub fn render(&self) -> Option<String> {
        match self {
            FieldValue::Text(value) => Some(value.clone()),
            FieldValue::Bool(value) => Some(value.to_string()),
            FieldValue::Null => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Outcome of parsing one fixture row.
#[derive(Debug, Clone)]
pub struct ParsedRow {
    pub payload: RecordPayload,
    pub alias: Option<Alias>,
    /// Copy of the source row with `_EffectiveTo__date` resolved in place;
    /// directive columns survive here for handler post-processing.
    pub raw: FixtureRow,
}

/// Interprets the directive-column grammar of fixture rows.
///
/// Date offsets resolve against `today`, which defaults to the current UTC
/// date and can be pinned for deterministic tests.
#[derive(Debug, Clone)]
pub struct RowParser {
    today: NaiveDate,
}

impl Default for RowParser {
    fn default() -> Self {
        Self {
            today: Utc::now().date_naive(),
        }
    }
}

impl RowParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the reference date used for `__date` offset resolution.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Resolves a signed day-offset cell to an ISO date. Empty and
    /// non-integer cells resolve to `None`.
    pub fn resolve_date_offset(&self, cell: &CellValue) -> Option<IsoDate> {
        let days: i64 = cell.trim().parse().ok()?;
        Some((self.today + Duration::days(days)).format("%Y-%m-%d").to_string())
    }

    /// Parses one row into a remote payload plus metadata.
    ///
    /// Directive columns (`_BaseName`, `_Ref:<Field>`, `_Return:<Field>`, any
    /// other `_`-prefixed column) never become payload fields. Empty cells
    /// leave their field absent. Returns `None` only for fully blank rows;
    /// alias-only rows come back with an empty payload so teardown can still
    /// use the alias.
    pub fn parse(&self, row: &FixtureRow, keys: &KeyMap) -> Option<ParsedRow> {
        let mut payload = RecordPayload::new();
        let mut alias: Option<Alias> = None;

        for (column, cell) in row {
            if cell.is_empty() {
                continue;
            }
            if column.as_str() == directives::BASE_NAME_COLUMN {
                alias = Some(cell.clone());
                continue;
            }
            if let Some(field) = column.strip_prefix(directives::REF_PREFIX) {
                match keys.get(cell) {
                    Some(id) => {
                        payload.insert(field.to_string(), FieldValue::text(id));
                    }
                    None => {
                        warn!(
                            alias = %cell,
                            field,
                            "reference alias not recorded yet; leaving field absent"
                        );
                    }
                }
                continue;
            }
            if column.starts_with(directives::DIRECTIVE_PREFIX) {
                continue;
            }
            if let Some(field) = column.strip_suffix(directives::DATE_SUFFIX) {
                if field.is_empty() {
                    continue;
                }
                if let Some(date) = self.resolve_date_offset(cell) {
                    payload.insert(field.to_string(), FieldValue::Text(date));
                }
                continue;
            }
            let trimmed = cell.trim();
            if trimmed.eq_ignore_ascii_case(directives::BOOL_TRUE) {
                payload.insert(column.clone(), FieldValue::Bool(true));
            } else if trimmed.eq_ignore_ascii_case(directives::BOOL_FALSE) {
                payload.insert(column.clone(), FieldValue::Bool(false));
            } else {
                payload.insert(column.clone(), FieldValue::Text(cell.clone()));
            }
        }

        if alias.is_none() && payload.is_empty() {
            return None;
        }

        // Consent management reads the expiry through the raw copy, so the
        // offset is resolved once here; an unresolvable offset reads as
        // "no expiry".
        let mut raw = row.clone();
        match row
            .get(directives::EFFECTIVE_TO_COLUMN)
            .and_then(|cell| self.resolve_date_offset(cell))
        {
            Some(date) => {
                raw.insert(directives::EFFECTIVE_TO_COLUMN.to_string(), date);
            }
            None => {
                raw.shift_remove(directives::EFFECTIVE_TO_COLUMN);
            }
        }

        Some(ParsedRow { payload, alias, raw })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, &str)]) -> FixtureRow {
        cells
            .iter()
            .map(|(column, cell)| (column.to_string(), cell.to_string()))
            .collect()
    }

    fn parser() -> RowParser {
        RowParser::new().with_today(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
    }

    #[test]
    fn blank_row_parses_to_none() {
        let parsed = parser().parse(&row(&[("Name", ""), ("Phone", "")]), &KeyMap::new());
        assert!(parsed.is_none());
    }

    #[test]
    fn alias_only_row_keeps_alias_with_empty_payload() {
        let parsed = parser()
            .parse(&row(&[("_BaseName", "Acc1"), ("Name", "")]), &KeyMap::new())
            .unwrap();
        assert_eq!(parsed.alias.as_deref(), Some("Acc1"));
        assert!(parsed.payload.is_empty());
    }

    #[test]
    fn empty_cells_leave_fields_absent() {
        let parsed = parser()
            .parse(&row(&[("Name", "A"), ("Phone", "")]), &KeyMap::new())
            .unwrap();
        assert_eq!(parsed.payload.get("Name"), Some(&FieldValue::text("A")));
        assert!(!parsed.payload.contains_key("Phone"));
    }

    #[test]
    fn boolean_cells_convert_case_insensitively() {
        let parsed = parser()
            .parse(
                &row(&[("Name", "A"), ("Active", "tRuE"), ("Closed", " FALSE ")]),
                &KeyMap::new(),
            )
            .unwrap();
        assert_eq!(parsed.payload.get("Active"), Some(&FieldValue::Bool(true)));
        assert_eq!(parsed.payload.get("Closed"), Some(&FieldValue::Bool(false)));
    }

    #[test]
    fn date_columns_resolve_signed_offsets() {
        let parsed = parser()
            .parse(
                &row(&[("Start__date", "30"), ("End__date", "-1")]),
                &KeyMap::new(),
            )
            .unwrap();
        assert_eq!(
            parsed.payload.get("Start"),
            Some(&FieldValue::text("2026-03-31"))
        );
        assert_eq!(parsed.payload.get("End"), Some(&FieldValue::text("2026-02-28")));
    }

    #[test]
    fn non_numeric_date_offset_leaves_field_absent() {
        let parsed = parser()
            .parse(
                &row(&[("Name", "A"), ("Start__date", "next week")]),
                &KeyMap::new(),
            )
            .unwrap();
        assert!(!parsed.payload.contains_key("Start"));
        assert!(!parsed.payload.contains_key("Start__date"));
    }

    #[test]
    fn date_offset_tracks_the_real_clock_by_default() {
        let today = Utc::now().date_naive();
        let parsed = RowParser::new()
            .parse(&row(&[("Due__date", "30")]), &KeyMap::new())
            .unwrap();
        let expected = (today + Duration::days(30)).format("%Y-%m-%d").to_string();
        assert_eq!(parsed.payload.get("Due"), Some(&FieldValue::Text(expected)));
    }

    #[test]
    fn reference_directive_resolves_through_key_map() {
        let mut keys = KeyMap::new();
        keys.set("Acc1", "acc-001");
        let parsed = parser()
            .parse(
                &row(&[("Name", "V"), ("_Ref:AccountId", "Acc1")]),
                &keys,
            )
            .unwrap();
        assert_eq!(
            parsed.payload.get("AccountId"),
            Some(&FieldValue::text("acc-001"))
        );
    }

    #[test]
    fn unresolved_reference_leaves_field_absent() {
        let parsed = parser()
            .parse(
                &row(&[("Name", "V"), ("_Ref:AccountId", "NeverSeen")]),
                &KeyMap::new(),
            )
            .unwrap();
        assert!(!parsed.payload.contains_key("AccountId"));
        assert_eq!(parsed.payload.len(), 1);
    }

    #[test]
    fn compound_reference_keys_resolve_like_plain_aliases() {
        let mut keys = KeyMap::new();
        keys.set_field("Acc1", "PersonContactId", "ctc-9");
        let parsed = parser()
            .parse(
                &row(&[("Name", "C"), ("_Ref:ContactId", "Acc1.PersonContactId")]),
                &keys,
            )
            .unwrap();
        assert_eq!(
            parsed.payload.get("ContactId"),
            Some(&FieldValue::text("ctc-9"))
        );
    }

    #[test]
    fn directive_columns_never_reach_the_payload() {
        let parsed = parser()
            .parse(
                &row(&[
                    ("_BaseName", "Acc1"),
                    ("Name", "A"),
                    ("_Return:PersonContactId", "x"),
                    ("_EmailConsent", "OptIn"),
                ]),
                &KeyMap::new(),
            )
            .unwrap();
        assert_eq!(parsed.payload.len(), 1);
        assert!(parsed.payload.contains_key("Name"));
        assert_eq!(parsed.raw.get("_EmailConsent").map(String::as_str), Some("OptIn"));
    }

    #[test]
    fn raw_row_gets_resolved_effective_to_annotation() {
        let parsed = parser()
            .parse(
                &row(&[("Name", "A"), ("_EffectiveTo__date", "30")]),
                &KeyMap::new(),
            )
            .unwrap();
        assert_eq!(
            parsed.raw.get("_EffectiveTo__date").map(String::as_str),
            Some("2026-03-31")
        );
        assert!(!parsed.payload.contains_key("_EffectiveTo__date"));
        assert!(!parsed.payload.contains_key("_EffectiveTo"));
    }

    #[test]
    fn unresolvable_effective_to_reads_as_no_expiry() {
        let parsed = parser()
            .parse(
                &row(&[("Name", "A"), ("_EffectiveTo__date", "soon")]),
                &KeyMap::new(),
            )
            .unwrap();
        assert!(!parsed.raw.contains_key("_EffectiveTo__date"));
    }

    #[test]
    fn payload_preserves_column_order() {
        let parsed = parser()
            .parse(
                &row(&[("Zeta", "1"), ("Alpha", "2"), ("Mid__date", "0")]),
                &KeyMap::new(),
            )
            .unwrap();
        let order: Vec<&str> = parsed.payload.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn field_values_serialize_to_plain_json() {
        let mut payload = RecordPayload::new();
        payload.insert("Name".into(), FieldValue::text("A"));
        payload.insert("Active".into(), FieldValue::Bool(true));
        payload.insert("EffectiveTo".into(), FieldValue::Null);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"Name": "A", "Active": true, "EffectiveTo": null})
        );
    }
}
