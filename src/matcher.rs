use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::constants::{bulk, fields};
use crate::executor::BatchItem;
use crate::keymap::KeyMap;
use crate::row::FieldValue;
use crate::store::{QueryFilter, RemoteStore};
use crate::types::RemoteId;

/// Existing-record lookup result: remote display name -> id, in
/// query-result insertion order. That order is what makes the fuzzy
/// tie-break deterministic.
pub type ExistingRecords = IndexMap<String, RemoteId>;

/// How an existing-record lookup compares names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// `Name` equals one of the candidates.
    Exact,
    /// `Name` contains one of the candidates as a substring.
    Contains,
}

/// Looks up existing records of `object` by display name.
///
/// Candidates are deduplicated and sent in chunks (200 exact, 50 fuzzy —
/// fuzzy filters expand into one clause per name). A failed chunk logs a
/// warning and contributes nothing; partial results are acceptable.
pub fn find_existing(
    store: &dyn RemoteStore,
    object: &str,
    names: &[String],
    mode: MatchMode,
) -> ExistingRecords {
    let mut existing = ExistingRecords::new();
    if names.is_empty() {
        return existing;
    }

    let mut unique: Vec<String> = Vec::new();
    for name in names {
        if !unique.contains(name) {
            unique.push(name.clone());
        }
    }
    let chunk_size = match mode {
        MatchMode::Exact => bulk::EXACT_QUERY_CHUNK,
        MatchMode::Contains => bulk::FUZZY_QUERY_CHUNK,
    };
    debug!(object, candidates = unique.len(), mode = ?mode, "checking for existing records");

    for chunk in unique.chunks(chunk_size) {
        let filter = match mode {
            MatchMode::Exact => QueryFilter::NameIn(chunk.to_vec()),
            MatchMode::Contains => QueryFilter::NameContainsAny(chunk.to_vec()),
        };
        match store.query(object, &filter, &[fields::NAME]) {
            Ok(records) => {
                for record in records {
                    if let Some(name) = record.name() {
                        existing.insert(name.to_string(), record.id.clone());
                    }
                }
            }
            Err(err) => {
                warn!(
                    object,
                    error = %err,
                    "existing-record lookup failed; treating the chunk as having no matches"
                );
            }
        }
    }
    existing
}

/// Rows split by the upsert decision. Updates carry the matched id in
/// their payload and are executed before inserts.
#[derive(Debug, Default)]
pub struct UpsertSplit {
    pub updates: Vec<BatchItem>,
    pub inserts: Vec<BatchItem>,
}

/// Splits `items` into updates and inserts against existing `object`
/// records.
///
/// Pass 1 matches payload `Name` exactly. Pass 2 runs a fuzzy lookup over
/// the aliases of rows still unmatched and matches a row when its alias is
/// a substring of a remote name; the first match in lookup insertion order
/// wins. Matched rows get the remote id injected under `Id` and their
/// alias recorded in the key map right away.
pub fn classify(
    store: &dyn RemoteStore,
    object: &str,
    items: Vec<BatchItem>,
    keys: &mut KeyMap,
) -> UpsertSplit {
    let exact_names: Vec<String> = items
        .iter()
        .filter_map(|item| payload_name(item))
        .collect();
    let mut existing = find_existing(store, object, &exact_names, MatchMode::Exact);

    let fuzzy_names: Vec<String> = items
        .iter()
        .filter(|item| {
            !payload_name(item)
                .map(|name| existing.contains_key(&name))
                .unwrap_or(false)
        })
        .filter_map(|item| item.alias.clone())
        .collect();
    if !fuzzy_names.is_empty() {
        for (name, id) in find_existing(store, object, &fuzzy_names, MatchMode::Contains) {
            existing.entry(name).or_insert(id);
        }
    }
    if !existing.is_empty() {
        info!(object, existing = existing.len(), "found existing records for upsert");
    }

    let mut split = UpsertSplit::default();
    for mut item in items {
        let mut match_id: Option<RemoteId> = payload_name(&item)
            .and_then(|name| existing.get(&name).cloned());
        if match_id.is_none() {
            if let Some(alias) = item.alias.as_deref() {
                match_id = existing
                    .iter()
                    .find(|(name, _)| name.contains(alias))
                    .map(|(_, id)| id.clone());
            }
        }
        match match_id {
            Some(id) => {
                item.payload
                    .insert(fields::ID.to_string(), FieldValue::text(&id));
                if let Some(alias) = item.alias.as_deref() {
                    keys.set(alias, id);
                }
                split.updates.push(item);
            }
            None => split.inserts.push(item),
        }
    }
    split
}

fn payload_name(item: &BatchItem) -> Option<String> {
    item.payload
        .get(fields::NAME)
        .and_then(FieldValue::as_text)
        .map(str::to_string)
}
