//! Object-specific behavior strategies.
//!
//! Most remote objects get the default behavior: no immutable fields, a
//! plain bulk delete, and generic `_Return:<Field>` capture after every
//! batch. Objects whose backend side effects need compensation (cascade
//! deletes, forced flags, consent automation) carry their own handler.

mod account;
mod location;
mod participant;
mod vehicle;

pub use account::AccountHandler;
pub use location::LocationHandler;
pub use participant::ParticipantHandler;
pub use vehicle::VehicleHandler;

use indexmap::IndexMap;
use tracing::{error, info, warn};

use crate::constants::{bulk, directives, fields, objects, poll};
use crate::executor::{BatchItem, Operation};
use crate::factory::RunContext;
use crate::store::{QueryFilter, RemoteStore, SaveResult};
use crate::types::{Alias, FieldName, ObjectName, RemoteId};

/// Per-object behavior strategy invoked by the executor and the teardown
/// path.
pub trait ObjectHandler: Send + Sync {
    /// Remote object type this handler drives.
    fn object(&self) -> &str;

    /// Fields the backend accepts on insert but rejects on update; the
    /// executor strips them from update payloads.
    fn immutable_fields(&self) -> &[&str] {
        &[]
    }

    /// Deletes `ids`, cascading to related records where the object
    /// requires it.
    fn delete(&self, store: &dyn RemoteStore, ids: &[RemoteId]) {
        delete_plain(store, self.object(), ids);
    }

    /// Post-batch hook, called once per executed chunk with that chunk's
    /// items and their outcomes.
    fn after_batch(
        &self,
        store: &dyn RemoteStore,
        ctx: &mut RunContext,
        items: &[BatchItem],
        results: &[SaveResult],
        _op: Operation,
    ) {
        capture_return_fields(store, ctx, self.object(), items, results);
    }
}

/// Resolves the behavior strategy for `object`.
pub fn handler_for(object: &str) -> Box<dyn ObjectHandler> {
    match object {
        objects::PERSON_ACCOUNT => Box::new(AccountHandler),
        objects::VEHICLE => Box::new(VehicleHandler),
        objects::LOCATION => Box::new(LocationHandler),
        objects::PARTICIPANT => Box::new(ParticipantHandler),
        objects::ASSET => Box::new(AssetHandler),
        objects::VEHICLE_DEFINITION => Box::new(VehicleDefinitionHandler),
        other => Box::new(DefaultHandler {
            object: other.to_string(),
        }),
    }
}

/// Fallback strategy for objects without dedicated behavior.
struct DefaultHandler {
    object: ObjectName,
}

impl ObjectHandler for DefaultHandler {
    fn object(&self) -> &str {
        &self.object
    }
}

/// Asset strategy: owner linkage is create-only.
struct AssetHandler;

impl ObjectHandler for AssetHandler {
    fn object(&self) -> &str {
        objects::ASSET
    }

    fn immutable_fields(&self) -> &[&str] {
        &[fields::ACCOUNT_ID, fields::CONTACT_ID]
    }
}

/// Vehicle-definition strategy: product linkage is create-only.
struct VehicleDefinitionHandler;

impl ObjectHandler for VehicleDefinitionHandler {
    fn object(&self) -> &str {
        objects::VEHICLE_DEFINITION
    }

    fn immutable_fields(&self) -> &[&str] {
        &[fields::PRODUCT_ID]
    }
}

pub(crate) fn dedup(ids: &[RemoteId]) -> Vec<RemoteId> {
    let mut unique: Vec<RemoteId> = Vec::new();
    for id in ids {
        if !unique.contains(id) {
            unique.push(id.clone());
        }
    }
    unique
}

/// Plain bulk delete: deduplicates, sends one request, logs per-record
/// failures without propagating them.
pub(crate) fn delete_plain(store: &dyn RemoteStore, object: &str, ids: &[RemoteId]) {
    let unique = dedup(ids);
    if unique.is_empty() {
        return;
    }
    info!(object, records = unique.len(), "deleting records");
    match store.delete(object, &unique) {
        Ok(results) => {
            let deleted = results.iter().filter(|result| result.success).count();
            if deleted < results.len() {
                warn!(
                    object,
                    deleted,
                    total = results.len(),
                    "some records could not be deleted"
                );
            } else {
                info!(object, deleted, "records deleted");
            }
        }
        Err(err) => error!(object, error = %err, "bulk delete failed"),
    }
}

/// Collects the distinct non-empty values of `field` across `ids` on
/// `object`. Used to resolve related-record ids ahead of a cascade delete;
/// lookup failures degrade to missing values.
pub(crate) fn field_values(
    store: &dyn RemoteStore,
    object: &str,
    ids: &[RemoteId],
    field: &str,
) -> Vec<String> {
    let unique = dedup(ids);
    let mut values: Vec<String> = Vec::new();
    for chunk in unique.chunks(bulk::ID_QUERY_CHUNK) {
        match store.query(object, &QueryFilter::IdIn(chunk.to_vec()), &[field]) {
            Ok(records) => {
                for record in records {
                    if let Some(value) = record.field(field) {
                        if !value.is_empty() && !values.iter().any(|seen| seen == value) {
                            values.push(value.to_string());
                        }
                    }
                }
            }
            Err(err) => {
                warn!(object, field, error = %err, "related-id lookup failed");
            }
        }
    }
    values
}

/// Finds ids of `child_object` records whose `foreign_key` field holds one
/// of `parent_ids`.
pub(crate) fn child_record_ids(
    store: &dyn RemoteStore,
    child_object: &str,
    foreign_key: &str,
    parent_ids: &[String],
) -> Vec<RemoteId> {
    let unique = dedup(parent_ids);
    let mut ids: Vec<RemoteId> = Vec::new();
    for chunk in unique.chunks(bulk::ID_QUERY_CHUNK) {
        match store.query(
            child_object,
            &QueryFilter::FieldIn(foreign_key.to_string(), chunk.to_vec()),
            &[],
        ) {
            Ok(records) => {
                for record in records {
                    if !ids.contains(&record.id) {
                        ids.push(record.id.clone());
                    }
                }
            }
            Err(err) => {
                warn!(child_object, foreign_key, error = %err, "child-record lookup failed");
            }
        }
    }
    ids
}

/// Captures `_Return:<Field>` values for the rows a batch saved.
///
/// The requested fields come from the first item's raw row; the backend
/// fills them asynchronously, so each new id is polled until every field
/// has come back non-empty. Values are recorded under `alias.<Field>` as
/// they arrive, leaving the captured subset usable even when the poll
/// exhausts its attempts.
pub(crate) fn capture_return_fields(
    store: &dyn RemoteStore,
    ctx: &mut RunContext,
    object: &str,
    items: &[BatchItem],
    results: &[SaveResult],
) {
    let Some(first) = items.first() else {
        return;
    };
    let requested: Vec<FieldName> = first
        .raw
        .keys()
        .filter_map(|column| column.strip_prefix(directives::RETURN_PREFIX))
        .map(str::to_string)
        .collect();
    if requested.is_empty() {
        return;
    }

    let mut alias_by_id: IndexMap<RemoteId, Alias> = IndexMap::new();
    for (item, result) in items.iter().zip(results) {
        if result.success {
            if let Some(alias) = item.alias.as_deref() {
                alias_by_id.insert(result.id.clone(), alias.to_string());
            }
        }
    }
    if alias_by_id.is_empty() {
        return;
    }

    let targets: Vec<RemoteId> = alias_by_id.keys().cloned().collect();
    let field_refs: Vec<&str> = requested.iter().map(String::as_str).collect();
    info!(
        object,
        fields = ?requested,
        records = targets.len(),
        "capturing return fields"
    );

    let keys = &mut ctx.keys;
    poll::RETURN_FIELDS.run("return-fields", &targets, |missing| {
        let mut complete: IndexMap<RemoteId, ()> = IndexMap::new();
        for chunk in missing.chunks(bulk::ID_QUERY_CHUNK) {
            match store.query(object, &QueryFilter::IdIn(chunk.to_vec()), &field_refs) {
                Ok(records) => {
                    for record in records {
                        let Some(alias) = alias_by_id.get(&record.id) else {
                            continue;
                        };
                        let mut captured = 0;
                        for field in &requested {
                            if let Some(value) = record.field(field) {
                                if !value.is_empty() {
                                    keys.set_field(alias, field, value);
                                    captured += 1;
                                }
                            }
                        }
                        if captured == requested.len() {
                            complete.insert(record.id.clone(), ());
                        }
                    }
                }
                Err(err) => {
                    error!(object, error = %err, "return-field lookup failed");
                }
            }
        }
        complete
    });
}
