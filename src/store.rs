use std::sync::Mutex;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::constants::{consent, fields, objects};
use crate::errors::FactoryError;
use crate::row::{FieldValue, RecordPayload};
use crate::types::{FieldName, ObjectName, RemoteId};

/// One record returned by a lookup query: its id plus the projected fields
/// that came back non-null. Nested projections use dotted names
/// (`EngagementChannelType.Name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    pub id: RemoteId,
    pub fields: IndexMap<FieldName, String>,
}

impl RemoteRecord {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.field(fields::NAME)
    }
}

/// Filter shapes the engine composes; implementations translate them to
/// their backend's query language (escaping included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFilter {
    /// Exact `Name` membership.
    NameIn(Vec<String>),
    /// `Name` contains any of the needles (fuzzy lookup).
    NameContainsAny(Vec<String>),
    /// Primary-key membership.
    IdIn(Vec<RemoteId>),
    /// Membership on an arbitrary field (child lookups by foreign key).
    FieldIn(FieldName, Vec<String>),
}

impl QueryFilter {
    /// Number of values the filter carries (drives chunk-size accounting).
    pub fn len(&self) -> usize {
        match self {
            QueryFilter::NameIn(values)
            | QueryFilter::NameContainsAny(values)
            | QueryFilter::IdIn(values)
            | QueryFilter::FieldIn(_, values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reference matcher used by the in-memory backend; real stores
    /// evaluate the equivalent predicate server-side.
    pub fn matches(&self, id: &str, record: &RecordPayload) -> bool {
        let text_of = |name: &str| record.get(name).and_then(FieldValue::render);
        match self {
            QueryFilter::NameIn(values) => text_of(fields::NAME)
                .map(|name| values.iter().any(|value| *value == name))
                .unwrap_or(false),
            QueryFilter::NameContainsAny(needles) => text_of(fields::NAME)
                .map(|name| needles.iter().any(|needle| name.contains(needle.as_str())))
                .unwrap_or(false),
            QueryFilter::IdIn(ids) => ids.iter().any(|candidate| candidate == id),
            QueryFilter::FieldIn(field, values) => text_of(field)
                .map(|value| values.iter().any(|candidate| *candidate == value))
                .unwrap_or(false),
        }
    }
}

/// Per-record outcome of a bulk insert/update/delete, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResult {
    pub success: bool,
    #[serde(default)]
    pub id: RemoteId,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl SaveResult {
    pub fn ok(id: impl Into<RemoteId>) -> Self {
        Self {
            success: true,
            id: id.into(),
            errors: Vec::new(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            id: RemoteId::new(),
            errors: vec![reason.into()],
        }
    }
}

/// Engine-facing CRM backend interface.
///
/// Implementations are synchronous; every call blocks until the backend
/// responds. For a fixed backend state, query output order should be
/// deterministic — the upsert tie-break depends on it.
pub trait RemoteStore: Send + Sync {
    /// Runs one lookup query against `object`, projecting `fields`
    /// (the id always comes back separately).
    fn query(
        &self,
        object: &str,
        filter: &QueryFilter,
        fields: &[&str],
    ) -> Result<Vec<RemoteRecord>, FactoryError>;

    /// Bulk-inserts `records`; outcomes are parallel to the input order.
    fn insert(
        &self,
        object: &str,
        records: &[RecordPayload],
    ) -> Result<Vec<SaveResult>, FactoryError>;

    /// Bulk-updates `records`; each payload carries the `Id` it targets.
    /// A `Null` field value clears that field.
    fn update(
        &self,
        object: &str,
        records: &[RecordPayload],
    ) -> Result<Vec<SaveResult>, FactoryError>;

    /// Bulk-deletes by id; outcomes are parallel to the input order.
    fn delete(&self, object: &str, ids: &[RemoteId]) -> Result<Vec<SaveResult>, FactoryError>;
}

/// Kind tag for entries in the in-memory backend's call journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Query,
    Insert,
    Update,
    Delete,
}

/// One backend call as observed by the in-memory store, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub object: ObjectName,
    pub kind: CallKind,
    /// Records in the request, or filter values for a query.
    pub size: usize,
}

/// How the in-memory backend mimics person-account post-save automation:
/// each inserted person account grows a linked individual, a contact id,
/// and one consent record per configured channel/purpose pair, all of which
/// become queryable only after `visibility_delay` further queries.
#[derive(Debug, Clone, Default)]
pub struct PersonAccountSimulation {
    /// Queries that miss the derived data before it turns visible.
    pub visibility_delay: u64,
    /// `(channel, purpose)` pairs; consent records start as `OptOut`.
    pub consent_channels: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    id: RemoteId,
    fields: RecordPayload,
    /// Fields that appear later: `(name, value, ready_at)`.
    late_fields: Vec<(FieldName, FieldValue, u64)>,
    /// Query-clock value from which the whole record is visible.
    ready_at: u64,
}

impl StoredRecord {
    fn view_at(&self, clock: u64) -> RecordPayload {
        let mut view = self.fields.clone();
        for (name, value, ready_at) in &self.late_fields {
            if *ready_at <= clock {
                view.insert(name.clone(), value.clone());
            }
        }
        view
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: IndexMap<ObjectName, Vec<StoredRecord>>,
    sequences: IndexMap<ObjectName, u64>,
    calls: Vec<CallRecord>,
    query_clock: u64,
    fail_bulk_calls: usize,
    fail_query_calls: usize,
    failing_names: Vec<String>,
    simulation: Option<PersonAccountSimulation>,
}

impl Inner {
    fn next_id(&mut self, object: &str) -> RemoteId {
        let sequence = self.sequences.entry(object.to_string()).or_insert(0);
        *sequence += 1;
        format!("{object}-{:05}", sequence)
    }

    fn push_record(&mut self, object: &str, record: StoredRecord) {
        self.tables.entry(object.to_string()).or_default().push(record);
    }

    fn find_mut(&mut self, object: &str, id: &str) -> Option<&mut StoredRecord> {
        self.tables
            .get_mut(object)?
            .iter_mut()
            .find(|record| record.id == id)
    }

    fn take_bulk_failure(&mut self, object: &str, operation: &str) -> Option<FactoryError> {
        if self.fail_bulk_calls == 0 {
            return None;
        }
        self.fail_bulk_calls -= 1;
        Some(FactoryError::Store {
            object: object.to_string(),
            operation: operation.to_string(),
            reason: "scripted transport failure".to_string(),
        })
    }

    fn simulate_person_account(&mut self, account_id: &str) {
        let Some(simulation) = self.simulation.clone() else {
            return;
        };
        let ready_at = self.query_clock + simulation.visibility_delay + 1;

        let individual_id = self.next_id(objects::INDIVIDUAL);
        let contact_id = self.next_id("Contact");

        let mut individual_fields = RecordPayload::new();
        individual_fields.insert(
            fields::HAS_OPTED_OUT_SOLICIT.to_string(),
            FieldValue::Bool(false),
        );
        self.push_record(
            objects::INDIVIDUAL,
            StoredRecord {
                id: individual_id.clone(),
                fields: individual_fields,
                late_fields: Vec::new(),
                ready_at,
            },
        );

        for (channel, purpose) in &simulation.consent_channels {
            let consent_id = self.next_id(objects::CONSENT_RECORD);
            let mut consent_fields = RecordPayload::new();
            consent_fields.insert(fields::PARTY_ID.to_string(), FieldValue::text(&individual_id));
            consent_fields.insert(fields::CHANNEL_NAME.to_string(), FieldValue::text(channel));
            consent_fields.insert(fields::PURPOSE_NAME.to_string(), FieldValue::text(purpose));
            consent_fields.insert(
                fields::PRIVACY_CONSENT_STATUS.to_string(),
                FieldValue::text(consent::STATUS_OPT_OUT),
            );
            self.push_record(
                objects::CONSENT_RECORD,
                StoredRecord {
                    id: consent_id,
                    fields: consent_fields,
                    late_fields: Vec::new(),
                    ready_at,
                },
            );
        }

        if let Some(account) = self.find_mut(objects::PERSON_ACCOUNT, account_id) {
            account.late_fields.push((
                fields::PERSON_INDIVIDUAL_ID.to_string(),
                FieldValue::text(&individual_id),
                ready_at,
            ));
            account.late_fields.push((
                fields::PERSON_CONTACT_ID.to_string(),
                FieldValue::text(&contact_id),
                ready_at,
            ));
        }
    }
}

/// In-memory CRM backend for tests and offline scenario dry runs.
///
/// Records every backend call in a journal, simulates person-account
/// post-save automation with a configurable visibility delay, and can
/// script transport failures and per-record save failures.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables derived-record simulation for person-account inserts.
    pub fn with_person_accounts(self, simulation: PersonAccountSimulation) -> Self {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .simulation = Some(simulation);
        self
    }

    /// Makes the next `count` bulk calls fail at the transport level.
    pub fn fail_next_bulk_calls(&self, count: usize) {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .fail_bulk_calls = count;
    }

    /// Makes the next `count` lookup queries fail at the transport level.
    pub fn fail_next_queries(&self, count: usize) {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .fail_query_calls = count;
    }

    /// Makes inserts of payloads with any of these `Name`s report
    /// per-record failure.
    pub fn fail_records_named(&self, names: &[&str]) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .failing_names
            .extend(names.iter().map(|name| name.to_string()));
    }

    /// Seeds a record directly, bypassing the call journal and simulation.
    pub fn preload(&self, object: &str, payload: RecordPayload) -> RemoteId {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let id = inner.next_id(object);
        inner.push_record(
            object,
            StoredRecord {
                id: id.clone(),
                fields: payload,
                late_fields: Vec::new(),
                ready_at: 0,
            },
        );
        id
    }

    /// Snapshot of the call journal.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.inner.lock().expect("store mutex poisoned").calls.clone()
    }

    /// Snapshot of one object's records with all late fields applied,
    /// regardless of the query clock.
    pub fn stored(&self, object: &str) -> Vec<(RemoteId, RecordPayload)> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .tables
            .get(object)
            .map(|table| {
                table
                    .iter()
                    .map(|record| (record.id.clone(), record.view_at(u64::MAX)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn count(&self, object: &str) -> usize {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.tables.get(object).map(Vec::len).unwrap_or(0)
    }
}

impl RemoteStore for InMemoryStore {
    fn query(
        &self,
        object: &str,
        filter: &QueryFilter,
        fields: &[&str],
    ) -> Result<Vec<RemoteRecord>, FactoryError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.query_clock += 1;
        let clock = inner.query_clock;
        inner.calls.push(CallRecord {
            object: object.to_string(),
            kind: CallKind::Query,
            size: filter.len(),
        });
        if inner.fail_query_calls > 0 {
            inner.fail_query_calls -= 1;
            return Err(FactoryError::Store {
                object: object.to_string(),
                operation: "query".to_string(),
                reason: "scripted transport failure".to_string(),
            });
        }

        let Some(table) = inner.tables.get(object) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for record in table {
            if record.ready_at > clock {
                continue;
            }
            let view = record.view_at(clock);
            if !filter.matches(&record.id, &view) {
                continue;
            }
            let mut projected = IndexMap::new();
            for field in fields {
                if *field == crate::constants::fields::ID {
                    continue;
                }
                if let Some(text) = view.get(*field).and_then(FieldValue::render) {
                    projected.insert(field.to_string(), text);
                }
            }
            out.push(RemoteRecord {
                id: record.id.clone(),
                fields: projected,
            });
        }
        Ok(out)
    }

    fn insert(
        &self,
        object: &str,
        records: &[RecordPayload],
    ) -> Result<Vec<SaveResult>, FactoryError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.calls.push(CallRecord {
            object: object.to_string(),
            kind: CallKind::Insert,
            size: records.len(),
        });
        if let Some(err) = inner.take_bulk_failure(object, "insert") {
            return Err(err);
        }

        let mut results = Vec::with_capacity(records.len());
        for payload in records {
            let name = payload
                .get(fields::NAME)
                .and_then(FieldValue::as_text)
                .unwrap_or_default();
            if inner.failing_names.iter().any(|failing| failing == name) {
                results.push(SaveResult::failed(format!(
                    "scripted save failure for '{name}'"
                )));
                continue;
            }
            let id = inner.next_id(object);
            inner.push_record(
                object,
                StoredRecord {
                    id: id.clone(),
                    fields: payload.clone(),
                    late_fields: Vec::new(),
                    ready_at: 0,
                },
            );
            if object == objects::PERSON_ACCOUNT {
                inner.simulate_person_account(&id);
            }
            results.push(SaveResult::ok(id));
        }
        Ok(results)
    }

    fn update(
        &self,
        object: &str,
        records: &[RecordPayload],
    ) -> Result<Vec<SaveResult>, FactoryError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.calls.push(CallRecord {
            object: object.to_string(),
            kind: CallKind::Update,
            size: records.len(),
        });
        if let Some(err) = inner.take_bulk_failure(object, "update") {
            return Err(err);
        }

        let mut results = Vec::with_capacity(records.len());
        for payload in records {
            let Some(id) = payload.get(fields::ID).and_then(FieldValue::as_text) else {
                results.push(SaveResult::failed("update payload missing Id"));
                continue;
            };
            let id = id.to_string();
            match inner.find_mut(object, &id) {
                Some(record) => {
                    for (name, value) in payload {
                        if name != fields::ID {
                            record.fields.insert(name.clone(), value.clone());
                        }
                    }
                    results.push(SaveResult::ok(id));
                }
                None => results.push(SaveResult::failed(format!("no {object} record '{id}'"))),
            }
        }
        Ok(results)
    }

    fn delete(&self, object: &str, ids: &[RemoteId]) -> Result<Vec<SaveResult>, FactoryError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.calls.push(CallRecord {
            object: object.to_string(),
            kind: CallKind::Delete,
            size: ids.len(),
        });
        if let Some(err) = inner.take_bulk_failure(object, "delete") {
            return Err(err);
        }

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let table = inner.tables.entry(object.to_string()).or_default();
            let before = table.len();
            table.retain(|record| record.id != *id);
            if table.len() < before {
                results.push(SaveResult::ok(id.clone()));
            } else {
                results.push(SaveResult::failed(format!("no {object} record '{id}'")));
            }
        }
        Ok(results)
    }
}
