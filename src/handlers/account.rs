use indexmap::IndexMap;
use tracing::{error, info, warn};

use crate::constants::{bulk, consent, directives, fields, objects, poll};
use crate::executor::{BatchItem, Operation};
use crate::factory::RunContext;
use crate::row::{FieldValue, FixtureRow, RecordPayload};
use crate::store::{QueryFilter, RemoteRecord, RemoteStore, SaveResult};
use crate::types::{Alias, RemoteId};

use super::{capture_return_fields, child_record_ids, delete_plain, field_values, ObjectHandler};

/// Person-account strategy.
///
/// Inserts are chunked by the executor; this handler owns the cascade
/// delete and the post-save automation that person accounts trigger on the
/// backend: capturing the derived contact id and aligning the generated
/// consent records with the row's consent directives.
pub struct AccountHandler;

impl ObjectHandler for AccountHandler {
    fn object(&self) -> &str {
        objects::PERSON_ACCOUNT
    }

    /// Cascade delete. Consent records reference the individual, not the
    /// account, so they are resolved through the linked individuals and
    /// removed first; the account goes next, the individuals last.
    fn delete(&self, store: &dyn RemoteStore, ids: &[RemoteId]) {
        if ids.is_empty() {
            return;
        }
        let individual_ids =
            field_values(store, self.object(), ids, fields::PERSON_INDIVIDUAL_ID);
        let consent_ids = child_record_ids(
            store,
            objects::CONSENT_RECORD,
            fields::PARTY_ID,
            &individual_ids,
        );

        if !consent_ids.is_empty() {
            info!(
                records = consent_ids.len(),
                "cascade deleting linked consent records"
            );
            delete_plain(store, objects::CONSENT_RECORD, &consent_ids);
        }
        delete_plain(store, self.object(), ids);
        if !individual_ids.is_empty() {
            info!(
                records = individual_ids.len(),
                "cascade deleting linked individuals"
            );
            delete_plain(store, objects::INDIVIDUAL, &individual_ids);
        }
    }

    fn after_batch(
        &self,
        store: &dyn RemoteStore,
        ctx: &mut RunContext,
        items: &[BatchItem],
        results: &[SaveResult],
        op: Operation,
    ) {
        capture_return_fields(store, ctx, self.object(), items, results);
        if op == Operation::Insert {
            capture_contact_ids(store, ctx, items, results);
        }
        manage_consents(store, items, results);
    }
}

/// Polls for the server-populated contact id of each new account and
/// records it under `alias.PersonContactId`.
fn capture_contact_ids(
    store: &dyn RemoteStore,
    ctx: &mut RunContext,
    items: &[BatchItem],
    results: &[SaveResult],
) {
    let mut targets: Vec<RemoteId> = Vec::new();
    let mut alias_by_id: IndexMap<RemoteId, Alias> = IndexMap::new();
    for (item, result) in items.iter().zip(results) {
        if result.success {
            targets.push(result.id.clone());
            if let Some(alias) = item.alias.as_deref() {
                alias_by_id.insert(result.id.clone(), alias.to_string());
            }
        }
    }
    if targets.is_empty() {
        return;
    }
    info!(records = targets.len(), "capturing person contact ids");

    let outcome = poll::CONTACT_ID.run("person-contact-id", &targets, |missing| {
        let mut found: IndexMap<RemoteId, String> = IndexMap::new();
        for chunk in missing.chunks(bulk::ID_QUERY_CHUNK) {
            match store.query(
                objects::PERSON_ACCOUNT,
                &QueryFilter::IdIn(chunk.to_vec()),
                &[fields::PERSON_CONTACT_ID],
            ) {
                Ok(records) => {
                    for record in records {
                        if let Some(contact_id) = record.field(fields::PERSON_CONTACT_ID) {
                            if !contact_id.is_empty() {
                                found.insert(record.id.clone(), contact_id.to_string());
                            }
                        }
                    }
                }
                Err(err) => warn!(error = %err, "person-contact-id lookup failed"),
            }
        }
        found
    });

    let mut captured = 0;
    for (account_id, contact_id) in &outcome.found {
        if let Some(alias) = alias_by_id.get(account_id) {
            ctx.keys.set_field(alias, fields::PERSON_CONTACT_ID, contact_id);
            captured += 1;
        }
    }
    info!(captured, "person contact ids captured");
}

/// Aligns backend-generated consent records with the batch's consent
/// directive columns. Runs only when the batch's rows carry any of them.
///
/// Phase one resolves the individual linked to each saved account and
/// applies the requested solicitation opt-outs. Phase two resolves the
/// consent records behind each individual, computes the target status per
/// record, and bulk-updates the ones that need changing.
fn manage_consents(store: &dyn RemoteStore, items: &[BatchItem], results: &[SaveResult]) {
    let Some(first) = items.first() else {
        return;
    };
    let has_consent_columns = [
        consent::OPT_OUT_SOLICIT_COLUMN,
        consent::EMAIL_CONSENT_COLUMN,
        consent::SMS_CONSENT_COLUMN,
    ]
    .iter()
    .any(|column| first.raw.contains_key(*column));
    if !has_consent_columns {
        return;
    }

    let mut row_by_account: IndexMap<RemoteId, &FixtureRow> = IndexMap::new();
    for (item, result) in items.iter().zip(results) {
        if result.success {
            row_by_account.insert(result.id.clone(), &item.raw);
        }
    }
    if row_by_account.is_empty() {
        return;
    }
    info!(accounts = row_by_account.len(), "managing consent records");

    // Phase one: the individuals linked to the accounts.
    let account_ids: Vec<RemoteId> = row_by_account.keys().cloned().collect();
    let linkage = poll::INDIVIDUAL.run("individual-linkage", &account_ids, |missing| {
        let mut found: IndexMap<RemoteId, RemoteId> = IndexMap::new();
        for chunk in missing.chunks(bulk::ID_QUERY_CHUNK) {
            match store.query(
                objects::PERSON_ACCOUNT,
                &QueryFilter::IdIn(chunk.to_vec()),
                &[fields::PERSON_INDIVIDUAL_ID],
            ) {
                Ok(records) => {
                    for record in records {
                        if let Some(individual_id) = record.field(fields::PERSON_INDIVIDUAL_ID) {
                            if !individual_id.is_empty() {
                                found.insert(record.id.clone(), individual_id.to_string());
                            }
                        }
                    }
                }
                Err(err) => warn!(error = %err, "individual-linkage lookup failed"),
            }
        }
        found
    });
    let account_to_individual = linkage.found;
    if account_to_individual.is_empty() {
        error!("no linked individuals found; skipping consent management");
        return;
    }

    let mut individual_updates: Vec<RecordPayload> = Vec::new();
    for (account_id, individual_id) in &account_to_individual {
        let Some(row) = row_by_account.get(account_id) else {
            continue;
        };
        let opted_out = row
            .get(consent::OPT_OUT_SOLICIT_COLUMN)
            .map(|cell| cell.eq_ignore_ascii_case(directives::BOOL_TRUE))
            .unwrap_or(false);
        if opted_out {
            let mut update = RecordPayload::new();
            update.insert(fields::ID.to_string(), FieldValue::text(individual_id));
            update.insert(
                fields::HAS_OPTED_OUT_SOLICIT.to_string(),
                FieldValue::Bool(true),
            );
            individual_updates.push(update);
        }
    }
    if !individual_updates.is_empty() {
        info!(
            records = individual_updates.len(),
            "applying solicitation opt-outs"
        );
        if let Err(err) = store.update(objects::INDIVIDUAL, &individual_updates) {
            error!(error = %err, "solicitation opt-out update failed");
        }
    }

    // Phase two: the consent records behind each individual.
    let individual_ids: Vec<RemoteId> = account_to_individual.values().cloned().collect();
    let consents = poll::CONSENT.run("consent-records", &individual_ids, |missing| {
        let mut found: IndexMap<RemoteId, Vec<RemoteRecord>> = IndexMap::new();
        for chunk in missing.chunks(bulk::ID_QUERY_CHUNK) {
            match store.query(
                objects::CONSENT_RECORD,
                &QueryFilter::FieldIn(fields::PARTY_ID.to_string(), chunk.to_vec()),
                &[
                    fields::PARTY_ID,
                    fields::CHANNEL_NAME,
                    fields::PURPOSE_NAME,
                    fields::PRIVACY_CONSENT_STATUS,
                ],
            ) {
                Ok(records) => {
                    for record in records {
                        let Some(party) = record.field(fields::PARTY_ID) else {
                            continue;
                        };
                        found.entry(party.to_string()).or_default().push(record);
                    }
                }
                Err(err) => warn!(error = %err, "consent-record lookup failed"),
            }
        }
        found
    });

    let individual_to_account: IndexMap<&str, &str> = account_to_individual
        .iter()
        .map(|(account, individual)| (individual.as_str(), account.as_str()))
        .collect();

    let mut consent_updates: Vec<RecordPayload> = Vec::new();
    let mut resolved = 0usize;
    for (individual_id, records) in &consents.found {
        let Some(account_id) = individual_to_account.get(individual_id.as_str()) else {
            continue;
        };
        let Some(row) = row_by_account.get(*account_id) else {
            continue;
        };
        resolved += records.len();
        for record in records {
            if let Some(update) = consent_update_for(row, record) {
                consent_updates.push(update);
            }
        }
    }
    info!(
        consents = resolved,
        updates = consent_updates.len(),
        "consent records resolved"
    );

    if !consent_updates.is_empty() {
        if let Err(err) = store.update(objects::CONSENT_RECORD, &consent_updates) {
            error!(error = %err, "consent update failed");
        }
    }
}

/// Computes the update one consent record needs, or `None` when the row
/// requests no action for its channel.
///
/// The target status comes from the `_DataUsePurpose_<Channel>:<Purpose>`
/// override column when present, otherwise from the per-channel fallback
/// column; known channels without a fallback cell default to opt-out, and
/// unknown channels without an override are left untouched. OptIn stamps
/// the row's resolved expiry date; OptOut clears it.
fn consent_update_for(row: &FixtureRow, record: &RemoteRecord) -> Option<RecordPayload> {
    let channel = record.field(fields::CHANNEL_NAME)?;
    let purpose = record.field(fields::PURPOSE_NAME);

    let cell = |column: &str| {
        row.get(column)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    };

    let mut status = purpose.and_then(|purpose| {
        cell(&format!(
            "{}{channel}:{purpose}",
            consent::PURPOSE_OVERRIDE_PREFIX
        ))
    });
    if status.is_none() {
        status = match channel {
            consent::CHANNEL_EMAIL => {
                Some(cell(consent::EMAIL_CONSENT_COLUMN).unwrap_or(consent::STATUS_OPT_OUT))
            }
            consent::CHANNEL_SMS => {
                Some(cell(consent::SMS_CONSENT_COLUMN).unwrap_or(consent::STATUS_OPT_OUT))
            }
            _ => None,
        };
    }
    let status = status?;

    let mut update = RecordPayload::new();
    update.insert(fields::ID.to_string(), FieldValue::text(&record.id));
    update.insert(
        fields::PRIVACY_CONSENT_STATUS.to_string(),
        FieldValue::text(status),
    );
    if status == consent::STATUS_OPT_IN {
        if let Some(expiry) = cell(directives::EFFECTIVE_TO_COLUMN) {
            update.insert(fields::EFFECTIVE_TO.to_string(), FieldValue::text(expiry));
        }
    } else if status == consent::STATUS_OPT_OUT {
        update.insert(fields::EFFECTIVE_TO.to_string(), FieldValue::Null);
    }
    Some(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CallKind, InMemoryStore, PersonAccountSimulation};

    fn simulated(channels: &[(&str, &str)]) -> InMemoryStore {
        InMemoryStore::new().with_person_accounts(PersonAccountSimulation {
            visibility_delay: 0,
            consent_channels: channels
                .iter()
                .map(|(channel, purpose)| (channel.to_string(), purpose.to_string()))
                .collect(),
        })
    }

    fn insert_accounts(store: &InMemoryStore, rows: &[&[(&str, &str)]]) -> (Vec<BatchItem>, Vec<SaveResult>) {
        let mut items = Vec::new();
        let mut payloads = Vec::new();
        for (index, cells) in rows.iter().enumerate() {
            let raw: FixtureRow = cells
                .iter()
                .map(|(column, cell)| (column.to_string(), cell.to_string()))
                .collect();
            let mut payload = RecordPayload::new();
            if let Some(name) = raw.get("Name") {
                payload.insert("Name".to_string(), FieldValue::text(name));
            }
            payloads.push(payload.clone());
            items.push(BatchItem {
                payload,
                alias: raw.get("_BaseName").cloned(),
                raw,
                row: index + 1,
            });
        }
        let results = store.insert("Account", &payloads).unwrap();
        (items, results)
    }

    fn record(fields: &[(&str, &str)]) -> RemoteRecord {
        RemoteRecord {
            id: "cptc-1".to_string(),
            fields: fields
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        }
    }

    fn row(cells: &[(&str, &str)]) -> FixtureRow {
        cells
            .iter()
            .map(|(column, cell)| (column.to_string(), cell.to_string()))
            .collect()
    }

    #[test]
    fn unknown_channel_without_override_is_left_untouched() {
        let update = consent_update_for(
            &row(&[("_EmailConsent", "OptIn")]),
            &record(&[("EngagementChannelType.Name", "Phone")]),
        );
        assert!(update.is_none());
    }

    #[test]
    fn consent_record_without_channel_is_left_untouched() {
        let update = consent_update_for(&row(&[("_EmailConsent", "OptIn")]), &record(&[]));
        assert!(update.is_none());
    }

    #[test]
    fn known_channel_without_cell_defaults_to_opt_out() {
        let update = consent_update_for(
            &row(&[("_EmailConsent", "OptIn")]),
            &record(&[("EngagementChannelType.Name", "SMS")]),
        )
        .unwrap();
        assert_eq!(
            update.get("PrivacyConsentStatus"),
            Some(&FieldValue::text("OptOut"))
        );
        assert_eq!(update.get("EffectiveTo"), Some(&FieldValue::Null));
    }

    #[test]
    fn opt_in_stamps_the_resolved_expiry_date() {
        let update = consent_update_for(
            &row(&[
                ("_EmailConsent", "OptIn"),
                ("_EffectiveTo__date", "2026-09-25"),
            ]),
            &record(&[("EngagementChannelType.Name", "Email")]),
        )
        .unwrap();
        assert_eq!(
            update.get("PrivacyConsentStatus"),
            Some(&FieldValue::text("OptIn"))
        );
        assert_eq!(
            update.get("EffectiveTo"),
            Some(&FieldValue::text("2026-09-25"))
        );
    }

    #[test]
    fn opt_in_without_expiry_leaves_effective_to_absent() {
        let update = consent_update_for(
            &row(&[("_EmailConsent", "OptIn")]),
            &record(&[("EngagementChannelType.Name", "Email")]),
        )
        .unwrap();
        assert!(!update.contains_key("EffectiveTo"));
    }

    #[test]
    fn purpose_override_beats_the_channel_fallback() {
        let update = consent_update_for(
            &row(&[
                ("_EmailConsent", "OptOut"),
                ("_DataUsePurpose_Email:Marketing", "OptIn"),
            ]),
            &record(&[
                ("EngagementChannelType.Name", "Email"),
                ("DataUsePurpose.Name", "Marketing"),
            ]),
        )
        .unwrap();
        assert_eq!(
            update.get("PrivacyConsentStatus"),
            Some(&FieldValue::text("OptIn"))
        );
    }

    #[test]
    fn contact_ids_are_captured_under_compound_keys() {
        let store = simulated(&[]);
        let (items, results) =
            insert_accounts(&store, &[&[("_BaseName", "Acc1"), ("Name", "QA_Acc1")]]);

        let mut ctx = RunContext::default();
        AccountHandler.after_batch(&store, &mut ctx, &items, &results, Operation::Insert);

        assert_eq!(
            ctx.keys.get_field("Acc1", "PersonContactId"),
            Some("Contact-00001")
        );
    }

    #[test]
    fn consent_directives_update_the_generated_records() {
        let store = simulated(&[("Email", "Marketing"), ("SMS", "Marketing")]);
        let (items, results) = insert_accounts(
            &store,
            &[&[
                ("_BaseName", "Acc1"),
                ("Name", "QA_Acc1"),
                ("_EmailConsent", "OptIn"),
                ("_EffectiveTo__date", "2026-09-25"),
            ]],
        );

        let mut ctx = RunContext::default();
        AccountHandler.after_batch(&store, &mut ctx, &items, &results, Operation::Insert);

        let consents = store.stored("ContactPointTypeConsent");
        let status_of = |channel: &str| {
            consents
                .iter()
                .find(|(_, fields)| {
                    fields.get("EngagementChannelType.Name")
                        == Some(&FieldValue::text(channel))
                })
                .and_then(|(_, fields)| fields.get("PrivacyConsentStatus").cloned())
        };
        assert_eq!(status_of("Email"), Some(FieldValue::text("OptIn")));
        // No SMS directive on the row: the SMS record falls back to opt-out.
        assert_eq!(status_of("SMS"), Some(FieldValue::text("OptOut")));

        let email = consents
            .iter()
            .find(|(_, fields)| {
                fields.get("EngagementChannelType.Name") == Some(&FieldValue::text("Email"))
            })
            .unwrap();
        assert_eq!(
            email.1.get("EffectiveTo"),
            Some(&FieldValue::text("2026-09-25"))
        );
    }

    #[test]
    fn solicitation_opt_out_updates_the_linked_individual() {
        let store = simulated(&[("Email", "Marketing")]);
        let (items, results) = insert_accounts(
            &store,
            &[
                &[
                    ("_BaseName", "Acc1"),
                    ("Name", "QA_Acc1"),
                    ("_HasOptedOutSolicit", "TRUE"),
                ],
                &[
                    ("_BaseName", "Acc2"),
                    ("Name", "QA_Acc2"),
                    ("_HasOptedOutSolicit", ""),
                ],
            ],
        );

        let mut ctx = RunContext::default();
        AccountHandler.after_batch(&store, &mut ctx, &items, &results, Operation::Insert);

        let individuals = store.stored("Individual");
        assert_eq!(
            individuals[0].1.get("HasOptedOutSolicit"),
            Some(&FieldValue::Bool(true))
        );
        assert_eq!(
            individuals[1].1.get("HasOptedOutSolicit"),
            Some(&FieldValue::Bool(false))
        );
    }

    #[test]
    fn rows_without_consent_columns_skip_consent_management() {
        let store = simulated(&[("Email", "Marketing")]);
        let (items, results) =
            insert_accounts(&store, &[&[("_BaseName", "Acc1"), ("Name", "QA_Acc1")]]);

        let mut ctx = RunContext::default();
        AccountHandler.after_batch(&store, &mut ctx, &items, &results, Operation::Insert);

        let consents = store.stored("ContactPointTypeConsent");
        assert_eq!(
            consents[0].1.get("PrivacyConsentStatus"),
            Some(&FieldValue::text("OptOut"))
        );
        let updates = store
            .calls()
            .iter()
            .filter(|call| call.kind == CallKind::Update)
            .count();
        assert_eq!(updates, 0);
    }

    #[test]
    fn delete_cascades_consents_then_account_then_individual() {
        let store = simulated(&[("Email", "Marketing")]);
        let (_, results) =
            insert_accounts(&store, &[&[("_BaseName", "Acc1"), ("Name", "QA_Acc1")]]);
        let account_id = results[0].id.clone();

        AccountHandler.delete(&store, &[account_id]);

        let deletes: Vec<String> = store
            .calls()
            .iter()
            .filter(|call| call.kind == CallKind::Delete)
            .map(|call| call.object.clone())
            .collect();
        assert_eq!(
            deletes,
            vec!["ContactPointTypeConsent", "Account", "Individual"]
        );
        assert_eq!(store.count("Account"), 0);
        assert_eq!(store.count("Individual"), 0);
        assert_eq!(store.count("ContactPointTypeConsent"), 0);
    }

    #[test]
    fn update_batches_skip_contact_id_capture() {
        let store = simulated(&[]);
        let (items, results) =
            insert_accounts(&store, &[&[("_BaseName", "Acc1"), ("Name", "QA_Acc1")]]);

        let mut ctx = RunContext::default();
        AccountHandler.after_batch(&store, &mut ctx, &items, &results, Operation::Update);

        assert_eq!(ctx.keys.get_field("Acc1", "PersonContactId"), None);
    }
}
