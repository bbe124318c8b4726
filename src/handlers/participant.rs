use tracing::{error, info};

use crate::constants::{fields, objects};
use crate::executor::{BatchItem, Operation};
use crate::factory::RunContext;
use crate::row::{FieldValue, RecordPayload};
use crate::store::{RemoteStore, SaveResult};

use super::{capture_return_fields, ObjectHandler};

/// Ownership-participant strategy. A backend trigger forces the ownership
/// flag false on insert, so every record whose payload asked for `true`
/// is updated right back after the insert lands.
pub struct ParticipantHandler;

impl ObjectHandler for ParticipantHandler {
    fn object(&self) -> &str {
        objects::PARTICIPANT
    }

    fn immutable_fields(&self) -> &[&str] {
        &[fields::ASSET_ID, fields::VEHICLE_ID, fields::ACCOUNT_ID]
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
        if op != Operation::Insert {
            return;
        }

        let fixes: Vec<RecordPayload> = items
            .iter()
            .zip(results)
            .filter(|(item, result)| {
                result.success
                    && item
                        .payload
                        .get(fields::IS_OWNERSHIP)
                        .and_then(FieldValue::as_bool)
                        .unwrap_or(false)
            })
            .map(|(_, result)| {
                let mut payload = RecordPayload::new();
                payload.insert(fields::ID.to_string(), FieldValue::text(&result.id));
                payload.insert(fields::IS_OWNERSHIP.to_string(), FieldValue::Bool(true));
                payload
            })
            .collect();
        if fixes.is_empty() {
            return;
        }

        info!(
            records = fixes.len(),
            "restoring ownership flags reset by the insert trigger"
        );
        match store.update(self.object(), &fixes) {
            Ok(results) => {
                let restored = results.iter().filter(|result| result.success).count();
                info!(restored, total = results.len(), "ownership flags restored");
            }
            Err(err) => error!(error = %err, "ownership restore failed"),
        }
    }
}
