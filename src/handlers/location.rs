use tracing::{error, info};

use crate::constants::{fields, objects};
use crate::row::{FieldValue, RecordPayload};
use crate::store::RemoteStore;
use crate::types::RemoteId;

use super::{dedup, delete_plain, ObjectHandler};

/// Location strategy: a location and its visitor address reference each
/// other, so the link is nulled out ahead of the delete. The orphaned
/// address then cascades on the backend side.
pub struct LocationHandler;

impl ObjectHandler for LocationHandler {
    fn object(&self) -> &str {
        objects::LOCATION
    }

    fn delete(&self, store: &dyn RemoteStore, ids: &[RemoteId]) {
        let unique = dedup(ids);
        if unique.is_empty() {
            return;
        }
        let unlink: Vec<RecordPayload> = unique
            .iter()
            .map(|id| {
                let mut payload = RecordPayload::new();
                payload.insert(fields::ID.to_string(), FieldValue::text(id));
                payload.insert(fields::VISITOR_ADDRESS_ID.to_string(), FieldValue::Null);
                payload
            })
            .collect();
        info!(
            records = unlink.len(),
            "detaching visitor addresses before delete"
        );
        if let Err(err) = store.update(self.object(), &unlink) {
            error!(error = %err, "visitor-address detach failed");
        }
        delete_plain(store, self.object(), &unique);
    }
}
