use tracing::info;

use crate::constants::{fields, objects};
use crate::store::RemoteStore;
use crate::types::RemoteId;

use super::{delete_plain, field_values, ObjectHandler};

/// Vehicle strategy: each vehicle owns an asset, which must go first on
/// delete.
pub struct VehicleHandler;

impl ObjectHandler for VehicleHandler {
    fn object(&self) -> &str {
        objects::VEHICLE
    }

    fn delete(&self, store: &dyn RemoteStore, ids: &[RemoteId]) {
        if ids.is_empty() {
            return;
        }
        let asset_ids = field_values(store, self.object(), ids, fields::ASSET_ID);
        if !asset_ids.is_empty() {
            info!(records = asset_ids.len(), "cascade deleting linked assets");
            delete_plain(store, objects::ASSET, &asset_ids);
        }
        delete_plain(store, self.object(), ids);
    }
}
