use std::collections::VecDeque;
use std::path::Path;

use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::constants::fields;
use crate::errors::FactoryError;
use crate::executor::{self, BatchItem, Operation};
use crate::handlers::handler_for;
use crate::keymap::KeyMap;
use crate::matcher::{self, MatchMode};
use crate::row::{FieldValue, RowParser};
use crate::scenario::{self, SortOrder};
use crate::store::RemoteStore;
use crate::types::{ObjectName, RemoteId};

/// Record of everything a run created, most recent first.
#[derive(Debug, Default, Clone)]
pub struct CreationLog {
    entries: VecDeque<(ObjectName, RemoteId)>,
}

impl CreationLog {
    pub fn record(&mut self, object: impl Into<ObjectName>, id: impl Into<RemoteId>) {
        self.entries.push_front((object.into(), id.into()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &(ObjectName, RemoteId)> {
        self.entries.iter()
    }
}

/// Mutable state one engine run threads through parsing, batching, and
/// handler hooks: the alias registry and the creation log.
#[derive(Debug, Default)]
pub struct RunContext {
    pub keys: KeyMap,
    pub created: CreationLog,
}

/// Scenario engine: seeds, upserts, and tears down fixture records in a
/// remote store from CSV scenario directories.
///
/// All work is synchronous and single-threaded; files run strictly in
/// filename order so cross-file references resolve through the key map.
pub struct DataFactory<S> {
    store: S,
    parser: RowParser,
    ctx: RunContext,
}

impl<S: RemoteStore> DataFactory<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            parser: RowParser::new(),
            ctx: RunContext::default(),
        }
    }

    /// Pins the reference date used for `__date` offset resolution.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.parser = self.parser.with_today(today);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn keys(&self) -> &KeyMap {
        &self.ctx.keys
    }

    pub fn created(&self) -> &CreationLog {
        &self.ctx.created
    }

    /// Seeds (or, with `upsert`, reconciles) the records of one CSV file
    /// against `object`.
    pub fn process_csv(
        &mut self,
        object: &str,
        path: &Path,
        upsert: bool,
    ) -> Result<(), FactoryError> {
        let rows = scenario::read_rows(path)?;
        let mode = if upsert { "upsert" } else { "insert" };
        info!(object, file = %path.display(), mode, "processing scenario file");

        let mut items: Vec<BatchItem> = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            let Some(parsed) = self.parser.parse(row, &self.ctx.keys) else {
                continue;
            };
            // Alias-only rows carry nothing to send; they only matter for
            // teardown matching.
            if parsed.payload.is_empty() {
                continue;
            }
            items.push(BatchItem {
                payload: parsed.payload,
                alias: parsed.alias,
                raw: parsed.raw,
                row: index + 1,
            });
        }
        if items.is_empty() {
            warn!(object, file = %path.display(), "no records to process");
            return Ok(());
        }

        let handler = handler_for(object);
        if upsert {
            let split = matcher::classify(&self.store, object, items, &mut self.ctx.keys);
            if !split.updates.is_empty() {
                executor::send_batch(
                    &self.store,
                    &mut self.ctx,
                    handler.as_ref(),
                    split.updates,
                    Operation::Update,
                );
            }
            if !split.inserts.is_empty() {
                executor::send_batch(
                    &self.store,
                    &mut self.ctx,
                    handler.as_ref(),
                    split.inserts,
                    Operation::Insert,
                );
            }
        } else {
            executor::send_batch(
                &self.store,
                &mut self.ctx,
                handler.as_ref(),
                items,
                Operation::Insert,
            );
        }
        Ok(())
    }

    /// Runs every CSV file of a scenario directory in ascending filename
    /// order. `upsert` forces upsert mode for the whole run; files whose
    /// stem ends in `_update` get it individually.
    pub fn run_scenario(&mut self, dir: &Path, upsert: bool) -> Result<(), FactoryError> {
        let files = scenario::scenario_files(dir, SortOrder::Ascending)?;
        info!(scenario = %dir.display(), files = files.len(), "starting scenario");
        if files.is_empty() {
            warn!(scenario = %dir.display(), "no scenario files found");
            return Ok(());
        }
        for file in files {
            let object = scenario::object_name_from_file(&file);
            let use_upsert = upsert || scenario::is_update_file(&file);
            if let Err(err) = self.process_csv(&object, &file, use_upsert) {
                error!(
                    %object,
                    file = %file.display(),
                    error = %err,
                    "scenario file failed; moving on"
                );
            }
        }
        Ok(())
    }

    /// Tears down everything a scenario's files describe, in descending
    /// filename order so dependents go before the records they reference.
    pub fn cleanup_scenario(&mut self, dir: &Path) -> Result<(), FactoryError> {
        let files = scenario::scenario_files(dir, SortOrder::Descending)?;
        info!(scenario = %dir.display(), files = files.len(), "starting scenario cleanup");
        if files.is_empty() {
            warn!(scenario = %dir.display(), "no scenario files found");
            return Ok(());
        }
        for file in files {
            let object = scenario::object_name_from_file(&file);
            if let Err(err) = self.cleanup_file(&object, &file) {
                error!(
                    %object,
                    file = %file.display(),
                    error = %err,
                    "cleanup file failed; moving on"
                );
            }
        }
        Ok(())
    }

    /// Deletes the records one scenario file describes. Rows with a payload
    /// `Name` match exactly; rows with only an alias match fuzzily.
    fn cleanup_file(&mut self, object: &str, path: &Path) -> Result<(), FactoryError> {
        let rows = scenario::read_rows(path)?;
        let mut exact_names: Vec<String> = Vec::new();
        let mut fuzzy_names: Vec<String> = Vec::new();
        for row in &rows {
            let Some(parsed) = self.parser.parse(row, &self.ctx.keys) else {
                continue;
            };
            if let Some(name) = parsed
                .payload
                .get(fields::NAME)
                .and_then(FieldValue::as_text)
            {
                exact_names.push(name.to_string());
            } else if let Some(alias) = parsed.alias {
                fuzzy_names.push(alias);
            }
        }
        if exact_names.is_empty() && fuzzy_names.is_empty() {
            warn!(object, file = %path.display(), "no names or aliases to delete by");
            return Ok(());
        }

        let mut ids: Vec<RemoteId> = Vec::new();
        if !fuzzy_names.is_empty() {
            let found =
                matcher::find_existing(&self.store, object, &fuzzy_names, MatchMode::Contains);
            for (_, id) in found {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        if !exact_names.is_empty() {
            let found = matcher::find_existing(&self.store, object, &exact_names, MatchMode::Exact);
            for (_, id) in found {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        if ids.is_empty() {
            info!(object, file = %path.display(), "no matching records to delete");
            return Ok(());
        }
        handler_for(object).delete(&self.store, &ids);
        Ok(())
    }

    /// Deletes every `object` record whose name contains `pattern`, with
    /// the object's cascade rules applied.
    pub fn delete_by_pattern(&mut self, object: &str, pattern: &str) {
        info!(object, pattern, "deleting records by pattern");
        let existing = matcher::find_existing(
            &self.store,
            object,
            &[pattern.to_string()],
            MatchMode::Contains,
        );
        if existing.is_empty() {
            info!(object, pattern, "no matching records found");
            return;
        }
        let ids: Vec<RemoteId> = existing.into_values().collect();
        handler_for(object).delete(&self.store, &ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    use crate::store::{InMemoryStore, PersonAccountSimulation};

    fn scenario_dir(files: &[(&str, &str)]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        let path = dir.path().to_path_buf();
        (dir, path)
    }

    fn factory() -> DataFactory<InMemoryStore> {
        let store =
            InMemoryStore::new().with_person_accounts(PersonAccountSimulation::default());
        DataFactory::new(store)
    }

    #[test]
    fn files_run_in_ascending_order_and_references_resolve_across_them() {
        let (_guard, dir) = scenario_dir(&[
            (
                "01_Account.csv",
                "_BaseName,Name\nAcc1,QA_Fixture_Account\n",
            ),
            (
                "02_Vehicle.csv",
                "_BaseName,Name,_Ref:AccountId\nVeh1,QA_Fixture_Vehicle,Acc1\n",
            ),
        ]);
        let mut factory = factory();
        factory.run_scenario(&dir, false).unwrap();

        let account_id = factory.keys().get("Acc1").unwrap().to_string();
        let vehicles = factory.store().stored("Vehicle");
        assert_eq!(vehicles.len(), 1);
        assert_eq!(
            vehicles[0].1.get("AccountId"),
            Some(&FieldValue::text(&account_id))
        );
        // Creation log is most recent first.
        let objects: Vec<&str> = factory
            .created()
            .iter()
            .map(|(object, _)| object.as_str())
            .collect();
        assert_eq!(objects, vec!["Vehicle", "Account"]);
    }

    #[test]
    fn update_suffix_files_upsert_instead_of_inserting() {
        let (_guard, dir) = scenario_dir(&[(
            "01_Product2_update.csv",
            "_BaseName,Name,Family\nProd1,Warranty Plan,Services\n",
        )]);
        let mut factory = factory();
        let existing = factory.store().preload(
            "Product2",
            [("Name".to_string(), FieldValue::text("Warranty Plan"))]
                .into_iter()
                .collect(),
        );

        factory.run_scenario(&dir, false).unwrap();

        assert_eq!(factory.store().count("Product2"), 1);
        assert_eq!(factory.keys().get("Prod1"), Some(existing.as_str()));
        let records = factory.store().stored("Product2");
        assert_eq!(
            records[0].1.get("Family"),
            Some(&FieldValue::text("Services"))
        );
        assert!(factory.created().is_empty());
    }

    #[test]
    fn global_upsert_flag_applies_to_every_file() {
        let (_guard, dir) = scenario_dir(&[(
            "01_Product2.csv",
            "_BaseName,Name\nProd1,Warranty Plan\n",
        )]);
        let mut factory = factory();
        factory.store().preload(
            "Product2",
            [("Name".to_string(), FieldValue::text("Warranty Plan"))]
                .into_iter()
                .collect(),
        );

        factory.run_scenario(&dir, true).unwrap();

        assert_eq!(factory.store().count("Product2"), 1);
    }

    #[test]
    fn unreadable_files_are_skipped_and_the_run_continues() {
        let (_guard, dir) = scenario_dir(&[("02_Product2.csv", "Name\nGood Plan\n")]);
        fs::write(dir.join("01_Broken.csv"), b"Name\n\xff\xfe\n").unwrap();

        let mut factory = factory();
        factory.run_scenario(&dir, false).unwrap();

        assert_eq!(factory.store().count("Product2"), 1);
    }

    #[test]
    fn missing_scenario_directory_is_fatal() {
        let mut factory = factory();
        let err = factory
            .run_scenario(Path::new("/nonexistent/scenario"), false)
            .unwrap_err();
        assert!(matches!(err, FactoryError::ScenarioUnavailable { .. }));
    }

    #[test]
    fn cleanup_walks_files_in_reverse_and_empties_the_store() {
        let (_guard, dir) = scenario_dir(&[
            ("01_Account.csv", "_BaseName,Name\nAcc1,QA_Fixture_Account\n"),
            (
                "02_Vehicle.csv",
                "_BaseName,Name,_Ref:AccountId\nVeh1,QA_Fixture_Vehicle,Acc1\n",
            ),
        ]);
        let mut factory = factory();
        factory.run_scenario(&dir, false).unwrap();
        assert_eq!(factory.store().count("Account"), 1);
        assert_eq!(factory.store().count("Vehicle"), 1);

        factory.cleanup_scenario(&dir).unwrap();

        assert_eq!(factory.store().count("Account"), 0);
        assert_eq!(factory.store().count("Vehicle"), 0);
        assert_eq!(factory.store().count("Individual"), 0);
    }

    #[test]
    fn cleanup_matches_by_alias_when_rows_have_no_name() {
        let (_guard, dir) = scenario_dir(&[(
            "01_Product2.csv",
            "_BaseName,Name\nFixture_Plan,\n",
        )]);
        let mut factory = factory();
        factory.store().preload(
            "Product2",
            [("Name".to_string(), FieldValue::text("QA_Fixture_Plan_West"))]
                .into_iter()
                .collect(),
        );

        factory.cleanup_scenario(&dir).unwrap();

        assert_eq!(factory.store().count("Product2"), 0);
    }

    #[test]
    fn delete_by_pattern_uses_a_single_contains_query() {
        let mut factory = factory();
        factory.store().preload(
            "Product2",
            [("Name".to_string(), FieldValue::text("LostSale_A"))]
                .into_iter()
                .collect(),
        );
        factory.store().preload(
            "Product2",
            [("Name".to_string(), FieldValue::text("LostSale_B"))]
                .into_iter()
                .collect(),
        );
        factory.store().preload(
            "Product2",
            [("Name".to_string(), FieldValue::text("Keeper"))]
                .into_iter()
                .collect(),
        );

        factory.delete_by_pattern("Product2", "LostSale");

        assert_eq!(factory.store().count("Product2"), 1);
        let queries = factory
            .store()
            .calls()
            .iter()
            .filter(|call| call.kind == crate::store::CallKind::Query)
            .count();
        assert_eq!(queries, 1);
    }

    #[test]
    fn alias_only_rows_are_not_sent_to_the_store() {
        let (_guard, dir) = scenario_dir(&[(
            "01_Product2.csv",
            "_BaseName,Name\nGhost,\nReal,Real Plan\n",
        )]);
        let mut factory = factory();
        factory.run_scenario(&dir, false).unwrap();

        assert_eq!(factory.store().count("Product2"), 1);
    }
}
