use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use fixture_factory::{
    CallKind, DataFactory, FieldValue, InMemoryStore, PersonAccountSimulation, RecordPayload,
};

fn write_scenario(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("scenario");
    fs::create_dir(&dir).unwrap();
    for (name, content) in files {
        fs::write(dir.join(name), content).unwrap();
    }
    (root, dir)
}

fn simulated_store() -> InMemoryStore {
    InMemoryStore::new().with_person_accounts(PersonAccountSimulation::default())
}

#[test]
fn existing_names_update_while_new_names_insert() {
    let (_root, dir) = write_scenario(&[(
        "01_Account.csv",
        "_BaseName,Name,Industry\nTestAcc1,ExistingAccount,Automotive\nTestAcc2,NewAccount,Retail\n",
    )]);
    let store = simulated_store();
    let mut seeded = RecordPayload::new();
    seeded.insert("Name".to_string(), FieldValue::text("ExistingAccount"));
    let existing_id = store.preload("Account", seeded);

    let mut factory = DataFactory::new(store);
    factory.run_scenario(&dir, true).unwrap();

    assert_eq!(factory.store().count("Account"), 2);
    assert_eq!(factory.keys().get("TestAcc1"), Some(existing_id.as_str()));

    let stored = factory.store().stored("Account");
    let existing = stored
        .iter()
        .find(|(id, _)| *id == existing_id)
        .map(|(_, payload)| payload)
        .unwrap();
    assert_eq!(
        existing.get("Industry").and_then(FieldValue::as_text),
        Some("Automotive")
    );

    // only the genuinely new record is remembered for teardown
    assert_eq!(factory.created().len(), 1);
    let (object, id) = factory.created().iter().next().unwrap();
    assert_eq!(object.as_str(), "Account");
    assert_ne!(id.as_str(), existing_id.as_str());
}

#[test]
fn update_suffix_files_patch_earlier_records_without_the_flag() {
    let (_root, dir) = write_scenario(&[
        ("01_Account.csv", "_BaseName,Name\nTestAcc1,TestAcc1 Smith\n"),
        (
            "02_Account_update.csv",
            "_BaseName,Name,Phone\nTestAcc1,TestAcc1 Smith,555-0101\n",
        ),
    ]);
    let mut factory = DataFactory::new(simulated_store());
    factory.run_scenario(&dir, false).unwrap();

    assert_eq!(factory.store().count("Account"), 1);
    let stored = factory.store().stored("Account");
    assert_eq!(
        stored[0].1.get("Phone").and_then(FieldValue::as_text),
        Some("555-0101")
    );
    assert_eq!(factory.created().len(), 1);
}

#[test]
fn person_account_batches_chunk_at_twenty() {
    let mut sheet = String::from("Name\n");
    for index in 1..=45 {
        writeln!(sheet, "BulkAcc{index:02}").unwrap();
    }
    let (_root, dir) = write_scenario(&[("01_Account.csv", sheet.as_str())]);

    let mut factory = DataFactory::new(simulated_store());
    factory.run_scenario(&dir, false).unwrap();

    assert_eq!(factory.store().count("Account"), 45);
    assert_eq!(factory.created().len(), 45);
    let insert_sizes: Vec<usize> = factory
        .store()
        .calls()
        .into_iter()
        .filter(|call| call.kind == CallKind::Insert && call.object == "Account")
        .map(|call| call.size)
        .collect();
    assert_eq!(insert_sizes, vec![20, 20, 5]);
}
