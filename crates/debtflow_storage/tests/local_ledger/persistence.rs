#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use debtflow_contracts::ledger::{Amount, DebtRecord, DebtorName, Ledger, NameId, SavedName};
use debtflow_storage::LocalLedgerStore;

fn temp_store(tag: &str) -> (PathBuf, LocalLedgerStore) {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    let base = std::env::temp_dir().join(format!("debtflow-local-{tag}-{suffix}"));
    fs::create_dir_all(&base).unwrap();
    let store = LocalLedgerStore::for_dir(&base);
    (base, store)
}

fn amount(raw: &str) -> Amount {
    Amount::new(raw.parse().unwrap()).unwrap()
}

fn sample_ledger() -> Ledger {
    Ledger::from_parts(
        vec![
            DebtRecord::v1(DebtorName::new("Ali").unwrap(), amount("50")),
            DebtRecord::v1(DebtorName::new("Sara").unwrap(), amount("120.25")),
        ],
        vec![SavedName::v1(NameId::new("1700000000000").unwrap(), "Omar".to_string()).unwrap()],
    )
}

#[test]
fn at_local_01_save_load_roundtrip_is_semantically_equal() {
    let (base, store) = temp_store("roundtrip");
    let ledger = sample_ledger();
    store.save(&ledger).unwrap();
    let loaded = store.load();
    assert!(!loaded.recovered_from_corruption);
    assert_eq!(loaded.ledger, ledger);

    // save(load()) leaves the persisted bytes unchanged.
    let before = fs::read_to_string(store.records_path()).unwrap();
    store.save(&loaded.ledger).unwrap();
    let after = fs::read_to_string(store.records_path()).unwrap();
    assert_eq!(before, after);
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_local_02_missing_entries_load_empty_without_corruption_flag() {
    let (base, store) = temp_store("missing");
    let loaded = store.load();
    assert!(loaded.ledger.is_empty());
    assert!(!loaded.recovered_from_corruption);
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_local_03_clear_removes_both_entries_and_is_idempotent() {
    let (base, store) = temp_store("clear");
    store.save(&sample_ledger()).unwrap();
    store.clear().unwrap();
    assert!(!store.records_path().exists());
    assert!(!store.names_path().exists());
    store.clear().unwrap();
    assert!(store.load().ledger.is_empty());
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_local_04_entries_are_independent() {
    let (base, store) = temp_store("independent");
    store.save(&sample_ledger()).unwrap();
    fs::remove_file(store.names_path()).unwrap();
    let loaded = store.load();
    assert_eq!(loaded.ledger.records.len(), 2);
    assert!(loaded.ledger.names.is_empty());
    assert!(!loaded.recovered_from_corruption);
    fs::remove_dir_all(base).unwrap();
}
