#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use debtflow_contracts::ledger::{Amount, DebtRecord, DebtorName, Ledger};
use debtflow_storage::LocalLedgerStore;

fn temp_store(tag: &str) -> (PathBuf, LocalLedgerStore) {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    let base = std::env::temp_dir().join(format!("debtflow-corrupt-{tag}-{suffix}"));
    fs::create_dir_all(&base).unwrap();
    let store = LocalLedgerStore::for_dir(&base);
    (base, store)
}

#[test]
fn at_corrupt_01_invalid_json_loads_empty_with_flag() {
    let (base, store) = temp_store("syntax");
    fs::write(store.records_path(), "{not json").unwrap();
    let loaded = store.load();
    assert!(loaded.ledger.records.is_empty());
    assert!(loaded.recovered_from_corruption);
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_corrupt_02_only_damaged_entry_is_dropped() {
    let (base, store) = temp_store("partial");
    let ledger = Ledger::from_parts(
        vec![DebtRecord::v1(
            DebtorName::new("Ali").unwrap(),
            Amount::new("50".parse().unwrap()).unwrap(),
        )],
        Vec::new(),
    );
    store.save(&ledger).unwrap();
    fs::write(store.names_path(), "[[[").unwrap();
    let loaded = store.load();
    assert_eq!(loaded.ledger.records.len(), 1);
    assert!(loaded.ledger.names.is_empty());
    assert!(loaded.recovered_from_corruption);
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_corrupt_03_contract_violating_rows_are_treated_as_corruption() {
    let (base, store) = temp_store("contract");
    // Well-formed JSON, but a zero amount violates the record invariant.
    fs::write(
        store.records_path(),
        r#"[{"id":"Ali","debtor_name":"Ali","amount":0}]"#,
    )
    .unwrap();
    let loaded = store.load();
    assert!(loaded.ledger.is_empty());
    assert!(loaded.recovered_from_corruption);
    fs::remove_dir_all(base).unwrap();
}
