#![forbid(unsafe_code)]

pub mod local;

pub use local::{LoadedLedger, LocalLedgerStore, StorageError, NAMES_ENTRY, RECORDS_ENTRY};
