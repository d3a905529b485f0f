#![forbid(unsafe_code)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use debtflow_contracts::ledger::{DebtRecord, Ledger, SavedName};
use debtflow_contracts::Validate;

/// Persisted entry for debt records, a JSON array of
/// `{id, debtor_name, amount}`.
pub const RECORDS_ENTRY: &str = "debt-manager-records.json";
/// Persisted entry for saved names, a JSON array of `{id, name}`.
pub const NAMES_ENTRY: &str = "debt-manager-local-names.json";

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Json(err) => write!(f, "json error: {err}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Result of a local load. Corruption never reaches the caller as an
/// error: a damaged entry is replaced by its empty section and flagged
/// so the UI can surface a notice.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadedLedger {
    pub ledger: Ledger,
    pub recovered_from_corruption: bool,
}

/// Device-local ledger store: two independent JSON entries under one
/// directory, owned by the device rather than any authenticated user.
#[derive(Debug, Clone)]
pub struct LocalLedgerStore {
    records_path: PathBuf,
    names_path: PathBuf,
}

impl LocalLedgerStore {
    pub fn default_local() -> Self {
        Self::for_dir(&default_store_dir())
    }

    pub fn for_dir(dir: &Path) -> Self {
        Self {
            records_path: dir.join(RECORDS_ENTRY),
            names_path: dir.join(NAMES_ENTRY),
        }
    }

    pub fn records_path(&self) -> &Path {
        &self.records_path
    }

    pub fn names_path(&self) -> &Path {
        &self.names_path
    }

    /// Reads both entries. Missing files yield empty sections; unreadable
    /// or invalid content is swallowed into an empty section with the
    /// corruption flag set.
    pub fn load(&self) -> LoadedLedger {
        let (records, records_corrupt) = read_entry::<DebtRecord>(&self.records_path);
        let (names, names_corrupt) = read_entry::<SavedName>(&self.names_path);
        let ledger = Ledger::from_parts(records, names);
        let recovered = records_corrupt || names_corrupt || ledger.validate().is_err();
        let ledger = if ledger.validate().is_err() {
            Ledger::default()
        } else {
            ledger
        };
        LoadedLedger {
            ledger,
            recovered_from_corruption: recovered,
        }
    }

    /// Overwrites both entries. Each entry is written to a temp file and
    /// renamed into place so a write applies atomically or not at all.
    pub fn save(&self, ledger: &Ledger) -> Result<(), StorageError> {
        let records: Vec<&DebtRecord> = ledger.records.values().collect();
        write_entry(&self.records_path, &serde_json::to_string(&records)?)?;
        write_entry(&self.names_path, &serde_json::to_string(&ledger.names)?)?;
        Ok(())
    }

    /// Removes both entries. Called after a successful sign-in merge;
    /// idempotent, missing entries are fine.
    pub fn clear(&self) -> Result<(), StorageError> {
        remove_entry(&self.records_path)?;
        remove_entry(&self.names_path)?;
        Ok(())
    }
}

fn default_store_dir() -> PathBuf {
    if let Some(dir) = env::var_os("DEBTFLOW_LOCAL_STORE_DIR") {
        return PathBuf::from(dir);
    }
    match env::var_os("HOME") {
        Some(home) => Path::new(&home).join(".debtflow"),
        None => PathBuf::from(".debtflow"),
    }
}

fn read_entry<T>(path: &Path) -> (Vec<T>, bool)
where
    T: serde::de::DeserializeOwned,
{
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return (Vec::new(), false),
        Err(_) => return (Vec::new(), true),
    };
    match serde_json::from_str::<Vec<T>>(&raw) {
        Ok(rows) => (rows, false),
        Err(_) => (Vec::new(), true),
    }
}

fn write_entry(path: &Path, body: &str) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.to_path_buf();
    tmp.set_extension("json.tmp");
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_entry(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StorageError::Io(err)),
    }
}
