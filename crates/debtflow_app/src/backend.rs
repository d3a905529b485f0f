#![forbid(unsafe_code)]

use debtflow_contracts::auth::OwnerId;
use debtflow_contracts::ledger::{DebtRecord, DebtorName, Ledger, NameId, SavedName};
use debtflow_engines::remote_store::{RemoteStoreError, RemoteStoreRuntime, RemoteWrite};
use debtflow_storage::{LocalLedgerStore, StorageError};

#[derive(Debug)]
pub enum BackendError {
    Store(StorageError),
    Remote(RemoteStoreError),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "local store error: {err}"),
            Self::Remote(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<StorageError> for BackendError {
    fn from(value: StorageError) -> Self {
        Self::Store(value)
    }
}

impl From<RemoteStoreError> for BackendError {
    fn from(value: RemoteStoreError) -> Self {
        Self::Remote(value)
    }
}

/// The active-ledger interface both stores implement. Exactly one
/// backend serves reads and writes at a time, selected by sign-in state
/// and swapped atomically at sign-in/sign-out.
pub trait LedgerBackend {
    fn snapshot(&mut self) -> Result<Ledger, BackendError>;
    fn put_debt(&mut self, record: DebtRecord) -> Result<(), BackendError>;
    fn delete_debt(&mut self, id: &DebtorName) -> Result<(), BackendError>;
    fn put_name(&mut self, entry: SavedName) -> Result<(), BackendError>;
    fn delete_name(&mut self, id: &NameId) -> Result<(), BackendError>;
}

/// Narrow seam over the remote store so reconciliation and the remote
/// backend are testable with stubs.
pub trait RemoteLedgerApi {
    fn load_all(&self, owner: &OwnerId, token: &str) -> Result<Ledger, RemoteStoreError>;
    fn commit_batch(
        &self,
        owner: &OwnerId,
        token: &str,
        writes: &[RemoteWrite],
    ) -> Result<(), RemoteStoreError>;
    fn upsert_debt(
        &self,
        owner: &OwnerId,
        token: &str,
        record: &DebtRecord,
    ) -> Result<(), RemoteStoreError>;
    fn delete_debt(
        &self,
        owner: &OwnerId,
        token: &str,
        id: &DebtorName,
    ) -> Result<(), RemoteStoreError>;
    fn upsert_name(
        &self,
        owner: &OwnerId,
        token: &str,
        entry: &SavedName,
    ) -> Result<(), RemoteStoreError>;
    fn delete_name(
        &self,
        owner: &OwnerId,
        token: &str,
        id: &NameId,
    ) -> Result<(), RemoteStoreError>;
}

impl RemoteLedgerApi for RemoteStoreRuntime {
    fn load_all(&self, owner: &OwnerId, token: &str) -> Result<Ledger, RemoteStoreError> {
        RemoteStoreRuntime::load_all(self, owner, token)
    }

    fn commit_batch(
        &self,
        owner: &OwnerId,
        token: &str,
        writes: &[RemoteWrite],
    ) -> Result<(), RemoteStoreError> {
        RemoteStoreRuntime::commit_batch(self, owner, token, writes)
    }

    fn upsert_debt(
        &self,
        owner: &OwnerId,
        token: &str,
        record: &DebtRecord,
    ) -> Result<(), RemoteStoreError> {
        RemoteStoreRuntime::upsert_debt(self, owner, token, record)
    }

    fn delete_debt(
        &self,
        owner: &OwnerId,
        token: &str,
        id: &DebtorName,
    ) -> Result<(), RemoteStoreError> {
        RemoteStoreRuntime::delete_debt(self, owner, token, id)
    }

    fn upsert_name(
        &self,
        owner: &OwnerId,
        token: &str,
        entry: &SavedName,
    ) -> Result<(), RemoteStoreError> {
        RemoteStoreRuntime::upsert_name(self, owner, token, entry)
    }

    fn delete_name(
        &self,
        owner: &OwnerId,
        token: &str,
        id: &NameId,
    ) -> Result<(), RemoteStoreError> {
        RemoteStoreRuntime::delete_name(self, owner, token, id)
    }
}

/// Device-local backend. Every mutation round-trips load, mutate, save:
/// the persisted blob is the source of truth, not an in-memory copy.
pub struct LocalBackend<'a> {
    store: &'a LocalLedgerStore,
}

impl<'a> LocalBackend<'a> {
    pub fn new(store: &'a LocalLedgerStore) -> Self {
        Self { store }
    }
}

impl LedgerBackend for LocalBackend<'_> {
    fn snapshot(&mut self) -> Result<Ledger, BackendError> {
        Ok(self.store.load().ledger)
    }

    fn put_debt(&mut self, record: DebtRecord) -> Result<(), BackendError> {
        let mut ledger = self.store.load().ledger;
        ledger.records.insert(record.debtor_name.clone(), record);
        Ok(self.store.save(&ledger)?)
    }

    fn delete_debt(&mut self, id: &DebtorName) -> Result<(), BackendError> {
        let mut ledger = self.store.load().ledger;
        ledger.records.remove(id);
        Ok(self.store.save(&ledger)?)
    }

    fn put_name(&mut self, entry: SavedName) -> Result<(), BackendError> {
        let mut ledger = self.store.load().ledger;
        ledger.names.retain(|n| n.id != entry.id);
        ledger.names.push(entry);
        Ok(self.store.save(&ledger)?)
    }

    fn delete_name(&mut self, id: &NameId) -> Result<(), BackendError> {
        let mut ledger = self.store.load().ledger;
        ledger.names.retain(|n| &n.id != id);
        Ok(self.store.save(&ledger)?)
    }
}

/// Remote backend bound to one authenticated owner for the lifetime of
/// the session.
pub struct RemoteBackend<'a, R: RemoteLedgerApi> {
    remote: &'a R,
    owner: &'a OwnerId,
    token: &'a str,
}

impl<'a, R: RemoteLedgerApi> RemoteBackend<'a, R> {
    pub fn new(remote: &'a R, owner: &'a OwnerId, token: &'a str) -> Self {
        Self {
            remote,
            owner,
            token,
        }
    }
}

impl<R: RemoteLedgerApi> LedgerBackend for RemoteBackend<'_, R> {
    fn snapshot(&mut self) -> Result<Ledger, BackendError> {
        Ok(self.remote.load_all(self.owner, self.token)?)
    }

    fn put_debt(&mut self, record: DebtRecord) -> Result<(), BackendError> {
        Ok(self.remote.upsert_debt(self.owner, self.token, &record)?)
    }

    fn delete_debt(&mut self, id: &DebtorName) -> Result<(), BackendError> {
        Ok(self.remote.delete_debt(self.owner, self.token, id)?)
    }

    fn put_name(&mut self, entry: SavedName) -> Result<(), BackendError> {
        Ok(self.remote.upsert_name(self.owner, self.token, &entry)?)
    }

    fn delete_name(&mut self, id: &NameId) -> Result<(), BackendError> {
        Ok(self.remote.delete_name(self.owner, self.token, id)?)
    }
}

/// The backend currently serving the session, swapped as a whole at
/// sign-in/sign-out.
pub enum ActiveBackend<'a, R: RemoteLedgerApi> {
    Local(LocalBackend<'a>),
    Remote(RemoteBackend<'a, R>),
}

impl<R: RemoteLedgerApi> LedgerBackend for ActiveBackend<'_, R> {
    fn snapshot(&mut self) -> Result<Ledger, BackendError> {
        match self {
            Self::Local(backend) => backend.snapshot(),
            Self::Remote(backend) => backend.snapshot(),
        }
    }

    fn put_debt(&mut self, record: DebtRecord) -> Result<(), BackendError> {
        match self {
            Self::Local(backend) => backend.put_debt(record),
            Self::Remote(backend) => backend.put_debt(record),
        }
    }

    fn delete_debt(&mut self, id: &DebtorName) -> Result<(), BackendError> {
        match self {
            Self::Local(backend) => backend.delete_debt(id),
            Self::Remote(backend) => backend.delete_debt(id),
        }
    }

    fn put_name(&mut self, entry: SavedName) -> Result<(), BackendError> {
        match self {
            Self::Local(backend) => backend.put_name(entry),
            Self::Remote(backend) => backend.put_name(entry),
        }
    }

    fn delete_name(&mut self, id: &NameId) -> Result<(), BackendError> {
        match self {
            Self::Local(backend) => backend.delete_name(id),
            Self::Remote(backend) => backend.delete_name(id),
        }
    }
}
