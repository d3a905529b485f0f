#![forbid(unsafe_code)]

use debtflow_contracts::auth::OwnerId;
use debtflow_contracts::ledger::Ledger;
use debtflow_engines::remote_store::{RemoteStoreError, RemoteWrite};
use debtflow_storage::LocalLedgerStore;

use crate::backend::RemoteLedgerApi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub debts_written: usize,
    pub names_written: usize,
    /// False only when the batch committed but removing the local blob
    /// failed; the next sign-in re-merges and converges to the same
    /// remote state.
    pub local_cleared: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The local ledger was empty; nothing moved.
    NothingToMerge { remote: Ledger },
    /// The batch committed and the local store was cleared. `remote` is
    /// the post-merge ledger, computed from the pre-merge snapshot plus
    /// the committed writes.
    Merged { remote: Ledger, report: MergeReport },
}

impl MergeOutcome {
    pub fn remote(&self) -> &Ledger {
        match self {
            Self::NothingToMerge { remote } => remote,
            Self::Merged { remote, .. } => remote,
        }
    }
}

#[derive(Debug)]
pub enum MergeError {
    /// The remote ledger could not be read; the local store is intact
    /// and nothing was written.
    Load(RemoteStoreError),
    /// The batch commit failed; the local store is intact. `remote`
    /// carries the ledger as loaded before the commit so the caller can
    /// still display it while surfacing the merge-failure notice.
    Commit {
        error: RemoteStoreError,
        remote: Ledger,
    },
}

impl std::fmt::Display for MergeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load(err) => write!(f, "merge aborted, remote ledger unreadable: {err}"),
            Self::Commit { error, .. } => write!(f, "merge batch commit failed: {error}"),
        }
    }
}

impl std::error::Error for MergeError {}

/// Sign-in reconciliation: merges everything entered while signed out
/// into the owner's remote ledger, exactly once per successful
/// authentication.
///
/// Debt amounts are last-writer-wins with the local copy winning; saved
/// names are only created when neither their id nor their name already
/// exists remotely. All writes go through one all-or-nothing batch; on
/// success the local store is cleared, which is what makes a repeat run
/// a no-op.
pub fn reconcile_sign_in<R: RemoteLedgerApi>(
    local: &LocalLedgerStore,
    remote: &R,
    owner: &OwnerId,
    token: &str,
) -> Result<MergeOutcome, MergeError> {
    let loaded = local.load();
    let remote_ledger = remote.load_all(owner, token).map_err(MergeError::Load)?;
    if loaded.ledger.is_empty() {
        return Ok(MergeOutcome::NothingToMerge {
            remote: remote_ledger,
        });
    }

    let mut writes = Vec::new();
    for record in loaded.ledger.records.values() {
        writes.push(RemoteWrite::PutDebt(record.clone()));
    }
    let debts_written = writes.len();
    let mut names_written = 0;
    for entry in &loaded.ledger.names {
        if remote_ledger.has_name_id(&entry.id) || remote_ledger.has_name(&entry.name) {
            continue;
        }
        writes.push(RemoteWrite::PutName(entry.clone()));
        names_written += 1;
    }

    if let Err(error) = remote.commit_batch(owner, token, &writes) {
        return Err(MergeError::Commit {
            error,
            remote: remote_ledger,
        });
    }

    let local_cleared = local.clear().is_ok();
    Ok(MergeOutcome::Merged {
        remote: apply_writes(remote_ledger, &writes),
        report: MergeReport {
            debts_written,
            names_written,
            local_cleared,
        },
    })
}

fn apply_writes(mut ledger: Ledger, writes: &[RemoteWrite]) -> Ledger {
    for write in writes {
        match write {
            RemoteWrite::PutDebt(record) => {
                ledger
                    .records
                    .insert(record.debtor_name.clone(), record.clone());
            }
            RemoteWrite::PutName(entry) => {
                if !ledger.has_name_id(&entry.id) {
                    ledger.names.push(entry.clone());
                }
            }
        }
    }
    ledger
}

#[cfg(test)]
mod tests {
    use super::*;
    use debtflow_contracts::ledger::{Amount, DebtRecord, DebtorName, NameId, SavedName};
    use std::cell::{Cell, RefCell};
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    /// Remote store double: applies batches all-or-nothing against an
    /// in-memory ledger, optionally failing every commit.
    #[derive(Debug, Default)]
    struct StubRemote {
        ledger: RefCell<Ledger>,
        fail_commit: Cell<bool>,
        commits: Cell<usize>,
    }

    impl RemoteLedgerApi for StubRemote {
        fn load_all(&self, _owner: &OwnerId, _token: &str) -> Result<Ledger, RemoteStoreError> {
            Ok(self.ledger.borrow().clone())
        }

        fn commit_batch(
            &self,
            _owner: &OwnerId,
            _token: &str,
            writes: &[RemoteWrite],
        ) -> Result<(), RemoteStoreError> {
            if self.fail_commit.get() {
                return Err(RemoteStoreError::Unavailable {
                    status: Some(503),
                    kind: "http_status",
                });
            }
            let mut ledger = self.ledger.borrow_mut();
            for write in writes {
                match write {
                    RemoteWrite::PutDebt(record) => {
                        ledger
                            .records
                            .insert(record.debtor_name.clone(), record.clone());
                    }
                    RemoteWrite::PutName(entry) => {
                        ledger.names.push(entry.clone());
                    }
                }
            }
            self.commits.set(self.commits.get() + 1);
            Ok(())
        }

        fn upsert_debt(
            &self,
            _owner: &OwnerId,
            _token: &str,
            record: &DebtRecord,
        ) -> Result<(), RemoteStoreError> {
            self.ledger
                .borrow_mut()
                .records
                .insert(record.debtor_name.clone(), record.clone());
            Ok(())
        }

        fn delete_debt(
            &self,
            _owner: &OwnerId,
            _token: &str,
            id: &DebtorName,
        ) -> Result<(), RemoteStoreError> {
            self.ledger.borrow_mut().records.remove(id);
            Ok(())
        }

        fn upsert_name(
            &self,
            _owner: &OwnerId,
            _token: &str,
            entry: &SavedName,
        ) -> Result<(), RemoteStoreError> {
            self.ledger.borrow_mut().names.push(entry.clone());
            Ok(())
        }

        fn delete_name(
            &self,
            _owner: &OwnerId,
            _token: &str,
            id: &NameId,
        ) -> Result<(), RemoteStoreError> {
            self.ledger.borrow_mut().names.retain(|n| &n.id != id);
            Ok(())
        }
    }

    fn temp_local(tag: &str) -> (PathBuf, LocalLedgerStore) {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(1);
        let base = std::env::temp_dir().join(format!("debtflow-merge-{tag}-{suffix}"));
        fs::create_dir_all(&base).unwrap();
        let store = LocalLedgerStore::for_dir(&base);
        (base, store)
    }

    fn owner() -> OwnerId {
        OwnerId::new("owner_1").unwrap()
    }

    fn debtor(name: &str) -> DebtorName {
        DebtorName::new(name).unwrap()
    }

    fn amount(raw: &str) -> Amount {
        Amount::new(raw.parse().unwrap()).unwrap()
    }

    fn record(name: &str, raw: &str) -> DebtRecord {
        DebtRecord::v1(debtor(name), amount(raw))
    }

    fn saved(id: &str, name: &str) -> SavedName {
        SavedName::v1(NameId::new(id).unwrap(), name.to_string()).unwrap()
    }

    #[test]
    fn at_merge_01_local_snapshot_lands_in_empty_remote_and_local_clears() {
        let (base, local) = temp_local("lands");
        local
            .save(&Ledger::from_parts(vec![record("Ali", "50")], Vec::new()))
            .unwrap();
        let remote = StubRemote::default();

        let outcome = reconcile_sign_in(&local, &remote, &owner(), "token").unwrap();
        let merged = outcome.remote();
        assert_eq!(
            merged.record(&debtor("Ali")).unwrap().amount.get(),
            "50".parse().unwrap()
        );
        assert_eq!(
            remote
                .ledger
                .borrow()
                .record(&debtor("Ali"))
                .unwrap()
                .amount
                .get(),
            "50".parse().unwrap()
        );
        assert!(local.load().ledger.is_empty());
        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_merge_02_local_amount_wins_over_remote() {
        let (base, local) = temp_local("wins");
        local
            .save(&Ledger::from_parts(vec![record("Ali", "50")], Vec::new()))
            .unwrap();
        let remote = StubRemote::default();
        remote.ledger.borrow_mut().records.insert(
            debtor("Ali"),
            record("Ali", "30"),
        );

        reconcile_sign_in(&local, &remote, &owner(), "token").unwrap();
        assert_eq!(
            remote
                .ledger
                .borrow()
                .record(&debtor("Ali"))
                .unwrap()
                .amount
                .get(),
            "50".parse().unwrap()
        );
        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_merge_03_existing_remote_names_are_left_untouched() {
        let (base, local) = temp_local("names");
        local
            .save(&Ledger::from_parts(
                Vec::new(),
                vec![saved("100", "Ali"), saved("200", "Omar")],
            ))
            .unwrap();
        let remote = StubRemote::default();
        remote.ledger.borrow_mut().names.push(saved("100", "Ali"));

        let outcome = reconcile_sign_in(&local, &remote, &owner(), "token").unwrap();
        match outcome {
            MergeOutcome::Merged { report, .. } => {
                assert_eq!(report.names_written, 1);
                assert!(report.local_cleared);
            }
            other => panic!("expected merged outcome, got {other:?}"),
        }
        let names = remote.ledger.borrow().names.clone();
        assert_eq!(names.len(), 2);
        assert!(names.iter().any(|n| n.id.as_str() == "200"));
        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_merge_04_name_string_collision_is_skipped_even_with_new_id() {
        let (base, local) = temp_local("collide");
        local
            .save(&Ledger::from_parts(Vec::new(), vec![saved("999", "Ali")]))
            .unwrap();
        let remote = StubRemote::default();
        remote.ledger.borrow_mut().names.push(saved("100", "Ali"));

        reconcile_sign_in(&local, &remote, &owner(), "token").unwrap();
        // The name is inert; a second copy under a new id would break
        // the uniqueness rule on the remote side.
        assert_eq!(remote.ledger.borrow().names.len(), 1);
        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_merge_05_merge_is_idempotent_across_sign_ins() {
        let (base, local) = temp_local("idempotent");
        local
            .save(&Ledger::from_parts(
                vec![record("Ali", "50")],
                vec![saved("100", "Omar")],
            ))
            .unwrap();
        let remote = StubRemote::default();

        reconcile_sign_in(&local, &remote, &owner(), "token").unwrap();
        let after_first = remote.ledger.borrow().clone();

        let second = reconcile_sign_in(&local, &remote, &owner(), "token").unwrap();
        assert!(matches!(second, MergeOutcome::NothingToMerge { .. }));
        assert_eq!(*remote.ledger.borrow(), after_first);
        assert_eq!(remote.commits.get(), 1);
        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_merge_06_commit_failure_keeps_local_and_surfaces_remote_snapshot() {
        let (base, local) = temp_local("failure");
        local
            .save(&Ledger::from_parts(vec![record("Ali", "50")], Vec::new()))
            .unwrap();
        let remote = StubRemote::default();
        remote.ledger.borrow_mut().records.insert(
            debtor("Sara"),
            record("Sara", "70"),
        );
        remote.fail_commit.set(true);

        let err = reconcile_sign_in(&local, &remote, &owner(), "token").unwrap_err();
        match err {
            MergeError::Commit { remote: snapshot, .. } => {
                assert!(snapshot.record(&debtor("Sara")).is_some());
            }
            other => panic!("expected commit failure, got {other:?}"),
        }
        // Local data survives for the next attempt; remote untouched.
        assert_eq!(local.load().ledger.records.len(), 1);
        assert!(remote.ledger.borrow().record(&debtor("Ali")).is_none());
        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_merge_07_empty_local_is_a_pure_adoption() {
        let (base, local) = temp_local("adopt");
        let remote = StubRemote::default();
        remote.ledger.borrow_mut().records.insert(
            debtor("Sara"),
            record("Sara", "70"),
        );

        let outcome = reconcile_sign_in(&local, &remote, &owner(), "token").unwrap();
        assert!(matches!(outcome, MergeOutcome::NothingToMerge { .. }));
        assert_eq!(outcome.remote().records.len(), 1);
        assert_eq!(remote.commits.get(), 0);
        fs::remove_dir_all(base).unwrap();
    }
}
