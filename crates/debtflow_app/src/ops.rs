#![forbid(unsafe_code)]

use debtflow_contracts::ledger::{Amount, DebtRecord, DebtorName, NameId, SavedName};
use debtflow_contracts::{ContractViolation, UnixTimeMs};
use rust_decimal::Decimal;

use crate::backend::{BackendError, LedgerBackend};

#[derive(Debug)]
pub enum LedgerOpError {
    /// Rejected before any store access; no side effect.
    Contract(ContractViolation),
    NoSuchDebtor {
        name: String,
    },
    /// Payment exceeds the recorded balance; rejected in full.
    OverPayment {
        balance: Decimal,
        payment: Decimal,
    },
    DuplicateName {
        name: String,
    },
    NoSuchName {
        id: String,
    },
    Backend(BackendError),
}

impl std::fmt::Display for LedgerOpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Contract(violation) => write!(f, "contract violation: {violation:?}"),
            Self::NoSuchDebtor { name } => write!(f, "no debt recorded for {name}"),
            Self::OverPayment { balance, payment } => {
                write!(f, "payment {payment} exceeds recorded balance {balance}")
            }
            Self::DuplicateName { name } => write!(f, "name {name} already saved"),
            Self::NoSuchName { id } => write!(f, "no saved name with id {id}"),
            Self::Backend(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for LedgerOpError {}

impl From<ContractViolation> for LedgerOpError {
    fn from(value: ContractViolation) -> Self {
        Self::Contract(value)
    }
}

impl From<BackendError> for LedgerOpError {
    fn from(value: BackendError) -> Self {
        Self::Backend(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOpKind {
    RegisterDebt,
    ApplyPayment,
}

/// Result of one balance-changing operation. A zero balance signals full
/// settlement: the record has been deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpReceipt {
    pub kind: LedgerOpKind,
    pub debtor_name: DebtorName,
    pub balance: Decimal,
    pub settled: bool,
}

/// Records a debt. New balance is the existing balance plus `amount`,
/// or `amount` for a first registration. Never deletes: the balance only
/// grows or is newly created positive.
pub fn register_debt<B: LedgerBackend>(
    backend: &mut B,
    name: &str,
    amount: Decimal,
) -> Result<OpReceipt, LedgerOpError> {
    let debtor = DebtorName::new(name)?;
    let amount = Amount::new(amount)?;
    let ledger = backend.snapshot()?;
    let balance = match ledger.record(&debtor) {
        Some(existing) => existing.amount.get() + amount.get(),
        None => amount.get(),
    };
    backend.put_debt(DebtRecord::v1(debtor.clone(), Amount::new(balance)?))?;
    Ok(OpReceipt {
        kind: LedgerOpKind::RegisterDebt,
        debtor_name: debtor,
        balance,
        settled: false,
    })
}

/// Applies a payment against an existing record. Over-payment is
/// rejected in full; an exact payment deletes the record and reports
/// settlement.
pub fn apply_payment<B: LedgerBackend>(
    backend: &mut B,
    name: &str,
    amount: Decimal,
) -> Result<OpReceipt, LedgerOpError> {
    let debtor = DebtorName::new(name)?;
    let amount = Amount::new(amount)?;
    let ledger = backend.snapshot()?;
    let record = ledger
        .record(&debtor)
        .ok_or_else(|| LedgerOpError::NoSuchDebtor {
            name: debtor.as_str().to_string(),
        })?;
    let balance = record.amount.get() - amount.get();
    if balance < Decimal::ZERO {
        return Err(LedgerOpError::OverPayment {
            balance: record.amount.get(),
            payment: amount.get(),
        });
    }
    if balance.is_zero() {
        backend.delete_debt(&debtor)?;
    } else {
        backend.put_debt(DebtRecord::v1(debtor.clone(), Amount::new(balance)?))?;
    }
    Ok(OpReceipt {
        kind: LedgerOpKind::ApplyPayment,
        debtor_name: debtor,
        balance,
        settled: balance.is_zero(),
    })
}

/// Saves a name. The id is derived from creation time; several names
/// saved within one millisecond bump a sequence suffix until the id is
/// unique in the ledger.
pub fn add_saved_name<B: LedgerBackend>(
    backend: &mut B,
    raw_name: &str,
    now: UnixTimeMs,
) -> Result<SavedName, LedgerOpError> {
    let mut entry = SavedName::v1(NameId::from_creation_time(now, 0), raw_name.trim().to_string())?;
    let ledger = backend.snapshot()?;
    if ledger.has_name(&entry.name) {
        return Err(LedgerOpError::DuplicateName { name: entry.name });
    }
    let mut seq = 0;
    while ledger.has_name_id(&entry.id) {
        seq += 1;
        entry.id = NameId::from_creation_time(now, seq);
    }
    backend.put_name(entry.clone())?;
    Ok(entry)
}

pub fn remove_saved_name<B: LedgerBackend>(
    backend: &mut B,
    id: &NameId,
) -> Result<SavedName, LedgerOpError> {
    let ledger = backend.snapshot()?;
    let entry = ledger
        .names
        .iter()
        .find(|n| &n.id == id)
        .cloned()
        .ok_or_else(|| LedgerOpError::NoSuchName {
            id: id.as_str().to_string(),
        })?;
    backend.delete_name(id)?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use debtflow_contracts::ledger::Ledger;

    /// In-memory backend standing in for either store.
    #[derive(Debug, Default)]
    struct MemoryBackend {
        ledger: Ledger,
    }

    impl LedgerBackend for MemoryBackend {
        fn snapshot(&mut self) -> Result<Ledger, BackendError> {
            Ok(self.ledger.clone())
        }

        fn put_debt(&mut self, record: DebtRecord) -> Result<(), BackendError> {
            self.ledger
                .records
                .insert(record.debtor_name.clone(), record);
            Ok(())
        }

        fn delete_debt(&mut self, id: &DebtorName) -> Result<(), BackendError> {
            self.ledger.records.remove(id);
            Ok(())
        }

        fn put_name(&mut self, entry: SavedName) -> Result<(), BackendError> {
            self.ledger.names.retain(|n| n.id != entry.id);
            self.ledger.names.push(entry);
            Ok(())
        }

        fn delete_name(&mut self, id: &NameId) -> Result<(), BackendError> {
            self.ledger.names.retain(|n| &n.id != id);
            Ok(())
        }
    }

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    #[test]
    fn at_ops_01_register_then_pay_then_settle() {
        let mut backend = MemoryBackend::default();
        let receipt = register_debt(&mut backend, "Sara", dec("100")).unwrap();
        assert_eq!(receipt.balance, dec("100"));

        let receipt = apply_payment(&mut backend, "Sara", dec("40")).unwrap();
        assert_eq!(receipt.balance, dec("60"));
        assert!(!receipt.settled);

        let receipt = apply_payment(&mut backend, "Sara", dec("60")).unwrap();
        assert_eq!(receipt.balance, Decimal::ZERO);
        assert!(receipt.settled);
        // Settlement deletes: the name is gone, not stored at zero.
        assert!(backend
            .ledger
            .record(&DebtorName::new("Sara").unwrap())
            .is_none());
    }

    #[test]
    fn at_ops_02_register_accumulates_per_name() {
        let mut backend = MemoryBackend::default();
        register_debt(&mut backend, "Ali", dec("50")).unwrap();
        let receipt = register_debt(&mut backend, "Ali", dec("25.5")).unwrap();
        assert_eq!(receipt.balance, dec("75.5"));
        assert_eq!(backend.ledger.records.len(), 1);
    }

    #[test]
    fn at_ops_03_overpayment_rejected_in_full() {
        let mut backend = MemoryBackend::default();
        register_debt(&mut backend, "Sara", dec("60")).unwrap();
        let err = apply_payment(&mut backend, "Sara", dec("1000")).unwrap_err();
        assert!(matches!(
            err,
            LedgerOpError::OverPayment { balance, payment }
                if balance == dec("60") && payment == dec("1000")
        ));
        // Rejected in full: the balance is unchanged.
        let record = backend
            .ledger
            .record(&DebtorName::new("Sara").unwrap())
            .unwrap();
        assert_eq!(record.amount.get(), dec("60"));
    }

    #[test]
    fn at_ops_04_payment_against_unknown_name_fails_and_leaves_ledger_unchanged() {
        let mut backend = MemoryBackend::default();
        register_debt(&mut backend, "Ali", dec("50")).unwrap();
        let before = backend.ledger.clone();
        let err = apply_payment(&mut backend, "Sara", dec("10")).unwrap_err();
        assert!(matches!(err, LedgerOpError::NoSuchDebtor { .. }));
        assert_eq!(backend.ledger, before);
    }

    #[test]
    fn at_ops_05_validation_rejects_before_any_store_access() {
        let mut backend = MemoryBackend::default();
        assert!(matches!(
            register_debt(&mut backend, "   ", dec("10")),
            Err(LedgerOpError::Contract(_))
        ));
        assert!(matches!(
            register_debt(&mut backend, "Ali", dec("0")),
            Err(LedgerOpError::Contract(_))
        ));
        assert!(matches!(
            apply_payment(&mut backend, "Ali", dec("-5")),
            Err(LedgerOpError::Contract(_))
        ));
        assert!(backend.ledger.is_empty());
    }

    #[test]
    fn at_ops_06_final_balance_is_sum_of_registrations_minus_payments() {
        let mut backend = MemoryBackend::default();
        register_debt(&mut backend, "Omar", dec("30")).unwrap();
        register_debt(&mut backend, "Omar", dec("45")).unwrap();
        apply_payment(&mut backend, "Omar", dec("20")).unwrap();
        register_debt(&mut backend, "Omar", dec("5")).unwrap();
        let receipt = apply_payment(&mut backend, "Omar", dec("10")).unwrap();
        assert_eq!(receipt.balance, dec("50"));
    }

    #[test]
    fn at_ops_07_saved_names_reject_exact_duplicates_only() {
        let mut backend = MemoryBackend::default();
        add_saved_name(&mut backend, " Ali ", UnixTimeMs(1_700_000_000_000)).unwrap();
        let err = add_saved_name(&mut backend, "Ali", UnixTimeMs(1_700_000_000_001)).unwrap_err();
        assert!(matches!(err, LedgerOpError::DuplicateName { .. }));
        // Case differs: a distinct name by the exact-match rule.
        add_saved_name(&mut backend, "ali", UnixTimeMs(1_700_000_000_002)).unwrap();
        assert_eq!(backend.ledger.names.len(), 2);
    }

    #[test]
    fn at_ops_08_same_millisecond_ids_are_bumped_unique() {
        let mut backend = MemoryBackend::default();
        let now = UnixTimeMs(1_700_000_000_000);
        let first = add_saved_name(&mut backend, "Ali", now).unwrap();
        let second = add_saved_name(&mut backend, "Omar", now).unwrap();
        assert_eq!(first.id.as_str(), "1700000000000");
        assert_eq!(second.id.as_str(), "1700000000000-1");
    }

    #[test]
    fn at_ops_09_remove_saved_name_requires_existing_id() {
        let mut backend = MemoryBackend::default();
        let entry = add_saved_name(&mut backend, "Ali", UnixTimeMs(1)).unwrap();
        remove_saved_name(&mut backend, &entry.id).unwrap();
        let err = remove_saved_name(&mut backend, &entry.id).unwrap_err();
        assert!(matches!(err, LedgerOpError::NoSuchName { .. }));
    }
}
