#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ContractViolation, SchemaVersion, UnixTimeMs, Validate};

pub const LEDGER_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const MAX_DEBTOR_NAME_CHARS: usize = 120;
pub const MAX_SAVED_NAME_CHARS: usize = 120;
pub const MAX_NAME_ID_CHARS: usize = 64;

/// Debtor display name. Doubles as the debt record id: one record per name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebtorName(String);

impl DebtorName {
    pub fn new(raw: &str) -> Result<Self, ContractViolation> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "debtor_name",
                reason: "must not be empty after trimming",
            });
        }
        if trimmed.chars().count() > MAX_DEBTOR_NAME_CHARS {
            return Err(ContractViolation::InvalidValue {
                field: "debtor_name",
                reason: "must be <= 120 chars",
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for DebtorName {
    fn validate(&self) -> Result<(), ContractViolation> {
        DebtorName::new(&self.0).map(|_| ())
    }
}

/// Strictly positive debt amount. Balances that reach zero are deleted,
/// never stored, so a persisted amount is always > 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, ContractViolation> {
        if value <= Decimal::ZERO {
            return Err(ContractViolation::InvalidValue {
                field: "amount",
                reason: "must be > 0",
            });
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> Decimal {
        self.0
    }
}

impl Validate for Amount {
    fn validate(&self) -> Result<(), ContractViolation> {
        Amount::new(self.0).map(|_| ())
    }
}

/// Creation-time-derived saved-name token (unix-ms, optionally suffixed to
/// stay unique when several names are created within one millisecond).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameId(String);

impl NameId {
    pub fn new(raw: &str) -> Result<Self, ContractViolation> {
        if raw.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "name_id",
                reason: "must not be empty",
            });
        }
        if raw.len() > MAX_NAME_ID_CHARS {
            return Err(ContractViolation::InvalidValue {
                field: "name_id",
                reason: "must be <= 64 chars",
            });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn from_creation_time(at: UnixTimeMs, seq: u32) -> Self {
        if seq == 0 {
            Self(at.0.to_string())
        } else {
            Self(format!("{}-{}", at.0, seq))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for NameId {
    fn validate(&self) -> Result<(), ContractViolation> {
        NameId::new(&self.0).map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtRecord {
    pub id: DebtorName,
    pub debtor_name: DebtorName,
    pub amount: Amount,
}

impl DebtRecord {
    pub fn v1(debtor_name: DebtorName, amount: Amount) -> Self {
        Self {
            id: debtor_name.clone(),
            debtor_name,
            amount,
        }
    }
}

impl Validate for DebtRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.debtor_name.validate()?;
        if self.id != self.debtor_name {
            return Err(ContractViolation::InvalidValue {
                field: "debt_record.id",
                reason: "must equal debtor_name",
            });
        }
        self.amount.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedName {
    pub id: NameId,
    pub name: String,
}

impl SavedName {
    pub fn v1(id: NameId, name: String) -> Result<Self, ContractViolation> {
        let entry = Self { id, name };
        entry.validate()?;
        Ok(entry)
    }
}

impl Validate for SavedName {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.id.validate()?;
        if self.name.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "saved_name.name",
                reason: "must not be empty",
            });
        }
        if self.name.chars().count() > MAX_SAVED_NAME_CHARS {
            return Err(ContractViolation::InvalidValue {
                field: "saved_name.name",
                reason: "must be <= 120 chars",
            });
        }
        Ok(())
    }
}

/// One owner's complete aggregate: all debt records plus all saved names.
/// Exactly one ledger is active at a time; switching owners (sign-in or
/// sign-out) is the only structural transition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ledger {
    pub records: BTreeMap<DebtorName, DebtRecord>,
    pub names: Vec<SavedName>,
}

impl Ledger {
    pub fn from_parts(records: Vec<DebtRecord>, names: Vec<SavedName>) -> Self {
        let mut map = BTreeMap::new();
        for record in records {
            map.insert(record.debtor_name.clone(), record);
        }
        Self { records: map, names }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.names.is_empty()
    }

    pub fn record(&self, name: &DebtorName) -> Option<&DebtRecord> {
        self.records.get(name)
    }

    /// Display ordering: descending by amount, ties stable.
    pub fn sorted_records(&self) -> Vec<DebtRecord> {
        let mut rows: Vec<DebtRecord> = self.records.values().cloned().collect();
        rows.sort_by(|a, b| b.amount.get().cmp(&a.amount.get()));
        rows
    }

    /// Case-sensitive exact match, per the saved-name uniqueness rule.
    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.name == name)
    }

    pub fn has_name_id(&self, id: &NameId) -> bool {
        self.names.iter().any(|n| &n.id == id)
    }
}

impl Validate for Ledger {
    fn validate(&self) -> Result<(), ContractViolation> {
        for (key, record) in &self.records {
            record.validate()?;
            if key != &record.debtor_name {
                return Err(ContractViolation::InvalidValue {
                    field: "ledger.records",
                    reason: "map key must equal debtor_name",
                });
            }
        }
        for (i, entry) in self.names.iter().enumerate() {
            entry.validate()?;
            let dup = self.names[..i]
                .iter()
                .any(|prior| prior.id == entry.id || prior.name == entry.name);
            if dup {
                return Err(ContractViolation::InvalidValue {
                    field: "ledger.names",
                    reason: "saved names must be unique by id and name",
                });
            }
        }
        Ok(())
    }
}
