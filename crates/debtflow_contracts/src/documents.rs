#![forbid(unsafe_code)]

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::{Amount, DebtorName};
use crate::{ContractViolation, SchemaVersion, Validate};

pub const DOCUMENTS_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const INVOICE_NUMBER_PREFIX: &str = "INV-";
pub const DEFAULT_INCOME_RATIO: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRequest {
    pub debtor_name: DebtorName,
    pub debt_amount: Amount,
    pub creditor_name: String,
}

impl InvoiceRequest {
    pub fn v1(
        debtor_name: DebtorName,
        debt_amount: Amount,
        creditor_name: String,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            debtor_name,
            debt_amount,
            creditor_name,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for InvoiceRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.debtor_name.validate()?;
        self.debt_amount.validate()?;
        if self.creditor_name.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "invoice_request.creditor_name",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

/// AI-generated invoice. Field names follow the provider schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub invoice_number: String,
    pub issue_date: String,
    pub due_date: String,
    pub notes: String,
}

fn is_iso_date(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit())
}

impl Validate for Invoice {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !self.invoice_number.starts_with(INVOICE_NUMBER_PREFIX) {
            return Err(ContractViolation::InvalidValue {
                field: "invoice.invoice_number",
                reason: "must start with INV-",
            });
        }
        if !is_iso_date(&self.issue_date) {
            return Err(ContractViolation::InvalidValue {
                field: "invoice.issue_date",
                reason: "must be YYYY-MM-DD",
            });
        }
        if !is_iso_date(&self.due_date) {
            return Err(ContractViolation::InvalidValue {
                field: "invoice.due_date",
                reason: "must be YYYY-MM-DD",
            });
        }
        if self.notes.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "invoice.notes",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentPlanRequest {
    pub debtor_name: DebtorName,
    /// Unlike record amounts, zero is allowed here: a settled debtor
    /// yields a zero plan rather than an error.
    pub debt_amount: Decimal,
    pub average_income_ratio: f64,
}

impl PaymentPlanRequest {
    pub fn v1(
        debtor_name: DebtorName,
        debt_amount: Decimal,
        average_income_ratio: f64,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            debtor_name,
            debt_amount,
            average_income_ratio,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for PaymentPlanRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.debtor_name.validate()?;
        if self.debt_amount < Decimal::ZERO {
            return Err(ContractViolation::InvalidValue {
                field: "payment_plan_request.debt_amount",
                reason: "must be >= 0",
            });
        }
        if !self.average_income_ratio.is_finite() {
            return Err(ContractViolation::NotFinite {
                field: "payment_plan_request.average_income_ratio",
            });
        }
        if self.average_income_ratio > 1.0 {
            return Err(ContractViolation::InvalidRange {
                field: "payment_plan_request.average_income_ratio",
                min: 0.0,
                max: 1.0,
                got: self.average_income_ratio,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPlan {
    pub suggested_payment_amount: Decimal,
    pub payment_duration_in_months: u32,
    pub reasoning: String,
}
