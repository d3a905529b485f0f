#![forbid(unsafe_code)]

pub mod auth;
pub mod common;
pub mod documents;
pub mod ledger;
pub mod provider_secrets;

pub use common::{ContractViolation, SchemaVersion, UnixTimeMs, Validate};
