#![forbid(unsafe_code)]

pub mod auth;
pub mod device_vault;
pub mod documents;
pub mod remote_store;
