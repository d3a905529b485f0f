#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::{ContractViolation, SchemaVersion, Validate};

pub const AUTH_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const MIN_PASSWORD_CHARS: usize = 6;

/// Opaque identity id assigned by the auth provider. Addresses the
/// owner's subtree in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(raw: &str) -> Result<Self, ContractViolation> {
        if raw.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "owner_id",
                reason: "must not be empty",
            });
        }
        Ok(Self(raw.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn v1(email: String, password: String) -> Result<Self, ContractViolation> {
        let c = Self { email, password };
        c.validate()?;
        Ok(c)
    }
}

impl Validate for Credentials {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.email.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "credentials.email",
                reason: "must not be empty",
            });
        }
        if !self.email.contains('@') {
            return Err(ContractViolation::InvalidValue {
                field: "credentials.email",
                reason: "must contain '@'",
            });
        }
        if self.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(ContractViolation::InvalidValue {
                field: "credentials.password",
                reason: "must be >= 6 chars",
            });
        }
        Ok(())
    }
}

/// Authenticated session handed back by the auth engine. The token is
/// attached to every remote-store request for the session's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub owner_id: OwnerId,
    pub email: String,
    pub display_name: Option<String>,
    pub id_token: String,
}

impl AuthSession {
    pub fn v1(
        owner_id: OwnerId,
        email: String,
        display_name: Option<String>,
        id_token: String,
    ) -> Result<Self, ContractViolation> {
        let s = Self {
            owner_id,
            email,
            display_name,
            id_token,
        };
        s.validate()?;
        Ok(s)
    }
}

impl Validate for AuthSession {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.owner_id.validate()?;
        if self.email.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "auth_session.email",
                reason: "must not be empty",
            });
        }
        if self.id_token.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "auth_session.id_token",
                reason: "must not be empty",
            });
        }
        if let Some(name) = &self.display_name {
            if name.trim().is_empty() {
                return Err(ContractViolation::InvalidValue {
                    field: "auth_session.display_name",
                    reason: "must not be empty when provided",
                });
            }
        }
        Ok(())
    }
}

impl Validate for OwnerId {
    fn validate(&self) -> Result<(), ContractViolation> {
        OwnerId::new(&self.0).map(|_| ())
    }
}

/// Sign-in state. Exactly one ledger backend is active per state:
/// the device-local store while signed out, the owner's remote subtree
/// while signed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    SignedOut,
    SignedIn(AuthSession),
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, Self::SignedIn(_))
    }

    pub fn session(&self) -> Option<&AuthSession> {
        match self {
            Self::SignedOut => None,
            Self::SignedIn(session) => Some(session),
        }
    }
}
