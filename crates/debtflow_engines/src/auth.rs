#![forbid(unsafe_code)]

use std::env;
use std::time::Duration;

use debtflow_contracts::auth::{AuthSession, Credentials};
use debtflow_contracts::{ContractViolation, Validate};
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum AuthError {
    /// Wrong email or password, or no such account. One variant on
    /// purpose: the provider is not allowed to reveal which.
    InvalidCredentials,
    EmailAlreadyInUse,
    WeakPassword,
    Contract(ContractViolation),
    Unavailable {
        status: Option<u16>,
        kind: &'static str,
    },
    /// The provider answered with something this client does not know.
    Provider(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "email or password is incorrect"),
            Self::EmailAlreadyInUse => write!(f, "email is already in use"),
            Self::WeakPassword => write!(f, "password is too weak, must be at least 6 chars"),
            Self::Contract(violation) => write!(f, "contract violation: {violation:?}"),
            Self::Unavailable { status, kind } => match status {
                Some(status) => write!(f, "auth provider unavailable: {kind} status={status}"),
                None => write!(f, "auth provider unavailable: {kind}"),
            },
            Self::Provider(detail) => write!(f, "auth provider error: {detail}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<ContractViolation> for AuthError {
    fn from(value: ContractViolation) -> Self {
        Self::Contract(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub base_url: String,
    pub timeout_ms: u32,
    pub user_agent: String,
    /// Deployment API key for the identity provider, resolved from the
    /// device vault; open providers run without one.
    pub api_key: Option<String>,
    pub sign_in_fixture_json: Option<String>,
    pub sign_up_fixture_json: Option<String>,
}

impl AuthConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env::var("DEBTFLOW_AUTH_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9098/v1".to_string()),
            timeout_ms: env::var("DEBTFLOW_AUTH_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| (100..=60_000).contains(v))
                .unwrap_or(5_000),
            user_agent: env::var("DEBTFLOW_AUTH_HTTP_USER_AGENT")
                .unwrap_or_else(|_| "debtflow-auth/1.0".to_string()),
            api_key: None,
            sign_in_fixture_json: None,
            sign_up_fixture_json: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct SignInBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SignUpBody<'a> {
    email: &'a str,
    password: &'a str,
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    code: String,
}

/// Email/password identity client. Sessions it returns carry the owner
/// id addressing the remote-store subtree plus the bearer token every
/// store request authenticates with.
pub struct AuthRuntime {
    config: AuthConfig,
    agent: ureq::Agent,
}

impl AuthRuntime {
    pub fn new(config: AuthConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(u64::from(config.timeout_ms)))
            .user_agent(&config.user_agent)
            .build();
        Self { config, agent }
    }

    pub fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        credentials.validate()?;
        if let Some(fixture) = &self.config.sign_in_fixture_json {
            return parse_session(fixture);
        }
        let url = format!("{}/sessions", self.config.base_url.trim_end_matches('/'));
        let body = SignInBody {
            email: &credentials.email,
            password: &credentials.password,
        };
        let response = self.request(&url).send_json(body);
        self.handle_session_response(response)
    }

    pub fn sign_up(
        &self,
        credentials: &Credentials,
        display_name: &str,
    ) -> Result<AuthSession, AuthError> {
        credentials.validate()?;
        if display_name.trim().is_empty() {
            return Err(AuthError::Contract(ContractViolation::InvalidValue {
                field: "sign_up.display_name",
                reason: "must not be empty",
            }));
        }
        if let Some(fixture) = &self.config.sign_up_fixture_json {
            return parse_session(fixture);
        }
        let url = format!("{}/accounts", self.config.base_url.trim_end_matches('/'));
        let body = SignUpBody {
            email: &credentials.email,
            password: &credentials.password,
            display_name: display_name.trim(),
        };
        let response = self.request(&url).send_json(body);
        self.handle_session_response(response)
    }

    fn request(&self, url: &str) -> ureq::Request {
        let mut request = self.agent.post(url);
        if let Some(api_key) = &self.config.api_key {
            request = request.set("X-Api-Key", api_key);
        }
        request
    }

    fn handle_session_response(
        &self,
        response: Result<ureq::Response, ureq::Error>,
    ) -> Result<AuthSession, AuthError> {
        match response {
            Ok(response) => {
                let body = response.into_string().map_err(|_| AuthError::Unavailable {
                    status: None,
                    kind: "read_body",
                })?;
                parse_session(&body)
            }
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(provider_error(status, &body))
            }
            Err(ureq::Error::Transport(transport)) => Err(AuthError::Unavailable {
                status: None,
                kind: transport_kind(&transport),
            }),
        }
    }
}

fn parse_session(body: &str) -> Result<AuthSession, AuthError> {
    let session: AuthSession =
        serde_json::from_str(body).map_err(|err| AuthError::Provider(err.to_string()))?;
    session.validate()?;
    Ok(session)
}

/// Maps the provider's stable error codes onto the client taxonomy.
/// Unknown 4xx codes and all 5xx fall through to Provider/Unavailable.
pub(crate) fn provider_error(status: u16, body: &str) -> AuthError {
    if status >= 500 {
        return AuthError::Unavailable {
            status: Some(status),
            kind: "http_status",
        };
    }
    let code = serde_json::from_str::<ProviderErrorBody>(body)
        .map(|b| b.error.code)
        .unwrap_or_default();
    match code.as_str() {
        "INVALID_CREDENTIAL" | "WRONG_PASSWORD" | "USER_NOT_FOUND" => {
            AuthError::InvalidCredentials
        }
        "EMAIL_EXISTS" => AuthError::EmailAlreadyInUse,
        "WEAK_PASSWORD" => AuthError::WeakPassword,
        "" => AuthError::Unavailable {
            status: Some(status),
            kind: "http_status",
        },
        other => AuthError::Provider(other.to_string()),
    }
}

fn transport_kind(transport: &ureq::Transport) -> &'static str {
    match transport.kind() {
        ureq::ErrorKind::Dns => "dns",
        ureq::ErrorKind::ConnectionFailed => "connect",
        ureq::ErrorKind::Io => "io",
        _ => "transport",
    }
}
