#![forbid(unsafe_code)]

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use debtflow_contracts::auth::OwnerId;
use debtflow_contracts::ledger::{DebtRecord, DebtorName, Ledger, NameId, SavedName};
use debtflow_contracts::{ContractViolation, Validate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug)]
pub enum RemoteStoreError {
    /// Any transport or HTTP-level failure talking to the store. Callers
    /// must leave prior in-memory state untouched; no automatic retry.
    Unavailable {
        status: Option<u16>,
        kind: &'static str,
    },
    /// The store answered but the payload did not parse or validate.
    Decode(String),
    Contract(ContractViolation),
}

impl std::fmt::Display for RemoteStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable { status, kind } => match status {
                Some(status) => write!(f, "remote store unavailable: {kind} status={status}"),
                None => write!(f, "remote store unavailable: {kind}"),
            },
            Self::Decode(detail) => write!(f, "remote store payload invalid: {detail}"),
            Self::Contract(violation) => write!(f, "contract violation: {violation:?}"),
        }
    }
}

impl std::error::Error for RemoteStoreError {}

impl From<ContractViolation> for RemoteStoreError {
    fn from(value: ContractViolation) -> Self {
        Self::Contract(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStoreConfig {
    pub base_url: String,
    pub timeout_ms: u32,
    pub user_agent: String,
    pub poll_interval_ms: u64,
    /// Test fixture: when set, ledger reads are served from this JSON
    /// body instead of the network.
    pub ledger_fixture_json: Option<String>,
}

impl RemoteStoreConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env::var("DEBTFLOW_REMOTE_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9099/v1".to_string()),
            timeout_ms: env::var("DEBTFLOW_REMOTE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| (100..=60_000).contains(v))
                .unwrap_or(5_000),
            user_agent: env::var("DEBTFLOW_REMOTE_HTTP_USER_AGENT")
                .unwrap_or_else(|_| "debtflow-remote-store/1.0".to_string()),
            poll_interval_ms: env::var("DEBTFLOW_REMOTE_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| (100..=300_000).contains(v))
                .unwrap_or(2_000),
            ledger_fixture_json: None,
        }
    }
}

/// One write inside a reconciliation batch. The store applies the whole
/// batch all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RemoteWrite {
    PutDebt(DebtRecord),
    PutName(SavedName),
}

impl Validate for RemoteWrite {
    fn validate(&self) -> Result<(), ContractViolation> {
        match self {
            Self::PutDebt(record) => record.validate(),
            Self::PutName(entry) => entry.validate(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteLedgerDocument {
    #[serde(default)]
    debts: Vec<DebtRecord>,
    #[serde(default)]
    names: Vec<SavedName>,
}

#[derive(Debug, Serialize)]
struct RemoteDebtBody<'a> {
    debtor_name: &'a DebtorName,
    amount: rust_decimal::Decimal,
}

#[derive(Debug, Serialize)]
struct RemoteNameBody<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct RemoteBatchBody<'a> {
    writes: &'a [RemoteWrite],
}

/// Client for the per-owner remote document store. All operations address
/// exactly one owner's subtree; the bearer token authenticates the owner.
pub struct RemoteStoreRuntime {
    config: RemoteStoreConfig,
    agent: ureq::Agent,
}

impl RemoteStoreRuntime {
    pub fn new(config: RemoteStoreConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(u64::from(config.timeout_ms)))
            .user_agent(&config.user_agent)
            .build();
        Self { config, agent }
    }

    pub fn config(&self) -> &RemoteStoreConfig {
        &self.config
    }

    pub fn load_all(&self, owner: &OwnerId, token: &str) -> Result<Ledger, RemoteStoreError> {
        let body = fetch_ledger_body(
            &self.agent,
            &self.config,
            &ledger_url(&self.config.base_url, owner),
            &bearer(token),
        )?;
        parse_ledger_document(&body)
    }

    /// Writing a record with amount <= 0 is disallowed; callers must
    /// delete the record instead.
    pub fn upsert_debt(
        &self,
        owner: &OwnerId,
        token: &str,
        record: &DebtRecord,
    ) -> Result<(), RemoteStoreError> {
        record.validate()?;
        let url = debt_url(&self.config.base_url, owner, &record.id);
        let body = RemoteDebtBody {
            debtor_name: &record.debtor_name,
            amount: record.amount.get(),
        };
        self.agent
            .put(&url)
            .set("Authorization", &bearer(token))
            .send_json(body)
            .map(|_| ())
            .map_err(unavailable_from_ureq)
    }

    pub fn delete_debt(
        &self,
        owner: &OwnerId,
        token: &str,
        id: &DebtorName,
    ) -> Result<(), RemoteStoreError> {
        let url = debt_url(&self.config.base_url, owner, id);
        self.agent
            .delete(&url)
            .set("Authorization", &bearer(token))
            .call()
            .map(|_| ())
            .map_err(unavailable_from_ureq)
    }

    pub fn upsert_name(
        &self,
        owner: &OwnerId,
        token: &str,
        entry: &SavedName,
    ) -> Result<(), RemoteStoreError> {
        entry.validate()?;
        let url = name_url(&self.config.base_url, owner, &entry.id);
        self.agent
            .put(&url)
            .set("Authorization", &bearer(token))
            .send_json(RemoteNameBody { name: &entry.name })
            .map(|_| ())
            .map_err(unavailable_from_ureq)
    }

    pub fn delete_name(
        &self,
        owner: &OwnerId,
        token: &str,
        id: &NameId,
    ) -> Result<(), RemoteStoreError> {
        let url = name_url(&self.config.base_url, owner, id);
        self.agent
            .delete(&url)
            .set("Authorization", &bearer(token))
            .call()
            .map(|_| ())
            .map_err(unavailable_from_ureq)
    }

    /// All-or-nothing batch, used by the sign-in reconciliation. An empty
    /// batch is a no-op and never touches the network.
    pub fn commit_batch(
        &self,
        owner: &OwnerId,
        token: &str,
        writes: &[RemoteWrite],
    ) -> Result<(), RemoteStoreError> {
        for write in writes {
            write.validate()?;
        }
        if writes.is_empty() {
            return Ok(());
        }
        let url = batch_url(&self.config.base_url, owner);
        self.agent
            .post(&url)
            .set("Authorization", &bearer(token))
            .send_json(RemoteBatchBody { writes })
            .map(|_| ())
            .map_err(unavailable_from_ureq)
    }

    /// Polls the owner's ledger and delivers the full snapshot whenever
    /// its fingerprint changes. Every delivered snapshot is authoritative;
    /// consumers replace their view wholesale. The returned handle is the
    /// only way to stop the poller.
    pub fn subscribe(
        &self,
        owner: &OwnerId,
        token: &str,
        on_change: Box<dyn Fn(Ledger) + Send>,
    ) -> SubscriptionHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_for_thread = Arc::clone(&cancel);
        let agent = self.agent.clone();
        let config = self.config.clone();
        let url = ledger_url(&config.base_url, owner);
        let authorization = bearer(token);
        let join = thread::spawn(move || {
            let mut last_fingerprint: Option<[u8; 32]> = None;
            while !cancel_for_thread.load(Ordering::SeqCst) {
                if let Ok(body) = fetch_ledger_body(&agent, &config, &url, &authorization) {
                    let fingerprint = snapshot_fingerprint(&body);
                    if last_fingerprint != Some(fingerprint) {
                        if let Ok(ledger) = parse_ledger_document(&body) {
                            last_fingerprint = Some(fingerprint);
                            on_change(ledger);
                        }
                    }
                }
                sleep_with_cancel(&cancel_for_thread, config.poll_interval_ms);
            }
        });
        SubscriptionHandle {
            cancel,
            join: Some(join),
        }
    }
}

/// Cancellation handle for one live-update subscription. Dropping the
/// handle also stops the poller, without waiting for the thread.
pub struct SubscriptionHandle {
    cancel: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub fn cancel(mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

fn sleep_with_cancel(cancel: &AtomicBool, total_ms: u64) {
    let mut remaining = total_ms;
    while remaining > 0 && !cancel.load(Ordering::SeqCst) {
        let step = remaining.min(25);
        thread::sleep(Duration::from_millis(step));
        remaining -= step;
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

fn fetch_ledger_body(
    agent: &ureq::Agent,
    config: &RemoteStoreConfig,
    url: &str,
    authorization: &str,
) -> Result<String, RemoteStoreError> {
    if let Some(fixture) = &config.ledger_fixture_json {
        return Ok(fixture.clone());
    }
    let response = agent
        .get(url)
        .set("Authorization", authorization)
        .call()
        .map_err(unavailable_from_ureq)?;
    response.into_string().map_err(|_| RemoteStoreError::Unavailable {
        status: None,
        kind: "read_body",
    })
}

pub(crate) fn parse_ledger_document(body: &str) -> Result<Ledger, RemoteStoreError> {
    let document: RemoteLedgerDocument =
        serde_json::from_str(body).map_err(|err| RemoteStoreError::Decode(err.to_string()))?;
    let ledger = Ledger::from_parts(document.debts, document.names);
    ledger
        .validate()
        .map_err(|violation| RemoteStoreError::Decode(format!("{violation:?}")))?;
    Ok(ledger)
}

pub(crate) fn snapshot_fingerprint(body: &str) -> [u8; 32] {
    Sha256::digest(body.as_bytes()).into()
}

fn unavailable_from_ureq(err: ureq::Error) -> RemoteStoreError {
    match err {
        ureq::Error::Status(status, _) => RemoteStoreError::Unavailable {
            status: Some(status),
            kind: "http_status",
        },
        ureq::Error::Transport(transport) => RemoteStoreError::Unavailable {
            status: None,
            kind: transport_kind(&transport),
        },
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

pub(crate) fn ledger_url(base: &str, owner: &OwnerId) -> String {
    format!(
        "{}/owners/{}/ledger",
        base.trim_end_matches('/'),
        encode_segment(owner.as_str())
    )
}

fn debt_url(base: &str, owner: &OwnerId, id: &DebtorName) -> String {
    format!(
        "{}/owners/{}/debts/{}",
        base.trim_end_matches('/'),
        encode_segment(owner.as_str()),
        encode_segment(id.as_str())
    )
}

fn name_url(base: &str, owner: &OwnerId, id: &NameId) -> String {
    format!(
        "{}/owners/{}/names/{}",
        base.trim_end_matches('/'),
        encode_segment(owner.as_str()),
        encode_segment(id.as_str())
    )
}

fn batch_url(base: &str, owner: &OwnerId) -> String {
    format!(
        "{}/owners/{}/batch",
        base.trim_end_matches('/'),
        encode_segment(owner.as_str())
    )
}

/// Percent-encodes one path segment. Debtor names are user text and may
/// contain anything.
pub(crate) fn encode_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
