#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use debtflow_app::backend::{
    ActiveBackend, BackendError, LedgerBackend, LocalBackend, RemoteBackend,
};
use debtflow_app::ops::{self, LedgerOpError, LedgerOpKind};
use debtflow_app::reconcile::{reconcile_sign_in, MergeError, MergeOutcome, MergeReport};
use debtflow_contracts::auth::{AuthSession, Credentials, SessionState};
use debtflow_contracts::documents::{
    Invoice, InvoiceRequest, PaymentPlan, PaymentPlanRequest, DEFAULT_INCOME_RATIO,
};
use debtflow_contracts::ledger::{Amount, DebtorName, Ledger, NameId};
use debtflow_contracts::provider_secrets::ProviderSecretId;
use debtflow_contracts::{ContractViolation, UnixTimeMs};
use debtflow_engines::auth::{AuthConfig, AuthError, AuthRuntime};
use debtflow_engines::device_vault::DeviceVault;
use debtflow_engines::documents::{
    DocumentError, DocumentProviderConfig, InvoiceEngine, PaymentPlanEngine,
};
use debtflow_engines::remote_store::{RemoteStoreConfig, RemoteStoreRuntime, SubscriptionHandle};
use debtflow_storage::LocalLedgerStore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CREDITOR_NAME: &str = "The creditor";

/// Adapter-level failure: a stable machine code plus a human reason.
/// The HTTP binary maps codes onto status lines via `failure_http_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterFailure {
    pub code: &'static str,
    pub reason: String,
}

impl AdapterFailure {
    fn new(code: &'static str, reason: String) -> Self {
        Self { code, reason }
    }
}

pub fn failure_http_status(code: &str) -> u16 {
    match code {
        "validation_error" | "weak_password" => 400,
        "invalid_credentials" | "not_signed_in" => 401,
        "no_such_debtor" | "no_such_name" => 404,
        "over_payment" | "duplicate_name" | "email_already_in_use" => 409,
        "remote_unavailable" | "auth_unavailable" | "ai_unavailable" => 502,
        "ai_not_configured" => 503,
        _ => 500,
    }
}

fn validation_failure(violation: ContractViolation) -> AdapterFailure {
    AdapterFailure::new("validation_error", format!("{violation:?}"))
}

fn op_failure(err: LedgerOpError) -> AdapterFailure {
    let reason = err.to_string();
    match err {
        LedgerOpError::Contract(_) => AdapterFailure::new("validation_error", reason),
        LedgerOpError::NoSuchDebtor { .. } => AdapterFailure::new("no_such_debtor", reason),
        LedgerOpError::OverPayment { .. } => AdapterFailure::new("over_payment", reason),
        LedgerOpError::DuplicateName { .. } => AdapterFailure::new("duplicate_name", reason),
        LedgerOpError::NoSuchName { .. } => AdapterFailure::new("no_such_name", reason),
        LedgerOpError::Backend(BackendError::Store(_)) => {
            AdapterFailure::new("local_store_error", reason)
        }
        LedgerOpError::Backend(BackendError::Remote(_)) => {
            AdapterFailure::new("remote_unavailable", reason)
        }
    }
}

fn backend_failure(err: BackendError) -> AdapterFailure {
    let reason = err.to_string();
    match err {
        BackendError::Store(_) => AdapterFailure::new("local_store_error", reason),
        BackendError::Remote(_) => AdapterFailure::new("remote_unavailable", reason),
    }
}

fn auth_failure(err: AuthError) -> AdapterFailure {
    let reason = err.to_string();
    match err {
        AuthError::InvalidCredentials => AdapterFailure::new("invalid_credentials", reason),
        AuthError::EmailAlreadyInUse => AdapterFailure::new("email_already_in_use", reason),
        AuthError::WeakPassword => AdapterFailure::new("weak_password", reason),
        AuthError::Contract(_) => AdapterFailure::new("validation_error", reason),
        AuthError::Unavailable { .. } | AuthError::Provider(_) => {
            AdapterFailure::new("auth_unavailable", reason)
        }
    }
}

fn document_failure(err: DocumentError) -> AdapterFailure {
    let reason = err.to_string();
    match err {
        DocumentError::MissingApiKey => AdapterFailure::new("ai_not_configured", reason),
        DocumentError::Unavailable { .. } | DocumentError::Malformed(_) => {
            AdapterFailure::new("ai_unavailable", reason)
        }
        DocumentError::Contract(_) => AdapterFailure::new("validation_error", reason),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReportDto {
    pub debts_written: usize,
    pub names_written: usize,
    pub local_cleared: bool,
}

impl From<MergeReport> for MergeReportDto {
    fn from(report: MergeReport) -> Self {
        Self {
            debts_written: report.debts_written,
            names_written: report.names_written,
            local_cleared: report.local_cleared,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub status: String,
    pub owner_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub merge: Option<MergeReportDto>,
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignOutResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebtRecordDto {
    pub debtor_name: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedNameDto {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerResponse {
    pub status: String,
    pub backend: String,
    pub records: Vec<DebtRecordDto>,
    pub names: Vec<SavedNameDto>,
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DebtMutationRequest {
    pub debtor_name: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpResponse {
    pub status: String,
    pub operation: String,
    pub debtor_name: String,
    pub balance: Decimal,
    pub settled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NameCreateRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NameResponse {
    pub status: String,
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceRequestDto {
    pub debtor_name: String,
    pub debt_amount: Decimal,
    pub creditor_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceResponse {
    pub status: String,
    pub invoice: Invoice,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentPlanRequestDto {
    pub debtor_name: String,
    /// Defaults to the debtor's current balance in the active ledger.
    pub debt_amount: Option<Decimal>,
    pub average_income_ratio: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentPlanResponse {
    pub status: String,
    pub plan: PaymentPlan,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
    pub signed_in: bool,
    pub live_subscription: bool,
}

/// Composition root: owns the store/auth/AI clients constructed once at
/// startup and the session state selecting the active backend. The HTTP
/// binary holds exactly one runtime behind a mutex, which is what keeps
/// ledger operations single-flight.
pub struct AdapterRuntime {
    local_store: LocalLedgerStore,
    remote: RemoteStoreRuntime,
    auth: AuthRuntime,
    invoice: InvoiceEngine,
    session: SessionState,
    subscription: Option<SubscriptionHandle>,
    /// Latest snapshot pushed by the live subscription. Each delivery
    /// replaces the view wholesale; cleared on sign-out and after local
    /// mutations so reads never serve a stale own-write.
    live_view: Arc<Mutex<Option<Ledger>>>,
}

impl AdapterRuntime {
    pub fn default_from_env() -> Result<Self, String> {
        let vault = DeviceVault::default_local();
        let ai_api_key = vault
            .secret(ProviderSecretId::AiApiKey)
            .map_err(|err| format!("vault read failed: {err}"))?;
        let auth_api_key = vault
            .secret(ProviderSecretId::AuthApiKey)
            .map_err(|err| format!("vault read failed: {err}"))?;

        let mut auth_config = AuthConfig::from_env();
        auth_config.api_key = auth_api_key;
        let mut document_config = DocumentProviderConfig::from_env();
        document_config.api_key = ai_api_key;

        Ok(Self::new(
            LocalLedgerStore::default_local(),
            RemoteStoreRuntime::new(RemoteStoreConfig::from_env()),
            AuthRuntime::new(auth_config),
            InvoiceEngine::new(document_config),
        ))
    }

    pub fn new(
        local_store: LocalLedgerStore,
        remote: RemoteStoreRuntime,
        auth: AuthRuntime,
        invoice: InvoiceEngine,
    ) -> Self {
        Self {
            local_store,
            remote,
            auth,
            invoice,
            session: SessionState::SignedOut,
            subscription: None,
            live_view: Arc::new(Mutex::new(None)),
        }
    }

    pub fn health_report(&self) -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
            backend: self.backend_label().to_string(),
            signed_in: self.session.is_signed_in(),
            live_subscription: self.subscription.is_some(),
        }
    }

    pub fn sign_in(&mut self, request: SignInRequest) -> Result<SessionResponse, AdapterFailure> {
        let credentials =
            Credentials::v1(request.email, request.password).map_err(validation_failure)?;
        let session = self.auth.sign_in(&credentials).map_err(auth_failure)?;
        Ok(self.adopt_session(session))
    }

    pub fn sign_up(&mut self, request: SignUpRequest) -> Result<SessionResponse, AdapterFailure> {
        let credentials =
            Credentials::v1(request.email, request.password).map_err(validation_failure)?;
        let session = self
            .auth
            .sign_up(&credentials, &request.display_name)
            .map_err(auth_failure)?;
        Ok(self.adopt_session(session))
    }

    /// Sign-out is a pure state swap: cancel the subscription, drop the
    /// remote view, fall back to the local ledger. No data moves.
    pub fn sign_out(&mut self) -> SignOutResponse {
        if let Some(handle) = self.subscription.take() {
            handle.cancel();
        }
        self.clear_live_view();
        self.session = SessionState::SignedOut;
        SignOutResponse {
            status: "ok".to_string(),
        }
    }

    pub fn ledger(&mut self) -> Result<LedgerResponse, AdapterFailure> {
        match &self.session {
            SessionState::SignedOut => {
                let loaded = self.local_store.load();
                let notice = loaded
                    .recovered_from_corruption
                    .then(|| "local data was unreadable and has been reset".to_string());
                Ok(ledger_response("local", &loaded.ledger, notice))
            }
            SessionState::SignedIn(session) => {
                if let Some(ledger) = self.cached_live_view() {
                    return Ok(ledger_response("remote", &ledger, None));
                }
                let ledger = self
                    .remote
                    .load_all(&session.owner_id, &session.id_token)
                    .map_err(|err| AdapterFailure::new("remote_unavailable", err.to_string()))?;
                Ok(ledger_response("remote", &ledger, None))
            }
        }
    }

    pub fn register_debt(
        &mut self,
        request: DebtMutationRequest,
    ) -> Result<OpResponse, AdapterFailure> {
        let receipt = {
            let mut backend = self.active_backend();
            ops::register_debt(&mut backend, &request.debtor_name, request.amount)
                .map_err(op_failure)?
        };
        self.clear_live_view();
        Ok(op_response(receipt))
    }

    pub fn apply_payment(
        &mut self,
        request: DebtMutationRequest,
    ) -> Result<OpResponse, AdapterFailure> {
        let receipt = {
            let mut backend = self.active_backend();
            ops::apply_payment(&mut backend, &request.debtor_name, request.amount)
                .map_err(op_failure)?
        };
        self.clear_live_view();
        Ok(op_response(receipt))
    }

    pub fn add_name(&mut self, request: NameCreateRequest) -> Result<NameResponse, AdapterFailure> {
        let entry = {
            let mut backend = self.active_backend();
            ops::add_saved_name(&mut backend, &request.name, unix_now_ms()).map_err(op_failure)?
        };
        self.clear_live_view();
        Ok(NameResponse {
            status: "ok".to_string(),
            id: entry.id.as_str().to_string(),
            name: entry.name,
        })
    }

    pub fn remove_name(&mut self, raw_id: &str) -> Result<NameResponse, AdapterFailure> {
        let id = NameId::new(raw_id).map_err(validation_failure)?;
        let entry = {
            let mut backend = self.active_backend();
            ops::remove_saved_name(&mut backend, &id).map_err(op_failure)?
        };
        self.clear_live_view();
        Ok(NameResponse {
            status: "ok".to_string(),
            id: entry.id.as_str().to_string(),
            name: entry.name,
        })
    }

    pub fn generate_invoice(
        &mut self,
        request: InvoiceRequestDto,
    ) -> Result<InvoiceResponse, AdapterFailure> {
        let debtor = DebtorName::new(&request.debtor_name).map_err(validation_failure)?;
        let amount = Amount::new(request.debt_amount).map_err(validation_failure)?;
        let creditor = request
            .creditor_name
            .filter(|name| !name.trim().is_empty())
            .or_else(|| {
                self.session
                    .session()
                    .and_then(|session| session.display_name.clone())
            })
            .unwrap_or_else(|| DEFAULT_CREDITOR_NAME.to_string());
        let invoice_request =
            InvoiceRequest::v1(debtor, amount, creditor).map_err(validation_failure)?;
        let invoice = self
            .invoice
            .generate(&invoice_request)
            .map_err(document_failure)?;
        Ok(InvoiceResponse {
            status: "ok".to_string(),
            invoice,
        })
    }

    pub fn suggest_payment_plan(
        &mut self,
        request: PaymentPlanRequestDto,
    ) -> Result<PaymentPlanResponse, AdapterFailure> {
        let debtor = DebtorName::new(&request.debtor_name).map_err(validation_failure)?;
        let amount = match request.debt_amount {
            Some(amount) => amount,
            None => {
                let mut backend = self.active_backend();
                let ledger = backend.snapshot().map_err(backend_failure)?;
                ledger
                    .record(&debtor)
                    .map(|record| record.amount.get())
                    .ok_or_else(|| {
                        AdapterFailure::new(
                            "no_such_debtor",
                            format!("no debt recorded for {}", debtor.as_str()),
                        )
                    })?
            }
        };
        let ratio = request.average_income_ratio.unwrap_or(DEFAULT_INCOME_RATIO);
        let plan_request =
            PaymentPlanRequest::v1(debtor, amount, ratio).map_err(validation_failure)?;
        let plan = PaymentPlanEngine::suggest(&plan_request).map_err(validation_failure)?;
        Ok(PaymentPlanResponse {
            status: "ok".to_string(),
            plan,
        })
    }

    fn adopt_session(&mut self, session: AuthSession) -> SessionResponse {
        let mut merge = None;
        let mut notice = None;
        match reconcile_sign_in(
            &self.local_store,
            &self.remote,
            &session.owner_id,
            &session.id_token,
        ) {
            Ok(MergeOutcome::NothingToMerge { .. }) => {}
            Ok(MergeOutcome::Merged { report, .. }) => {
                if !report.local_cleared {
                    notice = Some(
                        "merged, but the local blob could not be removed; \
                         the next sign-in converges to the same state"
                            .to_string(),
                    );
                }
                merge = Some(MergeReportDto::from(report));
            }
            Err(MergeError::Load(err)) => {
                notice = Some(format!("remote ledger unavailable: {err}"));
            }
            Err(MergeError::Commit { error, .. }) => {
                notice = Some(format!(
                    "sync failed, device data was kept for the next attempt: {error}"
                ));
            }
        }
        self.clear_live_view();
        self.start_subscription(&session);
        let response = SessionResponse {
            status: "ok".to_string(),
            owner_id: session.owner_id.as_str().to_string(),
            email: session.email.clone(),
            display_name: session.display_name.clone(),
            merge,
            notice,
        };
        self.session = SessionState::SignedIn(session);
        response
    }

    fn start_subscription(&mut self, session: &AuthSession) {
        if let Some(previous) = self.subscription.take() {
            previous.cancel();
        }
        let live_view = Arc::clone(&self.live_view);
        let handle = self.remote.subscribe(
            &session.owner_id,
            &session.id_token,
            Box::new(move |ledger| {
                if let Ok(mut view) = live_view.lock() {
                    *view = Some(ledger);
                }
            }),
        );
        self.subscription = Some(handle);
    }

    fn active_backend(&self) -> ActiveBackend<'_, RemoteStoreRuntime> {
        match &self.session {
            SessionState::SignedOut => ActiveBackend::Local(LocalBackend::new(&self.local_store)),
            SessionState::SignedIn(session) => ActiveBackend::Remote(RemoteBackend::new(
                &self.remote,
                &session.owner_id,
                &session.id_token,
            )),
        }
    }

    fn backend_label(&self) -> &'static str {
        match self.session {
            SessionState::SignedOut => "local",
            SessionState::SignedIn(_) => "remote",
        }
    }

    fn cached_live_view(&self) -> Option<Ledger> {
        self.live_view.lock().ok().and_then(|view| view.clone())
    }

    fn clear_live_view(&self) {
        if let Ok(mut view) = self.live_view.lock() {
            *view = None;
        }
    }
}

fn ledger_response(backend: &str, ledger: &Ledger, notice: Option<String>) -> LedgerResponse {
    LedgerResponse {
        status: "ok".to_string(),
        backend: backend.to_string(),
        records: ledger
            .sorted_records()
            .into_iter()
            .map(|record| DebtRecordDto {
                debtor_name: record.debtor_name.as_str().to_string(),
                amount: record.amount.get(),
            })
            .collect(),
        names: ledger
            .names
            .iter()
            .map(|entry| SavedNameDto {
                id: entry.id.as_str().to_string(),
                name: entry.name.clone(),
            })
            .collect(),
        notice,
    }
}

fn op_response(receipt: ops::OpReceipt) -> OpResponse {
    OpResponse {
        status: "ok".to_string(),
        operation: match receipt.kind {
            LedgerOpKind::RegisterDebt => "register_debt".to_string(),
            LedgerOpKind::ApplyPayment => "apply_payment".to_string(),
        },
        debtor_name: receipt.debtor_name.as_str().to_string(),
        balance: receipt.balance,
        settled: receipt.settled,
    }
}

fn unix_now_ms() -> UnixTimeMs {
    use std::time::{SystemTime, UNIX_EPOCH};
    UnixTimeMs(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    const SESSION_FIXTURE: &str = r#"{
        "owner_id": "owner_1",
        "email": "ali@example.test",
        "display_name": "Ali",
        "id_token": "token-abc"
    }"#;

    const REMOTE_FIXTURE: &str = r#"{
        "debts": [
            {"id": "Sara", "debtor_name": "Sara", "amount": 70},
            {"id": "Omar", "debtor_name": "Omar", "amount": 120}
        ],
        "names": []
    }"#;

    const INVOICE_FIXTURE: &str = r#"{"invoiceNumber": "INV-4821",
        "issueDate": "2026-08-07", "dueDate": "2026-08-21",
        "notes": "Please settle within two weeks."}"#;

    fn temp_dir(tag: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(1);
        let base = std::env::temp_dir().join(format!("debtflow-adapter-{tag}-{suffix}"));
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn fixture_runtime(base: &PathBuf) -> AdapterRuntime {
        let remote_config = RemoteStoreConfig {
            base_url: "http://remote.invalid/v1".to_string(),
            timeout_ms: 1_000,
            user_agent: "debtflow-test/1.0".to_string(),
            poll_interval_ms: 100,
            ledger_fixture_json: Some(REMOTE_FIXTURE.to_string()),
        };
        let auth_config = AuthConfig {
            base_url: "http://auth.invalid/v1".to_string(),
            timeout_ms: 1_000,
            user_agent: "debtflow-test/1.0".to_string(),
            api_key: None,
            sign_in_fixture_json: Some(SESSION_FIXTURE.to_string()),
            sign_up_fixture_json: Some(SESSION_FIXTURE.to_string()),
        };
        let mut document_config = DocumentProviderConfig::from_env();
        document_config.invoice_fixture_json = Some(INVOICE_FIXTURE.to_string());
        AdapterRuntime::new(
            LocalLedgerStore::for_dir(base),
            RemoteStoreRuntime::new(remote_config),
            AuthRuntime::new(auth_config),
            InvoiceEngine::new(document_config),
        )
    }

    fn sign_in_request() -> SignInRequest {
        SignInRequest {
            email: "ali@example.test".to_string(),
            password: "secret-1".to_string(),
        }
    }

    #[test]
    fn at_adapter_01_signed_out_ops_go_to_local_store_sorted() {
        let base = temp_dir("local-ops");
        let mut runtime = fixture_runtime(&base);
        runtime
            .register_debt(DebtMutationRequest {
                debtor_name: "Ali".to_string(),
                amount: "50".parse().unwrap(),
            })
            .unwrap();
        runtime
            .register_debt(DebtMutationRequest {
                debtor_name: "Sara".to_string(),
                amount: "120".parse().unwrap(),
            })
            .unwrap();
        let ledger = runtime.ledger().unwrap();
        assert_eq!(ledger.backend, "local");
        assert_eq!(ledger.records[0].debtor_name, "Sara");
        assert_eq!(ledger.records[1].debtor_name, "Ali");
        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_adapter_02_sign_in_adopts_remote_backend() {
        let base = temp_dir("adopt");
        let mut runtime = fixture_runtime(&base);
        let response = runtime.sign_in(sign_in_request()).unwrap();
        assert_eq!(response.owner_id, "owner_1");
        assert!(response.merge.is_none());

        let ledger = runtime.ledger().unwrap();
        assert_eq!(ledger.backend, "remote");
        assert_eq!(ledger.records.len(), 2);
        assert_eq!(ledger.records[0].debtor_name, "Omar");

        let health = runtime.health_report();
        assert!(health.signed_in);
        assert!(health.live_subscription);
        runtime.sign_out();
        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_adapter_03_merge_commit_failure_keeps_local_and_notices() {
        // The fixture serves reads, but batch commits hit the network
        // and fail: exactly the merge-failure path.
        let base = temp_dir("merge-fail");
        let mut runtime = fixture_runtime(&base);
        runtime
            .register_debt(DebtMutationRequest {
                debtor_name: "Ali".to_string(),
                amount: "50".parse().unwrap(),
            })
            .unwrap();
        let response = runtime.sign_in(sign_in_request()).unwrap();
        assert!(response.merge.is_none());
        assert!(response.notice.is_some());
        runtime.sign_out();
        // Back on the local backend, the device data is intact.
        let ledger = runtime.ledger().unwrap();
        assert_eq!(ledger.backend, "local");
        assert_eq!(ledger.records.len(), 1);
        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_adapter_04_sign_out_cancels_subscription_and_swaps_backend() {
        let base = temp_dir("signout");
        let mut runtime = fixture_runtime(&base);
        runtime.sign_in(sign_in_request()).unwrap();
        let response = runtime.sign_out();
        assert_eq!(response.status, "ok");
        let health = runtime.health_report();
        assert!(!health.signed_in);
        assert!(!health.live_subscription);
        assert_eq!(runtime.ledger().unwrap().backend, "local");
        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_adapter_05_invoice_defaults_creditor_to_display_name() {
        let base = temp_dir("invoice");
        let mut runtime = fixture_runtime(&base);
        runtime.sign_in(sign_in_request()).unwrap();
        let response = runtime
            .generate_invoice(InvoiceRequestDto {
                debtor_name: "Sara".to_string(),
                debt_amount: "70".parse().unwrap(),
                creditor_name: None,
            })
            .unwrap();
        assert_eq!(response.invoice.invoice_number, "INV-4821");
        runtime.sign_out();
        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_adapter_06_payment_plan_resolves_balance_from_active_ledger() {
        let base = temp_dir("plan");
        let mut runtime = fixture_runtime(&base);
        runtime
            .register_debt(DebtMutationRequest {
                debtor_name: "Sara".to_string(),
                amount: "1000".parse().unwrap(),
            })
            .unwrap();
        let response = runtime
            .suggest_payment_plan(PaymentPlanRequestDto {
                debtor_name: "Sara".to_string(),
                debt_amount: None,
                average_income_ratio: None,
            })
            .unwrap();
        assert_eq!(
            response.plan.suggested_payment_amount,
            "100.00".parse().unwrap()
        );
        assert_eq!(response.plan.payment_duration_in_months, 10);

        let missing = runtime.suggest_payment_plan(PaymentPlanRequestDto {
            debtor_name: "Nobody".to_string(),
            debt_amount: None,
            average_income_ratio: None,
        });
        assert_eq!(missing.unwrap_err().code, "no_such_debtor");
        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_adapter_07_failure_codes_map_to_http_statuses() {
        assert_eq!(failure_http_status("validation_error"), 400);
        assert_eq!(failure_http_status("invalid_credentials"), 401);
        assert_eq!(failure_http_status("no_such_debtor"), 404);
        assert_eq!(failure_http_status("over_payment"), 409);
        assert_eq!(failure_http_status("remote_unavailable"), 502);
        assert_eq!(failure_http_status("ai_not_configured"), 503);
        assert_eq!(failure_http_status("anything_else"), 500);
    }
}
