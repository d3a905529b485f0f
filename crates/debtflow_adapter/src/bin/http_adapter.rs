#![forbid(unsafe_code)]

use std::{
    env,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use debtflow_adapter::{
    failure_http_status, AdapterFailure, AdapterRuntime, DebtMutationRequest, InvoiceRequestDto,
    NameCreateRequest, PaymentPlanRequestDto, SignInRequest, SignUpRequest,
};
use serde_json::{json, Value};

type SharedRuntime = Arc<Mutex<AdapterRuntime>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bind = env::var("DEBTFLOW_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let addr: SocketAddr = bind.parse()?;

    let runtime = Arc::new(Mutex::new(AdapterRuntime::default_from_env()?));
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/session/sign-in", post(sign_in))
        .route("/v1/session/sign-up", post(sign_up))
        .route("/v1/session/sign-out", post(sign_out))
        .route("/v1/ledger", get(ledger))
        .route("/v1/ledger/debts", post(register_debt))
        .route("/v1/ledger/payments", post(apply_payment))
        .route("/v1/ledger/names", post(add_name))
        .route("/v1/ledger/names/:id", delete(remove_name))
        .route("/v1/documents/invoice", post(generate_invoice))
        .route("/v1/documents/payment-plan", post(suggest_payment_plan))
        .with_state(runtime);

    println!("debtflow_http listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn ok_json<T: serde::Serialize>(value: T) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(serde_json::to_value(value).unwrap_or(Value::Null)),
    )
}

fn fail_json(failure: AdapterFailure) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(failure_http_status(failure.code))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        eprintln!(
            "debtflow_http request failed code={} reason={}",
            failure.code, failure.reason
        );
    }
    (
        status,
        Json(json!({
            "status": "error",
            "code": failure.code,
            "reason": failure.reason,
        })),
    )
}

fn lock_poisoned() -> (StatusCode, Json<Value>) {
    eprintln!("debtflow_http adapter runtime lock poisoned");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "status": "error",
            "code": "internal",
            "reason": "adapter runtime lock poisoned",
        })),
    )
}

async fn healthz(State(runtime): State<SharedRuntime>) -> (StatusCode, Json<Value>) {
    match runtime.lock() {
        Ok(runtime) => ok_json(runtime.health_report()),
        Err(_) => lock_poisoned(),
    }
}

async fn sign_in(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<SignInRequest>,
) -> (StatusCode, Json<Value>) {
    let mut runtime = match runtime.lock() {
        Ok(runtime) => runtime,
        Err(_) => return lock_poisoned(),
    };
    match runtime.sign_in(request) {
        Ok(response) => ok_json(response),
        Err(failure) => fail_json(failure),
    }
}

async fn sign_up(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<SignUpRequest>,
) -> (StatusCode, Json<Value>) {
    let mut runtime = match runtime.lock() {
        Ok(runtime) => runtime,
        Err(_) => return lock_poisoned(),
    };
    match runtime.sign_up(request) {
        Ok(response) => ok_json(response),
        Err(failure) => fail_json(failure),
    }
}

async fn sign_out(State(runtime): State<SharedRuntime>) -> (StatusCode, Json<Value>) {
    let mut runtime = match runtime.lock() {
        Ok(runtime) => runtime,
        Err(_) => return lock_poisoned(),
    };
    ok_json(runtime.sign_out())
}

async fn ledger(State(runtime): State<SharedRuntime>) -> (StatusCode, Json<Value>) {
    let mut runtime = match runtime.lock() {
        Ok(runtime) => runtime,
        Err(_) => return lock_poisoned(),
    };
    match runtime.ledger() {
        Ok(response) => ok_json(response),
        Err(failure) => fail_json(failure),
    }
}

async fn register_debt(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<DebtMutationRequest>,
) -> (StatusCode, Json<Value>) {
    let mut runtime = match runtime.lock() {
        Ok(runtime) => runtime,
        Err(_) => return lock_poisoned(),
    };
    match runtime.register_debt(request) {
        Ok(response) => ok_json(response),
        Err(failure) => fail_json(failure),
    }
}

async fn apply_payment(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<DebtMutationRequest>,
) -> (StatusCode, Json<Value>) {
    let mut runtime = match runtime.lock() {
        Ok(runtime) => runtime,
        Err(_) => return lock_poisoned(),
    };
    match runtime.apply_payment(request) {
        Ok(response) => ok_json(response),
        Err(failure) => fail_json(failure),
    }
}

async fn add_name(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<NameCreateRequest>,
) -> (StatusCode, Json<Value>) {
    let mut runtime = match runtime.lock() {
        Ok(runtime) => runtime,
        Err(_) => return lock_poisoned(),
    };
    match runtime.add_name(request) {
        Ok(response) => ok_json(response),
        Err(failure) => fail_json(failure),
    }
}

async fn remove_name(
    State(runtime): State<SharedRuntime>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let mut runtime = match runtime.lock() {
        Ok(runtime) => runtime,
        Err(_) => return lock_poisoned(),
    };
    match runtime.remove_name(&id) {
        Ok(response) => ok_json(response),
        Err(failure) => fail_json(failure),
    }
}

async fn generate_invoice(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<InvoiceRequestDto>,
) -> (StatusCode, Json<Value>) {
    let mut runtime = match runtime.lock() {
        Ok(runtime) => runtime,
        Err(_) => return lock_poisoned(),
    };
    match runtime.generate_invoice(request) {
        Ok(response) => ok_json(response),
        Err(failure) => fail_json(failure),
    }
}

async fn suggest_payment_plan(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<PaymentPlanRequestDto>,
) -> (StatusCode, Json<Value>) {
    let mut runtime = match runtime.lock() {
        Ok(runtime) => runtime,
        Err(_) => return lock_poisoned(),
    };
    match runtime.suggest_payment_plan(request) {
        Ok(response) => ok_json(response),
        Err(failure) => fail_json(failure),
    }
}
