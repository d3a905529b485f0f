#![forbid(unsafe_code)]

use std::env;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use debtflow_contracts::documents::{
    Invoice, InvoiceRequest, PaymentPlan, PaymentPlanRequest, DEFAULT_INCOME_RATIO,
};
use debtflow_contracts::{ContractViolation, Validate};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

pub const INVOICE_DUE_DAYS: i64 = 14;

#[derive(Debug)]
pub enum DocumentError {
    /// The AI provider key is not in the device vault.
    MissingApiKey,
    Unavailable {
        status: Option<u16>,
        kind: &'static str,
    },
    /// The provider answered but the payload was not the requested JSON.
    Malformed(String),
    Contract(ContractViolation),
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "ai provider api key is not configured"),
            Self::Unavailable { status, kind } => match status {
                Some(status) => write!(f, "ai provider unavailable: {kind} status={status}"),
                None => write!(f, "ai provider unavailable: {kind}"),
            },
            Self::Malformed(detail) => write!(f, "ai provider payload invalid: {detail}"),
            Self::Contract(violation) => write!(f, "contract violation: {violation:?}"),
        }
    }
}

impl std::error::Error for DocumentError {}

impl From<ContractViolation> for DocumentError {
    fn from(value: ContractViolation) -> Self {
        Self::Contract(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentProviderConfig {
    pub generation_url: String,
    pub model: String,
    pub user_agent: String,
    pub timeout_ms: u32,
    /// Resolved from the device vault at startup, never from env.
    pub api_key: Option<String>,
    pub invoice_fixture_json: Option<String>,
}

impl DocumentProviderConfig {
    pub fn from_env() -> Self {
        Self {
            generation_url: env::var("DEBTFLOW_AI_GENERATION_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/responses".to_string()),
            model: env::var("DEBTFLOW_AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            user_agent: env::var("DEBTFLOW_AI_HTTP_USER_AGENT")
                .unwrap_or_else(|_| "debtflow-documents/1.0".to_string()),
            timeout_ms: env::var("DEBTFLOW_AI_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| (100..=120_000).contains(v))
                .unwrap_or(20_000),
            api_key: None,
            invoice_fixture_json: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerationBody<'a> {
    model: &'a str,
    input: &'a str,
}

/// Generates the invoice document through the AI provider. Pure
/// request/response; the ledger is never touched.
pub struct InvoiceEngine {
    config: DocumentProviderConfig,
    agent: ureq::Agent,
}

impl InvoiceEngine {
    pub fn new(config: DocumentProviderConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(u64::from(config.timeout_ms)))
            .user_agent(&config.user_agent)
            .build();
        Self { config, agent }
    }

    pub fn generate(&self, request: &InvoiceRequest) -> Result<Invoice, DocumentError> {
        request.validate()?;
        if let Some(fixture) = &self.config.invoice_fixture_json {
            return parse_invoice_text(fixture);
        }
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(DocumentError::MissingApiKey)?;
        let today = Utc::now().date_naive();
        let prompt = invoice_prompt(request, today);
        let body = GenerationBody {
            model: &self.config.model,
            input: &prompt,
        };
        let response = self
            .agent
            .post(&self.config.generation_url)
            .set("Authorization", &format!("Bearer {api_key}"))
            .send_json(body);
        let raw = match response {
            Ok(response) => response.into_string().map_err(|_| DocumentError::Unavailable {
                status: None,
                kind: "read_body",
            })?,
            Err(ureq::Error::Status(status, _)) => {
                return Err(DocumentError::Unavailable {
                    status: Some(status),
                    kind: "http_status",
                });
            }
            Err(ureq::Error::Transport(_)) => {
                return Err(DocumentError::Unavailable {
                    status: None,
                    kind: "transport",
                });
            }
        };
        let value: Value =
            serde_json::from_str(&raw).map_err(|err| DocumentError::Malformed(err.to_string()))?;
        let text = extract_output_text(&value)
            .ok_or_else(|| DocumentError::Malformed("no output text in response".to_string()))?;
        parse_invoice_text(&text)
    }
}

pub(crate) fn invoice_prompt(request: &InvoiceRequest, today: NaiveDate) -> String {
    let due = today + chrono::Duration::days(INVOICE_DUE_DAYS);
    format!(
        "You are an accounting assistant. Generate a simple invoice for the \
         details below and answer with a single JSON object with exactly the \
         keys invoiceNumber, issueDate, dueDate, notes.\n\
         \n\
         Creditor Name: {creditor}\n\
         Debtor Name: {debtor}\n\
         Debt Amount: {amount}\n\
         \n\
         Requirements:\n\
         - invoiceNumber: INV-XXXX where XXXX is a random 4-digit number.\n\
         - issueDate: {today} (today, YYYY-MM-DD).\n\
         - dueDate: {due} (14 days from today, YYYY-MM-DD).\n\
         - notes: a short, professional, friendly payment reminder for the debtor.",
        creditor = request.creditor_name,
        debtor = request.debtor_name.as_str(),
        amount = request.debt_amount.get(),
        today = today.format("%Y-%m-%d"),
        due = due.format("%Y-%m-%d"),
    )
}

/// Accepts the provider text with or without code fences or prose around
/// the JSON object.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn parse_invoice_text(text: &str) -> Result<Invoice, DocumentError> {
    let payload = extract_json_object(text)
        .ok_or_else(|| DocumentError::Malformed("no JSON object in output".to_string()))?;
    let invoice: Invoice =
        serde_json::from_str(payload).map_err(|err| DocumentError::Malformed(err.to_string()))?;
    invoice.validate()?;
    Ok(invoice)
}

/// Walks the provider response for the generated text. Supports both the
/// flattened `output_text` field and the structured output list.
pub(crate) fn extract_output_text(value: &Value) -> Option<String> {
    if let Some(text) = value.get("output_text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    for item in value.get("output")?.as_array()? {
        if let Some(content) = item.get("content").and_then(Value::as_array) {
            for part in content {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    return Some(text.to_string());
                }
            }
        }
    }
    None
}

/// Suggests a payment plan from the debt amount and the income share the
/// debtor can allocate. Deliberately deterministic: the suggestion is
/// simple arithmetic, not a model call.
pub struct PaymentPlanEngine;

impl PaymentPlanEngine {
    pub fn suggest(request: &PaymentPlanRequest) -> Result<PaymentPlan, ContractViolation> {
        request.validate()?;
        if request.debt_amount.is_zero() {
            return Ok(PaymentPlan {
                suggested_payment_amount: Decimal::ZERO,
                payment_duration_in_months: 0,
                reasoning: "There is no outstanding debt to settle.".to_string(),
            });
        }
        let ratio = if request.average_income_ratio > 0.0 {
            request.average_income_ratio
        } else {
            DEFAULT_INCOME_RATIO
        };
        let ratio_decimal =
            Decimal::from_f64(ratio).ok_or(ContractViolation::NotFinite {
                field: "payment_plan_request.average_income_ratio",
            })?;
        let mut suggested = (request.debt_amount * ratio_decimal).round_dp(2);
        if suggested <= Decimal::ZERO {
            // Tiny ratios round to zero; one cent is the smallest plan.
            suggested = Decimal::new(1, 2);
        }
        let months = (request.debt_amount / suggested)
            .ceil()
            .to_u32()
            .unwrap_or(u32::MAX);
        Ok(PaymentPlan {
            suggested_payment_amount: suggested,
            payment_duration_in_months: months,
            reasoning: format!(
                "Allocating {:.0}% of the debt per month balances quick \
                 settlement against affordability.",
                ratio * 100.0
            ),
        })
    }
}
