//! Natural-language field extraction.
//!
//! The model only translates the user's words into the field set; every value
//! it returns is normalized and validated downstream before anything runs.

use std::sync::Arc;

use async_trait::async_trait;
use raterbot_core::domain::quote_request::{FieldValue, QuoteRequest};
use raterbot_core::normalize;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::llm::{strip_code_fences, ChatMessage, ChatRequest, LlmClient, LlmError};

/// Sentinel the model uses for a mandatory field it could not determine.
pub const MISSING_SENTINEL: &str = "MISSING";

#[derive(Clone, Debug, PartialEq)]
pub struct Extraction {
    /// Full replacement for the stored request; `confirmed` is not decided here.
    pub request: QuoteRequest,
    pub user_agreed: bool,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("extraction response was not valid JSON: {0}")]
    Decode(String),
}

#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        current: &QuoteRequest,
    ) -> Result<Extraction, ExtractionError>;
}

pub struct LlmFieldExtractor {
    client: Arc<dyn LlmClient>,
}

impl LlmFieldExtractor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FieldExtractor for LlmFieldExtractor {
    async fn extract(
        &self,
        text: &str,
        current: &QuoteRequest,
    ) -> Result<Extraction, ExtractionError> {
        let prompt = build_prompt(text, current);
        let request = ChatRequest::deterministic(vec![ChatMessage::system(prompt)]);
        let raw = self.client.complete(&request).await?;
        decode_extraction(&raw)
    }
}

pub fn build_prompt(text: &str, current: &QuoteRequest) -> String {
    let known = serde_json::to_string(&KnownFields::from(current)).unwrap_or_else(|_| "{}".into());
    format!(
        r#"You are an insurance data assistant.
Current known data: {known}
New User Input: "{text}"

Update JSON. Fields: state, age, gender, faceAmount, product, mode, recipient, tableRating, flatExtra, userAgreed.

CRITICAL RULES:
1. Corrections: if the user contradicts themselves (e.g. "500k... no wait 1 million"), use the last spoken value.
2. State: convert to the 2-letter code (e.g. "Ohio" -> "OH").
3. Face Amount: if the user says "500", use 500000. If the user says "1 million", use 1000000. Minimum is 100000.
4. Product: MUST be 'QoL Flex Term' or 'QoL Guarantee Plus GUL II'. Default to 'QoL Flex Term'. NEVER put "Table" values here.
5. Table Rating: look for "Table" followed by a letter (e.g. "Table C"). Default: 'None'.
6. Flat Extra: look for an extra numeric cost (e.g. "Flat extra 2.50"). Default: 0.
7. Mode: 'Annual', 'Semi-Annual', 'Quarterly' or 'Monthly'. Default: 'Annual'.
8. Gender: Title Case ('Male' or 'Female').
9. Confirmation: if the user says "Yes" or "Run", set 'userAgreed' to true.
10. If a MANDATORY field (age, state, gender, faceAmount, recipient) is missing, set it to "MISSING".

Return ONLY JSON."#
    )
}

pub fn decode_extraction(raw: &str) -> Result<Extraction, ExtractionError> {
    let cleaned = strip_code_fences(raw);
    let fields: ExtractedFields =
        serde_json::from_str(&cleaned).map_err(|error| ExtractionError::Decode(error.to_string()))?;

    let request = QuoteRequest {
        recipient: mandatory(&fields.recipient, normalize::recipient),
        state: mandatory(&fields.state, normalize::state_code),
        age: mandatory(&fields.age, normalize::age),
        gender: mandatory(&fields.gender, normalize::gender),
        face_amount: mandatory(&fields.face_amount, normalize::face_amount),
        product: optional_text(&fields.product).map(|raw| normalize::product(&raw)).unwrap_or_default(),
        mode: optional_text(&fields.mode).map(|raw| normalize::mode(&raw)).unwrap_or_default(),
        table_rating: optional_text(&fields.table_rating)
            .map(|raw| normalize::table_rating(&raw))
            .unwrap_or_else(|| raterbot_core::NO_TABLE_RATING.to_string()),
        flat_extra: optional_text(&fields.flat_extra)
            .map(|raw| normalize::flat_extra(&raw))
            .unwrap_or_default(),
        confirmed: false,
        awaiting_confirmation: false,
    };

    Ok(Extraction { request, user_agreed: agreed(&fields.user_agreed) })
}

fn mandatory<T>(value: &Option<Value>, parse: impl Fn(&str) -> Option<T>) -> FieldValue<T> {
    let text = optional_text(value).filter(|text| !text.eq_ignore_ascii_case(MISSING_SENTINEL));
    FieldValue::determined(text.and_then(|text| parse(&text)))
}

fn optional_text(value: &Option<Value>) -> Option<String> {
    let text = match value.as_ref()? {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn agreed(value: &Option<Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => text.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractedFields {
    state: Option<Value>,
    age: Option<Value>,
    gender: Option<Value>,
    face_amount: Option<Value>,
    product: Option<Value>,
    mode: Option<Value>,
    recipient: Option<Value>,
    table_rating: Option<Value>,
    flat_extra: Option<Value>,
    user_agreed: Option<Value>,
}

/// The current request as shown to the model.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct KnownFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    age: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gender: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    face_amount: Option<Value>,
    product: String,
    mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipient: Option<Value>,
    table_rating: String,
    flat_extra: String,
}

impl From<&QuoteRequest> for KnownFields {
    fn from(request: &QuoteRequest) -> Self {
        Self {
            state: known(&request.state, |state| Value::from(state.clone())),
            age: known(&request.age, |age| Value::from(*age)),
            gender: known(&request.gender, |gender| Value::from(gender.as_str())),
            face_amount: known(&request.face_amount, |amount| Value::from(*amount)),
            product: request.product.label().to_string(),
            mode: request.mode.label().to_string(),
            recipient: known(&request.recipient, |recipient| Value::from(recipient.clone())),
            table_rating: request.table_rating.clone(),
            flat_extra: request.flat_extra.to_string(),
        }
    }
}

fn known<T>(field: &FieldValue<T>, render: impl Fn(&T) -> Value) -> Option<Value> {
    match field {
        FieldValue::Unset => None,
        FieldValue::Missing => Some(Value::from(MISSING_SENTINEL)),
        FieldValue::Value(value) => Some(render(value)),
    }
}
