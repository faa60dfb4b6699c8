use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quote_request::QuoteParameters;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub String);

/// Append-only record of a delivered quote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: LeadId,
    pub recipient: String,
    pub state: String,
    pub age: u32,
    pub gender: String,
    pub face_amount: u64,
    pub product: String,
    pub mode: String,
    pub quote_result: String,
    pub table_rating: String,
    pub flat_extra: Decimal,
    pub created_at: DateTime<Utc>,
}

impl LeadRecord {
    pub fn from_quote(parameters: &QuoteParameters, quote_result: impl Into<String>) -> Self {
        Self {
            id: LeadId(uuid::Uuid::new_v4().to_string()),
            recipient: parameters.recipient.clone(),
            state: parameters.state.clone(),
            age: parameters.age,
            gender: parameters.gender.as_str().to_string(),
            face_amount: parameters.face_amount,
            product: parameters.product.label().to_string(),
            mode: parameters.mode.label().to_string(),
            quote_result: quote_result.into(),
            table_rating: parameters.table_rating.clone(),
            flat_extra: parameters.flat_extra,
            created_at: Utc::now(),
        }
    }
}
