use thiserror::Error;

use crate::domain::quote_request::QuoteRequest;

pub const MIN_AGE: u32 = 18;
pub const MAX_AGE: u32 = 85;
pub const MIN_FACE_AMOUNT: u64 = 100_000;

/// The 50 states plus DC.
pub const VALID_STATE_CODES: [&str; 51] = [
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ", "NM",
    "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT", "VA", "WA",
    "WV", "WI", "WY",
];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("❌ **{state}** is not a valid US State code.")]
    StateInvalid { state: String },
    #[error("❌ Age **{age}** is likely outside the quotable range (18-85).")]
    AgeOutOfRange { age: u32 },
    #[error("❌ Face Amount **${face_amount}** is too low. Minimum is $100,000.")]
    FaceAmountTooLow { face_amount: u64 },
}

pub fn is_valid_state_code(state: &str) -> bool {
    let upper = state.trim().to_ascii_uppercase();
    VALID_STATE_CODES.contains(&upper.as_str())
}

/// Business-rule checks on whatever fields are present. Each rule runs
/// independently so every violation is reported in one turn; absent fields
/// are not errors here.
pub fn validate(request: &QuoteRequest) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(state) = request.state.value().filter(|state| !state.trim().is_empty()) {
        if !is_valid_state_code(state) {
            errors.push(ValidationError::StateInvalid { state: state.clone() });
        }
    }

    if let Some(age) = request.age.value().copied().filter(|age| *age > 0) {
        if !(MIN_AGE..=MAX_AGE).contains(&age) {
            errors.push(ValidationError::AgeOutOfRange { age });
        }
    }

    if let Some(face_amount) = request.face_amount.value().copied().filter(|amount| *amount > 0) {
        if face_amount < MIN_FACE_AMOUNT {
            errors.push(ValidationError::FaceAmountTooLow { face_amount });
        }
    }

    errors
}

/// User-facing text for a failed validation pass.
pub fn correction_message(errors: &[ValidationError]) -> String {
    let lines = errors.iter().map(ToString::to_string).collect::<Vec<_>>();
    format!("{}\n\nPlease correct this.", lines.join("\n"))
}
