use thiserror::Error;

use crate::flows::FlowTransitionError;

pub const GENERIC_USER_ERROR: &str = "❌ An unexpected internal error occurred.";
pub const EXTRACTION_USER_ERROR: &str =
    "❌ I couldn't read that request. Please rephrase and try again.";
pub const VOICE_USER_ERROR: &str = "❌ Voice error.";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failures a turn can end with. Each maps to exactly one chat reply.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("session store failure: {0}")]
    Session(String),
    #[error("field extraction failure: {0}")]
    Extraction(String),
    #[error("quote execution failure: {0}")]
    Execution(String),
    #[error("quote delivery failure: {0}")]
    Delivery(String),
    #[error("transcription failure: {0}")]
    Transcription(String),
}

impl ApplicationError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Extraction(_) => EXTRACTION_USER_ERROR.to_owned(),
            Self::Execution(message) | Self::Delivery(message) => format!("❌ Error: {message}"),
            Self::Transcription(_) => VOICE_USER_ERROR.to_owned(),
            Self::Domain(_) | Self::Session(_) => GENERIC_USER_ERROR.to_owned(),
        }
    }

    /// Stable label for structured logs.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(_) => "domain",
            Self::Session(_) => "session",
            Self::Extraction(_) => "extraction",
            Self::Execution(_) => "execution",
            Self::Delivery(_) => "delivery",
            Self::Transcription(_) => "transcription",
        }
    }
}
