use serde::{Deserialize, Serialize};

use crate::domain::quote_request::MandatoryField;
use crate::validation::ValidationError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    QuoteIntake,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowState {
    AwaitingFields,
    AwaitingConfirmation,
    Ready,
    Executing,
    Done,
    Failed { retryable: bool },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    FieldsMerged,
    ExecutionStarted,
    QuoteDelivered,
    ExecutionFailed { reason: String },
}

/// Facts about the merged request that the transition function decides on.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct FlowContext {
    pub missing_field: Option<MandatoryField>,
    pub validation_errors: Vec<ValidationError>,
    pub confirmation_required: bool,
    pub confirmed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    PromptForField(MandatoryField),
    ReportValidationErrors,
    RequestConfirmation,
    StartExecution,
    AnnounceExecution,
    RunQuote,
    ClearSession,
    ConfirmDelivery,
    ResetConfirmation,
    ReportFailure { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: FlowState,
    pub to: FlowState,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
