use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{
    FlowAction, FlowContext, FlowEvent, FlowState, FlowType, TransitionOutcome,
};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> FlowState;
    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct QuoteIntakeFlow;

impl FlowDefinition for QuoteIntakeFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::QuoteIntake
    }

    fn initial_state(&self) -> FlowState {
        FlowState::AwaitingFields
    }

    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_quote_intake(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> FlowState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.conversation_id.clone(),
                        audit.correlation_id.clone(),
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.conversation_id.clone(),
                        audit.correlation_id.clone(),
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<QuoteIntakeFlow> {
    fn default() -> Self {
        Self::new(QuoteIntakeFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: FlowState, event: FlowEvent },
}

fn transition_quote_intake(
    current: &FlowState,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        AnnounceExecution, ClearSession, ConfirmDelivery, PromptForField, ReportFailure,
        ReportValidationErrors, RequestConfirmation, ResetConfirmation, RunQuote, StartExecution,
    };
    use FlowEvent::{ExecutionFailed, ExecutionStarted, FieldsMerged, QuoteDelivered};
    use FlowState::{AwaitingConfirmation, AwaitingFields, Done, Executing, Failed, Ready};

    let (to, actions) = match (current, event) {
        (AwaitingFields, FieldsMerged)
        | (AwaitingConfirmation, FieldsMerged)
        | (Failed { retryable: true }, FieldsMerged) => {
            if let Some(field) = context.missing_field {
                (AwaitingFields, vec![PromptForField(field)])
            } else if !context.validation_errors.is_empty() {
                (AwaitingFields, vec![ReportValidationErrors])
            } else if context.confirmation_required && !context.confirmed {
                (AwaitingConfirmation, vec![RequestConfirmation])
            } else {
                (Ready, vec![StartExecution])
            }
        }
        (Ready, ExecutionStarted) => (Executing, vec![AnnounceExecution, RunQuote]),
        (Executing, QuoteDelivered) => (Done, vec![ClearSession, ConfirmDelivery]),
        (Executing, ExecutionFailed { reason }) => (
            Failed { retryable: true },
            vec![ResetConfirmation, ReportFailure { reason: reason.clone() }],
        ),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: current.clone(),
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), actions })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, AuditOutcome, InMemoryAuditSink};
    use crate::domain::quote_request::{ConversationId, MandatoryField};
    use crate::flows::engine::{FlowDefinition, FlowEngine, FlowTransitionError, QuoteIntakeFlow};
    use crate::flows::states::{FlowAction, FlowContext, FlowEvent, FlowState, FlowType};
    use crate::validation::ValidationError;

    fn ready_context() -> FlowContext {
        FlowContext::default()
    }

    #[test]
    fn text_turn_happy_path_runs_to_done() {
        let engine = FlowEngine::new(QuoteIntakeFlow);
        let mut state = engine.initial_state();

        let merged = engine
            .apply(&state, &FlowEvent::FieldsMerged, &ready_context())
            .expect("awaiting fields -> ready");
        assert_eq!(merged.to, FlowState::Ready);
        assert_eq!(merged.actions, vec![FlowAction::StartExecution]);
        state = merged.to;

        let started = engine
            .apply(&state, &FlowEvent::ExecutionStarted, &ready_context())
            .expect("ready -> executing");
        assert_eq!(started.actions, vec![FlowAction::AnnounceExecution, FlowAction::RunQuote]);
        state = started.to;

        let delivered = engine
            .apply(&state, &FlowEvent::QuoteDelivered, &ready_context())
            .expect("executing -> done");
        assert_eq!(delivered.to, FlowState::Done);
        assert_eq!(delivered.actions, vec![FlowAction::ClearSession, FlowAction::ConfirmDelivery]);
    }

    #[test]
    fn missing_field_prompt_takes_priority_over_validation() {
        let engine = FlowEngine::default();
        let context = FlowContext {
            missing_field: Some(MandatoryField::Gender),
            validation_errors: vec![ValidationError::AgeOutOfRange { age: 99 }],
            ..FlowContext::default()
        };

        let outcome = engine
            .apply(&FlowState::AwaitingFields, &FlowEvent::FieldsMerged, &context)
            .expect("prompt transition");

        assert_eq!(outcome.to, FlowState::AwaitingFields);
        assert_eq!(outcome.actions, vec![FlowAction::PromptForField(MandatoryField::Gender)]);
    }

    #[test]
    fn validation_errors_halt_before_confirmation() {
        let engine = FlowEngine::default();
        let context = FlowContext {
            validation_errors: vec![ValidationError::StateInvalid { state: "ZZ".to_owned() }],
            confirmation_required: true,
            ..FlowContext::default()
        };

        let outcome = engine
            .apply(&FlowState::AwaitingFields, &FlowEvent::FieldsMerged, &context)
            .expect("validation transition");

        assert_eq!(outcome.to, FlowState::AwaitingFields);
        assert_eq!(outcome.actions, vec![FlowAction::ReportValidationErrors]);
    }

    #[test]
    fn unconfirmed_voice_turn_waits_for_confirmation_then_runs() {
        let engine = FlowEngine::default();
        let unconfirmed = FlowContext { confirmation_required: true, ..FlowContext::default() };

        let waiting = engine
            .apply(&FlowState::AwaitingFields, &FlowEvent::FieldsMerged, &unconfirmed)
            .expect("awaiting confirmation");
        assert_eq!(waiting.to, FlowState::AwaitingConfirmation);
        assert_eq!(waiting.actions, vec![FlowAction::RequestConfirmation]);

        let confirmed = FlowContext { confirmed: true, ..unconfirmed };
        let ready = engine
            .apply(&waiting.to, &FlowEvent::FieldsMerged, &confirmed)
            .expect("confirmation accepted");
        assert_eq!(ready.to, FlowState::Ready);
    }

    #[test]
    fn execution_failure_is_retryable() {
        let engine = FlowEngine::default();
        let failed = engine
            .apply(
                &FlowState::Executing,
                &FlowEvent::ExecutionFailed { reason: "rater timed out".to_owned() },
                &FlowContext::default(),
            )
            .expect("executing -> failed");

        assert_eq!(failed.to, FlowState::Failed { retryable: true });
        assert_eq!(
            failed.actions,
            vec![
                FlowAction::ResetConfirmation,
                FlowAction::ReportFailure { reason: "rater timed out".to_owned() },
            ]
        );

        let retried = engine
            .apply(&failed.to, &FlowEvent::FieldsMerged, &FlowContext::default())
            .expect("failed -> ready");
        assert_eq!(retried.to, FlowState::Ready);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(&FlowState::AwaitingFields, &FlowEvent::QuoteDelivered, &FlowContext::default())
            .expect_err("cannot deliver without executing");

        assert!(matches!(
            error,
            FlowTransitionError::InvalidTransition {
                state: FlowState::AwaitingFields,
                event: FlowEvent::QuoteDelivered
            }
        ));
    }

    #[test]
    fn done_is_terminal() {
        let engine = FlowEngine::default();
        for event in [FlowEvent::FieldsMerged, FlowEvent::ExecutionStarted] {
            assert!(engine.apply(&FlowState::Done, &event, &FlowContext::default()).is_err());
        }
    }

    #[test]
    fn replay_is_deterministic_for_same_event_sequence() {
        let engine = FlowEngine::default();
        let events = [FlowEvent::FieldsMerged, FlowEvent::ExecutionStarted, FlowEvent::QuoteDelivered];

        let run = |engine: &FlowEngine<QuoteIntakeFlow>| {
            let mut state = engine.initial_state();
            let mut actions = Vec::new();
            for event in &events {
                let outcome = engine
                    .apply(&state, event, &FlowContext::default())
                    .expect("deterministic run");
                actions.push(outcome.actions);
                state = outcome.to;
            }
            (state, actions)
        };

        assert_eq!(run(&engine), run(&engine));
        assert_eq!(engine.flow_type(), FlowType::QuoteIntake);
        assert_eq!(QuoteIntakeFlow.flow_type(), FlowType::QuoteIntake);
    }

    #[test]
    fn audited_transitions_record_applied_and_rejected_events() {
        let engine = FlowEngine::default();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(
            Some(ConversationId::from(42_i64)),
            "req-7",
            "conversation-engine",
        );

        engine
            .apply_with_audit(
                &FlowState::AwaitingFields,
                &FlowEvent::FieldsMerged,
                &FlowContext::default(),
                &sink,
                &audit,
            )
            .expect("applied");
        engine
            .apply_with_audit(
                &FlowState::Done,
                &FlowEvent::ExecutionStarted,
                &FlowContext::default(),
                &sink,
                &audit,
            )
            .expect_err("rejected");

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "flow.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("Ready"));
        assert_eq!(events[1].outcome, AuditOutcome::Rejected);
        assert_eq!(events[1].correlation_id, "req-7");
    }
}
