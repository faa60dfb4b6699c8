use std::sync::Arc;

use raterbot_core::audit::{AuditContext, AuditSink, TracingAuditSink};
use raterbot_core::domain::quote_request::{ConversationId, QuoteParameters, QuoteRequest};
use raterbot_core::errors::{ApplicationError, DomainError};
use raterbot_core::flows::{
    FlowAction, FlowContext, FlowEngine, FlowEvent, FlowState, QuoteIntakeFlow, TransitionOutcome,
};
use raterbot_core::session::SessionStore;
use raterbot_core::validation::{correction_message, validate};
use tracing::{info, warn};

use crate::adapters::{QuoteDelivery, QuoteExecutor, Reply, ReplySink};
use crate::extraction::FieldExtractor;
use crate::guardrails::{GuardrailDecision, GuardrailIntent, GuardrailPolicy, InputChannel};
use crate::replies;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnInput {
    pub conversation: ConversationId,
    pub text: String,
    pub channel: InputChannel,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReport {
    pub final_state: FlowState,
    pub transitions: Vec<TransitionOutcome>,
    pub executed: bool,
}

/// Per-turn working set threaded through action execution.
struct Turn<'a> {
    input: &'a TurnInput,
    request: QuoteRequest,
    context: FlowContext,
    executed: bool,
    failure: Option<ApplicationError>,
}

/// Reconciles one chat turn against the stored request and runs the quote
/// at most once when the request is complete, valid and confirmed.
pub struct ConversationEngine {
    sessions: Arc<dyn SessionStore>,
    extractor: Arc<dyn FieldExtractor>,
    executor: Arc<dyn QuoteExecutor>,
    delivery: Arc<dyn QuoteDelivery>,
    replies: Arc<dyn ReplySink>,
    guardrails: GuardrailPolicy,
    audit: Arc<dyn AuditSink>,
    flow: FlowEngine<QuoteIntakeFlow>,
}

impl ConversationEngine {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        extractor: Arc<dyn FieldExtractor>,
        executor: Arc<dyn QuoteExecutor>,
        delivery: Arc<dyn QuoteDelivery>,
        replies: Arc<dyn ReplySink>,
    ) -> Self {
        Self {
            sessions,
            extractor,
            executor,
            delivery,
            replies,
            guardrails: GuardrailPolicy::default(),
            audit: Arc::new(TracingAuditSink),
            flow: FlowEngine::default(),
        }
    }

    pub fn with_guardrails(mut self, guardrails: GuardrailPolicy) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn replies(&self) -> Arc<dyn ReplySink> {
        self.replies.clone()
    }

    pub async fn handle_turn(&self, input: &TurnInput) -> Result<TurnReport, ApplicationError> {
        info!(
            event_name = "conversation.turn_started",
            correlation_id = %input.correlation_id,
            chat_id = %input.conversation,
            channel = input.channel.as_str(),
            "handling chat turn"
        );

        self.reply(&input.conversation, replies::acknowledgement(input.channel)).await;

        let current = self
            .sessions
            .get(&input.conversation)
            .await
            .map_err(|error| ApplicationError::Session(error.to_string()))?
            .unwrap_or_default();

        let extraction = self
            .extractor
            .extract(&input.text, &current)
            .await
            .map_err(|error| ApplicationError::Extraction(error.to_string()))?;

        let mut request = extraction.request;
        request.confirmed = extraction.user_agreed && current.awaiting_confirmation;
        if extraction.user_agreed && !request.confirmed {
            info!(
                event_name = "conversation.affirmative_ignored",
                correlation_id = %input.correlation_id,
                chat_id = %input.conversation,
                "affirmative arrived before any summary was shown"
            );
        }
        self.store(&input.conversation, &request).await?;

        let decision = self.guardrails.evaluate(&GuardrailIntent::RunQuote {
            channel: input.channel,
            confirmed: request.confirmed,
        });
        let context = FlowContext {
            missing_field: request.first_missing_field(),
            validation_errors: validate(&request),
            confirmation_required: matches!(
                decision,
                GuardrailDecision::RequireConfirmation { .. }
            ),
            confirmed: request.confirmed,
        };

        let mut turn = Turn { input, request, context, executed: false, failure: None };
        let audit = AuditContext::new(
            Some(input.conversation.clone()),
            input.correlation_id.clone(),
            "conversation-engine",
        );

        let mut state = self.flow.initial_state();
        let mut transitions = Vec::new();
        let mut next_event = Some(FlowEvent::FieldsMerged);

        while let Some(event) = next_event.take() {
            let outcome = self
                .flow
                .apply_with_audit(&state, &event, &turn.context, self.audit.as_ref(), &audit)
                .map_err(DomainError::from)?;

            for action in &outcome.actions {
                if let Some(event) = self.perform(action, &mut turn).await? {
                    next_event = Some(event);
                }
            }

            state = outcome.to.clone();
            transitions.push(outcome);
        }

        info!(
            event_name = "conversation.turn_finished",
            correlation_id = %input.correlation_id,
            chat_id = %input.conversation,
            state = ?state,
            executed = turn.executed,
            "chat turn finished"
        );

        Ok(TurnReport { final_state: state, transitions, executed: turn.executed })
    }

    async fn perform(
        &self,
        action: &FlowAction,
        turn: &mut Turn<'_>,
    ) -> Result<Option<FlowEvent>, ApplicationError> {
        let input = turn.input;
        let conversation = &input.conversation;
        match action {
            FlowAction::PromptForField(field) => {
                self.reply(conversation, replies::missing_field_prompt(*field)).await;
                Ok(None)
            }
            FlowAction::ReportValidationErrors => {
                let message = correction_message(&turn.context.validation_errors);
                self.reply(conversation, Reply::markdown(message)).await;
                Ok(None)
            }
            FlowAction::RequestConfirmation => {
                let parameters = complete_parameters(&turn.request)?;
                turn.request.awaiting_confirmation = true;
                self.store(conversation, &turn.request).await?;
                self.reply(conversation, replies::confirmation_summary(&parameters)).await;
                Ok(None)
            }
            FlowAction::StartExecution => Ok(Some(FlowEvent::ExecutionStarted)),
            FlowAction::AnnounceExecution => {
                let parameters = complete_parameters(&turn.request)?;
                self.reply(conversation, replies::running_quote(&parameters.recipient)).await;
                Ok(None)
            }
            FlowAction::RunQuote => {
                let parameters = complete_parameters(&turn.request)?;
                turn.executed = true;
                match self.run_quote(input, &parameters).await {
                    Ok(()) => Ok(Some(FlowEvent::QuoteDelivered)),
                    Err(failure) => {
                        let event = FlowEvent::ExecutionFailed { reason: failure.to_string() };
                        turn.failure = Some(failure);
                        Ok(Some(event))
                    }
                }
            }
            FlowAction::ClearSession => {
                self.sessions
                    .delete(conversation)
                    .await
                    .map_err(|error| ApplicationError::Session(error.to_string()))?;
                Ok(None)
            }
            FlowAction::ConfirmDelivery => {
                let parameters = complete_parameters(&turn.request)?;
                self.reply(conversation, replies::quote_delivered(&parameters.recipient)).await;
                Ok(None)
            }
            FlowAction::ResetConfirmation => {
                turn.request.confirmed = false;
                turn.request.awaiting_confirmation = true;
                self.store(conversation, &turn.request).await?;
                Ok(None)
            }
            FlowAction::ReportFailure { reason } => {
                let failure = turn
                    .failure
                    .take()
                    .unwrap_or_else(|| ApplicationError::Execution(reason.clone()));
                self.reply(conversation, Reply::plain(failure.user_message())).await;
                Ok(None)
            }
        }
    }

    /// Runs the rater and the delivery pipeline. Failures are returned for the
    /// flow to turn into a retryable state.
    async fn run_quote(
        &self,
        input: &TurnInput,
        parameters: &QuoteParameters,
    ) -> Result<(), ApplicationError> {
        info!(
            event_name = "quote.execution_started",
            correlation_id = %input.correlation_id,
            chat_id = %input.conversation,
            state = %parameters.state,
            product = %parameters.product,
            "running quote"
        );

        let outcome = self.executor.run_quote(parameters).await.map_err(|error| {
            warn!(
                event_name = "quote.execution_failed",
                correlation_id = %input.correlation_id,
                chat_id = %input.conversation,
                error = %error,
                "rater automation failed"
            );
            ApplicationError::Execution(error.to_string())
        })?;

        let report = self.delivery.deliver(parameters, &outcome).await.map_err(|error| {
            warn!(
                event_name = "quote.delivery_failed",
                correlation_id = %input.correlation_id,
                chat_id = %input.conversation,
                error = %error,
                screenshot = %outcome.screenshot_path.display(),
                "quote delivery failed"
            );
            ApplicationError::Delivery(error.to_string())
        })?;

        info!(
            event_name = "quote.delivered",
            correlation_id = %input.correlation_id,
            chat_id = %input.conversation,
            emailed = report.emailed,
            lead_logged = report.lead_logged,
            artifact_removed = report.artifact_removed,
            "quote delivered"
        );
        Ok(())
    }

    async fn store(
        &self,
        conversation: &ConversationId,
        request: &QuoteRequest,
    ) -> Result<(), ApplicationError> {
        self.sessions
            .put(conversation, request.clone())
            .await
            .map_err(|error| ApplicationError::Session(error.to_string()))
    }

    pub(crate) async fn reply(&self, conversation: &ConversationId, reply: Reply) {
        if let Err(error) = self.replies.send(conversation, reply).await {
            warn!(
                event_name = "conversation.reply_failed",
                chat_id = %conversation,
                error = %error,
                "could not send chat reply"
            );
        }
    }
}

fn complete_parameters(request: &QuoteRequest) -> Result<QuoteParameters, ApplicationError> {
    request.to_parameters().ok_or_else(|| {
        DomainError::InvariantViolation("quote request is incomplete at execution".to_string())
            .into()
    })
}
