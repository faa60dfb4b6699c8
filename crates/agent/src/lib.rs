//! Agent runtime: turns chat text into a complete quote request.
//!
//! - `extraction` asks the language model to merge new input into the field set
//! - `conversation` reconciles the merged fields through the intake flow
//! - `runtime` serializes turns per conversation and handles voice input
//!
//! The model is strictly a translator. It never decides whether a request is
//! valid or confirmed; normalization, validation and the confirmation gate
//! are deterministic.

pub mod adapters;
pub mod conversation;
pub mod extraction;
pub mod guardrails;
pub mod llm;
pub mod replies;
pub mod runtime;

#[cfg(test)]
pub(crate) mod testing;

pub use adapters::{
    DeliveryError, DeliveryReport, ExecutionError, QuoteDelivery, QuoteExecutor, QuoteOutcome,
    Reply, ReplyError, ReplySink, TranscriptionError, Transcriber, VoiceClip, VoiceFetcher,
};
pub use conversation::{ConversationEngine, TurnInput, TurnReport};
pub use extraction::{Extraction, ExtractionError, FieldExtractor, LlmFieldExtractor};
pub use guardrails::{GuardrailPolicy, InputChannel};
pub use llm::{LlmClient, LlmError, OpenAiChatClient};
pub use runtime::AgentRuntime;
