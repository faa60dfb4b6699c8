use std::path::PathBuf;

use async_trait::async_trait;
use raterbot_core::domain::quote_request::{ConversationId, QuoteParameters};
use thiserror::Error;

/// What the rater page produced for one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuoteOutcome {
    pub quote_text: String,
    pub screenshot_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("No option found matching \"{target}\"")]
    OptionNotFound { target: String },
    #[error("timed out after {timeout_secs}s waiting for {step}")]
    Timeout { step: String, timeout_secs: u64 },
    #[error("browser automation failed: {0}")]
    Browser(String),
    #[error("could not store quote screenshot: {0}")]
    Artifact(String),
}

/// Drives the third-party rater form once per call.
#[async_trait]
pub trait QuoteExecutor: Send + Sync {
    async fn run_quote(&self, parameters: &QuoteParameters) -> Result<QuoteOutcome, ExecutionError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub emailed: bool,
    pub lead_logged: bool,
    pub artifact_removed: bool,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("could not format quote: {0}")]
    Format(String),
    #[error("could not send quote email: {0}")]
    Email(String),
}

/// Formats, emails and records a finished quote.
#[async_trait]
pub trait QuoteDelivery: Send + Sync {
    async fn deliver(
        &self,
        parameters: &QuoteParameters,
        outcome: &QuoteOutcome,
    ) -> Result<DeliveryReport, DeliveryError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceClip {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("voice file could not be downloaded: {0}")]
    Download(String),
    #[error("transcription service failure: {0}")]
    Service(String),
    #[error("transcription was empty")]
    Empty,
}

/// Fetches the audio behind a chat voice message.
#[async_trait]
pub trait VoiceFetcher: Send + Sync {
    async fn fetch_voice(&self, file_id: &str) -> Result<VoiceClip, TranscriptionError>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, clip: VoiceClip) -> Result<String, TranscriptionError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub markdown: bool,
}

impl Reply {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), markdown: false }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self { text: text.into(), markdown: true }
    }
}

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("reply could not be delivered: {0}")]
    Transport(String),
}

#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, conversation: &ConversationId, reply: Reply) -> Result<(), ReplyError>;
}
