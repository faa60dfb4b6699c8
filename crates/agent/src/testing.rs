//! Scripted adapters shared by the unit tests in this crate.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use raterbot_core::domain::quote_request::{ConversationId, QuoteParameters, QuoteRequest};
use tokio::sync::Mutex;

use crate::adapters::{
    DeliveryError, DeliveryReport, ExecutionError, QuoteDelivery, QuoteExecutor, QuoteOutcome,
    Reply, ReplyError, ReplySink, TranscriptionError, Transcriber, VoiceClip, VoiceFetcher,
};
use crate::extraction::{decode_extraction, Extraction, ExtractionError, FieldExtractor};

pub(crate) struct ScriptedExtractor {
    responses: Mutex<VecDeque<&'static str>>,
    seen: Mutex<Vec<QuoteRequest>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedExtractor {
    pub(crate) fn new(responses: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Holds every extraction open for `latency` so overlapping calls show
    /// up in [`ScriptedExtractor::max_in_flight`].
    pub(crate) fn slow(
        responses: impl IntoIterator<Item = &'static str>,
        latency: Duration,
    ) -> Self {
        Self { latency, ..Self::new(responses) }
    }

    pub(crate) async fn seen(&self) -> Vec<QuoteRequest> {
        self.seen.lock().await.clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FieldExtractor for ScriptedExtractor {
    async fn extract(
        &self,
        _text: &str,
        current: &QuoteRequest,
    ) -> Result<Extraction, ExtractionError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.seen.lock().await.push(current.clone());
        let raw = self
            .responses
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| ExtractionError::Decode("script exhausted".to_string()))?;
        decode_extraction(raw)
    }
}

#[derive(Default)]
pub(crate) struct RecordingExecutor {
    calls: AtomicUsize,
    failures_remaining: AtomicUsize,
}

impl RecordingExecutor {
    pub(crate) fn failing(times: usize) -> Self {
        Self { calls: AtomicUsize::new(0), failures_remaining: AtomicUsize::new(times) }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteExecutor for RecordingExecutor {
    async fn run_quote(&self, parameters: &QuoteParameters) -> Result<QuoteOutcome, ExecutionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ExecutionError::OptionNotFound { target: parameters.state.clone() });
        }

        Ok(QuoteOutcome {
            quote_text: format!("Annual Premium: $1,234.56 for {}", parameters.recipient),
            screenshot_path: PathBuf::from(format!("quote_result_{call}.png")),
        })
    }
}

#[derive(Default)]
pub(crate) struct RecordingDelivery {
    deliveries: AtomicUsize,
    failures_remaining: AtomicUsize,
}

impl RecordingDelivery {
    pub(crate) fn failing(times: usize) -> Self {
        Self { deliveries: AtomicUsize::new(0), failures_remaining: AtomicUsize::new(times) }
    }

    /// Successful deliveries only.
    pub(crate) fn deliveries(&self) -> usize {
        self.deliveries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteDelivery for RecordingDelivery {
    async fn deliver(
        &self,
        _parameters: &QuoteParameters,
        _outcome: &QuoteOutcome,
    ) -> Result<DeliveryReport, DeliveryError> {
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DeliveryError::Email("connection refused".to_string()));
        }

        self.deliveries.fetch_add(1, Ordering::SeqCst);
        Ok(DeliveryReport { emailed: true, lead_logged: true, artifact_removed: true })
    }
}

#[derive(Default)]
pub(crate) struct RecordingReplies {
    sent: Mutex<Vec<(ConversationId, Reply)>>,
}

impl RecordingReplies {
    pub(crate) async fn texts(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|(_, reply)| reply.text.clone()).collect()
    }

    pub(crate) async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl ReplySink for RecordingReplies {
    async fn send(&self, conversation: &ConversationId, reply: Reply) -> Result<(), ReplyError> {
        self.sent.lock().await.push((conversation.clone(), reply));
        Ok(())
    }
}

pub(crate) struct ScriptedVoice {
    pub(crate) transcript: Option<&'static str>,
}

#[async_trait]
impl VoiceFetcher for ScriptedVoice {
    async fn fetch_voice(&self, file_id: &str) -> Result<VoiceClip, TranscriptionError> {
        Ok(VoiceClip {
            bytes: vec![0x4f, 0x67, 0x67, 0x53],
            file_name: format!("{file_id}.ogg"),
            mime_type: "audio/ogg".to_string(),
        })
    }
}

#[async_trait]
impl Transcriber for ScriptedVoice {
    async fn transcribe(&self, _clip: VoiceClip) -> Result<String, TranscriptionError> {
        self.transcript
            .map(str::to_string)
            .ok_or_else(|| TranscriptionError::Service("decoder rejected audio".to_string()))
    }
}
