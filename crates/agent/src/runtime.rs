use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use raterbot_core::domain::quote_request::ConversationId;
use raterbot_core::errors::ApplicationError;
use tracing::warn;

use crate::adapters::{Transcriber, VoiceFetcher};
use crate::conversation::{ConversationEngine, TurnInput, TurnReport};
use crate::guardrails::InputChannel;
use crate::replies;

type TurnLock = Arc<tokio::sync::Mutex<()>>;

/// Entry point for chat events. Turns for one conversation run strictly one
/// after another; different conversations proceed in parallel.
pub struct AgentRuntime {
    engine: Arc<ConversationEngine>,
    voice: Arc<dyn VoiceFetcher>,
    transcriber: Arc<dyn Transcriber>,
    locks: Mutex<HashMap<ConversationId, TurnLock>>,
}

impl AgentRuntime {
    pub fn new(
        engine: Arc<ConversationEngine>,
        voice: Arc<dyn VoiceFetcher>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        Self { engine, voice, transcriber, locks: Mutex::new(HashMap::new()) }
    }

    pub async fn handle_text(
        &self,
        conversation: ConversationId,
        text: &str,
        correlation_id: &str,
    ) -> Result<TurnReport, ApplicationError> {
        let input = TurnInput {
            conversation,
            text: text.to_string(),
            channel: InputChannel::Text,
            correlation_id: correlation_id.to_string(),
        };
        let key = input.conversation.clone();
        self.serialized(&key, || self.run_turn(&input)).await
    }

    pub async fn handle_voice(
        &self,
        conversation: ConversationId,
        file_id: &str,
        correlation_id: &str,
    ) -> Result<TurnReport, ApplicationError> {
        let key = conversation.clone();
        self.serialized(&key, || async move {
            let transcript = match self.transcribe(file_id).await {
                Ok(transcript) => transcript,
                Err(error) => {
                    warn!(
                        event_name = "voice.transcription_failed",
                        correlation_id,
                        chat_id = %conversation,
                        error = %error,
                        "voice message could not be transcribed"
                    );
                    self.engine.reply(&conversation, error_reply(&error)).await;
                    return Err(error);
                }
            };

            self.engine.reply(&conversation, replies::heard(&transcript)).await;
            let input = TurnInput {
                conversation,
                text: transcript,
                channel: InputChannel::Voice,
                correlation_id: correlation_id.to_string(),
            };
            self.run_turn(&input).await
        })
        .await
    }

    async fn transcribe(&self, file_id: &str) -> Result<String, ApplicationError> {
        let clip = self
            .voice
            .fetch_voice(file_id)
            .await
            .map_err(|error| ApplicationError::Transcription(error.to_string()))?;
        let transcript = self
            .transcriber
            .transcribe(clip)
            .await
            .map_err(|error| ApplicationError::Transcription(error.to_string()))?;

        let transcript = transcript.trim().to_string();
        if transcript.is_empty() {
            return Err(ApplicationError::Transcription("empty transcript".to_string()));
        }
        Ok(transcript)
    }

    async fn run_turn(&self, input: &TurnInput) -> Result<TurnReport, ApplicationError> {
        let result = self.engine.handle_turn(input).await;
        if let Err(error) = &result {
            warn!(
                event_name = "conversation.turn_failed",
                correlation_id = %input.correlation_id,
                chat_id = %input.conversation,
                error_class = error.error_class(),
                error = %error,
                "chat turn failed"
            );
            self.engine.reply(&input.conversation, error_reply(error)).await;
        }
        result
    }

    async fn serialized<F, Fut, T>(&self, conversation: &ConversationId, turn: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let lock = self.lock_for(conversation);
        let guard = lock.lock().await;
        let result = turn().await;
        self.release(conversation, &lock);
        drop(guard);
        result
    }

    fn lock_for(&self, conversation: &ConversationId) -> TurnLock {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(conversation.clone()).or_default().clone()
    }

    /// Drops the map entry when no other turn is queued behind this one.
    fn release(&self, conversation: &ConversationId, lock: &TurnLock) {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        if Arc::strong_count(lock) <= 2 {
            locks.remove(conversation);
        }
    }

    pub fn active_conversations(&self) -> usize {
        match self.locks.lock() {
            Ok(locks) => locks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

fn error_reply(error: &ApplicationError) -> crate::adapters::Reply {
    crate::adapters::Reply::plain(error.user_message())
}
