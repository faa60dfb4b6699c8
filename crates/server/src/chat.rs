use std::sync::Arc;

use async_trait::async_trait;
use raterbot_agent::adapters::{Reply, ReplyError, ReplySink};
use raterbot_agent::AgentRuntime;
use raterbot_core::domain::quote_request::ConversationId;
use raterbot_telegram::events::EventHandlerError;
use raterbot_telegram::{
    BotApiClient, EventContext, OutboundMessage, TextMessageEvent, TextMessageService,
    VoiceMessageEvent, VoiceMessageService,
};
use tracing::{info, warn};

pub fn outbound_message(
    conversation: &ConversationId,
    reply: Reply,
) -> Result<OutboundMessage, ReplyError> {
    let chat_id = conversation.as_str().parse::<i64>().map_err(|_| {
        ReplyError::Transport(format!("conversation {conversation} is not a telegram chat"))
    })?;
    Ok(if reply.markdown {
        OutboundMessage::markdown(chat_id, reply.text)
    } else {
        OutboundMessage::plain(chat_id, reply.text)
    })
}

/// Sends replies with `sendMessage`, retrying as plain text when Telegram
/// rejects the markup.
pub struct TelegramReplySink {
    api: BotApiClient,
}

impl TelegramReplySink {
    pub fn new(api: BotApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ReplySink for TelegramReplySink {
    async fn send(&self, conversation: &ConversationId, reply: Reply) -> Result<(), ReplyError> {
        let message = outbound_message(conversation, reply)?;
        match self.api.send_message(&message).await {
            Ok(()) => Ok(()),
            Err(error) if message.parse_mode.is_some() && error.is_markup_rejection() => {
                warn!(
                    chat_id = message.chat_id,
                    error = %error,
                    "markdown rejected; resending plain"
                );
                self.api
                    .send_message(&message.without_formatting())
                    .await
                    .map_err(|error| ReplyError::Transport(error.to_string()))
            }
            Err(error) => Err(ReplyError::Transport(error.to_string())),
        }
    }
}

/// Routes inbound chat messages into the agent runtime.
pub struct ChatService {
    runtime: Arc<AgentRuntime>,
}

impl ChatService {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl TextMessageService for ChatService {
    async fn handle_text_message(
        &self,
        event: &TextMessageEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        info!(
            event_name = "ingress.chat.text",
            correlation_id = %ctx.correlation_id,
            chat_id = event.chat_id,
            "text message received"
        );
        self.runtime
            .handle_text(ConversationId::from(event.chat_id), &event.text, &ctx.correlation_id)
            .await
            .map(|_| ())
            .map_err(|error| EventHandlerError::TextMessage(error.to_string()))
    }
}

#[async_trait]
impl VoiceMessageService for ChatService {
    async fn handle_voice_message(
        &self,
        event: &VoiceMessageEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        info!(
            event_name = "ingress.chat.voice",
            correlation_id = %ctx.correlation_id,
            chat_id = event.chat_id,
            duration_secs = event.duration_secs,
            "voice message received"
        );
        self.runtime
            .handle_voice(ConversationId::from(event.chat_id), &event.file_id, &ctx.correlation_id)
            .await
            .map(|_| ())
            .map_err(|error| EventHandlerError::VoiceMessage(error.to_string()))
    }
}
