use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelegramEnvelope {
    pub update_id: i64,
    pub event: TelegramEvent,
}

impl TelegramEnvelope {
    pub fn chat_id(&self) -> Option<i64> {
        match &self.event {
            TelegramEvent::TextMessage(event) => Some(event.chat_id),
            TelegramEvent::VoiceMessage(event) => Some(event.chat_id),
            TelegramEvent::Unsupported { .. } => None,
        }
    }

    pub fn correlation_id(&self) -> String {
        format!("tg-{}", self.update_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TelegramEvent {
    TextMessage(TextMessageEvent),
    VoiceMessage(VoiceMessageEvent),
    Unsupported { event_type: String },
}

impl TelegramEvent {
    pub fn event_type(&self) -> TelegramEventType {
        match self {
            Self::TextMessage(_) => TelegramEventType::TextMessage,
            Self::VoiceMessage(_) => TelegramEventType::VoiceMessage,
            Self::Unsupported { .. } => TelegramEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TelegramEventType {
    TextMessage,
    VoiceMessage,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessageEvent {
    pub chat_id: i64,
    pub message_id: i64,
    pub from_user_id: Option<i64>,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceMessageEvent {
    pub chat_id: i64,
    pub message_id: i64,
    pub from_user_id: Option<i64>,
    pub file_id: String,
    pub duration_secs: u32,
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("text message handler failure: {0}")]
    TextMessage(String),
    #[error("voice message handler failure: {0}")]
    VoiceMessage(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> TelegramEventType;
    async fn handle(
        &self,
        envelope: &TelegramEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<TelegramEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &TelegramEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub fn default_dispatcher() -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(TextMessageHandler::new(NoopTextMessageService));
    dispatcher.register(VoiceMessageHandler::new(NoopVoiceMessageService));
    dispatcher
}

#[async_trait]
pub trait TextMessageService: Send + Sync {
    async fn handle_text_message(
        &self,
        event: &TextMessageEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError>;
}

#[async_trait]
impl<T> TextMessageService for Arc<T>
where
    T: TextMessageService + ?Sized,
{
    async fn handle_text_message(
        &self,
        event: &TextMessageEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        (**self).handle_text_message(event, ctx).await
    }
}

pub struct TextMessageHandler<S> {
    service: S,
}

impl<S> TextMessageHandler<S>
where
    S: TextMessageService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for TextMessageHandler<S>
where
    S: TextMessageService + 'static,
{
    fn event_type(&self) -> TelegramEventType {
        TelegramEventType::TextMessage
    }

    async fn handle(
        &self,
        envelope: &TelegramEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let TelegramEvent::TextMessage(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.text.trim().is_empty() {
            return Ok(HandlerResult::Ignored);
        }

        self.service.handle_text_message(event, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}

#[derive(Default)]
pub struct NoopTextMessageService;

#[async_trait]
impl TextMessageService for NoopTextMessageService {
    async fn handle_text_message(
        &self,
        _event: &TextMessageEvent,
        _ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        Ok(())
    }
}

#[async_trait]
pub trait VoiceMessageService: Send + Sync {
    async fn handle_voice_message(
        &self,
        event: &VoiceMessageEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError>;
}

#[async_trait]
impl<T> VoiceMessageService for Arc<T>
where
    T: VoiceMessageService + ?Sized,
{
    async fn handle_voice_message(
        &self,
        event: &VoiceMessageEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        (**self).handle_voice_message(event, ctx).await
    }
}

pub struct VoiceMessageHandler<S> {
    service: S,
}

impl<S> VoiceMessageHandler<S>
where
    S: VoiceMessageService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for VoiceMessageHandler<S>
where
    S: VoiceMessageService + 'static,
{
    fn event_type(&self) -> TelegramEventType {
        TelegramEventType::VoiceMessage
    }

    async fn handle(
        &self,
        envelope: &TelegramEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let TelegramEvent::VoiceMessage(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        self.service.handle_voice_message(event, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}

#[derive(Default)]
pub struct NoopVoiceMessageService;

#[async_trait]
impl VoiceMessageService for NoopVoiceMessageService {
    async fn handle_voice_message(
        &self,
        _event: &VoiceMessageEvent,
        _ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{
        default_dispatcher, EventContext, EventDispatcher, EventHandlerError, HandlerResult,
        TelegramEnvelope, TelegramEvent, TextMessageEvent, TextMessageHandler, TextMessageService,
        VoiceMessageEvent, VoiceMessageHandler, VoiceMessageService,
    };

    #[derive(Default)]
    struct RecordingService {
        texts: Mutex<Vec<String>>,
        voices: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextMessageService for RecordingService {
        async fn handle_text_message(
            &self,
            event: &TextMessageEvent,
            ctx: &EventContext,
        ) -> Result<(), EventHandlerError> {
            self.texts.lock().await.push(format!("{}:{}", ctx.correlation_id, event.text));
            Ok(())
        }
    }

    #[async_trait]
    impl VoiceMessageService for RecordingService {
        async fn handle_voice_message(
            &self,
            event: &VoiceMessageEvent,
            _ctx: &EventContext,
        ) -> Result<(), EventHandlerError> {
            self.voices.lock().await.push(event.file_id.clone());
            Ok(())
        }
    }

    fn text_envelope(update_id: i64, text: &str) -> TelegramEnvelope {
        TelegramEnvelope {
            update_id,
            event: TelegramEvent::TextMessage(TextMessageEvent {
                chat_id: 42,
                message_id: update_id,
                from_user_id: Some(7),
                text: text.to_owned(),
            }),
        }
    }

    fn voice_envelope(update_id: i64) -> TelegramEnvelope {
        TelegramEnvelope {
            update_id,
            event: TelegramEvent::VoiceMessage(VoiceMessageEvent {
                chat_id: 42,
                message_id: update_id,
                from_user_id: Some(7),
                file_id: "voice-file-1".to_owned(),
                duration_secs: 4,
                mime_type: Some("audio/ogg".to_owned()),
            }),
        }
    }

    #[test]
    fn default_dispatcher_registers_handlers() {
        let dispatcher = default_dispatcher();
        assert_eq!(dispatcher.handler_count(), 2);
    }

    #[tokio::test]
    async fn dispatcher_returns_ignored_when_no_handler_registered() {
        let dispatcher = EventDispatcher::new();

        let result = dispatcher
            .dispatch(&text_envelope(1, "hello"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn one_service_handles_both_message_kinds() {
        let service = Arc::new(RecordingService::default());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(TextMessageHandler::new(service.clone()));
        dispatcher.register(VoiceMessageHandler::new(service.clone()));
        let ctx = EventContext { correlation_id: "tg-5".to_owned() };

        let text = dispatcher.dispatch(&text_envelope(5, "45 male ohio"), &ctx).await;
        let voice = dispatcher.dispatch(&voice_envelope(6), &ctx).await;

        assert_eq!(text.expect("text"), HandlerResult::Processed);
        assert_eq!(voice.expect("voice"), HandlerResult::Processed);
        assert_eq!(*service.texts.lock().await, vec!["tg-5:45 male ohio"]);
        assert_eq!(*service.voices.lock().await, vec!["voice-file-1"]);
    }

    #[tokio::test]
    async fn blank_text_is_ignored() {
        let service = Arc::new(RecordingService::default());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(TextMessageHandler::new(service.clone()));

        let result = dispatcher
            .dispatch(&text_envelope(8, "   "), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
        assert!(service.texts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unsupported_updates_are_ignored() {
        let dispatcher = default_dispatcher();
        let envelope = TelegramEnvelope {
            update_id: 9,
            event: TelegramEvent::Unsupported { event_type: "edited_message".to_owned() },
        };

        let result =
            dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
        assert_eq!(envelope.chat_id(), None);
        assert_eq!(envelope.correlation_id(), "tg-9");
    }
}
