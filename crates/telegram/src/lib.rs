//! Telegram integration - long-polling bot interface
//!
//! - **Polling** (`polling`) - `getUpdates` loop with reconnection logic
//! - **Events** (`events`) - text and voice messages routed to handlers
//! - **Bot API** (`api`) - typed HTTP client for the methods the bot uses
//! - **Messages** (`messages`) - outbound message builders
//!
//! # Architecture
//!
//! ```text
//! getUpdates → LongPollRunner → EventDispatcher → Handlers → Agent Runtime
//!                                                    ↓
//!                                     sendMessage ← Reply
//! ```

pub mod api;
pub mod events;
pub mod messages;
pub mod polling;

pub use api::{ApiError, BotApiClient};
pub use events::{
    default_dispatcher, EventContext, EventDispatcher, TelegramEnvelope, TelegramEvent,
    TextMessageEvent, TextMessageHandler, TextMessageService, VoiceMessageEvent,
    VoiceMessageHandler, VoiceMessageService,
};
pub use messages::{OutboundMessage, ParseMode};
pub use polling::{BotApiTransport, LongPollRunner, PollExit, ReconnectPolicy, UpdateTransport};
