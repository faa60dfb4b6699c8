use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::{TelegramEnvelope, TelegramEvent, TextMessageEvent, VoiceMessageEvent};
use crate::messages::OutboundMessage;

/// Margin on top of the long-poll timeout before the HTTP client gives up.
const POLL_GRACE_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("telegram transport failed: {0}")]
    Transport(String),
    #[error("telegram returned HTTP {status}: {description}")]
    Status { status: u16, description: String },
    #[error("telegram rejected {method}: {description}")]
    Rejected { method: String, description: String },
    #[error("telegram response could not be decoded: {0}")]
    Decode(String),
    #[error("telegram client configuration failed: {0}")]
    Configuration(String),
}

impl ApiError {
    /// Telegram answers malformed markup with "Bad Request: can't parse entities".
    pub fn is_markup_rejection(&self) -> bool {
        let description = match self {
            Self::Rejected { description, .. } | Self::Status { description, .. } => description,
            _ => return false,
        };
        description.contains("can't parse entities")
    }
}

fn transport_error(error: reqwest::Error) -> ApiError {
    // The request URL embeds the bot token.
    ApiError::Transport(error.without_url().to_string())
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice: Option<Voice>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: i64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Voice {
    pub file_id: String,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct File {
    pub file_id: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

#[derive(Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

#[derive(Serialize)]
struct GetFile<'a> {
    file_id: &'a str,
}

/// Typed client for the handful of Bot API methods the bot relies on.
#[derive(Clone)]
pub struct BotApiClient {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl BotApiClient {
    pub fn new(
        base_url: impl Into<String>,
        token: SecretString,
        poll_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(poll_timeout + Duration::from_secs(POLL_GRACE_SECS))
            .build()
            .map_err(|error| ApiError::Configuration(error.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { client, base_url, token })
    }

    pub async fn get_me(&self) -> Result<User, ApiError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, ApiError> {
        let request = GetUpdates { offset, timeout: timeout_secs, allowed_updates: ["message"] };
        self.call("getUpdates", &request).await
    }

    pub async fn send_message(&self, message: &OutboundMessage) -> Result<(), ApiError> {
        let _: serde_json::Value = self.call("sendMessage", message).await?;
        Ok(())
    }

    pub async fn get_file(&self, file_id: &str) -> Result<File, ApiError> {
        self.call("getFile", &GetFile { file_id }).await
    }

    pub async fn download_file(&self, file_path: &str) -> Result<Vec<u8>, ApiError> {
        let url = format!(
            "{}/file/bot{}/{}",
            self.base_url,
            self.token.expose_secret(),
            file_path.trim_start_matches('/')
        );
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                description: format!("file download failed for {file_path}"),
            });
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/bot{}/{}", self.base_url, self.token.expose_secret(), method);
        let response = self.client.post(url).json(body).send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        let envelope: ApiResponse<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(error) if status.is_success() => return Err(ApiError::Decode(error.to_string())),
            Err(_) => {
                return Err(ApiError::Status { status: status.as_u16(), description: text })
            }
        };

        match (envelope.ok, envelope.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(ApiError::Decode(format!("{method} returned no result"))),
            (false, _) => Err(ApiError::Rejected {
                method: method.to_string(),
                description: envelope.description.unwrap_or_else(|| format!("HTTP {status}")),
            }),
        }
    }
}

/// Maps a raw update onto the events the bot reacts to. A message that
/// carries a voice note is a voice event even if it also has text.
pub fn envelope_from_update(update: Update) -> TelegramEnvelope {
    let update_id = update.update_id;
    let Some(message) = update.message else {
        return TelegramEnvelope {
            update_id,
            event: TelegramEvent::Unsupported { event_type: "non_message".to_owned() },
        };
    };
    let chat_id = message.chat.id;
    let from_user_id = message.from.as_ref().map(|user| user.id);

    let event = match (message.voice, message.text) {
        (Some(voice), _) => TelegramEvent::VoiceMessage(VoiceMessageEvent {
            chat_id,
            message_id: message.message_id,
            from_user_id,
            file_id: voice.file_id,
            duration_secs: voice.duration,
            mime_type: voice.mime_type,
        }),
        (None, Some(text)) => TelegramEvent::TextMessage(TextMessageEvent {
            chat_id,
            message_id: message.message_id,
            from_user_id,
            text,
        }),
        (None, None) => TelegramEvent::Unsupported { event_type: "message".to_owned() },
    };

    TelegramEnvelope { update_id, event }
}

#[cfg(test)]
mod tests {
    use super::{envelope_from_update, ApiError, ApiResponse, Update};
    use crate::events::TelegramEvent;

    fn update(json: &str) -> Update {
        serde_json::from_str(json).expect("update json")
    }

    #[test]
    fn text_update_becomes_text_event() {
        let envelope = envelope_from_update(update(
            r#"{"update_id":10,"message":{"message_id":3,"chat":{"id":99},"from":{"id":5},"text":"45 male ohio"}}"#,
        ));

        assert_eq!(envelope.update_id, 10);
        let TelegramEvent::TextMessage(event) = envelope.event else {
            panic!("expected text event");
        };
        assert_eq!(event.chat_id, 99);
        assert_eq!(event.from_user_id, Some(5));
        assert_eq!(event.text, "45 male ohio");
    }

    #[test]
    fn voice_takes_precedence_over_text() {
        let envelope = envelope_from_update(update(
            r#"{"update_id":11,"message":{"message_id":4,"chat":{"id":99},"text":"caption",
                "voice":{"file_id":"AwACAgQ","duration":6,"mime_type":"audio/ogg"}}}"#,
        ));

        let TelegramEvent::VoiceMessage(event) = envelope.event else {
            panic!("expected voice event");
        };
        assert_eq!(event.file_id, "AwACAgQ");
        assert_eq!(event.duration_secs, 6);
    }

    #[test]
    fn updates_without_message_are_unsupported() {
        let envelope = envelope_from_update(update(r#"{"update_id":12}"#));
        assert!(matches!(envelope.event, TelegramEvent::Unsupported { .. }));
    }

    #[test]
    fn photo_messages_are_unsupported() {
        let envelope = envelope_from_update(update(
            r#"{"update_id":13,"message":{"message_id":5,"chat":{"id":1},"photo":[]}}"#,
        ));
        assert!(matches!(envelope.event, TelegramEvent::Unsupported { .. }));
    }

    #[test]
    fn rejected_response_decodes_description() {
        let response: ApiResponse<serde_json::Value> = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: can't parse entities"}"#,
        )
        .expect("response json");

        assert!(!response.ok);
        let error = ApiError::Rejected {
            method: "sendMessage".to_owned(),
            description: response.description.unwrap_or_default(),
        };
        assert!(error.is_markup_rejection());
        assert!(!ApiError::Transport("reset".to_owned()).is_markup_rejection());
    }
}
