use std::time::Duration;

use async_trait::async_trait;
use raterbot_agent::adapters::{Transcriber, TranscriptionError, VoiceClip, VoiceFetcher};
use raterbot_core::config::LlmConfig;
use raterbot_telegram::BotApiClient;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

const VOICE_MIME_TYPE: &str = "audio/ogg";

/// Downloads voice notes through the Bot API file endpoint.
pub struct TelegramVoiceFetcher {
    api: BotApiClient,
}

impl TelegramVoiceFetcher {
    pub fn new(api: BotApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl VoiceFetcher for TelegramVoiceFetcher {
    async fn fetch_voice(&self, file_id: &str) -> Result<VoiceClip, TranscriptionError> {
        let file = self
            .api
            .get_file(file_id)
            .await
            .map_err(|error| TranscriptionError::Download(error.to_string()))?;
        let file_path = file.file_path.ok_or_else(|| {
            TranscriptionError::Download(format!("no download path for file {file_id}"))
        })?;
        let bytes = self
            .api
            .download_file(&file_path)
            .await
            .map_err(|error| TranscriptionError::Download(error.to_string()))?;
        debug!(file_id, size = bytes.len(), "voice note downloaded");

        Ok(VoiceClip {
            bytes,
            file_name: file_name_from_path(&file_path, file_id),
            mime_type: VOICE_MIME_TYPE.to_string(),
        })
    }
}

fn file_name_from_path(file_path: &str, file_id: &str) -> String {
    match file_path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{file_id}.ogg"),
    }
}

/// OpenAI-compatible `/audio/transcriptions` client.
pub struct WhisperTranscriber {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
    timeout: Duration,
}

impl WhisperTranscriber {
    pub fn from_config(config: &LlmConfig) -> Result<Self, TranscriptionError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| TranscriptionError::Service("llm.api_key is not set".to_string()))?;
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TranscriptionError::Service(error.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.transcription_model.clone(),
            api_key,
            timeout,
        })
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

fn decode_transcription(body: &str) -> Result<String, TranscriptionError> {
    let response: TranscriptionResponse = serde_json::from_str(body)
        .map_err(|error| TranscriptionError::Service(format!("undecodable response: {error}")))?;
    let text = response.text.trim();
    if text.is_empty() {
        return Err(TranscriptionError::Empty);
    }
    Ok(text.to_string())
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, clip: VoiceClip) -> Result<String, TranscriptionError> {
        let part = Part::bytes(clip.bytes)
            .file_name(clip.file_name)
            .mime_str(&clip.mime_type)
            .map_err(|error| TranscriptionError::Service(error.to_string()))?;
        let form = Form::new().text("model", self.model.clone()).part("file", part);

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    TranscriptionError::Service(format!(
                        "timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else {
                    TranscriptionError::Service(error.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| TranscriptionError::Service(error.to_string()))?;
        if !status.is_success() {
            return Err(TranscriptionError::Service(format!("HTTP {status}: {body}")));
        }

        decode_transcription(&body)
    }
}

#[cfg(test)]
mod tests {
    use raterbot_agent::adapters::TranscriptionError;

    use super::{decode_transcription, file_name_from_path};

    #[test]
    fn file_name_comes_from_download_path() {
        assert_eq!(file_name_from_path("voice/file_12.oga", "abc"), "file_12.oga");
        assert_eq!(file_name_from_path("voice/", "abc"), "abc.ogg");
    }

    #[test]
    fn transcript_text_is_trimmed() {
        let text = decode_transcription(r#"{"text":"  45 year old male in Ohio  "}"#)
            .expect("transcript");
        assert_eq!(text, "45 year old male in Ohio");
    }

    #[test]
    fn blank_transcript_is_an_error() {
        assert!(matches!(decode_transcription(r#"{"text":"   "}"#), Err(TranscriptionError::Empty)));
        assert!(matches!(decode_transcription("<html>"), Err(TranscriptionError::Service(_))));
    }
}
