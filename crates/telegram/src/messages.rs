use serde::Serialize;

/// Formatting dialect understood by `sendMessage`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ParseMode {
    Markdown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<ParseMode>,
}

impl OutboundMessage {
    pub fn plain(chat_id: i64, text: impl Into<String>) -> Self {
        Self { chat_id, text: text.into(), parse_mode: None }
    }

    pub fn markdown(chat_id: i64, text: impl Into<String>) -> Self {
        Self { chat_id, text: text.into(), parse_mode: Some(ParseMode::Markdown) }
    }

    /// Same text with formatting stripped, for resending after Telegram
    /// rejects the markup.
    pub fn without_formatting(&self) -> Self {
        Self { chat_id: self.chat_id, text: self.text.replace('*', ""), parse_mode: None }
    }
}
