use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use raterbot_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(
        key: &'static str,
        value: impl Into<String>,
        env_keys: &'static [&'static str],
    ) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(&field, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field::new(
            "telegram.bot_token",
            redact_bot_token(config.telegram.bot_token.expose_secret()),
            &["RATERBOT_TELEGRAM_BOT_TOKEN", "TELEGRAM_BOT_TOKEN"],
        ),
        Field::new(
            "telegram.poll_timeout_secs",
            config.telegram.poll_timeout_secs.to_string(),
            &["RATERBOT_TELEGRAM_POLL_TIMEOUT_SECS"],
        ),
        Field::new(
            "llm.api_key",
            redact_optional(config.llm.api_key.as_ref()),
            &["RATERBOT_LLM_API_KEY", "OPENAI_API_KEY"],
        ),
        Field::new("llm.base_url", config.llm.base_url.as_str(), &["RATERBOT_LLM_BASE_URL"]),
        Field::new("llm.model", config.llm.model.as_str(), &["RATERBOT_LLM_MODEL"]),
        Field::new(
            "llm.transcription_model",
            config.llm.transcription_model.as_str(),
            &["RATERBOT_LLM_TRANSCRIPTION_MODEL"],
        ),
        Field::new("rater.url", config.rater.url.as_str(), &["RATERBOT_RATER_URL"]),
        Field::new(
            "rater.webdriver_url",
            config.rater.webdriver_url.as_str(),
            &["RATERBOT_RATER_WEBDRIVER_URL"],
        ),
        Field::new(
            "rater.headless",
            config.rater.headless.to_string(),
            &["RATERBOT_RATER_HEADLESS"],
        ),
        Field::new(
            "rater.artifact_dir",
            config.rater.artifact_dir.display().to_string(),
            &["RATERBOT_RATER_ARTIFACT_DIR"],
        ),
        Field::new(
            "smtp.host",
            config.smtp.host.as_deref().unwrap_or("<unset>"),
            &["RATERBOT_SMTP_HOST", "SMTP_HOST"],
        ),
        Field::new("smtp.port", config.smtp.port.to_string(), &["RATERBOT_SMTP_PORT", "SMTP_PORT"]),
        Field::new(
            "smtp.username",
            config.smtp.username.as_deref().unwrap_or("<unset>"),
            &["RATERBOT_SMTP_USERNAME", "SMTP_USER"],
        ),
        Field::new(
            "smtp.password",
            redact_optional(config.smtp.password.as_ref()),
            &["RATERBOT_SMTP_PASSWORD", "SMTP_PASS"],
        ),
        Field::new("database.url", config.database.url.as_str(), &["RATERBOT_DATABASE_URL"]),
        Field::new(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["RATERBOT_DATABASE_MAX_CONNECTIONS"],
        ),
        Field::new(
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            &["RATERBOT_SERVER_HEALTH_CHECK_PORT"],
        ),
        Field::new(
            "logging.level",
            config.logging.level.as_str(),
            &["RATERBOT_LOGGING_LEVEL", "RATERBOT_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["RATERBOT_LOGGING_FORMAT", "RATERBOT_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("raterbot.toml"), PathBuf::from("config/raterbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    field: &Field,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, field.key) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps the public bot id and hides the secret half of a BotFather token.
fn redact_bot_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((bot_id, _)) = trimmed.split_once(':') {
        return format!("{bot_id}:***");
    }

    "<redacted>".to_string()
}

fn redact_optional(secret: Option<&SecretString>) -> &'static str {
    match secret {
        Some(value) if !value.expose_secret().trim().is_empty() => "<redacted>",
        _ => "<unset>",
    }
}
