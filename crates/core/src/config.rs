use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_RATER_URL: &str =
    "https://rapid-rater.live.web.corebridgefinancial.com/QoLRapidRater";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub llm: LlmConfig,
    pub rater: RaterConfig,
    pub smtp: SmtpConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
    pub poll_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub transcription_model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RaterConfig {
    pub url: String,
    pub webdriver_url: String,
    pub headless: bool,
    pub artifact_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from_name: String,
}

impl SmtpConfig {
    /// Mail is only sent when both a relay and an account are configured.
    pub fn is_configured(&self) -> bool {
        let present = |value: &Option<String>| {
            value.as_ref().map(|value| !value.trim().is_empty()).unwrap_or(false)
        };
        present(&self.host) && present(&self.username)
    }
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_model: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub rater_headless: Option<bool>,
    pub webdriver_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig {
                bot_token: String::new().into(),
                api_base_url: "https://api.telegram.org".to_string(),
                poll_timeout_secs: 30,
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o".to_string(),
                transcription_model: "whisper-1".to_string(),
                timeout_secs: 60,
            },
            rater: RaterConfig {
                url: DEFAULT_RATER_URL.to_string(),
                webdriver_url: "http://localhost:4444".to_string(),
                headless: true,
                artifact_dir: PathBuf::from("."),
            },
            smtp: SmtpConfig {
                host: None,
                port: 587,
                username: None,
                password: None,
                from_name: "Bot".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://raterbot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("raterbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(telegram) = patch.telegram {
            if let Some(bot_token) = telegram.bot_token {
                self.telegram.bot_token = secret_value(bot_token);
            }
            if let Some(api_base_url) = telegram.api_base_url {
                self.telegram.api_base_url = api_base_url;
            }
            if let Some(poll_timeout_secs) = telegram.poll_timeout_secs {
                self.telegram.poll_timeout_secs = poll_timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(transcription_model) = llm.transcription_model {
                self.llm.transcription_model = transcription_model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(rater) = patch.rater {
            if let Some(url) = rater.url {
                self.rater.url = url;
            }
            if let Some(webdriver_url) = rater.webdriver_url {
                self.rater.webdriver_url = webdriver_url;
            }
            if let Some(headless) = rater.headless {
                self.rater.headless = headless;
            }
            if let Some(artifact_dir) = rater.artifact_dir {
                self.rater.artifact_dir = artifact_dir;
            }
        }

        if let Some(smtp) = patch.smtp {
            if let Some(host) = smtp.host {
                self.smtp.host = Some(host);
            }
            if let Some(port) = smtp.port {
                self.smtp.port = port;
            }
            if let Some(username) = smtp.username {
                self.smtp.username = Some(username);
            }
            if let Some(password) = smtp.password {
                self.smtp.password = Some(secret_value(password));
            }
            if let Some(from_name) = smtp.from_name {
                self.smtp.from_name = from_name;
            }
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let bot_token =
            read_env("RATERBOT_TELEGRAM_BOT_TOKEN").or_else(|| read_env("TELEGRAM_BOT_TOKEN"));
        if let Some(value) = bot_token {
            self.telegram.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("RATERBOT_TELEGRAM_API_BASE_URL") {
            self.telegram.api_base_url = value;
        }
        if let Some(value) = read_env("RATERBOT_TELEGRAM_POLL_TIMEOUT_SECS") {
            self.telegram.poll_timeout_secs =
                parse_u64("RATERBOT_TELEGRAM_POLL_TIMEOUT_SECS", &value)?;
        }

        let api_key = read_env("RATERBOT_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("RATERBOT_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("RATERBOT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("RATERBOT_LLM_TRANSCRIPTION_MODEL") {
            self.llm.transcription_model = value;
        }
        if let Some(value) = read_env("RATERBOT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("RATERBOT_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("RATERBOT_RATER_URL") {
            self.rater.url = value;
        }
        if let Some(value) = read_env("RATERBOT_RATER_WEBDRIVER_URL") {
            self.rater.webdriver_url = value;
        }
        if let Some(value) = read_env("RATERBOT_RATER_HEADLESS") {
            self.rater.headless = parse_bool("RATERBOT_RATER_HEADLESS", &value)?;
        } else if let Some(value) = read_env("HEADLESS") {
            // Legacy switch: only an explicit "false" shows the browser.
            self.rater.headless = value.trim() != "false";
        }
        if let Some(value) = read_env("RATERBOT_RATER_ARTIFACT_DIR") {
            self.rater.artifact_dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("RATERBOT_SMTP_HOST").or_else(|| read_env("SMTP_HOST")) {
            self.smtp.host = Some(value);
        }
        if let Some(value) = read_env("RATERBOT_SMTP_PORT").or_else(|| read_env("SMTP_PORT")) {
            self.smtp.port = parse_u16("RATERBOT_SMTP_PORT", &value)?;
        }
        if let Some(value) = read_env("RATERBOT_SMTP_USERNAME").or_else(|| read_env("SMTP_USER"))
        {
            self.smtp.username = Some(value);
        }
        if let Some(value) = read_env("RATERBOT_SMTP_PASSWORD").or_else(|| read_env("SMTP_PASS"))
        {
            self.smtp.password = Some(secret_value(value));
        }
        if let Some(value) = read_env("RATERBOT_SMTP_FROM_NAME") {
            self.smtp.from_name = value;
        }

        if let Some(value) = read_env("RATERBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("RATERBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("RATERBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("RATERBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("RATERBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("RATERBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("RATERBOT_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("RATERBOT_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("RATERBOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("RATERBOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("RATERBOT_LOGGING_LEVEL").or_else(|| read_env("RATERBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("RATERBOT_LOGGING_FORMAT").or_else(|| read_env("RATERBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(bot_token) = overrides.telegram_bot_token {
            self.telegram.bot_token = secret_value(bot_token);
        }
        if let Some(headless) = overrides.rater_headless {
            self.rater.headless = headless;
        }
        if let Some(webdriver_url) = overrides.webdriver_url {
            self.rater.webdriver_url = webdriver_url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_telegram(&self.telegram)?;
        validate_llm(&self.llm)?;
        validate_rater(&self.rater)?;
        validate_smtp(&self.smtp)?;
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("raterbot.toml"), PathBuf::from("config/raterbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    let bot_token = telegram.bot_token.expose_secret();
    if bot_token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "telegram.bot_token is required. Create a bot with @BotFather and copy its HTTP API token".to_string(),
        ));
    }
    if !bot_token.contains(':') {
        return Err(ConfigError::Validation(
            "telegram.bot_token must look like `<bot id>:<secret>` as issued by @BotFather"
                .to_string(),
        ));
    }

    if telegram.poll_timeout_secs == 0 || telegram.poll_timeout_secs > 50 {
        return Err(ConfigError::Validation(
            "telegram.poll_timeout_secs must be in range 1..=50".to_string(),
        ));
    }

    require_http_url("telegram.api_base_url", &telegram.api_base_url)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let missing =
        llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
    if missing {
        return Err(ConfigError::Validation(
            "llm.api_key is required (set RATERBOT_LLM_API_KEY or OPENAI_API_KEY)".to_string(),
        ));
    }

    if llm.model.trim().is_empty() || llm.transcription_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.model and llm.transcription_model must not be empty".to_string(),
        ));
    }

    require_http_url("llm.base_url", &llm.base_url)
}

fn validate_rater(rater: &RaterConfig) -> Result<(), ConfigError> {
    require_http_url("rater.url", &rater.url)?;
    require_http_url("rater.webdriver_url", &rater.webdriver_url)?;

    if rater.artifact_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("rater.artifact_dir must not be empty".to_string()));
    }

    Ok(())
}

fn validate_smtp(smtp: &SmtpConfig) -> Result<(), ConfigError> {
    if smtp.port == 0 {
        return Err(ConfigError::Validation("smtp.port must be greater than zero".to_string()));
    }

    let has_host = smtp.host.as_ref().map(|host| !host.trim().is_empty()).unwrap_or(false);
    let has_user = smtp.username.as_ref().map(|user| !user.trim().is_empty()).unwrap_or(false);
    if has_host && !has_user {
        return Err(ConfigError::Validation(
            "smtp.username is required when smtp.host is set".to_string(),
        ));
    }

    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn require_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{key} must start with http:// or https://")))
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    telegram: Option<TelegramPatch>,
    llm: Option<LlmPatch>,
    rater: Option<RaterPatch>,
    smtp: Option<SmtpPatch>,
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    bot_token: Option<String>,
    api_base_url: Option<String>,
    poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    transcription_model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RaterPatch {
    url: Option<String>,
    webdriver_url: Option<String>,
    headless: Option<bool>,
    artifact_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct SmtpPatch {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    from_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const MANAGED_VARS: &[&str] = &[
        "RATERBOT_TELEGRAM_BOT_TOKEN",
        "TELEGRAM_BOT_TOKEN",
        "RATERBOT_LLM_API_KEY",
        "OPENAI_API_KEY",
        "RATERBOT_DATABASE_URL",
        "RATERBOT_LOG_LEVEL",
        "RATERBOT_LOG_FORMAT",
        "RATERBOT_RATER_HEADLESS",
        "HEADLESS",
        "SMTP_HOST",
        "SMTP_PORT",
        "SMTP_USER",
        "SMTP_PASS",
        "TEST_TELEGRAM_TOKEN",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn set_required_vars() {
        env::set_var("RATERBOT_TELEGRAM_BOT_TOKEN", "123456:test-token");
        env::set_var("RATERBOT_LLM_API_KEY", "sk-test");
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("TEST_TELEGRAM_TOKEN", "987654:from-env");
        env::set_var("RATERBOT_LLM_API_KEY", "sk-test");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("raterbot.toml");
            fs::write(
                &path,
                r#"
[telegram]
bot_token = "${TEST_TELEGRAM_TOKEN}"

[rater]
headless = false
artifact_dir = "/tmp/raterbot"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.telegram.bot_token.expose_secret() == "987654:from-env",
                "bot token should be interpolated from environment",
            )?;
            ensure(!config.rater.headless, "file should disable headless mode")?;
            ensure(
                config.rater.artifact_dir.to_str() == Some("/tmp/raterbot"),
                "artifact dir should come from file",
            )?;
            Ok(())
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn legacy_environment_names_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("TELEGRAM_BOT_TOKEN", "111:legacy");
        env::set_var("OPENAI_API_KEY", "sk-legacy");
        env::set_var("SMTP_HOST", "smtp.example.com");
        env::set_var("SMTP_PORT", "2525");
        env::set_var("SMTP_USER", "bot@example.com");
        env::set_var("SMTP_PASS", "hunter2");
        env::set_var("HEADLESS", "false");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.telegram.bot_token.expose_secret() == "111:legacy",
                "legacy telegram token should be read",
            )?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-legacy")
                    == Some(true),
                "legacy openai key should be read",
            )?;
            ensure(config.smtp.is_configured(), "smtp should be configured from legacy vars")?;
            ensure(config.smtp.port == 2525, "smtp port should be parsed")?;
            ensure(!config.rater.headless, "HEADLESS=false should show the browser")?;
            Ok(())
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        set_required_vars();
        env::set_var("RATERBOT_LOG_LEVEL", "warn");
        env::set_var("RATERBOT_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            ensure(!config.smtp.is_configured(), "smtp is optional and unset by default")?;
            ensure(config.rater.headless, "browser runs headless by default")?;
            Ok(())
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        set_required_vars();
        env::set_var("RATERBOT_DATABASE_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("raterbot.toml");
            fs::write(
                &path,
                r#"
[telegram]
bot_token = "222:from-file"

[database]
url = "sqlite://from-file.db"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.telegram.bot_token.expose_secret() == "123456:test-token",
                "env bot token should win over file and defaults",
            )?;
            Ok(())
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("RATERBOT_TELEGRAM_BOT_TOKEN", "not-a-token");
        env::set_var("RATERBOT_LLM_API_KEY", "sk-test");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("telegram.bot_token")
            );
            ensure(has_message, "validation failure should mention telegram.bot_token")
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn missing_api_key_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("RATERBOT_TELEGRAM_BOT_TOKEN", "123:abc");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::Validation(message)) if message.contains("llm.api_key") => Ok(()),
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected missing api key to fail".to_string()),
        };

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn invalid_numeric_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        set_required_vars();
        env::set_var("SMTP_PORT", "not-a-port");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { value, .. }) if value == "not-a-port" => Ok(()),
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected invalid port to fail".to_string()),
        };

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("RATERBOT_TELEGRAM_BOT_TOKEN", "999:secret-bot-value");
        env::set_var("RATERBOT_LLM_API_KEY", "sk-secret-key-value");
        env::set_var("SMTP_HOST", "smtp.example.com");
        env::set_var("SMTP_USER", "bot@example.com");
        env::set_var("SMTP_PASS", "secret-mail-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("secret-bot-value"), "debug output should not contain bot token")?;
            ensure(!debug.contains("sk-secret-key-value"), "debug output should not contain api key")?;
            ensure(
                !debug.contains("secret-mail-value"),
                "debug output should not contain smtp password",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(MANAGED_VARS);
        result
    }
}
