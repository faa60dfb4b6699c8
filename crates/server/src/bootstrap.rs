use std::sync::Arc;
use std::time::Duration;

use raterbot_agent::adapters::{DeliveryError, TranscriptionError};
use raterbot_agent::{
    AgentRuntime, ConversationEngine, GuardrailPolicy, LlmClient, LlmError, LlmFieldExtractor,
    OpenAiChatClient,
};
use raterbot_core::audit::TracingAuditSink;
use raterbot_core::config::{AppConfig, ConfigError, LoadOptions};
use raterbot_core::session::InMemorySessionStore;
use raterbot_db::{connect_with_settings, migrations, DbPool, SqlLeadRepository};
use raterbot_telegram::{
    ApiError, BotApiClient, BotApiTransport, EventDispatcher, LongPollRunner, ReconnectPolicy,
    TextMessageHandler, VoiceMessageHandler,
};
use thiserror::Error;
use tracing::info;

use crate::chat::{ChatService, TelegramReplySink};
use crate::delivery::{mailer_from_config, DeliveryPipeline, LlmQuoteFormatter};
use crate::rater::RapidRaterExecutor;
use crate::transcription::{TelegramVoiceFetcher, WhisperTranscriber};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub agent_runtime: Arc<AgentRuntime>,
    pub telegram_runner: LongPollRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("telegram client setup failed: {0}")]
    Telegram(#[source] ApiError),
    #[error("llm client setup failed: {0}")]
    Llm(#[source] LlmError),
    #[error("transcription client setup failed: {0}")]
    Transcription(#[source] TranscriptionError),
    #[error("delivery setup failed: {0}")]
    Delivery(#[source] DeliveryError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let telegram = BotApiClient::new(
        config.telegram.api_base_url.clone(),
        config.telegram.bot_token.clone(),
        Duration::from_secs(config.telegram.poll_timeout_secs),
    )
    .map_err(BootstrapError::Telegram)?;

    let llm: Arc<dyn LlmClient> =
        Arc::new(OpenAiChatClient::from_config(&config.llm).map_err(BootstrapError::Llm)?);
    let transcriber =
        WhisperTranscriber::from_config(&config.llm).map_err(BootstrapError::Transcription)?;

    let delivery = DeliveryPipeline::new(
        Arc::new(LlmQuoteFormatter::new(llm.clone())),
        mailer_from_config(&config.smtp).map_err(BootstrapError::Delivery)?,
        Arc::new(SqlLeadRepository::new(db_pool.clone())),
    )
    .map_err(BootstrapError::Delivery)?;

    let engine = ConversationEngine::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(LlmFieldExtractor::new(llm)),
        Arc::new(RapidRaterExecutor::from_config(&config.rater)),
        Arc::new(delivery),
        Arc::new(TelegramReplySink::new(telegram.clone())),
    )
    .with_guardrails(GuardrailPolicy::default())
    .with_audit_sink(Arc::new(TracingAuditSink));

    let agent_runtime = Arc::new(AgentRuntime::new(
        Arc::new(engine),
        Arc::new(TelegramVoiceFetcher::new(telegram.clone())),
        Arc::new(transcriber),
    ));

    let chat = Arc::new(ChatService::new(agent_runtime.clone()));
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(TextMessageHandler::new(chat.clone()));
    dispatcher.register(VoiceMessageHandler::new(chat));

    let telegram_runner = LongPollRunner::new(
        Arc::new(BotApiTransport::new(telegram, config.telegram.poll_timeout_secs)),
        dispatcher,
        ReconnectPolicy::default(),
    );
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        smtp_enabled = config.smtp.is_configured(),
        headless = config.rater.headless,
        "agent runtime assembled"
    );

    Ok(Application { config, db_pool, agent_runtime, telegram_runner })
}
