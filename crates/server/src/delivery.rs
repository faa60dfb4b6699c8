use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use raterbot_agent::adapters::{DeliveryError, DeliveryReport, QuoteDelivery, QuoteOutcome};
use raterbot_agent::llm::{strip_code_fences, ChatMessage, ChatRequest, LlmClient};
use raterbot_core::config::SmtpConfig;
use raterbot_core::domain::lead::LeadRecord;
use raterbot_core::domain::quote_request::QuoteParameters;
use raterbot_db::LeadRepository;
use secrecy::ExposeSecret;
use tera::{Context, Tera};
use tracing::{info, warn};

const EMAIL_TEMPLATE: &str = "quote_result.html";
const ATTACHMENT_NAME: &str = "Quote.png";
const FORMAT_INSTRUCTION: &str =
    "Convert insurance text data to a clean HTML <table>. Blue header, clear rows. No html/body tags.";

/// Turns the rater's raw result text into an HTML table fragment.
#[async_trait]
pub trait QuoteFormatter: Send + Sync {
    async fn to_html_table(&self, quote_text: &str) -> Result<String, DeliveryError>;
}

pub struct LlmQuoteFormatter {
    llm: Arc<dyn LlmClient>,
}

impl LlmQuoteFormatter {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl QuoteFormatter for LlmQuoteFormatter {
    async fn to_html_table(&self, quote_text: &str) -> Result<String, DeliveryError> {
        let request = ChatRequest::deterministic(vec![
            ChatMessage::system(FORMAT_INSTRUCTION),
            ChatMessage::user(quote_text),
        ]);
        let raw = self
            .llm
            .complete(&request)
            .await
            .map_err(|error| DeliveryError::Format(error.to_string()))?;
        Ok(strip_code_fences(&raw))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuoteEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub screenshot: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MailStatus {
    Sent,
    Skipped,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: QuoteEmail) -> Result<MailStatus, DeliveryError>;
}

/// Stand-in used when no SMTP account is configured.
#[derive(Default)]
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, email: QuoteEmail) -> Result<MailStatus, DeliveryError> {
        warn!(
            event_name = "delivery.email.skipped",
            recipient = %email.to,
            "smtp is not configured; quote email skipped"
        );
        Ok(MailStatus::Skipped)
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let (Some(host), Some(username)) = (config.host.as_deref(), config.username.as_deref())
        else {
            return Err(DeliveryError::Email("smtp host and username are required".to_string()));
        };
        let password = config
            .password
            .as_ref()
            .map(|password| password.expose_secret().to_string())
            .unwrap_or_default();

        // 465 is implicit TLS; everything else upgrades with STARTTLS.
        let builder = if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        };
        let builder = builder.map_err(|error| DeliveryError::Email(error.to_string()))?;
        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(username.to_string(), password))
            .build();

        let from = Mailbox::new(
            Some(config.from_name.clone()),
            username.parse().map_err(|error| {
                DeliveryError::Email(format!("invalid sender address {username}: {error}"))
            })?,
        );

        Ok(Self { transport, from })
    }
}

pub fn build_message(from: Mailbox, email: QuoteEmail) -> Result<Message, DeliveryError> {
    let to: Mailbox = email.to.parse().map_err(|error| {
        DeliveryError::Email(format!("invalid recipient {}: {error}", email.to))
    })?;
    let png = ContentType::parse("image/png")
        .map_err(|error| DeliveryError::Email(error.to_string()))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject)
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::html(email.html))
                .singlepart(
                    Attachment::new(ATTACHMENT_NAME.to_string()).body(email.screenshot, png),
                ),
        )
        .map_err(|error| DeliveryError::Email(error.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: QuoteEmail) -> Result<MailStatus, DeliveryError> {
        let message = build_message(self.from.clone(), email)?;
        self.transport
            .send(message)
            .await
            .map_err(|error| DeliveryError::Email(error.to_string()))?;
        Ok(MailStatus::Sent)
    }
}

pub fn mailer_from_config(config: &SmtpConfig) -> Result<Arc<dyn Mailer>, DeliveryError> {
    if config.is_configured() {
        Ok(Arc::new(SmtpMailer::from_config(config)?))
    } else {
        Ok(Arc::new(DisabledMailer))
    }
}

pub struct EmailRenderer {
    tera: Tera,
}

impl EmailRenderer {
    pub fn new() -> Result<Self, DeliveryError> {
        let mut tera = Tera::default();
        tera.add_raw_template(
            EMAIL_TEMPLATE,
            include_str!("../../../templates/email/quote_result.html.tera"),
        )
        .map_err(|error| DeliveryError::Format(error.to_string()))?;
        Ok(Self { tera })
    }

    pub fn render(
        &self,
        parameters: &QuoteParameters,
        table_html: &str,
    ) -> Result<String, DeliveryError> {
        let mut context = Context::new();
        context.insert("gender", parameters.gender.as_str());
        context.insert("age", &parameters.age);
        context.insert("state", &parameters.state);
        context.insert("product", parameters.product.label());
        context.insert("mode", parameters.mode.label());
        context.insert("table_rating", &parameters.table_rating);
        context.insert("flat_extra", &parameters.flat_extra.normalize().to_string());
        context.insert("table", table_html);

        self.tera
            .render(EMAIL_TEMPLATE, &context)
            .map_err(|error| DeliveryError::Format(error.to_string()))
    }
}

pub fn subject_for(parameters: &QuoteParameters) -> String {
    format!("Quote: {} - ${}", parameters.product.label(), parameters.face_amount)
}

/// Format, email, log the lead, then remove the screenshot.
pub struct DeliveryPipeline {
    formatter: Arc<dyn QuoteFormatter>,
    mailer: Arc<dyn Mailer>,
    leads: Arc<dyn LeadRepository>,
    renderer: EmailRenderer,
}

impl DeliveryPipeline {
    pub fn new(
        formatter: Arc<dyn QuoteFormatter>,
        mailer: Arc<dyn Mailer>,
        leads: Arc<dyn LeadRepository>,
    ) -> Result<Self, DeliveryError> {
        Ok(Self { formatter, mailer, leads, renderer: EmailRenderer::new()? })
    }
}

#[async_trait]
impl QuoteDelivery for DeliveryPipeline {
    async fn deliver(
        &self,
        parameters: &QuoteParameters,
        outcome: &QuoteOutcome,
    ) -> Result<DeliveryReport, DeliveryError> {
        let table = self.formatter.to_html_table(&outcome.quote_text).await?;
        let html = self.renderer.render(parameters, &table)?;
        let screenshot = tokio::fs::read(&outcome.screenshot_path).await.map_err(|error| {
            DeliveryError::Email(format!(
                "screenshot {} unreadable: {error}",
                outcome.screenshot_path.display()
            ))
        })?;

        let status = self
            .mailer
            .send(QuoteEmail {
                to: parameters.recipient.clone(),
                subject: subject_for(parameters),
                html,
                screenshot,
            })
            .await?;
        let emailed = status == MailStatus::Sent;
        if emailed {
            info!(
                event_name = "delivery.email.sent",
                recipient = %parameters.recipient,
                "quote email sent"
            );
        }

        let lead = LeadRecord::from_quote(parameters, outcome.quote_text.clone());
        let lead_id = lead.id.0.clone();
        let lead_logged = match self.leads.append(lead).await {
            Ok(()) => {
                info!(event_name = "persistence.lead.logged", lead_id = %lead_id, "lead saved");
                true
            }
            Err(error) => {
                warn!(
                    event_name = "persistence.lead.failed",
                    lead_id = %lead_id,
                    error = %error,
                    "lead could not be saved"
                );
                false
            }
        };

        let artifact_removed = match tokio::fs::remove_file(&outcome.screenshot_path).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    path = %outcome.screenshot_path.display(),
                    error = %error,
                    "quote screenshot could not be removed"
                );
                false
            }
        };

        Ok(DeliveryReport { emailed, lead_logged, artifact_removed })
    }
}
