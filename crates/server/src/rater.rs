use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fantoccini::{elements::Element, wd::TimeoutConfiguration, Client, ClientBuilder, Locator};
use raterbot_agent::adapters::{ExecutionError, QuoteExecutor, QuoteOutcome};
use raterbot_core::config::RaterConfig;
use raterbot_core::domain::quote_request::QuoteParameters;
use serde_json::json;
use tracing::{debug, info, warn};

pub const STATE_SELECT: &str = "#STATE";
pub const PRODUCT_SELECT: &str = "#DISPLAY_PRODUCT";
pub const GENDER_SELECT: &str = "#SEX1";
pub const AGE_INPUT: &str = "#AGE1";
pub const FACE_AMOUNT_INPUT: &str = "#FACE_AMOUNT";
pub const MODE_SELECT: &str = "#PREM_MODE";
pub const TABLE_RATING_SELECT: &str = "#TABLE_RATING1";
pub const FLAT_EXTRA_INPUT: &str = "#FLAT_AMOUNT1";
pub const SUBMIT_BUTTON: &str = "#btnSubmit";
pub const RESULT_PANEL: &str = "#QuickView";

const VISIBILITY_POLL: Duration = Duration::from_millis(200);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
}

/// Exact case-insensitive match on value or text first, then the first
/// option whose text contains the target.
pub fn match_option<'a>(options: &'a [SelectOption], target: &str) -> Option<&'a SelectOption> {
    let target = target.trim().to_lowercase();
    options
        .iter()
        .find(|option| {
            option.value.to_lowercase() == target || option.text.trim().to_lowercase() == target
        })
        .or_else(|| options.iter().find(|option| option.text.to_lowercase().contains(&target)))
}

/// One browser tab pointed at the rater.
#[async_trait]
pub trait RaterPage: Send {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), ExecutionError>;
    async fn options(&mut self, selector: &str) -> Result<Vec<SelectOption>, ExecutionError>;
    async fn select_value(&mut self, selector: &str, value: &str) -> Result<(), ExecutionError>;
    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), ExecutionError>;
    async fn click_when_visible(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), ExecutionError>;
    async fn text_when_visible(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<String, ExecutionError>;
    async fn screenshot(&mut self) -> Result<Vec<u8>, ExecutionError>;
    async fn close(&mut self) -> Result<(), ExecutionError>;
}

#[async_trait]
pub trait RaterBrowser: Send + Sync {
    async fn open(&self) -> Result<Box<dyn RaterPage>, ExecutionError>;
}

fn browser_error(error: impl std::fmt::Display) -> ExecutionError {
    ExecutionError::Browser(error.to_string())
}

/// Opens a fresh WebDriver session per quote.
pub struct WebDriverBrowser {
    webdriver_url: String,
    headless: bool,
}

impl WebDriverBrowser {
    pub fn new(webdriver_url: impl Into<String>, headless: bool) -> Self {
        Self { webdriver_url: webdriver_url.into(), headless }
    }

    fn capabilities(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut chrome_args = vec!["--window-size=1280,800", "--disable-dev-shm-usage"];
        let mut firefox_args = Vec::new();
        if self.headless {
            chrome_args.extend(["--headless=new", "--no-sandbox"]);
            firefox_args.push("-headless");
        } else {
            chrome_args.push("--start-maximized");
        }

        let mut capabilities = serde_json::Map::new();
        capabilities.insert("goog:chromeOptions".to_string(), json!({ "args": chrome_args }));
        capabilities.insert("moz:firefoxOptions".to_string(), json!({ "args": firefox_args }));
        capabilities
    }
}

#[async_trait]
impl RaterBrowser for WebDriverBrowser {
    async fn open(&self) -> Result<Box<dyn RaterPage>, ExecutionError> {
        let client = ClientBuilder::native()
            .capabilities(self.capabilities())
            .connect(&self.webdriver_url)
            .await
            .map_err(browser_error)?;
        client.set_window_size(1280, 800).await.map_err(browser_error)?;

        Ok(Box::new(WebDriverPage { client }))
    }
}

struct WebDriverPage {
    client: Client,
}

impl WebDriverPage {
    async fn element(&self, selector: &str) -> Result<Element, ExecutionError> {
        self.client.find(Locator::Css(selector)).await.map_err(|error| {
            ExecutionError::Browser(format!("selector {selector} not found: {error}"))
        })
    }

    async fn visible_element(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Element, ExecutionError> {
        let wait = async {
            loop {
                if let Ok(element) = self.client.find(Locator::Css(selector)).await {
                    if element.is_displayed().await.unwrap_or(false) {
                        return element;
                    }
                }
                tokio::time::sleep(VISIBILITY_POLL).await;
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| ExecutionError::Timeout {
            step: selector.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }
}

#[async_trait]
impl RaterPage for WebDriverPage {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), ExecutionError> {
        self.client
            .update_timeouts(TimeoutConfiguration::new(None, Some(timeout), None))
            .await
            .map_err(browser_error)?;

        match tokio::time::timeout(timeout, self.client.goto(url)).await {
            Ok(result) => result.map_err(browser_error),
            Err(_) => Err(ExecutionError::Timeout {
                step: "page load".to_string(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    async fn options(&mut self, selector: &str) -> Result<Vec<SelectOption>, ExecutionError> {
        let select = self.element(selector).await?;
        let mut options = Vec::new();
        for option in select.find_all(Locator::Css("option")).await.map_err(browser_error)? {
            let value = option.attr("value").await.map_err(browser_error)?.unwrap_or_default();
            let text = option.text().await.map_err(browser_error)?;
            options.push(SelectOption { value, text: text.trim().to_string() });
        }
        Ok(options)
    }

    async fn select_value(&mut self, selector: &str, value: &str) -> Result<(), ExecutionError> {
        self.element(selector).await?.select_by_value(value).await.map_err(browser_error)
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), ExecutionError> {
        let input = self.element(selector).await?;
        input.clear().await.map_err(browser_error)?;
        input.send_keys(value).await.map_err(browser_error)
    }

    async fn click_when_visible(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), ExecutionError> {
        self.visible_element(selector, timeout).await?.click().await.map_err(browser_error)
    }

    async fn text_when_visible(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<String, ExecutionError> {
        self.visible_element(selector, timeout).await?.text().await.map_err(browser_error)
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, ExecutionError> {
        self.client.screenshot().await.map_err(browser_error)
    }

    async fn close(&mut self) -> Result<(), ExecutionError> {
        self.client.clone().close().await.map_err(browser_error)
    }
}

/// Waits the rater form needs between steps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RaterTiming {
    pub navigation: Duration,
    pub after_load: Duration,
    pub after_state: Duration,
    pub after_product: Duration,
    pub submit_visible: Duration,
    pub result_visible: Duration,
}

impl Default for RaterTiming {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            after_load: Duration::from_secs(2),
            after_state: Duration::from_secs(2),
            after_product: Duration::from_millis(500),
            submit_visible: Duration::from_secs(5),
            result_visible: Duration::from_secs(30),
        }
    }
}

impl RaterTiming {
    pub fn immediate() -> Self {
        Self {
            after_load: Duration::ZERO,
            after_state: Duration::ZERO,
            after_product: Duration::ZERO,
            ..Self::default()
        }
    }
}

async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

pub struct RapidRaterExecutor<B> {
    browser: B,
    url: String,
    artifact_dir: PathBuf,
    timing: RaterTiming,
}

impl RapidRaterExecutor<WebDriverBrowser> {
    pub fn from_config(config: &RaterConfig) -> Self {
        Self::new(
            WebDriverBrowser::new(config.webdriver_url.clone(), config.headless),
            config.url.clone(),
            config.artifact_dir.clone(),
        )
    }
}

impl<B> RapidRaterExecutor<B>
where
    B: RaterBrowser,
{
    pub fn new(browser: B, url: impl Into<String>, artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            browser,
            url: url.into(),
            artifact_dir: artifact_dir.into(),
            timing: RaterTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: RaterTiming) -> Self {
        self.timing = timing;
        self
    }

    async fn fill_and_submit(
        &self,
        page: &mut dyn RaterPage,
        parameters: &QuoteParameters,
    ) -> Result<QuoteOutcome, ExecutionError> {
        info!(event_name = "execution.rater.navigate", url = %self.url, "opening rater");
        page.goto(&self.url, self.timing.navigation).await?;
        settle(self.timing.after_load).await;

        select_option(page, STATE_SELECT, &parameters.state).await?;
        settle(self.timing.after_state).await;
        select_option(page, PRODUCT_SELECT, parameters.product.label()).await?;
        settle(self.timing.after_product).await;
        select_option(page, GENDER_SELECT, parameters.gender.as_str()).await?;

        page.fill(AGE_INPUT, &parameters.age.to_string()).await?;
        page.fill(FACE_AMOUNT_INPUT, &parameters.face_amount.to_string().replace(',', "")).await?;
        select_option(page, MODE_SELECT, parameters.mode.label()).await?;

        if parameters.has_table_rating() {
            select_option(page, TABLE_RATING_SELECT, &parameters.table_rating).await?;
        }
        if parameters.has_flat_extra() {
            page.fill(FLAT_EXTRA_INPUT, &parameters.flat_extra.normalize().to_string()).await?;
        }

        page.click_when_visible(SUBMIT_BUTTON, self.timing.submit_visible).await?;
        let quote_text = page.text_when_visible(RESULT_PANEL, self.timing.result_visible).await?;
        let screenshot = page.screenshot().await?;

        let screenshot_path =
            self.artifact_dir.join(format!("quote_result_{}.png", Utc::now().timestamp_millis()));
        tokio::fs::write(&screenshot_path, screenshot)
            .await
            .map_err(|error| ExecutionError::Artifact(error.to_string()))?;

        Ok(QuoteOutcome { quote_text, screenshot_path })
    }
}

async fn select_option(
    page: &mut dyn RaterPage,
    selector: &str,
    target: &str,
) -> Result<(), ExecutionError> {
    let options = page.options(selector).await?;
    let Some(option) = match_option(&options, target) else {
        warn!(selector, target, "no rater option matched");
        return Err(ExecutionError::OptionNotFound { target: target.to_string() });
    };

    page.select_value(selector, &option.value).await?;
    debug!(selector, target, selected = %option.text, "rater option selected");
    Ok(())
}

#[async_trait]
impl<B> QuoteExecutor for RapidRaterExecutor<B>
where
    B: RaterBrowser,
{
    async fn run_quote(
        &self,
        parameters: &QuoteParameters,
    ) -> Result<QuoteOutcome, ExecutionError> {
        let mut page = self.browser.open().await?;
        let result = self.fill_and_submit(page.as_mut(), parameters).await;

        if let Err(error) = page.close().await {
            warn!(error = %error, "rater browser session did not close cleanly");
        }

        match &result {
            Ok(outcome) => info!(
                event_name = "execution.rater.completed",
                screenshot = %outcome.screenshot_path.display(),
                "rater returned a quote"
            ),
            Err(error) => warn!(
                event_name = "execution.rater.failed",
                error = %error,
                "rater automation failed"
            ),
        }
        result
    }
}
