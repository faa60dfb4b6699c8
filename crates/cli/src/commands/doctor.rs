use std::time::Duration;

use raterbot_core::config::{AppConfig, LoadOptions};
use raterbot_db::connect_with_settings;
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::{current_thread_runtime, escape_json, CommandResult};

const WEBDRIVER_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const DEPENDENT_CHECKS: [&str; 4] =
    ["telegram_token", "smtp_delivery", "database_connectivity", "webdriver_reachability"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_telegram_token(&config));
            checks.push(check_smtp(&config));
            match current_thread_runtime() {
                Ok(runtime) => {
                    checks.push(runtime.block_on(check_database_connectivity(&config)));
                    checks.push(runtime.block_on(check_webdriver(&config)));
                }
                Err(message) => {
                    checks.push(DoctorCheck::fail("database_connectivity", message.clone()));
                    checks.push(DoctorCheck::fail("webdriver_reachability", message));
                }
            }
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in DEPENDENT_CHECKS {
                checks.push(DoctorCheck::skipped(
                    name,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    let any_fail = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_fail { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_fail {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_telegram_token(config: &AppConfig) -> DoctorCheck {
    let token = config.telegram.bot_token.expose_secret();
    match token.split_once(':') {
        Some((bot_id, secret))
            if !bot_id.is_empty()
                && bot_id.chars().all(|ch| ch.is_ascii_digit())
                && !secret.is_empty() =>
        {
            DoctorCheck::pass("telegram_token", format!("token issued for bot id {bot_id}"))
        }
        _ => DoctorCheck::fail(
            "telegram_token",
            "token must look like `<numeric bot id>:<secret>`",
        ),
    }
}

fn check_smtp(config: &AppConfig) -> DoctorCheck {
    match config.smtp.host.as_deref() {
        Some(host) if config.smtp.is_configured() => {
            DoctorCheck::pass("smtp_delivery", format!("email via {host}:{}", config.smtp.port))
        }
        _ => DoctorCheck::skipped("smtp_delivery", "smtp not configured; quote emails disabled"),
    }
}

async fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    match connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    {
        Ok(pool) => {
            pool.close().await;
            DoctorCheck::pass(
                "database_connectivity",
                format!("connected using `{}`", config.database.url),
            )
        }
        Err(error) => DoctorCheck::fail(
            "database_connectivity",
            format!("failed to connect to database: {error}"),
        ),
    }
}

async fn check_webdriver(config: &AppConfig) -> DoctorCheck {
    let status_url = format!("{}/status", config.rater.webdriver_url.trim_end_matches('/'));
    let client = match reqwest::Client::builder().timeout(WEBDRIVER_PROBE_TIMEOUT).build() {
        Ok(client) => client,
        Err(error) => return DoctorCheck::fail("webdriver_reachability", error.to_string()),
    };

    let response = match client.get(&status_url).send().await {
        Ok(response) => response,
        Err(error) => {
            return DoctorCheck::fail(
                "webdriver_reachability",
                format!("no WebDriver at `{status_url}`: {}", error.without_url()),
            );
        }
    };
    if !response.status().is_success() {
        return DoctorCheck::fail(
            "webdriver_reachability",
            format!("`{status_url}` answered HTTP {}", response.status()),
        );
    }

    let body = response.json::<serde_json::Value>().await.unwrap_or_default();
    webdriver_status_check(&status_url, &body)
}

fn webdriver_status_check(status_url: &str, body: &serde_json::Value) -> DoctorCheck {
    match body["value"]["ready"].as_bool() {
        Some(false) => {
            let message = body["value"]["message"].as_str().unwrap_or("no reason given");
            DoctorCheck::fail("webdriver_reachability", format!("WebDriver busy: {message}"))
        }
        _ => DoctorCheck::pass("webdriver_reachability", format!("`{status_url}` is ready")),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
