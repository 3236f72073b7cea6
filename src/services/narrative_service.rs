use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, NarrativeErrorCode};
use crate::services::prompt_templates::{
    conflict_briefing_system_prompt, forecast_outlook_system_prompt, rebalance_plan_system_prompt,
};
use crate::utils::redact::redact_sensitive_data;

const ENV_API_KEY: &str = "ALLOCSIGHT_DEEPSEEK_API_KEY";
const ENV_BASE_URL: &str = "ALLOCSIGHT_DEEPSEEK_BASE_URL";
const ENV_MODEL: &str = "ALLOCSIGHT_DEEPSEEK_MODEL";

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
const DEFAULT_MODEL: &str = "deepseek-chat";
const HTTP_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// One bounded external call, at most one retry.
const BACKOFF_SCHEDULE: [StdDuration; 2] = [StdDuration::ZERO, StdDuration::from_secs(1)];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NarrativeOperation {
    ConflictBriefing,
    ForecastOutlook,
    RebalancePlan,
}

impl NarrativeOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            NarrativeOperation::ConflictBriefing => "conflictBriefing",
            NarrativeOperation::ForecastOutlook => "forecastOutlook",
            NarrativeOperation::RebalancePlan => "rebalancePlan",
        }
    }

    fn system_prompt(self) -> &'static str {
        match self {
            NarrativeOperation::ConflictBriefing => conflict_briefing_system_prompt(),
            NarrativeOperation::ForecastOutlook => forecast_outlook_system_prompt(),
            NarrativeOperation::RebalancePlan => rebalance_plan_system_prompt(),
        }
    }

    fn temperature(self) -> f32 {
        match self {
            NarrativeOperation::ConflictBriefing => 0.3,
            NarrativeOperation::ForecastOutlook => 0.4,
            NarrativeOperation::RebalancePlan => 0.3,
        }
    }
}

/// The injectable text-generation capability. Analytics components depend
/// on this trait only; tests substitute deterministic stubs.
#[async_trait]
pub trait NarrativeProvider: Send + Sync {
    async fn narrate(&self, operation: NarrativeOperation, facts: &JsonValue)
        -> AppResult<String>;
}

/// Front door the analytics services talk to. Holds an optional provider;
/// without one every `narrate` call reports a configuration error, which
/// callers convert to their fixed fallback text.
#[derive(Clone)]
pub struct NarrativeService {
    provider: Option<Arc<dyn NarrativeProvider>>,
}

impl NarrativeService {
    /// Build from environment configuration. Missing credentials are not
    /// an error here; they surface per call as `MissingApiKey`.
    pub fn from_env() -> AppResult<Self> {
        let config = NarrativeConfig::from_env();
        let provider = config.build_provider()?;
        Ok(Self { provider })
    }

    pub fn with_provider(provider: Arc<dyn NarrativeProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// A service that always reports missing configuration.
    pub fn disabled() -> Self {
        Self { provider: None }
    }

    pub fn has_configured_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn narrate(
        &self,
        operation: NarrativeOperation,
        facts: &JsonValue,
    ) -> AppResult<String> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            AppError::narrative(
                NarrativeErrorCode::MissingApiKey,
                "narrative provider not configured",
            )
        })?;

        debug!(target: "app::narrative", operation = operation.as_str(), "narration requested");
        provider.narrate(operation, facts).await
    }
}

#[derive(Debug, Clone)]
struct NarrativeConfig {
    api_key: Option<String>,
    api_base_url: String,
    model: String,
    http_timeout: StdDuration,
}

impl NarrativeConfig {
    fn from_env() -> Self {
        let api_key = std::env::var(ENV_API_KEY)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let api_base_url = std::env::var(ENV_BASE_URL)
            .ok()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = std::env::var(ENV_MODEL)
            .ok()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Self {
            api_key,
            api_base_url,
            model,
            http_timeout: HTTP_TIMEOUT,
        }
    }

    fn build_provider(&self) -> AppResult<Option<Arc<dyn NarrativeProvider>>> {
        match &self.api_key {
            Some(api_key) => {
                let provider = DeepSeekProvider::try_new(self, api_key.clone())?;
                Ok(Some(Arc::new(provider)))
            }
            None => Ok(None),
        }
    }
}

struct DeepSeekProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

struct NarrationResult {
    text: String,
    latency_ms: u128,
    correlation_id: String,
}

impl DeepSeekProvider {
    fn try_new(config: &NarrativeConfig, api_key: String) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Some(StdDuration::from_secs(90)))
            .build()
            .map_err(|err| {
                AppError::other(format!("failed to build narrative HTTP client: {err}"))
            })?;

        let base_url = config.api_base_url.trim_end_matches('/').to_string();
        let endpoint = format!("{}/v1/chat/completions", base_url);

        Ok(Self {
            client,
            api_key,
            endpoint,
            model: config.model.clone(),
        })
    }

    async fn invoke(
        &self,
        operation: NarrativeOperation,
        facts: &JsonValue,
    ) -> AppResult<NarrationResult> {
        let correlation_id = Uuid::new_v4().to_string();
        let sanitized_facts = redact_sensitive_data(facts)
            .unwrap_or_else(|_| JsonValue::String("<redacted>".to_string()));
        let sanitized_facts_str =
            serde_json::to_string(&sanitized_facts).unwrap_or_else(|_| "\"<redacted>\"".to_string());

        let request_body = self.build_request_body(operation, facts);

        let mut last_error: Option<AppError> = None;

        for (attempt, delay) in BACKOFF_SCHEDULE.iter().enumerate() {
            if *delay > StdDuration::ZERO {
                sleep(*delay).await;
            }

            debug!(
                target: "app::narrative",
                operation = operation.as_str(),
                attempt = attempt + 1,
                correlation_id = %correlation_id,
                facts = %sanitized_facts_str,
                "invoking narrative provider"
            );

            let start = Instant::now();
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request_body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let latency_ms = start.elapsed().as_millis();

                        let body: JsonValue = resp.json().await.map_err(|err| {
                            AppError::narrative_with_details(
                                NarrativeErrorCode::InvalidResponse,
                                "failed to decode narrative response",
                                Some(correlation_id.as_str()),
                                Some(json!({ "reason": err.to_string() })),
                            )
                        })?;

                        let content = body
                            .pointer("/choices/0/message/content")
                            .and_then(|value| value.as_str())
                            .ok_or_else(|| {
                                AppError::narrative_with_details(
                                    NarrativeErrorCode::InvalidResponse,
                                    "narrative response is missing message.content",
                                    Some(correlation_id.as_str()),
                                    Some(json!({ "reason": "missing_message_content" })),
                                )
                            })?;

                        let text = Self::clean_content(content, &correlation_id)?;

                        debug!(
                            target: "app::narrative",
                            correlation_id = %correlation_id,
                            latency_ms,
                            "narrative provider responded"
                        );

                        return Ok(NarrationResult {
                            text,
                            latency_ms,
                            correlation_id,
                        });
                    }

                    let (error, retryable) = Self::map_http_error(status, correlation_id.as_str());
                    warn!(
                        target: "app::narrative",
                        correlation_id = %correlation_id,
                        status = status.as_u16(),
                        retryable,
                        "narrative provider returned a non-success status"
                    );

                    if !retryable || attempt == BACKOFF_SCHEDULE.len() - 1 {
                        return Err(error);
                    }

                    last_error = Some(error);
                    continue;
                }
                Err(err) => {
                    let (error, retryable) = Self::error_from_reqwest(err, correlation_id.as_str());
                    warn!(
                        target: "app::narrative",
                        correlation_id = %correlation_id,
                        retryable,
                        "narrative request error"
                    );

                    if !retryable || attempt == BACKOFF_SCHEDULE.len() - 1 {
                        return Err(error);
                    }

                    last_error = Some(error);
                    continue;
                }
            }
        }

        if let Some(error) = last_error {
            Err(error)
        } else {
            Err(AppError::narrative_with_details(
                NarrativeErrorCode::ProviderUnavailable,
                "narrative request failed",
                Some(correlation_id.as_str()),
                None,
            ))
        }
    }

    fn build_request_body(&self, operation: NarrativeOperation, facts: &JsonValue) -> JsonValue {
        let user_content = serde_json::to_string(facts).unwrap_or_else(|_| "{}".to_string());
        json!({
            "model": self.model,
            "temperature": operation.temperature(),
            "top_p": 0.9,
            "messages": [
                { "role": "system", "content": operation.system_prompt() },
                { "role": "user", "content": user_content }
            ]
        })
    }

    /// Providers occasionally wrap prose in a code fence despite the
    /// instructions; strip it rather than failing the call.
    fn clean_content(content: &str, correlation_id: &str) -> AppResult<String> {
        let trimmed = content.trim();
        let cleaned = if trimmed.starts_with("```") {
            let without_prefix = trimmed
                .trim_start_matches("```text")
                .trim_start_matches("```");
            without_prefix.trim_end_matches("```").trim().to_string()
        } else {
            trimmed.to_string()
        };

        if cleaned.is_empty() {
            return Err(AppError::narrative_with_details(
                NarrativeErrorCode::InvalidResponse,
                "narrative response was empty",
                Some(correlation_id),
                Some(json!({ "reason": "empty_content" })),
            ));
        }

        Ok(cleaned)
    }

    fn map_http_error(status: StatusCode, correlation_id: &str) -> (AppError, bool) {
        match status {
            StatusCode::UNAUTHORIZED => (
                AppError::narrative_with_details(
                    NarrativeErrorCode::MissingApiKey,
                    "narrative API key is invalid or unauthorized",
                    Some(correlation_id),
                    None,
                ),
                false,
            ),
            StatusCode::FORBIDDEN => (
                AppError::narrative_with_details(
                    NarrativeErrorCode::Forbidden,
                    "narrative API access is forbidden",
                    Some(correlation_id),
                    None,
                ),
                false,
            ),
            StatusCode::TOO_MANY_REQUESTS => (
                AppError::narrative_with_details(
                    NarrativeErrorCode::RateLimited,
                    "narrative provider is rate limiting requests",
                    Some(correlation_id),
                    None,
                ),
                true,
            ),
            status if status.is_server_error() => (
                AppError::narrative_with_details(
                    NarrativeErrorCode::ProviderUnavailable,
                    format!(
                        "narrative provider is temporarily unavailable (status {})",
                        status.as_u16()
                    ),
                    Some(correlation_id),
                    None,
                ),
                true,
            ),
            StatusCode::BAD_REQUEST => (
                AppError::narrative_with_details(
                    NarrativeErrorCode::InvalidRequest,
                    "narrative request was malformed",
                    Some(correlation_id),
                    None,
                ),
                false,
            ),
            StatusCode::NOT_FOUND => (
                AppError::narrative_with_details(
                    NarrativeErrorCode::InvalidRequest,
                    "narrative endpoint address is invalid",
                    Some(correlation_id),
                    None,
                ),
                false,
            ),
            status => (
                AppError::narrative_with_details(
                    NarrativeErrorCode::Unknown,
                    format!("narrative provider returned status {}", status.as_u16()),
                    Some(correlation_id),
                    None,
                ),
                false,
            ),
        }
    }

    fn error_from_reqwest(err: reqwest::Error, correlation_id: &str) -> (AppError, bool) {
        if err.is_timeout() {
            (
                AppError::narrative_with_details(
                    NarrativeErrorCode::HttpTimeout,
                    "narrative request timed out",
                    Some(correlation_id),
                    None,
                ),
                true,
            )
        } else if err.is_connect() {
            (
                AppError::narrative_with_details(
                    NarrativeErrorCode::ProviderUnavailable,
                    format!("failed to reach narrative provider: {err}"),
                    Some(correlation_id),
                    None,
                ),
                true,
            )
        } else {
            (
                AppError::narrative_with_details(
                    NarrativeErrorCode::Unknown,
                    format!("narrative request failed: {err}"),
                    Some(correlation_id),
                    None,
                ),
                false,
            )
        }
    }
}

#[async_trait]
impl NarrativeProvider for DeepSeekProvider {
    async fn narrate(
        &self,
        operation: NarrativeOperation,
        facts: &JsonValue,
    ) -> AppResult<String> {
        let NarrationResult {
            text,
            latency_ms,
            correlation_id,
        } = self.invoke(operation, facts).await?;

        debug!(
            target: "app::narrative",
            operation = operation.as_str(),
            correlation_id = %correlation_id,
            latency_ms,
            chars = text.len(),
            "narration complete"
        );

        Ok(text)
    }
}

/// Expose provider internals for integration tests without widening the
/// public API surface.
pub mod testing {
    use super::*;

    pub fn map_http_error(status: StatusCode) -> (AppError, bool) {
        DeepSeekProvider::map_http_error(status, "test-correlation-id")
    }

    pub async fn narrate_via_http(
        base_url: &str,
        timeout: StdDuration,
        operation: NarrativeOperation,
        facts: &JsonValue,
    ) -> AppResult<String> {
        let config = NarrativeConfig {
            api_key: Some("test-key".to_string()),
            api_base_url: base_url.trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
            http_timeout: timeout,
        };
        let provider = DeepSeekProvider::try_new(&config, "test-key".to_string())?;
        provider.narrate(operation, facts).await
    }
}
