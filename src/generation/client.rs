use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::retry::{
    RateLimitBackoff, RateLimitSignal, RetryConfig, RetryError, retry_async_with_policy,
};
use super::{GenerationBackend, GenerationFailure, GenerationOutcome, GenerationRequest};
use crate::metrics::RunMetrics;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-5";

const RATE_LIMIT_MARKER: &str = "rate_limit_exceeded";

/// Bearer credential for the generation service.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub endpoint: String,
    pub model: String,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(120),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Failure of a single HTTP attempt.
#[derive(Debug)]
enum AttemptError {
    RateLimited { status: u16, body: String },
    Failed(String),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::RateLimited { status, body } => {
                write!(f, "rate limited (HTTP {status}): {body}")
            }
            AttemptError::Failed(detail) => f.write_str(detail),
        }
    }
}

impl RateLimitSignal for AttemptError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, AttemptError::RateLimited { .. })
    }
}

/// Client for OpenAI-compatible chat completion endpoints.
pub struct OpenAiClient {
    settings: GenerationSettings,
    api_key: ApiKey,
    http_client: reqwest::Client,
    metrics: Option<Arc<RunMetrics>>,
}

impl OpenAiClient {
    pub fn new(
        settings: GenerationSettings,
        api_key: ApiKey,
        metrics: Option<Arc<RunMetrics>>,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            settings,
            api_key,
            http_client,
            metrics,
        })
    }

    async fn build_body(&self, request: &GenerationRequest<'_>) -> Result<serde_json::Value> {
        let mut content = Vec::with_capacity(request.images.len() + 1);
        content.push(ContentPart::Text {
            text: request.prompt.clone(),
        });
        for path in request.images {
            content.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image_data_url(path).await?,
                },
            });
        }

        let body = ChatRequest {
            model: &self.settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
        };
        serde_json::to_value(&body).context("failed to encode request body")
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<String, AttemptError> {
        let response = self
            .http_client
            .post(&self.settings.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(body)
            .send()
            .await
            .map_err(|e| AttemptError::Failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || error_text.contains(RATE_LIMIT_MARKER) {
                return Err(AttemptError::RateLimited {
                    status: status.as_u16(),
                    body: error_text,
                });
            }
            return Err(AttemptError::Failed(format!(
                "HTTP {status}: {error_text}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::Failed(format!("malformed response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AttemptError::Failed("response contained no message content".into()))
    }

    fn record(&self, request: &GenerationRequest<'_>, status: &str, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_generation(request.language, status, started.elapsed());
        }
    }
}

#[async_trait::async_trait]
impl GenerationBackend for OpenAiClient {
    #[instrument(
        skip(self, request),
        fields(object_id = request.object_id, language = request.language.code(), images = request.images.len())
    )]
    async fn generate(&self, request: &GenerationRequest<'_>) -> GenerationOutcome {
        let started = Instant::now();

        let body = match self.build_body(request).await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "could not build generation request");
                let failure = GenerationFailure::Api(format!("{e:#}"));
                self.record(request, failure.status(), started);
                return GenerationOutcome::Failed(failure);
            }
        };

        let policy = RateLimitBackoff::new(self.settings.retry.clone());
        let result = retry_async_with_policy(
            |_| self.send_once(&body),
            &policy,
            "generate_catalog_text",
            |_, _| {
                if let Some(metrics) = &self.metrics {
                    metrics.record_rate_limit_retry();
                }
            },
        )
        .await;

        let outcome = match result {
            Ok(text) => {
                debug!(chars = text.len(), "generation succeeded");
                GenerationOutcome::Generated(text)
            }
            Err(RetryError::Fatal { error, .. }) => {
                warn!(error = %error, "generation failed");
                GenerationOutcome::Failed(GenerationFailure::Api(error.to_string()))
            }
            Err(RetryError::Exhausted { attempts, .. }) => {
                warn!(attempts, "generation still rate limited");
                GenerationOutcome::Failed(GenerationFailure::RetriesExhausted)
            }
        };

        let status = match &outcome {
            GenerationOutcome::Generated(_) => "success",
            GenerationOutcome::Failed(failure) => failure.status(),
        };
        self.record(request, status, started);
        outcome
    }
}

fn mime_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        _ => "image/jpeg",
    }
}

async fn image_data_url(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read image {}", path.display()))?;
    Ok(format!(
        "data:{};base64,{}",
        mime_type(path),
        general_purpose::STANDARD.encode(bytes)
    ))
}
