//! HttpContentEngine - one reqwest call per attempt
//!
//! Each configured service maps to an endpoint speaking one of three wire
//! formats. Failures are classified by status; network errors, undecodable
//! bodies and empty completions are transient.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use contracts::{
    ApiFormat, AuthHeader, ContentEngine, ContractError, EngineError, RequestKind, RequestSpec,
    RunConfig, SamplingConfig, ServiceConfig,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Longest error body kept in attempt history
const ERROR_BODY_LIMIT: usize = 300;

/// Resolved request settings for one service
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    pub format: ApiFormat,
    pub url: String,
    pub model: String,
    pub timeout: Duration,
    pub headers: Vec<(String, String)>,
    pub sampling: SamplingConfig,
}

impl From<&ServiceConfig> for ServiceEndpoint {
    fn from(config: &ServiceConfig) -> Self {
        let mut headers: Vec<(String, String)> = config
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.sort();
        if config.format == ApiFormat::Claude
            && !headers
                .iter()
                .any(|(k, _)| k.eq_ignore_ascii_case("anthropic-version"))
        {
            headers.push(("anthropic-version".into(), ANTHROPIC_VERSION.into()));
        }

        Self {
            format: config.format,
            // gemini endpoints usually embed the model name
            url: config.endpoint.replace("{model}", &config.model),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            headers,
            sampling: config.sampling.clone(),
        }
    }
}

pub struct HttpContentEngine {
    client: Client,
    services: HashMap<String, ServiceEndpoint>,
}

impl HttpContentEngine {
    pub fn new<'a>(
        services: impl IntoIterator<Item = &'a ServiceConfig>,
    ) -> Result<Self, ContractError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ContractError::Other(format!("failed to create HTTP client: {e}")))?;

        let services = services
            .into_iter()
            .map(|s| (s.name.clone(), ServiceEndpoint::from(s)))
            .collect();

        Ok(Self { client, services })
    }

    pub fn from_config(config: &RunConfig) -> Result<Self, ContractError> {
        Self::new(&config.services)
    }

    pub fn endpoint(&self, service: &str) -> Option<&ServiceEndpoint> {
        self.services.get(service)
    }
}

impl ContentEngine for HttpContentEngine {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(
        name = "http_engine_generate",
        skip(self, request, auth),
        fields(service = %request.service)
    )]
    async fn generate(
        &self,
        request: &RequestSpec,
        auth: &AuthHeader,
    ) -> Result<String, EngineError> {
        let endpoint = self.endpoint(&request.service).ok_or_else(|| {
            EngineError::transient(format!("no endpoint for service '{}'", request.service))
        })?;

        let body = request_body(endpoint, &render_prompt(request));
        let mut builder = self
            .client
            .post(&endpoint.url)
            .timeout(endpoint.timeout)
            .header(auth.name.as_str(), auth.value.as_str())
            .json(&body);
        for (name, value) in &endpoint.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(classify_transport)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::from_status(
                status.as_u16(),
                format!("HTTP {}: {}", status.as_u16(), truncate(&text)),
            ));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| EngineError::transient(format!("malformed response body: {e}")))?;

        let content = extract_content(endpoint.format, &value)
            .ok_or_else(|| EngineError::transient("response carried no content"))?;
        debug!(bytes = content.len(), "Completion received");
        Ok(content)
    }
}

/// Prompt text actually sent for `request`
pub fn render_prompt(request: &RequestSpec) -> String {
    match &request.kind {
        RequestKind::Generate => request.prompt.clone(),
        RequestKind::Translate { target_lang } => format!(
            "Translate the following Markdown into language '{target_lang}'. \
             Keep the formatting and reply with the translation only.\n\n{}",
            request.prompt
        ),
    }
}

/// JSON request body in the endpoint's wire format
pub fn request_body(endpoint: &ServiceEndpoint, prompt: &str) -> Value {
    let s = &endpoint.sampling;
    match endpoint.format {
        ApiFormat::Gemini => json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": s.temperature,
                "maxOutputTokens": s.max_tokens,
                "topP": s.top_p,
            }
        }),
        ApiFormat::Claude => json!({
            "model": endpoint.model,
            "max_tokens": s.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": s.temperature,
            "top_p": s.top_p,
        }),
        ApiFormat::OpenAi => json!({
            "model": endpoint.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": s.temperature,
            "max_completion_tokens": s.max_tokens,
            "top_p": s.top_p,
            "stream": false,
        }),
    }
}

/// Trimmed completion text, `None` when absent or blank
pub fn extract_content(format: ApiFormat, value: &Value) -> Option<String> {
    let text = match format {
        ApiFormat::Gemini => value
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str),
        ApiFormat::Claude => value.pointer("/content/0/text").and_then(Value::as_str),
        ApiFormat::OpenAi => value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str),
    }?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn classify_transport(error: reqwest::Error) -> EngineError {
    match error.status() {
        Some(status) => EngineError::from_status(status.as_u16(), error.to_string()),
        None if error.is_timeout() => EngineError::transient(format!("request timeout: {error}")),
        None if error.is_connect() => EngineError::transient(format!("connection error: {error}")),
        None => EngineError::transient(format!("HTTP error: {error}")),
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
