//! OpenAI-compatible chat completions client.
//!
//! Speaks `POST {base_url}/chat/completions` with bearer authentication,
//! which covers OpenAI itself and gateways such as the Vercel AI Gateway.
//! User messages carrying an image data URI are sent as `image_url`
//! content parts so vision-capable models receive the picture.

use crate::backend::{
    Candidate, ChatMessage, CompletionBackend, CompletionRequest, CompletionResponse, MessageRole,
    TokenUsage,
};
use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Configuration for an OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    /// Short provider name used in logs and errors.
    pub name: String,
    /// Base URL, e.g. `https://ai-gateway.vercel.sh/v1`.
    pub base_url: String,
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Overall request timeout enforced by the HTTP client.
    pub timeout: Duration,
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
}

impl OpenAiCompatibleConfig {
    /// Creates a configuration with default timeouts.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the overall request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A backend that speaks the OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleBackend {
    name: String,
    endpoint: String,
    api_key: String,
    client: Client,
}

impl OpenAiCompatibleBackend {
    /// Creates a new backend.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the base URL or API key is empty, or if the
    /// HTTP client cannot be built.
    pub fn new(config: OpenAiCompatibleConfig) -> Result<Self, Report<LlmError>> {
        let base_url = config.base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(LlmError::InvalidConfig {
                reason: "base URL is empty".to_string(),
            }
            .into());
        }
        if config.api_key.trim().is_empty() {
            return Err(LlmError::InvalidConfig {
                reason: "API key is empty".to_string(),
            }
            .into());
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| LlmError::InvalidConfig {
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            name: config.name,
            endpoint: format!("{base_url}/chat/completions"),
            api_key: config.api_key,
            client,
        })
    }

    /// Returns the full chat completions URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatibleBackend {
    #[instrument(
        skip(self, request),
        fields(provider = %self.name, model = %request.model, messages = request.messages.len())
    )]
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, Report<LlmError>> {
        let body = WireRequest::from_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&self.name, &e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(LlmError::RateLimited { retry_after_secs }.into());
        }

        let text = response
            .text()
            .await
            .map_err(|e| LlmError::from_transport(&self.name, &e))?;

        if !status.is_success() {
            return Err(LlmError::RequestFailed {
                reason: format!("{} returned HTTP {status}: {}", self.name, text.trim()),
            }
            .into());
        }

        let wire: WireResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::MalformedResponse {
                reason: e.to_string(),
            })?;

        let response = wire.into_response();
        debug!(
            candidates = response.candidates.len(),
            total_tokens = response.usage.map(|u| u.total()),
            "completion received"
        );
        Ok(response)
    }

    fn provider(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
}

impl<'a> WireRequest<'a> {
    fn from_request(request: &'a CompletionRequest) -> Self {
        Self {
            model: &request.model,
            messages: request.messages.iter().map(WireMessage::from_message).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: MessageRole,
    content: WireContent<'a>,
}

impl<'a> WireMessage<'a> {
    fn from_message(message: &'a ChatMessage) -> Self {
        let content = if message.role == MessageRole::User && message.is_image() {
            WireContent::Parts(vec![WirePart::ImageUrl {
                image_url: WireImageUrl {
                    url: &message.content,
                },
            }])
        } else {
            WireContent::Text(&message.content)
        };
        Self {
            role: message.role,
            content,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent<'a> {
    Text(&'a str),
    Parts(Vec<WirePart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart<'a> {
    ImageUrl { image_url: WireImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct WireImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    model: Option<String>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl WireResponse {
    fn into_response(self) -> CompletionResponse {
        CompletionResponse {
            candidates: self
                .choices
                .into_iter()
                .map(|choice| Candidate {
                    role: MessageRole::Assistant,
                    content: choice.message.content.unwrap_or_default(),
                })
                .collect(),
            model: self.model,
            usage: self.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> OpenAiCompatibleBackend {
        let config = OpenAiCompatibleConfig::new("test-gateway", format!("{}/v1/", server.uri()), "sk-test")
            .with_timeout(Duration::from_millis(500));
        OpenAiCompatibleBackend::new(config).expect("backend")
    }

    fn hello_request() -> CompletionRequest {
        CompletionRequest::new(
            "openai/gpt-5-nano",
            vec![ChatMessage::system("be brief"), ChatMessage::user("hello")],
        )
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let backend = OpenAiCompatibleBackend::new(OpenAiCompatibleConfig::new(
            "gw",
            "https://ai-gateway.vercel.sh/v1/",
            "key",
        ))
        .expect("backend");
        assert_eq!(
            backend.endpoint(),
            "https://ai-gateway.vercel.sh/v1/chat/completions"
        );
    }

    #[test]
    fn empty_api_key_is_invalid_config() {
        let err = OpenAiCompatibleBackend::new(OpenAiCompatibleConfig::new("gw", "http://x", " "))
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            LlmError::InvalidConfig { .. }
        ));
    }

    #[test]
    fn image_messages_become_content_parts() {
        let request = CompletionRequest::new(
            "m",
            vec![
                ChatMessage::system("s"),
                ChatMessage::user("data:image/png;base64,iVBORw0KGgo="),
                ChatMessage::assistant("a picture"),
            ],
        );
        let json = serde_json::to_value(WireRequest::from_request(&request)).expect("serialize");

        assert_eq!(json["messages"][0]["content"], "s");
        assert_eq!(json["messages"][1]["content"][0]["type"], "image_url");
        assert_eq!(
            json["messages"][1]["content"][0]["image_url"]["url"],
            "data:image/png;base64,iVBORw0KGgo="
        );
        assert_eq!(json["messages"][2]["content"], "a picture");
    }

    #[test]
    fn null_content_becomes_empty_string() {
        let wire: WireResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#)
                .expect("parse");
        let response = wire.into_response();
        assert_eq!(response.candidates.len(), 1);
        assert_eq!(response.candidates[0].content, "");
    }

    #[tokio::test]
    async fn complete_returns_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "openai/gpt-5-nano",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "hi there"}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = backend_for(&server)
            .complete(&hello_request())
            .await
            .expect("completion");

        assert_eq!(
            response.first_candidate().map(|c| c.content.as_str()),
            Some("hi there")
        );
        assert_eq!(response.usage.map(|u| u.total()), Some(15));

        let requests = server.received_requests().await.expect("recording enabled");
        let body: serde_json::Value = requests[0].body_json().expect("json body");
        assert_eq!(body["model"], "openai/gpt-5-nano");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
    }

    #[tokio::test]
    async fn empty_choices_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let response = backend_for(&server)
            .complete(&hello_request())
            .await
            .expect("completion");
        assert!(response.first_candidate().is_none());
    }

    #[tokio::test]
    async fn server_error_is_request_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .complete(&hello_request())
            .await
            .unwrap_err();
        match err.current_context() {
            LlmError::RequestFailed { reason } => {
                assert!(reason.contains("502"));
                assert!(reason.contains("bad gateway"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn too_many_requests_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .complete(&hello_request())
            .await
            .unwrap_err();
        assert_eq!(
            err.current_context(),
            &LlmError::RateLimited {
                retry_after_secs: Some(7)
            }
        );
    }

    #[tokio::test]
    async fn malformed_body_is_parse_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .complete(&hello_request())
            .await
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            LlmError::MalformedResponse { .. }
        ));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"choices": []}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .complete(&hello_request())
            .await
            .unwrap_err();
        assert_eq!(err.current_context(), &LlmError::Timeout);
    }
}
