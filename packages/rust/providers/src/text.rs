//! Text generation: the narration and conversion backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use slidecast_shared::{Result, SlidecastError};
use tracing::{debug, instrument};
use url::Url;

use crate::{USER_AGENT, clip, endpoint};

/// Shape the caller expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Free-form text.
    Text,
    /// A single JSON object.
    Json,
}

/// One generation call: fixed role instructions plus the prompt body.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub format: ResponseFormat,
}

/// A request/response text-generation service.
#[async_trait]
pub trait TextGenerationClient: Send + Sync {
    /// Generate a completion. Service failures are `TransientService`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

// ---------------------------------------------------------------------------
// OpenRouter
// ---------------------------------------------------------------------------

/// Settings for [`OpenRouterClient`].
#[derive(Debug, Clone)]
pub struct OpenRouterOptions {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

/// OpenRouter chat-completions client.
pub struct OpenRouterClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<JsonMode>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct JsonMode {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl OpenRouterClient {
    pub fn new(options: OpenRouterOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| {
                SlidecastError::TransientService(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint: endpoint(&options.base_url, "chat/completions")?,
            api_key: options.api_key,
            model: options.model,
        })
    }
}

#[async_trait]
impl TextGenerationClient for OpenRouterClient {
    #[instrument(skip_all, fields(model = %self.model, format = ?request.format))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            response_format: match request.format {
                ResponseFormat::Json => Some(JsonMode {
                    kind: "json_object",
                }),
                ResponseFormat::Text => None,
            },
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SlidecastError::TransientService(format!("openrouter: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SlidecastError::TransientService(format!(
                "openrouter: HTTP {status}: {}",
                clip(&text)
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            SlidecastError::TransientService(format!("openrouter: malformed response: {e}"))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                SlidecastError::TransientService("openrouter: empty completion".into())
            })?;

        debug!(chars = content.len(), "completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenRouterClient {
        OpenRouterClient::new(OpenRouterOptions {
            base_url: format!("{}/api/v1", server.uri()),
            api_key: "test-key".into(),
            model: "test/model".into(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn request(format: ResponseFormat) -> GenerationRequest {
        GenerationRequest {
            system: "You narrate slides.".into(),
            prompt: "Slide 1: Hello".into(),
            format,
        }
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "test/model",
                "messages": [
                    {"role": "system", "content": "You narrate slides."},
                    {"role": "user", "content": "Slide 1: Hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Welcome everyone."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server)
            .generate(&request(ResponseFormat::Text))
            .await
            .unwrap();
        assert_eq!(text, "Welcome everyone.");
    }

    #[tokio::test]
    async fn json_format_requests_json_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "{\"slides\":[]}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server)
            .generate(&request(ResponseFormat::Json))
            .await
            .unwrap();
        assert_eq!(text, r#"{"slides":[]}"#);
    }

    #[tokio::test]
    async fn http_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .generate(&request(ResponseFormat::Text))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn empty_completion_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "   "}}]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .generate(&request(ResponseFormat::Text))
            .await
            .unwrap_err();
        assert!(matches!(err, SlidecastError::TransientService(_)));
    }
}
