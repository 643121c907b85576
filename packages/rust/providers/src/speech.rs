//! Speech synthesis: one request per narrated paragraph.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use slidecast_shared::{Result, SlidecastError};
use tracing::{debug, instrument};

use crate::{USER_AGENT, clip, endpoint};

/// A paragraph plus its neighbours, so prosody carries across boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub text: String,
    pub previous_text: Option<String>,
    pub next_text: Option<String>,
    pub voice_id: String,
}

/// A request/response speech-synthesis service.
#[async_trait]
pub trait SpeechSynthesisClient: Send + Sync {
    /// Synthesize one paragraph and return the audio payload.
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// ElevenLabs
// ---------------------------------------------------------------------------

/// Settings for [`ElevenLabsClient`].
#[derive(Debug, Clone)]
pub struct ElevenLabsOptions {
    pub base_url: String,
    pub api_key: String,
    pub model_id: String,
    /// Requests `pcm_<rate>` output: raw 16-bit little-endian mono samples.
    pub sample_rate: u32,
    pub timeout_secs: u64,
}

/// ElevenLabs text-to-speech client.
pub struct ElevenLabsClient {
    client: Client,
    base_url: String,
    api_key: String,
    model_id: String,
    output_format: String,
}

#[derive(Serialize)]
struct SynthesisBody<'a> {
    text: &'a str,
    model_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_text: Option<&'a str>,
}

impl ElevenLabsClient {
    pub fn new(options: ElevenLabsOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| {
                SlidecastError::TransientService(format!("failed to build HTTP client: {e}"))
            })?;

        // Validate once up front; per-voice paths are joined per request.
        endpoint(&options.base_url, "v1/text-to-speech")?;

        Ok(Self {
            client,
            base_url: options.base_url,
            api_key: options.api_key,
            model_id: options.model_id,
            output_format: format!("pcm_{}", options.sample_rate),
        })
    }
}

#[async_trait]
impl SpeechSynthesisClient for ElevenLabsClient {
    #[instrument(skip_all, fields(voice = %request.voice_id, chars = request.text.len()))]
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        let mut url = endpoint(&self.base_url, "v1/text-to-speech")?;
        url.path_segments_mut()
            .map_err(|()| SlidecastError::config(format!("invalid endpoint '{}'", self.base_url)))?
            .push(&request.voice_id);
        url.query_pairs_mut()
            .append_pair("output_format", &self.output_format);

        let body = SynthesisBody {
            text: &request.text,
            model_id: &self.model_id,
            previous_text: request.previous_text.as_deref(),
            next_text: request.next_text.as_deref(),
        };

        let response = self
            .client
            .post(url)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SlidecastError::TransientService(format!("elevenlabs: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SlidecastError::TransientService(format!(
                "elevenlabs: HTTP {status}: {}",
                clip(&text)
            )));
        }

        let bytes = response.bytes().await.map_err(|e| {
            SlidecastError::TransientService(format!("elevenlabs: body read failed: {e}"))
        })?;

        if bytes.is_empty() {
            return Err(SlidecastError::TransientService(
                "elevenlabs: empty audio payload".into(),
            ));
        }

        debug!(bytes = bytes.len(), "audio received");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ElevenLabsClient {
        ElevenLabsClient::new(ElevenLabsOptions {
            base_url: server.uri(),
            api_key: "xi-test".into(),
            model_id: "eleven_multilingual_v2".into(),
            sample_rate: 24_000,
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn sends_context_and_returns_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-1"))
            .and(query_param("output_format", "pcm_24000"))
            .and(header("xi-api-key", "xi-test"))
            .and(body_json(serde_json::json!({
                "text": "Second paragraph.",
                "model_id": "eleven_multilingual_v2",
                "previous_text": "First paragraph.",
                "next_text": "Third paragraph."
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 0, 2, 0]))
            .expect(1)
            .mount(&server)
            .await;

        let audio = client_for(&server)
            .synthesize(&SpeechRequest {
                text: "Second paragraph.".into(),
                previous_text: Some("First paragraph.".into()),
                next_text: Some("Third paragraph.".into()),
                voice_id: "voice-1".into(),
            })
            .await
            .unwrap();
        assert_eq!(audio, vec![1, 0, 2, 0]);
    }

    #[tokio::test]
    async fn omits_absent_context() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({
                "text": "Only paragraph.",
                "model_id": "eleven_multilingual_v2"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8, 0]))
            .expect(1)
            .mount(&server)
            .await;

        let audio = client_for(&server)
            .synthesize(&SpeechRequest {
                text: "Only paragraph.".into(),
                previous_text: None,
                next_text: None,
                voice_id: "voice-1".into(),
            })
            .await
            .unwrap();
        assert_eq!(audio.len(), 2);
    }

    #[tokio::test]
    async fn voice_id_stays_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/team%2Fnarrator%3Fx%23y"))
            .and(query_param("output_format", "pcm_24000"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8, 0]))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .synthesize(&SpeechRequest {
                text: "Hello.".into(),
                previous_text: None,
                next_text: None,
                voice_id: "team/narrator?x#y".into(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .synthesize(&SpeechRequest {
                text: "x".into(),
                previous_text: None,
                next_text: None,
                voice_id: "voice-1".into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("503"));
    }
}
