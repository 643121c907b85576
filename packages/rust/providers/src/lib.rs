//! External service clients used by the Slidecast pipeline.
//!
//! This crate provides:
//! - [`TextGenerationClient`]: narration and JSON conversion, with an
//!   OpenRouter chat-completions implementation ([`OpenRouterClient`])
//! - [`SpeechSynthesisClient`]: paragraph synthesis, with an ElevenLabs
//!   implementation ([`ElevenLabsClient`])
//!
//! Every transport or provider failure surfaces as
//! `SlidecastError::TransientService` so callers can retry it.

pub mod speech;
pub mod text;

pub use speech::{ElevenLabsClient, ElevenLabsOptions, SpeechRequest, SpeechSynthesisClient};
pub use text::{
    GenerationRequest, OpenRouterClient, OpenRouterOptions, ResponseFormat, TextGenerationClient,
};

/// User-Agent string for provider requests.
pub(crate) const USER_AGENT: &str = concat!("Slidecast/", env!("CARGO_PKG_VERSION"));

/// Longest provider error body echoed into an error message.
pub(crate) const MAX_ERROR_BODY: usize = 300;

/// Join a base URL and a path, validating the result.
pub(crate) fn endpoint(base_url: &str, path: &str) -> slidecast_shared::Result<url::Url> {
    let joined = format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'));
    url::Url::parse(&joined).map_err(|e| {
        slidecast_shared::SlidecastError::config(format!("invalid endpoint '{joined}': {e}"))
    })
}

/// Clip a provider error body for logging.
pub(crate) fn clip(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((i, _)) => &body[..i],
        None => body,
    }
}
