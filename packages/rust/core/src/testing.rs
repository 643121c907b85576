//! Scripted fake clients for pipeline tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use slidecast_providers::{
    GenerationRequest, ResponseFormat, SpeechRequest, SpeechSynthesisClient, TextGenerationClient,
};
use slidecast_shared::{Result, SlidecastError};

/// Slide text starting with this marker is narrated as `SKIP`.
pub const SKIP_MARKER: &str = "[skip]";

/// Tracks concurrent calls and the highest concurrency seen.
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Text client that narrates `--- Slide N ---` sections and converts
/// `Slide N | title | narration` lines, with scripted failures.
#[derive(Default)]
pub struct ScriptedText {
    narrative_calls: AtomicUsize,
    json_calls: AtomicUsize,
    fail_narrative: usize,
    malformed_json: usize,
    poison: Option<String>,
    delay: Duration,
    pub in_flight: InFlight,
}

impl ScriptedText {
    pub fn narrating() -> Self {
        Self::default()
    }

    /// The first `n` narrative calls fail with a service error.
    pub fn fail_narrative(mut self, n: usize) -> Self {
        self.fail_narrative = n;
        self
    }

    /// The first `n` conversion calls return output that is not JSON.
    pub fn malformed_json(mut self, n: usize) -> Self {
        self.malformed_json = n;
        self
    }

    /// Narrative calls whose prompt contains `marker` always fail.
    pub fn poison(mut self, marker: &str) -> Self {
        self.poison = Some(marker.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn narrative_calls(&self) -> usize {
        self.narrative_calls.load(Ordering::SeqCst)
    }

    pub fn json_calls(&self) -> usize {
        self.json_calls.load(Ordering::SeqCst)
    }

    fn narrate(&self, prompt: &str) -> Result<String> {
        let call = self.narrative_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_narrative {
            return Err(SlidecastError::TransientService("narrative: 503".into()));
        }
        if let Some(marker) = &self.poison {
            if prompt.contains(marker.as_str()) {
                return Err(SlidecastError::TransientService("narrative: poisoned".into()));
            }
        }

        let mut lines = Vec::new();
        for section in prompt.split("--- Slide ").skip(1) {
            let (number, body) = section.split_once(" ---").unwrap_or((section, ""));
            let text = body.trim();
            let narration = if text.starts_with(SKIP_MARKER) {
                "SKIP".to_string()
            } else {
                format!("Narration for {text}.")
            };
            lines.push(format!("Slide {number} | {text} | {narration}"));
        }
        Ok(lines.join("\n"))
    }

    fn convert(&self, narration: &str) -> Result<String> {
        let call = self.json_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.malformed_json {
            return Ok("Sure! Here are the slides you asked for.".into());
        }

        let slides: Vec<serde_json::Value> = narration
            .lines()
            .filter_map(|line| {
                let mut parts = line.splitn(3, " | ");
                let number: u32 = parts.next()?.strip_prefix("Slide ")?.trim().parse().ok()?;
                let title = parts.next()?.trim();
                let script = parts.next()?.trim();
                Some(if script == "SKIP" {
                    serde_json::json!({
                        "slide": number,
                        "title": title,
                        "script": "Divider slide.",
                        "should_skip": true
                    })
                } else {
                    serde_json::json!({"slide": number, "title": title, "script": script})
                })
            })
            .collect();
        Ok(serde_json::json!({ "slides": slides }).to_string())
    }
}

#[async_trait]
impl TextGenerationClient for ScriptedText {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.in_flight.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = match request.format {
            ResponseFormat::Text => self.narrate(&request.prompt),
            ResponseFormat::Json => self.convert(&request.prompt),
        };
        self.in_flight.exit();
        result
    }
}

/// Speech client whose "audio" is the paragraph's own bytes as 16-bit PCM.
///
/// Paragraphs are padded with a space to an even length, so a decoded
/// track reads back as the concatenated paragraphs.
#[derive(Default)]
pub struct ScriptedSpeech {
    requests: Mutex<Vec<SpeechRequest>>,
    events: Mutex<Vec<String>>,
    poison: Option<String>,
    pub in_flight: InFlight,
}

impl ScriptedSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests whose text contains `marker` fail.
    pub fn poison(mut self, marker: &str) -> Self {
        self.poison = Some(marker.to_string());
        self
    }

    pub fn requests(&self) -> Vec<SpeechRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// `start:<text>` / `end:<text>` in the order they happened.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn log(&self, event: String) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Encode a paragraph the way [`ScriptedSpeech`] does.
pub fn pcm_for(text: &str) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    if bytes.len() % 2 == 1 {
        bytes.push(b' ');
    }
    bytes
}

#[async_trait]
impl SpeechSynthesisClient for ScriptedSpeech {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.in_flight.enter();
        self.log(format!("start:{}", request.text));

        // Shorter paragraphs finish first, so completion order differs from index order.
        let millis = 40u64.saturating_sub(request.text.len() as u64).max(1);
        tokio::time::sleep(Duration::from_millis(millis)).await;

        self.log(format!("end:{}", request.text));
        self.in_flight.exit();

        match &self.poison {
            Some(marker) if request.text.contains(marker.as_str()) => Err(
                SlidecastError::TransientService("speech: voice unavailable".into()),
            ),
            _ => Ok(pcm_for(&request.text)),
        }
    }
}
