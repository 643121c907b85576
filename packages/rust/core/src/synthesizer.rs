//! Per-paragraph speech synthesis in barrier-separated groups.

use std::sync::Arc;

use slidecast_providers::{SpeechRequest, SpeechSynthesisClient};
use slidecast_shared::{AudioSegment, AudioUnit, PipelineConfig, Result, Script, SlidecastError};
use tracing::{debug, error, instrument};

use crate::limiter::grouped_barrier;
use crate::retry::{Attempt, RetryPolicy};

/// Non-skipped slides in script order, indexed from 0.
pub fn audio_units(script: &Script) -> Vec<AudioUnit> {
    script
        .slides
        .iter()
        .filter(|record| !record.is_skipped())
        .enumerate()
        .map(|(index, record)| AudioUnit {
            index,
            slide: record.slide,
            paragraph: record.script.clone(),
        })
        .collect()
}

/// One request per unit, each carrying all earlier and all later paragraphs.
pub fn speech_requests(units: &[AudioUnit], voice_id: &str) -> Vec<SpeechRequest> {
    let paragraphs: Vec<&str> = units.iter().map(|u| u.paragraph.as_str()).collect();
    let joined = |range: &[&str]| (!range.is_empty()).then(|| range.join(" "));

    (0..paragraphs.len())
        .map(|i| SpeechRequest {
            text: paragraphs[i].to_string(),
            previous_text: joined(&paragraphs[..i]),
            next_text: joined(&paragraphs[i + 1..]),
            voice_id: voice_id.to_string(),
        })
        .collect()
}

/// Issues synthesis requests for a script's audio units.
pub struct AudioSynthesizer {
    client: Arc<dyn SpeechSynthesisClient>,
    policy: RetryPolicy,
    group_size: usize,
    voice_id: String,
}

impl AudioSynthesizer {
    pub fn new(client: Arc<dyn SpeechSynthesisClient>, config: &PipelineConfig) -> Self {
        Self {
            client,
            policy: RetryPolicy::new(config.synthesis_attempts, config.retry_backoff),
            group_size: config.audio_group_size,
            voice_id: config.voice_id.clone(),
        }
    }

    /// Synthesize every unit, one group at a time.
    ///
    /// Any unit exhausting its attempts aborts the run once its group has
    /// resolved; later groups are never started.
    #[instrument(skip_all, fields(units = units.len(), group_size = self.group_size))]
    pub async fn synthesize(
        &self,
        units: Vec<AudioUnit>,
        on_group: impl FnMut(usize),
    ) -> Result<Vec<AudioSegment>> {
        let requests = speech_requests(&units, &self.voice_id);
        let work: Vec<_> = units.into_iter().zip(requests).collect();

        grouped_barrier(
            work,
            self.group_size,
            |(unit, request)| synthesize_unit(Arc::clone(&self.client), self.policy, unit, request),
            on_group,
        )
        .await
    }
}

async fn synthesize_unit(
    client: Arc<dyn SpeechSynthesisClient>,
    policy: RetryPolicy,
    unit: AudioUnit,
    request: SpeechRequest,
) -> Result<AudioSegment> {
    let label = format!("unit_{}", unit.index);
    let client = &client;
    let request = &request;

    match policy.run(&label, move || client.synthesize(request)).await? {
        Attempt::Succeeded(waveform) => {
            debug!(index = unit.index, bytes = waveform.len(), "segment synthesized");
            Ok(AudioSegment {
                index: unit.index,
                waveform,
            })
        }
        Attempt::Exhausted(e) => {
            error!(index = unit.index, slide = unit.slide, error = %e, "synthesis failed");
            Err(SlidecastError::SynthesisFailed {
                index: unit.index,
                slide: unit.slide,
                last_error: e.to_string(),
            })
        }
    }
}
