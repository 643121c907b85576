//! JSON conversion stage: narration → validated slide records.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use slidecast_providers::{GenerationRequest, ResponseFormat, TextGenerationClient};
use slidecast_shared::{Batch, BatchState, Result, Script, SlideRecord, SlidecastError};
use slidecast_storage::{BlobStore, PresentationLayout};
use tracing::{debug, instrument};

use crate::ledger::BatchLedger;

const CONVERSION_SYSTEM_PROMPT: &str = "\
You convert slide narration into JSON. Each input line has the form \
`Slide <number> | <title> | <narration>`. Respond with a single JSON object:

{\"slides\": [{\"slide\": <number>, \"title\": \"<title>\", \"script\": \"<narration>\"}]}

Use one entry per input line, in the same order, with the slide numbers \
unchanged. When the narration is SKIP, keep the title, set \"script\" to a \
one-sentence description of the slide and add \"should_skip\": true. Do not \
add any other fields and do not wrap the object in markdown.";

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*\n(.*?)\n?\s*```\s*$").expect("valid regex")
});

/// Parse and validate one batch's conversion output.
///
/// The output must be a `{"slides": [...]}` object with exactly one record
/// per batch slide, numbered from the batch's first slide, with non-empty
/// `title` and `script` and no extra fields. Any deviation is a
/// [`SlidecastError::SchemaValidation`].
pub fn parse_batch_records(raw: &str, batch: &Batch) -> Result<Vec<SlideRecord>> {
    let body = match CODE_FENCE.captures(raw) {
        Some(caps) => caps.get(1).map_or(raw, |m| m.as_str()),
        None => raw,
    };

    let script: Script = serde_json::from_str(body.trim())
        .map_err(|e| SlidecastError::schema(format!("{}: {e}", batch.id)))?;

    if script.slides.len() != batch.slides.len() {
        return Err(SlidecastError::schema(format!(
            "{}: expected {} slides, got {}",
            batch.id,
            batch.slides.len(),
            script.slides.len()
        )));
    }

    for (expected, record) in batch.slide_numbers().zip(&script.slides) {
        if record.slide != expected {
            return Err(SlidecastError::schema(format!(
                "{}: expected slide {expected}, got {}",
                batch.id, record.slide
            )));
        }
        if record.title.trim().is_empty() {
            return Err(SlidecastError::schema(format!(
                "{}: slide {expected} has an empty title",
                batch.id
            )));
        }
        if record.script.trim().is_empty() {
            return Err(SlidecastError::schema(format!(
                "{}: slide {expected} has an empty script",
                batch.id
            )));
        }
    }

    Ok(script.slides)
}

/// Converts a batch's narration and persists the validated records.
pub struct JsonConversionStage {
    client: Arc<dyn TextGenerationClient>,
    store: Arc<dyn BlobStore>,
    layout: PresentationLayout,
}

impl JsonConversionStage {
    pub fn new(
        client: Arc<dyn TextGenerationClient>,
        store: Arc<dyn BlobStore>,
        layout: PresentationLayout,
    ) -> Self {
        Self {
            client,
            store,
            layout,
        }
    }

    /// One conversion attempt against `narration`.
    #[instrument(skip_all, fields(batch = %batch.id))]
    pub async fn run(
        &self,
        batch: &Batch,
        narration: &str,
        ledger: &BatchLedger,
    ) -> Result<Vec<SlideRecord>> {
        ledger.record(BatchState::json_started).await?;

        let request = GenerationRequest {
            system: CONVERSION_SYSTEM_PROMPT.to_string(),
            prompt: narration.to_string(),
            format: ResponseFormat::Json,
        };

        let converted = match self.client.generate(&request).await {
            Ok(raw) => parse_batch_records(&raw, batch),
            Err(e) => Err(e),
        };

        match converted {
            Ok(records) => {
                let bytes = serde_json::to_vec_pretty(&records)
                    .map_err(|e| SlidecastError::Storage(format!("serialize records: {e}")))?;
                self.store
                    .put(&self.layout.batch_json(&batch.id), &bytes)
                    .await?;
                ledger.record(BatchState::json_completed).await?;
                debug!(records = records.len(), "batch json stored");
                Ok(records)
            }
            Err(e) => {
                let message = e.to_string();
                let schema_rejected = matches!(e, SlidecastError::SchemaValidation { .. });
                ledger
                    .record(|s| s.json_failed(&message, schema_rejected))
                    .await?;
                Err(e)
            }
        }
    }
}
