//! Narrative stage: one free-text narration blob per batch.

use std::sync::Arc;

use slidecast_providers::{GenerationRequest, ResponseFormat, TextGenerationClient};
use slidecast_shared::{Batch, BatchState, Result};
use slidecast_storage::{BlobStore, PresentationLayout};
use tracing::{debug, instrument};

use crate::ledger::BatchLedger;

const NARRATIVE_SYSTEM_PROMPT: &str = "\
You are a presenter writing the spoken narration for a slide deck.
For every slide you are given, write exactly one line in the form:

Slide <number> | <short title> | <narration>

The narration is what the presenter says aloud: two to four natural sentences \
that explain the slide to a listener who cannot see it. Keep the slide numbers \
exactly as given and keep the slides in order. If a slide carries nothing worth \
saying (a blank divider, a bare logo, a thank-you page), write SKIP as its \
narration. Output only these lines.";

/// Build the user prompt for a batch: one delimited section per slide.
pub fn narrative_prompt(batch: &Batch) -> String {
    let mut prompt = String::new();
    for (number, text) in batch.slide_numbers().zip(&batch.slides) {
        prompt.push_str(&format!("--- Slide {number} ---\n{}\n\n", text.trim()));
    }
    prompt
}

/// Produces and persists the narration for a batch.
pub struct NarrativeStage {
    client: Arc<dyn TextGenerationClient>,
    store: Arc<dyn BlobStore>,
    layout: PresentationLayout,
}

impl NarrativeStage {
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

    /// One narrative attempt. Every call counts against the batch's attempts.
    #[instrument(skip_all, fields(batch = %batch.id))]
    pub async fn run(&self, batch: &Batch, ledger: &BatchLedger) -> Result<String> {
        ledger.record(BatchState::narrative_started).await?;

        let request = GenerationRequest {
            system: NARRATIVE_SYSTEM_PROMPT.to_string(),
            prompt: narrative_prompt(batch),
            format: ResponseFormat::Text,
        };

        match self.client.generate(&request).await {
            Ok(narration) => {
                self.store
                    .put(&self.layout.narrative(&batch.id), narration.as_bytes())
                    .await?;
                ledger.record(BatchState::narrative_completed).await?;
                debug!(chars = narration.len(), "narration stored");
                Ok(narration)
            }
            Err(e) => {
                let message = e.to_string();
                ledger.record(|s| s.narrative_failed(&message)).await?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedText;
    use slidecast_shared::{SlidecastError, StageStatus};
    use slidecast_storage::MemoryBlobStore;

    fn setup(client: Arc<ScriptedText>) -> (NarrativeStage, Arc<MemoryBlobStore>, PresentationLayout) {
        let store = Arc::new(MemoryBlobStore::new());
        let layout = PresentationLayout::new(&"deck".parse().unwrap());
        let stage = NarrativeStage::new(client, store.clone(), layout.clone());
        (stage, store, layout)
    }

    #[test]
    fn prompt_numbers_slides_from_batch_start() {
        let batch = Batch::new(3, vec!["Revenue".into(), "  Costs ".into()]);
        let prompt = narrative_prompt(&batch);
        assert!(prompt.contains("--- Slide 4 ---\nRevenue"));
        assert!(prompt.contains("--- Slide 5 ---\nCosts"));
        assert!(!prompt.contains("Slide 3"));
    }

    #[tokio::test]
    async fn success_persists_narration_and_state() {
        let client = Arc::new(ScriptedText::narrating());
        let (stage, store, layout) = setup(client.clone());
        let batch = Batch::new(0, vec!["Intro".into()]);
        let ledger = BatchLedger::open(store.clone(), layout.narrative_metadata(&batch.id))
            .await
            .unwrap();

        let narration = stage.run(&batch, &ledger).await.unwrap();
        let stored = store.get(&layout.narrative(&batch.id)).await.unwrap();
        assert_eq!(stored, narration.as_bytes());

        let state = ledger.snapshot();
        assert_eq!(state.narrative.state, StageStatus::Completed);
        assert_eq!(state.narrative.attempts, 1);
        assert_eq!(client.narrative_calls(), 1);
    }

    #[tokio::test]
    async fn failure_records_error_without_narration() {
        let client = Arc::new(ScriptedText::narrating().fail_narrative(1));
        let (stage, store, layout) = setup(client);
        let batch = Batch::new(0, vec!["Intro".into()]);
        let ledger = BatchLedger::open(store.clone(), layout.narrative_metadata(&batch.id))
            .await
            .unwrap();

        let err = stage.run(&batch, &ledger).await.unwrap_err();
        assert!(matches!(err, SlidecastError::TransientService(_)));
        assert!(!store.exists(&layout.narrative(&batch.id)).await.unwrap());

        let state = ledger.snapshot();
        assert_eq!(state.narrative.state, StageStatus::Failed);
        assert!(state.narrative.error.is_some());
    }
}
