//! Per-batch state machine and the batch window.
//!
//! A batch moves through narrative → conversion with a fixed retry budget:
//!
//! 1. narrative, up to `narrative_attempts` (2) tries; exhaustion fails the batch
//! 2. conversion of that narration, up to `conversion_attempts` (2) tries
//! 3. up to `recovery_rounds` (2) rounds of one fresh narrative plus, if it
//!    succeeds, one conversion; the first successful round completes the batch
//!
//! With the defaults a batch makes at most 4 narrative and 4 conversion calls.

use std::fmt;
use std::sync::Arc;

use slidecast_providers::TextGenerationClient;
use slidecast_shared::{Batch, BatchState, PipelineConfig, Result, SlidecastError};
use slidecast_storage::{BlobStore, PresentationLayout};
use tracing::{error, info, instrument, warn};

use crate::conversion::JsonConversionStage;
use crate::ledger::BatchLedger;
use crate::limiter::fifo_window;
use crate::narrative::NarrativeStage;
use crate::retry::{Attempt, RetryPolicy};

/// Stage a batch failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    Narrative,
    Conversion,
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Narrative => "narrative",
            Self::Conversion => "json",
        })
    }
}

/// Terminal state of one batch.
#[derive(Debug)]
pub enum BatchOutcome {
    Completed {
        batch_id: String,
        state: BatchState,
    },
    Failed {
        batch_id: String,
        stage: BatchStage,
        state: BatchState,
        error: SlidecastError,
    },
}

impl BatchOutcome {
    pub fn state(&self) -> &BatchState {
        match self {
            Self::Completed { state, .. } | Self::Failed { state, .. } => state,
        }
    }

    /// Turn a failed outcome into a [`SlidecastError::BatchFailed`].
    pub fn into_result(self) -> Result<BatchState> {
        match self {
            Self::Completed { state, .. } => Ok(state),
            Self::Failed {
                batch_id,
                stage,
                state,
                error,
            } => Err(SlidecastError::BatchFailed {
                batch_id,
                stage: stage.to_string(),
                narrative_attempts: state.narrative.attempts,
                json_attempts: state.json.attempts,
                last_error: error.to_string(),
            }),
        }
    }
}

/// Drives batches through narrative and conversion.
pub struct BatchOrchestrator {
    narrative: NarrativeStage,
    conversion: JsonConversionStage,
    store: Arc<dyn BlobStore>,
    layout: PresentationLayout,
    narrative_policy: RetryPolicy,
    conversion_policy: RetryPolicy,
    recovery_policy: RetryPolicy,
    recovery_rounds: u32,
    window: usize,
}

impl BatchOrchestrator {
    pub fn new(
        text: Arc<dyn TextGenerationClient>,
        store: Arc<dyn BlobStore>,
        layout: PresentationLayout,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            narrative: NarrativeStage::new(text.clone(), store.clone(), layout.clone()),
            conversion: JsonConversionStage::new(text, store.clone(), layout.clone()),
            store,
            layout,
            narrative_policy: RetryPolicy::new(config.narrative_attempts, config.retry_backoff),
            conversion_policy: RetryPolicy::new(config.conversion_attempts, config.retry_backoff),
            recovery_policy: RetryPolicy::new(1, config.retry_backoff),
            recovery_rounds: config.recovery_rounds,
            window: config.batch_concurrency,
        }
    }

    /// Run one batch to a terminal state.
    ///
    /// Budget exhaustion is a [`BatchOutcome::Failed`]; a fatal error (storage,
    /// a panicked task) is returned as `Err`.
    #[instrument(skip_all, fields(batch = %batch.id, start = batch.start_index))]
    pub async fn run(&self, batch: &Batch) -> Result<BatchOutcome> {
        let ledger = BatchLedger::open(
            self.store.clone(),
            self.layout.narrative_metadata(&batch.id),
        )
        .await?;

        let narration = match self.narrate(batch, &ledger, self.narrative_policy).await? {
            Attempt::Succeeded(narration) => narration,
            Attempt::Exhausted(e) => {
                return Ok(self.failed(batch, BatchStage::Narrative, &ledger, e));
            }
        };

        let mut last_error = match self
            .convert(batch, &narration, &ledger, self.conversion_policy)
            .await?
        {
            Attempt::Succeeded(()) => return Ok(self.completed(batch, &ledger)),
            Attempt::Exhausted(e) => (BatchStage::Conversion, e),
        };

        for round in 1..=self.recovery_rounds {
            warn!(round, error = %last_error.1, "conversion exhausted, regenerating narration");

            let narration = match self.narrate(batch, &ledger, self.recovery_policy).await? {
                Attempt::Succeeded(narration) => narration,
                Attempt::Exhausted(e) => {
                    last_error = (BatchStage::Narrative, e);
                    continue;
                }
            };

            match self
                .convert(batch, &narration, &ledger, self.recovery_policy)
                .await?
            {
                Attempt::Succeeded(()) => return Ok(self.completed(batch, &ledger)),
                Attempt::Exhausted(e) => last_error = (BatchStage::Conversion, e),
            }
        }

        let (stage, e) = last_error;
        Ok(self.failed(batch, stage, &ledger, e))
    }

    /// Run every batch through a FIFO-drained window.
    ///
    /// Stops admitting batches after the first failure; returns it once the
    /// in-flight batches have drained.
    pub async fn run_window(
        self: &Arc<Self>,
        batches: Vec<Batch>,
        on_batch_done: impl FnMut(&BatchState),
    ) -> Result<Vec<BatchState>> {
        let window = self.window;
        fifo_window(
            batches,
            window,
            |batch| {
                let orchestrator = Arc::clone(self);
                async move { orchestrator.run(&batch).await?.into_result() }
            },
            on_batch_done,
        )
        .await
    }

    async fn narrate(
        &self,
        batch: &Batch,
        ledger: &BatchLedger,
        policy: RetryPolicy,
    ) -> Result<Attempt<String>> {
        let stage = &self.narrative;
        let label = format!("{}/narrative", batch.id);
        policy.run(&label, move || stage.run(batch, ledger)).await
    }

    async fn convert(
        &self,
        batch: &Batch,
        narration: &str,
        ledger: &BatchLedger,
        policy: RetryPolicy,
    ) -> Result<Attempt<()>> {
        let stage = &self.conversion;
        let label = format!("{}/json", batch.id);
        let attempt = policy
            .run(&label, move || stage.run(batch, narration, ledger))
            .await?;
        Ok(match attempt {
            Attempt::Succeeded(_) => Attempt::Succeeded(()),
            Attempt::Exhausted(e) => Attempt::Exhausted(e),
        })
    }

    fn completed(&self, batch: &Batch, ledger: &BatchLedger) -> BatchOutcome {
        let state = ledger.snapshot();
        info!(
            narrative_attempts = state.narrative.attempts,
            json_attempts = state.json.attempts,
            "batch completed"
        );
        BatchOutcome::Completed {
            batch_id: batch.id.clone(),
            state,
        }
    }

    fn failed(
        &self,
        batch: &Batch,
        stage: BatchStage,
        ledger: &BatchLedger,
        error: SlidecastError,
    ) -> BatchOutcome {
        let state = ledger.snapshot();
        error!(
            %stage,
            narrative_attempts = state.narrative.attempts,
            json_attempts = state.json.attempts,
            error = %error,
            "batch failed"
        );
        BatchOutcome::Failed {
            batch_id: batch.id.clone(),
            stage,
            state,
            error,
        }
    }
}
