//! End-to-end presentation pipeline: slides → script → combined track.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use slidecast_providers::{SpeechSynthesisClient, TextGenerationClient};
use slidecast_shared::{
    PipelineConfig, Presentation, PresentationId, Result, Script, SlidecastError, SourceDocument,
};
use sha2::{Digest, Sha256};
use slidecast_storage::{BlobStore, PresentationLayout};
use tracing::{error, info, instrument};

use crate::aggregator::aggregate_script;
use crate::audio_assembler::AudioAssembler;
use crate::batching::plan_batches;
use crate::orchestrator::BatchOrchestrator;
use crate::synthesizer::{AudioSynthesizer, audio_units};

/// Injected dependencies for one pipeline run.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn BlobStore>,
    pub text: Arc<dyn TextGenerationClient>,
    pub speech: Arc<dyn SpeechSynthesisClient>,
    pub config: PipelineConfig,
}

/// The two externally visible stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Script,
    Audio,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Script => "script",
            Self::Audio => "audio",
        })
    }
}

/// Which stages [`run_presentation`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSelection {
    ScriptOnly,
    AudioOnly,
    All,
}

impl StageSelection {
    pub fn includes(self, stage: PipelineStage) -> bool {
        match (self, stage) {
            (Self::All, _) => true,
            (Self::ScriptOnly, PipelineStage::Script) => true,
            (Self::AudioOnly, PipelineStage::Audio) => true,
            _ => false,
        }
    }
}

/// Result of [`run_presentation`]. Keys are set for the stages that ran.
#[derive(Debug)]
pub enum PipelineOutcome {
    Succeeded {
        script_key: Option<String>,
        audio_key: Option<String>,
    },
    Failed {
        stage: PipelineStage,
        error: SlidecastError,
    },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called each time the batch window drains past a completed batch.
    fn batch_done(&self, done: usize, total: usize);
    /// Called after each audio group resolves.
    fn audio_group_done(&self, done: usize, total: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn batch_done(&self, _done: usize, _total: usize) {}
    fn audio_group_done(&self, _done: usize, _total: usize) {}
}

/// Store the extracted-text document a presentation is generated from.
pub async fn import_document(
    store: &dyn BlobStore,
    id: &PresentationId,
    document: &SourceDocument,
) -> Result<String> {
    if document.slides.is_empty() {
        return Err(SlidecastError::validation("document has no slides"));
    }
    let key = PresentationLayout::new(id).content();
    let bytes = serde_json::to_vec_pretty(document)
        .map_err(|e| SlidecastError::Storage(format!("serialize document: {e}")))?;
    store.put(&key, &bytes).await?;
    info!(%id, slides = document.slides.len(), "document imported");
    Ok(key)
}

/// Load a presentation's slides from `content.json`.
pub async fn load_presentation(store: &dyn BlobStore, id: &PresentationId) -> Result<Presentation> {
    let bytes = store.get(&PresentationLayout::new(id).content()).await?;
    Presentation::from_document_bytes(id.clone(), &bytes)
}

/// Read a published `script.json`.
pub async fn load_script(store: &dyn BlobStore, id: &PresentationId) -> Result<Script> {
    let key = PresentationLayout::new(id).script();
    let bytes = store.get(&key).await?;
    parse_script(&key, &bytes)
}

fn parse_script(key: &str, bytes: &[u8]) -> Result<Script> {
    serde_json::from_slice(bytes)
        .map_err(|e| SlidecastError::validation(format!("{key} does not parse: {e}")))
}

/// Hex SHA-256 of the script a track is assembled from.
fn script_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Whether the stored track was assembled from the script with `digest`.
/// A track without a readable record never matches.
async fn track_matches(
    store: &dyn BlobStore,
    layout: &PresentationLayout,
    digest: &str,
) -> Result<bool> {
    if !store.exists(&layout.combined_audio()).await? {
        return Ok(false);
    }
    let bytes = match store.get(&layout.combined_audio_metadata()).await {
        Ok(bytes) => bytes,
        Err(SlidecastError::MissingArtifact { .. }) => return Ok(false),
        Err(e) => return Err(e),
    };
    let recorded = serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|meta| meta.get("script_sha256")?.as_str().map(str::to_owned));
    Ok(recorded.as_deref() == Some(digest))
}

/// Text stage: narrate every batch and publish `script.json`.
///
/// An existing script is returned as-is unless `force` is set.
#[instrument(skip_all, fields(presentation = %id))]
pub async fn generate_script(
    ctx: &PipelineContext,
    id: &PresentationId,
    force: bool,
    progress: &dyn ProgressReporter,
) -> Result<Script> {
    let start = Instant::now();
    let layout = PresentationLayout::new(id);

    if !force && ctx.store.exists(&layout.script()).await? {
        info!("script.json already published, reusing it");
        return load_script(ctx.store.as_ref(), id).await;
    }

    // --- Phase 1: Plan ---
    progress.phase("Loading slides");
    let presentation = load_presentation(ctx.store.as_ref(), id).await?;
    if presentation.is_empty() {
        return Err(SlidecastError::validation(format!("{id} has no slides")));
    }
    let batches = plan_batches(&presentation.slides, ctx.config.batch_size);
    info!(slides = presentation.len(), batches = batches.len(), "batches planned");

    // --- Phase 2: Narrate + convert ---
    progress.phase("Generating narration");
    let orchestrator = Arc::new(BatchOrchestrator::new(
        ctx.text.clone(),
        ctx.store.clone(),
        layout.clone(),
        &ctx.config,
    ));
    let total = batches.len();
    let mut done = 0;
    orchestrator
        .run_window(batches.clone(), |_| {
            done += 1;
            progress.batch_done(done, total);
        })
        .await?;

    // --- Phase 3: Aggregate ---
    progress.phase("Publishing script");
    let script =
        aggregate_script(ctx.store.as_ref(), &layout, &batches, presentation.len()).await?;

    info!(elapsed_ms = start.elapsed().as_millis() as u64, "script stage complete");
    Ok(script)
}

/// Audio stage: synthesize the published script and write the combined track.
///
/// Needs `script.json`; its absence is a fatal [`SlidecastError::MissingArtifact`].
/// An existing track is kept only when it was assembled from the current
/// script and `force` is not set. Returns the track's key.
#[instrument(skip_all, fields(presentation = %id))]
pub async fn generate_audio(
    ctx: &PipelineContext,
    id: &PresentationId,
    force: bool,
    progress: &dyn ProgressReporter,
) -> Result<String> {
    let start = Instant::now();
    let layout = PresentationLayout::new(id);

    // --- Phase 1: Units ---
    progress.phase("Reading script");
    let script_key = layout.script();
    let script_bytes = ctx.store.get(&script_key).await?;
    let digest = script_digest(&script_bytes);
    if !force && track_matches(ctx.store.as_ref(), &layout, &digest).await? {
        info!("combined track matches the current script, reusing it");
        return Ok(layout.combined_audio());
    }
    let script = parse_script(&script_key, &script_bytes)?;
    let units = audio_units(&script);
    if units.is_empty() {
        return Err(SlidecastError::validation(format!(
            "every slide of {id} is marked should_skip"
        )));
    }
    info!(
        units = units.len(),
        skipped = script.slides.len() - units.len(),
        "audio units prepared"
    );

    // --- Phase 2: Synthesize ---
    progress.phase("Synthesizing speech");
    let total = units.len();
    let segments = AudioSynthesizer::new(ctx.speech.clone(), &ctx.config)
        .synthesize(units, |done| progress.audio_group_done(done, total))
        .await?;

    // --- Phase 3: Assemble ---
    progress.phase("Assembling track");
    let key = AudioAssembler::new(ctx.store.as_ref(), &layout, ctx.config.sample_rate)
        .assemble(segments)
        .await?;
    let record = serde_json::json!({ "script_sha256": digest });
    let record = serde_json::to_vec_pretty(&record)
        .map_err(|e| SlidecastError::Storage(format!("serialize track record: {e}")))?;
    ctx.store.put(&layout.combined_audio_metadata(), &record).await?;

    info!(elapsed_ms = start.elapsed().as_millis() as u64, "audio stage complete");
    Ok(key)
}

/// Run the selected stages. Never returns an error: failures come back as
/// [`PipelineOutcome::Failed`] after being logged.
#[instrument(skip_all, fields(presentation = %id, stages = ?stages))]
pub async fn run_presentation(
    ctx: &PipelineContext,
    id: &PresentationId,
    stages: StageSelection,
    force: bool,
    progress: &dyn ProgressReporter,
) -> PipelineOutcome {
    let layout = PresentationLayout::new(id);

    let script_key = if stages.includes(PipelineStage::Script) {
        if let Err(e) = generate_script(ctx, id, force, progress).await {
            return failed(id, PipelineStage::Script, e);
        }
        Some(layout.script())
    } else {
        None
    };

    let audio_key = if stages.includes(PipelineStage::Audio) {
        match generate_audio(ctx, id, force, progress).await {
            Ok(key) => Some(key),
            Err(e) => return failed(id, PipelineStage::Audio, e),
        }
    } else {
        None
    };

    PipelineOutcome::Succeeded {
        script_key,
        audio_key,
    }
}

fn failed(id: &PresentationId, stage: PipelineStage, error: SlidecastError) -> PipelineOutcome {
    error!(presentation = %id, %stage, error = %error, "pipeline failed");
    PipelineOutcome::Failed { stage, error }
}
