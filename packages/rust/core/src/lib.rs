//! Core pipeline orchestration and domain logic for Slidecast.
//!
//! This crate turns a presentation's slide texts into a validated narration
//! script and a single narrated audio track:
//! batching → narrative/conversion per batch (retried, windowed) →
//! aggregation → grouped synthesis → ordered assembly.

pub mod aggregator;
pub mod audio_assembler;
pub mod batching;
pub mod conversion;
pub mod ledger;
pub mod limiter;
pub mod narrative;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod synthesizer;

#[cfg(test)]
mod testing;

pub use orchestrator::{BatchOrchestrator, BatchOutcome, BatchStage};
pub use pipeline::{
    PipelineContext, PipelineOutcome, PipelineStage, ProgressReporter, SilentProgress,
    StageSelection, generate_audio, generate_script, import_document, load_presentation,
    load_script, run_presentation,
};
pub use retry::{Attempt, RetryPolicy};
