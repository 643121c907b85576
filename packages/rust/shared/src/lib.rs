//! Shared types, error model, and configuration for Slidecast.
//!
//! This crate is the foundation depended on by all other Slidecast crates.
//! It provides:
//! - [`SlidecastError`]: the unified error type
//! - Domain types ([`Presentation`], [`Batch`], [`Script`], [`BatchState`], audio units)
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ElevenLabsConfig, OpenRouterConfig, PipelineConfig, PipelineSection,
    StorageConfig, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from, read_api_key,
};
pub use error::{Result, SlidecastError};
pub use types::{
    AudioSegment, AudioUnit, Batch, BatchState, JsonState, NarrativeState, Presentation,
    PresentationId, Script, SlideRecord, SourceDocument, SourceSlide, StageStatus,
    ValidationStatus,
};
