//! Application configuration for Slidecast.
//!
//! User config lives at `~/.slidecast/slidecast.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlidecastError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "slidecast.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".slidecast";

// ---------------------------------------------------------------------------
// Config structs (matching slidecast.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Blob store location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// OpenRouter (text generation) settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// ElevenLabs (speech synthesis) settings.
    #[serde(default)]
    pub elevenlabs: ElevenLabsConfig,

    /// Batching, concurrency and retry policy.
    #[serde(default)]
    pub pipeline: PipelineSection,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// libSQL database file backing the blob store.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.slidecast/blobs.db".into()
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_openrouter_key_env")]
    pub api_key_env: String,

    /// Model used for narration and JSON conversion.
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL.
    #[serde(default = "default_openrouter_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openrouter_key_env(),
            model: default_model(),
            base_url: default_openrouter_url(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_openrouter_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "openai/gpt-4o".into()
}
fn default_openrouter_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_generation_timeout() -> u64 {
    120
}

/// `[elevenlabs]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevenLabsConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_elevenlabs_key_env")]
    pub api_key_env: String,

    /// Voice used when the CLI does not override it.
    #[serde(default = "default_voice_id")]
    pub voice_id: String,

    /// Synthesis model.
    #[serde(default = "default_tts_model")]
    pub model_id: String,

    /// API base URL.
    #[serde(default = "default_elevenlabs_url")]
    pub base_url: String,

    /// PCM sample rate requested from the service and written to WAV.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Per-request timeout.
    #[serde(default = "default_synthesis_timeout")]
    pub timeout_secs: u64,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_elevenlabs_key_env(),
            voice_id: default_voice_id(),
            model_id: default_tts_model(),
            base_url: default_elevenlabs_url(),
            sample_rate: default_sample_rate(),
            timeout_secs: default_synthesis_timeout(),
        }
    }
}

fn default_elevenlabs_key_env() -> String {
    "ELEVEN_LABS_API_KEY".into()
}
fn default_voice_id() -> String {
    "21m00Tcm4TlvDq8ikWAM".into()
}
fn default_tts_model() -> String {
    "eleven_multilingual_v2".into()
}
fn default_elevenlabs_url() -> String {
    "https://api.elevenlabs.io".into()
}
fn default_sample_rate() -> u32 {
    24_000
}
fn default_synthesis_timeout() -> u64 {
    60
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Slides per generation batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum batches in flight.
    #[serde(default = "default_concurrency")]
    pub batch_concurrency: usize,

    /// Audio units dispatched together before the group barrier.
    #[serde(default = "default_concurrency")]
    pub audio_group_size: usize,

    /// Narrative attempts before a batch fails outright.
    #[serde(default = "default_two")]
    pub narrative_attempts: u32,

    /// Conversion attempts against the same narration.
    #[serde(default = "default_two")]
    pub conversion_attempts: u32,

    /// Combined regenerate-then-convert rounds after conversion is exhausted.
    #[serde(default = "default_two")]
    pub recovery_rounds: u32,

    /// Attempts per audio unit.
    #[serde(default = "default_one")]
    pub synthesis_attempts: u32,

    /// Pause between retries of the same stage.
    #[serde(default = "default_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_concurrency: default_concurrency(),
            audio_group_size: default_concurrency(),
            narrative_attempts: default_two(),
            conversion_attempts: default_two(),
            recovery_rounds: default_two(),
            synthesis_attempts: default_one(),
            retry_backoff_ms: default_backoff(),
        }
    }
}

fn default_batch_size() -> usize {
    3
}
fn default_concurrency() -> usize {
    5
}
fn default_two() -> u32 {
    2
}
fn default_one() -> u32 {
    1
}
fn default_backoff() -> u64 {
    1_000
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub batch_concurrency: usize,
    pub audio_group_size: usize,
    pub narrative_attempts: u32,
    pub conversion_attempts: u32,
    pub recovery_rounds: u32,
    pub synthesis_attempts: u32,
    pub retry_backoff: Duration,
    /// Voice for every synthesis request in a run.
    pub voice_id: String,
    /// PCM sample rate of segments and the combined track.
    pub sample_rate: u32,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let p = &config.pipeline;
        Self {
            batch_size: p.batch_size.max(1),
            batch_concurrency: p.batch_concurrency.max(1),
            audio_group_size: p.audio_group_size.max(1),
            narrative_attempts: p.narrative_attempts,
            conversion_attempts: p.conversion_attempts,
            recovery_rounds: p.recovery_rounds,
            synthesis_attempts: p.synthesis_attempts,
            retry_backoff: Duration::from_millis(p.retry_backoff_ms),
            voice_id: config.elevenlabs.voice_id.clone(),
            sample_rate: config.elevenlabs.sample_rate,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.slidecast/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SlidecastError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.slidecast/slidecast.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SlidecastError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SlidecastError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SlidecastError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SlidecastError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SlidecastError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| SlidecastError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Read a provider API key from the env var named in config.
pub fn read_api_key(var_name: &str, provider: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(SlidecastError::config(format!(
            "{provider} API key not found. Set the {var_name} environment variable."
        ))),
    }
}
