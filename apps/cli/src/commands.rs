//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use slidecast_core::{
    PipelineContext, PipelineOutcome, ProgressReporter, StageSelection, import_document,
    run_presentation,
};
use slidecast_providers::{
    ElevenLabsClient, ElevenLabsOptions, GenerationRequest, OpenRouterClient, OpenRouterOptions,
    SpeechRequest, SpeechSynthesisClient, TextGenerationClient,
};
use slidecast_shared::{
    AppConfig, BatchState, PipelineConfig, PresentationId, Script, SlidecastError,
    SourceDocument, expand_home, init_config, load_config, read_api_key,
};
use slidecast_storage::{BlobStore, PresentationLayout, Storage};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Slidecast: narrated audio for slide decks.
#[derive(Parser)]
#[command(
    name = "slidecast",
    version,
    about = "Generate a narration script and a narrated audio track for a slide deck.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Store the extracted slide text of a presentation.
    Import {
        /// Presentation id (generated when omitted).
        #[arg(short, long)]
        presentation: Option<String>,

        /// JSON file: `{"slides": [{"content": ...}]}` or an array of strings.
        #[arg(short, long)]
        slides: PathBuf,

        /// Presentation title.
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Generate and publish the narration script.
    Script {
        #[arg(short, long)]
        presentation: String,

        /// Regenerate even if script.json exists.
        #[arg(long)]
        force: bool,
    },

    /// Synthesize the combined audio track from a published script.
    Audio {
        #[arg(short, long)]
        presentation: String,

        /// Override the configured voice.
        #[arg(long)]
        voice: Option<String>,

        /// Resynthesize even if the combined track matches the current script.
        #[arg(long)]
        force: bool,
    },

    /// Run the script and audio stages back to back.
    Run {
        #[arg(short, long)]
        presentation: String,

        /// Override the configured voice.
        #[arg(long)]
        voice: Option<String>,

        /// Regenerate artifacts that already exist.
        #[arg(long)]
        force: bool,
    },

    /// Show stored artifacts and batch progress for a presentation.
    Show {
        #[arg(short, long)]
        presentation: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "slidecast=info",
        1 => "slidecast=debug",
        _ => "slidecast=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Import {
            presentation,
            slides,
            title,
        } => cmd_import(presentation.as_deref(), &slides, title).await,
        Command::Script {
            presentation,
            force,
        } => cmd_pipeline(&presentation, StageSelection::ScriptOnly, None, force).await,
        Command::Audio {
            presentation,
            voice,
            force,
        } => cmd_pipeline(&presentation, StageSelection::AudioOnly, voice, force).await,
        Command::Run {
            presentation,
            voice,
            force,
        } => cmd_pipeline(&presentation, StageSelection::All, voice, force).await,
        Command::Show { presentation } => cmd_show(&presentation).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

/// Accepted shapes of the `import --slides` file.
#[derive(Deserialize)]
#[serde(untagged)]
enum SlidesFile {
    Document(SourceDocument),
    Texts(Vec<String>),
}

async fn cmd_import(presentation: Option<&str>, slides: &Path, title: Option<String>) -> Result<()> {
    let config = load_config()?;

    let raw = std::fs::read(slides).map_err(|e| SlidecastError::io(slides, e))?;
    let parsed: SlidesFile = serde_json::from_slice(&raw)
        .map_err(|e| eyre!("{} is neither a slide document nor a list of strings: {e}", slides.display()))?;

    let mut document = match parsed {
        SlidesFile::Document(doc) => doc,
        SlidesFile::Texts(texts) => SourceDocument::from_texts(None, texts),
    };
    if title.is_some() {
        document.title = title;
    }

    let id = match presentation {
        Some(id) => id.parse::<PresentationId>()?,
        None => PresentationId::generate(),
    };

    let storage = open_storage(&config).await?;
    let key = import_document(&storage, &id, &document).await?;

    println!();
    println!("  Presentation imported");
    println!("  ID:     {id}");
    println!("  Slides: {}", document.slides.len());
    println!("  Key:    {key}");
    println!();

    Ok(())
}

async fn cmd_pipeline(
    presentation: &str,
    stages: StageSelection,
    voice: Option<String>,
    force: bool,
) -> Result<()> {
    let config = load_config()?;
    let id: PresentationId = presentation.parse()?;

    // Validate the keys this run needs before touching storage.
    let text: Arc<dyn TextGenerationClient> = match stages {
        StageSelection::AudioOnly => Arc::new(Unused("text generation")),
        _ => Arc::new(openrouter_client(&config)?),
    };
    let speech: Arc<dyn SpeechSynthesisClient> = match stages {
        StageSelection::ScriptOnly => Arc::new(Unused("speech synthesis")),
        _ => Arc::new(elevenlabs_client(&config)?),
    };

    let mut pipeline = PipelineConfig::from(&config);
    if let Some(voice) = voice {
        pipeline.voice_id = voice;
    }

    let ctx = PipelineContext {
        store: Arc::new(open_storage(&config).await?),
        text,
        speech,
        config: pipeline,
    };

    info!(presentation = %id, ?stages, force, "starting pipeline");
    let reporter = CliProgress::new();
    let outcome = run_presentation(&ctx, &id, stages, force, &reporter).await;
    reporter.finish();

    match outcome {
        PipelineOutcome::Succeeded {
            script_key,
            audio_key,
        } => {
            println!();
            println!("  Presentation {id} done");
            if let Some(key) = script_key {
                println!("  Script: {key}");
            }
            if let Some(key) = audio_key {
                println!("  Audio:  {key}");
            }
            println!();
            Ok(())
        }
        PipelineOutcome::Failed { stage, error } => {
            Err(eyre!("{stage} stage failed for {id}: {error}"))
        }
    }
}

async fn cmd_show(presentation: &str) -> Result<()> {
    let config = load_config()?;
    let id: PresentationId = presentation.parse()?;
    let path = expand_home(&config.storage.db_path)?;
    let storage = Storage::open_readonly(&path).await?;
    let layout = PresentationLayout::new(&id);

    let entries = storage.list(&format!("{}/", layout.root())).await?;
    if entries.is_empty() {
        println!("No artifacts stored for {id}.");
        return Ok(());
    }

    println!();
    println!("  Artifacts for {id}");
    for (key, size) in &entries {
        let relative = key.strip_prefix(layout.root()).unwrap_or(key);
        println!("  {size:>10}  {relative}");
    }

    let batches: Vec<&String> = entries
        .iter()
        .map(|(key, _)| key)
        .filter(|key| key.ends_with(".metadata.json"))
        .collect();
    if !batches.is_empty() {
        println!();
        println!("  Batches");
        for key in batches {
            let state: BatchState = serde_json::from_slice(&storage.get(key).await?)?;
            let name = key
                .rsplit('/')
                .next()
                .and_then(|file| file.strip_suffix(".txt.metadata.json"))
                .unwrap_or(key);
            println!(
                "  {name}  narrative {:?} ({} attempts)  json {:?}/{:?} ({} attempts)",
                state.narrative.state,
                state.narrative.attempts,
                state.json.state,
                state.json.validation,
                state.json.attempts,
            );
        }
    }

    if storage.exists(&layout.script()).await? {
        let script: Script = serde_json::from_slice(&storage.get(&layout.script()).await?)?;
        let skipped = script.slides.iter().filter(|s| s.is_skipped()).count();
        println!();
        println!(
            "  Script: {} slides ({} narrated, {skipped} skipped)",
            script.slides.len(),
            script.slides.len() - skipped
        );
    }
    println!();

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Wiring helpers
// ---------------------------------------------------------------------------

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let path = expand_home(&config.storage.db_path)?;
    Ok(Storage::open(&path).await?)
}

fn openrouter_client(config: &AppConfig) -> Result<OpenRouterClient> {
    let c = &config.openrouter;
    Ok(OpenRouterClient::new(OpenRouterOptions {
        base_url: c.base_url.clone(),
        api_key: read_api_key(&c.api_key_env, "OpenRouter")?,
        model: c.model.clone(),
        timeout_secs: c.timeout_secs,
    })?)
}

fn elevenlabs_client(config: &AppConfig) -> Result<ElevenLabsClient> {
    let c = &config.elevenlabs;
    Ok(ElevenLabsClient::new(ElevenLabsOptions {
        base_url: c.base_url.clone(),
        api_key: read_api_key(&c.api_key_env, "ElevenLabs")?,
        model_id: c.model_id.clone(),
        sample_rate: c.sample_rate,
        timeout_secs: c.timeout_secs,
    })?)
}

/// Stand-in for a client the selected stages never call.
struct Unused(&'static str);

#[async_trait]
impl TextGenerationClient for Unused {
    async fn generate(&self, _request: &GenerationRequest) -> slidecast_shared::Result<String> {
        Err(SlidecastError::config(format!("{} is not configured for this command", self.0)))
    }
}

#[async_trait]
impl SpeechSynthesisClient for Unused {
    async fn synthesize(&self, _request: &SpeechRequest) -> slidecast_shared::Result<Vec<u8>> {
        Err(SlidecastError::config(format!("{} is not configured for this command", self.0)))
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn batch_done(&self, done: usize, total: usize) {
        self.spinner
            .set_message(format!("Generating narration [{done}/{total} batches]"));
    }

    fn audio_group_done(&self, done: usize, total: usize) {
        self.spinner
            .set_message(format!("Synthesizing speech [{done}/{total} paragraphs]"));
    }
}
