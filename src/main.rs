//! tunecraft: music generation daemon.
//!
//! This binary can run in two ways:
//! - CLI mode: one-shot generation, transcription, captioning or model listing
//! - Daemon mode: JSON-RPC server over stdio

use std::path::Path;
use std::sync::Arc;

use tunecraft::audio::read_wav;
use tunecraft::cache::ArtifactStore;
use tunecraft::captioning::{CaptionMode, Captioner, HostedCaptioner};
use tunecraft::cli::{Cli, Mode};
use tunecraft::config::DaemonConfig;
use tunecraft::error::{DaemonError, Result};
use tunecraft::generation::{
    CancellationToken, GenerationDispatcher, GenerationRequest, ProgressMonitor,
};
use tunecraft::models::{catalog, ModelCache, ModelCategory, ModelRegistry};
use tunecraft::rpc::{run_server, ServerState};
use tunecraft::transcription::{BasicPitchCommand, TranscriptionAdapter};
use tunecraft::types::Prompt;

fn main() {
    // stdout carries JSON-RPC, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tunecraft=info")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let mut config = DaemonConfig::from_env();
    cli.apply_to(&mut config);
    if let Some(problem) = config.validate() {
        return Err(DaemonError::invalid_configuration(problem));
    }

    match cli.mode() {
        Mode::Daemon => run_daemon_mode(config),
        Mode::ListModels => {
            print_models(&config);
            Ok(())
        }
        Mode::Generate => run_generate_cli(&cli, &config),
        Mode::Transcribe(path) => run_transcribe_cli(&path, &config),
        Mode::Caption(path) => run_caption_cli(&cli, &path, &config),
        Mode::ImprovePrompt(text) => {
            let prompt = HostedCaptioner::from_config(&config.captioning)?.improve_prompt(&text)?;
            println!("{}", prompt);
            Ok(())
        }
        Mode::Usage => {
            print_usage();
            Ok(())
        }
    }
}

fn artifact_store(config: &DaemonConfig) -> Arc<ArtifactStore> {
    Arc::new(ArtifactStore::new(
        config.effective_artifact_dir(),
        config.artifact_lifetime(),
    ))
}

/// Runs one generation request in CLI mode.
fn run_generate_cli(cli: &Cli, config: &DaemonConfig) -> Result<()> {
    let model_id = cli.model_id(config);
    let prompt_text = cli.prompt_text();

    eprintln!("=== tunecraft CLI ===");
    eprintln!("Model: {}", model_id);
    eprintln!("Backend: {}", config.backend);
    if let Some(ref text) = prompt_text {
        eprintln!("Prompt: \"{}\"", text);
    }
    eprintln!("Duration: {}s x {}", cli.duration, cli.count);
    if let Some(ref melody) = cli.melody {
        eprintln!("Melody: {}", melody.display());
    }
    eprintln!("Artifacts: {}", config.effective_artifact_dir().display());
    eprintln!();

    let audio = match cli.melody {
        Some(ref path) => Some(read_wav(path)?),
        None => None,
    };

    let loader = config.backend.loader(&config.bridge_url, config.bridge_timeout())?;
    let dispatcher = GenerationDispatcher::new(
        ModelRegistry::new(),
        ModelCache::new(loader),
        artifact_store(config),
        config.dispatcher_options(),
    );
    dispatcher.check_output_count(cli.count)?;

    let request = GenerationRequest::replicated(
        model_id,
        cli.generation_config(),
        Prompt {
            text: prompt_text,
            audio,
        },
        cli.count,
    )
    .with_rendering(config.render_waveforms);

    let mut last_reported = 0usize;
    let mut report = |step: usize, total: usize| {
        if step == total || step >= last_reported + 25 {
            last_reported = step;
            eprintln!("Progress: {}/{} steps", step, total);
        }
    };
    let token = CancellationToken::new();
    let result = dispatcher
        .generate_batch(&request, &mut ProgressMonitor::new(&token, &mut report))?
        .into_result()?;

    eprintln!();
    eprintln!("Generation complete!");
    eprintln!("  Strategy: {}", result.strategy);
    eprintln!("  Time: {:.2}s", result.generation_time_sec);
    eprintln!("  Sample rate: {} Hz", result.sample_rate);
    eprintln!();
    for artifact in &result.artifacts {
        println!("{}", artifact.path.display());
        if let Some(ref svg) = artifact.visualization {
            println!("{}", svg.display());
        }
    }
    eprintln!();
    eprintln!(
        "Files are removed after {}s by the next sweep.",
        config.artifact_lifetime_secs
    );

    Ok(())
}

/// Transcribes one file in CLI mode.
fn run_transcribe_cli(path: &Path, config: &DaemonConfig) -> Result<()> {
    let adapter = TranscriptionAdapter::new(
        Arc::new(BasicPitchCommand::new(config.transcriber_command.clone())),
        artifact_store(config),
    );
    let artifact = adapter.transcribe(path)?;
    eprintln!("{} ({} notes)", artifact.label(), artifact.note_count);
    println!("{}", artifact.path.display());
    Ok(())
}

/// Captions an image in CLI mode.
fn run_caption_cli(cli: &Cli, path: &Path, config: &DaemonConfig) -> Result<()> {
    let image = std::fs::read(path)
        .map_err(|e| DaemonError::artifact_io(format!("Failed to read {}", path.display()), e))?;
    let mode = CaptionMode::for_model(&cli.model_id(config));

    let caption = HostedCaptioner::from_config(&config.captioning)?.caption(&image, mode)?;
    eprintln!("Description: {}", caption.description);
    println!("{}", caption.prompt);
    Ok(())
}

/// Prints the model catalogue grouped by category.
fn print_models(config: &DaemonConfig) {
    let registry = ModelRegistry::new();
    for category in ModelCategory::ALL {
        println!("{}:", category);
        for card in catalog::cards_in(category) {
            let supported = registry
                .resolve(card.id)
                .map(|r| r.family.is_supported())
                .unwrap_or(false);
            let marker = if card.id == config.default_model {
                "*"
            } else if !supported {
                "-"
            } else {
                " "
            };
            println!("  {} {:<42} {}", marker, card.id, card.description);
        }
    }
    println!();
    println!("* default model, - not supported by any backend");
}

/// Runs the daemon mode (JSON-RPC server).
fn run_daemon_mode(config: DaemonConfig) -> Result<()> {
    tracing::info!(
        backend = %config.backend,
        default_model = %config.default_model,
        artifacts = %config.effective_artifact_dir().display(),
        "Starting tunecraft daemon"
    );

    let state = ServerState::new(config)?;
    run_server(state)
}

/// Prints usage information.
fn print_usage() {
    eprintln!("tunecraft: music generation, transcription and image prompts");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  Generate:");
    eprintln!("    tunecraft --model facebook/musicgen-small --prompt \"lofi hip hop beats\" --duration 10 -n 2");
    eprintln!();
    eprintln!("  Melody conditioning:");
    eprintln!("    tunecraft --model facebook/musicgen-melody --prompt \"jazz trio\" --melody hum.wav");
    eprintln!();
    eprintln!("  Offline (no inference bridge):");
    eprintln!("    tunecraft --backend synthetic --prompt \"test tone\" --duration 2");
    eprintln!();
    eprintln!("  Transcribe / caption / list models:");
    eprintln!("    tunecraft --transcribe out.wav");
    eprintln!("    tunecraft --caption cover.jpg");
    eprintln!("    tunecraft --list-models");
    eprintln!();
    eprintln!("  Daemon mode (JSON-RPC server):");
    eprintln!("    tunecraft --daemon");
    eprintln!();
    eprintln!("Run 'tunecraft --help' for full options.");
}
