//! CLI argument parser for standalone mode.
//!
//! Provides a command-line interface for generating, transcribing and
//! captioning without the JSON-RPC daemon.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::DaemonConfig;
use crate::models::Backend;
use crate::types::{keys, practice_prompt, Difficulty, GenerationConfig};

/// Available generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    /// Pretrained models behind the HTTP inference bridge
    Bridge,
    /// Offline deterministic tone generator
    Synthetic,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Bridge => Backend::Bridge,
            BackendArg::Synthetic => Backend::Synthetic,
        }
    }
}

/// Player level for practice prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DifficultyArg {
    Easy,
    Medium,
    Hard,
}

impl From<DifficultyArg> for Difficulty {
    fn from(arg: DifficultyArg) -> Self {
        match arg {
            DifficultyArg::Easy => Difficulty::Easy,
            DifficultyArg::Medium => Difficulty::Medium,
            DifficultyArg::Hard => Difficulty::Hard,
        }
    }
}

/// What the binary was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Daemon,
    ListModels,
    Generate,
    Transcribe(PathBuf),
    Caption(PathBuf),
    ImprovePrompt(String),
    Usage,
}

/// tunecraft: music generation, transcription and image prompts
#[derive(Parser, Debug)]
#[command(name = "tunecraft")]
#[command(about = "Music generation daemon with artifact lifecycle, MIDI transcription and image prompts")]
#[command(version)]
pub struct Cli {
    /// Text prompt describing the audio to generate
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Model identifier (defaults to TUNECRAFT_MODEL or facebook/musicgen-melody-large)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Duration of each output in seconds
    #[arg(short, long, default_value = "10")]
    pub duration: f64,

    /// Number of outputs to generate
    #[arg(short = 'n', long, default_value = "1")]
    pub count: usize,

    /// Reference WAV for melody conditioning or continuation
    #[arg(long)]
    pub melody: Option<PathBuf>,

    /// Random seed for reproducible generation
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Softmax temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Top-k sampling cutoff
    #[arg(long)]
    pub top_k: Option<u32>,

    /// Nucleus sampling cutoff (0 disables it)
    #[arg(long)]
    pub top_p: Option<f64>,

    /// Classifier-free guidance coefficient
    #[arg(long)]
    pub cfg_coef: Option<f64>,

    /// Build a piano practice prompt for this level instead of --prompt
    #[arg(long, value_enum)]
    pub practice: Option<DifficultyArg>,

    /// Style used with --practice
    #[arg(long, default_value = "Classical Music")]
    pub style: String,

    /// Render a waveform SVG next to every output
    #[arg(long)]
    pub render: bool,

    /// Generation backend (overrides TUNECRAFT_BACKEND)
    #[arg(short, long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Directory for temporary artifacts (overrides TUNECRAFT_ARTIFACT_DIR)
    #[arg(long)]
    pub artifact_dir: Option<PathBuf>,

    /// Transcribe a WAV file to MIDI
    #[arg(long, value_name = "WAV")]
    pub transcribe: Option<PathBuf>,

    /// Caption an image into a prompt
    #[arg(long, value_name = "IMAGE")]
    pub caption: Option<PathBuf>,

    /// Rewrite a prompt with the captioning model
    #[arg(long, value_name = "TEXT")]
    pub improve: Option<String>,

    /// List known model identifiers
    #[arg(long)]
    pub list_models: bool,

    /// Run in daemon mode (JSON-RPC over stdio)
    #[arg(long)]
    pub daemon: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Returns true if running in daemon mode.
    pub fn is_daemon_mode(&self) -> bool {
        self.daemon
    }

    /// Picks the mode; daemon wins, then the single-shot actions, then generation.
    pub fn mode(&self) -> Mode {
        if self.daemon {
            Mode::Daemon
        } else if self.list_models {
            Mode::ListModels
        } else if let Some(ref path) = self.transcribe {
            Mode::Transcribe(path.clone())
        } else if let Some(ref path) = self.caption {
            Mode::Caption(path.clone())
        } else if let Some(ref text) = self.improve {
            Mode::ImprovePrompt(text.clone())
        } else if self.prompt.is_some() || self.practice.is_some() || self.melody.is_some() {
            Mode::Generate
        } else {
            Mode::Usage
        }
    }

    /// Returns the text prompt, building a practice prompt if requested.
    pub fn prompt_text(&self) -> Option<String> {
        match self.practice {
            Some(level) => Some(practice_prompt(level.into(), &self.style)),
            None => self.prompt.clone(),
        }
    }

    /// Returns the model to use.
    pub fn model_id(&self, config: &DaemonConfig) -> String {
        self.model.clone().unwrap_or_else(|| config.default_model.clone())
    }

    /// Collects the generation parameters given on the command line.
    pub fn generation_config(&self) -> GenerationConfig {
        let mut config = GenerationConfig::new().with(keys::DURATION, self.duration);
        if let Some(seed) = self.seed {
            config.set(keys::SEED, seed as f64);
        }
        if let Some(t) = self.temperature {
            config.set(keys::TEMPERATURE, t);
        }
        if let Some(k) = self.top_k {
            config.set(keys::TOP_K, k);
        }
        if let Some(p) = self.top_p {
            config.set(keys::TOP_P, p);
        }
        if let Some(c) = self.cfg_coef {
            config.set(keys::CFG_COEF, c);
        }
        config
    }

    /// Applies command-line overrides on top of the environment configuration.
    pub fn apply_to(&self, config: &mut DaemonConfig) {
        if let Some(backend) = self.backend {
            config.backend = backend.into();
        }
        if let Some(ref dir) = self.artifact_dir {
            config.artifact_dir = Some(dir.clone());
        }
        if self.render {
            config.render_waveforms = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tunecraft").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn mode_detection() {
        assert_eq!(parse(&["--daemon"]).mode(), Mode::Daemon);
        assert_eq!(parse(&["--list-models"]).mode(), Mode::ListModels);
        assert_eq!(parse(&["-p", "lofi beats"]).mode(), Mode::Generate);
        assert_eq!(
            parse(&["--transcribe", "a.wav"]).mode(),
            Mode::Transcribe(PathBuf::from("a.wav"))
        );
        assert_eq!(
            parse(&["--caption", "cover.png"]).mode(),
            Mode::Caption(PathBuf::from("cover.png"))
        );
        assert_eq!(
            parse(&["--improve", "rock song"]).mode(),
            Mode::ImprovePrompt("rock song".to_string())
        );
        assert_eq!(parse(&[]).mode(), Mode::Usage);
    }

    #[test]
    fn daemon_wins_over_prompt() {
        let cli = parse(&["--daemon", "-p", "x"]);
        assert!(cli.is_daemon_mode());
        assert_eq!(cli.mode(), Mode::Daemon);
    }

    #[test]
    fn practice_prompt_replaces_text() {
        let cli = parse(&["--practice", "medium", "--style", "Jazz"]);
        assert_eq!(cli.mode(), Mode::Generate);
        assert_eq!(
            cli.prompt_text().unwrap(),
            "piano only music for a player who has 2-3 years experience to practice with the touch of Jazz"
        );
    }

    #[test]
    fn generation_config_from_flags() {
        let cli = parse(&["-p", "x", "-d", "5", "--seed", "7", "--top-k", "250", "--temperature", "0.8"]);
        let config = cli.generation_config();
        assert_eq!(config.duration(), Some(5.0));
        assert_eq!(config.number(keys::SEED), Some(7.0));
        assert_eq!(config.number(keys::TOP_K), Some(250.0));
        assert_eq!(config.number(keys::TEMPERATURE), Some(0.8));
        assert!(!config.contains(keys::TOP_P));
    }

    #[test]
    fn overrides_apply_to_config() {
        let cli = parse(&["-p", "x", "-b", "synthetic", "--render", "--artifact-dir", "/tmp/a"]);
        let mut config = DaemonConfig::default();
        cli.apply_to(&mut config);
        assert_eq!(config.backend, Backend::Synthetic);
        assert!(config.render_waveforms);
        assert_eq!(config.artifact_dir, Some(PathBuf::from("/tmp/a")));
        assert_eq!(cli.model_id(&config), config.default_model);
    }
}
