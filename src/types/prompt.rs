//! Prompt types for generation requests.
//!
//! A prompt is constructed per request and never persisted. It may carry
//! free text, an audio waveform (melody or continuation prefix), both, or
//! neither.

use serde::{Deserialize, Serialize};

use super::waveform::Waveform;

/// Conditioning for a single generated output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prompt {
    /// Text description of the desired audio.
    pub text: Option<String>,
    /// Reference audio: melody for chroma conditioning or a prefix to continue.
    pub audio: Option<Waveform>,
}

impl Prompt {
    /// Creates an unconditioned prompt.
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates a text-only prompt.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            audio: None,
        }
    }

    /// Attaches reference audio.
    pub fn with_audio(mut self, audio: Waveform) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Returns true if the prompt carries reference audio.
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// Player level used by [`practice_prompt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Parses a difficulty from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    /// Describes the player this level targets.
    pub fn player(&self) -> &'static str {
        match self {
            Difficulty::Easy => "beginner player",
            Difficulty::Medium => "player who has 2-3 years experience",
            Difficulty::Hard => "player who has more than 4 years experiences",
        }
    }
}

/// Builds a piano practice prompt for the given level and style.
pub fn practice_prompt(difficulty: Difficulty, style: &str) -> String {
    format!(
        "piano only music for a {} to practice with the touch of {}",
        difficulty.player(),
        style
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn practice_prompt_text() {
        assert_eq!(
            practice_prompt(Difficulty::Easy, "Classical Music"),
            "piano only music for a beginner player to practice with the touch of Classical Music"
        );
    }

    #[test]
    fn difficulty_parsing() {
        assert_eq!(Difficulty::parse("Hard"), Some(Difficulty::Hard));
        assert_eq!(Difficulty::parse("medium"), Some(Difficulty::Medium));
        assert_eq!(Difficulty::parse("expert"), None);
    }

    #[test]
    fn prompt_builders() {
        let prompt = Prompt::text("calm piano").with_audio(Waveform::silence(1, 10, 32000));
        assert_eq!(prompt.text.as_deref(), Some("calm piano"));
        assert!(prompt.has_audio());
        assert!(!Prompt::none().has_audio());
    }
}
