//! Captioning module.
//!
//! Turns an image into a text prompt, and rewrites user prompts, through a
//! hosted multimodal model. Replies must be JSON objects carrying exactly
//! the documented fields.

pub mod hosted;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, Result};
use crate::models::catalog;

// Re-export commonly used items
pub use hosted::{image_media_type, CaptioningConfig, HostedCaptioner};

/// What kind of prompt to write for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionMode {
    /// A prompt for a text-to-music model.
    Music,
    /// A prompt describing background sounds for a text-to-sound model.
    Sound,
}

impl CaptionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionMode::Music => "music",
            CaptionMode::Sound => "sound",
        }
    }

    /// Sound mode for text-to-sound models, music mode otherwise.
    pub fn for_model(model_id: &str) -> Self {
        match catalog::find(model_id) {
            Some(card) if card.category.is_sound() => CaptionMode::Sound,
            _ => CaptionMode::Music,
        }
    }
}

impl fmt::Display for CaptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Captioning reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Caption {
    pub description: String,
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ImprovedPrompt {
    prompt: String,
}

/// Captioning capability.
pub trait Captioner: Send + Sync {
    fn caption(&self, image: &[u8], mode: CaptionMode) -> Result<Caption>;

    fn improve_prompt(&self, prompt: &str) -> Result<String>;
}

/// Removes a surrounding Markdown code fence, if any.
fn strip_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // drop the language tag line
    match inner.find('\n') {
        Some(newline) if !inner[..newline].trim_start().starts_with('{') => inner[newline..].trim(),
        _ => inner.trim(),
    }
}

/// Parses a caption reply.
pub fn parse_caption(text: &str) -> Result<Caption> {
    serde_json::from_str(strip_fence(text))
        .map_err(|e| DaemonError::captioning_failed(format!("invalid caption reply: {}", e)))
}

/// Parses a prompt improvement reply.
pub fn parse_improved_prompt(text: &str) -> Result<String> {
    serde_json::from_str::<ImprovedPrompt>(strip_fence(text))
        .map(|reply| reply.prompt)
        .map_err(|e| DaemonError::captioning_failed(format!("invalid prompt reply: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn parses_exact_fields() {
        let caption =
            parse_caption(r#"{"description": "a beach at dusk", "prompt": "calm ambient pads"}"#)
                .unwrap();
        assert_eq!(caption.description, "a beach at dusk");
        assert_eq!(caption.prompt, "calm ambient pads");
    }

    #[test]
    fn rejects_missing_or_extra_fields() {
        let err = parse_caption(r#"{"prompt": "x"}"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::CaptioningFailed);
        assert!(parse_caption(r#"{"description": "a", "prompt": "b", "mood": "c"}"#).is_err());
        assert!(parse_caption("not json").is_err());
    }

    #[test]
    fn accepts_fenced_reply() {
        let text = "```json\n{\"description\": \"d\", \"prompt\": \"p\"}\n```";
        assert_eq!(parse_caption(text).unwrap().prompt, "p");
        assert_eq!(parse_improved_prompt("```{\"prompt\": \"q\"}```").unwrap(), "q");
    }

    #[test]
    fn improved_prompt_needs_only_prompt() {
        assert_eq!(
            parse_improved_prompt(r#"{"prompt": "90s rock with heavy drums"}"#).unwrap(),
            "90s rock with heavy drums"
        );
        assert!(parse_improved_prompt(r#"{"prompt": "a", "description": "b"}"#).is_err());
    }

    #[test]
    fn mode_follows_model_category() {
        assert_eq!(CaptionMode::for_model("facebook/audiogen-medium"), CaptionMode::Sound);
        assert_eq!(CaptionMode::for_model("facebook/musicgen-small"), CaptionMode::Music);
        assert_eq!(CaptionMode::for_model("unknown/model"), CaptionMode::Music);
    }
}
