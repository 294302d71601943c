//! Captioning over a hosted multimodal messages API.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::{parse_caption, parse_improved_prompt, Caption, CaptionMode, Captioner};
use crate::error::{DaemonError, Result};

/// Default messages endpoint.
pub const DEFAULT_CAPTION_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

/// Default captioning model.
pub const DEFAULT_CAPTION_MODEL: &str = "claude-3-opus-20240229";

/// Environment variable holding the API key.
pub const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;
const IMAGE_INSTRUCTION: &str = "develop the prompt based on this image";

const MUSIC_SYSTEM_PROMPT: &str = "You write prompts for a text-to-music model. You will be given an \
image. Analyse it step by step, then write a prompt that captures its essence for a 15 second clip: \
genre, style, instruments and any other useful detail. The model was trained on stock music catalog \
descriptions, so prompts that name the instruments and an intended use case work best. Keep the \
prompt to one or two sentences. Reply with a JSON object with exactly two string fields, \
`description` and `prompt`.";

const SOUND_SYSTEM_PROMPT: &str = "You write prompts for a text-to-sound model. You will be given an \
image. Analyse it step by step, then write a prompt describing the background sounds the scene \
should have, for a 15 second clip. Keep the prompt to one or two sentences. Reply with a JSON object \
with exactly two string fields, `description` and `prompt`.";

const IMPROVE_SYSTEM_PROMPT: &str = "You help users improve prompts for a text-to-music model. \
Examples of good prompts:\n\
- \"90s rock song with electric guitar and heavy drums\"\n\
- \"An 80s driving pop song with heavy drums and synth pads in the background\"\n\
- \"An energetic hip-hop music piece, with synth sounds and strong bass. There is a rhythmic hi-hat pattern in the drums.\"\n\
- \"A grand orchestral arrangement with thunderous percussion, epic brass fanfares, and soaring strings, creating a cinematic atmosphere fit for a heroic battle.\"\n\
- \"Classic reggae track with an electronic guitar solo\"\n\
Improve the prompt you are given. Keep it to one or two sentences. Reply with a JSON object with \
exactly one string field, `prompt`.";

/// Settings for [`HostedCaptioner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptioningConfig {
    /// Messages endpoint URL.
    pub endpoint: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for CaptioningConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CAPTION_ENDPOINT.to_string(),
            model: DEFAULT_CAPTION_MODEL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Blocking client for the hosted messages API.
pub struct HostedCaptioner {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HostedCaptioner {
    /// Builds a captioner, reading the API key from the configured variable.
    pub fn from_config(config: &CaptioningConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            DaemonError::captioning_failed(format!("{} is not set", config.api_key_env))
        })?;
        Self::new(
            &config.endpoint,
            &config.model,
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(DaemonError::captioning_failed("API key is empty"));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DaemonError::captioning_failed(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        })
    }

    /// Sends one message and returns the first text block of the reply.
    fn send(&self, system: &str, content: serde_json::Value) -> Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": system,
            "messages": [{ "role": "user", "content": content }],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    DaemonError::captioning_failed("request timed out")
                } else {
                    DaemonError::captioning_failed(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(DaemonError::captioning_failed(format!(
                "HTTP {}: {}",
                status, text
            )));
        }

        let reply: MessagesResponse = response
            .json()
            .map_err(|e| DaemonError::captioning_failed(format!("malformed reply: {}", e)))?;

        reply
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| DaemonError::captioning_failed("reply has no text content"))
    }
}

impl Captioner for HostedCaptioner {
    fn caption(&self, image: &[u8], mode: CaptionMode) -> Result<Caption> {
        let media_type = image_media_type(image)
            .ok_or_else(|| DaemonError::captioning_failed("unsupported image format"))?;
        let system = match mode {
            CaptionMode::Music => MUSIC_SYSTEM_PROMPT,
            CaptionMode::Sound => SOUND_SYSTEM_PROMPT,
        };

        info!(mode = %mode, bytes = image.len(), "Captioning image");
        let content = json!([
            {
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": media_type,
                    "data": STANDARD.encode(image),
                },
            },
            { "type": "text", "text": IMAGE_INSTRUCTION },
        ]);

        let text = self.send(system, content)?;
        debug!(reply = %text, "Caption reply");
        parse_caption(&text)
    }

    fn improve_prompt(&self, prompt: &str) -> Result<String> {
        let content = json!([{ "type": "text", "text": prompt }]);
        let text = self.send(IMPROVE_SYSTEM_PROMPT, content)?;
        parse_improved_prompt(&text)
    }
}

/// Detects the image media type from its leading bytes.
pub fn image_media_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF8") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn detects_media_types() {
        assert_eq!(image_media_type(&[0x89, b'P', b'N', b'G', 0x0D]), Some("image/png"));
        assert_eq!(image_media_type(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(image_media_type(b"GIF89a"), Some("image/gif"));
        assert_eq!(image_media_type(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(image_media_type(b"hello"), None);
    }

    #[test]
    fn empty_key_rejected() {
        let err = HostedCaptioner::new(DEFAULT_CAPTION_ENDPOINT, "m", "  ", Duration::from_secs(1))
            .err()
            .unwrap();
        assert_eq!(err.code, ErrorCode::CaptioningFailed);
    }

    #[test]
    fn unknown_image_fails_before_any_request() {
        let captioner =
            HostedCaptioner::new("http://127.0.0.1:9", "m", "key", Duration::from_millis(100))
                .unwrap();
        let err = captioner.caption(b"not an image", CaptionMode::Music).unwrap_err();
        assert!(err.message.contains("unsupported image format"));
    }

    #[test]
    fn unreachable_endpoint_is_captioning_error() {
        let captioner =
            HostedCaptioner::new("http://127.0.0.1:9", "m", "key", Duration::from_millis(500))
                .unwrap();
        let err = captioner.improve_prompt("rock").unwrap_err();
        assert_eq!(err.code, ErrorCode::CaptioningFailed);
    }

    #[test]
    fn config_defaults() {
        let config = CaptioningConfig::default();
        assert_eq!(config.api_key_env, "ANTHROPIC_API_KEY");
        assert!(config.endpoint.ends_with("/v1/messages"));
    }
}
