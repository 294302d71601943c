//! Model routing and generation backends.
//!
//! - [`ModelRegistry`](registry::ModelRegistry): identifier to inference strategy
//! - [`ModelCache`](resident::ModelCache): at most one resident model
//! - [`ModelLoader`](capability::ModelLoader) / [`ModelHandle`](capability::ModelHandle):
//!   capability interface implemented by the backends
//! - [`BridgeModelLoader`](bridge::BridgeModelLoader): HTTP inference bridge
//! - [`SyntheticModelLoader`](synthetic::SyntheticModelLoader): offline tone generator
//! - [`catalog`]: known model identifiers grouped by use

pub mod bridge;
pub mod capability;
pub mod catalog;
pub mod registry;
pub mod resident;
pub mod synthetic;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{DaemonError, Result};

// Re-export commonly used types
pub use bridge::{BridgeModelLoader, DEFAULT_BRIDGE_URL};
pub use capability::{ModelFailure, ModelHandle, ModelLoader, ProgressFn, Tick};
pub use catalog::{ModelCard, ModelCategory, MODEL_CARDS};
pub use registry::{InferenceStrategy, ModelFamily, ModelRegistry, Resolution};
pub use resident::ModelCache;
pub use synthetic::SyntheticModelLoader;

/// Available generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Pretrained models served by an inference bridge.
    #[default]
    Bridge,
    /// Built-in deterministic tone generator.
    Synthetic,
}

impl Backend {
    /// Returns the string representation of the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Bridge => "bridge",
            Backend::Synthetic => "synthetic",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bridge" | "http" => Some(Backend::Bridge),
            "synthetic" | "mock" | "offline" => Some(Backend::Synthetic),
            _ => None,
        }
    }

    /// Builds the loader for this backend.
    pub fn loader(&self, bridge_url: &str, bridge_timeout: Duration) -> Result<Arc<dyn ModelLoader>> {
        Ok(match self {
            Backend::Bridge => {
                let loader = BridgeModelLoader::new(bridge_url, bridge_timeout)?;
                if !loader.is_reachable() {
                    warn!(url = %bridge_url, "Inference bridge not reachable; loads will fail until it is up");
                }
                Arc::new(loader)
            }
            Backend::Synthetic => Arc::new(SyntheticModelLoader),
        })
    }
}

impl FromStr for Backend {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| {
            DaemonError::invalid_configuration(format!(
                "Unknown backend '{}'. Use 'bridge' or 'synthetic'",
                s
            ))
        })
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parsing() {
        assert_eq!(Backend::parse("bridge"), Some(Backend::Bridge));
        assert_eq!(Backend::parse("Synthetic"), Some(Backend::Synthetic));
        assert_eq!(Backend::parse("mock"), Some(Backend::Synthetic));
        assert_eq!(Backend::parse("onnx"), None);
        assert!("onnx".parse::<Backend>().is_err());
    }

    #[test]
    fn backend_display() {
        assert_eq!(Backend::Bridge.to_string(), "bridge");
        assert_eq!(Backend::Synthetic.to_string(), "synthetic");
    }

    #[test]
    fn backend_default() {
        assert_eq!(Backend::default(), Backend::Bridge);
    }

    #[test]
    fn synthetic_loader_builds() {
        let loader = Backend::Synthetic
            .loader(DEFAULT_BRIDGE_URL, Duration::from_secs(1))
            .unwrap();
        let resolution = ModelRegistry::new().resolve("facebook/musicgen-small").unwrap();
        assert_eq!(loader.load(&resolution).unwrap().sample_rate(), 32000);
    }
}
