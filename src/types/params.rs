//! GenerationConfig type for model generation parameters.
//!
//! The configuration is an open mapping of named numeric/boolean values.
//! Which keys a model accepts depends on its conditioning mode, so the map
//! is not checked against a fixed schema; only the value invariants of the
//! well-known keys are enforced here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, Result};

/// Well-known parameter names.
pub mod keys {
    /// Length of each generated output in seconds.
    pub const DURATION: &str = "duration";
    /// Sample from the distribution instead of taking argmax.
    pub const USE_SAMPLING: &str = "use_sampling";
    /// Top-k sampling cutoff.
    pub const TOP_K: &str = "top_k";
    /// Nucleus sampling cutoff (0 disables it).
    pub const TOP_P: &str = "top_p";
    /// Softmax temperature.
    pub const TEMPERATURE: &str = "temperature";
    /// Classifier-free guidance coefficient.
    pub const CFG_COEF: &str = "cfg_coef";
    /// MAGNeT span arrangement mode (0 = nonoverlap, 1 = stride1).
    pub const SPAN_ARRANGEMENT: &str = "span_arrangement";
    /// Random seed, honoured by backends that support it.
    pub const SEED: &str = "seed";
}

/// A single parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// A boolean toggle such as `use_sampling`.
    Bool(bool),
    /// Any numeric parameter.
    Number(f64),
}

impl ParamValue {
    /// Returns the numeric value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Bool(_) => None,
        }
    }

    /// Returns the boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            ParamValue::Number(_) => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<f32> for ParamValue {
    fn from(value: f32) -> Self {
        ParamValue::Number(value as f64)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Number(value as f64)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Number(value as f64)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// Named generation parameters forwarded to the selected model.
///
/// Serializes as a flat JSON object, e.g.
/// `{"duration": 10, "use_sampling": true, "top_k": 250}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationConfig {
    params: BTreeMap<String, ParamValue>,
}

impl GenerationConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets a parameter, replacing any previous value.
    pub fn set(&mut self, key: &str, value: impl Into<ParamValue>) {
        self.params.insert(key.to_string(), value.into());
    }

    /// Removes a parameter and returns its previous value.
    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.params.remove(key)
    }

    /// Returns a parameter value.
    pub fn get(&self, key: &str) -> Option<ParamValue> {
        self.params.get(key).copied()
    }

    /// Returns a numeric parameter.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    /// Returns a boolean parameter.
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// Returns the requested duration in seconds, if present.
    pub fn duration(&self) -> Option<f64> {
        self.number(keys::DURATION)
    }

    /// Returns true if the parameter is present.
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Iterates over all parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ParamValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns true if no parameters are set.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Checks the value invariants of the well-known keys.
    ///
    /// `duration` must be a positive number; `temperature`, `top_k` and
    /// `top_p` must be non-negative numbers. Every numeric value must be
    /// finite. Unknown keys are passed through untouched.
    pub fn validate(&self) -> Result<()> {
        for (key, value) in &self.params {
            if let ParamValue::Number(n) = value {
                if !n.is_finite() {
                    return Err(DaemonError::invalid_configuration(format!(
                        "Parameter '{}' must be a finite number, got {}",
                        key, n
                    )));
                }
            }
        }

        if let Some(value) = self.get(keys::DURATION) {
            match value.as_f64() {
                Some(d) if d > 0.0 => {}
                _ => {
                    return Err(DaemonError::invalid_configuration(format!(
                        "Duration must be a positive number of seconds, got {:?}",
                        value
                    )))
                }
            }
        }

        for key in [keys::TEMPERATURE, keys::TOP_K, keys::TOP_P] {
            if let Some(value) = self.get(key) {
                match value.as_f64() {
                    Some(n) if n >= 0.0 => {}
                    _ => {
                        return Err(DaemonError::invalid_configuration(format!(
                            "'{}' must be a non-negative number, got {:?}",
                            key, value
                        )))
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn default_config() -> GenerationConfig {
        GenerationConfig::new()
            .with(keys::DURATION, 10)
            .with(keys::USE_SAMPLING, true)
            .with(keys::TOP_K, 250)
            .with(keys::TOP_P, 0)
            .with(keys::TEMPERATURE, 1.0)
    }

    #[test]
    fn valid_config_passes() {
        let config = default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.duration(), Some(10.0));
        assert_eq!(config.flag(keys::USE_SAMPLING), Some(true));
    }

    #[test]
    fn zero_duration_rejected() {
        let config = default_config().with(keys::DURATION, 0);
        let err = config.validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfiguration);
    }

    #[test]
    fn negative_sampling_params_rejected() {
        for key in [keys::TEMPERATURE, keys::TOP_K, keys::TOP_P] {
            let config = default_config().with(key, -1.0);
            assert!(config.validate().is_err(), "{} accepted", key);
        }
    }

    #[test]
    fn boolean_duration_rejected() {
        let config = default_config().with(keys::DURATION, true);
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_finite_rejected() {
        let config = default_config().with("cfg_coef", f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_keys_pass_through() {
        let config = default_config().with("extend_stride", 18);
        assert!(config.validate().is_ok());
        assert_eq!(config.number("extend_stride"), Some(18.0));
    }

    #[test]
    fn deserializes_from_flat_json() {
        let json = r#"{"duration": 10, "use_sampling": true, "top_k": 250, "top_p": 0, "temperature": 1.0}"#;
        let config: GenerationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config, default_config());
    }
}
