//! Runtime-tunable generation parameters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::{ChatError, Result};

/// Snapshot of every parameter that shapes one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repetition_penalty: f32,
    pub max_new_tokens: u32,
    pub system_message: Option<String>,
    pub debug: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            repetition_penalty: 1.1,
            max_new_tokens: 256,
            system_message: None,
            debug: false,
        }
    }
}

/// Whether conversations share one parameter store or get their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterScope {
    /// Every conversation reads and writes the same store.
    #[default]
    Global,
    /// Each conversation starts from the defaults and diverges independently.
    PerConversation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamName {
    Temperature,
    TopP,
    TopK,
    RepetitionPenalty,
    MaxNewTokens,
    SystemMessage,
    Debug,
}

impl ParamName {
    pub const ALL: [Self; 7] = [
        Self::Temperature,
        Self::TopP,
        Self::TopK,
        Self::RepetitionPenalty,
        Self::MaxNewTokens,
        Self::SystemMessage,
        Self::Debug,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::TopP => "top_p",
            Self::TopK => "top_k",
            Self::RepetitionPenalty => "repetition_penalty",
            Self::MaxNewTokens => "max_new_tokens",
            Self::SystemMessage => "system_message",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamName {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "temperature" | "temp" => Ok(Self::Temperature),
            "top_p" => Ok(Self::TopP),
            "top_k" => Ok(Self::TopK),
            "repetition_penalty" => Ok(Self::RepetitionPenalty),
            "max_new_tokens" | "max_tokens" => Ok(Self::MaxNewTokens),
            "system_message" | "system" => Ok(Self::SystemMessage),
            "debug" => Ok(Self::Debug),
            _ => Err(ChatError::parameter(s, "", "unknown parameter")),
        }
    }
}

/// Validated holder of one scope's [`GenerationParams`].
///
/// Every write goes through [`ParameterStore::set`], which parses and
/// range-checks the raw text before touching the stored value.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    params: GenerationParams,
}

impl ParameterStore {
    /// Build a store from already-typed values, rejecting out-of-range ones.
    pub fn new(params: GenerationParams) -> Result<Self> {
        check_temperature(params.temperature, &params.temperature.to_string())?;
        check_top_p(params.top_p, &params.top_p.to_string())?;
        check_repetition_penalty(
            params.repetition_penalty,
            &params.repetition_penalty.to_string(),
        )?;
        check_max_new_tokens(params.max_new_tokens, &params.max_new_tokens.to_string())?;

        let params = GenerationParams {
            system_message: params.system_message.filter(|s| !s.trim().is_empty()),
            ..params
        };
        Ok(Self { params })
    }

    /// Current value of `name`, formatted the way `set` accepts it.
    #[must_use]
    pub fn get(&self, name: ParamName) -> String {
        let p = &self.params;
        match name {
            ParamName::Temperature => p.temperature.to_string(),
            ParamName::TopP => p.top_p.to_string(),
            ParamName::TopK => p.top_k.to_string(),
            ParamName::RepetitionPenalty => p.repetition_penalty.to_string(),
            ParamName::MaxNewTokens => p.max_new_tokens.to_string(),
            ParamName::SystemMessage => p.system_message.clone().unwrap_or_default(),
            ParamName::Debug => p.debug.to_string(),
        }
    }

    /// Parse `raw` for `name` and store it. On error the store is unchanged.
    pub fn set(&mut self, name: ParamName, raw: &str) -> Result<()> {
        let raw = raw.trim();
        match name {
            ParamName::Temperature => {
                self.params.temperature = check_temperature(parse_float(name, raw)?, raw)?;
            }
            ParamName::TopP => self.params.top_p = check_top_p(parse_float(name, raw)?, raw)?,
            ParamName::TopK => self.params.top_k = parse_int(name, raw)?,
            ParamName::RepetitionPenalty => {
                self.params.repetition_penalty =
                    check_repetition_penalty(parse_float(name, raw)?, raw)?;
            }
            ParamName::MaxNewTokens => {
                self.params.max_new_tokens = check_max_new_tokens(parse_int(name, raw)?, raw)?;
            }
            ParamName::SystemMessage => {
                self.params.system_message = (!raw.is_empty()).then(|| raw.to_string());
            }
            ParamName::Debug => self.params.debug = parse_bool(name, raw)?,
        }
        debug!("Parameter {name} set to {raw:?}");
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self) -> GenerationParams {
        self.params.clone()
    }

    #[must_use]
    pub fn system_message(&self) -> Option<&str> {
        self.params.system_message.as_deref()
    }

    #[must_use]
    pub const fn debug(&self) -> bool {
        self.params.debug
    }

    /// One `name: value` line per parameter.
    #[must_use]
    pub fn describe(&self) -> String {
        ParamName::ALL
            .iter()
            .map(|&name| format!("{name}: {}", self.get(name)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn parse_float(name: ParamName, raw: &str) -> Result<f32> {
    match raw.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ChatError::parameter(name.as_str(), raw, "expected a number")),
    }
}

fn parse_int(name: ParamName, raw: &str) -> Result<u32> {
    raw.parse::<u32>().map_err(|_| {
        ChatError::parameter(name.as_str(), raw, "expected a non-negative integer")
    })
}

fn parse_bool(name: ParamName, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ChatError::parameter(name.as_str(), raw, "expected true or false")),
    }
}

fn check_temperature(v: f32, raw: &str) -> Result<f32> {
    if v > 0.0 {
        Ok(v)
    } else {
        Err(ChatError::parameter("temperature", raw, "must be greater than 0"))
    }
}

fn check_top_p(v: f32, raw: &str) -> Result<f32> {
    if v > 0.0 && v <= 1.0 {
        Ok(v)
    } else {
        Err(ChatError::parameter("top_p", raw, "must be in (0, 1]"))
    }
}

fn check_repetition_penalty(v: f32, raw: &str) -> Result<f32> {
    if v >= 1.0 {
        Ok(v)
    } else {
        Err(ChatError::parameter(
            "repetition_penalty",
            raw,
            "must be at least 1",
        ))
    }
}

fn check_max_new_tokens(v: u32, raw: &str) -> Result<u32> {
    if v > 0 {
        Ok(v)
    } else {
        Err(ChatError::parameter(
            "max_new_tokens",
            raw,
            "must be greater than 0",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_temperature_keeps_prior_value() {
        let mut store = ParameterStore::default();
        store.set(ParamName::Temperature, "0.3").unwrap();

        let err = store.set(ParamName::Temperature, "abc").unwrap_err();
        assert!(matches!(err, ChatError::InvalidParameter { ref name, .. } if name == "temperature"));
        assert_eq!(store.get(ParamName::Temperature), "0.3");

        assert!(store.set(ParamName::Temperature, "0").is_err());
        assert!(store.set(ParamName::Temperature, "NaN").is_err());
        assert_eq!(store.get(ParamName::Temperature), "0.3");
    }

    #[test]
    fn ranges_are_enforced() {
        let mut store = ParameterStore::default();
        assert!(store.set(ParamName::TopP, "1.5").is_err());
        assert!(store.set(ParamName::TopP, "1").is_ok());
        assert!(store.set(ParamName::TopK, "-1").is_err());
        assert!(store.set(ParamName::TopK, "0").is_ok());
        assert!(store.set(ParamName::RepetitionPenalty, "0.9").is_err());
        assert!(store.set(ParamName::MaxNewTokens, "0").is_err());
        assert!(store.set(ParamName::MaxNewTokens, "512").is_ok());
        assert_eq!(store.snapshot().max_new_tokens, 512);
    }

    #[test]
    fn debug_parses_case_insensitively() {
        let mut store = ParameterStore::default();
        store.set(ParamName::Debug, "TRUE").unwrap();
        assert!(store.debug());
        assert!(store.set(ParamName::Debug, "yes").is_err());
        assert!(store.debug());
    }

    #[test]
    fn empty_system_message_clears_it() {
        let mut store = ParameterStore::default();
        store.set(ParamName::SystemMessage, "You are terse.").unwrap();
        assert_eq!(store.system_message(), Some("You are terse."));
        store.set(ParamName::SystemMessage, "  ").unwrap();
        assert_eq!(store.system_message(), None);
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!("temp".parse::<ParamName>().unwrap(), ParamName::Temperature);
        assert_eq!(
            "max_tokens".parse::<ParamName>().unwrap(),
            ParamName::MaxNewTokens
        );
        assert!("seed".parse::<ParamName>().is_err());
    }

    #[test]
    fn new_rejects_bad_defaults() {
        let params = GenerationParams {
            top_p: 0.0,
            ..GenerationParams::default()
        };
        assert!(ParameterStore::new(params).is_err());
        assert!(ParameterStore::new(GenerationParams::default()).is_ok());
    }
}
