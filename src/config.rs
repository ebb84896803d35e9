use crate::error::{HistoryError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_CHUNK_SIZE: usize = 10;
pub const DEFAULT_REQUEST_INTERVAL: Duration = Duration::from_millis(4_000);
pub const DEFAULT_FALLBACK_INTERVAL: Duration = Duration::from_millis(6_000);

/// Settings shared by the history, bulk and batch generators.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub model: String,
    /// Years per bulk request.
    pub chunk_size: usize,
    /// Minimum spacing between bulk requests.
    pub request_interval: Duration,
    /// Minimum spacing between per-year fallback requests.
    pub fallback_interval: Duration,
    /// Directory for unrecoverable raw responses; `None` logs them instead.
    pub debug_dir: Option<PathBuf>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_interval: DEFAULT_REQUEST_INTERVAL,
            fallback_interval: DEFAULT_FALLBACK_INTERVAL,
            debug_dir: None,
        }
    }
}

impl GenerationConfig {
    /// Defaults overridden by `SME_MODEL`, `SME_CHUNK_SIZE`,
    /// `SME_REQUEST_INTERVAL_MS`, `SME_FALLBACK_INTERVAL_MS` and `SME_DEBUG_DIR`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = read("SME_MODEL") {
            config.model = model.trim().to_string();
        }
        if let Some(raw) = read("SME_CHUNK_SIZE") {
            config.chunk_size = parse_setting("SME_CHUNK_SIZE", &raw)?;
        }
        if let Some(raw) = read("SME_REQUEST_INTERVAL_MS") {
            config.request_interval =
                Duration::from_millis(parse_setting("SME_REQUEST_INTERVAL_MS", &raw)?);
        }
        if let Some(raw) = read("SME_FALLBACK_INTERVAL_MS") {
            config.fallback_interval =
                Duration::from_millis(parse_setting("SME_FALLBACK_INTERVAL_MS", &raw)?);
        }
        if let Some(dir) = read("SME_DEBUG_DIR") {
            config.debug_dir = Some(PathBuf::from(dir.trim()));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(HistoryError::InvalidConfig(
                "chunk size must be at least 1".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(HistoryError::InvalidConfig(
                "model name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_setting<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        HistoryError::InvalidConfig(format!("{} has an invalid value: {:?}", key, raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let config = GenerationConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, GenerationConfig::default());
        assert_eq!(config.chunk_size, 10);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = GenerationConfig::from_lookup(lookup(&[
            ("SME_MODEL", "gemini-2.5-pro"),
            ("SME_CHUNK_SIZE", " 4 "),
            ("SME_REQUEST_INTERVAL_MS", "250"),
            ("SME_FALLBACK_INTERVAL_MS", "0"),
            ("SME_DEBUG_DIR", "/tmp/sme-debug"),
        ]))
        .unwrap();
        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.chunk_size, 4);
        assert_eq!(config.request_interval, Duration::from_millis(250));
        assert_eq!(config.fallback_interval, Duration::ZERO);
        assert_eq!(config.debug_dir, Some(PathBuf::from("/tmp/sme-debug")));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let result = GenerationConfig::from_lookup(lookup(&[("SME_CHUNK_SIZE", "ten")]));
        assert!(matches!(result, Err(HistoryError::InvalidConfig(_))));

        let result = GenerationConfig::from_lookup(lookup(&[("SME_CHUNK_SIZE", "0")]));
        assert!(matches!(result, Err(HistoryError::InvalidConfig(_))));
    }
}
