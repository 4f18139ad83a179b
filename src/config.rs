//! Runtime configuration.
//!
//! Everything comes from environment variables, with a `.env` file honoured
//! for local development.

use crate::generative::gemini::{DEFAULT_MODEL, GEMINI_API_BASE};

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
pub const DEFAULT_DB_URL: &str = "sqlite:aqi_tracker.db?mode=rwc";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// `None` until the user connects a key at runtime.
    pub api_key: Option<String>,
    pub model: String,
    pub api_base_url: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is read first, except in tests.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match non_empty("AQI_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidValue("AQI_PORT".to_string(), e.to_string()))?,
            None => DEFAULT_PORT,
        };

        let database_url = non_empty("AQI_DATABASE_URL").unwrap_or_else(|| DEFAULT_DB_URL.to_string());

        // API_KEY is the name the hosted build injects.
        let api_key = non_empty("GEMINI_API_KEY").or_else(|| non_empty("API_KEY"));

        let model = non_empty("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let api_base_url = non_empty("GEMINI_BASE_URL").unwrap_or_else(|| GEMINI_API_BASE.to_string());
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "GEMINI_BASE_URL".to_string(),
                format!("'{api_base_url}' is not an http(s) URL"),
            ));
        }

        Ok(Self {
            port,
            database_url,
            api_key,
            model,
            api_base_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.database_url, DEFAULT_DB_URL);
        assert_eq!(cfg.model, DEFAULT_MODEL);
        assert_eq!(cfg.api_base_url, GEMINI_API_BASE);
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let cfg = Config::from_lookup(lookup(&[
            ("AQI_PORT", "8081"),
            ("AQI_DATABASE_URL", "sqlite::memory:"),
            ("GEMINI_MODEL", "gemini-2.5-pro"),
            ("API_KEY", "fallback"),
        ]))
        .unwrap();

        assert_eq!(cfg.port, 8081);
        assert_eq!(cfg.database_url, "sqlite::memory:");
        assert_eq!(cfg.model, "gemini-2.5-pro");
        assert_eq!(cfg.api_key.as_deref(), Some("fallback"));
    }

    #[test]
    fn test_gemini_key_wins_over_api_key() {
        let cfg = Config::from_lookup(lookup(&[("GEMINI_API_KEY", "primary"), ("API_KEY", "fallback")])).unwrap();

        assert_eq!(cfg.api_key.as_deref(), Some("primary"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_lookup(lookup(&[("AQI_PORT", "eighty")])).is_err());
        assert!(Config::from_lookup(lookup(&[("GEMINI_BASE_URL", "ftp://x")])).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let cfg = Config::from_lookup(lookup(&[("GEMINI_API_KEY", "secret-value")])).unwrap();

        assert!(!format!("{cfg:?}").contains("secret-value"));
    }
}
