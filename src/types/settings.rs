use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default base URL of the code-generation service.
pub const DEFAULT_MODEL_BASE: &str = "http://localhost:8000";

/// Default base URL of the code-execution service.
pub const DEFAULT_EXEC_BASE: &str = "http://localhost:5000";

/// Environment variable that overrides the default model base URL.
pub const MODEL_BASE_ENV: &str = "CODEAGENT_MODEL_BASE_URL";

/// Environment variable that overrides the default execution base URL.
pub const EXEC_BASE_ENV: &str = "CODEAGENT_EXEC_BASE_URL";

/// Environment variable that overrides the default theme.
pub const THEME_ENV: &str = "CODEAGENT_THEME";

/// Display theme for the presentation layer.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light text on a dark background.
    #[default]
    Dark,

    /// Dark text on a light background.
    Light,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Dark => write!(f, "dark"),
            Theme::Light => write!(f, "light"),
        }
    }
}

impl FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            _ => Err(Error::validation(
                format!("unknown theme {s:?}; expected dark or light"),
                Some("theme".to_string()),
            )),
        }
    }
}

/// Mutable client configuration.
///
/// The base URLs are resolved once at the start of each turn, so editing them never
/// redirects a request that is already in flight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Root address of the code-generation service.
    pub model_base: String,

    /// Root address of the code-execution service.
    pub exec_base: String,

    /// Display theme.
    pub theme: Theme,
}

impl Settings {
    /// Create settings from explicit values.
    pub fn new(model_base: impl Into<String>, exec_base: impl Into<String>, theme: Theme) -> Self {
        Self {
            model_base: model_base.into(),
            exec_base: exec_base.into(),
            theme,
        }
    }

    /// Read defaults from the environment.
    ///
    /// Unset, empty, or unparseable values fall back to the built-in defaults.
    pub fn from_env() -> Self {
        let model_base = env::var(MODEL_BASE_ENV)
            .ok()
            .filter(|url| validate_base_url(url).is_ok())
            .unwrap_or_else(|| DEFAULT_MODEL_BASE.to_string());
        let exec_base = env::var(EXEC_BASE_ENV)
            .ok()
            .filter(|url| validate_base_url(url).is_ok())
            .unwrap_or_else(|| DEFAULT_EXEC_BASE.to_string());
        let theme = env::var(THEME_ENV)
            .ok()
            .and_then(|theme| theme.parse().ok())
            .unwrap_or_default();
        Self {
            model_base,
            exec_base,
            theme,
        }
    }

    /// Check that both base URLs are absolute URLs.
    pub fn validate(&self) -> Result<()> {
        validate_base_url(&self.model_base)?;
        validate_base_url(&self.exec_base)?;
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_BASE, DEFAULT_EXEC_BASE, Theme::Dark)
    }
}

/// Check that `base` parses as an absolute http(s) URL.
pub fn validate_base_url(base: &str) -> Result<()> {
    let parsed = url::Url::parse(base.trim())?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(Error::validation(
            format!("unsupported URL scheme {scheme:?} in {base:?}"),
            Some("base_url".to_string()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_use_camel_case_keys() {
        let settings = Settings::default();
        assert_eq!(
            serde_json::to_value(&settings).unwrap(),
            json!({
                "modelBase": "http://localhost:8000",
                "execBase": "http://localhost:5000",
                "theme": "dark",
            })
        );
    }

    #[test]
    fn theme_parses_case_insensitively() {
        assert_eq!("Light".parse::<Theme>().unwrap(), Theme::Light);
        assert_eq!(" dark ".parse::<Theme>().unwrap(), Theme::Dark);
        assert!("solarized".parse::<Theme>().is_err());
    }

    #[test]
    fn base_urls_must_be_absolute_http() {
        assert!(validate_base_url("http://localhost:8000").is_ok());
        assert!(validate_base_url("https://models.example.com/api").is_ok());
        assert!(validate_base_url("localhost:8000").is_err());
        assert!(validate_base_url("/relative").is_err());
        assert!(validate_base_url("ftp://example.com").is_err());
    }
}
