//! Layered settings loader.
//!
//! [`ConfigLoader`] applies settings in layers, later layers overriding
//! earlier ones:
//!
//! 1. Built-in defaults or a preset
//! 2. A TOML or JSON file
//! 3. A `.env` file, folded into the process environment
//! 4. Environment variables named `PREFIX__SECTION__KEY`

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use trellis_core::UnhandledErrorMode;
use trellis_telemetry::LogFormat;

use crate::{ConfigError, TrellisConfig};

/// Loads [`TrellisConfig`] from defaults, files and the environment.
///
/// # Example
///
/// ```no_run
/// use trellis_config::ConfigLoader;
///
/// # fn main() -> Result<(), trellis_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_production()
///     .with_optional_file("trellis.toml")?
///     .with_dotenv()?
///     .with_env_prefix("TRELLIS")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: TrellisConfig,
    env_prefix: Option<String>,
    file_loaded: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader holding the default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: TrellisConfig::default(),
            env_prefix: None,
            file_loaded: false,
        }
    }

    /// Resets to the default settings.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = TrellisConfig::default();
        self
    }

    /// Starts from the development preset.
    ///
    /// ```
    /// use trellis_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert!(config.errors.show_details);
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = TrellisConfig::development();
        self
    }

    /// Starts from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = TrellisConfig::production();
        self
    }

    /// Loads settings from a `.toml` or `.json` file.
    ///
    /// The file replaces everything loaded so far; sections it omits take
    /// their default values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, has an
    /// unsupported extension, or does not parse (unknown fields included).
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        self.file_loaded = true;

        Ok(self)
    }

    /// Loads a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads settings from a string in `"toml"` or `"json"` format.
    ///
    /// ```
    /// use trellis_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[authentication]\nrealm = \"orders\"\n", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.authentication.realm.as_deref(), Some("orders"));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the format is unsupported or parsing fails.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => return Err(ConfigError::unsupported_format(format)),
        };
        Ok(self)
    }

    /// Sets the prefix of environment overrides.
    ///
    /// With prefix `TRELLIS`:
    /// - `TRELLIS__ERRORS__SHOW_DETAILS=true`
    /// - `TRELLIS__AUTHENTICATION__REALM=orders`
    /// - `TRELLIS__RESPONSE__DEFAULT_HEADERS__X_SERVED_BY=edge-1`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Loads a `.env` file from the working directory, if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DotenvError` if the file exists but is
    /// malformed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a file layer has been loaded.
    pub fn file_loaded(&self) -> bool {
        self.file_loaded
    }

    /// Applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override does not parse or validation
    /// fails.
    pub fn load(mut self) -> Result<TrellisConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let vars: BTreeMap<String, String> = env::vars()
                .filter(|(key, _)| key.starts_with(&prefix))
                .collect();
            for (key, value) in vars {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the settings without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> TrellisConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<TrellisConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or_else(|| path.display().to_string(), str::to_lowercase);

        match extension.as_str() {
            "toml" => Ok(toml::from_str(content)?),
            "json" => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::unsupported_format(extension)),
        }
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(path) = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
        else {
            // TRELLISX_FOO shares the prefix but is not ours.
            return Ok(());
        };

        let parts: Vec<&str> = path.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["AUTHENTICATION", "FAIL_IF_NO_AUTHENTICATORS_APPLY"] => {
                config.authentication.fail_if_no_authenticators_apply = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["AUTHENTICATION", "REALM"] => {
                config.authentication.realm = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            ["AUTHENTICATION", "UNAUTHORIZED_REASON_PHRASE"] => {
                config.authentication.unauthorized_reason_phrase = value.to_string();
            }

            ["ERRORS", "SHOW_DETAILS"] => {
                config.errors.show_details = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["ERRORS", "REASON_PHRASE"] => {
                config.errors.reason_phrase = value.to_string();
            }
            ["ERRORS", "UNHANDLED"] => {
                config.errors.unhandled = match value.to_lowercase().as_str() {
                    "respond" => UnhandledErrorMode::Respond,
                    "propagate" => UnhandledErrorMode::Propagate,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'respond' or 'propagate'",
                        ))
                    }
                };
            }

            ["RESPONSE", "DEFAULT_HEADERS", name] => {
                let name = name.to_lowercase().replace('_', "-");
                if value.is_empty() {
                    config.response.default_headers.remove(&name);
                } else {
                    config
                        .response
                        .default_headers
                        .insert(name, value.to_string());
                }
            }

            ["LOGGING", "ENABLED"] => {
                config.logging.enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["LOGGING", "LEVEL"] => {
                config.logging.level = value.to_string();
            }
            ["LOGGING", "FORMAT"] => {
                config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }

            ["METRICS", "ENABLED"] => {
                config.metrics.enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["METRICS", "DURATION_BUCKETS"] => {
                config.metrics.duration_buckets = value
                    .split(',')
                    .map(|bucket| bucket.trim().parse::<f64>())
                    .collect::<Result<_, _>>()
                    .map_err(|_| {
                        ConfigError::env_parse_error(key, "expected comma-separated numbers")
                    })?;
            }

            // Unknown keys are ignored so unrelated variables can share the prefix.
            _ => {}
        }

        Ok(())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "TRELLIS";

    fn apply(loader: &mut ConfigLoader, key: &str, value: &str) -> Result<(), ConfigError> {
        loader.apply_env_var(key, value, PREFIX)
    }

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, TrellisConfig::default());
    }

    #[test]
    fn test_with_string_json() {
        let json = r#"{"errors": {"reason_phrase": "Try again later"}}"#;
        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.errors.reason_phrase, "Try again later");
    }

    #[test]
    fn test_with_string_unsupported_format() {
        let result = ConfigLoader::new().with_string("a: b", "yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_string_replaces_preset() {
        let config = ConfigLoader::new()
            .with_development()
            .with_string("[authentication]\nrealm = \"api\"\n", "toml")
            .unwrap()
            .load()
            .unwrap();
        assert!(!config.errors.show_details);
        assert_eq!(config.authentication.realm.as_deref(), Some("api"));
    }

    #[test]
    fn test_env_booleans() {
        let mut loader = ConfigLoader::new();
        apply(&mut loader, "TRELLIS__ERRORS__SHOW_DETAILS", "yes").unwrap();
        apply(
            &mut loader,
            "TRELLIS__AUTHENTICATION__FAIL_IF_NO_AUTHENTICATORS_APPLY",
            "1",
        )
        .unwrap();

        let config = loader.load_unvalidated();
        assert!(config.errors.show_details);
        assert!(config.authentication.fail_if_no_authenticators_apply);
    }

    #[test]
    fn test_env_invalid_boolean() {
        let mut loader = ConfigLoader::new();
        let err = apply(&mut loader, "TRELLIS__METRICS__ENABLED", "maybe").unwrap_err();
        assert!(matches!(err, ConfigError::EnvParseError { .. }));
    }

    #[test]
    fn test_env_realm_and_phrases() {
        let mut loader = ConfigLoader::new();
        apply(&mut loader, "TRELLIS__AUTHENTICATION__REALM", "orders").unwrap();
        apply(
            &mut loader,
            "TRELLIS__AUTHENTICATION__UNAUTHORIZED_REASON_PHRASE",
            "Sign in",
        )
        .unwrap();
        apply(&mut loader, "TRELLIS__ERRORS__REASON_PHRASE", "Oops").unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.authentication.realm.as_deref(), Some("orders"));
        assert_eq!(config.authentication.unauthorized_reason_phrase, "Sign in");
        assert_eq!(config.errors.reason_phrase, "Oops");

        let mut loader = ConfigLoader::new();
        apply(&mut loader, "TRELLIS__AUTHENTICATION__REALM", "").unwrap();
        assert!(loader.load_unvalidated().authentication.realm.is_none());
    }

    #[test]
    fn test_env_unhandled_mode() {
        let mut loader = ConfigLoader::new();
        apply(&mut loader, "TRELLIS__ERRORS__UNHANDLED", "Propagate").unwrap();
        assert_eq!(
            loader.load_unvalidated().errors.unhandled,
            UnhandledErrorMode::Propagate
        );

        let mut loader = ConfigLoader::new();
        assert!(apply(&mut loader, "TRELLIS__ERRORS__UNHANDLED", "ignore").is_err());
    }

    #[test]
    fn test_env_default_headers() {
        let mut loader = ConfigLoader::new();
        apply(
            &mut loader,
            "TRELLIS__RESPONSE__DEFAULT_HEADERS__X_SERVED_BY",
            "edge-1",
        )
        .unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(
            config.response.default_headers.get("x-served-by").map(String::as_str),
            Some("edge-1")
        );
    }

    #[test]
    fn test_env_logging_and_metrics() {
        let mut loader = ConfigLoader::new();
        apply(&mut loader, "TRELLIS__LOGGING__FORMAT", "pretty").unwrap();
        apply(&mut loader, "TRELLIS__LOGGING__LEVEL", "trellis_behaviors=debug").unwrap();
        apply(&mut loader, "TRELLIS__METRICS__DURATION_BUCKETS", "0.01, 0.1, 1").unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.logging.level, "trellis_behaviors=debug");
        assert_eq!(config.metrics.duration_buckets, vec![0.01, 0.1, 1.0]);

        let mut loader = ConfigLoader::new();
        assert!(apply(&mut loader, "TRELLIS__METRICS__DURATION_BUCKETS", "fast").is_err());
        assert!(apply(&mut loader, "TRELLIS__LOGGING__FORMAT", "xml").is_err());
    }

    #[test]
    fn test_env_unknown_and_foreign_keys_ignored() {
        let mut loader = ConfigLoader::new();
        apply(&mut loader, "TRELLIS__UNKNOWN__KEY", "value").unwrap();
        apply(&mut loader, "TRELLISX_OTHER", "value").unwrap();
        assert_eq!(loader.load_unvalidated(), TrellisConfig::default());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("2"), None);
    }
}
