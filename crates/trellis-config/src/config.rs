//! Settings types.
//!
//! [`TrellisConfig`] is the root of the settings tree. Each section maps
//! onto a group of [`Configuration`] knobs and is applied with
//! [`TrellisConfig::apply_to`].

use std::collections::BTreeMap;

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use trellis_core::configuration::{
    Configuration, UnhandledErrorMode, DEFAULT_ERROR_REASON_PHRASE,
    DEFAULT_UNAUTHORIZED_REASON_PHRASE,
};
use trellis_telemetry::logging::create_env_filter;
use trellis_telemetry::{LogConfig, MetricsConfig, TelemetryConfig};

use crate::ConfigError;

/// Complete Trellis settings.
///
/// # Example
///
/// ```
/// use trellis_config::TrellisConfig;
///
/// let config = TrellisConfig::default();
/// assert!(!config.errors.show_details);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct TrellisConfig {
    /// Authentication behavior settings.
    pub authentication: AuthenticationSettings,

    /// Error handling settings.
    pub errors: ErrorSettings,

    /// Response settings.
    pub response: ResponseSettings,

    /// Logging settings.
    pub logging: LogConfig,

    /// Metrics settings.
    pub metrics: MetricsConfig,
}

/// Settings of the authentication behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct AuthenticationSettings {
    /// Fail with a configuration error when no authenticator applies.
    pub fail_if_no_authenticators_apply: bool,

    /// Realm advertised by authenticators that do not carry their own.
    pub realm: Option<String>,

    /// Reason phrase of 401 responses.
    pub unauthorized_reason_phrase: String,
}

impl Default for AuthenticationSettings {
    fn default() -> Self {
        Self {
            fail_if_no_authenticators_apply: false,
            realm: None,
            unauthorized_reason_phrase: DEFAULT_UNAUTHORIZED_REASON_PHRASE.to_string(),
        }
    }
}

/// Settings of error handling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ErrorSettings {
    /// Include diagnostics in 500 responses.
    pub show_details: bool,

    /// Reason phrase of 500 responses.
    pub reason_phrase: String,

    /// What the outermost catch does with unhandled errors.
    pub unhandled: UnhandledErrorMode,
}

impl Default for ErrorSettings {
    fn default() -> Self {
        Self {
            show_details: false,
            reason_phrase: DEFAULT_ERROR_REASON_PHRASE.to_string(),
            unhandled: UnhandledErrorMode::Respond,
        }
    }
}

/// Settings of successful responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ResponseSettings {
    /// Headers added to every successful response.
    pub default_headers: BTreeMap<String, String>,
}

impl ResponseSettings {
    /// Converts the header table into a `HeaderMap`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidHeader` for a name or value that is not
    /// a valid HTTP header.
    pub fn header_map(&self) -> Result<HeaderMap, ConfigError> {
        let mut headers = HeaderMap::with_capacity(self.default_headers.len());
        for (name, value) in &self.default_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ConfigError::invalid_header(name, "invalid header name"))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| ConfigError::invalid_header(name, "invalid header value"))?;
            headers.append(header_name, header_value);
        }
        Ok(headers)
    }
}

impl TrellisConfig {
    /// Diagnostics on, pretty debug logging.
    ///
    /// # Example
    ///
    /// ```
    /// use trellis_config::TrellisConfig;
    ///
    /// let config = TrellisConfig::development();
    /// assert!(config.errors.show_details);
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        Self {
            errors: ErrorSettings {
                show_details: true,
                ..ErrorSettings::default()
            },
            logging: LogConfig::development(),
            ..Self::default()
        }
    }

    /// Diagnostics off, JSON logging at `info`.
    #[must_use]
    pub fn production() -> Self {
        Self {
            errors: ErrorSettings {
                show_details: false,
                ..ErrorSettings::default()
            },
            logging: LogConfig::production(),
            ..Self::default()
        }
    }

    /// The logging and metrics sections as a telemetry configuration.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            logging: self.logging.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidHeader` for a default header that is not
    /// a valid HTTP header, and `ConfigError::InvalidValue` if:
    /// - a reason phrase is empty or contains control characters
    /// - the realm is empty or contains a double quote
    /// - the log filter directive does not parse
    /// - metrics are enabled with no buckets, or buckets out of order
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_reason_phrase(
            "authentication.unauthorized_reason_phrase",
            &self.authentication.unauthorized_reason_phrase,
        )?;
        validate_reason_phrase("errors.reason_phrase", &self.errors.reason_phrase)?;

        if let Some(realm) = &self.authentication.realm {
            if realm.is_empty() {
                return Err(ConfigError::invalid_value(
                    "authentication.realm",
                    "must not be empty; omit it instead",
                ));
            }
            if realm.contains('"') {
                return Err(ConfigError::invalid_value(
                    "authentication.realm",
                    "must not contain '\"'",
                ));
            }
        }

        self.response.header_map()?;

        if self.logging.enabled {
            create_env_filter(&self.logging.level)
                .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        }

        if self.metrics.enabled {
            let buckets = &self.metrics.duration_buckets;
            if buckets.is_empty() {
                return Err(ConfigError::invalid_value(
                    "metrics.duration_buckets",
                    "must not be empty when metrics are enabled",
                ));
            }
            if buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
                return Err(ConfigError::invalid_value(
                    "metrics.duration_buckets",
                    "must be strictly increasing",
                ));
            }
        }

        Ok(())
    }

    /// Writes the settings onto a runtime configuration.
    ///
    /// Plugin collections are left untouched. `errors.show_details = true`
    /// turns diagnostics on for every request; `false` keeps whatever
    /// predicate the configuration already has.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidHeader` if a default header is invalid.
    pub fn apply_to(&self, configuration: &mut Configuration) -> Result<(), ConfigError> {
        let headers = self.response.header_map()?;

        configuration.fail_if_no_authenticators_apply =
            self.authentication.fail_if_no_authenticators_apply;
        configuration.default_authentication_realm = self.authentication.realm.clone();
        configuration.default_unauthorized_reason_phrase =
            self.authentication.unauthorized_reason_phrase.clone();
        configuration.default_error_reason_phrase = self.errors.reason_phrase.clone();
        configuration.unhandled_errors = self.errors.unhandled;
        configuration.default_response_headers.extend(headers);

        if self.errors.show_details {
            configuration.show_error_details(true);
        }

        Ok(())
    }
}

fn validate_reason_phrase(field: &str, phrase: &str) -> Result<(), ConfigError> {
    if phrase.trim().is_empty() {
        return Err(ConfigError::invalid_value(field, "must not be empty"));
    }
    if phrase.chars().any(char::is_control) {
        return Err(ConfigError::invalid_value(
            field,
            "must not contain control characters",
        ));
    }
    Ok(())
}
