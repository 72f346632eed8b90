//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or applying settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Settings file not found.
    #[error("settings file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Settings file exists but could not be read.
    #[error("failed to read settings file: {path}")]
    ReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Neither TOML nor JSON.
    #[error("unsupported settings format: {format}")]
    UnsupportedFormat {
        /// The extension or format name that was given.
        format: String,
    },

    /// TOML parsing error, unknown fields included.
    #[error("failed to parse TOML settings: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON parsing error, unknown fields included.
    #[error("failed to parse JSON settings: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A `.env` file exists but is malformed.
    #[error("failed to load .env file: {0}")]
    DotenvError(#[from] dotenvy::Error),

    /// A setting has a value the pipeline cannot use.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// Dotted path of the setting.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A default response header is not a valid HTTP header.
    #[error("invalid default response header '{name}': {reason}")]
    InvalidHeader {
        /// Header name as written in the settings.
        name: String,
        /// Whether the name or the value was rejected.
        reason: &'static str,
    },

    /// An environment override could not be parsed.
    #[error("failed to parse environment variable {var}: {reason}")]
    EnvParseError {
        /// The environment variable name.
        var: String,
        /// What the variable should have contained.
        reason: String,
    },
}

impl ConfigError {
    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates a read error.
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Creates an unsupported format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid header error.
    pub fn invalid_header(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            reason,
        }
    }

    /// Creates an environment variable parse error.
    pub fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_display() {
        let err = ConfigError::invalid_value("errors.reason_phrase", "must not be empty");
        assert_eq!(
            err.to_string(),
            "invalid configuration value for errors.reason_phrase: must not be empty"
        );
    }

    #[test]
    fn test_invalid_header_display() {
        let err = ConfigError::invalid_header("x served by", "invalid header name");
        assert_eq!(
            err.to_string(),
            "invalid default response header 'x served by': invalid header name"
        );
    }

    #[test]
    fn test_unsupported_format_display() {
        let err = ConfigError::unsupported_format("yaml");
        assert_eq!(err.to_string(), "unsupported settings format: yaml");
    }

    #[test]
    fn test_read_error_keeps_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ConfigError::read_error("/etc/trellis/trellis.toml", io);
        assert!(err.to_string().contains("/etc/trellis/trellis.toml"));
        assert!(err.source().is_some());
    }
}
