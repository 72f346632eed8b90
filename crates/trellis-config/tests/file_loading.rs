//! Loading settings files from disk.

use std::io::Write;

use tempfile::{Builder, NamedTempFile};
use trellis_config::{ConfigError, ConfigLoader, LogFormat};
use trellis_core::{Configuration, UnhandledErrorMode};

fn write_file(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn loads_toml_file() {
    let file = write_file(
        ".toml",
        r#"
[authentication]
fail_if_no_authenticators_apply = true
realm = "orders"

[errors]
show_details = true
unhandled = "propagate"

[response.default_headers]
x-served-by = "trellis"

[logging]
format = "pretty"
"#,
    );

    let loader = ConfigLoader::new().with_file(file.path()).unwrap();
    assert!(loader.file_loaded());
    let config = loader.load().unwrap();

    assert!(config.authentication.fail_if_no_authenticators_apply);
    assert_eq!(config.authentication.realm.as_deref(), Some("orders"));
    assert!(config.errors.show_details);
    assert_eq!(config.errors.unhandled, UnhandledErrorMode::Propagate);
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert_eq!(config.logging.level, "info");

    let mut runtime = Configuration::new();
    config.apply_to(&mut runtime).unwrap();
    assert_eq!(runtime.default_response_headers["x-served-by"], "trellis");
    assert_eq!(runtime.unhandled_errors, UnhandledErrorMode::Propagate);
}

#[test]
fn loads_json_file() {
    let file = write_file(
        ".json",
        r#"{"metrics": {"enabled": false}, "errors": {"reason_phrase": "Later"}}"#,
    );

    let config = ConfigLoader::new()
        .with_file(file.path())
        .unwrap()
        .load()
        .unwrap();

    assert!(!config.metrics.enabled);
    assert_eq!(config.errors.reason_phrase, "Later");
}

#[test]
fn rejects_unknown_fields() {
    let file = write_file(".toml", "[errors]\nshow_detail = true\n");

    let result = ConfigLoader::new().with_file(file.path());
    assert!(matches!(result, Err(ConfigError::TomlError(_))));
}

#[test]
fn rejects_unsupported_extension() {
    let file = write_file(".yaml", "errors: {}\n");

    let result = ConfigLoader::new().with_file(file.path());
    assert!(matches!(result, Err(ConfigError::UnsupportedFormat { .. })));
}

#[test]
fn missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trellis.toml");

    let result = ConfigLoader::new().with_file(&path);
    assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));

    let loader = ConfigLoader::new().with_optional_file(&path).unwrap();
    assert!(!loader.file_loaded());
}

#[test]
fn invalid_values_fail_validation() {
    let file = write_file(".toml", "[errors]\nreason_phrase = \"\"\n");

    let loader = ConfigLoader::new().with_file(file.path()).unwrap();
    let result = loader.load();
    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}
