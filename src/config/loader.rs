//! Configuration loading from disk and the environment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::HttpdConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{key} is not a valid number: {value:?}")]
    Env { key: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from a TOML file, apply environment overrides and validate.
pub fn load_config(path: &Path) -> Result<HttpdConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: HttpdConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

/// Apply listener overrides from the environment.
///
/// `lookup` resolves a variable name; empty values count as unset.
pub fn apply_env_overrides<F>(config: &mut HttpdConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(host) = get("HOST") {
        config.http.host = host;
    }
    if let Some(port) = parse_port(&get, "PORT")? {
        config.http.port = port;
    }
    if let Some(host) = get("TLS_HOST") {
        config.tls.host = host;
    }
    if let Some(port) = parse_port(&get, "TLS_PORT")? {
        config.tls.port = port;
    }
    if let Some(path) = get("TLS_CERTIFICATE") {
        config.tls.certificate = PathBuf::from(path);
    }
    if let Some(path) = get("TLS_PRIVATE_KEY") {
        config.tls.certificate_key = PathBuf::from(path);
    }
    if let Some(path) = get("TLS_CA_CERTIFICATE") {
        config.tls.ca_certificate = Some(PathBuf::from(path));
    }

    Ok(())
}

fn parse_port(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u16>, ConfigError> {
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { key, value }),
        None => Ok(None),
    }
}
