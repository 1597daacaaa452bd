//! Configuration validation.
//!
//! Serde handles syntax; this module checks that the enabled listeners can
//! actually be started. Every violation is reported, not just the first.

use std::fmt;

use crate::config::schema::{HttpdConfig, ListenerConfig, TlsListenerConfig, UnixListenerConfig};
use crate::net::Scheme;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a loaded configuration.
pub fn validate_config(config: &HttpdConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.cleanup_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "cleanup_timeout_secs",
            "must be greater than zero",
        ));
    }

    let schemes = config.enabled_schemes();
    if schemes.contains(&Scheme::Unix) {
        check_unix("unix", &config.unix, &mut errors);
    }
    if schemes.contains(&Scheme::Https) {
        check_tls("tls", &config.tls, &mut errors);
    }

    for (i, listener) in config.admin.iter().enumerate() {
        let field = format!("admin[{i}]");
        match listener {
            ListenerConfig::Unix(unix) => check_unix(&field, unix, &mut errors),
            ListenerConfig::Http(_) => {}
            ListenerConfig::Https(tls) => check_tls(&field, tls, &mut errors),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_unix(field: &str, unix: &UnixListenerConfig, errors: &mut Vec<ValidationError>) {
    if unix.socket_path.as_os_str().is_empty() {
        errors.push(ValidationError::new(
            format!("{field}.socket_path"),
            "required when the unix scheme is enabled",
        ));
    }
}

fn check_tls(field: &str, tls: &TlsListenerConfig, errors: &mut Vec<ValidationError>) {
    if tls.certificate.as_os_str().is_empty() {
        errors.push(ValidationError::new(
            format!("{field}.certificate"),
            "required when the https scheme is enabled",
        ));
    }
    if tls.certificate_key.as_os_str().is_empty() {
        errors.push(ValidationError::new(
            format!("{field}.certificate_key"),
            "required when the https scheme is enabled",
        ));
    }
}
