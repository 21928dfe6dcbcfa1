//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use wpas_config::ConfigError;
use wpas_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration is invalid ({count} problem(s))")]
    #[diagnostic(
        code(wpas::invalid_config),
        help("Fix the problems listed above in {path}")
    )]
    InvalidConfig { count: usize, path: String },

    #[error("No passphrase configured for network '{network}'")]
    #[diagnostic(
        code(wpas::no_credentials),
        help(
            "Set `passphrase`, `passphrase_env`, or `psk` for the network,\n\
             or store it in the keyring under service 'wpas', user '{network}/psk'."
        )
    )]
    NoCredentials { network: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(wpas::config))]
    Config { message: String },

    // ── Input ────────────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(wpas::validation))]
    Validation { field: String, reason: String },

    #[error("Could not read {path}")]
    #[diagnostic(code(wpas::io), help("Check that the file exists and is readable."))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    #[diagnostic(code(wpas::json), help("Check the JSON file contents and try again."))]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    // ── State machine ────────────────────────────────────────────────
    #[error("{resource} '{identifier}' not found")]
    #[diagnostic(code(wpas::not_found))]
    NotFound {
        resource: String,
        identifier: String,
    },

    #[error("Operation not supported: {operation}")]
    #[diagnostic(code(wpas::unsupported))]
    Unsupported { operation: String },

    #[error("{message}")]
    #[diagnostic(code(wpas::rejected))]
    Rejected { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidConfig { .. } | Self::NoCredentials { .. } | Self::Config { .. } => {
                exit_code::CONFIG
            }
            Self::Validation { .. } | Self::Json { .. } => exit_code::USAGE,
            Self::NotFound { .. } | Self::Read { .. } => exit_code::NOT_FOUND,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::Rejected { .. } | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials { network } => Self::NoCredentials { network },
            other => Self::Config {
                message: other.to_string(),
            },
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProfileNotFound { id } => Self::NotFound {
                resource: "network".into(),
                identifier: id.to_string(),
            },
            CoreError::BssNotFound { bssid } => Self::NotFound {
                resource: "BSS".into(),
                identifier: bssid.to_string(),
            },
            CoreError::InterfaceNotFound { name } | CoreError::BssNameNotFound { name } => {
                Self::NotFound {
                    resource: "interface".into(),
                    identifier: name,
                }
            }
            CoreError::Unsupported { operation } => Self::Unsupported { operation },
            CoreError::WpsDisabled => Self::Unsupported {
                operation: "WPS (disabled in configuration)".into(),
            },
            CoreError::InvalidMac { input } => Self::Validation {
                field: "MAC address".into(),
                reason: format!("'{input}' is not a MAC address"),
            },
            CoreError::ValidationFailed { message } => Self::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Config { message } => Self::Config { message },
            other => Self::Rejected {
                message: other.to_string(),
            },
        }
    }
}
