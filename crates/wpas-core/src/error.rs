// ── Core error types ──
//
// Errors surfaced by collaborators and by the AP lifecycle operations.
// The station dispatcher never propagates these to its caller: every
// driver-facing failure is turned into a retry, a state change, or a
// notification. Callers of the public operations see them as `Result`s.

use thiserror::Error;

use crate::model::MacAddr;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Driver errors ────────────────────────────────────────────────
    #[error("Driver operation '{operation}' failed: {reason}")]
    Driver { operation: String, reason: String },

    #[error("Scan results unavailable: {reason}")]
    ScanResultsUnavailable { reason: String },

    #[error("Operation not supported by driver: {operation}")]
    Unsupported { operation: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Network profile not found: {id}")]
    ProfileNotFound { id: u32 },

    #[error("BSS not found: {bssid}")]
    BssNotFound { bssid: MacAddr },

    #[error("Interface not found: {name}")]
    InterfaceNotFound { name: String },

    #[error("BSS '{name}' not found on interface")]
    BssNameNotFound { name: String },

    // ── Parse errors ─────────────────────────────────────────────────
    #[error("Malformed information element: {reason}")]
    MalformedIe { reason: String },

    #[error("Invalid MAC address: {input}")]
    InvalidMac { input: String },

    // ── WPS errors ───────────────────────────────────────────────────
    #[error("WPS is disabled in configuration")]
    WpsDisabled,

    #[error("Invalid WPS credential: {reason}")]
    InvalidCredential { reason: String },

    #[error("WPS registrar operation requires a PIN")]
    PinRequired,

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation rejected: {message}")]
    Rejected { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a failed driver command.
    pub fn driver(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Driver {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}
