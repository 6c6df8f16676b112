//! Error types for the Resonance engine.
//!
//! The simulation itself has no failure path: every draw is clamped and every
//! buffer is bounded. Errors only arise at the edges (loading configuration,
//! talking to a runtime whose driver task has gone away).

use thiserror::Error;

/// Errors surfaced by the engine's outer API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The driver task has been disposed (or panicked out of its loop)
    #[error("Engine runtime is closed")]
    Closed,

    /// The command panicked on the driver task; the engine keeps running
    #[error("Engine command panicked")]
    CommandPanicked,

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Writing an export or report failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading or validating an [`EngineConfig`](crate::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the configuration file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid configuration JSON
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of its permitted range
    #[error("Invalid value for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl ConfigError {
    /// Creates an invalid-field error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
