//! Error types for call-graph analysis.

use thiserror::Error;

/// Errors reported by configuration parsing and result output.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown value for `icall-analysis-type`.
    #[error(
        "unknown indirect-call analysis kind '{0}' \
         (expected signature, multilayer, dataflow-enhanced or pointer-flow)"
    )]
    UnknownAnalysisKind(String),

    /// `max-type-layer` must allow at least one layer.
    #[error("max-type-layer must be at least 1, got {0}")]
    InvalidLayerLimit(usize),

    /// Malformed configuration document.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Writing the result dump failed.
    #[error("failed to write results: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for analysis operations.
pub type Result<T> = std::result::Result<T, Error>;
