//! Pipeline-specific error types.

use thiserror::Error;

/// Errors that can occur within the pipeline system.
///
/// Misuse of the stage lifecycle (preparing twice, reading before prepare,
/// overrunning a buffer) is a programming error and panics instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Unknown dimension: {name}")]
    UnknownDimension { name: String },

    #[error("Dimension {name} is already registered")]
    DuplicateDimension { name: String },

    #[error("Schema is frozen, cannot register {name}")]
    SchemaFrozen { name: String },

    #[error("Metadata {path} is already set")]
    MetadataExists { path: String },

    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    #[error("Stage {stage}: invalid option '{key}': {message}")]
    InvalidOption {
        stage: String,
        key: String,
        message: String,
    },

    #[error("Stage {stage} error: {message}")]
    Stage { stage: String, message: String },

    #[error("Problem reading point number {index}: requested {requested}, got {returned}")]
    ShortRead {
        index: u64,
        requested: usize,
        returned: usize,
    },
}

impl PipelineError {
    pub fn unknown_dimension(name: impl Into<String>) -> Self {
        PipelineError::UnknownDimension { name: name.into() }
    }

    pub fn invalid_option(
        stage: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        PipelineError::InvalidOption {
            stage: stage.into(),
            key: key.into(),
            message: message.into(),
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
