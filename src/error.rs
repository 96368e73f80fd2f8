//! Error handling for cloudstat
//!
//! This module defines the crate-level error type and a Result alias.
//! Pipeline-internal failures live in `pipeline::error::PipelineError` and
//! convert into `CloudStatError` with `?`.

use crate::pipeline::error::PipelineError;
use thiserror::Error;

/// Main error type for cloudstat operations
#[derive(Error, Debug)]
pub enum CloudStatError {
    /// Errors raised while preparing or iterating a pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to pipeline descriptions
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<CloudStatError>,
    },
}

impl CloudStatError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        CloudStatError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The underlying pipeline error, looking through any context layers.
    pub fn pipeline_error(&self) -> Option<&PipelineError> {
        match self {
            CloudStatError::Pipeline(e) => Some(e),
            CloudStatError::WithContext { source, .. } => source.pipeline_error(),
            _ => None,
        }
    }
}

/// Result type alias for cloudstat operations
pub type Result<T> = std::result::Result<T, CloudStatError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| CloudStatError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| CloudStatError::from(e).with_context(f()))
    }
}
