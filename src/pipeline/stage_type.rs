//! Stage type enumeration for dynamic stage creation.
//!
//! This module defines the types of stages that can be created at runtime
//! from a pipeline description.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a stage originates points or transforms them in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Establishes the initial schema and fills buffers.
    Producer,
    /// Extends the schema and/or rewrites buffer contents.
    Transformer,
}

/// Types of stages that can be instantiated dynamically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageType {
    /// Synthetic point producer.
    #[serde(rename = "readers.faux")]
    FauxReader,
    /// Affine rescale that re-emits dimensions under its own namespace.
    #[serde(rename = "filters.rescale")]
    Rescale,
    /// Streaming per-dimension statistics.
    #[serde(rename = "filters.stats")]
    Stats,
}

impl StageType {
    /// Registered type name, also the default stage identity.
    pub fn type_name(&self) -> &'static str {
        match self {
            StageType::FauxReader => "readers.faux",
            StageType::Rescale => "filters.rescale",
            StageType::Stats => "filters.stats",
        }
    }

    /// Short human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            StageType::FauxReader => "Faux Reader",
            StageType::Rescale => "Rescale Filter",
            StageType::Stats => "Statistics Filter",
        }
    }

    pub fn kind(&self) -> StageKind {
        match self {
            StageType::FauxReader => StageKind::Producer,
            StageType::Rescale | StageType::Stats => StageKind::Transformer,
        }
    }

    /// Get all available stage types.
    pub fn all() -> &'static [StageType] {
        &[StageType::FauxReader, StageType::Rescale, StageType::Stats]
    }

    /// Look a stage type up by its type name.
    pub fn from_type_name(name: &str) -> Option<StageType> {
        Self::all().iter().copied().find(|t| t.type_name() == name)
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}
