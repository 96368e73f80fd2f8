//! Stage-based point-cloud pipeline.
//!
//! Points flow in chunks through a linear chain of stages: one producer
//! (a reader) followed by any number of transformers (filters). The caller
//! pulls chunks through the chain with a `SequentialIterator`.
//!
//! # Architecture
//!
//! ```text
//! [readers.faux] ──► [filters.rescale] ──► [filters.stats]
//!        │                  │                    │
//!        └──────── Schema (dimensions) ──────────┘
//!        └──────── MetadataTree ─────────────────┘
//! ```
//!
//! # Design
//!
//! - **Enum dispatch on hot path**: `BuiltinStage` enum for all built-in stages.
//! - **Fixed-layout chunks**: `PointBuffer` stores point records laid out by the frozen `Schema`.
//! - **Namespaced dimensions**: every dimension is keyed `<stage>.<name>`;
//!   bare names resolve to the most downstream producer.
//! - **Metadata tree**: flat `Vec<MetadataNode>` with `MetaId` as array index.

pub mod buffer;
pub mod error;
pub mod executor;
pub mod id;
pub mod metadata;
pub mod schema;
pub mod stage;
pub mod stage_type;
pub mod stages;

pub use buffer::PointBuffer;
pub use error::{PipelineError, PipelineResult};
pub use executor::{Cursor, Pipeline, PipelineBuilder, SequentialIterator, StageFactory, StageSlot};
pub use id::{DimId, MetaId, StageId};
pub use metadata::{MetadataNode, MetadataTree, MetadataValue, PATH_SEPARATOR};
pub use schema::{DimType, Dimension, Schema};
pub use stage::{AnyStage, BuiltinStage, StageContext, StagePlugin, StageState};
pub use stage_type::{StageKind, StageType};
pub use stages::{Bounds, FauxMode, FauxReader, RescaleFilter, StatsFilter, Summary};
