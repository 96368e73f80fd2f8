//! # cloudstat: streaming point-cloud statistics
//!
//! A pull-driven point-cloud pipeline. A producer stage emits points in
//! fixed-capacity chunks, transformer stages rewrite or observe each chunk,
//! and a statistics stage folds count/min/max/mean per dimension in a single
//! pass with memory bounded by the chunk size.
//!
//! ## Architecture
//!
//! - **Schema**: dimensions registered by stages at prepare, namespaced by
//!   the stage that produced them
//! - **PointBuffer**: one chunk of point records laid out by the frozen schema
//! - **Pipeline**: the stage chain, driven by a `SequentialIterator`
//! - **Metadata**: a hierarchical key/value tree stages publish into
//!
//! ## Configuration
//!
//! Pipelines are described in TOML (see [`config::PipelineConfig`]):
//!
//! ```toml
//! chunk_size = 4096
//!
//! [[stages]]
//! type = "readers.faux"
//! options = { num_points = 1000, bounds = "([1, 101], [2, 102], [3, 103])" }
//!
//! [[stages]]
//! type = "filters.stats"
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use cloudstat::pipeline::{FauxReader, PipelineBuilder, StageId, StatsFilter};
//!
//! let mut pipeline = PipelineBuilder::new()
//!     .stage(FauxReader::new(1000))
//!     .stage(StatsFilter::new().with_dimensions(&["X", "Y", "Z"]))
//!     .build_prepared()?;
//!
//! cloudstat::inspect::scan(&mut pipeline)?;
//!
//! let stats = pipeline.stats(StageId(1)).unwrap();
//! let x = stats.get_stats(pipeline.schema(), "X")?;
//! println!("X: {} points, mean {}", x.count(), x.average());
//! ```

pub mod config;
pub mod error;
pub mod inspect;
pub mod pipeline;

// Re-export commonly used types
pub use config::{Options, PipelineConfig, StageConfig};
pub use error::{CloudStatError, Result, ResultExt};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineError, PointBuffer, Schema};
