//! Built-in pipeline stage implementations.

pub mod faux_reader;
pub mod rescale;
pub mod stats;

pub use faux_reader::{Bounds, FauxMode, FauxReader};
pub use rescale::RescaleFilter;
pub use stats::{StatsFilter, Summary};
