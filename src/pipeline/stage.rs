//! Stage abstraction for the pipeline.
//!
//! Two-layer design:
//! - **`StagePlugin` trait**: the lifecycle contract every stage implements,
//!   and the extension point for user-defined stages.
//! - **`BuiltinStage` enum**: for all built-in stages. Match arms inline on
//!   the per-chunk path and give typed access to e.g. the stats results.
//!
//! `AnyStage` wraps either variant so the pipeline can handle both uniformly.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized --prepare--> Prepared --iter--> Iterating --done--> Done
//! ```
//!
//! `prepare` may register dimensions and contribute metadata but never sees
//! point data. Producers then answer `read`/`skip`/`at_end`; transformers
//! rewrite each chunk in `filter`. `done` runs once after the last read.

use crate::pipeline::buffer::PointBuffer;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::metadata::MetadataTree;
use crate::pipeline::schema::Schema;
use crate::pipeline::stage_type::StageKind;
use crate::pipeline::stages::{FauxReader, RescaleFilter, StatsFilter};

/// Lifecycle state of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Uninitialized,
    Prepared,
    Iterating,
    Done,
}

/// Context passed to `prepare` and `done`.
pub struct StageContext<'a> {
    /// Schema built so far. Frozen by the time `done` runs.
    pub schema: &'a mut Schema,
    /// Shared metadata tree.
    pub metadata: &'a mut MetadataTree,
}

/// Trait implemented by every stage.
pub trait StagePlugin: Send {
    /// Stage identity; namespace of the dimensions it registers.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    fn kind(&self) -> StageKind;

    /// Register dimensions and allocate internal state. Called exactly once.
    fn prepare(&mut self, ctx: &mut StageContext) -> PipelineResult<()>;

    /// Preferred number of points per read (producers only).
    fn chunk_size(&self) -> Option<usize> {
        None
    }

    /// Total number of points, if known up front (producers only).
    fn num_points(&self) -> Option<u64> {
        None
    }

    /// Fill `buf` with up to `max` points starting at index 0 and return the
    /// count written. `0` means exhausted (producers only).
    fn read(&mut self, _buf: &mut PointBuffer, _max: usize) -> PipelineResult<usize> {
        Ok(0)
    }

    /// Advance past up to `n` points without producing them. Returns the
    /// number actually skipped (producers only).
    fn skip(&mut self, _n: u64) -> u64 {
        0
    }

    /// True once no more points remain (producers only).
    fn at_end(&self) -> bool {
        true
    }

    /// Transform the valid points of `buf` in place (transformers only).
    fn filter(&mut self, _buf: &mut PointBuffer) -> PipelineResult<()> {
        Ok(())
    }

    /// Finalize and release resources. Called exactly once.
    fn done(&mut self, _ctx: &mut StageContext) -> PipelineResult<()> {
        Ok(())
    }
}

/// Enum dispatch for built-in stages.
pub enum BuiltinStage {
    FauxReader(FauxReader),
    Rescale(RescaleFilter),
    Stats(StatsFilter),
}

macro_rules! dispatch {
    ($self:expr, $s:ident => $body:expr) => {
        match $self {
            BuiltinStage::FauxReader($s) => $body,
            BuiltinStage::Rescale($s) => $body,
            BuiltinStage::Stats($s) => $body,
        }
    };
}

impl StagePlugin for BuiltinStage {
    fn name(&self) -> &str {
        dispatch!(self, s => s.name())
    }

    fn description(&self) -> &str {
        dispatch!(self, s => s.description())
    }

    fn kind(&self) -> StageKind {
        dispatch!(self, s => s.kind())
    }

    fn prepare(&mut self, ctx: &mut StageContext) -> PipelineResult<()> {
        dispatch!(self, s => s.prepare(ctx))
    }

    fn chunk_size(&self) -> Option<usize> {
        dispatch!(self, s => s.chunk_size())
    }

    fn num_points(&self) -> Option<u64> {
        dispatch!(self, s => s.num_points())
    }

    #[inline]
    fn read(&mut self, buf: &mut PointBuffer, max: usize) -> PipelineResult<usize> {
        dispatch!(self, s => s.read(buf, max))
    }

    fn skip(&mut self, n: u64) -> u64 {
        dispatch!(self, s => s.skip(n))
    }

    fn at_end(&self) -> bool {
        dispatch!(self, s => s.at_end())
    }

    #[inline]
    fn filter(&mut self, buf: &mut PointBuffer) -> PipelineResult<()> {
        dispatch!(self, s => s.filter(buf))
    }

    fn done(&mut self, ctx: &mut StageContext) -> PipelineResult<()> {
        dispatch!(self, s => s.done(ctx))
    }
}

/// Wrapper that holds either a built-in stage (enum dispatch) or a plugin (trait object).
pub enum AnyStage {
    Builtin(BuiltinStage),
    Plugin(Box<dyn StagePlugin>),
}

impl AnyStage {
    pub fn plugin(stage: impl StagePlugin + 'static) -> Self {
        AnyStage::Plugin(Box::new(stage))
    }

    fn inner(&self) -> &dyn StagePlugin {
        match self {
            AnyStage::Builtin(s) => s as &dyn StagePlugin,
            AnyStage::Plugin(s) => s.as_ref(),
        }
    }

    fn inner_mut(&mut self) -> &mut dyn StagePlugin {
        match self {
            AnyStage::Builtin(s) => s as &mut dyn StagePlugin,
            AnyStage::Plugin(s) => s.as_mut(),
        }
    }

    pub fn name(&self) -> &str {
        self.inner().name()
    }

    pub fn description(&self) -> &str {
        self.inner().description()
    }

    pub fn kind(&self) -> StageKind {
        self.inner().kind()
    }

    pub fn prepare(&mut self, ctx: &mut StageContext) -> PipelineResult<()> {
        self.inner_mut().prepare(ctx)
    }

    pub fn chunk_size(&self) -> Option<usize> {
        self.inner().chunk_size()
    }

    pub fn num_points(&self) -> Option<u64> {
        self.inner().num_points()
    }

    pub fn read(&mut self, buf: &mut PointBuffer, max: usize) -> PipelineResult<usize> {
        match self {
            AnyStage::Builtin(s) => s.read(buf, max),
            AnyStage::Plugin(s) => s.read(buf, max),
        }
    }

    pub fn skip(&mut self, n: u64) -> u64 {
        self.inner_mut().skip(n)
    }

    pub fn at_end(&self) -> bool {
        self.inner().at_end()
    }

    pub fn filter(&mut self, buf: &mut PointBuffer) -> PipelineResult<()> {
        match self {
            AnyStage::Builtin(s) => s.filter(buf),
            AnyStage::Plugin(s) => s.filter(buf),
        }
    }

    pub fn done(&mut self, ctx: &mut StageContext) -> PipelineResult<()> {
        self.inner_mut().done(ctx)
    }

    /// The stats filter inside, if this is one.
    pub fn as_stats(&self) -> Option<&StatsFilter> {
        match self {
            AnyStage::Builtin(BuiltinStage::Stats(s)) => Some(s),
            _ => None,
        }
    }

    /// The faux reader inside, if this is one.
    pub fn as_faux_reader(&self) -> Option<&FauxReader> {
        match self {
            AnyStage::Builtin(BuiltinStage::FauxReader(s)) => Some(s),
            _ => None,
        }
    }
}

impl From<FauxReader> for AnyStage {
    fn from(s: FauxReader) -> Self {
        AnyStage::Builtin(BuiltinStage::FauxReader(s))
    }
}

impl From<RescaleFilter> for AnyStage {
    fn from(s: RescaleFilter) -> Self {
        AnyStage::Builtin(BuiltinStage::Rescale(s))
    }
}

impl From<StatsFilter> for AnyStage {
    fn from(s: StatsFilter) -> Self {
        AnyStage::Builtin(BuiltinStage::Stats(s))
    }
}

impl std::fmt::Debug for AnyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyStage")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}
