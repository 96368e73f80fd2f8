//! Pipeline executor: stage chain, preparation and the pull-driven iterator.
//!
//! The pipeline owns every stage in one append-only `Vec`. Stage `k`'s
//! upstream is stage `k - 1`; stage 0 is the only producer. Branches and
//! cycles cannot be expressed.
//!
//! Each `read`:
//! 1. Clear the caller's buffer.
//! 2. Let the producer fill up to `max` points.
//! 3. Run every transformer over the chunk, upstream first.
//! 4. Advance the cursor.
//!
//! A chunk passes through the whole chain before `read` returns; nothing is
//! buffered between stages. Memory is bounded by the caller's buffer.

use crate::config::{Options, DEFAULT_CHUNK_SIZE};
use crate::pipeline::buffer::PointBuffer;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::StageId;
use crate::pipeline::metadata::MetadataTree;
use crate::pipeline::schema::Schema;
use crate::pipeline::stage::{AnyStage, StageContext, StageState};
use crate::pipeline::stage_type::{StageKind, StageType};
use crate::pipeline::stages::{FauxReader, RescaleFilter, StatsFilter};

/// A slot holding a stage and its lifecycle state.
#[derive(Debug)]
pub struct StageSlot {
    pub stage: AnyStage,
    pub state: StageState,
}

impl StageSlot {
    pub fn new(stage: AnyStage) -> Self {
        Self {
            stage,
            state: StageState::Uninitialized,
        }
    }
}

/// Logical read position of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    /// Points consumed so far, read or skipped.
    pub position: u64,
    /// Set once a read returned zero points.
    pub exhausted: bool,
}

/// The stage chain and its shared schema/metadata.
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<StageSlot>,
    schema: Schema,
    metadata: MetadataTree,
    chunk_size: Option<usize>,
    cursor: Cursor,
    prepare_called: bool,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            schema: Schema::new(),
            metadata: MetadataTree::new(),
            chunk_size: None,
            cursor: Cursor::default(),
            prepare_called: false,
        }
    }

    // ── Graph building ──

    /// Append a stage downstream of the current tail. Returns its StageId.
    pub fn add_stage(&mut self, stage: impl Into<AnyStage>) -> PipelineResult<StageId> {
        assert!(
            !self.prepare_called,
            "stages cannot be added after prepare"
        );
        let stage = stage.into();
        match (self.stages.is_empty(), stage.kind()) {
            (true, StageKind::Producer) | (false, StageKind::Transformer) => {}
            (true, StageKind::Transformer) => {
                return Err(PipelineError::InvalidTopology(format!(
                    "first stage '{}' must be a producer",
                    stage.name()
                )));
            }
            (false, StageKind::Producer) => {
                return Err(PipelineError::InvalidTopology(format!(
                    "producer '{}' cannot have an upstream stage",
                    stage.name()
                )));
            }
        }

        if let Some(existing) = self.find_stage(stage.name()) {
            return Err(PipelineError::InvalidTopology(format!(
                "stage name '{}' is already used by {:?}",
                stage.name(),
                existing
            )));
        }

        let id = StageId(self.stages.len() as u32);
        tracing::debug!("Added stage '{}' as {:?}", stage.name(), id);
        self.stages.push(StageSlot::new(stage));
        Ok(id)
    }

    /// Override the producer's chunk size hint.
    pub fn set_chunk_size(&mut self, chunk_size: usize) {
        assert!(chunk_size > 0, "chunk size must be positive");
        self.chunk_size = Some(chunk_size);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    // ── Lifecycle ──

    /// Prepare every stage, upstream first. Must be called exactly once.
    ///
    /// The first failing stage aborts preparation; no stage has seen point
    /// data at that point.
    pub fn prepare(&mut self) -> PipelineResult<()> {
        assert!(!self.prepare_called, "pipeline prepared twice");
        self.prepare_called = true;

        if self.stages.is_empty() {
            return Err(PipelineError::InvalidTopology(
                "pipeline has no stages".to_string(),
            ));
        }

        for slot in &mut self.stages {
            let mut ctx = StageContext {
                schema: &mut self.schema,
                metadata: &mut self.metadata,
            };
            if let Err(e) = slot.stage.prepare(&mut ctx) {
                tracing::warn!("Stage '{}' failed to prepare: {}", slot.stage.name(), e);
                return Err(e);
            }
            slot.state = StageState::Prepared;
        }

        tracing::info!(
            "Pipeline prepared: {} stages, {} dimensions ({} bytes/point)",
            self.stages.len(),
            self.schema.len(),
            self.schema.point_size()
        );
        Ok(())
    }

    /// True once every stage prepared successfully.
    pub fn is_prepared(&self) -> bool {
        !self.stages.is_empty()
            && self
                .stages
                .iter()
                .all(|s| s.state != StageState::Uninitialized)
    }

    /// Start (or resume) sequential iteration. Freezes the schema.
    pub fn iter(&mut self) -> SequentialIterator<'_> {
        for slot in &mut self.stages {
            match slot.state {
                StageState::Uninitialized => {
                    panic!("stage '{}' iterated before prepare", slot.stage.name())
                }
                StageState::Done => panic!("pipeline iterated after done"),
                StageState::Prepared | StageState::Iterating => {
                    slot.state = StageState::Iterating;
                }
            }
        }
        assert!(!self.stages.is_empty(), "pipeline has no stages");
        self.schema.freeze();
        SequentialIterator { pipeline: self }
    }

    /// Finalize every stage, upstream first. Must be called exactly once,
    /// after the last read.
    pub fn done(&mut self) -> PipelineResult<()> {
        for slot in &self.stages {
            match slot.state {
                StageState::Uninitialized => {
                    panic!("stage '{}' finalized before prepare", slot.stage.name())
                }
                StageState::Done => panic!("pipeline finalized twice"),
                _ => {}
            }
        }
        self.schema.freeze();

        for slot in &mut self.stages {
            let mut ctx = StageContext {
                schema: &mut self.schema,
                metadata: &mut self.metadata,
            };
            slot.stage.done(&mut ctx)?;
            slot.state = StageState::Done;
        }

        tracing::info!(
            "Pipeline done after {} points",
            self.cursor.position
        );
        Ok(())
    }

    // ── Introspection ──

    /// Points per read: the explicit override, else the producer's hint,
    /// else `DEFAULT_CHUNK_SIZE`.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
            .or_else(|| self.producer().and_then(|p| p.chunk_size()))
            .unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn metadata(&self) -> &MetadataTree {
        &self.metadata
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Total points the producer will emit, if it knows.
    pub fn num_points(&self) -> Option<u64> {
        self.producer().and_then(|p| p.num_points())
    }

    fn producer(&self) -> Option<&AnyStage> {
        self.stages.first().map(|s| &s.stage)
    }

    pub fn stage(&self, id: StageId) -> Option<&AnyStage> {
        self.stages.get(id.index()).map(|s| &s.stage)
    }

    pub fn state(&self, id: StageId) -> Option<StageState> {
        self.stages.get(id.index()).map(|s| s.state)
    }

    /// The stage with identity `name`. Identities are unique per pipeline.
    pub fn find_stage(&self, name: &str) -> Option<StageId> {
        self.stages
            .iter()
            .position(|s| s.stage.name() == name)
            .map(|i| StageId(i as u32))
    }

    /// The stats filter at `id`, if that stage is one.
    pub fn stats(&self, id: StageId) -> Option<&StatsFilter> {
        self.stage(id).and_then(AnyStage::as_stats)
    }

    pub fn stages(&self) -> impl Iterator<Item = (StageId, &AnyStage)> {
        self.stages
            .iter()
            .enumerate()
            .map(|(i, s)| (StageId(i as u32), &s.stage))
    }
}

/// Pull-driven iterator over a prepared pipeline.
///
/// Holds the pipeline mutably, so the stage chain cannot change while
/// chunks are flowing.
pub struct SequentialIterator<'a> {
    pipeline: &'a mut Pipeline,
}

impl SequentialIterator<'_> {
    pub fn schema(&self) -> &Schema {
        &self.pipeline.schema
    }

    /// Hint for how many points a single read should attempt.
    pub fn chunk_size(&self) -> usize {
        self.pipeline.chunk_size()
    }

    pub fn cursor(&self) -> Cursor {
        self.pipeline.cursor
    }

    pub fn position(&self) -> u64 {
        self.pipeline.cursor.position
    }

    /// True once the producer is exhausted.
    pub fn at_end(&self) -> bool {
        self.pipeline.cursor.exhausted
            || self.pipeline.producer().map_or(true, |p| p.at_end())
    }

    /// A buffer of `chunk_size()` points laid out for this pipeline.
    pub fn allocate_buffer(&self) -> PointBuffer {
        PointBuffer::new(&self.pipeline.schema, self.chunk_size())
    }

    /// Advance past up to `n` points without reading or transforming them.
    /// Returns the number actually skipped.
    pub fn skip(&mut self, n: u64) -> u64 {
        let Some(producer) = self.pipeline.stages.first_mut() else {
            return 0;
        };
        let skipped = producer.stage.skip(n);
        self.pipeline.cursor.position += skipped;
        tracing::debug!(
            "Skipped {} of {} points (cursor at {})",
            skipped,
            n,
            self.pipeline.cursor.position
        );
        skipped
    }

    /// Pull up to `max` points through the whole chain into `buf`.
    ///
    /// Returns the number of valid points; `0` means the source is
    /// exhausted. Fewer points than requested is not an error.
    pub fn read(&mut self, buf: &mut PointBuffer, max: usize) -> PipelineResult<usize> {
        let max = max.min(buf.capacity());
        buf.clear();
        if max == 0 {
            return Ok(0);
        }

        let Some((producer, transformers)) = self.pipeline.stages.split_first_mut() else {
            return Ok(0);
        };

        let n = producer.stage.read(buf, max)?;
        assert!(
            n <= max,
            "producer '{}' returned {} points for a read of {}",
            producer.stage.name(),
            n,
            max
        );
        buf.set_len(n);
        if n == 0 {
            self.pipeline.cursor.exhausted = true;
            tracing::debug!(
                "Source exhausted at {} points",
                self.pipeline.cursor.position
            );
            return Ok(0);
        }
        self.pipeline.cursor.position += n as u64;

        for slot in transformers {
            slot.stage.filter(buf)?;
        }

        tracing::debug!(
            "Read {} points (cursor at {})",
            n,
            self.pipeline.cursor.position
        );
        Ok(n)
    }

    /// Read as many points as `buf` holds.
    pub fn read_chunk(&mut self, buf: &mut PointBuffer) -> PipelineResult<usize> {
        let max = buf.capacity();
        self.read(buf, max)
    }

    /// End iteration and finalize every stage.
    pub fn finish(self) -> PipelineResult<()> {
        self.pipeline.done()
    }
}

/// Fluent construction of a linear pipeline.
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<AnyStage>,
    chunk_size: Option<usize>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage downstream of the previous one.
    pub fn stage(mut self, stage: impl Into<AnyStage>) -> Self {
        self.stages.push(stage.into());
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Assemble the pipeline, checking the topology. Stages stay unprepared.
    pub fn build(self) -> PipelineResult<Pipeline> {
        let mut pipeline = Pipeline::new();
        if let Some(chunk_size) = self.chunk_size {
            if chunk_size == 0 {
                return Err(PipelineError::InvalidTopology(
                    "chunk size must be positive".to_string(),
                ));
            }
            pipeline.set_chunk_size(chunk_size);
        }
        for stage in self.stages {
            pipeline.add_stage(stage)?;
        }
        Ok(pipeline)
    }

    /// Assemble and prepare in one step.
    pub fn build_prepared(self) -> PipelineResult<Pipeline> {
        let mut pipeline = self.build()?;
        pipeline.prepare()?;
        Ok(pipeline)
    }
}

/// Factory for creating stages from a type and options.
pub struct StageFactory;

impl StageFactory {
    /// Create a stage, optionally overriding its identity.
    pub fn create(
        stage_type: StageType,
        name: Option<&str>,
        options: &Options,
    ) -> PipelineResult<AnyStage> {
        let stage: AnyStage = match stage_type {
            StageType::FauxReader => {
                let reader = FauxReader::from_options(options)?;
                match name {
                    Some(n) => reader.with_name(n).into(),
                    None => reader.into(),
                }
            }
            StageType::Rescale => {
                let filter = RescaleFilter::from_options(options)?;
                match name {
                    Some(n) => filter.with_name(n).into(),
                    None => filter.into(),
                }
            }
            StageType::Stats => {
                let filter = StatsFilter::from_options(options)?;
                match name {
                    Some(n) => filter.with_name(n).into(),
                    None => filter.into(),
                }
            }
        };
        Ok(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::{Bounds, FauxMode};

    fn ramp_pipeline(num_points: u64) -> Pipeline {
        PipelineBuilder::new()
            .stage(
                FauxReader::new(num_points)
                    .with_mode(FauxMode::Ramp)
                    .with_bounds(Bounds::new(0.0, 0.0, 0.0, (num_points - 1) as f64, 1.0, 1.0)),
            )
            .stage(StatsFilter::new())
            .chunk_size(4)
            .build_prepared()
            .unwrap()
    }

    #[test]
    fn test_topology_requires_producer_first() {
        let mut pipeline = Pipeline::new();
        assert!(matches!(
            pipeline.add_stage(StatsFilter::new()),
            Err(PipelineError::InvalidTopology(_))
        ));
        pipeline.add_stage(FauxReader::new(1)).unwrap();
        assert!(matches!(
            pipeline.add_stage(FauxReader::new(1)),
            Err(PipelineError::InvalidTopology(_))
        ));
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_prepare_empty_pipeline_fails() {
        let mut pipeline = Pipeline::new();
        assert!(matches!(
            pipeline.prepare(),
            Err(PipelineError::InvalidTopology(_))
        ));
    }

    #[test]
    fn test_states_follow_lifecycle() {
        let mut pipeline = PipelineBuilder::new()
            .stage(FauxReader::new(3))
            .stage(StatsFilter::new())
            .build()
            .unwrap();
        assert_eq!(pipeline.state(StageId(1)), Some(StageState::Uninitialized));

        pipeline.prepare().unwrap();
        assert!(pipeline.is_prepared());
        assert_eq!(pipeline.state(StageId(0)), Some(StageState::Prepared));

        let mut iter = pipeline.iter();
        let mut buf = iter.allocate_buffer();
        while iter.read_chunk(&mut buf).unwrap() > 0 {}
        iter.finish().unwrap();

        assert_eq!(pipeline.state(StageId(0)), Some(StageState::Done));
        assert_eq!(pipeline.state(StageId(1)), Some(StageState::Done));
        assert!(pipeline.schema().is_frozen());
    }

    #[test]
    fn test_read_in_chunks() {
        let mut pipeline = ramp_pipeline(10);
        let mut iter = pipeline.iter();
        assert_eq!(iter.chunk_size(), 4);
        let mut buf = iter.allocate_buffer();

        let mut sizes = Vec::new();
        loop {
            let n = iter.read_chunk(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            sizes.push(n);
        }
        assert_eq!(sizes, vec![4, 4, 2]);
        assert!(iter.at_end());
        assert_eq!(iter.cursor(), Cursor { position: 10, exhausted: true });
    }

    #[test]
    fn test_read_clamps_to_capacity() {
        let mut pipeline = ramp_pipeline(10);
        let mut iter = pipeline.iter();
        let mut buf = PointBuffer::new(iter.schema(), 3);
        assert_eq!(iter.read(&mut buf, 100).unwrap(), 3);
        assert_eq!(iter.read(&mut buf, 0).unwrap(), 0);
        assert!(!iter.at_end());
    }

    #[test]
    fn test_skip_then_read_returns_next_point() {
        let mut pipeline = ramp_pipeline(10);
        let x = pipeline.schema().resolve("X", false).unwrap();
        let mut iter = pipeline.iter();
        let mut buf = PointBuffer::new(iter.schema(), 1);

        assert_eq!(iter.skip(6), 6);
        assert_eq!(iter.read(&mut buf, 1).unwrap(), 1);
        assert_eq!(buf.get(x, 0), 6.0);
        assert_eq!(iter.position(), 7);
    }

    #[test]
    fn test_skipped_points_are_not_counted() {
        let mut pipeline = ramp_pipeline(10);
        {
            let mut iter = pipeline.iter();
            let mut buf = iter.allocate_buffer();
            iter.skip(7);
            while iter.read_chunk(&mut buf).unwrap() > 0 {}
            iter.finish().unwrap();
        }
        let stats = pipeline.stats(StageId(1)).unwrap();
        let x = stats.get_stats(pipeline.schema(), "X").unwrap();
        assert_eq!(x.count(), 3);
        assert_eq!(x.minimum(), 7.0);
    }

    #[test]
    fn test_iteration_resumes_across_iterators() {
        let mut pipeline = ramp_pipeline(6);
        let mut buf = {
            let iter = pipeline.iter();
            iter.allocate_buffer()
        };
        assert_eq!(pipeline.iter().read(&mut buf, 4).unwrap(), 4);
        assert_eq!(pipeline.iter().read(&mut buf, 4).unwrap(), 2);
        assert_eq!(pipeline.cursor().position, 6);
    }

    #[test]
    #[should_panic(expected = "prepared twice")]
    fn test_prepare_twice_panics() {
        let mut pipeline = ramp_pipeline(1);
        let _ = pipeline.prepare();
    }

    #[test]
    #[should_panic(expected = "iterated before prepare")]
    fn test_iter_before_prepare_panics() {
        let mut pipeline = PipelineBuilder::new()
            .stage(FauxReader::new(1))
            .build()
            .unwrap();
        let _ = pipeline.iter();
    }

    #[test]
    #[should_panic(expected = "finalized twice")]
    fn test_done_twice_panics() {
        let mut pipeline = ramp_pipeline(1);
        pipeline.done().unwrap();
        let _ = pipeline.done();
    }

    #[test]
    fn test_factory_applies_name_override() {
        let options = Options::new().with("num_points", 5i64);
        let stage = StageFactory::create(StageType::FauxReader, Some("source"), &options).unwrap();
        assert_eq!(stage.name(), "source");
        assert!(stage.as_faux_reader().is_some());

        let stage = StageFactory::create(StageType::Stats, None, &Options::new()).unwrap();
        assert_eq!(stage.name(), "filters.stats");
        assert!(stage.as_stats().is_some());
    }

    #[test]
    fn test_duplicate_stage_name_rejected() {
        let mut pipeline = Pipeline::new();
        pipeline.add_stage(FauxReader::new(10)).unwrap();
        pipeline.add_stage(StatsFilter::new()).unwrap();
        let err = pipeline.add_stage(StatsFilter::new()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTopology(ref m) if m.contains("filters.stats")));
        assert_eq!(pipeline.len(), 2);

        pipeline
            .add_stage(StatsFilter::new().with_name("filters.stats.final"))
            .unwrap();
        assert_eq!(pipeline.find_stage("filters.stats.final"), Some(StageId(2)));
    }

    #[test]
    fn test_find_stage_and_num_points() {
        let pipeline = ramp_pipeline(10);
        assert_eq!(pipeline.find_stage("filters.stats"), Some(StageId(1)));
        assert_eq!(pipeline.find_stage("writers.las"), None);
        assert_eq!(pipeline.num_points(), Some(10));
    }
}
