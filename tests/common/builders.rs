//! Test data builders and stub stages

use cloudstat::pipeline::{
    Bounds, DimId, DimType, FauxMode, FauxReader, PipelineResult, PointBuffer, StageContext,
    StageKind, StagePlugin,
};

/// Builder for faux readers used across scenarios
pub struct FauxBuilder {
    num_points: u64,
    bounds: Bounds,
    mode: FauxMode,
    classes: u8,
}

impl FauxBuilder {
    pub fn new(num_points: u64) -> Self {
        Self {
            num_points,
            bounds: Bounds::default(),
            mode: FauxMode::Constant,
            classes: 0,
        }
    }

    /// Constant points at (1, 2, 3).
    pub fn constant_123(num_points: u64) -> Self {
        Self::new(num_points).bounds(Bounds::new(1.0, 2.0, 3.0, 101.0, 102.0, 103.0))
    }

    pub fn bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn ramp(mut self) -> Self {
        self.mode = FauxMode::Ramp;
        self
    }

    pub fn classes(mut self, classes: u8) -> Self {
        self.classes = classes;
        self
    }

    pub fn build(self) -> FauxReader {
        FauxReader::new(self.num_points)
            .with_bounds(self.bounds)
            .with_mode(self.mode)
            .with_classes(self.classes)
    }
}

/// Producer emitting one `Value` dimension from a generator function.
pub struct SequenceSource {
    num_points: u64,
    generate: fn(u64) -> f64,
    position: u64,
    dim: Option<DimId>,
}

impl SequenceSource {
    pub fn new(num_points: u64, generate: fn(u64) -> f64) -> Self {
        Self {
            num_points,
            generate,
            position: 0,
            dim: None,
        }
    }
}

impl StagePlugin for SequenceSource {
    fn name(&self) -> &str {
        "readers.sequence"
    }

    fn description(&self) -> &str {
        "Sequence Reader"
    }

    fn kind(&self) -> StageKind {
        StageKind::Producer
    }

    fn prepare(&mut self, ctx: &mut StageContext) -> PipelineResult<()> {
        self.dim = Some(ctx.schema.add_dimension("Value", DimType::F64, "readers.sequence")?);
        Ok(())
    }

    fn num_points(&self) -> Option<u64> {
        Some(self.num_points)
    }

    fn read(&mut self, buf: &mut PointBuffer, max: usize) -> PipelineResult<usize> {
        let dim = self.dim.expect("read before prepare");
        let n = (self.num_points - self.position).min(max as u64) as usize;
        for i in 0..n {
            buf.set(dim, i, (self.generate)(self.position + i as u64));
        }
        self.position += n as u64;
        Ok(n)
    }

    fn skip(&mut self, n: u64) -> u64 {
        let skipped = (self.num_points - self.position).min(n);
        self.position += skipped;
        skipped
    }

    fn at_end(&self) -> bool {
        self.position >= self.num_points
    }
}

/// Transformer that fails on its first chunk.
pub struct FailingFilter;

impl StagePlugin for FailingFilter {
    fn name(&self) -> &str {
        "filters.failing"
    }

    fn description(&self) -> &str {
        "Failing Filter"
    }

    fn kind(&self) -> StageKind {
        StageKind::Transformer
    }

    fn prepare(&mut self, _ctx: &mut StageContext) -> PipelineResult<()> {
        Ok(())
    }

    fn filter(&mut self, _buf: &mut PointBuffer) -> PipelineResult<()> {
        Err(cloudstat::PipelineError::Stage {
            stage: "filters.failing".to_string(),
            message: "refusing chunk".to_string(),
        })
    }
}

/// Transformer that doubles one existing dimension in place.
pub struct DoublingFilter {
    target: String,
    dim: Option<DimId>,
}

impl DoublingFilter {
    /// `target` is matched as a qualified name.
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            dim: None,
        }
    }
}

impl StagePlugin for DoublingFilter {
    fn name(&self) -> &str {
        "filters.double"
    }

    fn description(&self) -> &str {
        "Doubling Filter"
    }

    fn kind(&self) -> StageKind {
        StageKind::Transformer
    }

    fn prepare(&mut self, ctx: &mut StageContext) -> PipelineResult<()> {
        self.dim = Some(ctx.schema.resolve(&self.target, true)?);
        Ok(())
    }

    fn filter(&mut self, buf: &mut PointBuffer) -> PipelineResult<()> {
        let dim = self.dim.expect("filter before prepare");
        for i in 0..buf.len() {
            let value = buf.get(dim, i);
            buf.set(dim, i, value * 2.0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faux_builder() {
        let reader = FauxBuilder::new(10).ramp().classes(3).build();
        assert_eq!(reader.num_points(), Some(10));
        assert_eq!(reader.class_at(4), Some(1));
    }
}
