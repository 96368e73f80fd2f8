//! RescaleFilter: re-emits dimensions under its own namespace.
//!
//! For each listed source dimension, registers `<name>.<base>` and writes
//! `value * scale + offset` into it. The source dimension is left intact,
//! so after this stage a bare `X` resolves to the rescaled copy while the
//! producer's `X` stays reachable by its qualified name.

use crate::config::Options;
use crate::pipeline::buffer::PointBuffer;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::DimId;
use crate::pipeline::schema::DimType;
use crate::pipeline::stage::{StageContext, StagePlugin};
use crate::pipeline::stage_type::{StageKind, StageType};

/// Rescale filter.
pub struct RescaleFilter {
    name: String,
    dimensions: Vec<String>,
    scale: f64,
    offset: f64,
    /// (source, destination) pairs resolved at prepare.
    mapping: Vec<(DimId, DimId)>,
}

impl RescaleFilter {
    pub fn new() -> Self {
        Self {
            name: StageType::Rescale.type_name().to_string(),
            dimensions: vec!["X".into(), "Y".into(), "Z".into()],
            scale: 1.0,
            offset: 0.0,
            mapping: Vec::new(),
        }
    }

    /// Build from `dimensions`, `scale`, `offset` options.
    pub fn from_options(options: &Options) -> PipelineResult<Self> {
        let stage = StageType::Rescale.type_name();
        let opts = options.scoped(stage);
        let mut filter = Self::new();
        let dimensions = opts.get_list("dimensions")?;
        if !dimensions.is_empty() {
            filter.dimensions = dimensions;
        }
        if let Some(scale) = opts.get_f64("scale")? {
            if !scale.is_finite() {
                return Err(PipelineError::invalid_option(stage, "scale", "must be finite"));
            }
            filter.scale = scale;
        }
        if let Some(offset) = opts.get_f64("offset")? {
            filter.offset = offset;
        }
        Ok(filter)
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_dimensions<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.dimensions = names.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn with_transform(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    #[inline]
    pub fn apply(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }
}

impl Default for RescaleFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl StagePlugin for RescaleFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        StageType::Rescale.description()
    }

    fn kind(&self) -> StageKind {
        StageKind::Transformer
    }

    fn prepare(&mut self, ctx: &mut StageContext) -> PipelineResult<()> {
        // Resolve every source before registering, so a listed name never
        // binds to one of our own outputs.
        let sources = self
            .dimensions
            .iter()
            .map(|name| ctx.schema.resolve(name, false))
            .collect::<PipelineResult<Vec<_>>>()?;

        self.mapping.clear();
        for src in sources {
            let base = ctx.schema.dimension(src).name.clone();
            let dst = ctx.schema.add_dimension(&base, DimType::F64, &self.name)?;
            self.mapping.push((src, dst));
        }
        Ok(())
    }

    fn filter(&mut self, buf: &mut PointBuffer) -> PipelineResult<()> {
        for &(src, dst) in &self.mapping {
            for i in 0..buf.len() {
                let value = buf.get(src, i);
                buf.set(dst, i, self.apply(value));
            }
        }
        Ok(())
    }
}
