//! FauxReader: synthetic point producer.
//!
//! Emits `num_points` points with `X`, `Y`, `Z` (f64) inside `bounds`, and
//! optionally a `Classification` (u8) cycling through `0..classes`.
//!
//! Modes:
//! - `constant`: every point sits at the minimum corner.
//! - `ramp`: values step linearly from minimum to maximum across the
//!   sequence, so point `i` is identifiable from its coordinates.

use crate::config::Options;
use crate::pipeline::buffer::PointBuffer;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::DimId;
use crate::pipeline::schema::DimType;
use crate::pipeline::stage::{StageContext, StagePlugin};
use crate::pipeline::stage_type::{StageKind, StageType};
use std::str::FromStr;

/// Value generation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FauxMode {
    #[default]
    Constant,
    Ramp,
}

impl FromStr for FauxMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "constant" => Ok(FauxMode::Constant),
            "ramp" => Ok(FauxMode::Ramp),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// Axis-aligned box, `[min, max]` per axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Bounds {
    pub fn new(minx: f64, miny: f64, minz: f64, maxx: f64, maxy: f64, maxz: f64) -> Self {
        Self {
            min: [minx, miny, minz],
            max: [maxx, maxy, maxz],
        }
    }
}

impl FromStr for Bounds {
    type Err = String;

    /// Parses `([minx, maxx], [miny, maxy], [minz, maxz])`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let numbers: Vec<f64> = s
            .split(|c: char| matches!(c, '(' | ')' | '[' | ']' | ',') || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<f64>()
                    .map_err(|_| format!("'{}' is not a number", part))
            })
            .collect::<Result<_, _>>()?;
        if numbers.len() != 6 {
            return Err(format!(
                "expected 3 [min, max] pairs, found {} numbers",
                numbers.len()
            ));
        }
        Ok(Bounds {
            min: [numbers[0], numbers[2], numbers[4]],
            max: [numbers[1], numbers[3], numbers[5]],
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct FauxDims {
    xyz: [DimId; 3],
    classification: Option<DimId>,
}

/// Faux reader.
#[derive(Debug)]
pub struct FauxReader {
    name: String,
    num_points: u64,
    bounds: Bounds,
    mode: FauxMode,
    classes: u8,
    chunk_size: Option<usize>,
    position: u64,
    dims: Option<FauxDims>,
}

impl FauxReader {
    pub fn new(num_points: u64) -> Self {
        Self {
            name: StageType::FauxReader.type_name().to_string(),
            num_points,
            bounds: Bounds::default(),
            mode: FauxMode::Constant,
            classes: 0,
            chunk_size: None,
            position: 0,
            dims: None,
        }
    }

    /// Build from `num_points`, `bounds`, `mode`, `classes`, `chunk_size` options.
    pub fn from_options(options: &Options) -> PipelineResult<Self> {
        let stage = StageType::FauxReader.type_name();
        let opts = options.scoped(stage);
        let num_points = opts.get_u64("num_points")?.ok_or_else(|| {
            PipelineError::invalid_option(stage, "num_points", "option is required")
        })?;

        let mut reader = Self::new(num_points);
        if let Some(bounds) = opts.get_str("bounds")? {
            reader.bounds = bounds
                .parse()
                .map_err(|e| PipelineError::invalid_option(stage, "bounds", e))?;
        }
        if let Some(mode) = opts.get_str("mode")? {
            reader.mode = mode
                .parse()
                .map_err(|e| PipelineError::invalid_option(stage, "mode", e))?;
        }
        if let Some(classes) = opts.get_u64("classes")? {
            reader.classes = u8::try_from(classes).map_err(|_| {
                PipelineError::invalid_option(stage, "classes", "must be at most 255")
            })?;
        }
        if let Some(chunk) = opts.get_u64("chunk_size")? {
            if chunk == 0 {
                return Err(PipelineError::invalid_option(stage, "chunk_size", "must be positive"));
            }
            reader.chunk_size = Some(chunk as usize);
        }
        Ok(reader)
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_mode(mut self, mode: FauxMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_classes(mut self, classes: u8) -> Self {
        self.classes = classes;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Index of the next point to be produced.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Coordinate of point `index` on `axis` (0 = X, 1 = Y, 2 = Z).
    pub fn value_at(&self, axis: usize, index: u64) -> f64 {
        let (min, max) = (self.bounds.min[axis], self.bounds.max[axis]);
        match self.mode {
            FauxMode::Constant => min,
            FauxMode::Ramp if self.num_points > 1 => {
                min + (max - min) * index as f64 / (self.num_points - 1) as f64
            }
            FauxMode::Ramp => min,
        }
    }

    /// Classification of point `index`, when classes are enabled.
    pub fn class_at(&self, index: u64) -> Option<u8> {
        (self.classes > 0).then(|| (index % self.classes as u64) as u8)
    }

    fn remaining(&self) -> u64 {
        self.num_points.saturating_sub(self.position)
    }
}

impl StagePlugin for FauxReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        StageType::FauxReader.description()
    }

    fn kind(&self) -> StageKind {
        StageKind::Producer
    }

    fn prepare(&mut self, ctx: &mut StageContext) -> PipelineResult<()> {
        let x = ctx.schema.add_dimension("X", DimType::F64, &self.name)?;
        let y = ctx.schema.add_dimension("Y", DimType::F64, &self.name)?;
        let z = ctx.schema.add_dimension("Z", DimType::F64, &self.name)?;
        let classification = if self.classes > 0 {
            Some(
                ctx.schema
                    .add_dimension("Classification", DimType::U8, &self.name)?,
            )
        } else {
            None
        };
        self.dims = Some(FauxDims {
            xyz: [x, y, z],
            classification,
        });
        ctx.metadata
            .add_child(&format!("{}:num_points", self.name), self.num_points)?;
        Ok(())
    }

    fn chunk_size(&self) -> Option<usize> {
        self.chunk_size
    }

    fn num_points(&self) -> Option<u64> {
        Some(self.num_points)
    }

    fn read(&mut self, buf: &mut PointBuffer, max: usize) -> PipelineResult<usize> {
        let Some(dims) = self.dims else {
            panic!("{} read before prepare", self.name);
        };
        let n = self.remaining().min(max as u64) as usize;
        for i in 0..n {
            let index = self.position + i as u64;
            for (axis, dim) in dims.xyz.iter().enumerate() {
                buf.set(*dim, i, self.value_at(axis, index));
            }
            if let (Some(dim), Some(class)) = (dims.classification, self.class_at(index)) {
                buf.set(dim, i, class as f64);
            }
        }
        self.position += n as u64;
        Ok(n)
    }

    fn skip(&mut self, n: u64) -> u64 {
        let skipped = self.remaining().min(n);
        self.position += skipped;
        skipped
    }

    fn at_end(&self) -> bool {
        self.remaining() == 0
    }
}
