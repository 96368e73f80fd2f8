//! StatsFilter: streaming per-dimension statistics.
//!
//! Resolves the tracked dimension set once at prepare, then folds every
//! chunk into a `Summary` per dimension. Nothing is windowed: results are
//! cumulative over the whole traversal. On `done` the summaries are frozen
//! and mirrored into the metadata tree under
//! `<stage>:<qualified dimension>:<statistic>`. The dimension a bare base
//! name resolves to is mirrored a second time under
//! `<stage>:<base name>:<statistic>`.
//!
//! Options:
//! - `dimensions`: names to track; base names fall back to the most
//!   downstream producer.
//! - `exact_dimensions`: names that must match a qualified name literally.
//! - `count`: names whose distinct values are also counted. Only integer
//!   dimensions are accepted; the histogram grows with the number of
//!   distinct values.
//!
//! With neither `dimensions` nor `exact_dimensions`, every schema dimension
//! is tracked.

use crate::config::Options;
use crate::pipeline::buffer::PointBuffer;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::DimId;
use crate::pipeline::metadata::{MetadataTree, PATH_SEPARATOR};
use crate::pipeline::schema::{most_downstream, Schema};
use crate::pipeline::stage::{StageContext, StagePlugin};
use crate::pipeline::stage_type::{StageKind, StageType};
use serde::Serialize;
use std::collections::BTreeMap;

/// Running count/min/max/mean for one dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    count: u64,
    minimum: f64,
    maximum: f64,
    mean: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    value_counts: Option<BTreeMap<i64, u64>>,
}

impl Default for Summary {
    fn default() -> Self {
        Self::new()
    }
}

impl Summary {
    pub fn new() -> Self {
        Self {
            count: 0,
            minimum: f64::INFINITY,
            maximum: f64::NEG_INFINITY,
            mean: 0.0,
            value_counts: None,
        }
    }

    /// A summary that also counts distinct values. Meant for integer
    /// dimensions: values are truncated to `i64` before counting.
    pub fn with_value_counts() -> Self {
        Self {
            value_counts: Some(BTreeMap::new()),
            ..Self::new()
        }
    }

    /// Fold one value in.
    #[inline]
    pub fn insert(&mut self, value: f64) {
        self.count += 1;
        if value < self.minimum {
            self.minimum = value;
        }
        if value > self.maximum {
            self.maximum = value;
        }
        // Incremental mean keeps the magnitude bounded for huge counts
        self.mean += (value - self.mean) / self.count as f64;
        if let Some(counts) = &mut self.value_counts {
            *counts.entry(value as i64).or_insert(0) += 1;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// `+inf` until the first value arrives.
    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    /// `-inf` until the first value arrives.
    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn average(&self) -> f64 {
        self.mean
    }

    /// Distinct value counts in ascending value order, if enabled.
    pub fn value_counts(&self) -> Option<&BTreeMap<i64, u64>> {
        self.value_counts.as_ref()
    }
}

/// A dimension selected for tracking.
#[derive(Debug, Clone)]
struct Tracked {
    id: DimId,
    qualified_name: String,
    summary: Summary,
}

/// Statistics filter.
pub struct StatsFilter {
    name: String,
    dimensions: Vec<String>,
    exact_dimensions: Vec<String>,
    count_dimensions: Vec<String>,
    tracked: Vec<Tracked>,
    finalized: bool,
}

impl StatsFilter {
    pub fn new() -> Self {
        Self {
            name: StageType::Stats.type_name().to_string(),
            dimensions: Vec::new(),
            exact_dimensions: Vec::new(),
            count_dimensions: Vec::new(),
            tracked: Vec::new(),
            finalized: false,
        }
    }

    /// Build from `dimensions` / `exact_dimensions` / `count` options.
    pub fn from_options(options: &Options) -> PipelineResult<Self> {
        let mut filter = Self::new();
        let opts = options.scoped(StageType::Stats.type_name());
        filter.dimensions = opts.get_list("dimensions")?;
        filter.exact_dimensions = opts.get_list("exact_dimensions")?;
        filter.count_dimensions = opts.get_list("count")?;
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

    pub fn with_exact_dimensions<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.exact_dimensions = names.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn with_count_dimensions<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.count_dimensions = names.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    fn is_exact(&self, name: &str) -> bool {
        self.exact_dimensions.iter().any(|n| n == name)
    }

    /// Resolve the configured selection against `schema`, in configuration
    /// order and without duplicates.
    pub fn resolve_selection(&self, schema: &Schema) -> PipelineResult<Vec<DimId>> {
        let mut selected: Vec<DimId> = Vec::new();
        let mut push = |id: DimId| {
            if !selected.contains(&id) {
                selected.push(id);
            }
        };

        if self.dimensions.is_empty() && self.exact_dimensions.is_empty() {
            schema.ids().for_each(&mut push);
        } else {
            for name in &self.dimensions {
                push(schema.resolve(name, self.is_exact(name))?);
            }
            for name in &self.exact_dimensions {
                push(schema.resolve(name, true)?);
            }
        }
        for name in &self.count_dimensions {
            push(schema.resolve(name, self.is_exact(name))?);
        }
        Ok(selected)
    }

    /// Summary for a dimension by handle.
    pub fn summary(&self, id: DimId) -> Option<&Summary> {
        self.tracked.iter().find(|t| t.id == id).map(|t| &t.summary)
    }

    /// Summary for a dimension by name.
    ///
    /// A qualified name must be tracked literally. A base name picks the
    /// most downstream tracked dimension with that base name.
    pub fn get_stats(&self, schema: &Schema, name: &str) -> PipelineResult<&Summary> {
        if let Some(t) = self.tracked.iter().find(|t| t.qualified_name == name) {
            return Ok(&t.summary);
        }
        let candidates: Vec<DimId> = schema
            .base_candidates(name)
            .iter()
            .copied()
            .filter(|id| self.summary(*id).is_some())
            .collect();
        most_downstream(&candidates)
            .and_then(|id| self.summary(id))
            .ok_or_else(|| PipelineError::unknown_dimension(name))
    }

    /// Tracked dimensions in selection order.
    pub fn tracked(&self) -> impl Iterator<Item = DimId> + '_ {
        self.tracked.iter().map(|t| t.id)
    }

    /// `(qualified name, summary)` pairs in selection order.
    pub fn summaries(&self) -> impl Iterator<Item = (&str, &Summary)> {
        self.tracked
            .iter()
            .map(|t| (t.qualified_name.as_str(), &t.summary))
    }

    /// True once `done` has run; summaries no longer change.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// The base name under which `id` is also published: set when a bare
    /// lookup of that name picks `id` and no tracked qualified name equals it.
    fn base_alias<'s>(&self, schema: &'s Schema, id: DimId) -> Option<&'s str> {
        let dim = schema.dimension(id);
        if dim.name == dim.qualified_name
            || self.tracked.iter().any(|t| t.qualified_name == dim.name)
        {
            return None;
        }
        let candidates: Vec<DimId> = schema
            .base_candidates(&dim.name)
            .iter()
            .copied()
            .filter(|c| self.summary(*c).is_some())
            .collect();
        (most_downstream(&candidates) == Some(id)).then_some(dim.name.as_str())
    }

    fn publish(&self, md: &mut MetadataTree, dim: &str, s: &Summary) -> PipelineResult<()> {
        md.add_child(&self.metadata_path(&[dim, "count"]), s.count())?;
        md.add_child(&self.metadata_path(&[dim, "minimum"]), s.minimum())?;
        md.add_child(&self.metadata_path(&[dim, "maximum"]), s.maximum())?;
        md.add_child(&self.metadata_path(&[dim, "average"]), s.average())?;

        if let Some(counts) = s.value_counts() {
            for (i, (value, count)) in counts.iter().enumerate() {
                let bin = format!("count-{}", i + 1);
                md.add_child(&self.metadata_path(&[dim, "counts", &bin, "value"]), *value)?;
                md.add_child(&self.metadata_path(&[dim, "counts", &bin, "count"]), *count)?;
            }
        }
        Ok(())
    }

    fn metadata_path(&self, parts: &[&str]) -> String {
        let sep = PATH_SEPARATOR.to_string();
        let mut path = self.name.clone();
        for part in parts {
            path.push_str(&sep);
            path.push_str(part);
        }
        path
    }
}

impl Default for StatsFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl StagePlugin for StatsFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        StageType::Stats.description()
    }

    fn kind(&self) -> StageKind {
        StageKind::Transformer
    }

    fn prepare(&mut self, ctx: &mut StageContext) -> PipelineResult<()> {
        let selection = self.resolve_selection(ctx.schema)?;
        let mut tracked = Vec::with_capacity(selection.len());
        for id in selection {
            let dim = ctx.schema.dimension(id);
            let counted = self
                .count_dimensions
                .iter()
                .any(|n| ctx.schema.resolve(n, self.is_exact(n)).ok() == Some(id));
            if counted && !dim.dim_type.is_integer() {
                return Err(PipelineError::invalid_option(
                    &self.name,
                    "count",
                    format!(
                        "{} is {}, value counts need an integer dimension",
                        dim.qualified_name, dim.dim_type
                    ),
                ));
            }
            tracked.push(Tracked {
                id,
                qualified_name: dim.qualified_name.clone(),
                summary: if counted {
                    Summary::with_value_counts()
                } else {
                    Summary::new()
                },
            });
        }
        self.tracked = tracked;

        for t in &self.tracked {
            tracing::debug!("{} tracking {} as {}", self.name, t.qualified_name, t.id);
        }
        ctx.metadata
            .add_child(&self.metadata_path(&["description"]), self.description())?;
        Ok(())
    }

    fn filter(&mut self, buf: &mut PointBuffer) -> PipelineResult<()> {
        debug_assert!(!self.finalized, "stats updated after done");
        for t in &mut self.tracked {
            for value in buf.values(t.id) {
                t.summary.insert(value);
            }
        }
        Ok(())
    }

    fn done(&mut self, ctx: &mut StageContext) -> PipelineResult<()> {
        for t in &self.tracked {
            self.publish(&mut *ctx.metadata, &t.qualified_name, &t.summary)?;
            if let Some(base) = self.base_alias(ctx.schema, t.id) {
                self.publish(&mut *ctx.metadata, base, &t.summary)?;
            }
        }
        self.finalized = true;
        tracing::info!(
            "{} finalized {} summaries",
            self.name,
            self.tracked.len()
        );
        Ok(())
    }
}
