//! Configuration module for cloudstat
//!
//! This module handles:
//! - Per-stage options (`Options`), a small typed key/value map
//! - Pipeline descriptions (`PipelineConfig`) loaded from TOML
//!
//! # Example
//!
//! ```toml
//! chunk_size = 4096
//!
//! [[stages]]
//! type = "readers.faux"
//! options = { num_points = 1000, mode = "constant", bounds = "([1, 101], [2, 102], [3, 103])" }
//!
//! [[stages]]
//! type = "filters.rescale"
//! name = "reproj"
//! options = { dimensions = "X", scale = 0.5 }
//!
//! [[stages]]
//! type = "filters.stats"
//! options = { dimensions = "X Y", exact_dimensions = "reproj.X" }
//! ```

use crate::error::{CloudStatError, Result, ResultExt};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::executor::{Pipeline, PipelineBuilder, StageFactory};
use crate::pipeline::stage_type::StageType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default number of points per chunk when neither the pipeline nor the
/// producer specifies one.
pub const DEFAULT_CHUNK_SIZE: usize = 65_536;

// ==================== Options ====================

/// A single option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<String>),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(v) => Some(*v),
            OptionValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(v) => Some(*v),
            OptionValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            OptionValue::Float(v) => Some(*v),
            OptionValue::Int(v) => Some(*v as f64),
            OptionValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Interpret as a name list. Strings are split on commas and whitespace.
    pub fn as_list(&self) -> Option<Vec<String>> {
        match self {
            OptionValue::String(s) => Some(split_names(s)),
            OptionValue::List(items) => Some(
                items
                    .iter()
                    .flat_map(|item| split_names(item))
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(v as i64)
    }
}

impl From<u64> for OptionValue {
    /// Values above `i64::MAX` are kept in decimal string form.
    fn from(v: u64) -> Self {
        i64::try_from(v)
            .map(OptionValue::Int)
            .unwrap_or_else(|_| OptionValue::String(v.to_string()))
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::String(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::String(v)
    }
}

impl From<Vec<&str>> for OptionValue {
    fn from(v: Vec<&str>) -> Self {
        OptionValue::List(v.into_iter().map(str::to_string).collect())
    }
}

/// Split a comma- and/or whitespace-separated name list.
pub fn split_names(s: &str) -> Vec<String> {
    s.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Ordered option map handed to a stage at construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options {
    values: BTreeMap<String, OptionValue>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<OptionValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<OptionValue>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Typed view whose errors name `stage`.
    pub fn scoped<'a>(&'a self, stage: &'a str) -> StageOptions<'a> {
        StageOptions {
            stage,
            options: self,
        }
    }
}

/// Typed accessors over `Options` for one stage.
///
/// Missing keys yield `Ok(None)`; present keys of the wrong type yield
/// `InvalidOption`.
#[derive(Debug, Clone, Copy)]
pub struct StageOptions<'a> {
    stage: &'a str,
    options: &'a Options,
}

impl StageOptions<'_> {
    fn convert<T>(
        &self,
        key: &str,
        expected: &str,
        f: impl FnOnce(&OptionValue) -> Option<T>,
    ) -> PipelineResult<Option<T>> {
        match self.options.get(key) {
            None => Ok(None),
            Some(value) => f(value).map(Some).ok_or_else(|| {
                PipelineError::invalid_option(
                    self.stage,
                    key,
                    format!("expected {}, got {:?}", expected, value),
                )
            }),
        }
    }

    pub fn get_bool(&self, key: &str) -> PipelineResult<Option<bool>> {
        self.convert(key, "a boolean", OptionValue::as_bool)
    }

    pub fn get_u64(&self, key: &str) -> PipelineResult<Option<u64>> {
        self.convert(key, "a non-negative integer", |v| match v {
            OptionValue::Int(i) => u64::try_from(*i).ok(),
            OptionValue::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn get_f64(&self, key: &str) -> PipelineResult<Option<f64>> {
        self.convert(key, "a number", OptionValue::as_float)
    }

    pub fn get_str(&self, key: &str) -> PipelineResult<Option<&str>> {
        match self.options.get(key) {
            None => Ok(None),
            Some(OptionValue::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(PipelineError::invalid_option(
                self.stage,
                key,
                format!("expected a string, got {:?}", other),
            )),
        }
    }

    /// Name list; missing keys yield an empty list.
    pub fn get_list(&self, key: &str) -> PipelineResult<Vec<String>> {
        Ok(self
            .convert(key, "a name list", OptionValue::as_list)?
            .unwrap_or_default())
    }
}

// ==================== Pipeline Description ====================

/// One stage entry of a pipeline description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(rename = "type")]
    pub stage_type: StageType,
    /// Overrides the stage identity (and dimension namespace).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub options: Options,
}

impl StageConfig {
    pub fn new(stage_type: StageType) -> Self {
        Self {
            stage_type,
            name: None,
            options: Options::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }
}

/// A full linear pipeline: one producer followed by transformers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Points per chunk; falls back to the producer's hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

impl PipelineConfig {
    /// Parse a TOML pipeline description.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML pipeline description from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(CloudStatError::from)
            .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse pipeline file {}", path.display()))
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CloudStatError::Serialization(e.to_string()))
    }

    /// Check the shape of the description without building stages.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == Some(0) {
            return Err(CloudStatError::Config(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.stages.is_empty() {
            return Err(CloudStatError::Config(
                "pipeline has no stages".to_string(),
            ));
        }
        Ok(())
    }

    /// Build an unprepared pipeline from this description.
    pub fn build(&self) -> Result<Pipeline> {
        self.validate()?;
        let mut builder = PipelineBuilder::new();
        if let Some(chunk_size) = self.chunk_size {
            builder = builder.chunk_size(chunk_size);
        }
        for stage in &self.stages {
            let built = StageFactory::create(stage.stage_type, stage.name.as_deref(), &stage.options)?;
            builder = builder.stage(built);
        }
        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
chunk_size = 100

[[stages]]
type = "readers.faux"
options = { num_points = 250, mode = "ramp", bounds = "([0, 10], [0, 20], [0, 30])" }

[[stages]]
type = "filters.rescale"
name = "reproj"
options = { dimensions = ["X"], scale = 2.0 }

[[stages]]
type = "filters.stats"
options = { dimensions = "X, Y Z", exact_dimensions = "reproj.X" }
"#;

    #[test]
    fn test_split_names() {
        assert_eq!(
            split_names("X,readers.faux.Y Z  reproj.X, Classification"),
            vec!["X", "readers.faux.Y", "Z", "reproj.X", "Classification"]
        );
        assert!(split_names(" , ").is_empty());
    }

    #[test]
    fn test_option_accessors() {
        let opts = Options::new()
            .with("num_points", 1000i64)
            .with("scale", 0.5)
            .with("mode", "constant")
            .with("debug", true);
        let scoped = opts.scoped("readers.faux");

        assert_eq!(scoped.get_u64("num_points").unwrap(), Some(1000));
        assert_eq!(scoped.get_f64("num_points").unwrap(), Some(1000.0));
        assert_eq!(scoped.get_f64("scale").unwrap(), Some(0.5));
        assert_eq!(scoped.get_str("mode").unwrap(), Some("constant"));
        assert_eq!(scoped.get_bool("debug").unwrap(), Some(true));
        assert_eq!(scoped.get_u64("missing").unwrap(), None);
        assert!(scoped.get_list("missing").unwrap().is_empty());
    }

    #[test]
    fn test_option_type_mismatch() {
        let opts = Options::new().with("num_points", "lots");
        let err = opts.scoped("readers.faux").get_u64("num_points").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidOption { ref stage, ref key, .. }
                if stage == "readers.faux" && key == "num_points"
        ));
    }

    #[test]
    fn test_negative_count_rejected() {
        let opts = Options::new().with("num_points", -5i64);
        assert!(opts.scoped("readers.faux").get_u64("num_points").is_err());
    }

    #[test]
    fn test_large_unsigned_option_is_not_wrapped() {
        let opts = Options::new()
            .with("num_points", u64::MAX)
            .with("classes", 7u64);
        let scoped = opts.scoped("readers.faux");
        assert_eq!(scoped.get_u64("num_points").unwrap(), Some(u64::MAX));
        assert_eq!(scoped.get_u64("classes").unwrap(), Some(7));
        assert_eq!(opts.get("classes"), Some(&OptionValue::Int(7)));
    }

    #[test]
    fn test_parse_pipeline_config() {
        let config = PipelineConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.chunk_size, Some(100));
        assert_eq!(config.stages.len(), 3);
        assert_eq!(config.stages[0].stage_type, StageType::FauxReader);
        assert_eq!(config.stages[1].name.as_deref(), Some("reproj"));
        assert_eq!(
            config.stages[1].options.get("dimensions"),
            Some(&OptionValue::List(vec!["X".into()]))
        );
        assert_eq!(
            config.stages[2].options.get("dimensions").and_then(|v| v.as_list()),
            Some(vec!["X".to_string(), "Y".to_string(), "Z".to_string()])
        );
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        let err = PipelineConfig::from_toml_str("chunk_size = 10").unwrap_err();
        assert!(err.to_string().contains("no stages"));
    }

    #[test]
    fn test_unknown_stage_type_rejected() {
        let toml = "[[stages]]\ntype = \"writers.las\"\n";
        assert!(matches!(
            PipelineConfig::from_toml_str(toml),
            Err(CloudStatError::Toml(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = PipelineConfig::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        let again = PipelineConfig::from_toml_str(&text).unwrap();
        assert_eq!(config, again);
    }
}
