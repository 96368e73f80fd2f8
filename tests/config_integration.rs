//! Integration tests for TOML pipeline descriptions
//!
//! - Loading from disk and running to completion
//! - Error reporting for malformed or invalid descriptions

mod common;

use cloudstat::pipeline::{PipelineError, StageId};
use cloudstat::{inspect, CloudStatError, PipelineConfig};
use common::summary;
use std::io::Write;
use tempfile::NamedTempFile;

const RESCALED: &str = r#"
chunk_size = 64

[[stages]]
type = "readers.faux"
options = { num_points = 500, mode = "ramp", bounds = "([0, 499], [0, 0], [0, 0])" }

[[stages]]
type = "filters.rescale"
name = "reproj"
options = { dimensions = "X", scale = 2, offset = 1 }

[[stages]]
type = "filters.stats"
options = { dimensions = "X readers.faux.X" }
"#;

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_and_run_pipeline_file() {
    let file = write_temp(RESCALED);
    let config = PipelineConfig::load(file.path()).unwrap();
    assert_eq!(config.chunk_size, Some(64));
    assert_eq!(config.stages.len(), 3);

    let mut pipeline = config.build().unwrap();
    assert_eq!(pipeline.chunk_size(), 64);
    pipeline.prepare().unwrap();

    let report = inspect::scan(&mut pipeline).unwrap();
    assert_eq!(report.points_read, 500);
    assert_eq!(report.chunks, 8);

    let rescaled = summary(&pipeline, StageId(2), "X");
    assert_eq!(rescaled.minimum(), 1.0);
    assert_eq!(rescaled.maximum(), 999.0);

    let original = summary(&pipeline, StageId(2), "readers.faux.X");
    assert_eq!(original.maximum(), 499.0);
    assert_eq!(pipeline.find_stage("reproj"), Some(StageId(1)));
}

#[test]
fn test_missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = PipelineConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn test_unknown_stage_type_is_rejected() {
    let file = write_temp("[[stages]]\ntype = \"writers.las\"\n");
    let err = PipelineConfig::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse pipeline file"));
}

#[test]
fn test_unknown_dimension_fails_prepare() {
    let config = PipelineConfig::from_toml_str(
        r#"
[[stages]]
type = "readers.faux"
options = { num_points = 10 }

[[stages]]
type = "filters.stats"
options = { exact_dimensions = "X" }
"#,
    )
    .unwrap();

    let mut pipeline = config.build().unwrap();
    let err: CloudStatError = pipeline.prepare().unwrap_err().into();
    assert_eq!(
        err.pipeline_error(),
        Some(&PipelineError::unknown_dimension("X"))
    );
}

#[test]
fn test_missing_required_option_fails_build() {
    let config = PipelineConfig::from_toml_str("[[stages]]\ntype = \"readers.faux\"\n").unwrap();
    let err = config.build().unwrap_err();
    assert!(matches!(
        err.pipeline_error(),
        Some(PipelineError::InvalidOption { key, .. }) if key == "num_points"
    ));
}
