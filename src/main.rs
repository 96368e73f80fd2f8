//! cloudstat - Main Entry Point
//!
//! Runs a TOML-described point-cloud pipeline to completion and prints the
//! statistics it gathered. Without an argument, a built-in demo pipeline is
//! used.

use anyhow::Context;
use cloudstat::{inspect, PipelineConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEMO_PIPELINE: &str = r#"
[[stages]]
type = "readers.faux"
options = { num_points = 1000, mode = "ramp", bounds = "([1, 101], [2, 102], [3, 103])", classes = 5 }

[[stages]]
type = "filters.stats"
options = { count = "Classification" }
"#;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cloudstat=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args_os().nth(1) {
        Some(path) => {
            tracing::info!("Loading pipeline from {:?}", path);
            PipelineConfig::load(&path)?
        }
        None => {
            tracing::info!("No pipeline file given, running the demo pipeline");
            PipelineConfig::from_toml_str(DEMO_PIPELINE)?
        }
    };

    let mut pipeline = config.build()?;
    pipeline.prepare().context("Failed to prepare pipeline")?;
    let report = inspect::scan(&mut pipeline).context("Failed to run pipeline")?;

    for leaf in pipeline.metadata().leaves() {
        tracing::debug!("{} = {}", leaf.path, leaf.value);
    }

    let mut stats = serde_json::Map::new();
    for (id, stage) in pipeline.stages() {
        let Some(filter) = stage.as_stats() else {
            continue;
        };
        let mut dims = serde_json::Map::new();
        for (name, summary) in filter.summaries() {
            dims.insert(name.to_string(), serde_json::to_value(summary)?);
        }
        stats.insert(format!("{}#{}", stage.name(), id.0), dims.into());
    }

    let output = serde_json::json!({
        "points": report.points_read,
        "chunks": report.chunks,
        "stats": stats,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
