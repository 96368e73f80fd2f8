//! Consumer adapters over a prepared pipeline.
//!
//! `point_at` dumps a single point; `scan` drains the whole source so that
//! observing stages (statistics) see every point, then finalizes.

use crate::pipeline::buffer::PointBuffer;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::executor::Pipeline;
use serde::Serialize;

/// One point, keyed by qualified dimension name in schema order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointRecord {
    pub index: u64,
    pub values: Vec<(String, f64)>,
}

impl PointRecord {
    /// Value of the dimension with qualified name `name`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, v)| v)
    }
}

/// Outcome of a full scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ScanReport {
    pub points_read: u64,
    pub chunks: u64,
}

/// Read the point at absolute `index`.
///
/// Skips forward from the current cursor; an index behind the cursor or past
/// the end of the source is a `ShortRead`.
pub fn point_at(pipeline: &mut Pipeline, index: u64) -> PipelineResult<PointRecord> {
    let mut iter = pipeline.iter();
    let short = |returned| PipelineError::ShortRead {
        index,
        requested: 1,
        returned,
    };

    let position = iter.position();
    if position > index {
        return Err(short(0));
    }
    let wanted = index - position;
    if iter.skip(wanted) != wanted {
        return Err(short(0));
    }

    let mut buf = PointBuffer::new(iter.schema(), 1);
    let n = iter.read(&mut buf, 1)?;
    if n != 1 {
        return Err(short(n));
    }

    let values = iter
        .schema()
        .iter()
        .map(|dim| (dim.qualified_name.clone(), buf.get(dim.id, 0)))
        .collect();
    Ok(PointRecord { index, values })
}

/// Drain the source in producer-sized chunks, then run `done()`.
pub fn scan(pipeline: &mut Pipeline) -> PipelineResult<ScanReport> {
    let mut report = ScanReport::default();
    let mut iter = pipeline.iter();
    let mut buf = iter.allocate_buffer();
    tracing::debug!(
        "Scanning with {}-point chunks ({} bytes)",
        buf.capacity(),
        buf.footprint()
    );

    loop {
        let n = iter.read_chunk(&mut buf)?;
        if n == 0 {
            break;
        }
        report.points_read += n as u64;
        report.chunks += 1;
    }
    iter.finish()?;

    tracing::info!(
        "Scanned {} points in {} chunks",
        report.points_read,
        report.chunks
    );
    Ok(report)
}
