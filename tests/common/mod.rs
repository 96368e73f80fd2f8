//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use cloudstat::pipeline::{Pipeline, StageId, Summary};

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Drive `pipeline` to exhaustion with reads of `chunk` points, then finalize.
/// Returns the number of points read.
pub fn drain(pipeline: &mut Pipeline, chunk: usize) -> u64 {
    let mut iter = pipeline.iter();
    let mut buf = cloudstat::PointBuffer::new(iter.schema(), chunk);
    let mut total = 0;
    loop {
        let n = iter.read(&mut buf, chunk).unwrap();
        if n == 0 {
            break;
        }
        total += n as u64;
    }
    iter.finish().unwrap();
    total
}

/// Summary for `name` from the stats stage at `stage`.
pub fn summary<'a>(pipeline: &'a Pipeline, stage: StageId, name: &str) -> &'a Summary {
    pipeline
        .stats(stage)
        .expect("stage is not a stats filter")
        .get_stats(pipeline.schema(), name)
        .unwrap()
}
