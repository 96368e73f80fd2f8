//! Fixed-capacity point chunk for the pipeline hot path.
//!
//! `PointBuffer` is a row-major byte block laid out per a frozen `Schema`.
//! It is allocated once and reused for every read. No allocation
//! happens while iterating.

use crate::pipeline::id::DimId;
use crate::pipeline::schema::{DimType, Schema};

/// Column descriptor copied out of the schema at allocation time.
#[derive(Debug, Clone, Copy)]
struct Column {
    offset: usize,
    dim_type: DimType,
}

/// A chunk of at most `capacity` points.
pub struct PointBuffer {
    data: Vec<u8>,
    columns: Vec<Column>,
    point_size: usize,
    capacity: usize,
    len: usize,
}

impl PointBuffer {
    /// Allocate a buffer for `capacity` points of `schema`.
    ///
    /// The schema must be frozen so the layout cannot change underneath us.
    pub fn new(schema: &Schema, capacity: usize) -> Self {
        assert!(
            schema.is_frozen(),
            "PointBuffer allocated against an unfrozen schema"
        );
        let columns = schema
            .iter()
            .map(|d| Column {
                offset: d.offset,
                dim_type: d.dim_type,
            })
            .collect();
        let point_size = schema.point_size();
        Self {
            data: vec![0u8; point_size * capacity],
            columns,
            point_size,
            capacity,
            len: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of valid points.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes held by the buffer: `capacity * point_size`.
    pub fn footprint(&self) -> usize {
        self.data.len()
    }

    /// Mark the first `n` points valid. Producers call this after writing.
    #[inline]
    pub fn set_len(&mut self, n: usize) {
        assert!(
            n <= self.capacity,
            "valid count {} exceeds buffer capacity {}",
            n,
            self.capacity
        );
        self.len = n;
    }

    /// Invalidate all points (just resets the count, no zeroing).
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    #[inline]
    fn column(&self, dim: DimId) -> Column {
        match self.columns.get(dim.index()) {
            Some(c) if dim.is_valid() => *c,
            _ => panic!("{} is not part of this buffer's layout", dim),
        }
    }

    /// Read a valid point's value. `index` must be `< len()`.
    #[inline]
    pub fn get(&self, dim: DimId, index: usize) -> f64 {
        assert!(
            index < self.len,
            "point index {} out of range (valid count {})",
            index,
            self.len
        );
        let col = self.column(dim);
        let start = index * self.point_size + col.offset;
        col.dim_type
            .decode(&self.data[start..start + col.dim_type.size_bytes()])
    }

    /// Write a value. `index` must be `< capacity()`.
    #[inline]
    pub fn set(&mut self, dim: DimId, index: usize, value: f64) {
        assert!(
            index < self.capacity,
            "point index {} exceeds buffer capacity {}",
            index,
            self.capacity
        );
        let col = self.column(dim);
        let start = index * self.point_size + col.offset;
        col.dim_type
            .encode(value, &mut self.data[start..start + col.dim_type.size_bytes()]);
    }

    /// Iterate the values of one dimension over the valid points.
    pub fn values(&self, dim: DimId) -> impl Iterator<Item = f64> + '_ {
        let col = self.column(dim);
        let width = col.dim_type.size_bytes();
        self.data[..self.len * self.point_size]
            .chunks_exact(self.point_size.max(1))
            .map(move |rec| col.dim_type.decode(&rec[col.offset..col.offset + width]))
    }
}

impl std::fmt::Debug for PointBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("point_size", &self.point_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> (Schema, DimId, DimId) {
        let mut schema = Schema::new();
        let x = schema.add_dimension("X", DimType::F64, "test").unwrap();
        let c = schema
            .add_dimension("Classification", DimType::U8, "test")
            .unwrap();
        schema.freeze();
        (schema, x, c)
    }

    #[test]
    fn test_set_and_get() {
        let (schema, x, c) = schema();
        let mut buf = PointBuffer::new(&schema, 4);
        assert!(buf.is_empty());
        assert_eq!(buf.footprint(), 4 * 9);

        for i in 0..3 {
            buf.set(x, i, i as f64 * 0.5);
            buf.set(c, i, 2.0);
        }
        buf.set_len(3);

        assert_eq!(buf.get(x, 2), 1.0);
        assert_eq!(buf.get(c, 1), 2.0);
        let xs: Vec<f64> = buf.values(x).collect();
        assert_eq!(xs, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let (schema, x, _) = schema();
        let mut buf = PointBuffer::new(&schema, 2);
        buf.set(x, 1, 7.0);
        buf.set_len(2);
        buf.clear();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), 2);
        assert_eq!(buf.values(x).count(), 0);
    }

    #[test]
    #[should_panic(expected = "exceeds buffer capacity")]
    fn test_set_len_past_capacity_panics() {
        let (schema, _, _) = schema();
        let mut buf = PointBuffer::new(&schema, 2);
        buf.set_len(3);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_get_past_valid_count_panics() {
        let (schema, x, _) = schema();
        let mut buf = PointBuffer::new(&schema, 2);
        buf.set(x, 1, 1.0);
        buf.set_len(1);
        buf.get(x, 1);
    }

    #[test]
    #[should_panic(expected = "not part of this buffer's layout")]
    fn test_foreign_dimension_panics() {
        let (schema, _, _) = schema();
        let mut buf = PointBuffer::new(&schema, 1);
        buf.set(DimId(9), 0, 1.0);
    }

    #[test]
    #[should_panic(expected = "unfrozen schema")]
    fn test_unfrozen_schema_panics() {
        let schema = Schema::new();
        let _ = PointBuffer::new(&schema, 1);
    }
}
