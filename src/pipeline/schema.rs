//! Dimension registry for the pipeline.
//!
//! Dimensions live in a flat `Vec<Dimension>` indexed by `DimId`, with name
//! indexes on the side. Every dimension is registered by a stage and carries
//! that stage's identity as its namespace, so two stages may both emit `X`:
//!
//! ```text
//! DimId(0)  readers.faux.X      (f64, offset 0)
//! DimId(1)  readers.faux.Y      (f64, offset 8)
//! DimId(2)  readers.faux.Z      (f64, offset 16)
//! DimId(3)  reproj.X            (f64, offset 24)
//! ```
//!
//! A bare `X` resolves to the most recently registered candidate
//! (`reproj.X` above), since stages prepare upstream-first.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::DimId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Numeric storage type of a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl DimType {
    /// Storage width in bytes.
    pub fn size_bytes(&self) -> usize {
        match self {
            DimType::U8 | DimType::I8 => 1,
            DimType::U16 | DimType::I16 => 2,
            DimType::U32 | DimType::I32 | DimType::F32 => 4,
            DimType::U64 | DimType::I64 | DimType::F64 => 8,
        }
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, DimType::F32 | DimType::F64)
    }

    /// Decode a little-endian value. `bytes` must be exactly `size_bytes()` long.
    pub fn decode(&self, bytes: &[u8]) -> f64 {
        match self {
            DimType::U8 => bytes[0] as f64,
            DimType::I8 => bytes[0] as i8 as f64,
            DimType::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            DimType::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            DimType::U32 => u32::from_le_bytes(le4(bytes)) as f64,
            DimType::I32 => i32::from_le_bytes(le4(bytes)) as f64,
            DimType::F32 => f32::from_le_bytes(le4(bytes)) as f64,
            DimType::U64 => u64::from_le_bytes(le8(bytes)) as f64,
            DimType::I64 => i64::from_le_bytes(le8(bytes)) as f64,
            DimType::F64 => f64::from_le_bytes(le8(bytes)),
        }
    }

    /// Encode `value` into `out` (little-endian). Integer types saturate.
    pub fn encode(&self, value: f64, out: &mut [u8]) {
        match self {
            DimType::U8 => out[0] = value as u8,
            DimType::I8 => out[0] = (value as i8) as u8,
            DimType::U16 => out.copy_from_slice(&(value as u16).to_le_bytes()),
            DimType::I16 => out.copy_from_slice(&(value as i16).to_le_bytes()),
            DimType::U32 => out.copy_from_slice(&(value as u32).to_le_bytes()),
            DimType::I32 => out.copy_from_slice(&(value as i32).to_le_bytes()),
            DimType::F32 => out.copy_from_slice(&(value as f32).to_le_bytes()),
            DimType::U64 => out.copy_from_slice(&(value as u64).to_le_bytes()),
            DimType::I64 => out.copy_from_slice(&(value as i64).to_le_bytes()),
            DimType::F64 => out.copy_from_slice(&value.to_le_bytes()),
        }
    }
}

impl fmt::Display for DimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DimType::U8 => "uint8",
            DimType::U16 => "uint16",
            DimType::U32 => "uint32",
            DimType::U64 => "uint64",
            DimType::I8 => "int8",
            DimType::I16 => "int16",
            DimType::I32 => "int32",
            DimType::I64 => "int64",
            DimType::F32 => "float",
            DimType::F64 => "double",
        };
        f.write_str(s)
    }
}

#[inline]
fn le4(b: &[u8]) -> [u8; 4] {
    [b[0], b[1], b[2], b[3]]
}

#[inline]
fn le8(b: &[u8]) -> [u8; 8] {
    [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]
}

/// A single registered dimension. Immutable once registered.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub id: DimId,
    /// Base name, e.g. `"X"`.
    pub name: String,
    /// Identity of the registering stage, e.g. `"readers.faux"`.
    pub namespace: String,
    /// Full qualified name, e.g. `"readers.faux.X"`.
    pub qualified_name: String,
    pub dim_type: DimType,
    /// Byte offset within a point record.
    pub offset: usize,
}

impl Dimension {
    pub fn size_bytes(&self) -> usize {
        self.dim_type.size_bytes()
    }
}

/// Ordered, append-only dimension catalog.
///
/// - `DimId` is a direct index into `dimensions`.
/// - Qualified-name lookup is O(1); base-name lookup returns every candidate
///   in registration order.
/// - Once frozen, registration fails with `SchemaFrozen`.
#[derive(Debug, Default)]
pub struct Schema {
    dimensions: Vec<Dimension>,
    qualified_index: HashMap<String, DimId>,
    base_index: HashMap<String, Vec<DimId>>,
    point_size: usize,
    frozen: bool,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Bytes per point record.
    pub fn point_size(&self) -> usize {
        self.point_size
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Freeze the schema. Called when iteration begins; idempotent.
    pub fn freeze(&mut self) {
        if !self.frozen {
            tracing::debug!(
                "Schema frozen with {} dimensions ({} bytes/point)",
                self.dimensions.len(),
                self.point_size
            );
        }
        self.frozen = true;
    }

    /// Register `name` under the namespace `producer`.
    pub fn add_dimension(
        &mut self,
        name: &str,
        dim_type: DimType,
        producer: &str,
    ) -> PipelineResult<DimId> {
        let qualified = qualify(producer, name);
        if self.frozen {
            return Err(PipelineError::SchemaFrozen { name: qualified });
        }
        if name.is_empty() {
            return Err(PipelineError::Stage {
                stage: producer.to_string(),
                message: "dimension name must not be empty".to_string(),
            });
        }
        if self.qualified_index.contains_key(&qualified) {
            return Err(PipelineError::DuplicateDimension { name: qualified });
        }

        let id = DimId(self.dimensions.len() as u32);
        let dim = Dimension {
            id,
            name: name.to_string(),
            namespace: producer.to_string(),
            qualified_name: qualified.clone(),
            dim_type,
            offset: self.point_size,
        };
        self.point_size += dim.size_bytes();
        self.dimensions.push(dim);
        self.index_dimension(id);

        tracing::debug!("Registered dimension {} as {} ({})", qualified, id, dim_type);
        Ok(id)
    }

    fn index_dimension(&mut self, id: DimId) {
        let dim = &self.dimensions[id.index()];
        self.qualified_index.insert(dim.qualified_name.clone(), id);
        self.base_index.entry(dim.name.clone()).or_default().push(id);
    }

    /// Resolve a name to a dimension.
    ///
    /// With `exact`, only a literal qualified name matches. Otherwise a
    /// qualified match is tried first, then the base name, where the
    /// most-downstream registration wins.
    pub fn resolve(&self, name: &str, exact: bool) -> PipelineResult<DimId> {
        if let Some(&id) = self.qualified_index.get(name) {
            return Ok(id);
        }
        if exact {
            return Err(PipelineError::unknown_dimension(name));
        }

        let candidates = self.base_candidates(name);
        let id = most_downstream(candidates)
            .ok_or_else(|| PipelineError::unknown_dimension(name))?;
        if candidates.len() > 1 {
            tracing::warn!(
                "Dimension name '{}' is ambiguous ({} candidates), using {}",
                name,
                candidates.len(),
                self.dimensions[id.index()].qualified_name
            );
        }
        Ok(id)
    }

    /// Every dimension whose base name is `name`, in registration order.
    pub fn base_candidates(&self, name: &str) -> &[DimId] {
        self.base_index.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub fn get(&self, id: DimId) -> Option<&Dimension> {
        if id.is_valid() {
            self.dimensions.get(id.index())
        } else {
            None
        }
    }

    /// Panics on a handle this schema never issued.
    #[inline]
    pub fn dimension(&self, id: DimId) -> &Dimension {
        match self.get(id) {
            Some(dim) => dim,
            None => panic!("{} was not issued by this schema", id),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = DimId> + '_ {
        self.dimensions.iter().map(|d| d.id)
    }
}

/// Build the qualified name for a dimension.
pub fn qualify(producer: &str, name: &str) -> String {
    if producer.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", producer, name)
    }
}

/// Disambiguation policy for base-name lookups: the last registered
/// candidate, i.e. the one emitted by the most downstream stage.
pub fn most_downstream(candidates: &[DimId]) -> Option<DimId> {
    candidates.iter().copied().max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xyz_schema() -> Schema {
        let mut schema = Schema::new();
        schema.add_dimension("X", DimType::F64, "readers.faux").unwrap();
        schema.add_dimension("Y", DimType::F64, "readers.faux").unwrap();
        schema.add_dimension("Z", DimType::F64, "readers.faux").unwrap();
        schema
    }

    #[test]
    fn test_add_dimension_layout() {
        let mut schema = xyz_schema();
        let class = schema
            .add_dimension("Classification", DimType::U8, "readers.faux")
            .unwrap();

        assert_eq!(schema.len(), 4);
        assert_eq!(schema.point_size(), 25);
        let dim = schema.dimension(class);
        assert_eq!(dim.offset, 24);
        assert_eq!(dim.qualified_name, "readers.faux.Classification");
    }

    #[test]
    fn test_duplicate_qualified_name_rejected() {
        let mut schema = xyz_schema();
        let err = schema
            .add_dimension("X", DimType::F32, "readers.faux")
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::DuplicateDimension {
                name: "readers.faux.X".into()
            }
        );
        assert_eq!(schema.len(), 3);
    }

    #[test]
    fn test_frozen_schema_rejects_growth() {
        let mut schema = xyz_schema();
        schema.freeze();
        assert!(matches!(
            schema.add_dimension("W", DimType::F64, "late"),
            Err(PipelineError::SchemaFrozen { .. })
        ));
    }

    #[test]
    fn test_resolve_unambiguous() {
        let schema = xyz_schema();
        let by_base = schema.resolve("Y", false).unwrap();
        let by_qualified = schema.resolve("readers.faux.Y", false).unwrap();
        assert_eq!(by_base, by_qualified);
        assert_eq!(schema.resolve("readers.faux.Y", true).unwrap(), by_base);
    }

    #[test]
    fn test_resolve_prefers_most_downstream() {
        let mut schema = xyz_schema();
        let reproj_x = schema.add_dimension("X", DimType::F64, "reproj").unwrap();

        assert_eq!(schema.resolve("X", false).unwrap(), reproj_x);
        assert_eq!(schema.base_candidates("X").len(), 2);

        let original = schema.resolve("readers.faux.X", true).unwrap();
        assert_ne!(original, reproj_x);
    }

    #[test]
    fn test_resolve_exact_requires_qualified_name() {
        let schema = xyz_schema();
        assert_eq!(
            schema.resolve("X", true),
            Err(PipelineError::unknown_dimension("X"))
        );
        assert_eq!(
            schema.resolve("Intensity", false),
            Err(PipelineError::unknown_dimension("Intensity"))
        );
    }

    #[test]
    fn test_most_downstream_policy() {
        assert_eq!(most_downstream(&[]), None);
        assert_eq!(most_downstream(&[DimId(0), DimId(5), DimId(2)]), Some(DimId(5)));
    }

    #[test]
    fn test_dim_type_codec() {
        let mut buf = [0u8; 8];
        DimType::I16.encode(-1234.0, &mut buf[..2]);
        assert_eq!(DimType::I16.decode(&buf[..2]), -1234.0);

        DimType::F32.encode(1.5, &mut buf[..4]);
        assert_eq!(DimType::F32.decode(&buf[..4]), 1.5);

        DimType::U8.encode(300.0, &mut buf[..1]);
        assert_eq!(DimType::U8.decode(&buf[..1]), 255.0);
    }
}
