//! Identity types for the pipeline system.
//!
//! All IDs are newtypes over `u32` that serve as direct array indices
//! into their respective storage vectors, providing O(1) lookup.

use std::fmt;

/// Index into `Schema::dimensions`. Issued once at registration and stable
/// for the lifetime of the schema.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DimId(pub u32);

impl DimId {
    pub const INVALID: DimId = DimId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for DimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "DimId(INVALID)")
        } else {
            write!(f, "DimId({})", self.0)
        }
    }
}

impl fmt::Display for DimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Index into `Pipeline::stages`. Stage 0 is always the producer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StageId(pub u32);

impl StageId {
    pub const INVALID: StageId = StageId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "StageId(INVALID)")
        } else {
            write!(f, "StageId({})", self.0)
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Index into `MetadataTree::nodes`. `MetaId(0)` is the root.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MetaId(pub u32);

impl MetaId {
    pub const ROOT: MetaId = MetaId(0);
    pub const INVALID: MetaId = MetaId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for MetaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "MetaId(INVALID)")
        } else {
            write!(f, "MetaId({})", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dim_id() {
        let id = DimId(42);
        assert!(id.is_valid());
        assert_eq!(id.index(), 42);
        assert!(!DimId::INVALID.is_valid());
        assert_eq!(format!("{:?}", DimId::INVALID), "DimId(INVALID)");
    }
}
