//! Block geometry: how many bytes make up one produced item

use crate::error::{SourceError, SourceResult};

/// Fixed item layout, set at construction and never changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGeometry {
    item_size: usize,
    vector_length: usize,
    block_size: usize,
}

impl BlockGeometry {
    /// Build the geometry for `item_size`-byte items grouped `vector_length` at a time
    pub fn new(item_size: usize, vector_length: usize) -> SourceResult<Self> {
        if item_size == 0 {
            return Err(SourceError::Geometry("item size must be positive".into()));
        }
        if vector_length == 0 {
            return Err(SourceError::Geometry("vector length must be positive".into()));
        }
        let block_size = item_size.checked_mul(vector_length).ok_or_else(|| {
            SourceError::Geometry(format!(
                "item size {} x vector length {} overflows",
                item_size, vector_length
            ))
        })?;

        Ok(Self {
            item_size,
            vector_length,
            block_size,
        })
    }

    /// Bytes per item
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Items per transfer unit
    pub fn vector_length(&self) -> usize {
        self.vector_length
    }

    /// Bytes per produced item-group
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Bytes needed to satisfy a demand of `items`
    pub fn demand_bytes(&self, items: usize) -> SourceResult<usize> {
        items
            .checked_mul(self.block_size)
            .ok_or(SourceError::DemandOverflow { items })
    }
}
