//! Decoder key/value cache.
//!
//! One `(1, heads, cached_len, head_dim)` tensor per layer and per
//! [`KvKind`], stored in a fixed vector. A cache is always replaced as a
//! whole, so every tensor has the same `cached_len`; construction enforces it.

use crate::core::errors::{OCRError, SimpleError};
use ndarray::Array4;

/// Which half of a layer's attention cache a tensor holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KvKind {
    Key,
    Value,
}

impl KvKind {
    /// Both kinds in the order the decoder graph lists them.
    pub const ALL: [KvKind; 2] = [KvKind::Key, KvKind::Value];

    pub const fn index(self) -> usize {
        match self {
            KvKind::Key => 0,
            KvKind::Value => 1,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            KvKind::Key => "key",
            KvKind::Value => "value",
        }
    }
}

/// Dimensions shared by every tensor of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLayout {
    pub num_layers: usize,
    pub num_heads: usize,
    pub head_dim: usize,
}

impl CacheLayout {
    pub const fn new(num_layers: usize, num_heads: usize, head_dim: usize) -> Self {
        Self {
            num_layers,
            num_heads,
            head_dim,
        }
    }

    /// Number of tensors in a cache with this layout.
    pub const fn tensor_count(&self) -> usize {
        self.num_layers * KvKind::ALL.len()
    }

    /// Position of `(layer, kind)` in the flat tensor vector. This is also
    /// the order of the `present` outputs of the decoder after the logits.
    pub const fn slot(&self, layer: usize, kind: KvKind) -> usize {
        layer * KvKind::ALL.len() + kind.index()
    }
}

/// The attention cache carried between decode steps.
#[derive(Debug, Clone)]
pub struct KvCache {
    layout: CacheLayout,
    cached_len: usize,
    tensors: Vec<Array4<f32>>,
}

impl KvCache {
    /// A cache holding no positions, used for the first decode step.
    pub fn empty(layout: CacheLayout) -> Self {
        let tensors = (0..layout.tensor_count())
            .map(|_| Array4::zeros((1, layout.num_heads, 0, layout.head_dim)))
            .collect();
        Self {
            layout,
            cached_len: 0,
            tensors,
        }
    }

    /// Builds a cache from tensors ordered by [`CacheLayout::slot`].
    ///
    /// # Errors
    ///
    /// Returns `OCRError::TensorOperation` if the tensor count is wrong or any
    /// tensor deviates from `(1, heads, len, head_dim)` with a common `len`.
    pub fn from_tensors(layout: CacheLayout, tensors: Vec<Array4<f32>>) -> Result<Self, OCRError> {
        if tensors.len() != layout.tensor_count() {
            return Err(OCRError::tensor_operation_error(
                "kv_cache_assembly",
                &[layout.tensor_count()],
                &[tensors.len()],
                "decoder returned the wrong number of cache tensors",
                SimpleError::new("cache tensor count mismatch"),
            ));
        }

        let cached_len = tensors.first().map(|t| t.shape()[2]).unwrap_or(0);
        let expected = [1, layout.num_heads, cached_len, layout.head_dim];
        for (slot, tensor) in tensors.iter().enumerate() {
            if tensor.shape() != expected {
                return Err(OCRError::tensor_operation_error(
                    "kv_cache_assembly",
                    &expected,
                    tensor.shape(),
                    &format!(
                        "cache tensor for layer {} ({}) has an unexpected shape",
                        slot / KvKind::ALL.len(),
                        KvKind::ALL[slot % KvKind::ALL.len()].as_str()
                    ),
                    SimpleError::new("cache tensor shape mismatch"),
                ));
            }
        }

        Ok(Self {
            layout,
            cached_len,
            tensors,
        })
    }

    pub fn layout(&self) -> CacheLayout {
        self.layout
    }

    /// Number of positions held by every tensor.
    pub fn cached_len(&self) -> usize {
        self.cached_len
    }

    pub fn get(&self, layer: usize, kind: KvKind) -> Option<&Array4<f32>> {
        if layer >= self.layout.num_layers {
            return None;
        }
        self.tensors.get(self.layout.slot(layer, kind))
    }

    /// Iterates `(layer, kind, tensor)` in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, KvKind, &Array4<f32>)> {
        self.tensors.iter().enumerate().map(|(slot, tensor)| {
            (
                slot / KvKind::ALL.len(),
                KvKind::ALL[slot % KvKind::ALL.len()],
                tensor,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> CacheLayout {
        CacheLayout::new(2, 3, 4)
    }

    #[test]
    fn test_empty_cache_shapes() {
        let cache = KvCache::empty(layout());
        assert_eq!(cache.cached_len(), 0);
        assert_eq!(cache.iter().count(), 4);
        for (_, _, tensor) in cache.iter() {
            assert_eq!(tensor.shape(), &[1, 3, 0, 4]);
        }
    }

    #[test]
    fn test_slot_order_matches_iteration() {
        let l = layout();
        assert_eq!(l.slot(0, KvKind::Key), 0);
        assert_eq!(l.slot(0, KvKind::Value), 1);
        assert_eq!(l.slot(1, KvKind::Key), 2);

        let tensors = (0..4)
            .map(|i| Array4::from_elem((1, 3, 5, 4), i as f32))
            .collect();
        let cache = KvCache::from_tensors(l, tensors).unwrap();
        assert_eq!(cache.cached_len(), 5);
        assert_eq!(cache.get(1, KvKind::Value).unwrap()[[0, 0, 0, 0]], 3.0);
        assert!(cache.get(2, KvKind::Key).is_none());

        let order: Vec<_> = cache.iter().map(|(layer, kind, _)| (layer, kind)).collect();
        assert_eq!(
            order,
            vec![
                (0, KvKind::Key),
                (0, KvKind::Value),
                (1, KvKind::Key),
                (1, KvKind::Value)
            ]
        );
    }

    #[test]
    fn test_unequal_lengths_are_rejected() {
        let mut tensors: Vec<_> = (0..4).map(|_| Array4::zeros((1, 3, 5, 4))).collect();
        tensors[3] = Array4::zeros((1, 3, 6, 4));
        assert!(matches!(
            KvCache::from_tensors(layout(), tensors),
            Err(OCRError::TensorOperation { .. })
        ));
    }

    #[test]
    fn test_wrong_count_is_rejected() {
        let tensors = vec![Array4::zeros((1, 3, 1, 4)); 3];
        assert!(KvCache::from_tensors(layout(), tensors).is_err());
    }
}
