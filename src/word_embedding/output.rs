//! Layer selection and output shapes for the [`WordEmbedding`] extractor.

use ndarray::Array3;

use crate::Embedding;

#[cfg(doc)]
use super::WordEmbedding;

/// Which layer's hidden states to return.
///
/// Layer 0 is the input embedding layer and `num_hidden_layers` the final
/// transformer layer, so valid indices run `0..=num_hidden_layers`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Layer {
    /// The final transformer layer. This is the default.
    #[default]
    Final,
    /// A single layer by index.
    Index(usize),
    /// Every layer, embedding layer first.
    All,
}

/// Hidden states for one encoded batch, in host memory regardless of the
/// execution provider the forward pass ran on.
#[derive(Debug, Clone)]
pub enum HiddenStates {
    /// One layer's `(batch, seq_len, hidden_dim)` tensor.
    Single(Array3<f32>),
    /// All layers, embedding layer first: `num_hidden_layers + 1` tensors.
    All(Vec<Array3<f32>>),
}

impl HiddenStates {
    /// Number of layer tensors carried.
    pub fn layer_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::All(layers) => layers.len(),
        }
    }
}

/// Pooled span representations: one vector per input item, per requested
/// layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SpanEmbeddings {
    /// One layer: a batch of pooled vectors, one per item.
    Single(Vec<Embedding>),
    /// All layers: outer index is the layer, inner the batch.
    All(Vec<Vec<Embedding>>),
}

impl SpanEmbeddings {
    /// Number of layer entries carried.
    pub fn layer_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::All(layers) => layers.len(),
        }
    }

    /// The single-layer batch, if this is a single-layer result.
    pub fn as_single(&self) -> Option<&[Embedding]> {
        match self {
            Self::Single(batch) => Some(batch),
            Self::All(_) => None,
        }
    }

    /// Consume into the single-layer batch, if this is a single-layer
    /// result.
    pub fn into_single(self) -> Option<Vec<Embedding>> {
        match self {
            Self::Single(batch) => Some(batch),
            Self::All(_) => None,
        }
    }
}
