//! Span pooling over hidden-state tensors.

use ndarray::{s, Array2, Array3, Axis};

use crate::error::{Error, Result};

/// Mean-pool each row of `hidden` over that row's token span.
///
/// `hidden` is shaped `(batch, seq_len, hidden_dim)`; `spans` holds one
/// half-open `(start, end)` token range per row. Each row is pooled over its
/// own boundaries, so differently-located spans across the batch are fine.
/// Returns a `(batch, hidden_dim)` matrix.
pub fn mean_over_spans(hidden: &Array3<f32>, spans: &[(usize, usize)]) -> Result<Array2<f32>> {
    let (batch_size, seq_len, hidden_dim) = hidden.dim();
    if spans.len() != batch_size {
        return Err(Error::Tensor {
            message: format!(
                "{} spans provided for a batch of {batch_size} rows",
                spans.len()
            ),
        });
    }

    let mut pooled = Vec::with_capacity(batch_size * hidden_dim);
    for (row, &(start, end)) in spans.iter().enumerate() {
        if start >= end || end > seq_len {
            return Err(Error::Tensor {
                message: format!(
                    "span {start}..{end} out of bounds for sequence length {seq_len}"
                ),
            });
        }
        let mean = hidden
            .slice(s![row, start..end, ..])
            .mean_axis(Axis(0))
            .ok_or_else(|| Error::Tensor {
                message: format!("cannot pool empty span {start}..{end}"),
            })?;
        pooled.extend(mean.iter());
    }

    Ok(Array2::from_shape_vec((batch_size, hidden_dim), pooled)?)
}
