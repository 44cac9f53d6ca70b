//! Padded batch encoding with per-row valid lengths.

use ndarray::Array2;
use tokenizers::Encoding;

use crate::error::{Error, Result};

/// A right-padded batch of tokenized sentences.
///
/// The matrices are shaped `(batch, seq_len)` with every row padded to the
/// longest sequence in the batch. `lengths` records how many leading
/// positions of each row are real tokens rather than padding, so span
/// searches never scan into the pad region.
#[derive(Debug, Clone)]
pub struct EncodedBatch {
    /// Token-id matrix, one row per input sentence.
    pub input_ids: Array2<i64>,
    /// Attention mask: 1 for real tokens, 0 for padding.
    pub attention_mask: Array2<i64>,
    /// Token-type-id matrix (all zeros for single sequences).
    pub token_type_ids: Array2<i64>,
    lengths: Vec<usize>,
}

impl EncodedBatch {
    pub(crate) fn from_encodings(encodings: &[Encoding]) -> Result<Self> {
        if encodings.is_empty() {
            return Err(Error::EmptyInput);
        }

        // Extract the encoding length and batch size
        let encoding_length = encodings[0].len();
        let batch_size = encodings.len();

        let max_size = encoding_length * batch_size;

        // Preallocate the flat buffers with the full batch size
        let mut ids_array = Vec::with_capacity(max_size);
        let mut mask_array = Vec::with_capacity(max_size);
        let mut typeids_array = Vec::with_capacity(max_size);
        let mut lengths = Vec::with_capacity(batch_size);

        for encoding in encodings {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let typeids = encoding.get_type_ids();

            lengths.push(mask.iter().filter(|&&m| m == 1).count());
            ids_array.extend(ids.iter().map(|x| *x as i64));
            mask_array.extend(mask.iter().map(|x| *x as i64));
            typeids_array.extend(typeids.iter().map(|x| *x as i64));
        }

        Ok(Self {
            input_ids: Array2::from_shape_vec((batch_size, encoding_length), ids_array)?,
            attention_mask: Array2::from_shape_vec((batch_size, encoding_length), mask_array)?,
            token_type_ids: Array2::from_shape_vec((batch_size, encoding_length), typeids_array)?,
            lengths,
        })
    }

    /// Number of rows in the batch.
    pub fn batch_size(&self) -> usize {
        self.input_ids.nrows()
    }

    /// Padded sequence length shared by every row.
    pub fn seq_len(&self) -> usize {
        self.input_ids.ncols()
    }

    /// Per-row counts of real (non-padding) tokens.
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Token ids of one row with padding stripped.
    ///
    /// Panics if `row` is out of bounds.
    pub fn row_ids(&self, row: usize) -> Vec<u32> {
        self.input_ids
            .row(row)
            .iter()
            .take(self.lengths[row])
            .map(|&id| id as u32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokenizers::models::wordlevel::WordLevel;
    use tokenizers::pre_tokenizers::whitespace::WhitespaceSplit;
    use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer};

    fn tokenizer() -> Tokenizer {
        let vocab: HashMap<String, u32> = ["the", "cat", "sat", "on", "mat", "[UNK]", "[PAD]"]
            .iter()
            .enumerate()
            .map(|(id, token)| (token.to_string(), id as u32))
            .collect();
        let model = WordLevel::builder()
            .vocab(vocab.into_iter().collect())
            .unk_token("[UNK]".to_string())
            .build()
            .unwrap();
        let mut tokenizer = Tokenizer::new(model);
        tokenizer.with_pre_tokenizer(Some(WhitespaceSplit));
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            pad_token: "[PAD]".to_string(),
            pad_id: 6,
            ..Default::default()
        }));
        tokenizer
    }

    #[test]
    fn test_from_encodings_pads_and_tracks_lengths() {
        let encodings = tokenizer()
            .encode_batch(vec!["the cat sat on the mat", "the cat"], true)
            .unwrap();
        let batch = EncodedBatch::from_encodings(&encodings).unwrap();

        assert_eq!(batch.batch_size(), 2);
        assert_eq!(batch.seq_len(), 6);
        assert_eq!(batch.lengths(), &[6, 2]);

        // Short row is padded on the right with the pad id.
        assert_eq!(batch.input_ids[[1, 0]], 0);
        assert_eq!(batch.input_ids[[1, 1]], 1);
        assert_eq!(batch.input_ids[[1, 2]], 6);
        assert_eq!(batch.attention_mask[[1, 2]], 0);
    }

    #[test]
    fn test_row_ids_strips_padding() {
        let encodings = tokenizer()
            .encode_batch(vec!["the cat sat on the mat", "the cat"], true)
            .unwrap();
        let batch = EncodedBatch::from_encodings(&encodings).unwrap();

        assert_eq!(batch.row_ids(0), vec![0, 1, 2, 3, 0, 4]);
        assert_eq!(batch.row_ids(1), vec![0, 1]);
    }

    #[test]
    fn test_from_encodings_empty() {
        let err = EncodedBatch::from_encodings(&[]).unwrap_err();
        assert!(matches!(err, Error::EmptyInput));
    }
}
