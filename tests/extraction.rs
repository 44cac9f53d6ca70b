//! End-to-end extraction tests against a deterministic fake backend.
//!
//! The fake's hidden state at `(row, pos, d)` for layer `l` is a pure
//! function of the token id at that position, so expected pooled vectors can
//! be computed by hand from the vocabulary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::Array3;
use tokenizers::models::wordlevel::WordLevel;
use tokenizers::pre_tokenizers::whitespace::WhitespaceSplit;
use tokenizers::Tokenizer;

use contextembed::{
    load_tokenizer, EncodedBatch, Error, Layer, Result, SpanEmbeddings, TokenizerFiles,
    TransformerBackend, WordEmbedding, WordTarget,
};

const NUM_LAYERS: usize = 2;
const HIDDEN_DIM: usize = 4;
const EPS: f32 = 1e-6;

/// Deterministic stand-in for a pretrained transformer.
struct FakeBackend {
    layers: usize,
    hidden_dim: usize,
    resized_to: Arc<AtomicUsize>,
}

impl FakeBackend {
    fn new(resized_to: Arc<AtomicUsize>) -> Self {
        Self {
            layers: NUM_LAYERS,
            hidden_dim: HIDDEN_DIM,
            resized_to,
        }
    }
}

/// Hidden-state value of token `id` at position `pos`, layer `layer`,
/// dimension `d`.
fn fake_value(id: u32, layer: usize, pos: usize, d: usize) -> f32 {
    id as f32 * 10.0 + layer as f32 + pos as f32 * 0.25 + d as f32 * 0.5
}

impl TransformerBackend for FakeBackend {
    fn num_hidden_layers(&self) -> usize {
        self.layers
    }

    fn forward(&self, batch: &EncodedBatch) -> Result<Vec<Array3<f32>>> {
        let (batch_size, seq_len) = batch.input_ids.dim();
        Ok((0..=self.layers)
            .map(|layer| {
                Array3::from_shape_fn((batch_size, seq_len, self.hidden_dim), |(row, pos, d)| {
                    fake_value(batch.input_ids[[row, pos]] as u32, layer, pos, d)
                })
            })
            .collect())
    }

    fn resize_token_embeddings(&mut self, new_vocab_size: usize) -> Result<()> {
        self.resized_to.store(new_vocab_size, Ordering::SeqCst);
        Ok(())
    }
}

// Word-level vocabulary: the=0 cat=1 sat=2 on=3 mat=4 dog=5 ran=6 away=7
fn word_tokenizer() -> Tokenizer {
    let vocab: HashMap<String, u32> = ["the", "cat", "sat", "on", "mat", "dog", "ran", "away", "[UNK]"]
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
    tokenizer
}

fn extractor() -> WordEmbedding {
    WordEmbedding::from_backend(
        word_tokenizer(),
        Box::new(FakeBackend::new(Arc::new(AtomicUsize::new(0)))),
    )
    .unwrap()
}

fn expected_mean(ids_and_positions: &[(u32, usize)], layer: usize) -> Vec<f32> {
    (0..HIDDEN_DIM)
        .map(|d| {
            ids_and_positions
                .iter()
                .map(|&(id, pos)| fake_value(id, layer, pos, d))
                .sum::<f32>()
                / ids_and_positions.len() as f32
        })
        .collect()
}

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < EPS, "{actual:?} != {expected:?}");
    }
}

#[test]
fn test_init_registers_pad_token_and_resizes_backend() {
    let resized_to = Arc::new(AtomicUsize::new(0));
    let extractor = WordEmbedding::from_backend(
        word_tokenizer(),
        Box::new(FakeBackend::new(resized_to.clone())),
    )
    .unwrap();

    // Vocabulary had 9 entries and no pad token; one was added.
    assert_eq!(resized_to.load(Ordering::SeqCst), 10);
    assert!(extractor.tokenizer.get_padding().is_some());
}

#[test]
fn test_tokenizer_loaded_from_files_without_pad_token_is_resized_at_init() {
    // The constructor sequence for user-supplied model files: load the
    // tokenizer from bytes, then hand it to from_backend.
    let tokenizer_file = word_tokenizer().to_string(false).unwrap().into_bytes();
    let files = TokenizerFiles {
        tokenizer_file,
        config_file: br#"{"num_hidden_layers": 2}"#.to_vec(),
        special_tokens_map_file: b"{}".to_vec(),
        tokenizer_config_file: br#"{"model_max_length": 512}"#.to_vec(),
    };

    let tokenizer = load_tokenizer(files, 512).unwrap();
    assert!(tokenizer.get_padding().is_none());

    let resized_to = Arc::new(AtomicUsize::new(0));
    let extractor = WordEmbedding::from_backend(
        tokenizer,
        Box::new(FakeBackend::new(resized_to.clone())),
    )
    .unwrap();

    // The fallback pad token grew the vocabulary from 9 to 10 entries, and
    // the backend's embedding table was resized to match.
    assert_eq!(resized_to.load(Ordering::SeqCst), 10);
    assert!(extractor.tokenizer.get_padding().is_some());
}

#[test]
fn test_pooled_vector_is_span_mean() {
    let extractor = extractor();
    let items: Vec<(&str, WordTarget)> = vec![("the cat sat on the mat", "cat".into())];

    let pooled = extractor
        .extract_representation(&items, Layer::default())
        .unwrap()
        .into_single()
        .unwrap();

    assert_eq!(pooled.len(), 1);
    // "cat" is token 1 at position 1; the final layer is layer 2.
    assert_close(&pooled[0], &expected_mean(&[(1, 1)], NUM_LAYERS));
}

#[test]
fn test_phrase_target_pools_over_all_its_tokens() {
    let extractor = extractor();
    let items: Vec<(&str, WordTarget)> = vec![("the cat sat on the mat", "sat on".into())];

    let pooled = extractor
        .extract_representation(&items, Layer::default())
        .unwrap()
        .into_single()
        .unwrap();

    assert_close(&pooled[0], &expected_mean(&[(2, 2), (3, 3)], NUM_LAYERS));
}

#[test]
fn test_explicit_indices_match_literal_text() {
    let extractor = extractor();
    let sentence = "the cat sat on the mat";
    let by_text: Vec<(&str, WordTarget)> = vec![(sentence, "cat".into())];
    let by_indices: Vec<(&str, WordTarget)> = vec![(sentence, (1, 2).into())];

    let text_result = extractor
        .extract_representation(&by_text, Layer::default())
        .unwrap();
    let indices_result = extractor
        .extract_representation(&by_indices, Layer::default())
        .unwrap();

    assert_eq!(text_result, indices_result);
}

#[test]
fn test_paired_extraction_yields_independent_vectors() {
    let extractor = extractor();
    let items: Vec<(&str, WordTarget, WordTarget)> =
        vec![("the cat sat on the mat", "cat".into(), "mat".into())];

    let (first, second) = extractor
        .extract_paired_representations(&items, Layer::default())
        .unwrap();

    let first = first.into_single().unwrap();
    let second = second.into_single().unwrap();
    assert_close(&first[0], &expected_mean(&[(1, 1)], NUM_LAYERS));
    assert_close(&second[0], &expected_mean(&[(4, 5)], NUM_LAYERS));
}

#[test]
fn test_batch_order_does_not_change_per_item_vectors() {
    let extractor = extractor();
    let a = ("the cat sat on the mat", WordTarget::from("cat"));
    let b = ("the dog ran away", WordTarget::from("dog"));

    let forward = extractor
        .extract_representation(&[a.clone(), b.clone()], Layer::default())
        .unwrap()
        .into_single()
        .unwrap();
    let reversed = extractor
        .extract_representation(&[b, a], Layer::default())
        .unwrap()
        .into_single()
        .unwrap();

    assert_eq!(forward[0], reversed[1]);
    assert_eq!(forward[1], reversed[0]);
}

#[test]
fn test_padding_does_not_contaminate_short_rows() {
    let extractor = extractor();
    let short = ("the dog ran away", WordTarget::from("ran"));

    let alone = extractor
        .extract_representation(&[short.clone()], Layer::default())
        .unwrap()
        .into_single()
        .unwrap();
    // Batched with a longer sentence, the short row is right-padded.
    let batched = extractor
        .extract_representation(
            &[short, ("the cat sat on the mat", WordTarget::from("mat"))],
            Layer::default(),
        )
        .unwrap()
        .into_single()
        .unwrap();

    assert_eq!(alone[0], batched[0]);
}

#[test]
fn test_final_layer_index_equals_default() {
    let extractor = extractor();
    let items: Vec<(&str, WordTarget)> = vec![("the cat sat on the mat", "cat".into())];

    let by_default = extractor
        .extract_representation(&items, Layer::default())
        .unwrap();
    let by_index = extractor
        .extract_representation(&items, Layer::Index(NUM_LAYERS))
        .unwrap();

    assert_eq!(by_default, by_index);
}

#[test]
fn test_layer_out_of_range_fails_before_any_computation() {
    let extractor = extractor();
    let items: Vec<(&str, WordTarget)> = vec![("the cat sat on the mat", "cat".into())];

    let err = extractor
        .extract_representation(&items, Layer::Index(NUM_LAYERS + 1))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidLayer {
            requested: 3,
            available: 2
        }
    ));
}

#[test]
fn test_all_layers_returns_embedding_layer_plus_each_transformer_layer() {
    let extractor = extractor();
    let items: Vec<(&str, WordTarget)> = vec![("the cat sat on the mat", "cat".into())];

    let all = extractor
        .extract_representation(&items, Layer::All)
        .unwrap();
    assert_eq!(all.layer_count(), NUM_LAYERS + 1);

    match all {
        SpanEmbeddings::All(per_layer) => {
            for (layer, batch) in per_layer.iter().enumerate() {
                assert_close(&batch[0], &expected_mean(&[(1, 1)], layer));
            }
        }
        SpanEmbeddings::Single(_) => panic!("expected per-layer output"),
    }
}

#[test]
fn test_encode_batch_shapes() {
    let extractor = extractor();
    let (batch, hidden) = extractor
        .encode_batch(&["the cat sat on the mat", "the dog ran"], Layer::All)
        .unwrap();

    assert_eq!(batch.batch_size(), 2);
    assert_eq!(batch.seq_len(), 6);
    assert_eq!(batch.lengths(), &[6, 3]);
    assert_eq!(hidden.layer_count(), NUM_LAYERS + 1);
}

#[test]
fn test_extraction_is_idempotent() {
    let extractor = extractor();
    let items: Vec<(&str, WordTarget)> = vec![
        ("the cat sat on the mat", "sat on".into()),
        ("the dog ran away", "away".into()),
    ];

    let first = extractor
        .extract_representation(&items, Layer::All)
        .unwrap();
    let second = extractor
        .extract_representation(&items, Layer::All)
        .unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_missing_word_fails_the_whole_batch() {
    let extractor = extractor();
    let items: Vec<(&str, WordTarget)> = vec![
        ("the cat sat on the mat", "cat".into()),
        ("the dog ran away", "zebra".into()),
    ];

    let err = extractor
        .extract_representation(&items, Layer::default())
        .unwrap_err();
    assert!(matches!(err, Error::WordNotFound { ref word, .. } if word == "zebra"));
}

#[test]
fn test_empty_batch_is_rejected() {
    let extractor = extractor();
    let items: Vec<(&str, WordTarget)> = Vec::new();

    let err = extractor
        .extract_representation(&items, Layer::default())
        .unwrap_err();
    assert!(matches!(err, Error::EmptyInput));
}

#[test]
fn test_context_cosine_is_loudly_unsupported() {
    let extractor = extractor();
    let err = extractor
        .context_cosine("the cat sat on the mat", "cat", Layer::default())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Unsupported {
            operation: "context_cosine"
        }
    ));
}
