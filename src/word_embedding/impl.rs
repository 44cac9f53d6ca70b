//! The implementation of the main extractor struct - [`WordEmbedding`].

#[cfg(feature = "online")]
use std::path::PathBuf;

#[cfg(feature = "online")]
use anyhow::Context;
#[cfg(feature = "online")]
use hf_hub::{
    api::sync::{ApiBuilder, ApiRepo},
    Cache,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use tokenizers::Tokenizer;
use tracing::debug;
#[cfg(feature = "online")]
use tracing::info;

use crate::backend::{OrtBackend, TransformerBackend};
use crate::common;
use crate::encoding::EncodedBatch;
use crate::error::{Error, Result};
use crate::pooling;
use crate::spans::{self, WordTarget};
use crate::Embedding;

#[cfg(feature = "online")]
use super::InitOptions;
use super::{
    HiddenStates, InitOptionsUserDefined, Layer, SpanEmbeddings, UserDefinedTransformerModel,
    WordEmbedding,
};

impl WordEmbedding {
    /// Try to build a new WordEmbedding instance from a hub model identifier
    ///
    /// Uses the highest level of graph optimization
    ///
    /// Uses the total number of CPUs available as the number of intra-threads
    #[cfg(feature = "online")]
    pub fn try_new(options: InitOptions) -> Result<Self> {
        let InitOptions {
            model_name,
            model_file,
            execution_providers,
            max_length,
            cache_dir,
            show_download_progress,
        } = options;

        let threads = std::thread::available_parallelism()?.get();

        let model_repo = Self::retrieve_model(&model_name, cache_dir, show_download_progress)?;
        let model_file_reference = model_repo
            .get(&model_file)
            .context(format!("Failed to retrieve {model_file}"))?;

        let session = Session::builder()?
            .with_execution_providers(execution_providers)?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(model_file_reference)?;

        let tokenizer_files = common::fetch_tokenizer_files(&model_repo)?;
        let config: serde_json::Value = serde_json::from_slice(&tokenizer_files.config_file)?;
        let tokenizer = common::load_tokenizer(tokenizer_files, max_length)?;
        let backend = OrtBackend::from_config(session, &config)?;

        info!(model = %model_name, "loaded hub model");
        Self::from_backend(tokenizer, Box::new(backend))
    }

    /// Build a WordEmbedding instance from model files provided by the user.
    ///
    /// This can be used for 'bring your own' transformer models.
    pub fn try_new_from_user_defined(
        model: UserDefinedTransformerModel,
        options: InitOptionsUserDefined,
    ) -> Result<Self> {
        let InitOptionsUserDefined {
            execution_providers,
            max_length,
        } = options;

        let threads = std::thread::available_parallelism()?.get();

        let session = Session::builder()?
            .with_execution_providers(execution_providers)?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_memory(&model.onnx_file)?;

        let config: serde_json::Value = serde_json::from_slice(&model.tokenizer_files.config_file)?;
        let tokenizer = common::load_tokenizer(model.tokenizer_files, max_length)?;
        let backend = OrtBackend::from_config(session, &config)?;

        Self::from_backend(tokenizer, Box::new(backend))
    }

    /// Build an extractor from an already-loaded tokenizer and any
    /// forward-pass backend.
    ///
    /// This is the injection seam for custom runtimes and for deterministic
    /// test doubles. It performs the one-time setup step: if the tokenizer
    /// has no padding configuration, a pad token is registered and the
    /// backend is asked to resize its token embeddings to match.
    pub fn from_backend(
        mut tokenizer: Tokenizer,
        mut backend: Box<dyn TransformerBackend>,
    ) -> Result<Self> {
        if common::ensure_pad_token(&mut tokenizer)? {
            backend.resize_token_embeddings(tokenizer.get_vocab_size(true))?;
        }
        let layers = backend.num_hidden_layers();
        debug!(layers, "word embedding extractor ready");
        Ok(Self {
            tokenizer,
            backend,
            layers,
        })
    }

    /// Return the model repository from cache or remote retrieval
    #[cfg(feature = "online")]
    fn retrieve_model(
        model_name: &str,
        cache_dir: PathBuf,
        show_download_progress: bool,
    ) -> Result<ApiRepo> {
        let cache = Cache::new(cache_dir);
        let api = ApiBuilder::from_cache(cache)
            .with_progress(show_download_progress)
            .build()
            .context("Failed to build the hub client")?;

        Ok(api.model(model_name.to_string()))
    }

    /// Number of transformer layers, excluding the embedding layer.
    pub fn num_hidden_layers(&self) -> usize {
        self.layers
    }

    /// Tokenize a batch of sentences, padded to the longest row, and run one
    /// forward pass with hidden states enabled for every layer.
    ///
    /// Returns the padded token-id batch alongside the hidden states for the
    /// requested layer (or all layers). Outputs are host-memory tensors no
    /// matter which execution provider ran the forward pass.
    pub fn encode_batch<S: AsRef<str> + Send + Sync>(
        &self,
        texts: &[S],
        layer: Layer,
    ) -> Result<(EncodedBatch, HiddenStates)> {
        self.validate_layer(layer)?;
        if texts.is_empty() {
            return Err(Error::EmptyInput);
        }

        let inputs: Vec<&str> = texts.iter().map(|text| text.as_ref()).collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| Error::Tokenizer {
                message: e.to_string(),
            })?;
        let batch = EncodedBatch::from_encodings(&encodings)?;

        debug!(
            batch_size = batch.batch_size(),
            seq_len = batch.seq_len(),
            "running forward pass"
        );
        let mut states = self.backend.forward(&batch)?;
        if states.len() != self.layers + 1 {
            return Err(Error::Backend {
                message: format!(
                    "backend returned {} hidden-state tensors, expected {}",
                    states.len(),
                    self.layers + 1
                ),
            });
        }

        let hidden = match layer {
            Layer::All => HiddenStates::All(states),
            Layer::Final => HiddenStates::Single(states.swap_remove(self.layers)),
            Layer::Index(index) => HiddenStates::Single(states.swap_remove(index)),
        };

        Ok((batch, hidden))
    }

    /// Extract one pooled representation per item, for the requested layer.
    ///
    /// Each item pairs a sentence with a target: literal text located at its
    /// first occurrence, or an explicit word-index span. The target's token
    /// span is located per row, and the hidden-state vectors at that span
    /// are mean-pooled.
    pub fn extract_representation<S: AsRef<str> + Send + Sync>(
        &self,
        items: &[(S, WordTarget)],
        layer: Layer,
    ) -> Result<SpanEmbeddings> {
        let sentences: Vec<&str> = items.iter().map(|(sentence, _)| sentence.as_ref()).collect();
        let (encoded, hidden) = self.encode_batch(&sentences, layer)?;

        // Every span resolves before anything is pooled: one bad item fails
        // the whole call.
        let targets: Vec<(&str, &WordTarget)> = items
            .iter()
            .map(|(sentence, target)| (sentence.as_ref(), target))
            .collect();
        let token_spans = self.resolve_token_spans(&targets, &encoded)?;

        pool_spans(&hidden, &token_spans)
    }

    /// Extract pooled representations for two independent targets per
    /// sentence, sharing a single forward pass.
    ///
    /// Returns two parallel batches, e.g. for relational probing between two
    /// words of the same sentence.
    pub fn extract_paired_representations<S: AsRef<str> + Send + Sync>(
        &self,
        items: &[(S, WordTarget, WordTarget)],
        layer: Layer,
    ) -> Result<(SpanEmbeddings, SpanEmbeddings)> {
        let sentences: Vec<&str> = items
            .iter()
            .map(|(sentence, _, _)| sentence.as_ref())
            .collect();
        let (encoded, hidden) = self.encode_batch(&sentences, layer)?;

        let tokenizer = &self.tokenizer;
        let resolved: Vec<((usize, usize), (usize, usize))> = items
            .par_iter()
            .enumerate()
            .map(|(row, (sentence, first, second))| {
                let sentence = sentence.as_ref();
                let (word_span1, word_span2) =
                    spans::find_paired_word_spans(sentence, first, second)?;
                let span1 = token_span_at(tokenizer, sentence, word_span1, &encoded, row)?;
                let span2 = token_span_at(tokenizer, sentence, word_span2, &encoded, row)?;
                Ok((span1, span2))
            })
            .collect::<Result<_>>()?;
        let (spans1, spans2): (Vec<_>, Vec<_>) = resolved.into_iter().unzip();

        Ok((
            pool_spans(&hidden, &spans1)?,
            pool_spans(&hidden, &spans2)?,
        ))
    }

    /// Cosine similarity between a word's pooled representation and every
    /// other token in the same sentence.
    ///
    /// Not implemented; fails with [`Error::Unsupported`]. The legacy
    /// contract, recorded for a future implementation: pool the word's
    /// vector at its first occurrence, compute cosine similarity against
    /// every other token position (the word's own position excluded), and
    /// return the scores alongside the corresponding surface tokens.
    pub fn context_cosine(
        &self,
        _sentence: &str,
        _word: &str,
        _layer: Layer,
    ) -> Result<(Vec<String>, Vec<f32>)> {
        Err(Error::Unsupported {
            operation: "context_cosine",
        })
    }

    fn validate_layer(&self, layer: Layer) -> Result<()> {
        match layer {
            Layer::Index(index) if index > self.layers => Err(Error::InvalidLayer {
                requested: index,
                available: self.layers,
            }),
            _ => Ok(()),
        }
    }

    fn resolve_token_spans(
        &self,
        targets: &[(&str, &WordTarget)],
        encoded: &EncodedBatch,
    ) -> Result<Vec<(usize, usize)>> {
        let tokenizer = &self.tokenizer;
        targets
            .par_iter()
            .enumerate()
            .map(|(row, (sentence, target))| {
                let word_span = spans::find_word_span(sentence, target)?;
                token_span_at(tokenizer, sentence, word_span, encoded, row)
            })
            .collect()
    }
}

/// Locate the target's subword span inside one row of the encoded batch.
///
/// The target words are re-tokenized with a single leading space and without
/// special tokens, mimicking their mid-sentence form, then searched as a
/// contiguous id subsequence in the row's unpadded ids.
fn token_span_at(
    tokenizer: &Tokenizer,
    sentence: &str,
    word_span: (usize, usize),
    encoded: &EncodedBatch,
    row: usize,
) -> Result<(usize, usize)> {
    let query = format!(" {}", spans::span_text(sentence, word_span));
    let encoding = tokenizer
        .encode(query.as_str(), false)
        .map_err(|e| Error::Tokenizer {
            message: e.to_string(),
        })?;
    let haystack = encoded.row_ids(row);
    spans::find_token_span(encoding.get_ids(), &haystack)
}

fn pool_spans(hidden: &HiddenStates, token_spans: &[(usize, usize)]) -> Result<SpanEmbeddings> {
    match hidden {
        HiddenStates::Single(states) => Ok(SpanEmbeddings::Single(rows_to_embeddings(
            pooling::mean_over_spans(states, token_spans)?,
        ))),
        HiddenStates::All(layers) => {
            let per_layer = layers
                .iter()
                .map(|states| Ok(rows_to_embeddings(pooling::mean_over_spans(states, token_spans)?)))
                .collect::<Result<Vec<_>>>()?;
            Ok(SpanEmbeddings::All(per_layer))
        }
    }
}

fn rows_to_embeddings(pooled: ndarray::Array2<f32>) -> Vec<Embedding> {
    pooled.rows().into_iter().map(|row| row.to_vec()).collect()
}
