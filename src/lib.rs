//! Contextual word and phrase representations from pretrained transformer
//! models.
//!
//! The library provides the [`WordEmbedding`] struct: given a sentence and a
//! target word, phrase or word-index span, it locates the target's subword
//! token span inside the model's tokenization of the sentence, runs one
//! forward pass, and mean-pools the hidden-state vectors at that span for a
//! chosen layer (or all layers).
//!
//! ### Instantiating [`WordEmbedding`]
//! ```no_run
//! use contextembed::{InitOptions, WordEmbedding};
//!
//! # fn model_demo() -> contextembed::Result<()> {
//! // With default InitOptions
//! let extractor = WordEmbedding::try_new(Default::default())?;
//!
//! // With a custom model identifier
//! let extractor = WordEmbedding::try_new(
//!     InitOptions::new("bert-base-uncased").with_show_download_progress(false),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Extracting representations
//! ```no_run
//! # use contextembed::{Layer, WordEmbedding, WordTarget};
//! # fn extraction_demo(extractor: WordEmbedding) -> contextembed::Result<()> {
//! let items: Vec<(&str, WordTarget)> = vec![
//!     ("the cat sat on the mat", WordTarget::from("cat")),
//!     // An explicit half-open word-index span works too
//!     ("the dog ran away", WordTarget::from((1, 2))),
//! ];
//!
//! // One pooled vector per item, from the final layer
//! let pooled = extractor.extract_representation(&items, Layer::default())?;
//!
//! // Or from every layer: the embedding layer plus each transformer layer
//! let per_layer = extractor.extract_representation(&items, Layer::All)?;
//! # Ok(())
//! # }
//! ```
//!
//! The model and tokenizer are external collaborators: any forward-pass
//! implementation can be plugged in through [`TransformerBackend`] and
//! [`WordEmbedding::from_backend`], which is also how the test suite
//! substitutes a deterministic fake for a real pretrained model.

mod backend;
mod common;
mod encoding;
mod error;
pub mod pooling;
pub mod spans;
mod word_embedding;

pub use ort::execution_providers::{ExecutionProvider, ExecutionProviderDispatch};

pub use backend::{OrtBackend, TransformerBackend};
pub use common::{
    get_cache_dir, load_tokenizer, read_file_to_bytes, Embedding, TokenizerFiles,
    DEFAULT_CACHE_DIR,
};
pub use encoding::EncodedBatch;
pub use error::{Error, Result};
pub use spans::WordTarget;
pub use word_embedding::{
    HiddenStates, InitOptions, InitOptionsUserDefined, Layer, SpanEmbeddings,
    UserDefinedTransformerModel, WordEmbedding,
};
