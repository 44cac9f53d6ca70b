//! Error types for contextembed.

use thiserror::Error;

/// Result type alias for contextembed operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while locating spans or extracting representations.
#[derive(Error, Debug)]
pub enum Error {
    /// Requested layer index exceeds the model's layer count.
    #[error("requested layer {requested} exceeds the model's {available} hidden layers")]
    InvalidLayer {
        /// The layer index that was asked for.
        requested: usize,
        /// Number of hidden layers the model actually has.
        available: usize,
    },

    /// Target word or phrase does not occur as a contiguous run of
    /// whitespace words in the sentence.
    #[error("word `{word}` not found in sentence `{sentence}`")]
    WordNotFound {
        /// The target that was searched for.
        word: String,
        /// The sentence that was searched.
        sentence: String,
    },

    /// The target's standalone tokenization does not occur as a contiguous
    /// subsequence of the full sentence's tokenization. This can legitimately
    /// happen when subword merging differs between the standalone form and
    /// the in-context form.
    #[error("tokenized target {token_ids:?} does not occur contiguously in the sentence tokenization")]
    PatternNotFound {
        /// Token ids of the standalone re-tokenization of the target.
        token_ids: Vec<u32>,
    },

    /// Operation is declared but intentionally not implemented.
    #[error("`{operation}` is not implemented")]
    Unsupported {
        /// Name of the unimplemented operation.
        operation: &'static str,
    },

    /// Empty input provided.
    #[error("empty input: at least one sentence must be provided")]
    EmptyInput,

    /// Tokenizer could not be loaded or failed to encode.
    #[error("tokenizer error: {message}")]
    Tokenizer {
        /// Description of the tokenizer error.
        message: String,
    },

    /// The model backend failed to load or run.
    #[error("backend error: {message}")]
    Backend {
        /// Description of the backend error.
        message: String,
    },

    /// Invalid or incomplete model configuration.
    #[error("invalid model configuration: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Tensor shape or indexing mismatch.
    #[error("tensor error: {message}")]
    Tensor {
        /// Description of the tensor error.
        message: String,
    },

    /// IO error reading model files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error for config files.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapped error from a model-loading or download path.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<tokenizers::Error> for Error {
    fn from(err: tokenizers::Error) -> Self {
        Error::Tokenizer {
            message: err.to_string(),
        }
    }
}

impl From<ort::Error> for Error {
    fn from(err: ort::Error) -> Self {
        Error::Backend {
            message: err.to_string(),
        }
    }
}

impl From<ndarray::ShapeError> for Error {
    fn from(err: ndarray::ShapeError) -> Self {
        Error::Tensor {
            message: err.to_string(),
        }
    }
}
