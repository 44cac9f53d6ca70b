//! Initialization options for the word embedding extractor.

use std::path::PathBuf;

use ort::execution_providers::ExecutionProviderDispatch;
use tokenizers::Tokenizer;

use crate::backend::TransformerBackend;
use crate::common::{get_cache_dir, TokenizerFiles};

use super::{DEFAULT_MAX_LENGTH, DEFAULT_MODEL_FILE};

/// Options for initializing a [`WordEmbedding`] from a hub model identifier.
///
/// The referenced repository must carry an ONNX export with per-layer
/// hidden-state outputs alongside the usual tokenizer files.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct InitOptions {
    pub model_name: String,
    pub model_file: String,
    pub execution_providers: Vec<ExecutionProviderDispatch>,
    pub max_length: usize,
    pub cache_dir: PathBuf,
    pub show_download_progress: bool,
}

impl InitOptions {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Default::default()
        }
    }

    pub fn with_model_file(mut self, model_file: impl Into<String>) -> Self {
        self.model_file = model_file.into();
        self
    }

    pub fn with_execution_providers(
        mut self,
        execution_providers: Vec<ExecutionProviderDispatch>,
    ) -> Self {
        self.execution_providers = execution_providers;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: PathBuf) -> Self {
        self.cache_dir = cache_dir;
        self
    }

    pub fn with_show_download_progress(mut self, show_download_progress: bool) -> Self {
        self.show_download_progress = show_download_progress;
        self
    }
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            model_name: String::from("bert-base-uncased"),
            model_file: DEFAULT_MODEL_FILE.to_string(),
            execution_providers: Default::default(),
            max_length: DEFAULT_MAX_LENGTH,
            cache_dir: get_cache_dir().into(),
            show_download_progress: true,
        }
    }
}

/// Options for initializing a user-defined model.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct InitOptionsUserDefined {
    pub execution_providers: Vec<ExecutionProviderDispatch>,
    pub max_length: usize,
}

impl InitOptionsUserDefined {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_execution_providers(
        mut self,
        execution_providers: Vec<ExecutionProviderDispatch>,
    ) -> Self {
        self.execution_providers = execution_providers;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }
}

impl Default for InitOptionsUserDefined {
    fn default() -> Self {
        Self {
            execution_providers: Default::default(),
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

/// Convert InitOptions to InitOptionsUserDefined
///
/// This is useful for when the user wants to use the same options for both
/// the hub and user-defined models
impl From<InitOptions> for InitOptionsUserDefined {
    fn from(options: InitOptions) -> Self {
        InitOptionsUserDefined {
            execution_providers: options.execution_providers,
            max_length: options.max_length,
        }
    }
}

/// "Bring your own" transformer model, as raw file bytes.
///
/// The ONNX graph must be exported with per-layer hidden-state outputs
/// (`hidden_states.0` .. `hidden_states.N`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDefinedTransformerModel {
    pub onnx_file: Vec<u8>,
    pub tokenizer_files: TokenizerFiles,
}

impl UserDefinedTransformerModel {
    pub fn new(onnx_file: Vec<u8>, tokenizer_files: TokenizerFiles) -> Self {
        Self {
            onnx_file,
            tokenizer_files,
        }
    }
}

/// Extractor for contextual word and phrase representations.
///
/// Holds the tokenizer and model backend as long-lived, read-only resources.
/// Calls are synchronous and block until the whole batch's forward pass and
/// extraction complete. The instance is not guaranteed safe for concurrent
/// calls from multiple threads unless the underlying runtime is; sharing
/// across threads is the caller's responsibility.
pub struct WordEmbedding {
    pub tokenizer: Tokenizer,
    pub(crate) backend: Box<dyn TransformerBackend>,
    pub(crate) layers: usize,
}
