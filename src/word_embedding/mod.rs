//! The word embedding extractor, its initialization options and output
//! shapes.

// Constants.
const DEFAULT_MAX_LENGTH: usize = 512;
const DEFAULT_MODEL_FILE: &str = "model.onnx";

// Layer selection and output shapes.
pub mod output;
pub use output::{HiddenStates, Layer, SpanEmbeddings};

// Initialization options.
mod init;
pub use init::*;

// The implementation of the extractor.
mod r#impl;
