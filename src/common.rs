//! Shared helpers: tokenizer loading, pad-token setup and file utilities.

use std::io::Read;
use std::{fs::File, path::PathBuf};

#[cfg(feature = "online")]
use anyhow::Context;
#[cfg(feature = "online")]
use hf_hub::api::sync::ApiRepo;
use tokenizers::{AddedToken, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use crate::error::{Error, Result};

/// Default cache directory for models retrieved from the hub.
pub const DEFAULT_CACHE_DIR: &str = ".contextembed_cache";

/// Pad token registered when a tokenizer ships without one.
const FALLBACK_PAD_TOKEN: &str = "<|pad|>";

/// Type alias for a pooled representation vector.
pub type Embedding = Vec<f32>;

/// Cache directory for hub downloads, overridable via
/// `CONTEXTEMBED_CACHE_PATH`.
pub fn get_cache_dir() -> String {
    std::env::var("CONTEXTEMBED_CACHE_PATH").unwrap_or_else(|_| DEFAULT_CACHE_DIR.to_string())
}

/// Tokenizer files for "bring your own" models, as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizerFiles {
    pub tokenizer_file: Vec<u8>,
    pub config_file: Vec<u8>,
    pub special_tokens_map_file: Vec<u8>,
    pub tokenizer_config_file: Vec<u8>,
}

/// Fetch the tokenizer file set from a hub repository, reusing cached copies
/// where present.
#[cfg(feature = "online")]
pub(crate) fn fetch_tokenizer_files(model_repo: &ApiRepo) -> Result<TokenizerFiles> {
    Ok(TokenizerFiles {
        tokenizer_file: read_file_to_bytes(
            &model_repo
                .get("tokenizer.json")
                .context("Failed to retrieve tokenizer.json")?,
        )?,
        config_file: read_file_to_bytes(
            &model_repo
                .get("config.json")
                .context("Failed to retrieve config.json")?,
        )?,
        special_tokens_map_file: read_file_to_bytes(
            &model_repo
                .get("special_tokens_map.json")
                .context("Failed to retrieve special_tokens_map.json")?,
        )?,
        tokenizer_config_file: read_file_to_bytes(
            &model_repo
                .get("tokenizer_config.json")
                .context("Failed to retrieve tokenizer_config.json")?,
        )?,
    })
}

/// Build a [`Tokenizer`] from its file bytes, configured for batch-longest
/// padding and truncation at `max_length`.
///
/// Special tokens from `special_tokens_map.json` are registered, and the pad
/// token is taken from `tokenizer_config.json`. A tokenizer without any pad
/// token is returned with padding unconfigured: fallback pad-token
/// installation is left to `WordEmbedding::from_backend`, which must also
/// resize the model's token embeddings when a new token enters the
/// vocabulary.
pub fn load_tokenizer(tokenizer_files: TokenizerFiles, max_length: usize) -> Result<Tokenizer> {
    let config: serde_json::Value =
        serde_json::from_slice(&tokenizer_files.config_file).map_err(|_| Error::Config {
            message: "could not parse config.json".to_string(),
        })?;
    let special_tokens_map: serde_json::Value =
        serde_json::from_slice(&tokenizer_files.special_tokens_map_file).map_err(|_| {
            Error::Config {
                message: "could not parse special_tokens_map.json".to_string(),
            }
        })?;
    let tokenizer_config: serde_json::Value =
        serde_json::from_slice(&tokenizer_files.tokenizer_config_file).map_err(|_| {
            Error::Config {
                message: "could not parse tokenizer_config.json".to_string(),
            }
        })?;

    let mut tokenizer = Tokenizer::from_bytes(&tokenizer_files.tokenizer_file)
        .map_err(|e| Error::Tokenizer {
            message: e.to_string(),
        })?;

    // For some models, model_max_length is a sentinel far beyond f64's exact
    // integer range; clamp through the caller-provided max_length.
    let model_max_length = tokenizer_config["model_max_length"]
        .as_f64()
        .unwrap_or(f64::MAX);
    let max_length = max_length.min(model_max_length as usize);

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| Error::Tokenizer {
            message: e.to_string(),
        })?;

    if let serde_json::Value::Object(root_object) = special_tokens_map {
        for (_, value) in root_object.iter() {
            if let Some(content) = value.as_str() {
                tokenizer.add_special_tokens(&[AddedToken {
                    content: content.to_string(),
                    special: true,
                    ..Default::default()
                }]);
            } else if value.is_object() {
                tokenizer.add_special_tokens(&[AddedToken {
                    content: value["content"].as_str().unwrap_or_default().to_string(),
                    special: true,
                    single_word: value["single_word"].as_bool().unwrap_or(false),
                    lstrip: value["lstrip"].as_bool().unwrap_or(false),
                    rstrip: value["rstrip"].as_bool().unwrap_or(false),
                    normalized: value["normalized"].as_bool().unwrap_or(false),
                }]);
            }
        }
    }

    if let Some(pad_token) = tokenizer_config["pad_token"].as_str() {
        let pad_id = config["pad_token_id"]
            .as_u64()
            .map(|id| id as u32)
            .or_else(|| tokenizer.token_to_id(pad_token))
            .unwrap_or(0);
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            pad_token: pad_token.to_string(),
            pad_id,
            ..Default::default()
        }));
    }

    Ok(tokenizer)
}

/// One-time pad-token setup for tokenizers that lack one.
///
/// Returns `true` when a new token was added to the vocabulary, in which
/// case the model's embedding table must be resized to match. Must run
/// before any batch encoding.
pub(crate) fn ensure_pad_token(tokenizer: &mut Tokenizer) -> Result<bool> {
    if tokenizer.get_padding().is_some() {
        return Ok(false);
    }

    let added = tokenizer.token_to_id(FALLBACK_PAD_TOKEN).is_none();
    tokenizer.add_special_tokens(&[AddedToken::from(FALLBACK_PAD_TOKEN, true)]);
    let pad_id = tokenizer
        .token_to_id(FALLBACK_PAD_TOKEN)
        .ok_or_else(|| Error::Tokenizer {
            message: format!("failed to register pad token `{FALLBACK_PAD_TOKEN}`"),
        })?;

    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        pad_token: FALLBACK_PAD_TOKEN.to_string(),
        pad_id,
        ..Default::default()
    }));

    Ok(added)
}

/// Read a local file into bytes, e.g. to constitute a user-defined model.
pub fn read_file_to_bytes(file: &PathBuf) -> Result<Vec<u8>> {
    let mut file = File::open(file)?;
    let file_size = file.metadata()?.len() as usize;
    let mut buffer = Vec::with_capacity(file_size);
    file.read_to_end(&mut buffer)?;
    Ok(buffer)
}
