//! Model backends: the forward-pass capability and its ONNX Runtime
//! implementation.

use ndarray::{Array3, Ix3};
use ort::{session::Session, value::Value};
use tracing::debug;

use crate::encoding::EncodedBatch;
use crate::error::{Error, Result};

/// Forward-pass capability of a pretrained transformer.
///
/// Implementations take a padded batch and return one hidden-state tensor
/// per layer: the embedding layer first, then each transformer layer, for a
/// total of `num_hidden_layers() + 1` tensors shaped
/// `(batch, seq_len, hidden_dim)`. Tensors are returned in host memory
/// regardless of where the computation ran, so callers are never forced onto
/// the compute device.
///
/// A backend is held as a long-lived, read-only resource after
/// construction. It is not required to be safe for concurrent calls from
/// multiple threads unless the underlying runtime guarantees it; callers
/// that share an extractor across threads must synchronize.
pub trait TransformerBackend: Send {
    /// Number of transformer layers, excluding the embedding layer.
    fn num_hidden_layers(&self) -> usize;

    /// Run one synchronous forward pass over the whole batch.
    fn forward(&self, batch: &EncodedBatch) -> Result<Vec<Array3<f32>>>;

    /// Grow the token embedding table after new tokens (e.g. a pad token)
    /// were added to the tokenizer.
    fn resize_token_embeddings(&mut self, new_vocab_size: usize) -> Result<()>;
}

/// [`TransformerBackend`] backed by an ONNX Runtime session.
///
/// The ONNX graph must be exported with per-layer hidden-state outputs named
/// `hidden_states.0` through `hidden_states.N` (the optimum
/// `output_hidden_states` export convention). Graphs that only expose
/// `last_hidden_state` cannot serve the all-layers contract and are
/// rejected at forward time.
pub struct OrtBackend {
    session: Session,
    num_hidden_layers: usize,
    need_token_type_ids: bool,
}

impl OrtBackend {
    /// Wrap a ready session with a known layer count.
    pub fn new(session: Session, num_hidden_layers: usize) -> Self {
        let need_token_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");
        debug!(num_hidden_layers, need_token_type_ids, "onnx session ready");
        Self {
            session,
            num_hidden_layers,
            need_token_type_ids,
        }
    }

    /// Wrap a session, reading the layer count from a Hugging Face
    /// `config.json` value (`num_hidden_layers`, or `n_layer` for GPT-style
    /// configs).
    pub fn from_config(session: Session, config: &serde_json::Value) -> Result<Self> {
        let num_hidden_layers = config["num_hidden_layers"]
            .as_u64()
            .or_else(|| config["n_layer"].as_u64())
            .ok_or_else(|| Error::Config {
                message: "config.json carries neither num_hidden_layers nor n_layer".to_string(),
            })? as usize;
        Ok(Self::new(session, num_hidden_layers))
    }
}

impl TransformerBackend for OrtBackend {
    fn num_hidden_layers(&self) -> usize {
        self.num_hidden_layers
    }

    fn forward(&self, batch: &EncodedBatch) -> Result<Vec<Array3<f32>>> {
        let mut session_inputs = ort::inputs![
            "input_ids" => Value::from_array(batch.input_ids.clone())?,
            "attention_mask" => Value::from_array(batch.attention_mask.clone())?,
        ]?;

        if self.need_token_type_ids {
            session_inputs.push((
                "token_type_ids".into(),
                Value::from_array(batch.token_type_ids.clone())?.into(),
            ));
        }

        let outputs = self.session.run(session_inputs)?;

        let mut states = Vec::with_capacity(self.num_hidden_layers + 1);
        for layer in 0..=self.num_hidden_layers {
            let key = format!("hidden_states.{layer}");
            let value = outputs.get(key.as_str()).ok_or_else(|| Error::Backend {
                message: format!(
                    "missing output `{key}`; the graph must be exported with hidden states \
                    (available outputs: {:?})",
                    outputs.keys().collect::<Vec<_>>()
                ),
            })?;
            let view = value.try_extract_tensor::<f32>()?;
            states.push(view.to_owned().into_dimensionality::<Ix3>()?);
        }

        Ok(states)
    }

    fn resize_token_embeddings(&mut self, new_vocab_size: usize) -> Result<()> {
        // A frozen ONNX graph cannot grow its embedding table. This is only
        // reached when the tokenizer shipped without any pad token.
        Err(Error::Backend {
            message: format!(
                "cannot resize token embeddings to {new_vocab_size}: the ONNX graph is frozen; \
                re-export the model with the pad token included"
            ),
        })
    }
}
