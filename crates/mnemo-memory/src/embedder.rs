// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ONNX embedding adapter for local inference.
//!
//! Runs paraphrase-multilingual-MiniLM-L12-v2 on CPU, producing
//! 384-dimensional multilingual sentence embeddings with zero external
//! API calls after the first-run model download.
//!
//! The adapter does not assume a fixed export layout: published ONNX
//! exports of the sentence-transformers models disagree on whether
//! `token_type_ids` is an input, so the graph's declared inputs are
//! inspected at load time and the feed is built to match. The model's
//! hidden size is likewise checked against the dimension this adapter
//! advertises to the store.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use mnemo_core::traits::EmbeddingAdapter;
use mnemo_core::types::EmbeddingKind;
use mnemo_core::MnemoError;

/// Embedding dimensions for paraphrase-multilingual-MiniLM-L12-v2.
pub const ONNX_EMBEDDING_DIM: usize = 384;

/// Hard cap on encoder input length. Fragments and queries are short
/// natural-language statements; anything longer is truncated rather than
/// rejected, since the encoder's positional window is 512 tokens.
const MAX_INPUT_TOKENS: usize = 256;

fn inference_err(context: &str, e: impl std::fmt::Display) -> MnemoError {
    MnemoError::Internal(format!("{context}: {e}"))
}

/// `local-transformer` embedding variant backed by ONNX Runtime.
///
/// Inference runs on CPU with a single intra-op thread.
pub struct OnnxEmbedder {
    /// ONNX Runtime session (not Sync, serialized through a Mutex).
    session: Mutex<Session>,
    /// HuggingFace tokenizer.
    tokenizer: tokenizers::Tokenizer,
    /// Whether the exported graph declares a `token_type_ids` input.
    feed_token_types: bool,
}

// Safety: the session is only touched while holding the Mutex; tokenizer
// encoding is thread-safe.
unsafe impl Send for OnnxEmbedder {}
unsafe impl Sync for OnnxEmbedder {}

impl OnnxEmbedder {
    /// Creates a new ONNX embedder from model files on disk.
    ///
    /// Expects `tokenizer.json` next to the model file.
    pub fn new(model_path: &Path) -> Result<Self, MnemoError> {
        let tokenizer_path = model_path.with_file_name("tokenizer.json");
        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| inference_err("failed to load tokenizer", e))?;

        let session = Session::builder()
            .map_err(|e| inference_err("failed to create ONNX session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| inference_err("failed to set optimization level", e))?
            .with_intra_threads(1)
            .map_err(|e| inference_err("failed to set thread count", e))?
            .commit_from_file(model_path)
            .map_err(|e| inference_err("failed to load ONNX model", e))?;

        // Reconcile the feed with what the graph actually declares.
        let declared: Vec<&str> = session.inputs.iter().map(|i| i.name.as_str()).collect();
        for required in ["input_ids", "attention_mask"] {
            if !declared.contains(&required) {
                return Err(MnemoError::Internal(format!(
                    "ONNX model at {} lacks required input `{required}` (has: {declared:?})",
                    model_path.display()
                )));
            }
        }
        let feed_token_types = declared.contains(&"token_type_ids");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            feed_token_types,
        })
    }

    /// Embed a single text string, returning a 384-dim unit vector.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>, MnemoError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| inference_err("tokenization failed", e))?;

        let take = encoding.get_ids().len().min(MAX_INPUT_TOKENS);
        let to_row = |values: &[u32]| -> Vec<i64> {
            values[..take].iter().map(|&v| i64::from(v)).collect()
        };
        let input_ids = to_row(encoding.get_ids());
        let attention_mask = to_row(encoding.get_attention_mask());
        let token_type_ids = to_row(encoding.get_type_ids());

        let as_batch = |row: Vec<i64>| {
            Array2::from_shape_vec((1, take), row)
                .map_err(|e| inference_err("failed to shape encoder input", e))
        };
        let ids_array = as_batch(input_ids)?;
        let mask_array = as_batch(attention_mask.clone())?;
        let types_array = as_batch(token_type_ids)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| inference_err("failed to lock ONNX session", e))?;

        let ids_tensor = TensorRef::from_array_view(&ids_array)
            .map_err(|e| inference_err("failed to build input_ids tensor", e))?;
        let mask_tensor = TensorRef::from_array_view(&mask_array)
            .map_err(|e| inference_err("failed to build attention_mask tensor", e))?;

        let outputs = if self.feed_token_types {
            let types_tensor = TensorRef::from_array_view(&types_array)
                .map_err(|e| inference_err("failed to build token_type_ids tensor", e))?;
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => types_tensor
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor
            ])
        }
        .map_err(|e| inference_err("ONNX inference failed", e))?;

        // Token-level states, shape [1, take, hidden].
        let (shape, states) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| inference_err("failed to extract output tensor", e))?;
        let hidden = shape.last().copied().unwrap_or_default() as usize;
        if hidden != ONNX_EMBEDDING_DIM {
            // The store validates vector dimension on insert; catching a
            // wrong model here turns a per-fragment failure into one
            // actionable load error.
            return Err(MnemoError::Internal(format!(
                "ONNX model produces hidden size {hidden}, adapter requires {ONNX_EMBEDDING_DIM}"
            )));
        }

        Ok(sentence_embedding(states, &attention_mask, hidden))
    }
}

/// Collapse per-token states into one unit-length sentence vector.
///
/// Attention-masked mean pooling fused with L2 normalization: padding
/// rows are skipped, real rows are accumulated, and the 1/count and
/// 1/norm scalings are applied together at the end.
fn sentence_embedding(token_states: &[f32], attention_mask: &[i64], hidden: usize) -> Vec<f32> {
    let mut acc = vec![0.0f32; hidden];
    let mut kept = 0u32;

    for (row, keep) in token_states.chunks_exact(hidden).zip(attention_mask) {
        if *keep == 0 {
            continue;
        }
        kept += 1;
        for (a, v) in acc.iter_mut().zip(row) {
            *a += v;
        }
    }

    if kept == 0 {
        return acc;
    }
    let mean_norm = {
        let count = kept as f32;
        let sum_sq: f32 = acc.iter().map(|v| v * v).sum();
        // |acc/count| = |acc|/count; fold both divisions into one factor.
        sum_sq.sqrt() / count
    };
    let scale = if mean_norm > f32::EPSILON {
        1.0 / (kept as f32 * mean_norm)
    } else {
        1.0 / kept as f32
    };
    for a in acc.iter_mut() {
        *a *= scale;
    }
    acc
}

#[async_trait]
impl EmbeddingAdapter for OnnxEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MnemoError> {
        self.embed_text(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MnemoError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_text(text)?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        ONNX_EMBEDDING_DIM
    }

    fn kind(&self) -> EmbeddingKind {
        EmbeddingKind::LocalTransformer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_rows_are_excluded_from_the_mean() {
        // Two tokens, hidden=3; the first row is padding.
        let states = vec![
            9.0, 9.0, 9.0, // padding, must not leak into the result
            3.0, 0.0, 4.0, // real
        ];
        let mask = vec![0, 1];
        let v = sentence_embedding(&states, &mask, 3);
        // Mean of one row (3,0,4), normalized: norm 5 -> (0.6, 0, 0.8).
        assert!((v[0] - 0.6).abs() < 0.001);
        assert!(v[1].abs() < 0.001);
        assert!((v[2] - 0.8).abs() < 0.001);
    }

    #[test]
    fn result_is_unit_length() {
        let states = vec![
            1.0, 2.0, //
            3.0, 4.0, //
            5.0, 6.0,
        ];
        let mask = vec![1, 1, 1];
        let v = sentence_embedding(&states, &mask, 2);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[test]
    fn direction_matches_the_token_mean() {
        let states = vec![
            1.0, 2.0, //
            3.0, 4.0, //
            5.0, 6.0,
        ];
        let mask = vec![1, 1, 1];
        let v = sentence_embedding(&states, &mask, 2);
        // Mean is (3, 4); normalized direction (0.6, 0.8).
        assert!((v[0] - 0.6).abs() < 0.001);
        assert!((v[1] - 0.8).abs() < 0.001);
    }

    #[test]
    fn fully_masked_input_yields_zero_vector() {
        let states = vec![1.0, 2.0, 3.0, 4.0];
        let mask = vec![0, 0];
        let v = sentence_embedding(&states, &mask, 2);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn zero_states_do_not_divide_by_zero() {
        let states = vec![0.0, 0.0, 0.0, 0.0];
        let mask = vec![1, 1];
        let v = sentence_embedding(&states, &mask, 2);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    // OnnxEmbedder::new requires actual model files; graph-input detection
    // and inference are covered by integration runs with the downloaded
    // model.
}
