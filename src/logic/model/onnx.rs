//! ONNX Embedder - pretrained protein language model (ESM2 export)
//!
//! Expects a model taking `input_ids` `[1, T]` (i64) and returning the last
//! hidden state `[1, T, D]` as its first output.

use std::path::Path;

use ndarray::{Array1, Array2};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;

use super::backend::BackendError;
use super::embedding::{Embedder, Embedding};
use crate::logic::sequence::{Sequence, ValidationPolicy};

/// Residues per model call (ESM2 context is 1024 tokens incl. cls/eos)
pub const MAX_CHUNK_RESIDUES: usize = 1022;

const CLS_TOKEN: i64 = 0;
const EOS_TOKEN: i64 = 2;

/// ESM alphabet token id for a standard residue
fn token_id(residue: u8) -> i64 {
    match residue {
        b'L' => 4,
        b'A' => 5,
        b'G' => 6,
        b'V' => 7,
        b'S' => 8,
        b'E' => 9,
        b'R' => 10,
        b'T' => 11,
        b'I' => 12,
        b'D' => 13,
        b'P' => 14,
        b'K' => 15,
        b'Q' => 16,
        b'N' => 17,
        b'F' => 18,
        b'Y' => 19,
        b'M' => 20,
        b'H' => 21,
        b'W' => 22,
        b'C' => 23,
        // <unk>
        _ => 3,
    }
}

/// `[cls, residues.., eos]`
fn tokenize(chunk: &[u8]) -> Vec<i64> {
    let mut ids = Vec::with_capacity(chunk.len() + 2);
    ids.push(CLS_TOKEN);
    ids.extend(chunk.iter().map(|r| token_id(*r)));
    ids.push(EOS_TOKEN);
    ids
}

fn unavailable(msg: impl Into<String>) -> BackendError {
    BackendError::EmbeddingUnavailable(msg.into())
}

pub struct OnnxEmbedder {
    // Session::run needs &mut
    session: Mutex<Session>,
    name: String,
    dimension: usize,
}

impl OnnxEmbedder {
    /// Load the model and probe its hidden size with a one-residue run
    pub fn load(model_path: &str) -> Result<Self, BackendError> {
        tracing::info!("Loading ONNX embedding model from: {}", model_path);

        if !Path::new(model_path).exists() {
            return Err(unavailable(format!("Model not found: {}", model_path)));
        }

        let session = Session::builder()
            .map_err(|e| unavailable(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| unavailable(format!("Failed to set optimization: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| unavailable(format!("Failed to load model: {}", e)))?;

        let name = Path::new(model_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".to_string());

        let mut embedder = Self {
            session: Mutex::new(session),
            name,
            dimension: 0,
        };

        let probe = Sequence::validate("M", &ValidationPolicy::default())
            .map_err(|e| unavailable(e.to_string()))?;
        let (_, dimension) = embedder.run_chunk(probe.as_bytes())?;
        embedder.dimension = dimension;

        tracing::info!("ONNX embedder '{}' loaded ({} dims)", embedder.name, dimension);
        Ok(embedder)
    }

    /// Sum of residue hidden states for one chunk, and the hidden size
    fn run_chunk(&self, chunk: &[u8]) -> Result<(Array1<f64>, usize), BackendError> {
        let ids = tokenize(chunk);
        let tokens = ids.len();

        let input = Array2::<i64>::from_shape_vec((1, tokens), ids)
            .map_err(|e| unavailable(format!("Array error: {}", e)))?;
        let input_tensor = Value::from_array(input)
            .map_err(|e| unavailable(format!("Tensor error: {}", e)))?;

        let mut session = self.session.lock();
        let output_name = session.outputs.first()
            .map(|o| o.name.clone())
            .ok_or_else(|| unavailable("No output defined"))?;

        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| unavailable(format!("Inference failed: {}", e)))?;

        let output = outputs.get(&output_name)
            .ok_or_else(|| unavailable("No output"))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| unavailable(format!("Extract error: {}", e)))?;

        if shape.len() != 3 || shape[1] as usize != tokens {
            return Err(unavailable(format!("unexpected output shape {:?}", shape)));
        }
        let hidden = shape[2] as usize;

        // Skip cls (0) and eos (tokens - 1)
        let mut sum = Array1::<f64>::zeros(hidden);
        for t in 1..tokens - 1 {
            let row = &data[t * hidden..(t + 1) * hidden];
            for (acc, v) in sum.iter_mut().zip(row) {
                *acc += f64::from(*v);
            }
        }

        Ok((sum, hidden))
    }
}

impl Embedder for OnnxEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    /// Mean over all residues; long sequences are split into chunks so each
    /// residue is weighted equally across chunks.
    fn embed(&self, sequence: &Sequence) -> Result<Embedding, BackendError> {
        let mut total = Array1::<f64>::zeros(self.dimension);

        for chunk in sequence.as_bytes().chunks(MAX_CHUNK_RESIDUES) {
            let (sum, hidden) = self.run_chunk(chunk)?;
            if hidden != self.dimension {
                return Err(unavailable(format!(
                    "hidden size changed from {} to {}",
                    self.dimension, hidden
                )));
            }
            total += &sum;
        }

        let mean = total / sequence.len() as f64;
        if mean.iter().any(|v| !v.is_finite()) {
            return Err(unavailable("non-finite embedding"));
        }

        Ok(Embedding::new(mean.mapv(|v| v as f32), self.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize(b"MKA"), vec![0, 20, 15, 5, 2]);
    }

    #[test]
    fn test_missing_model() {
        assert!(matches!(
            OnnxEmbedder::load("/nonexistent/esm2.onnx"),
            Err(BackendError::EmbeddingUnavailable(_))
        ));
    }
}
