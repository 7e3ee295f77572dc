//! Classifier - embedding to (dna, rna, neither) probabilities
//!
//! Softmax head of dense layers. Weights come from a JSON file or from the
//! built-in head tuned for the residue-profile embedder.

use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::backend::BackendError;
use super::embedding::{Embedding, ResidueProfileEmbedder};
use super::scores::ScoreTriple;
use crate::logic::sequence::residue_index;

/// Output order of the final layer
pub const CLASS_ORDER: [&str; 3] = ["dna", "rna", "neither"];

// ============================================================================
// CLASSIFIER TRAIT
// ============================================================================

pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;
    fn input_dim(&self) -> usize;
    /// SHA-256 of the weights the classifier was built from
    fn fingerprint(&self) -> &str;
    fn classify(&self, embedding: &Embedding) -> Result<ScoreTriple, BackendError>;
}

// ============================================================================
// WEIGHTS FILE FORMAT
// ============================================================================

/// One dense layer: `weights` is `[out][in]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerWeights {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

/// On-disk classifier weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierWeights {
    pub name: String,
    pub input_dim: usize,
    pub layers: Vec<LayerWeights>,
}

// ============================================================================
// SOFTMAX HEAD
// ============================================================================

#[derive(Debug, Clone)]
struct DenseLayer {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

/// Dense layers with ReLU in between and a softmax over the 3 outputs
#[derive(Debug, Clone)]
pub struct SoftmaxHead {
    name: String,
    input_dim: usize,
    layers: Vec<DenseLayer>,
    fingerprint: String,
}

fn unavailable(msg: impl Into<String>) -> BackendError {
    BackendError::ClassifierUnavailable(msg.into())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

impl SoftmaxHead {
    /// Load weights from a JSON file
    pub fn load_from_file(path: impl AsRef<Path>, expected_dim: usize) -> Result<Self, BackendError> {
        let path = path.as_ref();
        tracing::info!("Loading classifier weights from: {}", path.display());

        let bytes = std::fs::read(path)
            .map_err(|e| unavailable(format!("cannot read {}: {}", path.display(), e)))?;
        let weights: ClassifierWeights = serde_json::from_slice(&bytes)
            .map_err(|e| unavailable(format!("invalid weights file {}: {}", path.display(), e)))?;

        Self::build(weights, expected_dim, sha256_hex(&bytes))
    }

    /// Build from in-memory weights
    pub fn from_weights(weights: ClassifierWeights, expected_dim: usize) -> Result<Self, BackendError> {
        let bytes = serde_json::to_vec(&weights)
            .map_err(|e| unavailable(format!("cannot serialize weights: {}", e)))?;
        Self::build(weights, expected_dim, sha256_hex(&bytes))
    }

    /// Built-in head for `ResidueProfileEmbedder`
    pub fn builtin() -> Result<Self, BackendError> {
        Self::from_weights(builtin_weights(), ResidueProfileEmbedder::DIMENSION)
    }

    fn build(weights: ClassifierWeights, expected_dim: usize, fingerprint: String) -> Result<Self, BackendError> {
        if weights.input_dim != expected_dim {
            return Err(unavailable(format!(
                "classifier expects {} inputs, embedder produces {}",
                weights.input_dim, expected_dim
            )));
        }
        if weights.layers.is_empty() {
            return Err(unavailable("classifier has no layers"));
        }

        let mut layers = Vec::with_capacity(weights.layers.len());
        let mut fan_in = weights.input_dim;

        for (i, layer) in weights.layers.into_iter().enumerate() {
            let rows = layer.weights.len();
            if rows == 0 || layer.bias.len() != rows {
                return Err(unavailable(format!(
                    "layer {}: {} weight rows, {} biases",
                    i,
                    rows,
                    layer.bias.len()
                )));
            }
            if let Some(bad) = layer.weights.iter().position(|r| r.len() != fan_in) {
                return Err(unavailable(format!(
                    "layer {}: row {} has {} inputs, expected {}",
                    i,
                    bad,
                    layer.weights[bad].len(),
                    fan_in
                )));
            }

            let flat: Vec<f64> = layer.weights.into_iter().flatten().collect();
            if flat.iter().chain(layer.bias.iter()).any(|v| !v.is_finite()) {
                return Err(unavailable(format!("layer {}: non-finite weight", i)));
            }

            let matrix = Array2::from_shape_vec((rows, fan_in), flat)
                .map_err(|e| unavailable(format!("layer {}: {}", i, e)))?;

            layers.push(DenseLayer {
                weights: matrix,
                bias: Array1::from(layer.bias),
            });
            fan_in = rows;
        }

        if fan_in != CLASS_ORDER.len() {
            return Err(unavailable(format!("final layer has {} outputs, expected 3", fan_in)));
        }

        tracing::info!(
            "Classifier '{}' ready ({} layers, fingerprint {})",
            weights.name,
            layers.len(),
            &fingerprint[..12]
        );

        Ok(Self {
            name: weights.name,
            input_dim: weights.input_dim,
            layers,
            fingerprint,
        })
    }

    /// Raw logits (dna, rna, neither)
    fn logits(&self, embedding: &Embedding) -> Result<[f64; 3], BackendError> {
        if embedding.dimension() != self.input_dim {
            return Err(unavailable(format!(
                "embedding from '{}' has dimension {}, classifier expects {}",
                embedding.model(),
                embedding.dimension(),
                self.input_dim
            )));
        }

        let mut x: Array1<f64> = embedding.values().mapv(f64::from);
        let last = self.layers.len() - 1;

        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.weights.dot(&x) + &layer.bias;
            if i < last {
                x.mapv_inplace(|v| v.max(0.0));
            }
        }

        Ok([x[0], x[1], x[2]])
    }
}

impl Classifier for SoftmaxHead {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn classify(&self, embedding: &Embedding) -> Result<ScoreTriple, BackendError> {
        let logits = self.logits(embedding)?;
        ScoreTriple::from_logits(logits).map_err(|e| unavailable(e.to_string()))
    }
}

// ============================================================================
// BUILT-IN WEIGHTS
// ============================================================================

/// Composition weights per class: (residue, weight)
const DNA_WEIGHTS: &[(u8, f64)] = &[(b'K', 14.0), (b'R', 10.0), (b'H', 4.0)];
const RNA_WEIGHTS: &[(u8, f64)] = &[
    (b'R', 12.0),
    (b'G', 10.0),
    (b'Y', 6.0),
    (b'F', 4.0),
    (b'S', 4.0),
    (b'K', 4.0),
];
const NEITHER_WEIGHTS: &[(u8, f64)] = &[
    (b'L', 6.0),
    (b'A', 4.0),
    (b'V', 4.0),
    (b'I', 4.0),
    (b'D', 6.0),
    (b'E', 6.0),
];

/// Linear head over the residue composition block of the embedding.
///
/// Basic residues push towards DNA, RGG/aromatic-rich composition towards
/// RNA, hydrophobic and acidic composition towards neither.
pub fn builtin_weights() -> ClassifierWeights {
    let dim = ResidueProfileEmbedder::DIMENSION;

    let row = |entries: &[(u8, f64)]| {
        let mut row = vec![0.0; dim];
        for (residue, weight) in entries {
            if let Some(i) = residue_index(*residue) {
                row[i] = *weight;
            }
        }
        row
    };

    ClassifierWeights {
        name: "composition-head-v1".to_string(),
        input_dim: dim,
        layers: vec![LayerWeights {
            weights: vec![row(DNA_WEIGHTS), row(RNA_WEIGHTS), row(NEITHER_WEIGHTS)],
            bias: vec![-1.2, -1.4, 0.0],
        }],
    }
}

// ============================================================================
// TESTS
// ============================================================================
