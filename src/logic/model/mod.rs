//! Model Module - embedding + classification backends
//!
//! Splits the embedding representation from the classifier head so either
//! can be swapped without touching the HTTP layer.

pub mod backend;
pub mod classifier;
pub mod embedding;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod remote;
pub mod residues;
pub mod scores;

// Re-export common types
pub use backend::{Backend, BackendError, BackendInfo, LocalPipeline};
pub use classifier::{Classifier, ClassifierWeights, SoftmaxHead};
pub use embedding::{Embedder, Embedding, ResidueProfileEmbedder};
pub use scores::{Label, ScoreTriple};
