//! Scoring Backend
//!
//! Process-wide model state, loaded once at startup and shared read-only by
//! all request handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::OwnedSemaphorePermit;

use super::classifier::{Classifier, SoftmaxHead};
use super::embedding::{Embedder, ResidueProfileEmbedder};
use super::remote::RemotePredictor;
use super::scores::ScoreTriple;
use crate::config::{BackendKind, Config};
use crate::logic::sequence::Sequence;

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("upstream predictor error: {0}")]
    Upstream(String),

    #[error("inference worker failed: {0}")]
    Worker(String),
}

impl BackendError {
    /// Backend failures are retried once; a crashed worker is not
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BackendError::Worker(_))
    }

    pub fn code(&self) -> &'static str {
        match self {
            BackendError::EmbeddingUnavailable(_) => "embedding_unavailable",
            BackendError::ClassifierUnavailable(_) => "classifier_unavailable",
            BackendError::Upstream(_) => "upstream_error",
            BackendError::Worker(_) => "internal_error",
        }
    }
}

// ============================================================================
// LOCAL PIPELINE
// ============================================================================

/// In-process embedder + classifier pair
pub struct LocalPipeline {
    embedder: Arc<dyn Embedder>,
    classifier: Arc<dyn Classifier>,
}

impl LocalPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, classifier: Arc<dyn Classifier>) -> Result<Self, BackendError> {
        if embedder.dimension() != classifier.input_dim() {
            return Err(BackendError::ClassifierUnavailable(format!(
                "embedder '{}' produces {} dims, classifier '{}' expects {}",
                embedder.name(),
                embedder.dimension(),
                classifier.name(),
                classifier.input_dim()
            )));
        }
        Ok(Self { embedder, classifier })
    }

    /// Embed then classify. Blocking; call from a worker thread.
    pub fn run(&self, sequence: &Sequence) -> Result<ScoreTriple, BackendError> {
        let embedding = self.embedder.embed(sequence)?;
        self.classifier.classify(&embedding)
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }
}

// ============================================================================
// BACKEND
// ============================================================================

pub enum Backend {
    Local {
        pipeline: Arc<LocalPipeline>,
        loaded_at: DateTime<Utc>,
    },
    Remote {
        predictor: RemotePredictor,
        loaded_at: DateTime<Utc>,
    },
}

/// Static description of the loaded backend
#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    pub kind: &'static str,
    pub embedder: Option<String>,
    pub embedding_dim: Option<usize>,
    pub classifier: Option<String>,
    pub fingerprint: Option<String>,
    pub upstream_url: Option<String>,
    pub loaded_at: DateTime<Utc>,
}

impl Backend {
    pub fn local(pipeline: LocalPipeline) -> Self {
        Backend::Local {
            pipeline: Arc::new(pipeline),
            loaded_at: Utc::now(),
        }
    }

    /// Load the backend selected in config
    pub fn load(config: &Config) -> Result<Self, BackendError> {
        match config.backend {
            BackendKind::Local => {
                let embedder: Arc<dyn Embedder> =
                    Arc::new(ResidueProfileEmbedder::new(config.context_window));
                let classifier = load_classifier(config, embedder.dimension())?;
                Ok(Self::local(LocalPipeline::new(embedder, classifier)?))
            }
            BackendKind::Onnx => load_onnx(config),
            BackendKind::Remote => {
                let url = config.upstream_url.as_deref().ok_or_else(|| {
                    BackendError::Upstream("BACKEND=remote requires UPSTREAM_URL".to_string())
                })?;
                let predictor = RemotePredictor::new(url, config.request_timeout())?;
                tracing::info!("Remote predictor at {}", url);
                Ok(Backend::Remote {
                    predictor,
                    loaded_at: Utc::now(),
                })
            }
        }
    }

    /// Score one sequence. `permit` is held until the backend work finishes,
    /// even if the caller stops waiting.
    pub async fn score(
        &self,
        sequence: Arc<Sequence>,
        permit: OwnedSemaphorePermit,
    ) -> Result<ScoreTriple, BackendError> {
        match self {
            Backend::Local { pipeline, .. } => {
                let pipeline = Arc::clone(pipeline);
                tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    pipeline.run(&sequence)
                })
                .await
                .map_err(|e| BackendError::Worker(e.to_string()))?
            }
            Backend::Remote { predictor, .. } => {
                let _permit = permit;
                predictor.predict(&sequence).await
            }
        }
    }

    pub fn info(&self) -> BackendInfo {
        match self {
            Backend::Local { pipeline, loaded_at } => BackendInfo {
                kind: "local",
                embedder: Some(pipeline.embedder().name().to_string()),
                embedding_dim: Some(pipeline.embedder().dimension()),
                classifier: Some(pipeline.classifier().name().to_string()),
                fingerprint: Some(pipeline.classifier().fingerprint().to_string()),
                upstream_url: None,
                loaded_at: *loaded_at,
            },
            Backend::Remote { predictor, loaded_at } => BackendInfo {
                kind: "remote",
                embedder: None,
                embedding_dim: None,
                classifier: None,
                fingerprint: None,
                upstream_url: Some(predictor.url().to_string()),
                loaded_at: *loaded_at,
            },
        }
    }
}

/// Classifier from MODEL_PATH, or the built-in head when unset
fn load_classifier(config: &Config, dim: usize) -> Result<Arc<dyn Classifier>, BackendError> {
    match &config.model_path {
        Some(path) => Ok(Arc::new(SoftmaxHead::load_from_file(path, dim)?)),
        None if dim == ResidueProfileEmbedder::DIMENSION => {
            tracing::info!("MODEL_PATH not set, using built-in classifier head");
            Ok(Arc::new(SoftmaxHead::builtin()?))
        }
        None => Err(BackendError::ClassifierUnavailable(format!(
            "no built-in classifier for {}-dim embeddings, set MODEL_PATH",
            dim
        ))),
    }
}

#[cfg(feature = "onnx")]
fn load_onnx(config: &Config) -> Result<Backend, BackendError> {
    let path = config.onnx_model_path.as_deref().ok_or_else(|| {
        BackendError::EmbeddingUnavailable("BACKEND=onnx requires ONNX_MODEL_PATH".to_string())
    })?;
    let embedder: Arc<dyn Embedder> = Arc::new(super::onnx::OnnxEmbedder::load(path)?);
    let classifier = load_classifier(config, embedder.dimension())?;
    Ok(Backend::local(LocalPipeline::new(embedder, classifier)?))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(_config: &Config) -> Result<Backend, BackendError> {
    Err(BackendError::EmbeddingUnavailable(
        "BACKEND=onnx requires building with the `onnx` feature".to_string(),
    ))
}

// ============================================================================
// TESTS
// ============================================================================
