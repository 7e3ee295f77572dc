//! Prediction Service
//!
//! Request orchestration: validate -> (embed -> classify) -> result.
//! Validation fails fast before any backend work. Backend access is bounded
//! by a semaphore; each request has a deadline and one retry on backend error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::model::{Backend, BackendError, BackendInfo, Label, ScoreTriple};
use super::sequence::{Sequence, ValidationError, ValidationPolicy};
use crate::config::Config;

/// First try plus one retry
const MAX_ATTEMPTS: u32 = 2;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Per-request options
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeOptions {
    /// Reject unknown characters instead of stripping them
    pub strict: bool,
}

/// Outcome of one request. Not retained after it is returned.
#[derive(Debug, Clone)]
pub struct PredictionResult {
    pub id: Uuid,
    pub sequence: Sequence,
    pub label: Label,
    pub scores: ScoreTriple,
    pub timestamp: DateTime<Utc>,
    /// Embed + classify wall-clock time
    pub processing_time: Duration,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("request exceeded the {}ms processing deadline", .0.as_millis())]
    Timeout(Duration),
}

/// Limits applied to every request
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub max_sequence_length: usize,
    pub max_concurrency: usize,
    pub request_timeout: Duration,
    pub retry_backoff: Duration,
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_sequence_length: config.max_sequence_length,
            max_concurrency: config.max_concurrency,
            request_timeout: config.request_timeout(),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Status for the /model endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub backend: BackendInfo,
    pub inference_count: u64,
    pub failure_count: u64,
    pub avg_latency_ms: f64,
    pub max_concurrency: usize,
    pub available_permits: usize,
    pub max_sequence_length: usize,
}

/// Process-wide counters, reporting only
#[derive(Debug, Default)]
struct InferenceStats {
    count: AtomicU64,
    failures: AtomicU64,
    latency_us_sum: AtomicU64,
}

impl InferenceStats {
    fn record(&self, elapsed: Duration) {
        self.latency_us_sum
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    fn avg_latency_ms(&self) -> f64 {
        let sum = self.latency_us_sum.load(Ordering::Relaxed);
        let count = self.count.load(Ordering::Relaxed);
        if count > 0 {
            (sum as f64 / count as f64) / 1000.0
        } else {
            0.0
        }
    }
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct PredictionService {
    backend: Backend,
    limiter: Arc<Semaphore>,
    policy: ValidationPolicy,
    settings: ServiceSettings,
    stats: InferenceStats,
}

impl PredictionService {
    pub fn new(backend: Backend, settings: ServiceSettings) -> Self {
        Self {
            backend,
            limiter: Arc::new(Semaphore::new(settings.max_concurrency)),
            policy: ValidationPolicy::new(settings.max_sequence_length),
            settings,
            stats: InferenceStats::default(),
        }
    }

    /// Validate, score and label one raw sequence
    pub async fn handle(&self, raw: &str, options: AnalyzeOptions) -> Result<PredictionResult, ServiceError> {
        let policy = self.policy.strict(options.strict);
        let sequence = Arc::new(Sequence::validate(raw, &policy)?);

        let deadline = self.settings.request_timeout;
        let outcome = tokio::time::timeout(deadline, self.score_with_retry(Arc::clone(&sequence))).await;

        let (scores, processing_time) = match outcome {
            Ok(Ok(scored)) => scored,
            Ok(Err(e)) => {
                self.stats.record_failure();
                return Err(e.into());
            }
            Err(_) => {
                self.stats.record_failure();
                tracing::warn!(
                    "Request timed out after {}ms ({} residues)",
                    deadline.as_millis(),
                    sequence.len()
                );
                return Err(ServiceError::Timeout(deadline));
            }
        };

        self.stats.record(processing_time);

        let result = PredictionResult {
            id: Uuid::new_v4(),
            sequence: Arc::unwrap_or_clone(sequence),
            label: scores.label(),
            scores,
            timestamp: Utc::now(),
            processing_time,
        };

        tracing::debug!(
            "Prediction {}: {} ({} residues, {:.2}ms)",
            result.id,
            result.label,
            result.sequence.len(),
            processing_time.as_secs_f64() * 1000.0
        );

        Ok(result)
    }

    /// Returns scores and time spent inside the backend (queueing and
    /// backoff excluded)
    async fn score_with_retry(&self, sequence: Arc<Sequence>) -> Result<(ScoreTriple, Duration), BackendError> {
        let mut stage_time = Duration::ZERO;
        let mut attempt = 1;

        loop {
            let permit = Arc::clone(&self.limiter)
                .acquire_owned()
                .await
                .map_err(|e| BackendError::Worker(e.to_string()))?;

            let started = Instant::now();
            let result = self.backend.score(Arc::clone(&sequence), permit).await;
            stage_time += started.elapsed();

            match result {
                Ok(scores) => return Ok((scores, stage_time)),
                Err(e) if attempt < MAX_ATTEMPTS && e.is_retryable() => {
                    tracing::warn!("Backend attempt {} failed, retrying: {}", attempt, e);
                    tokio::time::sleep(self.settings.retry_backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            backend: self.backend.info(),
            inference_count: self.stats.count.load(Ordering::Relaxed),
            failure_count: self.stats.failures.load(Ordering::Relaxed),
            avg_latency_ms: self.stats.avg_latency_ms(),
            max_concurrency: self.settings.max_concurrency,
            available_permits: self.limiter.available_permits(),
            max_sequence_length: self.settings.max_sequence_length,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::model::scores::SUM_TOLERANCE;
    use crate::logic::model::{Embedder, Embedding, LocalPipeline, ResidueProfileEmbedder, SoftmaxHead};
    use std::sync::atomic::AtomicUsize;

    /// Wraps the built-in embedder: counts calls, optionally fails or stalls
    struct StubEmbedder {
        inner: ResidueProfileEmbedder,
        calls: Arc<AtomicUsize>,
        failures_left: AtomicUsize,
        delay: Duration,
    }

    impl Embedder for StubEmbedder {
        fn name(&self) -> &str {
            "stub"
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn embed(&self, sequence: &Sequence) -> Result<Embedding, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(BackendError::EmbeddingUnavailable("stub failure".to_string()));
            }
            self.inner.embed(sequence)
        }
    }

    fn settings() -> ServiceSettings {
        ServiceSettings {
            max_sequence_length: 50,
            max_concurrency: 2,
            request_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(1),
        }
    }

    fn service_with(failures: usize, delay: Duration, settings: ServiceSettings) -> (PredictionService, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let embedder = StubEmbedder {
            inner: ResidueProfileEmbedder::default(),
            calls: Arc::clone(&calls),
            failures_left: AtomicUsize::new(failures),
            delay,
        };
        let pipeline = LocalPipeline::new(Arc::new(embedder), Arc::new(SoftmaxHead::builtin().unwrap())).unwrap();
        (PredictionService::new(Backend::local(pipeline), settings), calls)
    }

    fn service() -> (PredictionService, Arc<AtomicUsize>) {
        service_with(0, Duration::ZERO, settings())
    }

    #[tokio::test]
    async fn test_handle_cleans_and_scores() {
        let (service, calls) = service();
        let result = service.handle("mkt123IIAL", AnalyzeOptions::default()).await.unwrap();

        assert_eq!(result.sequence.as_str(), "MKTIIAL");
        assert!((result.scores.sum() - 1.0).abs() < SUM_TOLERANCE);
        assert_eq!(result.label, result.scores.label());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.status().inference_count, 1);
    }

    #[test]
    fn test_empty_input_makes_no_backend_call() {
        let (service, calls) = service();
        for raw in ["", "   \n", "1234"] {
            let err = tokio_test::block_on(service.handle(raw, AnalyzeOptions::default())).unwrap_err();
            assert!(matches!(err, ServiceError::Validation(ValidationError::EmptySequence)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_strict_and_length_errors() {
        let (service, calls) = service();

        let err = service.handle("mkt123", AnalyzeOptions { strict: true }).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ValidationError::InvalidCharacters { .. })));

        let err = service.handle(&"A".repeat(51), AnalyzeOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::SequenceTooLong { length: 51, max: 50 })
        ));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_identical_input_identical_scores() {
        let (service, _) = service();
        let a = service.handle("MKTAYIAKQRQISFVK", AnalyzeOptions::default()).await.unwrap();
        let b = service.handle("mktayiakqrqisfvk", AnalyzeOptions::default()).await.unwrap();

        assert_eq!(a.scores, b.scores);
        assert_eq!(a.label, b.label);
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_backend_failure_retried_once() {
        let (service, calls) = service_with(1, Duration::ZERO, settings());
        let result = service.handle("MKTIIAL", AnalyzeOptions::default()).await;

        tokio_test::assert_ok!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_backend_failure_surfaces_after_retry() {
        let (service, calls) = service_with(usize::MAX, Duration::ZERO, settings());
        let err = service.handle("MKTIIAL", AnalyzeOptions::default()).await.unwrap_err();

        assert!(matches!(err, ServiceError::Backend(BackendError::EmbeddingUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(service.status().failure_count, 1);
    }

    #[tokio::test]
    async fn test_processing_time_excludes_queueing_and_backoff() {
        let settings = ServiceSettings {
            max_concurrency: 1,
            retry_backoff: Duration::from_millis(300),
            ..settings()
        };
        let (service, calls) = service_with(1, Duration::ZERO, settings);

        // Another request holds the only permit for a while
        let held = Arc::clone(&service.limiter).acquire_owned().await.unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            drop(held);
        });

        let started = Instant::now();
        let result = service.handle("MKTIIAL", AnalyzeOptions::default()).await.unwrap();
        let wall = started.elapsed();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(wall >= Duration::from_millis(500), "wall {:?}", wall);
        assert!(
            result.processing_time < Duration::from_millis(100),
            "processing {:?}",
            result.processing_time
        );
    }

    #[tokio::test]
    async fn test_timeout_keeps_permit_until_backend_finishes() {
        let settings = ServiceSettings {
            max_concurrency: 1,
            request_timeout: Duration::from_millis(50),
            ..settings()
        };
        let (service, _) = service_with(0, Duration::from_millis(400), settings);

        let err = service.handle("MKTIIAL", AnalyzeOptions::default()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout(_)));

        // Abandoned work still occupies the backend
        assert_eq!(service.status().available_permits, 0);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(service.status().available_permits, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_independent() {
        let (service, calls) = service_with(0, Duration::from_millis(20), settings());
        let service = Arc::new(service);

        let inputs = ["MKT", "KKKKKKKK", "RGGRGGYRGG", "LLAAVVIIEEDD", "MKT", "ACDEFGHIKLMNPQRSTVWY"];
        let mut set = tokio::task::JoinSet::new();
        for (i, raw) in inputs.iter().enumerate() {
            let service = Arc::clone(&service);
            let raw = raw.to_string();
            set.spawn(async move { (i, service.handle(&raw, AnalyzeOptions::default()).await) });
        }

        let mut results = vec![None; inputs.len()];
        while let Some(joined) = set.join_next().await {
            let (i, result) = joined.unwrap();
            results[i] = Some(result.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), inputs.len());
        let first = results[0].as_ref().unwrap();
        let repeat = results[4].as_ref().unwrap();
        assert_eq!(first.scores, repeat.scores);
        assert_eq!(service.status().available_permits, 2);
    }
}
