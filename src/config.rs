//! Configuration module

use std::env;
use std::str::FromStr;
use std::time::Duration;

use validator::Validate;

use crate::logic::model::embedding::DEFAULT_CONTEXT_WINDOW;
use crate::logic::sequence::DEFAULT_MAX_SEQUENCE_LENGTH;

/// Which scoring backend serves /analyze
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Built-in residue-profile embedder + softmax head
    Local,
    /// ONNX protein language model embedder + softmax head
    Onnx,
    /// Upstream HTTP predictor
    Remote,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "onnx" => Ok(BackendKind::Onnx),
            "remote" => Ok(BackendKind::Remote),
            other => Err(format!("unknown backend '{}' (expected local, onnx or remote)", other)),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Validate)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Scoring backend
    pub backend: BackendKind,

    /// Classifier weights (JSON); built-in head when unset
    pub model_path: Option<String>,

    /// ONNX embedding model, for BACKEND=onnx
    pub onnx_model_path: Option<String>,

    /// Upstream predictor endpoint, for BACKEND=remote
    #[validate(url)]
    pub upstream_url: Option<String>,

    /// Maximum cleaned sequence length
    #[validate(range(min = 1, max = 100_000))]
    pub max_sequence_length: usize,

    /// Concurrent backend invocations
    #[validate(range(min = 1, max = 1024))]
    pub max_concurrency: usize,

    /// Per-request processing deadline
    #[validate(range(min = 1))]
    pub request_timeout_ms: u64,

    /// Pause before the single retry of a failed backend call
    pub retry_backoff_ms: u64,

    /// Half-width of the embedder's local context window
    #[validate(range(max = 64))]
    pub context_window: usize,

    /// Request body cap
    #[validate(range(min = 1024))]
    pub max_body_bytes: usize,

    /// "json" for JSON log lines, anything else for plain text
    pub log_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            environment: "development".to_string(),
            backend: BackendKind::Local,
            model_path: None,
            onnx_model_path: None,
            upstream_url: None,
            max_sequence_length: DEFAULT_MAX_SEQUENCE_LENGTH,
            max_concurrency: default_concurrency(),
            request_timeout_ms: 30_000,
            retry_backoff_ms: 100,
            context_window: DEFAULT_CONTEXT_WINDOW,
            max_body_bytes: 64 * 1024,
            log_format: "text".to_string(),
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn parsed<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let backend = match env::var("BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.backend,
        };

        Ok(Self {
            port: parsed("PORT", defaults.port),

            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),

            backend,

            model_path: optional("MODEL_PATH"),

            onnx_model_path: optional("ONNX_MODEL_PATH"),

            upstream_url: optional("UPSTREAM_URL"),

            max_sequence_length: parsed("MAX_SEQUENCE_LENGTH", defaults.max_sequence_length),

            max_concurrency: parsed("MAX_CONCURRENCY", defaults.max_concurrency),

            request_timeout_ms: parsed("REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),

            retry_backoff_ms: parsed("RETRY_BACKOFF_MS", defaults.retry_backoff_ms),

            context_window: parsed("CONTEXT_WINDOW", defaults.context_window),

            max_body_bytes: parsed("MAX_BODY_BYTES", defaults.max_body_bytes),

            log_format: env::var("LOG_FORMAT").unwrap_or(defaults.log_format),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
