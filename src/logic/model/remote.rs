//! Remote Predictor
//!
//! Forwards cleaned sequences to an upstream HTTP model server that answers
//! with class probabilities (`DBP`, `RBP`, `Neither`). Upstream scores are
//! re-checked as a `ScoreTriple` and the label is derived locally.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::backend::BackendError;
use super::scores::ScoreTriple;
use crate::logic::sequence::Sequence;

/// How far upstream probabilities may drift from summing to 1 before rescaling
pub const UPSTREAM_SUM_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Serialize)]
struct UpstreamRequest<'a> {
    sequence: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct UpstreamProbabilities {
    #[serde(rename = "DBP")]
    pub dbp: f64,
    #[serde(rename = "RBP")]
    pub rbp: f64,
    #[serde(rename = "Neither")]
    pub neither: f64,
}

#[derive(Debug, Deserialize)]
pub struct UpstreamResponse {
    #[serde(default)]
    pub predicted_class: Option<String>,
    pub probabilities: UpstreamProbabilities,
}

impl UpstreamResponse {
    /// Convert upstream probabilities into a valid triple
    pub fn into_scores(self) -> Result<ScoreTriple, BackendError> {
        let p = self.probabilities;
        let sum = p.dbp + p.rbp + p.neither;
        if !sum.is_finite() || (sum - 1.0).abs() > UPSTREAM_SUM_TOLERANCE {
            return Err(BackendError::Upstream(format!(
                "probabilities sum to {}, expected 1.0",
                sum
            )));
        }
        ScoreTriple::normalized(p.dbp, p.rbp, p.neither)
            .map_err(|e| BackendError::Upstream(e.to_string()))
    }
}

pub struct RemotePredictor {
    client: reqwest::Client,
    url: String,
}

impl RemotePredictor {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Upstream(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn predict(&self, sequence: &Sequence) -> Result<ScoreTriple, BackendError> {
        let response = self
            .client
            .post(&self.url)
            .json(&UpstreamRequest {
                sequence: sequence.as_str(),
            })
            .send()
            .await
            .map_err(|e| BackendError::Upstream(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Upstream(format!("upstream returned {}", status)));
        }

        let body: UpstreamResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Upstream(format!("invalid response body: {}", e)))?;

        let upstream_class = body.predicted_class.clone();
        let scores = body.into_scores()?;

        if let Some(class) = upstream_class {
            tracing::debug!("Upstream class '{}', derived label {}", class, scores.label());
        }

        Ok(scores)
    }
}
