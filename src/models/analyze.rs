//! /analyze request and response bodies

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::model::Label;
use crate::logic::service::{AnalyzeOptions, PredictionResult};

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub sequence: String,
    #[serde(default)]
    pub strict: bool,
}

impl AnalyzeRequest {
    pub fn options(&self) -> AnalyzeOptions {
        AnalyzeOptions { strict: self.strict }
    }
}

/// Flat response shape expected by the web client
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub id: Uuid,
    pub sequence: String,
    pub label: Label,
    pub dna_score: f64,
    pub rna_score: f64,
    pub neither_score: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub processing_time_ms: f64,
}

impl From<PredictionResult> for AnalyzeResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            id: result.id,
            sequence: result.sequence.to_string(),
            label: result.label,
            dna_score: result.scores.dna(),
            rna_score: result.scores.rna(),
            neither_score: result.scores.neither(),
            timestamp: result.timestamp.timestamp_millis(),
            processing_time_ms: result.processing_time.as_secs_f64() * 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_strict_defaults_false() {
        let req: AnalyzeRequest = serde_json::from_str(r#"{"sequence": "MKT"}"#).unwrap();
        assert!(!req.options().strict);

        let req: AnalyzeRequest = serde_json::from_str(r#"{"sequence": "MKT", "strict": true}"#).unwrap();
        assert!(req.options().strict);
    }
}
