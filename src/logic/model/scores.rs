//! Class scores and label derivation

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Both binding scores must exceed this for a dual-binding call
pub const DRBP_THRESHOLD: f64 = 0.35;

/// Allowed deviation of a score triple's sum from 1.0
pub const SUM_TOLERANCE: f64 = 1e-6;

// ============================================================================
// LABEL
// ============================================================================

/// Predicted binding class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "DNA")]
    Dna,
    #[serde(rename = "RNA")]
    Rna,
    #[serde(rename = "DRBP")]
    Drbp,
    Neither,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Dna => "DNA",
            Label::Rna => "RNA",
            Label::Drbp => "DRBP",
            Label::Neither => "Neither",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SCORE TRIPLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("score {name} is not a finite non-negative number: {value}")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("scores sum to {0}, expected 1.0")]
    BadSum(f64),
}

/// Probability distribution over (dna, rna, neither).
///
/// Fields are private so every instance satisfies the sum-to-one invariant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreTriple {
    dna: f64,
    rna: f64,
    neither: f64,
}

impl ScoreTriple {
    /// Build from probabilities that already sum to 1 (within tolerance)
    pub fn new(dna: f64, rna: f64, neither: f64) -> Result<Self, ScoreError> {
        Self::check(dna, rna, neither)?;
        let sum = dna + rna + neither;
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(ScoreError::BadSum(sum));
        }
        Ok(Self { dna, rna, neither })
    }

    /// Build from non-negative weights, rescaling them to sum to 1.
    ///
    /// Used for upstream probabilities that are rounded in transit.
    pub fn normalized(dna: f64, rna: f64, neither: f64) -> Result<Self, ScoreError> {
        Self::check(dna, rna, neither)?;
        let sum = dna + rna + neither;
        if sum <= 0.0 || !sum.is_finite() {
            return Err(ScoreError::BadSum(sum));
        }
        Ok(Self {
            dna: dna / sum,
            rna: rna / sum,
            neither: neither / sum,
        })
    }

    /// Numerically stable softmax over (dna, rna, neither) logits
    pub fn from_logits(logits: [f64; 3]) -> Result<Self, ScoreError> {
        for (name, value) in ["dna", "rna", "neither"].into_iter().zip(logits) {
            if !value.is_finite() {
                return Err(ScoreError::OutOfRange { name, value });
            }
        }

        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps = logits.map(|l| (l - max).exp());
        Self::normalized(exps[0], exps[1], exps[2])
    }

    fn check(dna: f64, rna: f64, neither: f64) -> Result<(), ScoreError> {
        for (name, value) in [("dna", dna), ("rna", rna), ("neither", neither)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ScoreError::OutOfRange { name, value });
            }
        }
        Ok(())
    }

    pub fn dna(&self) -> f64 {
        self.dna
    }

    pub fn rna(&self) -> f64 {
        self.rna
    }

    pub fn neither(&self) -> f64 {
        self.neither
    }

    pub fn sum(&self) -> f64 {
        self.dna + self.rna + self.neither
    }

    /// Derive the label.
    ///
    /// DRBP is tested first; the single-class tests use strict `>`, so an
    /// exact tie between the two leading scores falls through to `Neither`.
    pub fn label(&self) -> Label {
        let (dna, rna, neither) = (self.dna, self.rna, self.neither);

        if dna > DRBP_THRESHOLD && rna > DRBP_THRESHOLD {
            Label::Drbp
        } else if dna > rna && dna > neither {
            Label::Dna
        } else if rna > dna && rna > neither {
            Label::Rna
        } else {
            Label::Neither
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
