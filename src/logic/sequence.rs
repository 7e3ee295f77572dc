//! Sequence Validator
//!
//! Normalizes raw user input into a validated amino-acid `Sequence`.
//! Runs before any backend work so bad input never costs an embedding.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

// ============================================================================
// ALPHABET
// ============================================================================

/// The 20 standard amino acids, in the order used for one-hot encodings
pub const AMINO_ACIDS: [u8; 20] = *b"ACDEFGHIKLMNPQRSTVWY";

/// Default upper bound on cleaned sequence length
pub const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 5_000;

/// Index of a residue in `AMINO_ACIDS`, if it is a standard residue.
/// Expects an uppercase byte.
pub fn residue_index(residue: u8) -> Option<usize> {
    match residue {
        b'A' => Some(0),
        b'C' => Some(1),
        b'D' => Some(2),
        b'E' => Some(3),
        b'F' => Some(4),
        b'G' => Some(5),
        b'H' => Some(6),
        b'I' => Some(7),
        b'K' => Some(8),
        b'L' => Some(9),
        b'M' => Some(10),
        b'N' => Some(11),
        b'P' => Some(12),
        b'Q' => Some(13),
        b'R' => Some(14),
        b'S' => Some(15),
        b'T' => Some(16),
        b'V' => Some(17),
        b'W' => Some(18),
        b'Y' => Some(19),
        _ => None,
    }
}

fn is_standard(c: char) -> bool {
    c.is_ascii() && residue_index(c.to_ascii_uppercase() as u8).is_some()
}

/// Uppercase and drop everything outside the 20-letter alphabet.
///
/// Idempotent: `clean(&clean(s)) == clean(s)`.
pub fn clean(raw: &str) -> String {
    raw.chars()
        .filter(|c| is_standard(*c))
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("sequence is empty after removing non amino-acid characters")]
    EmptySequence,

    #[error("sequence has {length} residues, maximum is {max}")]
    SequenceTooLong { length: usize, max: usize },

    #[error("invalid character '{character}' at position {position}")]
    InvalidCharacters { character: char, position: usize },
}

impl ValidationError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::EmptySequence => "empty_sequence",
            ValidationError::SequenceTooLong { .. } => "sequence_too_long",
            ValidationError::InvalidCharacters { .. } => "invalid_characters",
        }
    }
}

// ============================================================================
// POLICY
// ============================================================================

/// How strictly raw input is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Reject unknown characters instead of stripping them
    pub strict: bool,
    /// Maximum cleaned length
    pub max_length: usize,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            strict: false,
            max_length: DEFAULT_MAX_SEQUENCE_LENGTH,
        }
    }
}

impl ValidationPolicy {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            ..Default::default()
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

// ============================================================================
// SEQUENCE
// ============================================================================

/// A validated protein sequence: non-empty, uppercase, standard residues only
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Sequence(String);

impl Sequence {
    /// Validate raw input under the given policy
    pub fn validate(raw: &str, policy: &ValidationPolicy) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();

        if policy.strict {
            // Positions index the input as sent, leading whitespace included
            let leading = raw.chars().count() - raw.trim_start().chars().count();
            if let Some((offset, character)) =
                trimmed.chars().enumerate().find(|(_, c)| !is_standard(*c))
            {
                return Err(ValidationError::InvalidCharacters {
                    character,
                    position: leading + offset,
                });
            }
        }

        let cleaned = clean(trimmed);

        if cleaned.is_empty() {
            return Err(ValidationError::EmptySequence);
        }
        if cleaned.len() > policy.max_length {
            return Err(ValidationError::SequenceTooLong {
                length: cleaned.len(),
                max: policy.max_length,
            });
        }

        Ok(Self(cleaned))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a validated sequence
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Residue indices into `AMINO_ACIDS`
    pub fn residue_indices(&self) -> impl Iterator<Item = usize> + '_ {
        // Validation guarantees every byte is a standard residue
        self.0.bytes().filter_map(residue_index)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Sequence {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_digits_and_uppercases() {
        assert_eq!(clean("mkt123IIAL"), "MKTIIAL");
    }

    #[test]
    fn test_clean_drops_nonstandard_letters() {
        // B, J, O, U, X, Z are letters but not standard residues
        assert_eq!(clean("ABJOUXZC"), "AC");
        assert_eq!(clean("ä-M K\tT\n"), "MKT");
    }

    #[test]
    fn test_clean_idempotent() {
        let inputs = [
            "",
            "   ",
            "mkt123IIAL",
            ">sp|P12345| header\nMKTAYIAKQR",
            "ΑΒΓ acdefghiklmnpqrstvwy 0987",
            "xxxxBZ",
        ];
        for s in inputs {
            let once = clean(s);
            assert_eq!(clean(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_residue_index_covers_alphabet() {
        for (i, aa) in AMINO_ACIDS.iter().enumerate() {
            assert_eq!(residue_index(*aa), Some(i));
        }
        assert_eq!(residue_index(b'X'), None);
        assert_eq!(residue_index(b'a'), None);
    }

    #[test]
    fn test_validate_permissive_default() {
        let seq = Sequence::validate("mkt123IIAL", &ValidationPolicy::default()).unwrap();
        assert_eq!(seq.as_str(), "MKTIIAL");
        assert_eq!(seq.len(), 7);
    }

    #[test]
    fn test_validate_empty() {
        let policy = ValidationPolicy::default();
        assert_eq!(Sequence::validate("", &policy), Err(ValidationError::EmptySequence));
        assert_eq!(Sequence::validate("  \n\t ", &policy), Err(ValidationError::EmptySequence));
        assert_eq!(Sequence::validate("123-456", &policy), Err(ValidationError::EmptySequence));
    }

    #[test]
    fn test_validate_whitespace_only_strict_is_empty() {
        let policy = ValidationPolicy::default().strict(true);
        assert_eq!(Sequence::validate("   ", &policy), Err(ValidationError::EmptySequence));
    }

    #[test]
    fn test_validate_too_long() {
        let policy = ValidationPolicy::new(10);
        let err = Sequence::validate(&"A".repeat(11), &policy).unwrap_err();
        assert_eq!(err, ValidationError::SequenceTooLong { length: 11, max: 10 });

        // Limit applies to the cleaned length
        assert!(Sequence::validate(&format!("{}1234567890", "A".repeat(10)), &policy).is_ok());
    }

    #[test]
    fn test_validate_strict_rejects_unknowns() {
        let policy = ValidationPolicy::default().strict(true);
        let err = Sequence::validate("mkt123", &policy).unwrap_err();
        assert_eq!(err, ValidationError::InvalidCharacters { character: '1', position: 3 });
        assert_eq!(err.code(), "invalid_characters");

        let err = Sequence::validate("MKT X", &policy).unwrap_err();
        assert_eq!(err, ValidationError::InvalidCharacters { character: ' ', position: 3 });
    }

    #[test]
    fn test_strict_position_counts_leading_whitespace() {
        let policy = ValidationPolicy::default().strict(true);
        let err = Sequence::validate("  M1", &policy).unwrap_err();
        assert_eq!(err, ValidationError::InvalidCharacters { character: '1', position: 3 });

        let err = Sequence::validate("\n\tMKTé", &policy).unwrap_err();
        assert_eq!(err, ValidationError::InvalidCharacters { character: 'é', position: 5 });
    }

    #[test]
    fn test_validate_strict_accepts_clean_input() {
        let policy = ValidationPolicy::default().strict(true);
        let seq = Sequence::validate("  mktAYIAKQR\n", &policy).unwrap();
        assert_eq!(seq.as_str(), "MKTAYIAKQR");
    }

    #[test]
    fn test_residue_indices() {
        let seq = Sequence::validate("ACY", &ValidationPolicy::default()).unwrap();
        assert_eq!(seq.residue_indices().collect::<Vec<_>>(), vec![0, 1, 19]);
    }
}
