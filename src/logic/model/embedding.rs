//! Embedding - sequence to fixed-size vector
//!
//! The service only depends on the `Embedder` trait, so the representation
//! model can be swapped (built-in residue profile, ONNX protein LM, ...)
//! without touching the classifier or the HTTP layer.

use ndarray::{Array1, Array2, Axis};

use super::backend::BackendError;
use super::residues::{feature_table, RESIDUE_FEATURES};
use crate::logic::sequence::Sequence;

/// Default half-width of the local context window
pub const DEFAULT_CONTEXT_WINDOW: usize = 3;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Fixed-dimension vector derived from one sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    values: Array1<f32>,
    model: String,
}

impl Embedding {
    pub fn new(values: Array1<f32>, model: impl Into<String>) -> Self {
        Self {
            values,
            model: model.into(),
        }
    }

    pub fn values(&self) -> &Array1<f32> {
        &self.values
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Name of the model that produced this embedding
    pub fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// EMBEDDER TRAIT
// ============================================================================

/// Sequence embedding backend.
///
/// Implementations must be deterministic: the same sequence always yields a
/// bit-identical embedding.
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;
    fn dimension(&self) -> usize;
    fn embed(&self, sequence: &Sequence) -> Result<Embedding, BackendError>;
}

// ============================================================================
// RESIDUE PROFILE EMBEDDER
// ============================================================================

/// Built-in embedder over fixed residue features.
///
/// Layout: `[mean of residue features || std-dev of windowed means || log length]`.
///
/// The first block is order-free composition. The second pools the local
/// window averages by their spread across the sequence, so clustered
/// residues (`KKKKKDDDDD`) and interleaved ones (`KDKDKDKDKD`) embed apart.
#[derive(Debug, Clone)]
pub struct ResidueProfileEmbedder {
    table: Array2<f32>,
    window: usize,
}

impl ResidueProfileEmbedder {
    pub const NAME: &'static str = "residue-profile-v2";

    /// Output dimension
    pub const DIMENSION: usize = 2 * RESIDUE_FEATURES + 1;

    pub fn new(window: usize) -> Self {
        Self {
            table: feature_table(),
            window,
        }
    }

    /// Per-residue feature rows, `[n, RESIDUE_FEATURES]`
    fn residue_rows(&self, sequence: &Sequence) -> Array2<f64> {
        let indices: Vec<usize> = sequence.residue_indices().collect();
        self.table.select(Axis(0), &indices).mapv(f64::from)
    }

    /// Mean of each residue's context window, `[n, RESIDUE_FEATURES]`.
    /// Windows are truncated at the sequence ends.
    fn context_rows(&self, rows: &Array2<f64>) -> Array2<f64> {
        let n = rows.nrows();

        // prefix[i] = sum of rows[..i]
        let mut prefix = Array2::<f64>::zeros((n + 1, RESIDUE_FEATURES));
        for i in 0..n {
            let next = &prefix.row(i) + &rows.row(i);
            prefix.row_mut(i + 1).assign(&next);
        }

        let mut context = Array2::<f64>::zeros((n, RESIDUE_FEATURES));
        for i in 0..n {
            let lo = i.saturating_sub(self.window);
            let hi = (i + self.window + 1).min(n);
            let span = (hi - lo) as f64;
            let mean = (&prefix.row(hi) - &prefix.row(lo)) / span;
            context.row_mut(i).assign(&mean);
        }

        context
    }
}

impl Default for ResidueProfileEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_WINDOW)
    }
}

impl Embedder for ResidueProfileEmbedder {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn dimension(&self) -> usize {
        Self::DIMENSION
    }

    fn embed(&self, sequence: &Sequence) -> Result<Embedding, BackendError> {
        let rows = self.residue_rows(sequence);
        if rows.nrows() == 0 {
            return Err(BackendError::EmbeddingUnavailable(
                "cannot embed an empty sequence".to_string(),
            ));
        }

        let context = self.context_rows(&rows);

        // Every position is a real residue, so the pooling mask is all ones
        let own_mean = rows
            .mean_axis(Axis(0))
            .ok_or_else(|| BackendError::EmbeddingUnavailable("mean pooling failed".to_string()))?;
        let context_spread = context.std_axis(Axis(0), 0.0);

        let mut values = Vec::with_capacity(Self::DIMENSION);
        values.extend(own_mean.iter().map(|v| *v as f32));
        values.extend(context_spread.iter().map(|v| *v as f32));
        values.push(((sequence.len() as f64).ln() / 10.0) as f32);

        Ok(Embedding::new(Array1::from(values), Self::NAME))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::sequence::{residue_index, ValidationPolicy, AMINO_ACIDS};

    fn seq(s: &str) -> Sequence {
        Sequence::validate(s, &ValidationPolicy::default()).unwrap()
    }

    #[test]
    fn test_dimension_fixed() {
        let embedder = ResidueProfileEmbedder::default();
        for s in ["M", "MKT", "MKTAYIAKQRQISFVKSHFSRQLEERLGLIEVQAPILSRVGDGTQDNLSGAEKAVQVKVKALPDAQFEVVHSLAKWKRQTLGQHDFSAGEGLYTHMKALRPDEDRLSPLHSVYVDQWDWERVMGDGERQFSTLKSTVEAIWAGIKATEAAVSEEFGLAPFLPDQIHFVHSQELLSRYPDLDAKGRERAIAKDLGAVFLVGIGGKLSDGHRHDVRAPDYDDWSTPSELGHAGLNGDILVWNPVLEDAFELSSMGIRVDADTLKHQLALTGDEDRLELEWHQALLRGEMPQTIGGGIGQSRLTMLLLQLPHIGQVQAGVWPAACRESVPALL"] {
            let e = embedder.embed(&seq(s)).unwrap();
            assert_eq!(e.dimension(), ResidueProfileEmbedder::DIMENSION);
            assert_eq!(e.dimension(), embedder.dimension());
            assert_eq!(e.model(), ResidueProfileEmbedder::NAME);
        }
    }

    #[test]
    fn test_embedding_deterministic() {
        let embedder = ResidueProfileEmbedder::default();
        let s = seq("MKTAYIAKQRQISFVKSHFSRQ");
        let a = embedder.embed(&s).unwrap();
        let b = embedder.embed(&s).unwrap();
        let bits_a: Vec<u32> = a.values().iter().map(|v| v.to_bits()).collect();
        let bits_b: Vec<u32> = b.values().iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits_a, bits_b);

        // A fresh instance gives the same result
        let c = ResidueProfileEmbedder::default().embed(&s).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn test_composition_block() {
        let embedder = ResidueProfileEmbedder::default();
        let e = embedder.embed(&seq("KKKA")).unwrap();
        let values = e.values();

        let k = AMINO_ACIDS.iter().position(|aa| *aa == b'K').unwrap();
        assert!((values[k] - 0.75).abs() < 1e-6);
        assert!((values[0] - 0.25).abs() < 1e-6);

        let composition_sum: f32 = values.iter().take(20).sum();
        assert!((composition_sum - 1.0).abs() < 1e-5);
    }

    fn block_distance(a: &Embedding, b: &Embedding) -> f32 {
        (RESIDUE_FEATURES..2 * RESIDUE_FEATURES)
            .map(|i| (a.values()[i] - b.values()[i]).abs())
            .fold(0.0, f32::max)
    }

    #[test]
    fn test_residue_order_changes_embedding() {
        let embedder = ResidueProfileEmbedder::default();
        let clustered = embedder.embed(&seq("KKKKKDDDDD")).unwrap();
        let interleaved = embedder.embed(&seq("KDKDKDKDKD")).unwrap();

        // Same composition and length
        for i in 0..RESIDUE_FEATURES {
            assert!((clustered.values()[i] - interleaved.values()[i]).abs() < 1e-6);
        }
        let last = ResidueProfileEmbedder::DIMENSION - 1;
        assert_eq!(clustered.values()[last], interleaved.values()[last]);

        // Local context tells them apart
        assert!(block_distance(&clustered, &interleaved) > 0.1);
    }

    #[test]
    fn test_context_window_changes_context_block() {
        let s = seq("KDKDKDKDKDKDKDKDKDKD");
        let narrow = ResidueProfileEmbedder::new(0).embed(&s).unwrap();
        let wide = ResidueProfileEmbedder::new(5).embed(&s).unwrap();

        // Own block identical, context block differs
        for i in 0..RESIDUE_FEATURES {
            assert_eq!(narrow.values()[i], wide.values()[i]);
        }
        assert!(block_distance(&narrow, &wide) > 0.1);

        // Window 0: each residue is its own context, K/D one-hot spread is 0.5
        let k = residue_index(b'K').unwrap();
        assert!((narrow.values()[RESIDUE_FEATURES + k] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_homopolymer_has_no_context_spread() {
        let e = ResidueProfileEmbedder::default().embed(&seq("GGGGGGGGGGGG")).unwrap();
        for i in RESIDUE_FEATURES..2 * RESIDUE_FEATURES {
            assert!(e.values()[i].abs() < 1e-6);
        }
    }

    #[test]
    fn test_single_residue() {
        let e = ResidueProfileEmbedder::default().embed(&seq("W")).unwrap();
        // ln(1) = 0
        assert_eq!(e.values()[ResidueProfileEmbedder::DIMENSION - 1], 0.0);
        assert!(e.values().iter().all(|v| v.is_finite()));
    }
}
