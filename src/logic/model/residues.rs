//! Residue Feature Table
//!
//! Fixed per-residue representation for the built-in embedder:
//! 20-way one-hot identity followed by standardized physicochemical scales.
//! Row order follows `AMINO_ACIDS` (ACDEFGHIKLMNPQRSTVWY).

use ndarray::Array2;

use crate::logic::sequence::AMINO_ACIDS;

/// Number of physicochemical scales
pub const PHYSCHEM_COUNT: usize = 7;

/// Width of one residue's feature row
pub const RESIDUE_FEATURES: usize = AMINO_ACIDS.len() + PHYSCHEM_COUNT;

/// Scale names, in column order after the one-hot block
pub const PHYSCHEM_NAMES: [&str; PHYSCHEM_COUNT] = [
    "hydropathy",
    "charge",
    "polarity",
    "volume",
    "aromaticity",
    "flexibility",
    "isoelectric_point",
];

// Raw scales, one value per residue in AMINO_ACIDS order.
//                A      C      D      E      F      G      H      I      K      L
//                M      N      P      Q      R      S      T      V      W      Y

/// Kyte-Doolittle hydropathy
const HYDROPATHY: [f64; 20] = [
    1.8, 2.5, -3.5, -3.5, 2.8, -0.4, -3.2, 4.5, -3.9, 3.8,
    1.9, -3.5, -1.6, -3.5, -4.5, -0.8, -0.7, 4.2, -0.9, -1.3,
];

/// Side-chain charge at pH 7
const CHARGE: [f64; 20] = [
    0.0, 0.0, -1.0, -1.0, 0.0, 0.0, 0.1, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
];

/// Grantham polarity
const POLARITY: [f64; 20] = [
    8.1, 5.5, 13.0, 12.3, 5.2, 9.0, 10.4, 5.2, 11.3, 4.9,
    5.7, 11.6, 8.0, 10.5, 10.5, 9.2, 8.6, 5.9, 5.4, 6.2,
];

/// Residue volume (cubic angstroms)
const VOLUME: [f64; 20] = [
    88.6, 108.5, 111.1, 138.4, 189.9, 60.1, 153.2, 166.7, 168.6, 166.7,
    162.9, 114.1, 112.7, 143.8, 173.4, 89.0, 116.1, 140.0, 227.8, 193.6,
];

const AROMATICITY: [f64; 20] = [
    0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0,
];

/// Vihinen flexibility
const FLEXIBILITY: [f64; 20] = [
    0.984, 0.906, 1.068, 1.094, 0.915, 1.031, 0.950, 0.927, 1.102, 0.935,
    0.952, 1.048, 1.049, 1.037, 1.008, 1.046, 0.997, 0.931, 0.904, 0.929,
];

const ISOELECTRIC_POINT: [f64; 20] = [
    6.00, 5.07, 2.77, 3.22, 5.48, 5.97, 7.59, 6.02, 9.74, 5.98,
    5.74, 5.41, 6.30, 5.65, 10.76, 5.68, 5.60, 5.96, 5.89, 5.66,
];

const SCALES: [&[f64; 20]; PHYSCHEM_COUNT] = [
    &HYDROPATHY,
    &CHARGE,
    &POLARITY,
    &VOLUME,
    &AROMATICITY,
    &FLEXIBILITY,
    &ISOELECTRIC_POINT,
];

/// Z-score a scale across the 20 residues
fn standardize(scale: &[f64; 20]) -> [f64; 20] {
    let n = scale.len() as f64;
    let mean = scale.iter().sum::<f64>() / n;
    let variance = scale.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt().max(1e-12);
    scale.map(|v| (v - mean) / std)
}

/// Build the `[20, RESIDUE_FEATURES]` feature table
pub fn feature_table() -> Array2<f32> {
    let mut table = Array2::<f32>::zeros((AMINO_ACIDS.len(), RESIDUE_FEATURES));

    for residue in 0..AMINO_ACIDS.len() {
        table[[residue, residue]] = 1.0;
    }

    for (k, scale) in SCALES.iter().enumerate() {
        let z = standardize(scale);
        let column = AMINO_ACIDS.len() + k;
        for (residue, value) in z.iter().enumerate() {
            table[[residue, column]] = *value as f32;
        }
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::sequence::residue_index;

    #[test]
    fn test_table_shape_and_one_hot() {
        let table = feature_table();
        assert_eq!(table.dim(), (20, RESIDUE_FEATURES));
        for r in 0..20 {
            let ones = (0..20).filter(|c| table[[r, *c]] == 1.0).count();
            assert_eq!(ones, 1);
            assert_eq!(table[[r, r]], 1.0);
        }
    }

    #[test]
    fn test_scales_standardized() {
        let table = feature_table();
        for k in 0..PHYSCHEM_COUNT {
            let col = table.column(20 + k);
            let mean: f32 = col.sum() / 20.0;
            assert!(mean.abs() < 1e-4, "{} mean {}", PHYSCHEM_NAMES[k], mean);
        }
    }

    #[test]
    fn test_charge_column_sign() {
        let table = feature_table();
        let col = AMINO_ACIDS.len() + PHYSCHEM_NAMES.iter().position(|n| *n == "charge").unwrap();
        let k = residue_index(b'K').unwrap();
        let d = residue_index(b'D').unwrap();
        assert!(table[[k, col]] > 0.0);
        assert!(table[[d, col]] < 0.0);
    }
}
