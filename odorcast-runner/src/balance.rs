//! Class balance of a binary label column.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassBalance {
    pub positives: usize,
    pub negatives: usize,
    /// `NaN` cells, excluded from the ratios.
    pub missing: usize,
    pub positive_ratio: f64,
    pub negative_ratio: f64,
}

impl ClassBalance {
    /// Values greater than zero are positives. Ratios are 0 when no labelled
    /// rows exist.
    pub fn of(labels: &[f64]) -> Self {
        let missing = labels.iter().filter(|v| v.is_nan()).count();
        let positives = labels.iter().filter(|&&v| v > 0.0).count();
        let negatives = labels.len() - missing - positives;
        let total = positives + negatives;
        let (positive_ratio, negative_ratio) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                positives as f64 / total as f64,
                negatives as f64 / total as f64,
            )
        };
        Self {
            positives,
            negatives,
            missing,
            positive_ratio,
            negative_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_ratios() {
        let b = ClassBalance::of(&[0.0, 1.0, 0.0, 0.0, f64::NAN]);
        assert_eq!((b.positives, b.negatives, b.missing), (1, 3, 1));
        assert_eq!(b.positive_ratio, 0.25);
        assert_eq!(b.negative_ratio, 0.75);
    }

    #[test]
    fn empty_column_has_zero_ratios() {
        let b = ClassBalance::of(&[]);
        assert_eq!(b.positive_ratio, 0.0);
        assert_eq!(b.negative_ratio, 0.0);
    }
}
