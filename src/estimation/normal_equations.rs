//! # Normal-equation accumulation
//!
//! Each scalar residual component `r` with weight `w` and sensitivity row `a` contributes
//! `w·a·aᵗ` to `AtWA` and `w·a·r` to `AtWb`. The same pass keeps per-type residual
//! statistics so the fit can report one weighted RMS per observation kind next to the
//! pooled value that drives convergence.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

use crate::{estimation::jacobian::ObservationBlock, observations::ObservationKind};

/// Weighted residual statistics of one observation kind.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KindStatistics {
    /// `Σ w·r²` over all components of this kind.
    pub weighted_square_sum: f64,
    /// Number of scalar components.
    pub components: usize,
    /// Number of observations.
    pub observations: usize,
}

impl KindStatistics {
    pub fn rms(&self) -> f64 {
        if self.components == 0 {
            0.0
        } else {
            (self.weighted_square_sum / self.components as f64).sqrt()
        }
    }
}

/// `AtWA`, `AtWb` and the residual statistics of one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalEquations {
    pub atwa: DMatrix<f64>,
    pub atwb: DVector<f64>,
    pub by_kind: BTreeMap<ObservationKind, KindStatistics>,
}

impl NormalEquations {
    pub fn new(dimension: usize) -> Self {
        NormalEquations {
            atwa: DMatrix::zeros(dimension, dimension),
            atwb: DVector::zeros(dimension),
            by_kind: BTreeMap::new(),
        }
    }

    /// Accumulate every block, in order.
    pub fn from_blocks(dimension: usize, blocks: &[ObservationBlock]) -> Self {
        let mut normal = Self::new(dimension);
        for block in blocks {
            normal.accumulate(block);
        }
        normal
    }

    /// Add one observation.
    ///
    /// A block without sensitivity columns (a residual-only evaluation) only updates the
    /// statistics.
    pub fn accumulate(&mut self, block: &ObservationBlock) {
        let stats = self.by_kind.entry(block.kind).or_default();
        stats.observations += 1;

        let has_rows = block.rows.ncols() == self.atwa.ncols();
        for (c, (&r, &w)) in block.residuals.iter().zip(block.weights.iter()).enumerate() {
            stats.weighted_square_sum += w * r * r;
            stats.components += 1;

            if has_rows {
                let a = block.rows.row(c).transpose();
                self.atwa.ger(w, &a, &a, 1.0);
                self.atwb.axpy(w * r, &a, 1.0);
            }
        }
    }

    /// Total number of scalar residual components.
    pub fn component_count(&self) -> usize {
        self.by_kind.values().map(|s| s.components).sum()
    }

    /// Pooled weighted RMS, `sqrt(Σ w·r² / N)` over all components.
    pub fn weighted_rms(&self) -> f64 {
        let n = self.component_count();
        if n == 0 {
            return 0.0;
        }
        let sum: f64 = self.by_kind.values().map(|s| s.weighted_square_sum).sum();
        (sum / n as f64).sqrt()
    }

    /// Weighted RMS of each observation kind present in the batch.
    pub fn rms_by_kind(&self) -> BTreeMap<ObservationKind, f64> {
        self.by_kind
            .iter()
            .map(|(kind, stats)| (*kind, stats.rms()))
            .collect()
    }
}

#[cfg(test)]
mod normal_equations_test {
    use super::*;
    use approx::assert_relative_eq;
    use smallvec::smallvec;

    fn block(
        kind: ObservationKind,
        rows: &[f64],
        residuals: &[f64],
        weights: &[f64],
    ) -> ObservationBlock {
        let m = residuals.len();
        ObservationBlock {
            kind,
            rows: DMatrix::from_row_slice(m, rows.len() / m, rows),
            residuals: residuals.iter().copied().collect(),
            weights: weights.iter().copied().collect(),
        }
    }

    #[test]
    fn test_matches_dense_products() {
        let blocks = vec![
            block(
                ObservationKind::RangeAzEl,
                &[1.0, 2.0, 0.5, -1.0, 3.0, 0.0],
                &[0.1, -0.2, 0.05],
                &[4.0, 1.0, 9.0],
            ),
            block(ObservationKind::Range, &[2.0, -1.0], &[0.3], &[2.0]),
        ];
        let normal = NormalEquations::from_blocks(2, &blocks);

        let a = DMatrix::from_row_slice(4, 2, &[1.0, 2.0, 0.5, -1.0, 3.0, 0.0, 2.0, -1.0]);
        let w = DMatrix::from_diagonal(&DVector::from_row_slice(&[4.0, 1.0, 9.0, 2.0]));
        let b = DVector::from_row_slice(&[0.1, -0.2, 0.05, 0.3]);

        assert_relative_eq!(normal.atwa, a.transpose() * &w * &a, epsilon = 1e-14);
        assert_relative_eq!(normal.atwb, a.transpose() * &w * &b, epsilon = 1e-14);
    }

    #[test]
    fn test_rms_statistics() {
        let blocks = vec![
            block(ObservationKind::Range, &[1.0], &[2.0], &[1.0]),
            block(ObservationKind::Range, &[1.0], &[0.0], &[1.0]),
            block(ObservationKind::AzEl, &[1.0, 1.0], &[1.0, 1.0], &[4.0, 4.0]),
        ];
        let normal = NormalEquations::from_blocks(1, &blocks);

        assert_eq!(normal.component_count(), 4);
        // (4 + 0 + 4 + 4) / 4
        assert_relative_eq!(normal.weighted_rms(), 3.0_f64.sqrt());

        let by_kind = normal.rms_by_kind();
        assert_eq!(by_kind.len(), 2);
        assert_relative_eq!(by_kind[&ObservationKind::Range], 2.0_f64.sqrt());
        assert_relative_eq!(by_kind[&ObservationKind::AzEl], 2.0);
        assert_eq!(normal.by_kind[&ObservationKind::Range].observations, 2);
    }

    #[test]
    fn test_residual_only_block() {
        let residual_only = ObservationBlock {
            kind: ObservationKind::Range,
            rows: DMatrix::zeros(1, 0),
            residuals: smallvec![3.0],
            weights: smallvec![1.0],
        };
        let mut normal = NormalEquations::new(6);
        normal.accumulate(&residual_only);

        assert_eq!(normal.atwa, DMatrix::zeros(6, 6));
        assert_relative_eq!(normal.weighted_rms(), 3.0);
    }

    #[test]
    fn test_empty() {
        let normal = NormalEquations::new(3);
        assert_eq!(normal.weighted_rms(), 0.0);
        assert!(normal.rms_by_kind().is_empty());
    }
}
