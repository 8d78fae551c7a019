use thiserror::Error;

use crate::constants::SensorId;

#[derive(Error, Debug)]
pub enum OdError {
    #[error("SVD did not converge: singular value {index} needed more than {max_iterations} QR iterations")]
    SvdNoConvergence { index: usize, max_iterations: usize },

    #[error("Normal matrix is singular (zero pivot in column {0})")]
    SingularNormalMatrix(usize),

    #[error("Invalid matrix shape {rows}x{cols}: {reason}")]
    InvalidMatrixShape {
        rows: usize,
        cols: usize,
        reason: &'static str,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid estimator parameter: {0}")]
    InvalidEstimatorParameter(String),

    #[error("No sensor profile registered for sensor {0}")]
    UnknownSensor(SensorId),

    #[error("Observation {0} requires a site position but none was given")]
    MissingSite(usize),

    #[error("Observation batch is empty")]
    EmptyObservationBatch,

    #[error("Orbit is not bound (e = {0}); elliptic elements are undefined")]
    UnboundOrbit(f64),

    #[error("Kepler equation solver failed: {0}")]
    KeplerSolverFailed(#[from] roots::SearchError),

    #[error("Unable to read sensor profiles: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Estimation aborted")]
    Aborted,
}

impl PartialEq for OdError {
    fn eq(&self, other: &Self) -> bool {
        use OdError::*;
        match (self, other) {
            (
                SvdNoConvergence {
                    index: a,
                    max_iterations: b,
                },
                SvdNoConvergence {
                    index: c,
                    max_iterations: d,
                },
            ) => a == c && b == d,
            (SingularNormalMatrix(a), SingularNormalMatrix(b)) => a == b,
            (
                InvalidMatrixShape {
                    rows: r1, cols: c1, ..
                },
                InvalidMatrixShape {
                    rows: r2, cols: c2, ..
                },
            ) => r1 == r2 && c1 == c2,
            (
                DimensionMismatch {
                    expected: a,
                    actual: b,
                },
                DimensionMismatch {
                    expected: c,
                    actual: d,
                },
            ) => a == c && b == d,
            (InvalidEstimatorParameter(a), InvalidEstimatorParameter(b)) => a == b,
            (UnknownSensor(a), UnknownSensor(b)) => a == b,
            (MissingSite(a), MissingSite(b)) => a == b,
            (UnboundOrbit(a), UnboundOrbit(b)) => a == b,
            (KeplerSolverFailed(a), KeplerSolverFailed(b)) => a == b,

            // csv errors carry I/O state and are not comparable: same variant is enough
            (CsvError(_), CsvError(_)) => true,

            (EmptyObservationBatch, EmptyObservationBatch) => true,
            (Aborted, Aborted) => true,

            _ => false,
        }
    }
}
