//! # Golub–Reinsch singular value decomposition
//!
//! Factorizes an `m × n` matrix (`m ≥ n`) as `A = U · diag(w) · Vᵗ`, where `U` is `m × n`
//! with orthonormal columns, `w` holds the `n` non-negative singular values in decreasing
//! order and `V` is `n × n` orthogonal.
//!
//! ## Algorithm
//!
//! 1. Householder reduction of `A` to upper bidiagonal form (diagonal in `w`,
//!    super-diagonal in `rv1`), accumulating the norm estimate `anorm`.
//! 2. Accumulation of the right-hand transformations into `V`.
//! 3. Accumulation of the left-hand transformations into `U` (in place of `A`).
//! 4. Implicit-shift QR diagonalization of the bidiagonal form, one singular value at a
//!    time from the bottom. A super-diagonal element is treated as zero once it is below
//!    [`SVD_EPS`]`·anorm`. At most [`MAX_QR_ITERATIONS`] sweeps per singular value.
//! 5. Sign fix-up: negative singular values are flipped with their `V` column, then the
//!    triplets are sorted by decreasing singular value and each `(U, V)` column pair is
//!    oriented so that most of its components are non-negative.
//!
//! ## References
//! * Golub & Reinsch, *Singular value decomposition and least squares solutions*,
//!   Numer. Math. 14 (1970).
//! * Press et al., *Numerical Recipes*, 3rd ed., §2.6.

use itertools::Itertools;
use nalgebra::{DMatrix, DVector};

use crate::od_errors::OdError;

/// Relative threshold below which a bidiagonal element is treated as zero.
pub const SVD_EPS: f64 = 1e-9;

/// QR sweeps allowed per singular value.
pub const MAX_QR_ITERATIONS: usize = 30;

/// `sqrt(a² + b²)` without destructive underflow or overflow.
pub fn pythag(a: f64, b: f64) -> f64 {
    let (absa, absb) = (a.abs(), b.abs());
    if absa > absb {
        absa * (1.0 + (absb / absa).powi(2)).sqrt()
    } else if absb == 0.0 {
        0.0
    } else {
        absb * (1.0 + (absa / absb).powi(2)).sqrt()
    }
}

/// `|a|` with the sign of `b`.
fn sign(a: f64, b: f64) -> f64 {
    if b >= 0.0 {
        a.abs()
    } else {
        -a.abs()
    }
}

/// Singular value decomposition `A = U · diag(w) · Vᵗ`.
#[derive(Debug, Clone, PartialEq)]
pub struct SvdDecomposition {
    /// Left singular vectors, `m × n`.
    pub u: DMatrix<f64>,
    /// Singular values, decreasing.
    pub w: DVector<f64>,
    /// Right singular vectors, `n × n`.
    pub v: DMatrix<f64>,
}

impl SvdDecomposition {
    /// Decompose `a`.
    ///
    /// Errors
    /// ------
    /// * [`OdError::InvalidMatrixShape`] if `a` has fewer rows than columns, no column, or a
    ///   non-finite entry.
    /// * [`OdError::SvdNoConvergence`] if a singular value needs more than
    ///   [`MAX_QR_ITERATIONS`] QR sweeps.
    pub fn new(a: &DMatrix<f64>) -> Result<Self, OdError> {
        let (m, n) = a.shape();
        if n == 0 || m < n {
            return Err(OdError::InvalidMatrixShape {
                rows: m,
                cols: n,
                reason: "SVD needs at least as many rows as columns",
            });
        }
        if a.iter().any(|x| !x.is_finite()) {
            return Err(OdError::InvalidMatrixShape {
                rows: m,
                cols: n,
                reason: "matrix contains non-finite entries",
            });
        }

        let mut svd = SvdDecomposition {
            u: a.clone(),
            w: DVector::zeros(n),
            v: DMatrix::zeros(n, n),
        };
        let mut rv1 = DVector::zeros(n);

        let anorm = svd.bidiagonalize(&mut rv1);
        svd.accumulate_right(&rv1);
        svd.accumulate_left();
        svd.diagonalize(&mut rv1, anorm)?;
        svd.reorder();
        Ok(svd)
    }

    /// Householder reduction to bidiagonal form. Returns the norm estimate `anorm`.
    fn bidiagonalize(&mut self, rv1: &mut DVector<f64>) -> f64 {
        let (m, n) = self.u.shape();
        let u = &mut self.u;
        let w = &mut self.w;

        let (mut g, mut scale, mut anorm) = (0.0_f64, 0.0_f64, 0.0_f64);
        for i in 0..n {
            let l = i + 1;
            rv1[i] = scale * g;
            g = 0.0;
            scale = 0.0;

            // Left transformation on column i
            for k in i..m {
                scale += u[(k, i)].abs();
            }
            if scale != 0.0 {
                let mut s = 0.0;
                for k in i..m {
                    u[(k, i)] /= scale;
                    s += u[(k, i)] * u[(k, i)];
                }
                let f = u[(i, i)];
                g = -sign(s.sqrt(), f);
                let h = f * g - s;
                u[(i, i)] = f - g;
                for j in l..n {
                    let mut s = 0.0;
                    for k in i..m {
                        s += u[(k, i)] * u[(k, j)];
                    }
                    let f = s / h;
                    for k in i..m {
                        u[(k, j)] += f * u[(k, i)];
                    }
                }
                for k in i..m {
                    u[(k, i)] *= scale;
                }
            }
            w[i] = scale * g;

            // Right transformation on row i
            g = 0.0;
            scale = 0.0;
            if i < m && l != n {
                for k in l..n {
                    scale += u[(i, k)].abs();
                }
                if scale != 0.0 {
                    let mut s = 0.0;
                    for k in l..n {
                        u[(i, k)] /= scale;
                        s += u[(i, k)] * u[(i, k)];
                    }
                    let f = u[(i, l)];
                    g = -sign(s.sqrt(), f);
                    let h = f * g - s;
                    u[(i, l)] = f - g;
                    for k in l..n {
                        rv1[k] = u[(i, k)] / h;
                    }
                    for j in l..m {
                        let mut s = 0.0;
                        for k in l..n {
                            s += u[(j, k)] * u[(i, k)];
                        }
                        for k in l..n {
                            u[(j, k)] += s * rv1[k];
                        }
                    }
                    for k in l..n {
                        u[(i, k)] *= scale;
                    }
                }
            }
            anorm = anorm.max(w[i].abs() + rv1[i].abs());
        }
        anorm
    }

    /// Accumulate the right-hand transformations into `v`.
    fn accumulate_right(&mut self, rv1: &DVector<f64>) {
        let n = self.w.len();
        let u = &self.u;
        let v = &mut self.v;

        for i in (0..n).rev() {
            if i + 1 < n {
                let l = i + 1;
                let g = rv1[l];
                if g != 0.0 {
                    // Double division avoids a possible underflow
                    for j in l..n {
                        v[(j, i)] = (u[(i, j)] / u[(i, l)]) / g;
                    }
                    for j in l..n {
                        let mut s = 0.0;
                        for k in l..n {
                            s += u[(i, k)] * v[(k, j)];
                        }
                        for k in l..n {
                            v[(k, j)] += s * v[(k, i)];
                        }
                    }
                }
                for j in l..n {
                    v[(i, j)] = 0.0;
                    v[(j, i)] = 0.0;
                }
            }
            v[(i, i)] = 1.0;
        }
    }

    /// Accumulate the left-hand transformations into `u`.
    fn accumulate_left(&mut self) {
        let (m, n) = self.u.shape();
        let u = &mut self.u;

        for i in (0..m.min(n)).rev() {
            let l = i + 1;
            let g = self.w[i];
            for j in l..n {
                u[(i, j)] = 0.0;
            }
            if g != 0.0 {
                let g = 1.0 / g;
                for j in l..n {
                    let mut s = 0.0;
                    for k in l..m {
                        s += u[(k, i)] * u[(k, j)];
                    }
                    let f = (s / u[(i, i)]) * g;
                    for k in i..m {
                        u[(k, j)] += f * u[(k, i)];
                    }
                }
                for j in i..m {
                    u[(j, i)] *= g;
                }
            } else {
                for j in i..m {
                    u[(j, i)] = 0.0;
                }
            }
            u[(i, i)] += 1.0;
        }
    }

    /// Implicit-shift QR diagonalization of the bidiagonal form.
    fn diagonalize(&mut self, rv1: &mut DVector<f64>, anorm: f64) -> Result<(), OdError> {
        let (m, n) = self.u.shape();
        let tol = SVD_EPS * anorm;
        let (u, w, v) = (&mut self.u, &mut self.w, &mut self.v);

        for k in (0..n).rev() {
            for its in 0..MAX_QR_ITERATIONS {
                // Test for splitting; rv1[0] is always zero
                let mut l = k;
                let mut cancel = true;
                loop {
                    if l == 0 || rv1[l].abs() <= tol {
                        cancel = false;
                        break;
                    }
                    if w[l - 1].abs() <= tol {
                        break;
                    }
                    l -= 1;
                }

                // Cancellation of rv1[l] when w[l - 1] is negligible
                if cancel {
                    let nm = l - 1;
                    let (mut c, mut s) = (0.0, 1.0);
                    for i in l..=k {
                        let f = s * rv1[i];
                        rv1[i] *= c;
                        if f.abs() <= tol {
                            break;
                        }
                        let g = w[i];
                        let h = pythag(f, g);
                        w[i] = h;
                        let h = 1.0 / h;
                        c = g * h;
                        s = -f * h;
                        for j in 0..m {
                            let y = u[(j, nm)];
                            let z = u[(j, i)];
                            u[(j, nm)] = y * c + z * s;
                            u[(j, i)] = z * c - y * s;
                        }
                    }
                }

                let z = w[k];
                if l == k {
                    // Convergence: make the singular value non-negative
                    if z < 0.0 {
                        w[k] = -z;
                        for j in 0..n {
                            v[(j, k)] = -v[(j, k)];
                        }
                    }
                    break;
                }
                if its + 1 == MAX_QR_ITERATIONS {
                    return Err(OdError::SvdNoConvergence {
                        index: k,
                        max_iterations: MAX_QR_ITERATIONS,
                    });
                }

                // Shift from the bottom 2x2 minor
                let mut x = w[l];
                let nm = k - 1;
                let mut y = w[nm];
                let mut g = rv1[nm];
                let mut h = rv1[k];
                let mut f = ((y - z) * (y + z) + (g - h) * (g + h)) / (2.0 * h * y);
                g = pythag(f, 1.0);
                f = ((x - z) * (x + z) + h * ((y / (f + sign(g, f))) - h)) / x;

                // Next QR transformation
                let (mut c, mut s) = (1.0, 1.0);
                for j in l..=nm {
                    let i = j + 1;
                    g = rv1[i];
                    y = w[i];
                    h = s * g;
                    g *= c;
                    let mut z = pythag(f, h);
                    rv1[j] = z;
                    c = f / z;
                    s = h / z;
                    f = x * c + g * s;
                    g = g * c - x * s;
                    h = y * s;
                    y *= c;
                    for jj in 0..n {
                        let xv = v[(jj, j)];
                        let zv = v[(jj, i)];
                        v[(jj, j)] = xv * c + zv * s;
                        v[(jj, i)] = zv * c - xv * s;
                    }
                    z = pythag(f, h);
                    w[j] = z;
                    // Rotation can be arbitrary if z = 0
                    if z != 0.0 {
                        let zinv = 1.0 / z;
                        c = f * zinv;
                        s = h * zinv;
                    }
                    f = c * g + s * y;
                    x = c * y - s * g;
                    for jj in 0..m {
                        let yu = u[(jj, j)];
                        let zu = u[(jj, i)];
                        u[(jj, j)] = yu * c + zu * s;
                        u[(jj, i)] = zu * c - yu * s;
                    }
                }
                rv1[l] = 0.0;
                rv1[k] = f;
                w[k] = x;
            }
        }
        Ok(())
    }

    /// Sort by decreasing singular value and orient every column pair.
    fn reorder(&mut self) {
        let (m, n) = self.u.shape();
        let order = (0..n)
            .sorted_by(|&a, &b| self.w[b].total_cmp(&self.w[a]))
            .collect_vec();

        let w = DVector::from_iterator(n, order.iter().map(|&k| self.w[k]));
        let u = self.u.select_columns(&order);
        let v = self.v.select_columns(&order);
        self.u = u;
        self.v = v;
        self.w = w;

        for k in 0..n {
            let negatives = self.u.column(k).iter().filter(|x| **x < 0.0).count()
                + self.v.column(k).iter().filter(|x| **x < 0.0).count();
            if negatives > (m + n) / 2 {
                self.u.column_mut(k).neg_mut();
                self.v.column_mut(k).neg_mut();
            }
        }
    }

    /// `U · diag(w) · Vᵗ`.
    pub fn reconstruct(&self) -> DMatrix<f64> {
        &self.u * DMatrix::from_diagonal(&self.w) * self.v.transpose()
    }

    /// Ratio of the largest to the smallest singular value (infinite if rank deficient).
    pub fn condition_number(&self) -> f64 {
        let n = self.w.len();
        let (wmax, wmin) = (self.w[0], self.w[n - 1]);
        if wmin == 0.0 {
            f64::INFINITY
        } else {
            wmax / wmin
        }
    }

    /// Number of singular values above `relative_threshold · w_max`.
    pub fn rank(&self, relative_threshold: f64) -> usize {
        let cutoff = relative_threshold * self.w[0];
        self.w.iter().filter(|&&x| x > cutoff).count()
    }
}

#[cfg(test)]
mod svd_test {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_matrix() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            6,
            4,
            &[
                4.0, 1.0, -2.0, 0.5, //
                1.0, 3.0, 0.0, -1.0, //
                -2.0, 0.0, 5.0, 2.0, //
                0.5, -1.0, 2.0, 6.0, //
                1.5, 2.5, -0.5, 1.0, //
                -3.0, 0.2, 1.0, -2.0,
            ],
        )
    }

    #[test]
    fn test_pythag() {
        assert_relative_eq!(pythag(3.0, 4.0), 5.0);
        assert_relative_eq!(pythag(-4.0, 3.0), 5.0);
        assert_eq!(pythag(0.0, 0.0), 0.0);
        assert_relative_eq!(pythag(1e200, 1e200), 2f64.sqrt() * 1e200);
    }

    #[test]
    fn test_reconstruction() {
        let a = sample_matrix();
        let svd = SvdDecomposition::new(&a).unwrap();
        assert_relative_eq!(svd.reconstruct(), a, epsilon = 1e-12);
    }

    #[test]
    fn test_orthogonality_and_order() {
        let svd = SvdDecomposition::new(&sample_matrix()).unwrap();
        let identity = DMatrix::<f64>::identity(4, 4);

        assert_relative_eq!(svd.u.transpose() * &svd.u, identity, epsilon = 1e-12);
        assert_relative_eq!(svd.v.transpose() * &svd.v, identity, epsilon = 1e-12);
        assert!(svd.w.iter().all(|&x| x >= 0.0));
        assert!(svd.w.as_slice().windows(2).all(|p| p[0] >= p[1]));
    }

    #[test]
    fn test_matches_nalgebra_singular_values() {
        let a = sample_matrix();
        let svd = SvdDecomposition::new(&a).unwrap();
        let reference = a.singular_values();
        let mut reference = reference.as_slice().to_vec();
        reference.sort_by(|x, y| y.total_cmp(x));
        for (ours, theirs) in svd.w.iter().zip(reference) {
            assert_relative_eq!(*ours, theirs, max_relative = 1e-10);
        }
    }

    #[test]
    fn test_diagonal_with_negative_entry() {
        let a = DMatrix::from_diagonal(&DVector::from_row_slice(&[3.0, -5.0, 1.0]));
        let svd = SvdDecomposition::new(&a).unwrap();
        assert_relative_eq!(
            svd.w,
            DVector::from_row_slice(&[5.0, 3.0, 1.0]),
            epsilon = 1e-14
        );
        assert_relative_eq!(svd.reconstruct(), a, epsilon = 1e-14);
        assert_relative_eq!(svd.condition_number(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rank_deficient() {
        // Third column is the sum of the first two
        let a = DMatrix::from_row_slice(
            4,
            3,
            &[
                1.0, 2.0, 3.0, //
                4.0, 5.0, 9.0, //
                7.0, 8.0, 15.0, //
                2.0, 1.0, 3.0,
            ],
        );
        let svd = SvdDecomposition::new(&a).unwrap();
        assert_eq!(svd.rank(1e-12), 2);
        assert!(svd.w[2] < 1e-12 * svd.w[0]);
        assert_relative_eq!(svd.reconstruct(), a, epsilon = 1e-12);
    }

    #[test]
    fn test_single_column() {
        let a = DMatrix::from_row_slice(3, 1, &[3.0, 0.0, -4.0]);
        let svd = SvdDecomposition::new(&a).unwrap();
        assert_relative_eq!(svd.w[0], 5.0, epsilon = 1e-14);
        assert_relative_eq!(svd.reconstruct(), a, epsilon = 1e-14);
    }

    #[test]
    fn test_invalid_shapes() {
        let wide = DMatrix::<f64>::zeros(2, 3);
        assert_eq!(
            SvdDecomposition::new(&wide),
            Err(OdError::InvalidMatrixShape {
                rows: 2,
                cols: 3,
                reason: ""
            })
        );

        let mut nan = DMatrix::<f64>::identity(3, 3);
        nan[(1, 1)] = f64::NAN;
        assert!(matches!(
            SvdDecomposition::new(&nan),
            Err(OdError::InvalidMatrixShape { .. })
        ));
    }

    #[test]
    fn test_zero_matrix() {
        let svd = SvdDecomposition::new(&DMatrix::zeros(3, 3)).unwrap();
        assert!(svd.w.iter().all(|&x| x == 0.0));
        assert_eq!(svd.rank(1e-14), 0);
    }
}
