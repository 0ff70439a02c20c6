//! Dense linear algebra on `ndarray` matrices: inversion, pseudo-inverse, eigenvalues and
//! spectral radius.
//!
//! - `invert`: Gauss-Jordan elimination with partial pivoting.
//! - `pseudo_inverse`: Moore-Penrose inverse from a one-sided Jacobi SVD.
//! - `eigenvalues`: reduction to upper Hessenberg form by Householder reflections, then the
//!   shifted double-step QR iteration. Only eigenvalues are computed, no eigenvectors.
//! - `spectral_radius` and `scale_to_spectral_radius`: the largest eigenvalue magnitude, and
//!   rescaling a matrix so that it hits a target value.

use crate::error::{Result, SimError};
use ndarray::{Array2, Axis};
use tracing::warn;

/// Sweeps of the Jacobi SVD before giving up on further orthogonalization.
const MAX_JACOBI_SWEEPS: usize = 60;

/// QR iterations allowed per eigenvalue before the iteration is declared divergent.
const MAX_QR_ITERATIONS_PER_ROOT: usize = 100;

/// Inverts a square matrix.
///
/// Fails with [`SimError::SingularMatrix`] when a pivot vanishes relative to the matrix
/// magnitude.
pub fn invert(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    let n = matrix.nrows();
    if matrix.ncols() != n {
        return Err(SimError::mismatch("columns of a square matrix", n, matrix.ncols()));
    }
    let scale = matrix.iter().fold(0.0f64, |acc, &x| acc.max(x.abs()));
    let tolerance = scale * n as f64 * f64::EPSILON;

    let mut a = matrix.clone();
    let mut inverse = Array2::eye(n);
    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        let pivot = a[[pivot_row, col]];
        if pivot.abs() <= tolerance || !pivot.is_finite() {
            return Err(SimError::SingularMatrix(format!(
                "pivot {pivot:e} in column {col} of a {n}x{n} matrix"
            )));
        }
        if pivot_row != col {
            swap_rows(&mut a, pivot_row, col);
            swap_rows(&mut inverse, pivot_row, col);
        }
        for j in 0..n {
            a[[col, j]] /= pivot;
            inverse[[col, j]] /= pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[[row, j]] -= factor * a[[col, j]];
                inverse[[row, j]] -= factor * inverse[[col, j]];
            }
        }
    }
    Ok(inverse)
}

#[inline]
fn swap_rows(matrix: &mut Array2<f64>, a: usize, b: usize) {
    for j in 0..matrix.ncols() {
        matrix.swap([a, j], [b, j]);
    }
}

/// Moore-Penrose pseudo-inverse.
///
/// Singular values below `max(m, n) * sigma_max * eps` are treated as zero, so the result
/// is well defined for rank-deficient input.
pub fn pseudo_inverse(matrix: &Array2<f64>) -> Array2<f64> {
    let (m, n) = matrix.dim();
    if m < n {
        return pseudo_inverse(&matrix.t().to_owned()).reversed_axes();
    }

    // One-sided Jacobi: rotate column pairs of U = A until they are mutually orthogonal,
    // accumulating the rotations in V. Then A V = U with U's column norms being the
    // singular values.
    let mut u = matrix.clone();
    let mut v: Array2<f64> = Array2::eye(n);
    for _ in 0..MAX_JACOBI_SWEEPS {
        let mut rotated = false;
        for p in 0..n {
            for q in (p + 1)..n {
                let (mut alpha, mut beta, mut gamma) = (0.0, 0.0, 0.0);
                for i in 0..m {
                    alpha += u[[i, p]] * u[[i, p]];
                    beta += u[[i, q]] * u[[i, q]];
                    gamma += u[[i, p]] * u[[i, q]];
                }
                if gamma.abs() <= f64::EPSILON * (alpha * beta).sqrt() || gamma == 0.0 {
                    continue;
                }
                rotated = true;
                let zeta = (beta - alpha) / (2.0 * gamma);
                let sign = if zeta >= 0.0 { 1.0 } else { -1.0 };
                let t = sign / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;
                rotate_columns(&mut u, p, q, c, s);
                rotate_columns(&mut v, p, q, c, s);
            }
        }
        if !rotated {
            break;
        }
    }

    let sigmas: Vec<f64> = u
        .axis_iter(Axis(1))
        .map(|col| col.iter().map(|x| x * x).sum::<f64>().sqrt())
        .collect();
    let sigma_max = sigmas.iter().fold(0.0f64, |acc, &s| acc.max(s));
    let tolerance = m.max(n) as f64 * sigma_max * f64::EPSILON;

    // pinv = V S^-1 U_hat^T = sum_j v_j u_j^T / sigma_j^2, with u_j = sigma_j * u_hat_j.
    let mut pinv = Array2::zeros((n, m));
    for (j, &sigma) in sigmas.iter().enumerate() {
        if sigma <= tolerance {
            continue;
        }
        let weight = 1.0 / (sigma * sigma);
        for r in 0..n {
            let vr = v[[r, j]] * weight;
            if vr == 0.0 {
                continue;
            }
            for c in 0..m {
                pinv[[r, c]] += vr * u[[c, j]];
            }
        }
    }
    pinv
}

#[inline]
fn rotate_columns(matrix: &mut Array2<f64>, p: usize, q: usize, c: f64, s: f64) {
    for i in 0..matrix.nrows() {
        let (xp, xq) = (matrix[[i, p]], matrix[[i, q]]);
        matrix[[i, p]] = c * xp - s * xq;
        matrix[[i, q]] = s * xp + c * xq;
    }
}

/// A complex eigenvalue as `(real, imaginary)`.
pub type Eigenvalue = (f64, f64);

/// Eigenvalues of a real square matrix. Complex eigenvalues come in conjugate pairs.
pub fn eigenvalues(matrix: &Array2<f64>) -> Result<Vec<Eigenvalue>> {
    let nn = matrix.nrows();
    if matrix.ncols() != nn {
        return Err(SimError::mismatch("columns of a square matrix", nn, matrix.ncols()));
    }
    if nn == 0 {
        return Ok(Vec::new());
    }
    let mut h: Vec<Vec<f64>> = matrix.outer_iter().map(|row| row.to_vec()).collect();
    hessenberg(&mut h);
    hessenberg_eigenvalues(h)
}

/// Reduces `h` to upper Hessenberg form in place by orthogonal similarity transforms.
fn hessenberg(h: &mut [Vec<f64>]) {
    let n = h.len();
    if n < 3 {
        return;
    }
    let high = n - 1;
    let mut ort = vec![0.0; n];
    for m in 1..high {
        let scale: f64 = (m..=high).map(|i| h[i][m - 1].abs()).sum();
        if scale == 0.0 {
            continue;
        }
        let mut norm_sq = 0.0;
        for i in (m..=high).rev() {
            ort[i] = h[i][m - 1] / scale;
            norm_sq += ort[i] * ort[i];
        }
        let mut g = norm_sq.sqrt();
        if ort[m] > 0.0 {
            g = -g;
        }
        norm_sq -= ort[m] * g;
        ort[m] -= g;

        for j in m..n {
            let f = (m..=high).rev().map(|i| ort[i] * h[i][j]).sum::<f64>() / norm_sq;
            for i in m..=high {
                h[i][j] -= f * ort[i];
            }
        }
        for row in h.iter_mut() {
            let f = (m..=high).rev().map(|j| ort[j] * row[j]).sum::<f64>() / norm_sq;
            for j in m..=high {
                row[j] -= f * ort[j];
            }
        }
        ort[m] *= scale;
        h[m][m - 1] = scale * g;
    }
}

/// Shifted double-step QR on an upper Hessenberg matrix.
fn hessenberg_eigenvalues(mut hm: Vec<Vec<f64>>) -> Result<Vec<Eigenvalue>> {
    macro_rules! h {
        ($i:expr, $j:expr) => {
            hm[($i) as usize][($j) as usize]
        };
    }

    let nn = hm.len() as isize;
    let low: isize = 0;
    let eps = f64::EPSILON;
    let mut re = vec![0.0; nn as usize];
    let mut im = vec![0.0; nn as usize];
    let mut n = nn - 1;
    let mut exshift = 0.0;
    let (mut p, mut q, mut r, mut s, mut z) = (0.0f64, 0.0f64, 0.0f64, 0.0f64, 0.0f64);
    let (mut w, mut x, mut y) = (0.0f64, 0.0f64, 0.0f64);

    let mut norm = 0.0;
    for i in 0..nn {
        for j in (i - 1).max(0)..nn {
            norm += h!(i, j).abs();
        }
    }

    let mut iter = 0usize;
    let mut total = 0usize;
    let budget = MAX_QR_ITERATIONS_PER_ROOT * nn as usize;
    while n >= low {
        // Look for a single small sub-diagonal element.
        let mut l = n;
        while l > low {
            s = h!(l - 1, l - 1).abs() + h!(l, l).abs();
            if s == 0.0 {
                s = norm;
            }
            if h!(l, l - 1).abs() < eps * s {
                break;
            }
            l -= 1;
        }

        if l == n {
            // One root.
            h!(n, n) += exshift;
            re[n as usize] = h!(n, n);
            im[n as usize] = 0.0;
            n -= 1;
            iter = 0;
        } else if l == n - 1 {
            // Two roots.
            w = h!(n, n - 1) * h!(n - 1, n);
            p = (h!(n - 1, n - 1) - h!(n, n)) / 2.0;
            q = p * p + w;
            z = q.abs().sqrt();
            h!(n, n) += exshift;
            h!(n - 1, n - 1) += exshift;
            x = h!(n, n);
            if q >= 0.0 {
                z = if p >= 0.0 { p + z } else { p - z };
                re[(n - 1) as usize] = x + z;
                re[n as usize] = re[(n - 1) as usize];
                if z != 0.0 {
                    re[n as usize] = x - w / z;
                }
                im[(n - 1) as usize] = 0.0;
                im[n as usize] = 0.0;
            } else {
                re[(n - 1) as usize] = x + p;
                re[n as usize] = x + p;
                im[(n - 1) as usize] = z;
                im[n as usize] = -z;
            }
            n -= 2;
            iter = 0;
        } else {
            total += 1;
            if total > budget {
                return Err(SimError::invalid(
                    "matrix",
                    "eigenvalue iteration did not converge",
                ));
            }

            x = h!(n, n);
            y = 0.0;
            w = 0.0;
            if l < n {
                y = h!(n - 1, n - 1);
                w = h!(n, n - 1) * h!(n - 1, n);
            }

            // Exceptional shifts break cycles of the standard shift.
            if iter == 10 {
                exshift += x;
                for i in low..=n {
                    h!(i, i) -= x;
                }
                s = h!(n, n - 1).abs() + h!(n - 1, n - 2).abs();
                x = 0.75 * s;
                y = x;
                w = -0.4375 * s * s;
            }
            if iter == 30 {
                s = (y - x) / 2.0;
                s = s * s + w;
                if s > 0.0 {
                    s = s.sqrt();
                    if y < x {
                        s = -s;
                    }
                    s = x - w / ((y - x) / 2.0 + s);
                    for i in low..=n {
                        h!(i, i) -= s;
                    }
                    exshift += s;
                    x = 0.964;
                    y = x;
                    w = x;
                }
            }
            iter += 1;

            // Look for two consecutive small sub-diagonal elements.
            let mut m = n - 2;
            while m >= l {
                z = h!(m, m);
                r = x - z;
                s = y - z;
                p = (r * s - w) / h!(m + 1, m) + h!(m, m + 1);
                q = h!(m + 1, m + 1) - z - r - s;
                r = h!(m + 2, m + 1);
                s = p.abs() + q.abs() + r.abs();
                p /= s;
                q /= s;
                r /= s;
                if m == l {
                    break;
                }
                if h!(m, m - 1).abs() * (q.abs() + r.abs())
                    < eps * (p.abs() * (h!(m - 1, m - 1).abs() + z.abs() + h!(m + 1, m + 1).abs()))
                {
                    break;
                }
                m -= 1;
            }

            for i in (m + 2)..=n {
                h!(i, i - 2) = 0.0;
                if i > m + 2 {
                    h!(i, i - 3) = 0.0;
                }
            }

            // Double QR step on rows l..=n and columns m..=n.
            let mut k = m;
            while k < n {
                let notlast = k != n - 1;
                if k != m {
                    p = h!(k, k - 1);
                    q = h!(k + 1, k - 1);
                    r = if notlast { h!(k + 2, k - 1) } else { 0.0 };
                    x = p.abs() + q.abs() + r.abs();
                    if x == 0.0 {
                        k += 1;
                        continue;
                    }
                    p /= x;
                    q /= x;
                    r /= x;
                }
                s = (p * p + q * q + r * r).sqrt();
                if p < 0.0 {
                    s = -s;
                }
                if s != 0.0 {
                    if k != m {
                        h!(k, k - 1) = -s * x;
                    } else if l != m {
                        h!(k, k - 1) = -h!(k, k - 1);
                    }
                    p += s;
                    x = p / s;
                    y = q / s;
                    z = r / s;
                    q /= p;
                    r /= p;

                    for j in k..nn {
                        p = h!(k, j) + q * h!(k + 1, j);
                        if notlast {
                            p += r * h!(k + 2, j);
                            h!(k + 2, j) -= p * z;
                        }
                        h!(k, j) -= p * x;
                        h!(k + 1, j) -= p * y;
                    }
                    for i in 0..=n.min(k + 3) {
                        p = x * h!(i, k) + y * h!(i, k + 1);
                        if notlast {
                            p += z * h!(i, k + 2);
                            h!(i, k + 2) -= p * r;
                        }
                        h!(i, k) -= p;
                        h!(i, k + 1) -= p * q;
                    }
                }
                k += 1;
            }
        }
    }

    Ok(re.into_iter().zip(im).collect())
}

/// Largest eigenvalue magnitude of a square matrix.
pub fn spectral_radius(matrix: &Array2<f64>) -> Result<f64> {
    Ok(eigenvalues(matrix)?
        .into_iter()
        .map(|(re, im)| re.hypot(im))
        .fold(0.0, f64::max))
}

/// Scales `matrix` in place so that its spectral radius becomes `target`. Returns the
/// radius before scaling.
///
/// A nilpotent or zero matrix has radius 0 and cannot be rescaled; it is left unchanged.
pub fn scale_to_spectral_radius(matrix: &mut Array2<f64>, target: f64) -> Result<f64> {
    let radius = spectral_radius(matrix)?;
    if radius == 0.0 {
        warn!("spectral radius is 0, weights left unscaled");
        return Ok(radius);
    }
    matrix.mapv_inplace(|w| w * target / radius);
    Ok(radius)
}
