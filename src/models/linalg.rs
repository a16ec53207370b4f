//! Small dense solvers for the regression-based models.

use anyhow::{Result, bail};

/// Solves `a * x = b` by Gaussian elimination with partial pivoting.
pub fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    if a.len() != n || a.iter().any(|row| row.len() != n) {
        bail!("solve: expected a square {}x{} system", n, n);
    }

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            bail!("solve: singular matrix at column {}", col);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

/// Ridge-regularised least squares on row-major `design`. `ridge[j]` is the
/// penalty added to the j-th diagonal entry of the normal equations.
pub fn least_squares(design: &[Vec<f64>], y: &[f64], ridge: &[f64]) -> Result<Vec<f64>> {
    let Some(first) = design.first() else {
        bail!("least_squares: empty design matrix");
    };
    let k = first.len();
    if design.len() != y.len() || ridge.len() != k {
        bail!(
            "least_squares: shape mismatch (rows={}, y={}, cols={}, ridge={})",
            design.len(),
            y.len(),
            k,
            ridge.len()
        );
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, &target) in design.iter().zip(y.iter()) {
        for i in 0..k {
            xty[i] += row[i] * target;
            for j in i..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..k {
        for j in 0..i {
            xtx[i][j] = xtx[j][i];
        }
        xtx[i][i] += ridge[i];
    }

    solve(xtx, xty)
}

/// Ordinary least squares line through `(t, y[t])`; returns `(intercept, slope)`.
pub fn linear_fit(y: &[f64]) -> (f64, f64) {
    let n = y.len() as f64;
    if y.len() < 2 {
        return (y.first().copied().unwrap_or(0.0), 0.0);
    }
    let t_mean = (n - 1.0) / 2.0;
    let y_mean = y.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var = 0.0;
    for (t, v) in y.iter().enumerate() {
        let dt = t as f64 - t_mean;
        cov += dt * (v - y_mean);
        var += dt * dt;
    }
    let slope = cov / var;
    (y_mean - slope * t_mean, slope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_small_system() {
        let a = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
        let x = solve(a, vec![3.0, 5.0]).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_solve_singular() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(solve(a, vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_least_squares_recovers_line() {
        let design: Vec<Vec<f64>> = (0..20).map(|t| vec![1.0, t as f64]).collect();
        let y: Vec<f64> = (0..20).map(|t| 3.0 + 0.5 * t as f64).collect();
        let beta = least_squares(&design, &y, &[0.0, 0.0]).unwrap();
        assert!((beta[0] - 3.0).abs() < 1e-9);
        assert!((beta[1] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_linear_fit() {
        let (a, b) = linear_fit(&[1.0, 3.0, 5.0, 7.0]);
        assert!((a - 1.0).abs() < 1e-12);
        assert!((b - 2.0).abs() < 1e-12);
    }
}
