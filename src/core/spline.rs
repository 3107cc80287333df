//! Cubic spline interpolation with not-a-knot end conditions.
//!
//! Evaluation outside the knot range extends the first or last polynomial
//! piece, so the interpolant extrapolates smoothly.

/// Minimum number of knots for a cubic interpolant.
pub const MIN_KNOTS: usize = 4;

/// Reasons a spline cannot be built.
#[derive(Debug, Clone, PartialEq)]
pub enum SplineError {
    TooFewKnots(usize),
    LengthMismatch { xs: usize, ys: usize },
    NotIncreasing { index: usize },
    Singular,
}

impl std::fmt::Display for SplineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplineError::TooFewKnots(n) => {
                write!(f, "cubic spline needs at least {MIN_KNOTS} knots, got {n}")
            }
            SplineError::LengthMismatch { xs, ys } => {
                write!(f, "{xs} knot positions but {ys} knot values")
            }
            SplineError::NotIncreasing { index } => {
                write!(f, "knot positions are not strictly increasing at index {index}")
            }
            SplineError::Singular => write!(f, "spline system is singular"),
        }
    }
}

impl std::error::Error for SplineError {}

/// A fitted cubic spline, stored as knots plus second derivatives.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    second_derivs: Vec<f64>,
}

impl CubicSpline {
    /// Fit a not-a-knot cubic spline through `(xs[i], ys[i])`.
    ///
    /// `xs` must be strictly increasing. Callers should shift large
    /// coordinates (e.g. epoch microseconds) towards zero first.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self, SplineError> {
        let n = xs.len();
        if n != ys.len() {
            return Err(SplineError::LengthMismatch { xs: n, ys: ys.len() });
        }
        if n < MIN_KNOTS {
            return Err(SplineError::TooFewKnots(n));
        }
        if let Some(index) = (1..n).find(|&i| xs[i] <= xs[i - 1]) {
            return Err(SplineError::NotIncreasing { index });
        }

        let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
        let slopes: Vec<f64> = (0..n - 1).map(|i| (ys[i + 1] - ys[i]) / h[i]).collect();

        // Interior unknowns M_1..M_{n-2}; the end values follow from the
        // not-a-knot conditions (third derivative continuous at x_1, x_{n-2}).
        let m = n - 2;
        let mut sub = vec![0.0; m];
        let mut diag = vec![0.0; m];
        let mut sup = vec![0.0; m];
        let mut rhs = vec![0.0; m];

        for row in 0..m {
            let i = row + 1;
            sub[row] = h[i - 1];
            diag[row] = 2.0 * (h[i - 1] + h[i]);
            sup[row] = h[i];
            rhs[row] = 6.0 * (slopes[i] - slopes[i - 1]);
        }

        let (h0, h1) = (h[0], h[1]);
        diag[0] = 3.0 * h0 + 2.0 * h1 + h0 * h0 / h1;
        sup[0] = h1 - h0 * h0 / h1;
        sub[0] = 0.0;

        let (a, b) = (h[n - 3], h[n - 2]);
        let last = m - 1;
        sub[last] = a - b * b / a;
        diag[last] = 2.0 * a + 3.0 * b + b * b / a;
        sup[last] = 0.0;

        let interior = solve_tridiagonal(&sub, &diag, &sup, &rhs).ok_or(SplineError::Singular)?;

        let mut second_derivs = Vec::with_capacity(n);
        let m0 = interior[0] + h0 / h1 * (interior[0] - interior[1]);
        second_derivs.push(m0);
        second_derivs.extend_from_slice(&interior);
        let mn = interior[m - 1] + b / a * (interior[m - 1] - interior[m - 2]);
        second_derivs.push(mn);

        if second_derivs.iter().any(|v| !v.is_finite()) {
            return Err(SplineError::Singular);
        }

        Ok(Self {
            xs,
            ys,
            second_derivs,
        })
    }

    /// Evaluate the spline at `x`, extrapolating beyond the knots.
    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.xs.len();
        // Index of the piece whose left knot is at or before x.
        let i = self.xs.partition_point(|&k| k <= x).clamp(1, n - 1) - 1;
        self.evaluate_piece(i, x)
    }

    /// Evaluate at many ascending positions, walking the pieces once.
    pub fn evaluate_sorted(&self, points: &[f64]) -> Vec<f64> {
        let n = self.xs.len();
        let mut piece = 0;
        points
            .iter()
            .map(|&x| {
                while piece < n - 2 && x >= self.xs[piece + 1] {
                    piece += 1;
                }
                self.evaluate_piece(piece, x)
            })
            .collect()
    }

    fn evaluate_piece(&self, i: usize, x: f64) -> f64 {
        let (x0, x1) = (self.xs[i], self.xs[i + 1]);
        let (y0, y1) = (self.ys[i], self.ys[i + 1]);
        let (m0, m1) = (self.second_derivs[i], self.second_derivs[i + 1]);
        let h = x1 - x0;
        let left = x1 - x;
        let right = x - x0;

        m0 * left.powi(3) / (6.0 * h)
            + m1 * right.powi(3) / (6.0 * h)
            + (y0 / h - m0 * h / 6.0) * left
            + (y1 / h - m1 * h / 6.0) * right
    }
}

/// Thomas algorithm for a tridiagonal system. `sub[0]` and `sup[n-1]` are ignored.
fn solve_tridiagonal(sub: &[f64], diag: &[f64], sup: &[f64], rhs: &[f64]) -> Option<Vec<f64>> {
    let n = diag.len();
    let mut c = vec![0.0; n];
    let mut d = vec![0.0; n];

    if diag[0] == 0.0 {
        return None;
    }
    c[0] = sup[0] / diag[0];
    d[0] = rhs[0] / diag[0];

    for i in 1..n {
        let denom = diag[i] - sub[i] * c[i - 1];
        if denom == 0.0 || !denom.is_finite() {
            return None;
        }
        c[i] = if i + 1 < n { sup[i] / denom } else { 0.0 };
        d[i] = (rhs[i] - sub[i] * d[i - 1]) / denom;
    }

    let mut x = vec![0.0; n];
    x[n - 1] = d[n - 1];
    for i in (0..n - 1).rev() {
        x[i] = d[i] - c[i] * x[i + 1];
    }
    Some(x)
}
