//! Gauss quadrature rules on the reference line, triangle and tetrahedron.
//!
//! - line: Gauss–Legendre on `[-1, 1]`, any number of points
//! - triangle `(0,0) (1,0) (0,1)`: Strang–Fix/Dunavant rules up to degree 5,
//!   collapsed (Duffy) tensor rules above; weights sum to 1/2
//! - tetrahedron `(0,0,0) (1,0,0) (0,1,0) (0,0,1)`: Keast rules up to degree 3,
//!   collapsed tensor rules above; weights sum to 1/6

use std::f64::consts::PI;
use thiserror::Error;

/// Largest polynomial degree the rule generators accept.
pub const MAX_DEGREE: usize = 30;

/// Errors raised when a quadrature rule cannot be built.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QuadratureError {
    /// Gauss–Legendre rules need between 1 and 64 points.
    #[error("Gauss-Legendre rule with {points} points is not supported (1..=64)")]
    UnsupportedPointCount {
        /// Requested point count.
        points: usize,
    },
    /// Requested polynomial degree exceeds [`MAX_DEGREE`].
    #[error("Quadrature degree {degree} exceeds the supported maximum {max}")]
    DegreeTooHigh {
        /// Requested degree.
        degree: usize,
        /// Largest supported degree.
        max: usize,
    },
}

/// A quadrature point in reference coordinates with its weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussPoint {
    /// Reference coordinates (unused trailing components are zero).
    pub coords: [f64; 3],
    /// Integration weight on the reference domain.
    pub weight: f64,
}

impl GaussPoint {
    /// Create a new Gauss point.
    #[must_use]
    pub const fn new(coords: [f64; 3], weight: f64) -> Self {
        Self { coords, weight }
    }
}

/// Gauss–Legendre `(point, weight)` pairs on `[-1, 1]`.
///
/// Nodes are the roots of the Legendre polynomial `P_n`, found by Newton
/// iteration on the three-term recurrence.
///
/// # Errors
///
/// Returns [`QuadratureError::UnsupportedPointCount`] for `n == 0` or `n > 64`.
pub fn gauss_legendre(n: usize) -> Result<Vec<(f64, f64)>, QuadratureError> {
    if n == 0 || n > 64 {
        return Err(QuadratureError::UnsupportedPointCount { points: n });
    }
    #[allow(clippy::cast_precision_loss)]
    let nf = n as f64;
    let mut rule = vec![(0.0, 0.0); n];
    for i in 0..n.div_ceil(2) {
        #[allow(clippy::cast_precision_loss)]
        let mut x = (PI * (i as f64 + 0.75) / (nf + 0.5)).cos();
        let mut derivative = 1.0;
        for _ in 0..100 {
            let (value, slope) = legendre_with_derivative(n, x);
            derivative = slope;
            let step = value / slope;
            x -= step;
            if step.abs() <= 1e-15 {
                break;
            }
        }
        let (_, slope) = legendre_with_derivative(n, x);
        if slope.is_finite() {
            derivative = slope;
        }
        let weight = 2.0 / ((1.0 - x * x) * derivative * derivative);
        rule[i] = (-x, weight);
        rule[n - 1 - i] = (x, weight);
    }
    if n % 2 == 1 {
        rule[n / 2].0 = 0.0;
    }
    Ok(rule)
}

fn legendre_with_derivative(n: usize, x: f64) -> (f64, f64) {
    let (mut p0, mut p1) = (1.0, x);
    for k in 2..=n {
        #[allow(clippy::cast_precision_loss)]
        let kf = k as f64;
        let p2 = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        p0 = p1;
        p1 = p2;
    }
    #[allow(clippy::cast_precision_loss)]
    let slope = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, slope)
}

/// Number of Gauss–Legendre points integrating degree `degree` exactly.
#[must_use]
pub const fn line_points_for_degree(degree: usize) -> usize {
    degree / 2 + 1
}

/// Gauss–Legendre rule mapped to `[0, 1]`.
fn unit_interval_rule(n: usize) -> Result<Vec<(f64, f64)>, QuadratureError> {
    Ok(gauss_legendre(n)?
        .into_iter()
        .map(|(x, w)| (0.5 * (x + 1.0), 0.5 * w))
        .collect())
}

fn check_degree(degree: usize) -> Result<(), QuadratureError> {
    if degree > MAX_DEGREE {
        return Err(QuadratureError::DegreeTooHigh {
            degree,
            max: MAX_DEGREE,
        });
    }
    Ok(())
}

/// Rule on the reference triangle exact for polynomials of degree `degree`.
///
/// # Errors
///
/// Returns [`QuadratureError::DegreeTooHigh`] above [`MAX_DEGREE`].
pub fn triangle_rule(degree: usize) -> Result<Vec<GaussPoint>, QuadratureError> {
    check_degree(degree)?;
    let tri = |r: f64, s: f64, w: f64| GaussPoint::new([r, s, 0.0], w);
    let rule = match degree {
        0 | 1 => vec![tri(1.0 / 3.0, 1.0 / 3.0, 0.5)],
        2 => vec![
            tri(1.0 / 6.0, 1.0 / 6.0, 1.0 / 6.0),
            tri(2.0 / 3.0, 1.0 / 6.0, 1.0 / 6.0),
            tri(1.0 / 6.0, 2.0 / 3.0, 1.0 / 6.0),
        ],
        3 | 4 => {
            let (a, wa) = (0.445_948_490_915_965, 0.223_381_589_678_011 / 2.0);
            let (b, wb) = (0.091_576_213_509_771, 0.109_951_743_655_322 / 2.0);
            vec![
                tri(a, a, wa),
                tri(1.0 - 2.0 * a, a, wa),
                tri(a, 1.0 - 2.0 * a, wa),
                tri(b, b, wb),
                tri(1.0 - 2.0 * b, b, wb),
                tri(b, 1.0 - 2.0 * b, wb),
            ]
        }
        5 => {
            let (a1, b1, w1) = (0.059_715_871_789_770, 0.470_142_064_105_115, 0.132_394_152_788_506 / 2.0);
            let (a2, b2, w2) = (0.797_426_985_353_087, 0.101_286_507_323_456, 0.125_939_180_544_827 / 2.0);
            vec![
                tri(1.0 / 3.0, 1.0 / 3.0, 0.225 / 2.0),
                tri(b1, b1, w1),
                tri(a1, b1, w1),
                tri(b1, a1, w1),
                tri(b2, b2, w2),
                tri(a2, b2, w2),
                tri(b2, a2, w2),
            ]
        }
        _ => {
            // x = u, y = v (1 - u), J = 1 - u
            let n = (degree + 3) / 2;
            let line = unit_interval_rule(n)?;
            let mut rule = Vec::with_capacity(n * n);
            for &(u, wu) in &line {
                for &(v, wv) in &line {
                    rule.push(tri(u, v * (1.0 - u), wu * wv * (1.0 - u)));
                }
            }
            rule
        }
    };
    Ok(rule)
}

/// Rule on the reference tetrahedron exact for polynomials of degree `degree`.
///
/// # Errors
///
/// Returns [`QuadratureError::DegreeTooHigh`] above [`MAX_DEGREE`].
pub fn tet_rule(degree: usize) -> Result<Vec<GaussPoint>, QuadratureError> {
    check_degree(degree)?;
    let rule = match degree {
        0 | 1 => vec![GaussPoint::new([0.25, 0.25, 0.25], 1.0 / 6.0)],
        2 => {
            let sqrt5 = 5.0_f64.sqrt();
            let alpha = (5.0 + 3.0 * sqrt5) / 20.0;
            let beta = (5.0 - sqrt5) / 20.0;
            let w = 1.0 / 24.0;
            vec![
                GaussPoint::new([beta, beta, beta], w),
                GaussPoint::new([alpha, beta, beta], w),
                GaussPoint::new([beta, alpha, beta], w),
                GaussPoint::new([beta, beta, alpha], w),
            ]
        }
        3 => {
            // Keast: centroid with negative weight plus four interior points.
            let (a, b) = (0.5, 1.0 / 6.0);
            let w = 3.0 / 40.0;
            vec![
                GaussPoint::new([0.25, 0.25, 0.25], -2.0 / 15.0),
                GaussPoint::new([b, b, b], w),
                GaussPoint::new([a, b, b], w),
                GaussPoint::new([b, a, b], w),
                GaussPoint::new([b, b, a], w),
            ]
        }
        _ => {
            // x = u, y = v (1 - u), z = w (1 - u)(1 - v), J = (1 - u)^2 (1 - v)
            let n = (degree + 4) / 2;
            let line = unit_interval_rule(n)?;
            let mut rule = Vec::with_capacity(n * n * n);
            for &(u, wu) in &line {
                for &(v, wv) in &line {
                    for &(w, ww) in &line {
                        let jacobian = (1.0 - u) * (1.0 - u) * (1.0 - v);
                        rule.push(GaussPoint::new(
                            [u, v * (1.0 - u), w * (1.0 - u) * (1.0 - v)],
                            wu * wv * ww * jacobian,
                        ));
                    }
                }
            }
            rule
        }
    };
    Ok(rule)
}
