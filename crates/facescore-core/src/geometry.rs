//! Numeric helpers shared by the metric, quality and normalization stages.

use crate::types::Point;

/// Denominators at or below this magnitude are treated as degenerate.
const DEGENERATE_EPSILON: f64 = 1e-9;

/// Replace a degenerate (near-zero or non-finite) denominator with 1.
pub fn safe_denominator(value: f64) -> f64 {
    if value.is_finite() && value.abs() > DEGENERATE_EPSILON {
        value
    } else {
        1.0
    }
}

/// Clamp into `[lo, hi]`, mapping NaN to `lo`.
pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        lo
    } else {
        value.clamp(lo, hi)
    }
}

/// Cubic ease `t²(3 − 2t)` of `value` across `[edge0, edge1]`: 0 at or below
/// `edge0`, 1 at or above `edge1`.
pub fn smoothstep(value: f64, edge0: f64, edge1: f64) -> f64 {
    if value <= edge0 {
        return 0.0;
    }
    if value >= edge1 {
        return 1.0;
    }
    let t = (value - edge0) / (edge1 - edge0);
    t * t * (3.0 - 2.0 * t)
}

/// Interior angle at `vertex` between the rays to `a` and `b`, in degrees.
pub fn angle_at_deg(vertex: Point, a: Point, b: Point) -> f64 {
    let (v1x, v1y) = (a.x - vertex.x, a.y - vertex.y);
    let (v2x, v2y) = (b.x - vertex.x, b.y - vertex.y);
    let dot = v1x * v2x + v1y * v2y;
    let norms = safe_denominator(v1x.hypot(v1y) * v2x.hypot(v2y));
    clamp(dot / norms, -1.0, 1.0).acos().to_degrees()
}

/// Error function, Abramowitz & Stegun 7.1.26 (max abs error 1.5e-7).
pub fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

/// Standard normal cumulative distribution function.
pub fn normal_cdf(z: f64) -> f64 {
    if z.is_nan() {
        return 0.5;
    }
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}
