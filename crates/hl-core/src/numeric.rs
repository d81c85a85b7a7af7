use crate::error::HlError;

/// Floating point type used throughout the control core.
pub type Real = f64;

/// Absolute tolerance used when comparing allocated against demanded capacity.
pub const CAPACITY_EPS: Real = 1e-6;

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, HlError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(HlError::NonFinite { what, value: v })
    }
}

/// Clamp to the percentage range `[0, 100]`.
pub fn clamp_pct(v: Real) -> Real {
    v.clamp(0.0, 100.0)
}

/// Piecewise-linear interpolation over `points` sorted by `x`.
///
/// Outside the table the end values are held.
pub fn interpolate(points: &[(Real, Real)], x: Real) -> Option<Real> {
    let (first, last) = (points.first()?, points.last()?);
    if x <= first.0 {
        return Some(first.1);
    }
    if x >= last.0 {
        return Some(last.1);
    }
    points.windows(2).find_map(|w| {
        let ((x0, y0), (x1, y1)) = (w[0], w[1]);
        (x >= x0 && x <= x1).then(|| {
            if x1 == x0 {
                y1
            } else {
                y0 + (y1 - y0) * (x - x0) / (x1 - x0)
            }
        })
    })
}
